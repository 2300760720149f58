//! Command Line Interface
//!
//! Three modes: check an existing tournament file against the rules, pair the next round
//! of a tournament, or generate a synthetic tournament. Exit codes: 0 success, 1 no
//! valid pairing, 2 unexpected error, 3 invalid request, 4 build limit exceeded, 5 file
//! error.
//!

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rand::{Rng, SeedableRng};

use crate::error::{FileError, PairingError};
use crate::generator;
use crate::swiss::{self, Pairing, SwissSystem};
use crate::tournament::{Color, Tournament};
use crate::trf;
use crate::util::*;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_NO_VALID_PAIRING: i32 = 1;
pub const EXIT_UNEXPECTED_ERROR: i32 = 2;
pub const EXIT_INVALID_REQUEST: i32 = 3;
pub const EXIT_LIMIT_EXCEEDED: i32 = 4;
pub const EXIT_FILE_ERROR: i32 = 5;

#[derive(Parser)]
#[clap(author = clap::crate_authors!(", "))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "A Swiss-system chess tournament pairing engine")]
#[clap(color = clap::ColorChoice::Auto)]
#[clap(propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
pub struct Cli {
    /// print build information before running
    #[clap(short = 'r', long, action, global = true)]
    build_info: bool,
    #[clap(subcommand)]
    command: Commands,
}

/// The choice of rule family, spelled as the traditional flags.
#[derive(Args, Clone, Copy)]
pub struct SystemChoice {
    /// pair under the FIDE Dutch system
    #[clap(long, action)]
    dutch: bool,
    /// pair under the Burstein system
    #[clap(long, action)]
    burstein: bool,
}

impl SystemChoice {
    fn resolve(&self) -> Result<SwissSystem, String> {
        match (self.dutch, self.burstein) {
            (true, false) => Ok(SwissSystem::Dutch),
            (false, true) => Ok(SwissSystem::Burstein),
            _ => Err("exactly one of --dutch and --burstein must be given".to_string()),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// check the recorded pairings of a tournament file against the rules
    Check {
        #[clap(flatten)]
        system: SystemChoice,
        /// the tournament file in TRF(x) format
        #[clap(value_parser)]
        input: PathBuf,
        /// write a checklist file; the file name defaults to the input name plus
        /// ".checklist"
        #[clap(short = 'l', long, value_name = "FILE")]
        checklist: Option<Option<PathBuf>>,
    },
    /// compute the pairing of the next round
    Pair {
        #[clap(flatten)]
        system: SystemChoice,
        /// the tournament file in TRF(x) format
        #[clap(value_parser)]
        input: PathBuf,
        /// write the pairings to this file instead of standard output
        #[clap(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// print the pairings as JSON instead of the plain listing
        #[clap(long, action)]
        json: bool,
        /// write a checklist file; the file name defaults to the input name plus
        /// ".checklist"
        #[clap(short = 'l', long, value_name = "FILE")]
        checklist: Option<Option<PathBuf>>,
    },
    /// generate a random tournament and write it as TRF(x)
    Generate {
        #[clap(flatten)]
        system: SystemChoice,
        /// generator configuration file
        #[clap(value_parser)]
        config: Option<PathBuf>,
        /// the file to write the generated tournament to
        #[clap(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
        /// seed for the deterministic random number generator
        #[clap(short = 's', long)]
        seed: Option<u64>,
        /// write a checklist file; the file name defaults to the output name plus
        /// ".checklist"
        #[clap(short = 'l', long, value_name = "FILE")]
        checklist: Option<Option<PathBuf>>,
    },
}

fn print_build_info() {
    println!(
        "{} {} (swiss systems: dutch, burstein)",
        clap::crate_name!(),
        clap::crate_version!(),
    );
}

fn file_error(path: &Path, error: &dyn std::fmt::Display) -> i32 {
    eprintln!("Error reading file {}: {}", path.display(), error);
    EXIT_FILE_ERROR
}

fn pairing_error(error: PairingError) -> i32 {
    eprintln!("Error: {}", error);
    match error {
        PairingError::NoValidPairing(_) => EXIT_NO_VALID_PAIRING,
        PairingError::UnapplicableFeature(_) => EXIT_INVALID_REQUEST,
        PairingError::BuildLimitExceeded(_) => EXIT_LIMIT_EXCEEDED,
    }
}

fn read_error(path: &Path, error: FileError) -> i32 {
    match error {
        FileError::Read(reason) => file_error(path, &reason),
        FileError::Format(reason) => {
            eprintln!("Error parsing file {}: {}", path.display(), reason);
            EXIT_INVALID_REQUEST
        }
        FileError::Limit(reason) => {
            eprintln!("Error: {}", reason);
            EXIT_LIMIT_EXCEEDED
        }
    }
}

/// Open the checklist output file, deriving a default name next to `base` when the flag
/// carries no explicit path.
fn open_checklist(
    checklist: &Option<Option<PathBuf>>,
    base: &Path,
) -> Result<Option<BufWriter<File>>, (PathBuf, io::Error)> {
    match checklist {
        None => Ok(None),
        Some(explicit) => {
            let path = explicit.clone().unwrap_or_else(|| {
                let mut name = base.as_os_str().to_owned();
                name.push(".checklist");
                PathBuf::from(name)
            });
            File::create(&path)
                .map(|file| Some(BufWriter::new(file)))
                .map_err(|error| (path, error))
        }
    }
}

fn read_tournament_file(path: &Path, include_unpaired_round: bool) -> Result<Tournament, i32> {
    let file = File::open(path).map_err(|error| file_error(path, &error))?;
    let mut reader = BufReader::new(file);
    trf::read_tournament(&mut reader, include_unpaired_round).map_err(|error| read_error(path, error))
}

fn write_pairs(pairs: &[Pairing], json: bool, output: &mut dyn Write) -> io::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *output, pairs)?;
        writeln!(output)?;
        return Ok(());
    }
    writeln!(output, "{}", pairs.len())?;
    for pair in pairs.iter() {
        if pair.is_bye() {
            writeln!(output, "{} 0", pair.white + 1)?;
        } else {
            writeln!(output, "{} {}", pair.white + 1, pair.black + 1)?;
        }
    }
    Ok(())
}

impl Cli {
    pub fn run(self) -> i32 {
        if self.build_info {
            print_build_info();
        }
        match self.command {
            Commands::Check { system, input, checklist } => {
                let system = match system.resolve() {
                    Ok(system) => system,
                    Err(message) => {
                        eprintln!("Error: {}", message);
                        return EXIT_INVALID_REQUEST;
                    }
                };
                let tournament = match read_tournament_file(&input, false) {
                    Ok(tournament) => tournament,
                    Err(code) => return code,
                };
                let mut checklist_file = match open_checklist(&checklist, &input) {
                    Ok(file) => file,
                    Err((path, error)) => return file_error(&path, &error),
                };
                let mut stdout = io::stdout();
                let result = crate::checker::check(&tournament, system, &mut stdout);
                match result {
                    Ok(reports) => {
                        if let Some(file) = checklist_file.as_mut() {
                            for report in reports.iter() {
                                let _ = writeln!(
                                    file,
                                    "Round {}: {}",
                                    report.round + 1,
                                    if report.matches { "match" } else { "MISMATCH" }
                                );
                            }
                        }
                        EXIT_SUCCESS
                    }
                    Err(error) => pairing_error(error),
                }
            }
            Commands::Pair { system, input, output, json, checklist } => {
                let system = match system.resolve() {
                    Ok(system) => system,
                    Err(message) => {
                        eprintln!("Error: {}", message);
                        return EXIT_INVALID_REQUEST;
                    }
                };
                let mut tournament = match read_tournament_file(&input, true) {
                    Ok(tournament) => tournament,
                    Err(code) => return code,
                };
                if tournament.initial_color == Color::None {
                    eprintln!(
                        "Error while parsing {}: please configure the initial piece colors.",
                        input.display()
                    );
                    return EXIT_INVALID_REQUEST;
                }
                tournament.update_ranks();
                tournament.compute_player_data();

                // Add the default accelerations when the file does not configure any.
                if tournament.default_acceleration {
                    for round_index in 0..=tournament.played_rounds {
                        if let Err(error) =
                            swiss::update_accelerations(system, &mut tournament, round_index)
                        {
                            return pairing_error(error);
                        }
                    }
                }

                let mut checklist_file = match open_checklist(&checklist, &input) {
                    Ok(file) => file,
                    Err((path, error)) => return file_error(&path, &error),
                };
                let pairs = match swiss::compute_matching(
                    system,
                    tournament,
                    checklist_file.as_mut().map(|file| file as &mut dyn Write),
                ) {
                    Ok(pairs) => pairs,
                    Err(error) => return pairing_error(error),
                };

                let write_result = match output {
                    Some(path) => match File::create(&path) {
                        Ok(file) => {
                            let mut writer = BufWriter::new(file);
                            write_pairs(&pairs, json, &mut writer)
                        }
                        Err(error) => return file_error(&path, &error),
                    },
                    None => write_pairs(&pairs, json, &mut io::stdout()),
                };
                match write_result {
                    Ok(()) => EXIT_SUCCESS,
                    Err(error) => {
                        eprintln!("Error writing the pairings: {}", error);
                        EXIT_FILE_ERROR
                    }
                }
            }
            Commands::Generate { system, config, output, seed, checklist } => {
                let system = match system.resolve() {
                    Ok(system) => system,
                    Err(message) => {
                        eprintln!("Error: {}", message);
                        return EXIT_INVALID_REQUEST;
                    }
                };
                let configuration = match config {
                    Some(path) => {
                        let file = match File::open(&path) {
                            Ok(file) => file,
                            Err(error) => return file_error(&path, &error),
                        };
                        let mut reader = BufReader::new(file);
                        match generator::read_configuration(&mut reader) {
                            Ok(configuration) => configuration,
                            Err(error) => return read_error(&path, error),
                        }
                    }
                    None => generator::Configuration::default(),
                };
                let mut rng = match seed {
                    Some(seed) => DeterministicRng::seed_from_u64(seed),
                    None => DeterministicRng::seed_from_u64(rand::thread_rng().gen()),
                };
                let mut checklist_file = match open_checklist(&checklist, &output) {
                    Ok(file) => file,
                    Err((path, error)) => return file_error(&path, &error),
                };
                let tournament = match generator::generate_tournament(
                    configuration,
                    system,
                    &mut rng,
                    checklist_file.as_mut().map(|file| file as &mut dyn Write),
                ) {
                    Ok(tournament) => tournament,
                    Err(error) => return pairing_error(error),
                };
                match File::create(&output) {
                    Ok(file) => {
                        let mut writer = BufWriter::new(file);
                        match trf::write_tournament(&tournament, &mut writer) {
                            Ok(()) => EXIT_SUCCESS,
                            Err(error) => {
                                eprintln!("Error writing {}: {}", output.display(), error);
                                EXIT_FILE_ERROR
                            }
                        }
                    }
                    Err(error) => file_error(&output, &error),
                }
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_arguments_are_consistent_1() {
        // cargo test cli_arguments_are_consistent_1 -- --nocapture
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_write_pairs_format_1() {
        // cargo test cli_write_pairs_format_1 -- --nocapture
        let pairs = vec![Pairing::new(0, 2), Pairing::new(1, 3), Pairing::new(4, 4)];
        let mut buffer = Vec::new();
        write_pairs(&pairs, false, &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "3\n1 3\n2 4\n5 0\n");
    }
}
