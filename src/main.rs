use clap::Parser;

use swiss_pairings::cli::Cli;

pub fn main() {
    env_logger::init();
    std::process::exit(Cli::parse().run());
}
