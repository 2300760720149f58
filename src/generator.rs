//! Tournament Generator
//!
//! Builds a synthetic tournament: random ratings, a pre-allocated plan of zero-point
//! byes (retirements) and half-point byes, and per-round results drawn from a
//! rating-difference model, pairing every round with the chosen Swiss system. The
//! configuration file uses `Key=Value` lines with `#` comments; rates express "one in N".
//!
//! Deterministic: the same seed and configuration always produce the same tournament.
//!

use std::io::{self, BufRead};

use rand::Rng;

use crate::error::{FileError, PairingError};
use crate::swiss::{self, SwissSystem};
use crate::tournament::{Color, Match, MatchScore, Player, Tournament};
use crate::util::*;

/// The options of a generator run. Unset values are randomized within the ranges the
/// original tool used.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub players_number: Option<PlayerIndex>,
    pub rounds_number: Option<RoundIndex>,
    /// percentage of played games ending in a draw, 0 to 100
    pub draw_percentage: Option<u32>,
    /// one game in this many is forfeited
    pub forfeit_rate: Option<f32>,
    /// one player in this many retires (receives zero-point byes)
    pub retired_rate: Option<f32>,
    /// one player in this many requests a half-point bye
    pub half_point_bye_rate: Option<f32>,
    pub highest_rating: Option<Rating>,
    pub lowest_rating: Option<Rating>,
    pub point_system: PointSystem,
    /// apply the Swiss system's default acceleration while generating
    pub accelerated: bool,
}

/// Read a generator configuration file.
pub fn read_configuration(reader: &mut dyn BufRead) -> Result<Configuration, FileError> {
    let mut configuration = Configuration::default();
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    // Whether an explicit PointsForPAB has been seen; a later PointsForWin must then
    // leave the pairing-allocated bye value alone.
    let mut use_pairing_allocated_bye_value = false;

    for line in content.split(['\n', '\r']) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| FileError::Format(format!("error parsing configuration line: {}", line)))?;
        let invalid = || {
            FileError::Format(format!(
                "the value for parameter \"{}\" in the configuration file is invalid",
                name
            ))
        };
        match name {
            "PlayersNumber" => {
                configuration.players_number = Some(value.trim().parse().map_err(|_| invalid())?);
            }
            "RoundsNumber" => {
                configuration.rounds_number = Some(value.trim().parse().map_err(|_| invalid())?);
            }
            "DrawPercentage" => {
                let percentage: u32 = value.trim().parse().map_err(|_| invalid())?;
                if percentage > 100 {
                    return Err(invalid());
                }
                configuration.draw_percentage = Some(percentage);
            }
            "ForfeitRate" => {
                let rate: f32 = value.trim().parse().map_err(|_| invalid())?;
                if rate < 1.0 {
                    return Err(invalid());
                }
                configuration.forfeit_rate = Some(rate);
            }
            "RetiredRate" => {
                let rate: f32 = value.trim().parse().map_err(|_| invalid())?;
                if rate < 2.0 {
                    return Err(invalid());
                }
                configuration.retired_rate = Some(rate);
            }
            // the misspelled alias is accepted for input compatibility, never written
            "HalfPointByeRate" | "HalfPointByteRate" => {
                let rate: f32 = value.trim().parse().map_err(|_| invalid())?;
                if rate < 1.0 {
                    return Err(invalid());
                }
                configuration.half_point_bye_rate = Some(rate);
            }
            "HighestRating" => {
                configuration.highest_rating = Some(value.trim().parse().map_err(|_| invalid())?);
            }
            "LowestRating" => {
                configuration.lowest_rating = Some(value.trim().parse().map_err(|_| invalid())?);
            }
            "PointsForWin" => {
                configuration.point_system.points_for_win = parse_points(value).ok_or_else(invalid)?;
                if !use_pairing_allocated_bye_value {
                    configuration.point_system.points_for_pairing_allocated_bye =
                        configuration.point_system.points_for_win;
                }
            }
            "PointsForDraw" => {
                configuration.point_system.points_for_draw = parse_points(value).ok_or_else(invalid)?;
            }
            "PointsForLoss" => {
                configuration.point_system.points_for_loss = parse_points(value).ok_or_else(invalid)?;
            }
            "PointsForZPB" => {
                configuration.point_system.points_for_zero_point_bye =
                    parse_points(value).ok_or_else(invalid)?;
            }
            "PointsForForfeitLoss" => {
                configuration.point_system.points_for_forfeit_loss =
                    parse_points(value).ok_or_else(invalid)?;
            }
            "PointsForPAB" => {
                configuration.point_system.points_for_pairing_allocated_bye =
                    parse_points(value).ok_or_else(invalid)?;
                use_pairing_allocated_bye_value = true;
            }
            "Accelerated" => {
                configuration.accelerated = match value.trim() {
                    "1" => true,
                    "0" => false,
                    _ => return Err(invalid()),
                };
            }
            _ => {
                return Err(FileError::Format(format!(
                    "unexpected parameter \"{}\" in configuration file",
                    name
                )));
            }
        }
    }
    Ok(configuration)
}

fn parse_points(value: &str) -> Option<Points> {
    let trimmed = value.trim();
    let (whole, tenth) = match trimmed.split_once('.') {
        Some((whole, fraction)) if fraction.len() == 1 => (whole, fraction.parse::<Points>().ok()?),
        Some(_) => return None,
        None => (trimmed, 0),
    };
    let whole: Points = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let result = whole * 10 + tenth;
    (result <= MAX_POINTS).then_some(result)
}

/// How many of `count` items a "one in N" rate selects.
fn apply_rate(count: usize, rate: f32) -> usize {
    (count as f32 / rate) as usize
}

/// The complementary error function, by the Abramowitz and Stegun rational
/// approximation; accurate to a few 1e-7, far below the noise of the result model.
fn erfc(x: f32) -> f32 {
    let sign_flip = x < 0.0;
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let polynomial = t
        * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let result = polynomial * (-x * x).exp();
    if sign_flip {
        2.0 - result
    } else {
        result
    }
}

/// Generate a tournament of `rounds` rounds, pairing each round with `system` and
/// drawing results from the configured model.
pub fn generate_tournament<'a, 'b: 'a>(
    configuration: Configuration,
    system: SwissSystem,
    rng: &mut DeterministicRng,
    mut checklist: Option<&'a mut (dyn io::Write + 'b)>,
) -> Result<Tournament, PairingError> {
    let players_number = configuration
        .players_number
        .unwrap_or_else(|| rng.gen_range(15..=215) as PlayerIndex);
    let rounds_number = configuration.rounds_number.unwrap_or_else(|| rng.gen_range(5..=15));
    let forfeit_rate = configuration.forfeit_rate.unwrap_or_else(|| rng.gen_range(6..=30) as f32);
    let retired_rate = configuration.retired_rate.unwrap_or_else(|| rng.gen_range(15..=3225) as f32);
    let half_point_bye_rate = configuration
        .half_point_bye_rate
        .unwrap_or_else(|| rng.gen_range(15..=3225) as f32);
    let draw_percentage = configuration.draw_percentage.unwrap_or_else(|| rng.gen_range(10..=50));
    let highest_rating = configuration.highest_rating.unwrap_or_else(|| rng.gen_range(2400..=2800));
    let lowest_rating = configuration.lowest_rating.unwrap_or_else(|| rng.gen_range(1400..=2300));
    if players_number as usize > MAX_PLAYERS as usize {
        return Err(PairingError::BuildLimitExceeded(format!(
            "this build supports at most {} players",
            MAX_PLAYERS
        )));
    }
    if rounds_number > MAX_ROUNDS {
        return Err(PairingError::BuildLimitExceeded(format!(
            "this build supports at most {} rounds",
            MAX_ROUNDS
        )));
    }
    let (lowest_rating, highest_rating) = if lowest_rating <= highest_rating {
        (lowest_rating, highest_rating)
    } else {
        (highest_rating, lowest_rating)
    };

    log::debug!(
        "generating {} players, {} rounds, ratings {}..{}",
        players_number,
        rounds_number,
        lowest_rating,
        highest_rating
    );

    let mut result = Tournament::new();
    result.expected_rounds = rounds_number;
    result.point_system = configuration.point_system;
    result.default_acceleration = configuration.accelerated;
    result.initial_color = if rng.gen::<bool>() { Color::Black } else { Color::White };

    // Pairing numbers are assigned in rating order.
    let mut ratings: Vec<Rating> =
        (0..players_number).map(|_| rng.gen_range(lowest_rating..=highest_rating)).collect();
    ratings.sort_unstable_by(|a, b| b.cmp(a));
    for (id, rating) in ratings.into_iter().enumerate() {
        result.players.push(Player::new(id as PlayerIndex, 0, rating, Vec::new()));
        result.players_by_rank.push(id as PlayerIndex);
    }

    let player_count = result.players.len();

    // Pre-allocate zero-point byes (retirements), then half-point byes, by repeatedly
    // picking a random eligible game.
    let initial_remaining_count: RoundIndex = if rounds_number < 2 {
        0
    } else if rounds_number < 3 {
        1
    } else {
        rounds_number - 2
    };
    let mut zero_point_bye_counts: Vec<RoundIndex> = vec![0; player_count];
    let mut half_point_bye_counts: Vec<RoundIndex> = vec![0; player_count];
    let mut remaining_counts: Vec<RoundIndex> = vec![initial_remaining_count; player_count];
    let mut eligible_games = initial_remaining_count * player_count;

    let mut remaining_players = apply_rate(player_count, retired_rate);
    while initial_remaining_count > 0 && remaining_players > 0 {
        debug_assert!(eligible_games > 0);
        let mut game_index = rng.gen_range(0..eligible_games);
        let mut player_index = 0usize;
        for &player_eligible_games in remaining_counts.iter() {
            if game_index < player_eligible_games {
                break;
            }
            game_index -= player_eligible_games;
            player_index += 1;
        }
        eligible_games -= 1;
        remaining_counts[player_index] -= 1;
        zero_point_bye_counts[player_index] += 1;
        if zero_point_bye_counts[player_index] == 1 {
            remaining_players -= 1;
        }
    }

    if rounds_number > 2 {
        for player_eligible_games in remaining_counts.iter_mut() {
            *player_eligible_games += 1;
        }
        eligible_games += player_count;
    }
    remaining_players = apply_rate(player_count, half_point_bye_rate);
    while remaining_players > 0 && eligible_games > 0 {
        let mut game_index = rng.gen_range(0..eligible_games);
        let mut player_index = 0usize;
        for &player_eligible_games in remaining_counts.iter() {
            if game_index < player_eligible_games {
                break;
            }
            game_index -= player_eligible_games;
            player_index += 1;
        }
        eligible_games -= 1;
        remaining_counts[player_index] -= 1;
        half_point_bye_counts[player_index] += 1;
        if half_point_bye_counts[player_index] == 1 {
            remaining_players -= 1;
        }
    }

    // Pair and play each round.
    for round_index in 0..rounds_number {
        result.played_rounds = round_index;

        // Hand out the planned byes for this round.
        for rank_position in 0..player_count {
            let player_id = result.players_by_rank[rank_position];
            let player = &mut result.players[player_id as usize];
            if round_index + 1 < rounds_number
                && rng.gen_range(0..=(rounds_number - round_index - 2)) < half_point_bye_counts[rank_position]
            {
                player.matches.push(Match::new(
                    player.id,
                    Color::None,
                    MatchScore::Draw,
                    false,
                    false,
                ));
                half_point_bye_counts[rank_position] -= 1;
            } else if rng
                .gen_range(
                    0..=(rounds_number - round_index)
                        .saturating_sub(half_point_bye_counts[rank_position] + 1),
                )
                < zero_point_bye_counts[rank_position]
            {
                player.matches.push(Match::new(
                    player.id,
                    Color::None,
                    MatchScore::Loss,
                    false,
                    false,
                ));
                zero_point_bye_counts[rank_position] -= 1;
            }
        }

        result.update_ranks();
        result.compute_player_data();
        if result.default_acceleration {
            swiss::update_accelerations(system, &mut result, round_index)?;
        }

        let matching = swiss::compute_matching(system, result.clone(), checklist.as_deref_mut())
            .map_err(|error| match error {
                PairingError::NoValidPairing(reason) => PairingError::NoValidPairing(format!(
                    "no valid pairing exists for round {} of the generated tournament: {}",
                    round_index + 1,
                    reason
                )),
                other => other,
            })?;

        // Generate the game results.
        for pair in matching.iter() {
            if pair.is_bye() {
                result.players[pair.white as usize].matches.push(Match::new(
                    pair.white,
                    Color::None,
                    MatchScore::Win,
                    false,
                    true,
                ));
                continue;
            }
            let non_forfeit_probability = (1.0 - 1.0 / forfeit_rate).sqrt();
            let mut result_for_white = if rng.gen::<f32>() >= non_forfeit_probability {
                MatchScore::Loss
            } else {
                MatchScore::Win
            };
            let mut result_for_black = if rng.gen::<f32>() >= non_forfeit_probability {
                MatchScore::Loss
            } else {
                MatchScore::Win
            };
            let forfeit =
                result_for_white == MatchScore::Loss || result_for_black == MatchScore::Loss;
            if !forfeit {
                let white_rating = result.players[pair.white as usize].rating;
                let black_rating = result.players[pair.black as usize].rating;
                let stronger_player =
                    if black_rating > white_rating { Color::Black } else { Color::White };
                let rating_difference = if stronger_player == Color::Black {
                    black_rating - white_rating
                } else {
                    white_rating - black_rating
                };
                let expected_value_of_result =
                    erfc(rating_difference as f32 * (-7.0 / std::f32::consts::SQRT_2 / 2000.0)) / 2.0;
                let draw_probability = (draw_percentage as f32 / 100.0)
                    .min(2.0 - expected_value_of_result * 2.0);
                let random_value = rng.gen::<f32>();
                if random_value < draw_probability {
                    result_for_white = MatchScore::Draw;
                } else {
                    result_for_white = if (random_value
                        < expected_value_of_result + draw_probability / 2.0)
                        ^ (stronger_player == Color::Black)
                    {
                        MatchScore::Win
                    } else {
                        MatchScore::Loss
                    };
                }
                result_for_black = result_for_white.invert();
            }
            result.players[pair.white as usize].matches.push(Match::new(
                pair.black,
                Color::White,
                result_for_white,
                !forfeit,
                true,
            ));
            result.players[pair.black as usize].matches.push(Match::new(
                pair.white,
                Color::Black,
                result_for_black,
                !forfeit,
                true,
            ));
        }

        // Update the scores.
        for player_index in 0..player_count {
            let player = &result.players[player_index];
            if player.matches.len() <= round_index {
                // an unpaired player sits the round out
                result.players[player_index]
                    .matches
                    .push(Match::unpaired(player_index as PlayerIndex));
            }
            let player = &result.players[player_index];
            let new_points = result.points_for(player, player.matches.last().expect("round was played"));
            result.players[player_index].score_without_acceleration += new_points;
        }
    }

    result.played_rounds = rounds_number;
    result.update_ranks();
    result.compute_player_data();
    Ok(result)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn generator_configuration_sticky_pab_1() {
        // cargo test generator_configuration_sticky_pab_1 -- --nocapture
        // an explicit PointsForPAB survives a later PointsForWin
        let content = "PointsForPAB=0.0\nPointsForWin=2.0\n";
        let mut reader = std::io::BufReader::new(content.as_bytes());
        let configuration = read_configuration(&mut reader).unwrap();
        assert_eq!(configuration.point_system.points_for_win, 20);
        assert_eq!(configuration.point_system.points_for_pairing_allocated_bye, 0);

        // without it, PointsForWin sets both
        let content = "PointsForWin=2.0\n";
        let mut reader = std::io::BufReader::new(content.as_bytes());
        let configuration = read_configuration(&mut reader).unwrap();
        assert_eq!(configuration.point_system.points_for_pairing_allocated_bye, 20);
    }

    #[test]
    fn generator_configuration_byte_rate_alias_1() {
        // cargo test generator_configuration_byte_rate_alias_1 -- --nocapture
        let content = "HalfPointByteRate=12\n";
        let mut reader = std::io::BufReader::new(content.as_bytes());
        let configuration = read_configuration(&mut reader).unwrap();
        assert_eq!(configuration.half_point_bye_rate, Some(12.0));
    }

    #[test]
    fn generator_small_tournament_is_consistent_1() {
        // cargo test generator_small_tournament_is_consistent_1 -- --nocapture
        let configuration = Configuration {
            players_number: Some(8),
            rounds_number: Some(3),
            draw_percentage: Some(30),
            forfeit_rate: Some(1000.0),
            retired_rate: Some(1000.0),
            half_point_bye_rate: Some(1000.0),
            highest_rating: Some(2200),
            lowest_rating: Some(1800),
            ..Configuration::default()
        };
        let mut rng = DeterministicRng::seed_from_u64(42);
        let tournament =
            generate_tournament(configuration, SwissSystem::Dutch, &mut rng, None).unwrap();
        assert_eq!(tournament.players.len(), 8);
        assert_eq!(tournament.played_rounds, 3);
        for player in tournament.players.iter() {
            assert_eq!(player.matches.len(), 3);
            let mut points = 0;
            for game in player.matches.iter() {
                points += tournament.points_for(player, game);
            }
            assert_eq!(points, player.score_without_acceleration);
        }
    }

    #[test]
    fn generator_is_deterministic_1() {
        // cargo test generator_is_deterministic_1 -- --nocapture
        let configuration = Configuration {
            players_number: Some(7),
            rounds_number: Some(2),
            forfeit_rate: Some(50.0),
            retired_rate: Some(50.0),
            half_point_bye_rate: Some(50.0),
            ..Configuration::default()
        };
        let mut first_rng = DeterministicRng::seed_from_u64(7);
        let first =
            generate_tournament(configuration.clone(), SwissSystem::Burstein, &mut first_rng, None)
                .unwrap();
        let mut second_rng = DeterministicRng::seed_from_u64(7);
        let second =
            generate_tournament(configuration, SwissSystem::Burstein, &mut second_rng, None).unwrap();
        let mut first_output = Vec::new();
        crate::trf::write_tournament(&first, &mut first_output).unwrap();
        let mut second_output = Vec::new();
        crate::trf::write_tournament(&second, &mut second_output).unwrap();
        assert_eq!(first_output, second_output);
    }
}
