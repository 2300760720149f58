//! Swiss System Common Utilities
//!
//! The pieces shared by the rule families: the dispatch enum, the pairing type, the color
//! rules every system applies before its own tie-breaks, bye eligibility, the published
//! sort order of a round's pairings, and the checklist table printer.
//!

use std::io;

use serde::{Deserialize, Serialize};

use crate::burstein;
use crate::dutch;
use crate::error::PairingError;
use crate::matching::MatchingComputer;
use crate::tournament::{unaccelerated_score_rank_compare, Color, Player, Tournament};
use crate::util::*;
use crate::wide_uint::EdgeWeight;

/// The supported rule families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwissSystem {
    Dutch,
    Burstein,
}

/// The assignment of two players to play each other, with colors chosen. Equal ids denote
/// the pairing-allocated bye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub white: PlayerIndex,
    pub black: PlayerIndex,
}

impl Pairing {
    pub fn new(white: PlayerIndex, black: PlayerIndex) -> Self {
        Self { white, black }
    }

    /// Build a pairing from an unordered pair and the color chosen for `player0`.
    pub fn with_color(player0: PlayerIndex, player1: PlayerIndex, player0_color: Color) -> Self {
        if player0_color == Color::White {
            Self { white: player0, black: player1 }
        } else {
            Self { white: player1, black: player0 }
        }
    }

    pub fn is_bye(&self) -> bool {
        self.white == self.black
    }
}

/// Compute the pairing of the next round under the chosen rule family. The returned list
/// is sorted in the published order. If `checklist` is given, a checklist table is
/// written to it.
pub fn compute_matching<'a, 'b: 'a>(
    system: SwissSystem,
    tournament: Tournament,
    checklist: Option<&'a mut (dyn io::Write + 'b)>,
) -> Result<Vec<Pairing>, PairingError> {
    log::debug!(
        "pairing round {} of {} for {} players under the {:?} system",
        tournament.played_rounds + 1,
        tournament.expected_rounds,
        tournament.players_by_rank.len(),
        system,
    );
    match system {
        SwissSystem::Dutch => dutch::compute_matching(tournament, checklist),
        SwissSystem::Burstein => burstein::compute_matching(tournament, checklist),
    }
}

/// Assign the accelerations the rule family defines for the round about to be paired.
/// Dutch defines none, so the call is a no-op there.
pub fn update_accelerations(
    system: SwissSystem,
    tournament: &mut Tournament,
    round_index: RoundIndex,
) -> Result<(), PairingError> {
    match system {
        SwissSystem::Dutch => Ok(()),
        SwissSystem::Burstein => burstein::update_accelerations(tournament, round_index),
    }
}

/// Whether two players' color preferences permit them to meet without one of them
/// receiving a color against their preference.
pub fn color_preferences_are_compatible(preference0: Color, preference1: Color) -> bool {
    preference0 != preference1 || preference0 == Color::None || preference1 == Color::None
}

/// Whether the player may receive the pairing-allocated bye: none of their previous byes
/// or forfeits may have scored a full point.
pub fn eligible_for_bye(player: &Player) -> bool {
    for game in player.matches.iter() {
        if !game.game_was_played
            && game.participated_in_pairing
            && game.match_score == crate::tournament::MatchScore::Win
        {
            return false;
        }
    }
    true
}

/// Find the colors of the two players on the most recent round in which their colors
/// differed, skipping unplayed games. Either color is `None` when a history runs out.
pub fn find_first_color_difference(player0: &Player, player1: &Player) -> (Color, Color) {
    let mut games0 = player0.matches.iter().rev().filter(|game| game.game_was_played);
    let mut games1 = player1.matches.iter().rev().filter(|game| game.game_was_played);
    loop {
        match (games0.next(), games1.next()) {
            (Some(game0), Some(game1)) => {
                if game0.color != game1.color {
                    return (game0.color, game1.color);
                }
            }
            (game0, game1) => {
                return (
                    game0.map_or(Color::None, |game| game.color),
                    game1.map_or(Color::None, |game| game.color),
                );
            }
        }
    }
}

/// The color given to `player` against `opponent` by the rules shared between the
/// systems, or `None` if the players' preferences offer no grounds for a decision even
/// going back through their histories.
pub fn choose_player_neutral_color(player: &Player, opponent: &Player) -> Color {
    if color_preferences_are_compatible(player.color_preference, opponent.color_preference) {
        if player.color_preference != Color::None {
            player.color_preference
        } else if opponent.color_preference != Color::None {
            opponent.color_preference.invert()
        } else {
            Color::None
        }
    } else if player.absolute_color_preference()
        && (player.color_imbalance > opponent.color_imbalance || !opponent.absolute_color_preference())
    {
        player.color_preference
    } else if opponent.absolute_color_preference()
        && (opponent.color_imbalance > player.color_imbalance || !player.absolute_color_preference())
    {
        opponent.color_preference.invert()
    } else if player.strong_color_preference && !opponent.strong_color_preference {
        player.color_preference
    } else if opponent.strong_color_preference && !player.strong_color_preference {
        opponent.color_preference.invert()
    } else {
        let (player_color, opponent_color) = find_first_color_difference(player, opponent);
        if player_color != Color::None && opponent_color != Color::None {
            opponent_color
        } else {
            Color::None
        }
    }
}

/// Sort the pairings into the order used when publishing a round: byes last, then by
/// the higher player's score, the lower player's score, and the higher player's rank.
pub fn sort_results(pairs: &mut [Pairing], tournament: &Tournament) {
    pairs.sort_by(|pair0, pair1| {
        let higher0 = if unaccelerated_score_rank_compare(
            &tournament.players[pair0.white as usize],
            &tournament.players[pair0.black as usize],
        ) {
            pair0.black
        } else {
            pair0.white
        };
        let higher1 = if unaccelerated_score_rank_compare(
            &tournament.players[pair1.white as usize],
            &tournament.players[pair1.black as usize],
        ) {
            pair1.black
        } else {
            pair1.white
        };
        let lower0 = if pair0.white == higher0 { pair0.black } else { pair0.white };
        let lower1 = if pair1.white == higher1 { pair1.black } else { pair1.white };

        (
            pair0.is_bye(),
            tournament.players[higher1 as usize].score_without_acceleration,
            tournament.players[lower1 as usize].score_without_acceleration,
            tournament.players[higher0 as usize].rank_index,
        )
            .cmp(&(
                pair1.is_bye(),
                tournament.players[higher0 as usize].score_without_acceleration,
                tournament.players[lower0 as usize].score_without_acceleration,
                tournament.players[higher1 as usize].rank_index,
            ))
    });
}

/// Set the edge between the two vertices to `default_weight` and clear every other edge
/// incident on either, freezing the pair into any further matching.
pub fn finalize_pair<W: EdgeWeight>(
    vertex0: VertexIndex,
    vertex1: VertexIndex,
    computer: &mut MatchingComputer<W>,
    default_weight: W,
) {
    for unpaired in 0..computer.size() {
        if unpaired != vertex0 {
            let weight = if unpaired == vertex1 { default_weight.clone() } else { W::default() };
            computer.set_edge_weight(vertex0, unpaired, weight);
        }
        if unpaired != vertex1 {
            let weight = if unpaired == vertex0 { default_weight.clone() } else { W::default() };
            computer.set_edge_weight(vertex1, unpaired, weight);
        }
    }
}

/// Format a ten-times score with one decimal place.
pub fn format_points(points: Points) -> String {
    format!("{}.{}", points / 10, points % 10)
}

fn checklist_header(specialty_headers: &[String], tournament: &Tournament) -> Vec<String> {
    let mut result = vec![
        "ID".to_string(),
        "Pts".to_string(),
        "-".repeat(tournament.played_rounds + 1),
        "Pref".to_string(),
    ];
    result.extend_from_slice(specialty_headers);
    result.push(String::new());
    for round_index in 0..tournament.played_rounds {
        result.push(format!("R{}", round_index + 1));
    }
    result
}

fn checklist_row(specialty_columns: Vec<String>, player: &Player, tournament: &Tournament) -> Vec<String> {
    let mut color_string = String::new();
    for game in player.matches.iter() {
        if game.game_was_played {
            color_string.push(if game.color == Color::White { 'W' } else { 'B' });
        }
    }
    let preference_is_white = player.color_preference == Color::White;
    let preference = if player.absolute_color_preference() {
        if preference_is_white { "W " } else { "B " }
    } else if player.strong_color_preference {
        if preference_is_white { "(W)" } else { "(B)" }
    } else if player.color_preference == Color::None {
        "A "
    } else if preference_is_white {
        "w "
    } else {
        "b "
    };
    let mut result = vec![
        format!("{}", player.id + 1),
        format_points(player.score_with_acceleration(tournament)),
        color_string,
        preference.to_string(),
    ];
    result.extend(specialty_columns);
    result.push(String::new());
    for round_index in 0..tournament.played_rounds {
        result.push(if player.matches[round_index].game_was_played {
            format!("{}", player.matches[round_index].opponent + 1)
        } else {
            String::new()
        });
    }
    result
}

fn print_row(output: &mut dyn io::Write, row: &[String], widths: &[usize]) -> io::Result<()> {
    for (cell, &width) in row.iter().zip(widths.iter()) {
        write!(output, "{:>width$}\t", cell, width = width)?;
    }
    Ok(())
}

/// Write the checklist table for the current round: one row per player in the given
/// order, with an extra line break between scoregroups.
pub fn print_checklist(
    output: &mut dyn io::Write,
    specialty_headers: &[String],
    specialty_values: &dyn Fn(&Player) -> Vec<String>,
    tournament: &Tournament,
    ordered_players: &[&Player],
) -> io::Result<()> {
    let header = checklist_header(specialty_headers, tournament);
    let mut column_widths: Vec<usize> = header.iter().map(|cell| cell.len()).collect();
    for player in ordered_players {
        let row = checklist_row(specialty_values(player), player, tournament);
        for (width, cell) in column_widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    writeln!(output)?;
    print_row(output, &header, &column_widths)?;
    let mut previous_score: Option<Points> = None;
    for player in ordered_players {
        writeln!(output)?;
        let score = player.score_with_acceleration(tournament);
        if previous_score != Some(score) {
            writeln!(output)?;
        }
        let row = checklist_row(specialty_values(player), player, tournament);
        print_row(output, &row, &column_widths)?;
        previous_score = Some(score);
    }
    writeln!(output)?;
    writeln!(output)?;
    writeln!(output)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::tournament::{Match, MatchScore};

    #[test]
    fn swiss_color_compatibility_1() {
        // cargo test swiss_color_compatibility_1 -- --nocapture
        assert!(color_preferences_are_compatible(Color::White, Color::Black));
        assert!(color_preferences_are_compatible(Color::None, Color::None));
        assert!(color_preferences_are_compatible(Color::White, Color::None));
        assert!(!color_preferences_are_compatible(Color::White, Color::White));
        assert!(!color_preferences_are_compatible(Color::Black, Color::Black));
    }

    #[test]
    fn swiss_bye_eligibility_1() {
        // cargo test swiss_bye_eligibility_1 -- --nocapture
        let mut player = Player::new(0, 10, 0, Vec::new());
        assert!(eligible_for_bye(&player));
        // a half-point bye does not disqualify
        player.matches.push(Match::new(0, Color::None, MatchScore::Draw, false, false));
        assert!(eligible_for_bye(&player));
        // an earlier pairing-allocated bye does
        player.matches.push(Match::new(0, Color::None, MatchScore::Win, false, true));
        assert!(!eligible_for_bye(&player));
    }

    #[test]
    fn swiss_sort_results_byes_last_1() {
        // cargo test swiss_sort_results_byes_last_1 -- --nocapture
        let mut tournament = Tournament::new();
        for (id, score) in [(0, 20), (1, 10), (2, 20), (3, 10), (4, 0)] {
            let mut player = Player::new(id, score, 0, Vec::new());
            player.rank_index = id;
            tournament.players.push(player);
            tournament.players_by_rank.push(id);
        }
        let mut pairs = vec![Pairing::new(4, 4), Pairing::new(1, 3), Pairing::new(0, 2)];
        sort_results(&mut pairs, &tournament);
        assert_eq!(pairs, vec![Pairing::new(0, 2), Pairing::new(1, 3), Pairing::new(4, 4)]);
    }

    #[test]
    fn swiss_neutral_color_last_difference_1() {
        // cargo test swiss_neutral_color_last_difference_1 -- --nocapture
        // both players drew white-black-white histories offset by one round, so the most
        // recent differing round decides: the opponent had white there, player takes white
        let player = Player::new(0, 10, 0, vec![
            Match::new(2, Color::White, MatchScore::Draw, true, true),
            Match::new(3, Color::Black, MatchScore::Draw, true, true),
        ]);
        let opponent = Player::new(1, 10, 0, vec![
            Match::new(4, Color::Black, MatchScore::Draw, true, true),
            Match::new(5, Color::White, MatchScore::Draw, true, true),
        ]);
        let (color0, color1) = find_first_color_difference(&player, &opponent);
        assert_eq!((color0, color1), (Color::Black, Color::White));
    }
}
