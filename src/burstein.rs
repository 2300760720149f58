//! Burstein System
//!
//! The orchestrator for the Burstein system. Players are ranked inside a scoregroup by
//! Sonneborn-Berger, then Buchholz and Median weighted by the player's own score, then
//! pairing number. Scoregroups are built top-down and greedily merged with the group
//! below whenever the tentative matching shows the group cannot be paired legally; once
//! every group validates, a local pass orders opponents within each group so the top of
//! the group meets the bottom.
//!
//! The edge weight is a fixed-width integer of three fields plus a low priority band:
//! `compatible`, `same scoregroup`, `compatible due colors`, and the neighbor priority
//! assigned during the ordering pass.
//!
//! As in the Dutch orchestrator, previously played opponents are forbidden on the first
//! attempt and allowed again if the round is otherwise unpairable.
//!

use std::io;

use crate::error::PairingError;
use crate::matching::MatchingComputer;
use crate::swiss::{
    color_preferences_are_compatible, find_first_color_difference, format_points,
    print_checklist, sort_results, Pairing,
};
use crate::tournament::{Color, MatchScore, Player, Tournament};
use crate::util::*;

const PREFERENCE_SIZE: u64 = MAX_PLAYERS as u64 - (MAX_PLAYERS as u64 & 1);
const COLOR_COUNT_SIZE: u64 = MAX_PLAYERS as u64 / 2 + 1;
const SAME_SCORE_GROUP_SIZE: u64 = MAX_PLAYERS as u64 / 2 + 1;

const SAME_SCORE_GROUP_MULTIPLIER: u64 = PREFERENCE_SIZE * COLOR_COUNT_SIZE;
const COMPATIBLE_MULTIPLIER: u64 = SAME_SCORE_GROUP_MULTIPLIER * SAME_SCORE_GROUP_SIZE;
const COLOR_MULTIPLIER: u64 = PREFERENCE_SIZE;

/// A score where unplayed games count as draws, stored as ten times the value.
type AdjustedScore = u64;
/// The product of a score and a sum of adjusted scores, stored as a hundred times the
/// value.
type PointsProduct = u64;

/// Assign the Burstein acceleration for the round about to be paired: in the first two
/// rounds the top half of the ranking receives the value of a win.
pub fn update_accelerations(
    tournament: &mut Tournament,
    round_index: RoundIndex,
) -> Result<(), PairingError> {
    if tournament.point_system.points_for_win < tournament.point_system.points_for_draw {
        return Err(PairingError::UnapplicableFeature(
            "Burstein acceleration assumes a win is worth at least a draw".to_string(),
        ));
    }
    if round_index >= 2 {
        return Ok(());
    }
    let rank_bound = tournament.players.iter().filter(|player| player.is_valid).count();
    for player in tournament.players.iter_mut() {
        if !player.is_valid {
            continue;
        }
        while player.accelerations.len() <= round_index {
            player.accelerations.push(0);
        }
        player.accelerations[round_index] = if (player.rank_index as usize) < rank_bound >> 1 {
            tournament.point_system.points_for_win
        } else {
            0
        };
    }
    Ok(())
}

/// The points of a game where an unplayed game counts as a draw.
fn adjusted_points(game: &crate::tournament::Match, tournament: &Tournament) -> Points {
    if game.game_was_played {
        tournament.match_points(game.match_score)
    } else {
        tournament.point_system.points_for_draw
    }
}

fn calculate_sonneborn_berger(
    player: &Player,
    tournament: &Tournament,
    adjusted_scores: &[AdjustedScore],
) -> PointsProduct {
    if !player.is_valid {
        return 0;
    }
    let mut score_so_far = player.acceleration(tournament) as u64;
    let mut result: PointsProduct = 0;
    let mut future_virtual_points =
        tournament.played_rounds as u64 * tournament.point_system.points_for_draw as u64;
    for game in player.matches.iter().take(tournament.played_rounds) {
        future_virtual_points -= tournament.point_system.points_for_draw as u64;
        let game_points = tournament.match_points(game.match_score) as u64;
        if game.game_was_played {
            result += adjusted_scores[game.opponent as usize] * game_points;
        } else {
            result += game_points
                * (score_so_far
                    + tournament.match_points(game.match_score.invert()) as u64
                    + future_virtual_points);
        }
        score_so_far += game_points;
    }
    result
}

fn calculate_buchholz_tiebreak(
    player: &Player,
    tournament: &Tournament,
    adjusted_scores: &[AdjustedScore],
    median: bool,
) -> PointsProduct {
    if !player.is_valid || (median && tournament.played_rounds <= 2) {
        return 0;
    }
    let mut score_so_far = player.acceleration(tournament) as u64;
    let mut result: PointsProduct = 0;
    let mut future_virtual_points =
        tournament.played_rounds as u64 * tournament.point_system.points_for_draw as u64;
    let mut min_adjustment = u64::MAX;
    let mut max_adjustment = 0u64;
    for game in player.matches.iter().take(tournament.played_rounds) {
        future_virtual_points -= tournament.point_system.points_for_draw as u64;
        let adjustment = if game.game_was_played {
            adjusted_scores[game.opponent as usize]
        } else {
            score_so_far
                + tournament.match_points(game.match_score.invert()) as u64
                + future_virtual_points
        };
        result += adjustment;
        min_adjustment = min_adjustment.min(adjustment);
        max_adjustment = max_adjustment.max(adjustment);
        score_so_far += tournament.match_points(game.match_score) as u64;
    }
    if median {
        result -= min_adjustment;
        result -= max_adjustment;
    }
    result
}

/// A player's accelerated score, tiebreak values and pairing number, used to order
/// players within a scoregroup (including a floater from a higher scoregroup).
#[derive(Debug, Clone)]
struct MetricScores {
    player_score: Points,
    sonneborn_berger: PointsProduct,
    buchholz_tiebreak: PointsProduct,
    median_tiebreak: PointsProduct,
    rank_index: PlayerIndex,
}

impl MetricScores {
    fn new(player: &Player, tournament: &Tournament, adjusted_scores: &[AdjustedScore]) -> Self {
        Self {
            player_score: player.score_with_acceleration(tournament),
            sonneborn_berger: calculate_sonneborn_berger(player, tournament, adjusted_scores),
            buchholz_tiebreak: calculate_buchholz_tiebreak(player, tournament, adjusted_scores, false),
            median_tiebreak: calculate_buchholz_tiebreak(player, tournament, adjusted_scores, true),
            rank_index: player.rank_index,
        }
    }

    fn buchholz_score(&self) -> PointsProduct {
        self.buchholz_tiebreak * self.player_score as u64
    }

    fn median_score(&self) -> PointsProduct {
        self.median_tiebreak * self.player_score as u64
    }

    /// Compare two players of the same scoregroup, a floater included.
    fn less_than(&self, other: &MetricScores) -> bool {
        if self.player_score == other.player_score {
            (
                self.sonneborn_berger,
                self.buchholz_tiebreak,
                self.median_tiebreak,
                other.rank_index,
            ) < (
                other.sonneborn_berger,
                other.buchholz_tiebreak,
                other.median_tiebreak,
                self.rank_index,
            )
        } else {
            (
                self.sonneborn_berger,
                self.buchholz_score(),
                self.median_score(),
                other.rank_index,
            ) < (
                other.sonneborn_berger,
                other.buchholz_score(),
                other.median_score(),
                self.rank_index,
            )
        }
    }
}

/// The weight of the edge between two players assumed eligible to be paired. The low
/// band is reserved for the neighbor priorities of the ordering pass.
fn compute_edge_weight(
    player0: &Player,
    player1: &Player,
    same_score_group: bool,
    use_due_color: bool,
    forbidden: &[std::collections::HashSet<PlayerIndex>],
) -> u64 {
    if forbidden[player0.id as usize].contains(&player1.id)
        || (player0.absolute_color_preference()
            && player1.absolute_color_preference()
            && player0.color_preference == player1.color_preference)
    {
        0
    } else {
        COMPATIBLE_MULTIPLIER
            + same_score_group as u64 * SAME_SCORE_GROUP_MULTIPLIER
            + (same_score_group
                && use_due_color
                && color_preferences_are_compatible(player0.color_preference, player1.color_preference))
                as u64
                * COLOR_MULTIPLIER
    }
}

/// Check, for all scoregroups of the tentative matching, that all players are matched
/// (except possibly one in the lowest boundary group) and that at most one floater
/// descends from each scoregroup.
fn check_matching_is_valid(matching: &[VertexIndex], score_groups: &[usize]) -> bool {
    debug_assert_eq!(score_groups[0], 0);
    let mut boundary_position = 0usize;
    let mut unmatched_player_count = 0u8;
    let mut score_group_begin = 0usize;
    let last_boundary = *score_groups.last().expect("boundary list is non-empty");
    let second_last_boundary = score_groups[score_groups.len() - 2];
    for (vertex_index, &matched_index) in matching.iter().enumerate() {
        if vertex_index >= last_boundary {
            return true;
        }
        if vertex_index >= score_groups[boundary_position] {
            unmatched_player_count = 0;
            score_group_begin = vertex_index;
            while vertex_index >= score_groups[boundary_position] {
                boundary_position += 1;
            }
        }
        if vertex_index == matched_index && vertex_index < second_last_boundary {
            return false;
        }
        if vertex_index == matched_index
            || matched_index < score_group_begin
            || matched_index >= score_groups[boundary_position]
        {
            unmatched_player_count += 1;
            let allowed = if score_groups[boundary_position] & 1 == 1 { 2 } else { 1 };
            if unmatched_player_count > allowed {
                return false;
            }
        }
    }
    true
}

/// The color given to `player` against `opponent`, breaking a no-difference tie by the
/// tiebreak metrics instead of rank parity.
fn choose_player_color(
    player: &Player,
    opponent: &Player,
    tournament: &Tournament,
    metric_scores: &[MetricScores],
) -> Color {
    if color_preferences_are_compatible(player.color_preference, opponent.color_preference) {
        if player.color_preference != Color::None {
            player.color_preference
        } else if opponent.color_preference != Color::None {
            opponent.color_preference.invert()
        } else if player.rank_index < opponent.rank_index {
            if player.rank_index & 1 == 1 {
                tournament.initial_color.invert()
            } else {
                tournament.initial_color
            }
        } else if opponent.rank_index & 1 == 1 {
            tournament.initial_color
        } else {
            tournament.initial_color.invert()
        }
    } else if player.absolute_color_preference() {
        player.color_preference
    } else if opponent.absolute_color_preference() {
        opponent.color_preference.invert()
    } else if player.strong_color_preference && !opponent.strong_color_preference {
        player.color_preference
    } else if opponent.strong_color_preference && !player.strong_color_preference {
        opponent.color_preference.invert()
    } else {
        let (player_color, opponent_color) = find_first_color_difference(player, opponent);
        if player_color != Color::None && opponent_color != Color::None {
            opponent_color
        } else if metric_scores[player.id as usize].less_than(&metric_scores[opponent.id as usize]) {
            opponent.color_preference.invert()
        } else {
            player.color_preference
        }
    }
}

fn format_points_product(value: PointsProduct) -> String {
    format!("{}.{:02}", value / 100, value % 100)
}

#[allow(clippy::too_many_arguments)]
fn print_burstein_checklist(
    tournament: &Tournament,
    sorted_players: &[&Player],
    output: &mut dyn io::Write,
    metric_scores: &[MetricScores],
    vertex_labels: Option<&Vec<&Player>>,
    bye: Option<PlayerIndex>,
    matching: Option<&Vec<VertexIndex>>,
) -> io::Result<()> {
    let mut matching_by_id: Vec<Option<PlayerIndex>> = vec![None; tournament.players.len()];
    if let (Some(labels), Some(matching)) = (vertex_labels, matching) {
        for (vertex_index, player) in labels.iter().enumerate() {
            matching_by_id[player.id as usize] = Some(labels[matching[vertex_index]].id);
        }
    }

    print_checklist(
        output,
        &[
            "Sonneborn-Berger".to_string(),
            "Buchholz score".to_string(),
            "Buchholz tiebreak".to_string(),
            "Median score".to_string(),
            "Median tiebreak".to_string(),
            "Cur".to_string(),
        ],
        &|player: &Player| {
            let metric_score = &metric_scores[player.id as usize];
            vec![
                format_points_product(metric_score.sonneborn_berger),
                format_points_product(metric_score.buchholz_score()),
                format_points(metric_score.buchholz_tiebreak as Points),
                format_points_product(metric_score.median_score()),
                format_points(metric_score.median_tiebreak as Points),
                if bye == Some(player.id) {
                    "(bye)".to_string()
                } else {
                    match matching_by_id[player.id as usize] {
                        Some(opponent_id) => {
                            let opponent = &tournament.players[opponent_id as usize];
                            format!(
                                "({}{})",
                                opponent.id + 1,
                                if choose_player_color(player, opponent, tournament, metric_scores)
                                    == Color::White
                                {
                                    'W'
                                } else {
                                    'B'
                                }
                            )
                        }
                        None => String::new(),
                    }
                },
            ]
        },
        tournament,
        sorted_players,
    )
}

/// Compute the Burstein pairing of the next round. The returned list is sorted in the
/// published order.
pub fn compute_matching<'a, 'b: 'a>(
    tournament: Tournament,
    mut checklist: Option<&'a mut (dyn io::Write + 'b)>,
) -> Result<Vec<Pairing>, PairingError> {
    // The checklist describes the final outcome, so the failed first attempt writes none
    // and the rematch-allowing retry keeps the caller's writer.
    let first_attempt = compute_matching_impl(&tournament, checklist.as_deref_mut(), true);
    match first_attempt {
        Err(PairingError::NoValidPairing(_)) => {
            log::debug!("no pairing without rematches, retrying with rematches allowed");
            compute_matching_impl(&tournament, checklist, false)
        }
        result => result,
    }
}

fn compute_matching_impl<'a, 'b: 'a>(
    tournament: &Tournament,
    mut checklist: Option<&'a mut (dyn io::Write + 'b)>,
    forbid_played_opponents: bool,
) -> Result<Vec<Pairing>, PairingError> {
    // Compute the tiebreak inputs, collect the players to be paired, and record played
    // opponents as forbidden.
    let mut sorted_players: Vec<&Player> = Vec::new();
    let mut adjusted_scores: Vec<AdjustedScore> = Vec::new();
    let mut forbidden: Vec<std::collections::HashSet<PlayerIndex>> =
        tournament.players.iter().map(|player| player.forbidden_pairs.clone()).collect();
    for player in tournament.players.iter() {
        let mut adjusted_score: AdjustedScore = 0;
        if player.is_valid {
            if player.matches.len() <= tournament.played_rounds {
                sorted_players.push(player);
            }
            adjusted_score = player.acceleration(tournament) as u64;
            for (match_index, game) in player.matches.iter().enumerate() {
                if match_index < tournament.played_rounds {
                    adjusted_score += adjusted_points(game, tournament) as u64;
                }
                if forbid_played_opponents && game.game_was_played {
                    forbidden[player.id as usize].insert(game.opponent);
                }
            }
        }
        adjusted_scores.push(adjusted_score);
    }
    let metric_scores: Vec<MetricScores> = tournament
        .players
        .iter()
        .map(|player| MetricScores::new(player, tournament, &adjusted_scores))
        .collect();
    sorted_players.sort_by(|a, b| {
        let score_a = a.score_with_acceleration(tournament);
        let score_b = b.score_with_acceleration(tournament);
        if score_a != score_b {
            return score_b.cmp(&score_a);
        }
        if metric_scores[b.id as usize].less_than(&metric_scores[a.id as usize]) {
            std::cmp::Ordering::Less
        } else if metric_scores[a.id as usize].less_than(&metric_scores[b.id as usize]) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });

    let mut result: Vec<Pairing> = Vec::new();

    // Choose the player to receive the bye: the lowest player in score order without a
    // previous full-point unplayed score.
    let mut bye: Option<PlayerIndex> = None;
    if sorted_players.len() & 1 == 1 {
        let bye_position = sorted_players.iter().rposition(|player| {
            !player
                .matches
                .iter()
                .any(|game| !game.game_was_played && game.match_score == MatchScore::Win)
        });
        match bye_position {
            Some(position) => {
                let player = sorted_players[position];
                log::debug!("bye assigned to player {}", player.id + 1);
                result.push(Pairing::new(player.id, player.id));
                bye = Some(player.id);
                sorted_players.remove(position);
            }
            None => {
                // only the rematch-allowing retry reports final failures
                if !forbid_played_opponents {
                    if let Some(output) = checklist.as_deref_mut() {
                        let full_list: Vec<&Player> = sorted_players.clone();
                        let _ = print_burstein_checklist(
                            tournament,
                            &full_list,
                            output,
                            &metric_scores,
                            None,
                            None,
                            None,
                        );
                    }
                }
                return Err(PairingError::NoValidPairing(
                    "no player is eligible for the pairing-allocated bye".to_string(),
                ));
            }
        }
    }

    // The vector of players to be paired, without the bye.
    let vertex_labels: Vec<&Player> = sorted_players.clone();

    // The full ordering including the bye, used for the checklist.
    let mut checklist_players: Vec<&Player> = vertex_labels.clone();
    if let Some(bye_id) = bye {
        let bye_player = &tournament.players[bye_id as usize];
        let position = checklist_players
            .iter()
            .position(|player| {
                player.score_with_acceleration(tournament)
                    < bye_player.score_with_acceleration(tournament)
                    || (player.score_with_acceleration(tournament)
                        == bye_player.score_with_acceleration(tournament)
                        && metric_scores[player.id as usize]
                            .less_than(&metric_scores[bye_id as usize]))
            })
            .unwrap_or(checklist_players.len());
        checklist_players.insert(position, bye_player);
    }

    let mut matching_computer = MatchingComputer::<u64>::new();
    for _ in 0..vertex_labels.len() {
        matching_computer.add_vertex();
    }

    if vertex_labels.is_empty() {
        return Ok(result);
    }

    // The boundaries of the scoregroups used for pairing, in vertex order. A boundary
    // across which no floater can descend is recorded twice.
    let mut score_groups: Vec<usize> = vec![0, 0];

    // Determine the scoregroups, merging a group with the one below whenever it cannot
    // be paired.
    let mut matching_is_valid = true;
    while *score_groups.last().expect("boundary list is non-empty") < vertex_labels.len() {
        score_groups.push(*score_groups.last().expect("boundary list is non-empty"));
        loop {
            // Keep merging with lower scoregroups as needed.
            let score_group_begin = *score_groups.last().expect("boundary list is non-empty");
            loop {
                // Add all the players sharing one score to the scoregroup.
                let group_end = *score_groups.last().expect("boundary list is non-empty");
                let reach_back = score_groups[score_groups.len() - 3];
                let section_begin = score_groups[score_groups.len() - 2];
                for vertex_index in reach_back..group_end {
                    matching_computer.set_edge_weight(
                        group_end,
                        vertex_index,
                        compute_edge_weight(
                            vertex_labels[vertex_index],
                            vertex_labels[group_end],
                            vertex_index >= section_begin,
                            false,
                            &forbidden,
                        ),
                    );
                }
                *score_groups.last_mut().expect("boundary list is non-empty") += 1;
                let group_end = *score_groups.last().expect("boundary list is non-empty");
                if group_end >= vertex_labels.len()
                    || vertex_labels[score_group_begin].score_with_acceleration(tournament)
                        != vertex_labels[group_end].score_with_acceleration(tournament)
                {
                    break;
                }
            }
            // When the group boundary is odd, give the players a virtual opponent (the
            // first player below the boundary) so that no player above stays unpaired.
            let group_end = *score_groups.last().expect("boundary list is non-empty");
            if group_end & 1 == 1 {
                let section_begin = score_groups[score_groups.len() - 2];
                for vertex_index in section_begin..group_end {
                    matching_computer.set_edge_weight(group_end, vertex_index, COMPATIBLE_MULTIPLIER);
                }
            }
            matching_computer.compute_matching();
            matching_is_valid = check_matching_is_valid(&matching_computer.matching(), &score_groups);
            if *score_groups.last().expect("boundary list is non-empty") >= vertex_labels.len()
                || matching_is_valid
            {
                break;
            }
        }
        let group_end = *score_groups.last().expect("boundary list is non-empty");
        if group_end < vertex_labels.len() && group_end & 1 == 0 {
            score_groups.push(group_end);
        }
    }

    // If the last scoregroup cannot be paired and another group sits above it, merge the
    // two. Repeat.
    while score_groups.len() > 3 && !matching_is_valid {
        score_groups.pop();
        let boundary_vertex = *score_groups.last().expect("boundary list is non-empty");
        score_groups.pop();
        let score_group_begin = *score_groups.last().expect("boundary list is non-empty");
        score_groups.pop();
        let reach_back = *score_groups.last().expect("boundary list is non-empty");
        for outer_index in reach_back..boundary_vertex {
            for inner_index in boundary_vertex..vertex_labels.len() {
                matching_computer.set_edge_weight(
                    outer_index,
                    inner_index,
                    compute_edge_weight(
                        vertex_labels[outer_index],
                        vertex_labels[inner_index],
                        outer_index >= score_group_begin,
                        false,
                        &forbidden,
                    ),
                );
            }
        }
        matching_computer.compute_matching();
        score_groups.push(score_group_begin);
        score_groups.push(vertex_labels.len());
        matching_is_valid = check_matching_is_valid(&matching_computer.matching(), &score_groups);
    }

    if !matching_is_valid {
        // only the rematch-allowing retry reports final failures
        if !forbid_played_opponents {
            if let Some(output) = checklist.as_deref_mut() {
                let _ = print_burstein_checklist(
                    tournament,
                    &checklist_players,
                    output,
                    &metric_scores,
                    Some(&vertex_labels),
                    bye,
                    None,
                );
            }
        }
        return Err(PairingError::NoValidPairing(
            "the non-bye players cannot be simultaneously paired without violating the absolute \
             criteria"
                .to_string(),
        ));
    }

    // Optimize the matching so that players at the top of their scoregroup play those at
    // the bottom.
    let mut matched_vertices = vec![false; vertex_labels.len()];
    let mut score_group_begin = score_groups[0];
    let mut floater: Option<usize> = None;
    for boundary_position in 1..score_groups.len() {
        let boundary = score_groups[boundary_position];
        if score_group_begin == boundary {
            continue;
        }
        // Collect the players to be paired in the scoregroup, a floater from above
        // included, ordered by the tiebreak metrics.
        let mut full_score_group: Vec<usize> = (score_group_begin..boundary).collect();
        if let Some(floater_index) = floater.take() {
            full_score_group.push(floater_index);
        }
        full_score_group.sort_by(|&index0, &index1| {
            let id0 = vertex_labels[index0].id as usize;
            let id1 = vertex_labels[index1].id as usize;
            if metric_scores[id1].less_than(&metric_scores[id0]) {
                std::cmp::Ordering::Less
            } else if metric_scores[id0].less_than(&metric_scores[id1]) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });

        // Fold the floater into the scoregroup and account for due colors.
        for (position, &vertex_index) in full_score_group.iter().enumerate() {
            for &neighbor_index in full_score_group.iter().skip(position + 1) {
                matching_computer.set_edge_weight(
                    vertex_index,
                    neighbor_index,
                    compute_edge_weight(
                        vertex_labels[vertex_index],
                        vertex_labels[neighbor_index],
                        true,
                        true,
                        &forbidden,
                    ),
                );
            }
        }

        // Starting with the highest player, find the lowest opponent preserving the
        // matching.
        for position in 0..full_score_group.len() {
            let vertex_index = full_score_group[position];
            if matched_vertices[vertex_index] {
                continue;
            }
            let mut neighbor_priority: u64 = 1;
            for &neighbor_index in full_score_group.iter().skip(position + 1) {
                if !matched_vertices[neighbor_index] {
                    let edge_weight = compute_edge_weight(
                        vertex_labels[vertex_index],
                        vertex_labels[neighbor_index],
                        true,
                        true,
                        &forbidden,
                    );
                    if edge_weight != 0 {
                        matching_computer.set_edge_weight(
                            vertex_index,
                            neighbor_index,
                            edge_weight + neighbor_priority,
                        );
                        neighbor_priority += 1;
                    }
                }
            }
            matching_computer.compute_matching();
            let matched_index = matching_computer.matching()[vertex_index];
            if matched_index >= boundary {
                floater = Some(vertex_index);
            } else {
                // Freeze the pair so the two players cannot be reassigned.
                matched_vertices[vertex_index] = true;
                matched_vertices[matched_index] = true;
                for player_index in 0..vertex_labels.len() {
                    if vertex_index != player_index {
                        matching_computer.set_edge_weight(
                            vertex_index,
                            player_index,
                            (player_index == matched_index) as u64,
                        );
                    }
                    if matched_index != player_index {
                        matching_computer.set_edge_weight(
                            matched_index,
                            player_index,
                            (player_index == vertex_index) as u64,
                        );
                    }
                }
            }
        }

        score_group_begin = boundary;
    }

    matching_computer.compute_matching();
    let matching = matching_computer.matching();

    if let Some(output) = checklist.as_deref_mut() {
        let _ = print_burstein_checklist(
            tournament,
            &checklist_players,
            output,
            &metric_scores,
            Some(&vertex_labels),
            bye,
            Some(&matching),
        );
    }

    // Generate the return list.
    for (vertex_index, player) in vertex_labels.iter().enumerate() {
        if matching[vertex_index] > vertex_index {
            let opponent = vertex_labels[matching[vertex_index]];
            result.push(Pairing::with_color(
                player.id,
                opponent.id,
                choose_player_color(player, opponent, tournament, &metric_scores),
            ));
        }
    }

    sort_results(&mut result, tournament);
    Ok(result)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::tournament::Match;

    fn fresh_players(count: PlayerIndex) -> Tournament {
        let mut tournament = Tournament::new();
        for id in 0..count {
            tournament.players.push(Player::new(id, 0, 0, Vec::new()));
            tournament.players_by_rank.push(id);
        }
        tournament.expected_rounds = 5;
        tournament.initial_color = Color::White;
        tournament.update_ranks();
        tournament.compute_player_data();
        tournament
    }

    fn forfeit(opponent: PlayerIndex, score: MatchScore) -> Match {
        Match::new(opponent, Color::None, score, false, true)
    }

    #[test]
    fn burstein_first_round_folds_the_field_1() {
        // cargo test burstein_first_round_folds_the_field_1 -- --nocapture
        let tournament = fresh_players(4);
        let pairs = compute_matching(tournament, None).unwrap();
        let meets: Vec<(PlayerIndex, PlayerIndex)> = pairs
            .iter()
            .map(|pair| (pair.white.min(pair.black), pair.white.max(pair.black)))
            .collect();
        assert!(meets.contains(&(0, 3)), "top plays bottom: {:?}", pairs);
        assert!(meets.contains(&(1, 2)), "middle plays middle: {:?}", pairs);
    }

    #[test]
    fn burstein_bye_goes_to_lowest_eligible_1() {
        // cargo test burstein_bye_goes_to_lowest_eligible_1 -- --nocapture
        let mut tournament = fresh_players(5);
        // the lowest player already received a full-point unplayed score
        tournament.players[4]
            .matches
            .push(Match::new(4, Color::None, MatchScore::Win, false, true));
        tournament.players[4].score_without_acceleration = 10;
        tournament.played_rounds = 1;
        for id in 0..4 {
            tournament.players[id]
                .matches
                .push(Match::new(id, Color::None, MatchScore::Draw, false, false));
            tournament.players[id].score_without_acceleration = 5;
        }
        tournament.update_ranks();
        tournament.compute_player_data();
        let pairs = compute_matching(tournament, None).unwrap();
        let bye = pairs.iter().find(|pair| pair.is_bye()).expect("a bye exists");
        assert_eq!(bye.white, 3, "bye skips the ineligible lowest player: {:?}", pairs);
    }

    #[test]
    fn burstein_tiebreaks_order_the_scoregroup_1() {
        // cargo test burstein_tiebreaks_order_the_scoregroup_1 -- --nocapture
        // two rounds of forfeits leave four players on one score with distinct
        // Sonneborn-Berger and Buchholz values and no played games to forbid rematches
        let mut tournament = fresh_players(4);
        tournament.players[0].matches =
            vec![forfeit(1, MatchScore::Win), forfeit(3, MatchScore::Loss)];
        tournament.players[1].matches =
            vec![forfeit(0, MatchScore::Loss), forfeit(2, MatchScore::Win)];
        tournament.players[2].matches =
            vec![forfeit(3, MatchScore::Win), forfeit(1, MatchScore::Loss)];
        tournament.players[3].matches =
            vec![forfeit(2, MatchScore::Loss), forfeit(0, MatchScore::Win)];
        for id in 0..4 {
            tournament.players[id].score_without_acceleration = 10;
        }
        tournament.played_rounds = 2;
        tournament.update_ranks();
        tournament.compute_player_data();

        // sanity-check the metric spread: 0 and 2 lead on Sonneborn-Berger
        let adjusted = vec![10u64, 10, 10, 10];
        assert_eq!(calculate_sonneborn_berger(&tournament.players[0], &tournament, &adjusted), 50);
        assert_eq!(calculate_sonneborn_berger(&tournament.players[1], &tournament, &adjusted), 0);
        assert_eq!(calculate_sonneborn_berger(&tournament.players[2], &tournament, &adjusted), 50);
        assert_eq!(calculate_sonneborn_berger(&tournament.players[3], &tournament, &adjusted), 0);
        assert_eq!(
            calculate_buchholz_tiebreak(&tournament.players[0], &tournament, &adjusted, false),
            25
        );
        assert_eq!(
            calculate_buchholz_tiebreak(&tournament.players[1], &tournament, &adjusted, false),
            15
        );

        // the group orders 0, 2, 1, 3, so the top pairs the bottom
        let pairs = compute_matching(tournament, None).unwrap();
        let meets: Vec<(PlayerIndex, PlayerIndex)> = pairs
            .iter()
            .map(|pair| (pair.white.min(pair.black), pair.white.max(pair.black)))
            .collect();
        assert!(meets.contains(&(0, 3)), "highest SB meets lowest: {:?}", pairs);
        assert!(meets.contains(&(1, 2)), "middle meets middle: {:?}", pairs);
    }

    #[test]
    fn burstein_rematch_fallback_checklist_matches_result_1() {
        // cargo test burstein_rematch_fallback_checklist_matches_result_1 -- --nocapture
        // two players who already met force the rematch fallback; the checklist written
        // on that path must describe the pairing that is returned, not the failed
        // first attempt
        let mut tournament = Tournament::new();
        let mut winner = Player::new(0, 10, 0, vec![Match::new(
            1,
            Color::White,
            MatchScore::Win,
            true,
            true,
        )]);
        winner.rank_index = 0;
        let mut loser = Player::new(1, 0, 0, vec![Match::new(
            0,
            Color::Black,
            MatchScore::Loss,
            true,
            true,
        )]);
        loser.rank_index = 1;
        tournament.players = vec![winner, loser];
        tournament.players_by_rank = vec![0, 1];
        tournament.played_rounds = 1;
        tournament.expected_rounds = 2;
        tournament.initial_color = Color::White;
        tournament.update_ranks();
        tournament.compute_player_data();

        let mut checklist = Vec::new();
        let pairs = compute_matching(tournament, Some(&mut checklist)).unwrap();
        assert_eq!(pairs, vec![Pairing { white: 1, black: 0 }]);
        let checklist = String::from_utf8(checklist).unwrap();
        assert!(checklist.contains("(2B)"), "checklist lacks the pairing: {}", checklist);
        assert!(checklist.contains("(1W)"), "checklist lacks the pairing: {}", checklist);
    }

    #[test]
    fn burstein_acceleration_first_two_rounds_1() {
        // cargo test burstein_acceleration_first_two_rounds_1 -- --nocapture
        let mut tournament = fresh_players(6);
        update_accelerations(&mut tournament, 0).unwrap();
        assert_eq!(tournament.players[0].accelerations, vec![10]);
        assert_eq!(tournament.players[2].accelerations, vec![10]);
        assert_eq!(tournament.players[3].accelerations, vec![0]);
        update_accelerations(&mut tournament, 2).unwrap();
        assert_eq!(tournament.players[0].accelerations, vec![10]);
    }

    #[test]
    fn burstein_unapplicable_point_system_1() {
        // cargo test burstein_unapplicable_point_system_1 -- --nocapture
        let mut tournament = fresh_players(4);
        tournament.point_system.points_for_win = 3;
        tournament.point_system.points_for_draw = 5;
        match update_accelerations(&mut tournament, 0) {
            Err(PairingError::UnapplicableFeature(_)) => {}
            other => panic!("expected UnapplicableFeature, got {:?}", other),
        }
    }
}
