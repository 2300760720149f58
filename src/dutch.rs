//! FIDE Dutch System
//!
//! The orchestrator for FIDE handbook C.04.3. All ordered criteria are packed into a
//! single [`WideUint`] edge weight per candidate pair, most significant first:
//! compatibility, bye eligibility, completion of the current and next bracket, the bye
//! assignee's unplayed-game rank, four color-preference tiers, repeated float history one
//! and two rounds back, and reserved low fields used while processing a bracket to order
//! homogeneous remainders and control exchanges. A non-compatible pair always weighs
//! zero, which the solver never matches.
//!
//! Brackets are walked top-down. Within a bracket the orchestrator repeatedly perturbs
//! edge weights and re-solves to pick downfloaters, their opponents, the players to be
//! exchanged between the bracket halves, and finally concrete opponents, freezing each
//! decision before the next. The solver being deterministic over the weight vector makes
//! every perturbation outcome well-defined.
//!
//! Previously played opponents are treated as forbidden; if the validity pass shows that
//! no pairing exists under that restriction, the round is re-paired with rematches
//! allowed, so only explicitly forbidden pairs remain absolute.
//!

use std::collections::{HashMap, HashSet};
use std::io;

use crate::error::PairingError;
use crate::matching::MatchingComputer;
use crate::swiss::{
    color_preferences_are_compatible, choose_player_neutral_color, eligible_for_bye, finalize_pair,
    print_checklist, sort_results, Pairing,
};
use crate::tournament::{accelerated_score_rank_compare, Color, Player, Tournament};
use crate::util::*;
use crate::wide_uint::{EdgeWeight, WideUint};

type EdgeWeightValue = WideUint;

/// Determine whether the two players could meet without violating absolute criteria.
fn compatible(
    player0: &Player,
    player1: &Player,
    tournament: &Tournament,
    forbidden_pairs: &[HashSet<PlayerIndex>],
) -> bool {
    let top_score_threshold = (tournament.played_rounds as Points)
        * tournament
            .point_system
            .points_for_win
            .max(tournament.point_system.points_for_draw)
        >> 1;
    !forbidden_pairs[player0.id as usize].contains(&player1.id)
        && (!player0.absolute_color_preference()
            || !player1.absolute_color_preference()
            || player0.color_preference != player1.color_preference
            || (tournament.expected_rounds > 0
                && tournament.played_rounds >= tournament.expected_rounds - 1
                && (player0.score_with_acceleration(tournament) > top_score_threshold
                    || player1.score_with_acceleration(tournament) > top_score_threshold)))
}

/// Check whether the matching is an eligible round pairing: at most one player left
/// unmatched, and that player eligible for the bye.
fn matching_is_complete(
    matching: &[VertexIndex],
    sorted_players: &[&Player],
) -> bool {
    let mut encountered_unmatched_player = false;
    for (vertex_index, &matched_index) in matching.iter().enumerate() {
        if matched_index == vertex_index {
            if encountered_unmatched_player || !eligible_for_bye(sorted_players[matched_index]) {
                return false;
            }
            encountered_unmatched_player = true;
        }
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Float {
    Down,
    Up,
    None,
}

/// The float direction of the player on the round `rounds_back` before the current one.
fn get_float(player: &Player, rounds_back: RoundIndex, tournament: &Tournament) -> Float {
    let game = &player.matches[tournament.played_rounds - rounds_back];
    if !game.game_was_played {
        return if tournament.points_for(player, game) > tournament.point_system.points_for_loss {
            Float::Down
        } else {
            Float::None
        };
    }
    let player_score = player.score_with_acceleration_at(tournament, rounds_back);
    let opponent_score =
        tournament.players[game.opponent as usize].score_with_acceleration_at(tournament, rounds_back);
    if player_score > opponent_score {
        Float::Down
    } else if player_score < opponent_score {
        Float::Up
    } else {
        Float::None
    }
}

/// Left-shift the weight under construction. When building the upper bound, grow the
/// representation so no reserved bit is lost.
fn shift_edge_weight(weight: &mut EdgeWeightValue, shift: u32, max: bool) {
    if max {
        weight.shift_grow(shift);
    } else {
        *weight <<= shift;
    }
}

/// A flag placed in its own field of `player_count_bits` bits.
fn shifted_flag(base: &EdgeWeightValue, flag: bool, shift: u32) -> EdgeWeightValue {
    let mut result = base.zero_like();
    result |= flag as u64;
    result <<= shift;
    result
}

/// Shift the weight over the four color-preference fields and set the appropriate bits.
/// When building the upper bound, just reserve the room.
fn insert_color_bits(
    weight: &mut EdgeWeightValue,
    player: &Player,
    opponent: &Player,
    in_current_score_group: bool,
    player_count_bits: u32,
    max: bool,
) {
    let mask = !max && in_current_score_group;

    // No clash of absolute color imbalances.
    shift_edge_weight(weight, player_count_bits, max);
    *weight |= (mask
        && (!player.absolute_color_imbalance()
            || !opponent.absolute_color_imbalance()
            || player.color_preference != opponent.color_preference)) as u64;

    // No clash of absolute color preferences.
    shift_edge_weight(weight, player_count_bits, max);
    *weight |= (mask
        && (!player.absolute_color_preference()
            || !opponent.absolute_color_preference()
            || player.color_preference != opponent.color_preference
            || (if player.color_imbalance == opponent.color_imbalance {
                player.repeated_color == Color::None
                    || player.repeated_color != opponent.repeated_color
            } else {
                (if player.color_imbalance > opponent.color_imbalance {
                    opponent
                } else {
                    player
                })
                .repeated_color
                    != player.color_preference.invert()
            }))) as u64;

    // Preferences compatible.
    shift_edge_weight(weight, player_count_bits, max);
    *weight |= (mask
        && color_preferences_are_compatible(player.color_preference, opponent.color_preference))
        as u64;

    // No strong preference losing to a mild one.
    shift_edge_weight(weight, player_count_bits, max);
    *weight |= (mask
        && ((!player.strong_color_preference && !player.absolute_color_preference())
            || (!opponent.strong_color_preference && !opponent.absolute_color_preference())
            || (player.absolute_color_preference() && opponent.absolute_color_preference())
            || player.color_preference != opponent.color_preference)) as u64;
}

fn is_bye_candidate(player: &Player, tournament: &Tournament, bye_assignee_score: Points) -> bool {
    eligible_for_bye(player) && player.score_with_acceleration(tournament) <= bye_assignee_score
}

/// Everything needed to compose an edge weight for the current bracket.
struct WeightContext<'a> {
    tournament: &'a Tournament,
    forbidden_pairs: &'a [HashSet<PlayerIndex>],
    score_group_size_bits: u32,
    score_groups_shift: u32,
    score_group_shifts: &'a HashMap<Points, u32>,
    bye_assignee_score: Points,
    is_single_downfloater_the_bye_assignee: bool,
    unplayed_game_ranks: &'a HashMap<RoundIndex, PlayerIndex>,
    max_edge_weight: &'a EdgeWeightValue,
}

/// Compute the basic edge weight between two candidate opponents, or the upper bound on
/// any such weight when `max` is set. The two forms share one body so the field layout
/// can never diverge.
fn compute_edge_weight(
    higher_player: &Player,
    lower_player: &Player,
    lower_player_in_current_bracket: bool,
    lower_player_in_next_bracket: bool,
    context: &WeightContext<'_>,
    max: bool,
) -> EdgeWeightValue {
    let tournament = context.tournament;
    let mut result = context.max_edge_weight.zero_like();

    // Check compatibility.
    if !max && !compatible(higher_player, lower_player, tournament, context.forbidden_pairs) {
        return result;
    }

    let shifts = context.score_group_shifts;
    let higher_score = higher_player.score_with_acceleration(tournament);
    let lower_score = lower_player.score_with_acceleration(tournament);

    // Enforce the completion requirement and bye eligibility.
    result |= if max {
        2
    } else {
        1 + !is_bye_candidate(higher_player, tournament, context.bye_assignee_score) as u64
            + !is_bye_candidate(lower_player, tournament, context.bye_assignee_score) as u64
    };

    // Maximize the number of pairs in the current pairing bracket.
    assert!(context.score_group_size_bits > 0);
    shift_edge_weight(&mut result, context.score_group_size_bits, max);
    result |= (!max && lower_player_in_current_bracket) as u64;

    // Maximize the scores paired in the current bracket.
    shift_edge_weight(&mut result, context.score_groups_shift, max);
    if !max && lower_player_in_current_bracket {
        let addend = shifted_flag(&result, true, shifts[&higher_score]);
        result += &addend;
    }

    // Maximize the number of pairs in the next bracket.
    shift_edge_weight(&mut result, context.score_group_size_bits, max);
    result |= (!max && lower_player_in_next_bracket) as u64;

    // Maximize the scores paired in the next bracket.
    shift_edge_weight(&mut result, context.score_groups_shift, max);
    if !max && lower_player_in_next_bracket {
        let addend = shifted_flag(&result, true, shifts[&higher_score]);
        result += &addend;
    }

    // Minimize the unplayed games of the bye assignee.
    shift_edge_weight(&mut result, context.score_group_size_bits, max);
    shift_edge_weight(&mut result, context.score_group_size_bits, max);
    if !max && context.is_single_downfloater_the_bye_assignee {
        if higher_score == context.bye_assignee_score {
            result |= context.unplayed_game_ranks[&higher_player.played_games] as u64;
        }
        if lower_score == context.bye_assignee_score {
            result += context.unplayed_game_ranks[&lower_player.played_games] as u64;
        }
    }

    // Maximize color preference satisfaction.
    insert_color_bits(
        &mut result,
        lower_player,
        higher_player,
        lower_player_in_current_bracket,
        context.score_group_size_bits,
        max,
    );

    if tournament.played_rounds > 0 {
        // Minimize downfloaters repeated from the previous round.
        shift_edge_weight(&mut result, context.score_group_size_bits, max);
        if !max && lower_player_in_current_bracket {
            result |= (get_float(lower_player, 1, tournament) == Float::Down) as u64;
            result += (higher_score <= lower_score
                && get_float(higher_player, 1, tournament) == Float::Down)
                as u64;
        }

        // Minimize upfloaters repeated from the previous round.
        shift_edge_weight(&mut result, context.score_group_size_bits, max);
        if !max && lower_player_in_current_bracket {
            result |= !(higher_score > lower_score
                && get_float(lower_player, 1, tournament) == Float::Up) as u64;
        }
    }
    if tournament.played_rounds > 1 {
        // Minimize downfloaters repeated from two rounds before.
        shift_edge_weight(&mut result, context.score_group_size_bits, max);
        if !max && lower_player_in_current_bracket {
            result |= (get_float(lower_player, 2, tournament) == Float::Down) as u64;
            result += (higher_score <= lower_score
                && get_float(higher_player, 2, tournament) == Float::Down)
                as u64;
        }

        // Minimize upfloaters repeated from two rounds before.
        shift_edge_weight(&mut result, context.score_group_size_bits, max);
        if !max && lower_player_in_current_bracket {
            result |= !(higher_score > lower_score
                && get_float(lower_player, 2, tournament) == Float::Up) as u64;
        }
    }

    if tournament.played_rounds > 0 {
        // Minimize the scores of downfloaters repeated from the previous round.
        shift_edge_weight(&mut result, context.score_groups_shift, max);
        if !max && lower_player_in_current_bracket {
            let addend = shifted_flag(
                &result,
                get_float(lower_player, 1, tournament) == Float::Down,
                shifts[&lower_score],
            );
            result += &addend;
            let addend = shifted_flag(
                &result,
                get_float(higher_player, 1, tournament) == Float::Down,
                shifts[&higher_score],
            );
            result += &addend;
        }

        // Minimize the scores of the opponents of upfloaters repeated from the previous
        // round.
        shift_edge_weight(&mut result, context.score_groups_shift, max);
        if !max
            && lower_player_in_current_bracket
            && !(get_float(lower_player, 1, tournament) == Float::Up && higher_score > lower_score)
        {
            let addend = shifted_flag(&result, true, shifts[&higher_score]);
            result |= &addend;
        }
    }
    if tournament.played_rounds > 1 {
        // Minimize the scores of downfloaters repeated from two rounds before.
        shift_edge_weight(&mut result, context.score_groups_shift, max);
        if !max && lower_player_in_current_bracket {
            let addend = shifted_flag(
                &result,
                get_float(lower_player, 2, tournament) == Float::Down,
                shifts[&lower_score],
            );
            result += &addend;
            let addend = shifted_flag(
                &result,
                get_float(higher_player, 2, tournament) == Float::Down,
                shifts[&higher_score],
            );
            result += &addend;
        }

        // Minimize the scores of the opponents of upfloaters repeated from two rounds
        // before.
        shift_edge_weight(&mut result, context.score_groups_shift, max);
        if !max
            && lower_player_in_current_bracket
            && !(get_float(lower_player, 2, tournament) == Float::Up && higher_score > lower_score)
        {
            let addend = shifted_flag(&result, true, shifts[&higher_score]);
            result |= &addend;
        }
    }

    // Leave room for enforcing the ordering requirements when pairing heterogeneous and
    // homogeneous brackets.
    shift_edge_weight(&mut result, context.score_group_size_bits, max);

    shift_edge_weight(&mut result, context.score_group_size_bits, max);
    shift_edge_weight(&mut result, context.score_group_size_bits, max);

    shift_edge_weight(&mut result, 1, max);

    if max {
        // The edge weight needs room to expand by two bits inside the matching
        // subroutine. Subtracting one sets all lower bits.
        result.shift_grow(2);
        result >>= 1;
        result -= 1u64;
    }

    result
}

/// The color given to `player` against `opponent`: the shared rule tower, falling back on
/// the rank parity of the higher player relative to the tournament's initial color.
fn choose_player_color(player: &Player, opponent: &Player, tournament: &Tournament) -> Color {
    let result = choose_player_neutral_color(player, opponent);
    if result != Color::None {
        return result;
    }
    if player.color_preference == Color::None {
        if accelerated_score_rank_compare(player, opponent, tournament) {
            if opponent.rank_index & 1 == 1 {
                tournament.initial_color
            } else {
                tournament.initial_color.invert()
            }
        } else if player.rank_index & 1 == 1 {
            tournament.initial_color.invert()
        } else {
            tournament.initial_color
        }
    } else if accelerated_score_rank_compare(player, opponent, tournament) {
        opponent.color_preference.invert()
    } else {
        player.color_preference
    }
}

fn float_to_char(float_direction: Float) -> char {
    match float_direction {
        Float::Down => 'D',
        Float::Up => 'U',
        Float::None => ' ',
    }
}

/// Write the checklist for the current round.
fn print_dutch_checklist(
    tournament: &Tournament,
    sorted_players: &[&Player],
    output: &mut dyn io::Write,
    matching_by_id: Option<&Vec<Option<PlayerIndex>>>,
) -> io::Result<()> {
    print_checklist(
        output,
        &["C2".to_string(), "C14".to_string(), "C16".to_string(), "Cur".to_string()],
        &|player: &Player| {
            let opponent = matching_by_id.and_then(|matching| matching[player.id as usize]);
            vec![
                if eligible_for_bye(player) { "Y" } else { "N" }.to_string(),
                float_to_char(if tournament.played_rounds > 0 {
                    get_float(player, 1, tournament)
                } else {
                    Float::None
                })
                .to_string(),
                float_to_char(if tournament.played_rounds > 1 {
                    get_float(player, 2, tournament)
                } else {
                    Float::None
                })
                .to_string(),
                match (matching_by_id, opponent) {
                    (Some(_), Some(opponent)) => {
                        let opponent = &tournament.players[opponent as usize];
                        format!(
                            "({}{})",
                            opponent.id + 1,
                            if choose_player_color(player, opponent, tournament) == Color::White {
                                'W'
                            } else {
                                'B'
                            }
                        )
                    }
                    (Some(_), None) => "(bye)".to_string(),
                    (None, _) => String::new(),
                },
            ]
        },
        tournament,
        sorted_players,
    )
}

/// Compute the basic edge weights for all pairings in this bracket and the next. The
/// result is indexed by the larger player index, then the smaller.
#[allow(clippy::too_many_arguments)]
fn compute_base_edge_weights(
    players_by_index: &[&Player],
    score_group_begin: PlayerIndex,
    next_score_group_begin: PlayerIndex,
    context: &WeightContext<'_>,
) -> Vec<Vec<EdgeWeightValue>> {
    let mut result: Vec<Vec<EdgeWeightValue>> = vec![Vec::new(); players_by_index.len()];
    for larger_player_index in score_group_begin as usize..players_by_index.len() {
        for smaller_player_index in 0..larger_player_index {
            result[larger_player_index].push(compute_edge_weight(
                players_by_index[smaller_player_index],
                players_by_index[larger_player_index],
                (larger_player_index as PlayerIndex) < next_score_group_begin,
                (larger_player_index as PlayerIndex) >= next_score_group_begin,
                context,
                false,
            ));
        }
    }
    result
}

/// Compute the Dutch pairing of the next round. The returned list is sorted in the
/// published order.
pub fn compute_matching<'a, 'b: 'a>(
    tournament: Tournament,
    mut checklist: Option<&'a mut (dyn io::Write + 'b)>,
) -> Result<Vec<Pairing>, PairingError> {
    // Previously played opponents are forbidden on the first attempt; if that leaves the
    // round unpairable, allow rematches rather than fail. The checklist describes the
    // final outcome, so the failed first attempt writes none and the retry keeps the
    // caller's writer.
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
    // Filter out the absent players and sort the remainder by score and pairing number.
    let mut sorted_players: Vec<&Player> = Vec::new();
    let mut forbidden_pairs: Vec<HashSet<PlayerIndex>> =
        tournament.players.iter().map(|player| player.forbidden_pairs.clone()).collect();
    for player in tournament.players.iter() {
        if player.is_valid {
            if player.matches.len() <= tournament.played_rounds {
                sorted_players.push(player);
            }
            if forbid_played_opponents {
                for game in player.matches.iter() {
                    if game.game_was_played {
                        forbidden_pairs[player.id as usize].insert(game.opponent);
                    }
                }
            }
        }
    }
    sorted_players.sort_by(|a, b| {
        (b.score_with_acceleration(tournament), a.rank_index)
            .cmp(&(a.score_with_acceleration(tournament), b.rank_index))
    });

    if sorted_players.is_empty() {
        return Ok(Vec::new());
    }

    // Calculate the field shift of each occupied score group, lowest score first.
    let mut score_groups_shift: u32 = 0;
    let mut score_group_shifts: HashMap<Points, u32> = HashMap::new();
    let mut max_score_group_size: PlayerIndex = 0;
    let mut repeated_scores: PlayerIndex = 0;
    for position in (0..sorted_players.len()).rev() {
        repeated_scores += 1;
        let current_score = sorted_players[position].score_with_acceleration(tournament);
        if position == 0
            || current_score < sorted_players[position - 1].score_with_acceleration(tournament)
        {
            let new_bits = bits_to_represent(repeated_scores as usize);
            score_group_shifts.insert(current_score, score_groups_shift);
            max_score_group_size = max_score_group_size.max(repeated_scores);
            repeated_scores = 0;
            score_groups_shift += new_bits;
        }
    }

    let score_group_size_bits = bits_to_represent(max_score_group_size as usize);

    let mut unplayed_game_ranks: HashMap<RoundIndex, PlayerIndex> = HashMap::new();

    // Compute an edge weight upper bound.
    let zero = EdgeWeightValue::new();
    let max_edge_weight = {
        let bound_context = WeightContext {
            tournament,
            forbidden_pairs: &forbidden_pairs,
            score_group_size_bits,
            score_groups_shift,
            score_group_shifts: &score_group_shifts,
            bye_assignee_score: 0,
            is_single_downfloater_the_bye_assignee: false,
            unplayed_game_ranks: &unplayed_game_ranks,
            max_edge_weight: &zero,
        };
        compute_edge_weight(sorted_players[0], sorted_players[0], true, false, &bound_context, true)
    };

    // Initialize the matching computer used to optimize the pairings.
    let mut matching_computer =
        MatchingComputer::<EdgeWeightValue>::with_capacity(sorted_players.len(), max_edge_weight.clone());
    for _ in 0..sorted_players.len() {
        matching_computer.add_vertex();
    }

    // Set edge weights enforcing completability only.
    {
        let context = WeightContext {
            tournament,
            forbidden_pairs: &forbidden_pairs,
            score_group_size_bits,
            score_groups_shift,
            score_group_shifts: &score_group_shifts,
            bye_assignee_score: 0,
            is_single_downfloater_the_bye_assignee: false,
            unplayed_game_ranks: &unplayed_game_ranks,
            max_edge_weight: &max_edge_weight,
        };
        let top_score = sorted_players[0].score_with_acceleration(tournament);
        for (player_index, player) in sorted_players.iter().enumerate() {
            let player_score = player.score_with_acceleration(tournament);
            for (opponent_index, opponent) in sorted_players.iter().enumerate().take(player_index) {
                if sorted_players.len() & 1 == 1 {
                    let mut edge_weight = max_edge_weight.zero_like();
                    if compatible(player, opponent, tournament, &forbidden_pairs) {
                        edge_weight |= 1
                            + !eligible_for_bye(player) as u64
                            + !eligible_for_bye(opponent) as u64;
                        edge_weight <<= score_groups_shift;
                        edge_weight |= (score_group_shifts[&player_score]
                            + score_group_shifts[&opponent.score_with_acceleration(tournament)])
                            as u64;
                        edge_weight <<= score_group_size_bits;
                        edge_weight |= (player_score >= top_score) as u64;
                    }
                    matching_computer.set_edge_weight(player_index, opponent_index, edge_weight);
                } else {
                    matching_computer.set_edge_weight(
                        player_index,
                        opponent_index,
                        compute_edge_weight(opponent, player, false, false, &context, false),
                    );
                }
            }
        }
    }

    // Check whether a pairing is possible at all, determine the score of the bye
    // assignee, and check whether minimizing the assignee's unplayed games takes effect
    // in the first bracket.
    let mut bye_assignee_score: Points = 0;
    let mut is_single_downfloater_the_bye_assignee = false;
    {
        matching_computer.compute_matching();
        let matching = matching_computer.matching();
        if !matching_is_complete(&matching, &sorted_players) {
            // the rematch-allowing retry reports final failures; an attempt that still
            // forbids played opponents is not the last word and writes no checklist
            if !forbid_played_opponents {
                if let Some(output) = checklist.as_deref_mut() {
                    let _ = print_dutch_checklist(tournament, &sorted_players, output, None);
                }
            }
            return Err(PairingError::NoValidPairing(
                "the players could not be simultaneously matched while satisfying all absolute \
                 criteria"
                    .to_string(),
            ));
        }

        if sorted_players.len() & 1 == 1 {
            for (player_index, player) in sorted_players.iter().enumerate() {
                if matching[player_index] == player_index {
                    bye_assignee_score = player.score_with_acceleration(tournament);
                    break;
                }
            }

            let top_score = sorted_players[0].score_with_acceleration(tournament);
            if bye_assignee_score >= top_score {
                is_single_downfloater_the_bye_assignee = true;
                for (player_index, player) in sorted_players.iter().enumerate() {
                    if player.score_with_acceleration(tournament) < top_score {
                        break;
                    }
                    if sorted_players[matching[player_index]].score_with_acceleration(tournament)
                        < top_score
                    {
                        is_single_downfloater_the_bye_assignee = false;
                        break;
                    }
                }
            }

            let mut played_game_counts: Vec<RoundIndex> = sorted_players
                .iter()
                .filter(|player| player.score_with_acceleration(tournament) == bye_assignee_score)
                .map(|player| player.played_games)
                .collect();
            played_game_counts.sort_unstable_by(|a, b| b.cmp(a));
            for (rank, played_games) in played_game_counts.into_iter().enumerate() {
                unplayed_game_ranks.insert(played_games, rank as PlayerIndex);
            }

            let context = WeightContext {
                tournament,
                forbidden_pairs: &forbidden_pairs,
                score_group_size_bits,
                score_groups_shift,
                score_group_shifts: &score_group_shifts,
                bye_assignee_score,
                is_single_downfloater_the_bye_assignee,
                unplayed_game_ranks: &unplayed_game_ranks,
                max_edge_weight: &max_edge_weight,
            };
            for (player_index, player) in sorted_players.iter().enumerate() {
                for (opponent_index, opponent) in sorted_players.iter().enumerate().take(player_index)
                {
                    matching_computer.set_edge_weight(
                        player_index,
                        opponent_index,
                        compute_edge_weight(opponent, player, false, false, &context, false),
                    );
                }
            }
        }
    }

    // The match for each player, indexed by player id; unmatched players stay None.
    let mut matching_by_id: Vec<Option<PlayerIndex>> = vec![None; tournament.players.len()];

    // The players of the current bracket and the next, and their solver vertices.
    let mut players_by_index: Vec<&Player> = Vec::new();
    let mut vertex_indices: Vec<VertexIndex> = Vec::new();
    let mut next_score_group_position = 0usize;
    let top_score = sorted_players[0].score_with_acceleration(tournament);
    while next_score_group_position < sorted_players.len()
        && sorted_players[next_score_group_position].score_with_acceleration(tournament) >= top_score
    {
        players_by_index.push(sorted_players[next_score_group_position]);
        vertex_indices.push(vertex_indices.len());
        next_score_group_position += 1;
    }

    // Whether each player (by vertex) has been finally matched.
    let mut matched = vec![false; sorted_players.len()];

    // The number of moved-down players in the current bracket, and the vertex of the
    // first player of the bracket's own score group.
    let mut score_group_begin = 0usize;
    let mut score_group_begin_vertex = 0usize;

    while players_by_index.len() > 1 || next_score_group_position < sorted_players.len() {
        let next_score_group_begin = players_by_index.len();
        let next_score_group_begin_vertex =
            score_group_begin_vertex + (next_score_group_begin - score_group_begin);
        let score_group_position = next_score_group_position;
        while next_score_group_position < sorted_players.len()
            && sorted_players[next_score_group_position].score_with_acceleration(tournament)
                >= sorted_players[score_group_position].score_with_acceleration(tournament)
        {
            players_by_index.push(sorted_players[next_score_group_position]);
            vertex_indices.push(vertex_indices.last().expect("bracket is non-empty") + 1);
            next_score_group_position += 1;
        }

        log::debug!(
            "bracket of {} players ({} moved down), {} in the next group",
            next_score_group_begin,
            score_group_begin,
            players_by_index.len() - next_score_group_begin,
        );

        let context = WeightContext {
            tournament,
            forbidden_pairs: &forbidden_pairs,
            score_group_size_bits,
            score_groups_shift,
            score_group_shifts: &score_group_shifts,
            bye_assignee_score,
            is_single_downfloater_the_bye_assignee,
            unplayed_game_ranks: &unplayed_game_ranks,
            max_edge_weight: &max_edge_weight,
        };
        let mut base_edge_weights = compute_base_edge_weights(
            &players_by_index,
            score_group_begin as PlayerIndex,
            next_score_group_begin as PlayerIndex,
            &context,
        );

        // Load the base weights for the bracket into the matching computer.
        for (opponent_position, opponent_vector) in base_edge_weights.iter().enumerate() {
            let opponent_vertex = vertex_indices[opponent_position];
            for (player_position, edge_weight) in opponent_vector.iter().enumerate() {
                matching_computer.set_edge_weight(
                    opponent_vertex,
                    vertex_indices[player_position],
                    edge_weight.clone(),
                );
            }
        }

        // An edge weight modified for pairing homogeneous brackets or remainders with
        // some of the exchange preferences: maximize pairs whose smaller member sits in
        // the upper half, and minimize the bracket scoring numbers exchanged.
        let edge_weight_computer = |base_edge_weights: &Vec<Vec<EdgeWeightValue>>,
                                    smaller_player_index: usize,
                                    larger_player_index: usize,
                                    smaller_player_remainder_index: usize,
                                    remainder_pairs: usize|
         -> EdgeWeightValue {
            let mut result = base_edge_weights[larger_player_index][smaller_player_index].clone();
            if !result.is_zero() {
                if smaller_player_remainder_index < remainder_pairs {
                    let mut addend = result.zero_like();
                    addend |= 1;
                    addend <<= score_group_size_bits;
                    addend <<= score_group_size_bits;
                    addend -= smaller_player_remainder_index as u64;
                    addend <<= 1;
                    result += &addend;
                } else if smaller_player_remainder_index > 0 {
                    result -= (smaller_player_remainder_index as u64) << 1;
                }
            }
            result
        };

        matching_computer.compute_matching();
        let mut stable_matching = matching_computer.matching();

        // Choose the moved-down players to pair in the current bracket, one downfloater
        // per score group where possible.
        let mut moved_down_score_group: Points = 0;
        let mut remaining_moved_down_players = 0usize;
        let mut remaining_matched_moved_down_players = 0usize;
        for player_position in 0..score_group_begin {
            let player_score = players_by_index[player_position].score_with_acceleration(tournament);
            if player_position == 0 || player_score < moved_down_score_group {
                // Count the moved-down players sharing this score, and how many of them
                // the stable matching places inside the bracket.
                moved_down_score_group = player_score;
                remaining_matched_moved_down_players = 0;
                remaining_moved_down_players = 0;
                let mut moved_down_position = player_position;
                while moved_down_position < players_by_index.len()
                    && players_by_index[moved_down_position].score_with_acceleration(tournament)
                        >= moved_down_score_group
                {
                    remaining_moved_down_players += 1;
                    let moved_down_vertex = vertex_indices[moved_down_position];
                    if stable_matching[moved_down_vertex] >= score_group_begin_vertex
                        && stable_matching[moved_down_vertex] < next_score_group_begin_vertex
                    {
                        remaining_matched_moved_down_players += 1;
                    }
                    moved_down_position += 1;
                }
            }
            if remaining_matched_moved_down_players == 0 {
                continue;
            }
            let player_vertex = vertex_indices[player_position];
            if remaining_moved_down_players <= remaining_matched_moved_down_players {
                matched[player_vertex] = true;
                continue;
            }
            remaining_moved_down_players -= 1;
            if stable_matching[player_vertex] < score_group_begin_vertex
                || stable_matching[player_vertex] >= next_score_group_begin_vertex
            {
                // Try to match the player inside the bracket.
                for opponent_position in score_group_begin..next_score_group_begin {
                    let mut edge_weight =
                        base_edge_weights[opponent_position][player_position].clone();
                    if !edge_weight.is_zero() {
                        edge_weight |= 1;
                        matching_computer.set_edge_weight(
                            player_vertex,
                            vertex_indices[opponent_position],
                            edge_weight,
                        );
                    }
                }

                matching_computer.compute_matching();
                stable_matching = matching_computer.matching();
            }
            if stable_matching[player_vertex] >= score_group_begin_vertex
                && stable_matching[player_vertex] < next_score_group_begin_vertex
            {
                // Finalize the fact that this player will be matched.
                matched[player_vertex] = true;
                remaining_matched_moved_down_players -= 1;
                for opponent_position in score_group_begin..next_score_group_begin {
                    let mut edge_weight =
                        base_edge_weights[opponent_position][player_position].clone();
                    if !edge_weight.is_zero() {
                        edge_weight |= (next_score_group_begin - score_group_begin) as u64;
                        edge_weight.increment();
                        matching_computer.set_edge_weight(
                            player_vertex,
                            vertex_indices[opponent_position],
                            edge_weight,
                        );
                    }
                }
            }
        }

        // Choose the opponents of the moved-down players, preferring higher ranks.
        for player_position in 0..score_group_begin {
            let player_vertex = vertex_indices[player_position];
            if !matched[player_vertex] {
                continue;
            }
            let mut addend = players_by_index.len() as u64;
            for opponent_position in (score_group_begin..next_score_group_begin).rev() {
                let opponent_vertex = vertex_indices[opponent_position];
                if matched[opponent_vertex] {
                    continue;
                }
                let mut edge_weight = base_edge_weights[opponent_position][player_position].clone();
                if !edge_weight.is_zero() {
                    edge_weight += addend;
                    matching_computer.set_edge_weight(player_vertex, opponent_vertex, edge_weight);
                    addend += 1;
                }
            }

            matching_computer.compute_matching();
            stable_matching = matching_computer.matching();

            // Finalize the pairing.
            let match_vertex = stable_matching[player_vertex];
            matched[match_vertex] = true;
            finalize_pair(player_vertex, match_vertex, &mut matching_computer, max_edge_weight.clone());
        }

        // Collect the remainder of the bracket and the number of pairs it can form.
        let mut remainder: Vec<usize> = Vec::new();
        let mut remainder_pairs = 0usize;
        for player_position in score_group_begin..next_score_group_begin {
            let player_vertex = vertex_indices[player_position];
            if stable_matching[player_vertex] < score_group_begin_vertex {
                continue;
            }
            remainder.push(player_position);
            if stable_matching[player_vertex] < player_vertex {
                remainder_pairs += 1;
            }
        }

        // Update edge weights to minimize exchanged players and the differences of
        // exchanged bracket scoring numbers.
        for (opponent_remainder_index, &opponent_position) in remainder.iter().enumerate() {
            let opponent_vertex = vertex_indices[opponent_position];
            for (player_remainder_index, &player_position) in
                remainder.iter().enumerate().take(opponent_remainder_index)
            {
                matching_computer.set_edge_weight(
                    vertex_indices[player_position],
                    opponent_vertex,
                    edge_weight_computer(
                        &base_edge_weights,
                        player_position,
                        opponent_position,
                        player_remainder_index,
                        remainder_pairs,
                    ),
                );
            }
        }

        matching_computer.compute_matching();
        stable_matching = matching_computer.matching();

        // The number of exchanges that must be made.
        let mut exchange_count = 0usize;
        for &player_position in remainder.iter() {
            if remainder_pairs >= remainder.len() || player_position >= remainder[remainder_pairs] {
                break;
            }
            let player_vertex = vertex_indices[player_position];
            exchange_count += (stable_matching[player_vertex] <= player_vertex
                || stable_matching[player_vertex] >= next_score_group_begin_vertex)
                as usize;
        }

        // Select the lowest players of the upper half to be exchanged where possible.
        let mut exchanges_remaining = exchange_count;
        let mut position = remainder_pairs;
        while position > 0 && exchanges_remaining > 0 {
            position -= 1;
            let player_position = remainder[position];
            let player_vertex = vertex_indices[player_position];
            if stable_matching[player_vertex] > player_vertex
                && stable_matching[player_vertex] < next_score_group_begin_vertex
            {
                // Decrement the exchange bit to see whether this player can be exchanged.
                for &opponent_position in remainder.iter().skip(position + 1) {
                    let mut edge_weight = edge_weight_computer(
                        &base_edge_weights,
                        player_position,
                        opponent_position,
                        position,
                        remainder_pairs,
                    );
                    if !edge_weight.is_zero() {
                        edge_weight -= 1u64;
                        matching_computer.set_edge_weight(
                            player_vertex,
                            vertex_indices[opponent_position],
                            edge_weight,
                        );
                    }
                }

                matching_computer.compute_matching();
                stable_matching = matching_computer.matching();
            }

            let exchange = stable_matching[player_vertex] <= player_vertex
                || stable_matching[player_vertex] >= next_score_group_begin_vertex;
            exchanges_remaining -= exchange as usize;

            for &opponent_position in remainder.iter().skip(position + 1) {
                // Finalize that this player must be exchanged, or restore the original
                // edge weights.
                if exchange {
                    base_edge_weights[opponent_position][player_position] &= 0;
                }
                matching_computer.set_edge_weight(
                    player_vertex,
                    vertex_indices[opponent_position],
                    edge_weight_computer(
                        &base_edge_weights,
                        player_position,
                        opponent_position,
                        position,
                        remainder_pairs,
                    ),
                );
            }
        }

        // Select the highest players of the lower half to be exchanged where possible.
        exchanges_remaining = exchange_count;
        let mut remainder_index = remainder_pairs;
        while remainder_index < remainder.len() && exchanges_remaining > 1 {
            let player_position = remainder[remainder_index];
            let player_vertex = vertex_indices[player_position];
            let already_exchanged = stable_matching[player_vertex] > player_vertex
                && stable_matching[player_vertex] < next_score_group_begin_vertex;
            if !already_exchanged {
                // Increment the exchange bit to see whether this player can be exchanged.
                for &opponent_position in remainder.iter().skip(remainder_index + 1) {
                    let mut edge_weight = edge_weight_computer(
                        &base_edge_weights,
                        player_position,
                        opponent_position,
                        remainder_index,
                        remainder_pairs,
                    );
                    if !edge_weight.is_zero() {
                        edge_weight.increment();
                        matching_computer.set_edge_weight(
                            player_vertex,
                            vertex_indices[opponent_position],
                            edge_weight,
                        );
                    }
                }

                matching_computer.compute_matching();
                stable_matching = matching_computer.matching();
            }

            let exchange = stable_matching[player_vertex] > player_vertex
                && stable_matching[player_vertex] < next_score_group_begin_vertex;

            if exchange {
                exchanges_remaining -= 1;

                // Finalize that this player must be exchanged.
                for &opponent_position in remainder.iter().take(remainder_index) {
                    base_edge_weights[player_position][opponent_position] &= 0;
                    matching_computer.set_edge_weight(
                        player_vertex,
                        vertex_indices[opponent_position],
                        base_edge_weights[player_position][opponent_position].clone(),
                    );
                }
                for opponent_position in next_score_group_begin..players_by_index.len() {
                    base_edge_weights[opponent_position][player_position] &= 0;
                    matching_computer.set_edge_weight(
                        player_vertex,
                        vertex_indices[opponent_position],
                        base_edge_weights[opponent_position][player_position].clone(),
                    );
                }
            }
            if !already_exchanged {
                // Restore the original edge weights.
                for &opponent_position in remainder.iter().skip(remainder_index + 1) {
                    matching_computer.set_edge_weight(
                        player_vertex,
                        vertex_indices[opponent_position],
                        edge_weight_computer(
                            &base_edge_weights,
                            player_position,
                            opponent_position,
                            remainder_index,
                            remainder_pairs,
                        ),
                    );
                }
            }
            remainder_index += 1;
        }

        // Finalize which players are exchanged, and drop the bits used to decide that.
        for (player_remainder_position, &player_position) in remainder.iter().enumerate() {
            let player_vertex = vertex_indices[player_position];
            for &opponent_position in remainder.iter().skip(player_remainder_position + 1) {
                let opponent_vertex = vertex_indices[opponent_position];
                if stable_matching[player_vertex] <= player_vertex
                    || stable_matching[player_vertex] >= next_score_group_begin_vertex
                    || (stable_matching[opponent_vertex] > opponent_vertex
                        && stable_matching[opponent_vertex] < next_score_group_begin_vertex)
                {
                    base_edge_weights[opponent_position][player_position] &= 0;
                }
                matching_computer.set_edge_weight(
                    player_vertex,
                    opponent_vertex,
                    base_edge_weights[opponent_position][player_position].clone(),
                );
            }
        }

        // Choose the opponent of each player of the first group, preferring higher ranks.
        for &player_position in remainder.iter() {
            let player_vertex = vertex_indices[player_position];
            if stable_matching[player_vertex] > player_vertex
                && stable_matching[player_vertex] < next_score_group_begin_vertex
            {
                let mut addend: u64 = 0;
                for &opponent_position in remainder.iter().rev() {
                    let opponent_vertex = vertex_indices[opponent_position];
                    if opponent_position <= player_position || matched[opponent_vertex] {
                        continue;
                    }
                    let mut edge_weight =
                        base_edge_weights[opponent_position][player_position].clone();
                    if !edge_weight.is_zero() {
                        edge_weight += addend;
                        matching_computer.set_edge_weight(player_vertex, opponent_vertex, edge_weight);
                        addend += 1;
                    }
                }

                matching_computer.compute_matching();
                stable_matching = matching_computer.matching();

                // Finalize the pairing.
                let match_vertex = stable_matching[player_vertex];
                matched[player_vertex] = true;
                matched[match_vertex] = true;
                finalize_pair(player_vertex, match_vertex, &mut matching_computer, max_edge_weight.clone());
            }
        }

        // Compute the new values for the next pairing bracket.
        let mut new_players_by_index: Vec<&Player> = Vec::new();
        let mut new_vertex_indices: Vec<VertexIndex> = Vec::new();
        score_group_begin = 0;

        // Preliminary; the loop below may clear it.
        is_single_downfloater_the_bye_assignee = sorted_players.len() & 1 == 1
            && score_group_position < sorted_players.len()
            && bye_assignee_score
                >= sorted_players[score_group_position].score_with_acceleration(tournament);

        for player_position in 0..players_by_index.len() {
            let player_vertex = vertex_indices[player_position];
            if player_position < next_score_group_begin && matched[player_vertex] {
                // Save the pair.
                let player_id = players_by_index[player_position].id;
                let partner_id = sorted_players[stable_matching[player_vertex]].id;
                matching_by_id[player_id as usize] = Some(partner_id);
                matching_by_id[partner_id as usize] = Some(player_id);
            } else {
                // Carry the player into the next bracket.
                new_players_by_index.push(players_by_index[player_position]);
                new_vertex_indices.push(player_vertex);
                if player_position < next_score_group_begin {
                    score_group_begin += 1;
                }
                if is_single_downfloater_the_bye_assignee
                    && sorted_players[stable_matching[player_vertex]]
                        .score_with_acceleration(tournament)
                        < sorted_players[score_group_position].score_with_acceleration(tournament)
                {
                    is_single_downfloater_the_bye_assignee = false;
                }
            }
        }

        players_by_index = new_players_by_index;
        vertex_indices = new_vertex_indices;
        score_group_begin_vertex = next_score_group_begin_vertex;
    }

    // Generate the list of pairings.
    let mut result = Vec::new();
    for player in sorted_players.iter() {
        match matching_by_id[player.id as usize] {
            Some(partner_id) => {
                debug_assert!(tournament.players[partner_id as usize].is_valid);
                if player.id < partner_id {
                    result.push(Pairing::with_color(
                        player.id,
                        partner_id,
                        choose_player_color(
                            player,
                            &tournament.players[partner_id as usize],
                            tournament,
                        ),
                    ));
                }
            }
            None => result.push(Pairing::new(player.id, player.id)),
        }
    }

    if let Some(output) = checklist.as_deref_mut() {
        let _ = print_dutch_checklist(tournament, &sorted_players, output, Some(&matching_by_id));
    }

    sort_results(&mut result, tournament);
    Ok(result)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::tournament::{Match, MatchScore};

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

    /// Two players who already played each other in round one.
    fn round_one_rematch_tournament() -> Tournament {
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
        tournament
    }

    #[test]
    fn dutch_two_players_rematch_with_inverted_colors_1() {
        // cargo test dutch_two_players_rematch_with_inverted_colors_1 -- --nocapture
        // the two players already met, so this exercises the rematch fallback
        let pairs = compute_matching(round_one_rematch_tournament(), None).unwrap();
        assert_eq!(pairs, vec![Pairing { white: 1, black: 0 }]);
    }

    #[test]
    fn dutch_rematch_fallback_checklist_matches_result_1() {
        // cargo test dutch_rematch_fallback_checklist_matches_result_1 -- --nocapture
        // the checklist written on the fallback path must describe the round that was
        // actually paired, not the failed first attempt
        let mut checklist = Vec::new();
        let pairs =
            compute_matching(round_one_rematch_tournament(), Some(&mut checklist)).unwrap();
        assert_eq!(pairs, vec![Pairing { white: 1, black: 0 }]);
        let checklist = String::from_utf8(checklist).unwrap();
        assert!(checklist.contains("(2B)"), "checklist lacks the pairing: {}", checklist);
        assert!(checklist.contains("(1W)"), "checklist lacks the pairing: {}", checklist);
    }

    #[test]
    fn dutch_three_players_bye_goes_to_lowest_1() {
        // cargo test dutch_three_players_bye_goes_to_lowest_1 -- --nocapture
        let tournament = fresh_players(3);
        let pairs = compute_matching(tournament, None).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], Pairing { white: 0, black: 1 });
        assert_eq!(pairs[1], Pairing { white: 2, black: 2 });
    }

    #[test]
    fn dutch_forbidden_pair_is_avoided_1() {
        // cargo test dutch_forbidden_pair_is_avoided_1 -- --nocapture
        let mut tournament = fresh_players(4);
        tournament.forbid_pairs(&[0, 1]);
        let pairs = compute_matching(tournament, None).unwrap();
        assert_eq!(pairs.len(), 2);
        for pair in pairs.iter() {
            assert!(
                !(pair.white == 0 && pair.black == 1) && !(pair.white == 1 && pair.black == 0),
                "the forbidden pair 0-1 must not meet: {:?}",
                pairs
            );
        }
    }

    #[test]
    fn dutch_forbidden_pair_unsatisfiable_1() {
        // cargo test dutch_forbidden_pair_unsatisfiable_1 -- --nocapture
        let mut tournament = fresh_players(2);
        tournament.forbid_pairs(&[0, 1]);
        match compute_matching(tournament, None) {
            Err(PairingError::NoValidPairing(_)) => {}
            other => panic!("expected NoValidPairing, got {:?}", other),
        }
    }

    #[test]
    fn dutch_four_players_first_round_1() {
        // cargo test dutch_four_players_first_round_1 -- --nocapture
        // standard first-round top-half versus bottom-half pairing
        let tournament = fresh_players(4);
        let pairs = compute_matching(tournament, None).unwrap();
        assert_eq!(pairs.len(), 2);
        let meets: Vec<(PlayerIndex, PlayerIndex)> = pairs
            .iter()
            .map(|pair| (pair.white.min(pair.black), pair.white.max(pair.black)))
            .collect();
        assert!(meets.contains(&(0, 2)), "top plays upper bottom: {:?}", pairs);
        assert!(meets.contains(&(1, 3)), "second plays lower bottom: {:?}", pairs);
    }

    #[test]
    fn dutch_every_player_appears_once_1() {
        // cargo test dutch_every_player_appears_once_1 -- --nocapture
        let tournament = fresh_players(9);
        let pairs = compute_matching(tournament, None).unwrap();
        let mut seen = vec![0; 9];
        let mut byes = 0;
        for pair in pairs.iter() {
            if pair.is_bye() {
                byes += 1;
                seen[pair.white as usize] += 1;
            } else {
                seen[pair.white as usize] += 1;
                seen[pair.black as usize] += 1;
            }
        }
        assert_eq!(byes, 1);
        assert!(seen.iter().all(|&count| count == 1), "{:?}", pairs);
    }
}
