//! Tournament Model
//!
//! The immutable snapshot a pairing request works from: players with their match
//! histories, accumulated scores, accelerations and forbidden opponents, plus the
//! tournament-wide configuration. Derived per-round data (effective pairing numbers,
//! color preferences, played-game counts) is recomputed from the raw history before each
//! pairing by [`Tournament::update_ranks`] and [`Tournament::compute_player_data`].
//!

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::util::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
    None,
}

impl Color {
    pub fn invert(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
            Color::None => Color::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchScore {
    Loss,
    Draw,
    Win,
}

impl MatchScore {
    pub fn invert(self) -> MatchScore {
        match self {
            MatchScore::Loss => MatchScore::Win,
            MatchScore::Draw => MatchScore::Draw,
            MatchScore::Win => MatchScore::Loss,
        }
    }
}

/// The history of a single player on a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// the opponent's id; the player's own id denotes the lack of an opponent
    pub opponent: PlayerIndex,
    pub color: Color,
    pub match_score: MatchScore,
    /// false for forfeits and byes
    pub game_was_played: bool,
    /// the player was either paired or given the pairing-allocated bye
    pub participated_in_pairing: bool,
}

impl Match {
    /// A round in which the player was not paired at all.
    pub fn unpaired(player: PlayerIndex) -> Self {
        Self {
            opponent: player,
            color: Color::None,
            match_score: MatchScore::Loss,
            game_was_played: false,
            participated_in_pairing: false,
        }
    }

    pub fn new(
        opponent: PlayerIndex,
        color: Color,
        match_score: MatchScore,
        game_was_played: bool,
        participated_in_pairing: bool,
    ) -> Self {
        Self {
            opponent,
            color,
            match_score,
            game_was_played,
            participated_in_pairing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub matches: Vec<Match>,
    /// round-indexed acceleration points; rounds past the end imply zero
    pub accelerations: Vec<Points>,
    /// opponents this player may not be paired against
    pub forbidden_pairs: HashSet<PlayerIndex>,
    /// |games as white - games as black|
    pub color_imbalance: RoundIndex,
    /// the zero-indexed pairing id used for input and output
    pub id: PlayerIndex,
    /// the effective pairing number for the current round, used for choosing colors and
    /// breaking ties
    pub rank_index: PlayerIndex,
    /// zero denotes a missing rating
    pub rating: Rating,
    pub score_without_acceleration: Points,
    pub color_preference: Color,
    /// the color of the current run of two or more consecutive same-color games, if any
    pub repeated_color: Color,
    pub strong_color_preference: bool,
    pub played_games: RoundIndex,
    /// whether the record corresponds to a player rather than a hole in the player ids
    pub is_valid: bool,
}

impl Player {
    pub fn new(id: PlayerIndex, points: Points, rating: Rating, matches: Vec<Match>) -> Self {
        Self {
            matches,
            accelerations: Vec::new(),
            forbidden_pairs: HashSet::new(),
            color_imbalance: 0,
            id,
            rank_index: id,
            rating,
            score_without_acceleration: points,
            color_preference: Color::None,
            repeated_color: Color::None,
            strong_color_preference: false,
            played_games: 0,
            is_valid: true,
        }
    }

    /// A placeholder for a hole in the player ids.
    pub fn invalid(id: PlayerIndex) -> Self {
        let mut player = Self::new(id, 0, 0, Vec::new());
        player.is_valid = false;
        player
    }

    /// Whether the difference between games as white and as black forces a color.
    pub fn absolute_color_imbalance(&self) -> bool {
        self.color_imbalance > 1
    }

    pub fn absolute_color_preference(&self) -> bool {
        self.absolute_color_imbalance() || self.repeated_color != Color::None
    }

    /// The score including acceleration on the round `rounds_back` before the current
    /// round.
    pub fn score_with_acceleration_at(&self, tournament: &Tournament, rounds_back: RoundIndex) -> Points {
        let mut score = self.score_without_acceleration;
        let mut round_index = tournament.played_rounds;
        let mut remaining = rounds_back;
        while remaining > 0 {
            round_index -= 1;
            score -= tournament.points_for(self, &self.matches[round_index]);
            remaining -= 1;
        }
        score + self.accelerations.get(round_index).copied().unwrap_or(0)
    }

    pub fn score_with_acceleration(&self, tournament: &Tournament) -> Points {
        self.score_with_acceleration_at(tournament, 0)
    }

    /// The acceleration applying to the round being paired.
    pub fn acceleration(&self, tournament: &Tournament) -> Points {
        self.accelerations.get(tournament.played_rounds).copied().unwrap_or(0)
    }
}

/// Compare two players by current score, breaking ties by rank index.
pub fn unaccelerated_score_rank_compare(player0: &Player, player1: &Player) -> bool {
    (player0.score_without_acceleration, player1.rank_index)
        < (player1.score_without_acceleration, player0.rank_index)
}

/// Compare two players by current accelerated score, breaking ties by rank index.
pub fn accelerated_score_rank_compare(player0: &Player, player1: &Player, tournament: &Tournament) -> bool {
    (player0.score_with_acceleration(tournament), player1.rank_index)
        < (player1.score_with_acceleration(tournament), player0.rank_index)
}

/// The details and history of a tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    /// players indexed by id
    pub players: Vec<Player>,
    /// player ids ordered by effective pairing number
    pub players_by_rank: Vec<PlayerIndex>,
    pub played_rounds: RoundIndex,
    pub expected_rounds: RoundIndex,
    pub point_system: PointSystem,
    pub initial_color: Color,
    pub default_acceleration: bool,
}

impl Default for Tournament {
    fn default() -> Self {
        Self {
            players: Vec::new(),
            players_by_rank: Vec::new(),
            played_rounds: 0,
            expected_rounds: 0,
            point_system: PointSystem::default(),
            initial_color: Color::None,
            default_acceleration: true,
        }
    }
}

impl Tournament {
    pub fn new() -> Self {
        Self::default()
    }

    /// The points the player earned from the given match record.
    pub fn points_for(&self, player: &Player, game: &Match) -> Points {
        match game.match_score {
            MatchScore::Loss => {
                if game.participated_in_pairing {
                    if game.game_was_played {
                        self.point_system.points_for_loss
                    } else {
                        self.point_system.points_for_forfeit_loss
                    }
                } else {
                    self.point_system.points_for_zero_point_bye
                }
            }
            MatchScore::Win => {
                if game.opponent == player.id && game.participated_in_pairing {
                    self.point_system.points_for_pairing_allocated_bye
                } else {
                    self.point_system.points_for_win
                }
            }
            MatchScore::Draw => self.point_system.points_for_draw,
        }
    }

    /// The plain win/draw/loss value of a result, ignoring bye and forfeit rules.
    pub fn match_points(&self, score: MatchScore) -> Points {
        match score {
            MatchScore::Win => self.point_system.points_for_win,
            MatchScore::Draw => self.point_system.points_for_draw,
            MatchScore::Loss => self.point_system.points_for_loss,
        }
    }

    /// Exclude all the listed players from playing each other.
    pub fn forbid_pairs(&mut self, group: &[PlayerIndex]) {
        for &first in group {
            for &second in group {
                if first != second {
                    self.players[first as usize].forbidden_pairs.insert(second);
                }
            }
        }
    }

    /// Update the players' `rank_index` and `is_valid` members.
    pub fn update_ranks(&mut self) {
        let mut effective_pairing_number: PlayerIndex = 0;
        for position in 0..self.players_by_rank.len() {
            let player_id = self.players_by_rank[position];
            let player = &mut self.players[player_id as usize];

            player.is_valid = player.matches.len() <= self.played_rounds;
            for game in player.matches.iter() {
                if game.participated_in_pairing {
                    player.is_valid = true;
                }
            }

            if player.is_valid {
                player.rank_index = effective_pairing_number;
                effective_pairing_number += 1;
            }
        }
    }

    /// Update the players' color preference, repeated color, imbalance and played-game
    /// data from their raw match histories.
    pub fn compute_player_data(&mut self) {
        for player in self.players.iter_mut() {
            if !player.is_valid {
                continue;
            }
            let mut games_as_white: RoundIndex = 0;
            let mut games_as_black: RoundIndex = 0;
            let mut consecutive_count: RoundIndex = 0;
            let mut played_games: RoundIndex = 0;
            player.repeated_color = Color::None;
            for game in player.matches.iter() {
                if game.game_was_played {
                    played_games += 1;
                    if game.color == Color::White {
                        games_as_white += 1;
                    } else {
                        games_as_black += 1;
                    }
                    if consecutive_count == 0 || game.color != player.repeated_color {
                        consecutive_count = 1;
                    } else {
                        consecutive_count += 1;
                    }
                    player.repeated_color = game.color;
                }
            }
            player.played_games = played_games;
            let lower_color = if games_as_white > games_as_black {
                Color::Black
            } else {
                Color::White
            };
            player.color_imbalance = if lower_color == Color::Black {
                games_as_white - games_as_black
            } else {
                games_as_black - games_as_white
            };
            player.color_preference = if player.color_imbalance > 1 {
                lower_color
            } else if consecutive_count > 1 {
                player.repeated_color.invert()
            } else if player.color_imbalance > 0 {
                lower_color
            } else if consecutive_count > 0 {
                player.repeated_color.invert()
            } else {
                Color::None
            };
            if consecutive_count <= 1 {
                player.repeated_color = Color::None;
            }
            player.strong_color_preference =
                !player.absolute_color_preference() && player.color_imbalance != 0;
        }
    }

    /// Infer the randomly chosen color of the top player present in the first round in
    /// which any two players were assigned colors. Returns `Color::None` when the history
    /// shows no colors at all.
    pub fn infer_initial_color(&self) -> Color {
        let mut min_color_round = RoundIndex::MAX;
        for player in self.players.iter() {
            if player.is_valid {
                for (round_index, game) in player.matches.iter().enumerate() {
                    if game.color != Color::None {
                        min_color_round = min_color_round.min(round_index);
                    }
                }
            }
        }
        if min_color_round == RoundIndex::MAX {
            return Color::None;
        }

        let mut result = Color::None;
        let mut effective_pairing_number: PlayerIndex = 0;
        for &player_id in self.players_by_rank.iter() {
            let player = &self.players[player_id as usize];
            let participated = player
                .matches
                .iter()
                .take(min_color_round + 1)
                .any(|game| game.participated_in_pairing);
            if participated {
                if result == Color::None {
                    result = if effective_pairing_number & 1 == 1 {
                        player.matches[min_color_round].color.invert()
                    } else {
                        player.matches[min_color_round].color
                    };
                }
                effective_pairing_number += 1;
            }
        }
        result
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn played(opponent: PlayerIndex, color: Color, score: MatchScore) -> Match {
        Match::new(opponent, color, score, true, true)
    }

    #[test]
    fn tournament_color_preference_rules_1() {
        // cargo test tournament_color_preference_rules_1 -- --nocapture
        let mut tournament = Tournament::new();
        // two whites in a row and imbalance two: absolute preference for black
        let repeater = Player::new(0, 20, 0, vec![
            played(1, Color::White, MatchScore::Win),
            played(2, Color::Black, MatchScore::Win),
            played(3, Color::White, MatchScore::Draw),
            played(4, Color::White, MatchScore::Draw),
        ]);
        // imbalance 2: absolute preference via imbalance
        let unbalanced = Player::new(1, 10, 0, vec![
            played(0, Color::White, MatchScore::Loss),
            played(2, Color::White, MatchScore::Win),
        ]);
        // single game: mild preference
        let mild = Player::new(2, 5, 0, vec![played(1, Color::Black, MatchScore::Draw)]);
        tournament.players = vec![repeater, unbalanced, mild];
        tournament.players_by_rank = vec![0, 1, 2];
        tournament.played_rounds = 4;
        tournament.compute_player_data();

        let repeater = &tournament.players[0];
        assert_eq!(repeater.color_preference, Color::Black);
        assert_eq!(repeater.repeated_color, Color::White);
        assert!(repeater.absolute_color_preference());
        assert_eq!(repeater.color_imbalance, 2);

        let unbalanced = &tournament.players[1];
        assert_eq!(unbalanced.color_preference, Color::Black);
        assert!(unbalanced.absolute_color_imbalance());

        let mild = &tournament.players[2];
        assert_eq!(mild.color_preference, Color::White);
        assert!(!mild.absolute_color_preference());
        assert!(mild.strong_color_preference);
        assert_eq!(mild.played_games, 1);
    }

    #[test]
    fn tournament_points_for_byes_1() {
        // cargo test tournament_points_for_byes_1 -- --nocapture
        let tournament = Tournament::new();
        let player = Player::new(3, 0, 0, Vec::new());
        let pairing_bye = Match::new(3, Color::None, MatchScore::Win, false, true);
        assert_eq!(tournament.points_for(&player, &pairing_bye), 10);
        let zero_bye = Match::new(3, Color::None, MatchScore::Loss, false, false);
        assert_eq!(tournament.points_for(&player, &zero_bye), 0);
        let forfeit_loss = Match::new(5, Color::None, MatchScore::Loss, false, true);
        assert_eq!(tournament.points_for(&player, &forfeit_loss), 0);
        let forfeit_win = Match::new(5, Color::None, MatchScore::Win, false, true);
        assert_eq!(tournament.points_for(&player, &forfeit_win), 10);
        let draw = Match::new(5, Color::White, MatchScore::Draw, true, true);
        assert_eq!(tournament.points_for(&player, &draw), 5);
    }

    #[test]
    fn tournament_update_ranks_skips_invalid_1() {
        // cargo test tournament_update_ranks_skips_invalid_1 -- --nocapture
        let mut tournament = Tournament::new();
        tournament.players = vec![
            Player::new(0, 0, 1500, Vec::new()),
            Player::invalid(1),
            Player::new(2, 0, 1600, Vec::new()),
        ];
        tournament.players_by_rank = vec![0, 2];
        tournament.update_ranks();
        assert_eq!(tournament.players[0].rank_index, 0);
        assert_eq!(tournament.players[2].rank_index, 1);
    }

    #[test]
    fn tournament_infer_initial_color_1() {
        // cargo test tournament_infer_initial_color_1 -- --nocapture
        let mut tournament = Tournament::new();
        tournament.players = vec![
            Player::new(0, 10, 0, vec![played(1, Color::Black, MatchScore::Win)]),
            Player::new(1, 0, 0, vec![played(0, Color::White, MatchScore::Loss)]),
        ];
        tournament.players_by_rank = vec![0, 1];
        tournament.played_rounds = 1;
        // the top player has effective pairing number 0 (even), so their first-round
        // color is the tournament's initial color
        assert_eq!(tournament.infer_initial_color(), Color::Black);
    }

    #[test]
    fn tournament_score_with_acceleration_at_1() {
        // cargo test tournament_score_with_acceleration_at_1 -- --nocapture
        let mut tournament = Tournament::new();
        let mut player = Player::new(0, 15, 0, vec![
            played(1, Color::White, MatchScore::Win),
            played(2, Color::Black, MatchScore::Draw),
        ]);
        player.accelerations = vec![10, 10, 0];
        tournament.players_by_rank = vec![0, 1, 2];
        tournament.played_rounds = 2;
        tournament.players.push(player);
        let player = &tournament.players[0];
        assert_eq!(player.score_with_acceleration(&tournament), 15);
        assert_eq!(player.score_with_acceleration_at(&tournament, 1), 20);
        assert_eq!(player.score_with_acceleration_at(&tournament, 2), 10);
    }
}
