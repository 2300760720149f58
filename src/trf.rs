//! TRF(x) Reader and Writer
//!
//! The tournament report format dialect used by the engine: `001` player lines with one
//! ten-column cell per round, `XXR` for the number of rounds, `XXC` for the initial
//! color, `XXA` for per-round accelerations, `XXP` for forbidden pairs, and
//! `BBW`/`BBD`/`BBL`/`BBZ`/`BBF`/`BBU` for configured point values. Scores are stored as
//! ten times the value with one decimal.
//!
//! Per-round result codes: `1`/`W`/`+` and the unplayed bye codes `F`/`U` count as wins,
//! `0`/`L`/`-`/`Z` and blank as losses, `=`/`D`/`H` as draws. `H`, `F`, `U`, `Z`, blank
//! and the forfeit codes `+`/`-` mark the game as not played; opponent `0000` means no
//! opponent. A trailing column of byes for the round being paired is accepted when
//! requested and bumps the number of played rounds.
//!

use std::io::{BufRead, Write};

use crate::error::FileError;
use crate::tournament::{Color, Match, MatchScore, Player, Tournament};
use crate::util::*;

fn invalid_line(line_number: usize) -> FileError {
    FileError::Format(format!("line {} is malformed", line_number))
}

/// Parse a 1-based pairing number into a 0-based player id.
fn read_player_id(field: &str, line_number: usize) -> Result<PlayerIndex, FileError> {
    let value: usize = field
        .trim()
        .parse()
        .map_err(|_| invalid_line(line_number))?;
    if value == 0 {
        return Err(invalid_line(line_number));
    }
    if value > MAX_PLAYERS as usize {
        return Err(FileError::Limit(format!(
            "this build only supports {} players",
            MAX_PLAYERS
        )));
    }
    Ok((value - 1) as PlayerIndex)
}

/// Parse a score with up to one decimal place into tenths.
fn read_score(field: &str, line_number: usize) -> Result<Points, FileError> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Err(invalid_line(line_number));
    }
    let (whole, tenth) = match trimmed.split_once('.') {
        Some((whole, fraction)) => {
            if fraction.len() != 1 {
                return Err(invalid_line(line_number));
            }
            let tenth: Points = fraction.parse().map_err(|_| invalid_line(line_number))?;
            (whole, tenth)
        }
        None => (trimmed, 0),
    };
    let whole: Points = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid_line(line_number))?
    };
    let result = whole * 10 + tenth;
    if result > MAX_POINTS {
        return Err(FileError::Limit(format!(
            "this build only supports scores up to {}",
            crate::swiss::format_points(MAX_POINTS)
        )));
    }
    Ok(result)
}

fn field(line: &[u8], start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    let start = start.min(end);
    std::str::from_utf8(&line[start..end]).unwrap_or("")
}

/// Process a `001` line.
fn read_player(
    line: &[u8],
    line_number: usize,
    tournament: &mut Tournament,
) -> Result<(), FileError> {
    if line.len() < 84 {
        return Err(invalid_line(line_number));
    }

    let id = read_player_id(field(line, 4, 8), line_number)?;

    let mut rating: Rating = 0;
    let rating_field = field(line, 48, 52);
    if !rating_field.trim().is_empty() {
        rating = rating_field.trim().parse().map_err(|_| invalid_line(line_number))?;
        if rating > MAX_RATING {
            return Err(FileError::Limit(format!(
                "this build only supports ratings up to {}",
                MAX_RATING
            )));
        }
    }

    let score = read_score(field(line, 80, 84), line_number)?;

    let mut skipped_rounds: RoundIndex = 0;
    let mut matches: Vec<Match> = Vec::new();
    let mut start_index = 91usize;
    while start_index + 8 <= line.len() {
        // an all-blank cell is trailing space unless later games were recorded
        let mut skip = true;
        let mut game_was_played = true;
        let opponent_field = field(line, start_index, start_index + 4);
        let mut opponent = id;
        if opponent_field != "    " {
            if opponent_field != "0000" {
                opponent = read_player_id(opponent_field, line_number)?;
                if opponent == id {
                    return Err(invalid_line(line_number));
                }
            }
            skip = false;
        }
        if opponent == id {
            game_was_played = false;
        }

        let color_char = line[start_index + 5] as char;
        let color = match color_char {
            'w' => Color::White,
            'b' => Color::Black,
            _ => Color::None,
        };
        match color_char {
            'w' | 'b' => skip = false,
            '-' => {
                skip = false;
                game_was_played = false;
            }
            ' ' => game_was_played = false,
            _ => return Err(invalid_line(line_number)),
        }
        if opponent == id && color != Color::None {
            return Err(invalid_line(line_number));
        }

        let result_char = (line[start_index + 7] as char).to_ascii_uppercase();
        let match_score = match result_char {
            'D' | '=' | 'H' => MatchScore::Draw,
            '+' | 'W' | '1' | 'F' | 'U' => MatchScore::Win,
            '-' | 'L' | '0' | 'Z' | ' ' => MatchScore::Loss,
            _ => return Err(invalid_line(line_number)),
        };
        if matches!(result_char, '+' | '-' | 'H' | 'F' | 'U' | 'Z' | ' ') {
            game_was_played = false;
            if result_char != '+' && result_char != '-' && opponent != id {
                return Err(invalid_line(line_number));
            }
        } else if color == Color::None && (result_char != '=' || opponent != id) {
            return Err(invalid_line(line_number));
        }
        if result_char != ' ' {
            skip = false;
        }

        let participated_in_pairing = opponent != id || result_char == 'U' || result_char == '+';
        if skip {
            skipped_rounds += 1;
        } else {
            if matches.len() + skipped_rounds + 1 > MAX_ROUNDS {
                return Err(FileError::Limit(format!(
                    "this build supports at most {} rounds",
                    MAX_ROUNDS
                )));
            }
            for _ in 0..skipped_rounds {
                matches.push(Match::unpaired(id));
            }
            skipped_rounds = 0;
            if matches.len() > tournament.played_rounds {
                tournament.played_rounds = matches.len();
            }
            matches.push(Match::new(
                opponent,
                color,
                match_score,
                game_was_played,
                participated_in_pairing,
            ));
            if participated_in_pairing && matches.len() > tournament.played_rounds {
                tournament.played_rounds = matches.len();
            }
        }
        start_index += 10;
    }
    if line[start_index.min(line.len())..].iter().any(|&byte| byte != b' ') {
        return Err(invalid_line(line_number));
    }

    let mut player = Player::new(id, score, rating, matches);
    if id as usize >= tournament.players.len() {
        for hole in tournament.players.len()..id as usize {
            tournament.players.push(Player::invalid(hole as PlayerIndex));
        }
        tournament.players.push(player);
    } else if tournament.players[id as usize].is_valid {
        return Err(FileError::Format("a pairing number is repeated".to_string()));
    } else {
        // keep accelerations and forbidden pairs read before the player line
        player.accelerations = std::mem::take(&mut tournament.players[id as usize].accelerations);
        player.forbidden_pairs = std::mem::take(&mut tournament.players[id as usize].forbidden_pairs);
        tournament.players[id as usize] = player;
    }
    tournament.players_by_rank.push(id);
    Ok(())
}

/// Process an `XXA` line.
fn read_accelerations(
    line: &[u8],
    line_number: usize,
    tournament: &mut Tournament,
) -> Result<(), FileError> {
    tournament.default_acceleration = false;
    let player_id = read_player_id(field(line, 4, 8), line_number)?;
    if player_id as usize >= tournament.players.len() {
        for hole in tournament.players.len()..=player_id as usize {
            tournament.players.push(Player::invalid(hole as PlayerIndex));
        }
    }
    let mut start_index = 9usize;
    while start_index + 4 <= line.len() {
        let cell = field(line, start_index, start_index + 4);
        let points = if cell == "    " { 0 } else { read_score(cell, line_number)? };
        tournament.players[player_id as usize].accelerations.push(points);
        start_index += 5;
    }
    if line[start_index.min(line.len())..].iter().any(|&byte| byte != b' ') {
        return Err(invalid_line(line_number));
    }
    Ok(())
}

/// Process an `XXP` line, collecting the group of mutually forbidden players.
fn read_forbidden_pairs(line: &[u8], line_number: usize) -> Result<Vec<PlayerIndex>, FileError> {
    let mut result = Vec::new();
    for token in field(line, 3, line.len()).split_whitespace() {
        result.push(read_player_id(token, line_number)?);
    }
    Ok(result)
}

/// Finalize the number of played rounds and pad ragged match histories with empty games.
/// When `includes_unpaired_round` is set, a complete trailing column is treated as byes
/// for the round about to be paired.
fn even_up_match_histories(tournament: &mut Tournament, includes_unpaired_round: bool) {
    let mut forward_round_is_complete = includes_unpaired_round;
    for player in tournament.players.iter() {
        if player.is_valid
            && (includes_unpaired_round ^ (player.matches.len() > tournament.played_rounds))
        {
            forward_round_is_complete = !includes_unpaired_round;
        }
    }
    if !tournament.players_by_rank.is_empty() && forward_round_is_complete {
        tournament.played_rounds += 1;
    }
    for player in tournament.players.iter_mut() {
        if player.is_valid {
            while player.matches.len() < tournament.played_rounds {
                player.matches.push(Match::unpaired(player.id));
            }
        }
    }
}

/// Check that opponents list each other with opposite colors.
fn validate_pair_consistency(tournament: &Tournament) -> Result<(), FileError> {
    for player in tournament.players.iter() {
        if !player.is_valid {
            continue;
        }
        for (match_index, game) in player.matches.iter().enumerate() {
            if !game.game_was_played {
                continue;
            }
            let opponent = &tournament.players[game.opponent as usize];
            let consistent = opponent.is_valid
                && opponent
                    .matches
                    .get(match_index)
                    .map_or(false, |opponent_game| {
                        opponent_game.game_was_played
                            && opponent_game.color != game.color
                            && opponent_game.opponent == player.id
                    });
            if !consistent {
                return Err(FileError::Format(format!(
                    "match {} for player {} contradicts the entry for the opponent",
                    match_index + 1,
                    player.id + 1
                )));
            }
        }
    }
    Ok(())
}

/// Check the recorded score of each player against their game results, tolerating scores
/// written with or without the current acceleration or a forward-round bye.
fn validate_scores(tournament: &mut Tournament) -> Result<(), FileError> {
    for player_index in 0..tournament.players.len() {
        if !tournament.players[player_index].is_valid {
            continue;
        }
        if tournament.players[player_index].accelerations.len() > tournament.expected_rounds {
            return Err(FileError::Format(format!(
                "player {} has more acceleration entries than the total number of rounds",
                player_index + 1
            )));
        }
        let mut points: Points = 0;
        for match_index in 0..tournament.players[player_index].matches.len() {
            if match_index >= tournament.played_rounds {
                break;
            }
            let game = tournament.players[player_index].matches[match_index];
            points += tournament.points_for(&tournament.players[player_index], &game);
        }
        let acceleration = tournament.players[player_index].acceleration(tournament);
        {
            let player = &mut tournament.players[player_index];
            if player.score_without_acceleration != points {
                if player.score_without_acceleration >= acceleration {
                    player.score_without_acceleration -= acceleration;
                }
                if player.score_without_acceleration != points {
                    player.score_without_acceleration += acceleration;
                }
            }
        }
        let has_forward_round = tournament.players[player_index].score_without_acceleration != points
            && tournament.players[player_index].matches.len() > tournament.played_rounds;
        if has_forward_round {
            let next_round_points = {
                let player = &tournament.players[player_index];
                tournament.points_for(player, &player.matches[tournament.played_rounds])
            };
            let player = &mut tournament.players[player_index];
            if player.score_without_acceleration >= next_round_points {
                player.score_without_acceleration -= next_round_points;
            }
        }
        {
            let player = &mut tournament.players[player_index];
            if player.score_without_acceleration != points
                && player.score_without_acceleration >= acceleration
            {
                player.score_without_acceleration -= acceleration;
            }
        }
        if tournament.players[player_index].score_without_acceleration != points {
            return Err(FileError::Format(format!(
                "the score for player {} does not match the game results",
                player_index + 1
            )));
        }
    }
    Ok(())
}

/// Read a tournament from TRF(x). When `include_unpaired_round` is set, a trailing
/// column of byes is taken to describe the round being paired.
pub fn read_tournament(
    reader: &mut dyn BufRead,
    include_unpaired_round: bool,
) -> Result<Tournament, FileError> {
    let mut tournament = Tournament::new();
    let mut forbidden_groups: Vec<Vec<PlayerIndex>> = Vec::new();

    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    for (line_number, line) in content.split(['\n', '\r']).enumerate() {
        let line_number = line_number + 1;
        let bytes = line.as_bytes();
        if bytes.len() < 3 {
            continue;
        }
        match &bytes[..3] {
            b"001" => read_player(bytes, line_number, &mut tournament)?,
            b"XXA" => read_accelerations(bytes, line_number, &mut tournament)?,
            b"XXP" => forbidden_groups.push(read_forbidden_pairs(bytes, line_number)?),
            b"XXR" => {
                tournament.expected_rounds = field(bytes, 3, bytes.len())
                    .trim()
                    .parse()
                    .map_err(|_| invalid_line(line_number))?;
                if tournament.expected_rounds > MAX_ROUNDS {
                    return Err(FileError::Limit(format!(
                        "this build supports at most {} rounds",
                        MAX_ROUNDS
                    )));
                }
            }
            b"XXC" => {
                for token in field(bytes, 3, bytes.len()).split_whitespace() {
                    if let Some(rest) = token.strip_prefix("white") {
                        rest.parse::<usize>().map_err(|_| invalid_line(line_number))?;
                        tournament.initial_color = Color::White;
                    } else if let Some(rest) = token.strip_prefix("black") {
                        rest.parse::<usize>().map_err(|_| invalid_line(line_number))?;
                        tournament.initial_color = Color::Black;
                    } else {
                        return Err(invalid_line(line_number));
                    }
                }
            }
            b"BBW" => tournament.point_system.points_for_win = read_score(field(bytes, 4, 12), line_number)?,
            b"BBD" => tournament.point_system.points_for_draw = read_score(field(bytes, 4, 12), line_number)?,
            b"BBL" => tournament.point_system.points_for_loss = read_score(field(bytes, 4, 12), line_number)?,
            b"BBZ" => {
                tournament.point_system.points_for_zero_point_bye =
                    read_score(field(bytes, 4, 12), line_number)?
            }
            b"BBF" => {
                tournament.point_system.points_for_forfeit_loss =
                    read_score(field(bytes, 4, 12), line_number)?
            }
            b"BBU" => {
                tournament.point_system.points_for_pairing_allocated_bye =
                    read_score(field(bytes, 4, 12), line_number)?
            }
            _ => {}
        }
    }

    if tournament.expected_rounds == 0 {
        tournament.expected_rounds = tournament.played_rounds + 1;
    }

    for group in forbidden_groups {
        for &player_id in group.iter() {
            if player_id as usize >= tournament.players.len()
                || !tournament.players[player_id as usize].is_valid
            {
                return Err(FileError::Format(format!(
                    "forbidden pair references the missing player {}",
                    player_id + 1
                )));
            }
        }
        tournament.forbid_pairs(&group);
    }

    even_up_match_histories(&mut tournament, include_unpaired_round);
    tournament.update_ranks();
    validate_pair_consistency(&tournament)?;
    validate_scores(&mut tournament)?;
    if tournament.initial_color == Color::None {
        tournament.initial_color = tournament.infer_initial_color();
    }
    Ok(tournament)
}

fn match_cell(player: &Player, game: &Match) -> String {
    if game.opponent == player.id {
        // byes and unpaired rounds
        let code = if game.participated_in_pairing {
            'U'
        } else {
            match game.match_score {
                MatchScore::Win => 'F',
                MatchScore::Draw => 'H',
                MatchScore::Loss => return "          ".to_string(),
            }
        };
        format!("  0000 - {}", code)
    } else {
        let color = match game.color {
            Color::White => 'w',
            Color::Black => 'b',
            Color::None => '-',
        };
        let result = if game.game_was_played {
            match game.match_score {
                MatchScore::Win => '1',
                MatchScore::Draw => '=',
                MatchScore::Loss => '0',
            }
        } else {
            match game.match_score {
                MatchScore::Win => '+',
                _ => '-',
            }
        };
        format!("  {:0>4} {} {}", game.opponent + 1, color, result)
    }
}

/// Write the tournament as TRF(x). The rounds line is always derived afresh from the
/// tournament rather than carried over from any input.
pub fn write_tournament(tournament: &Tournament, writer: &mut dyn Write) -> std::io::Result<()> {
    writeln!(writer, "012 Auto-generated tournament")?;
    writeln!(writer, "XXR {}", tournament.expected_rounds)?;
    match tournament.initial_color {
        Color::White => writeln!(writer, "XXC white1")?,
        Color::Black => writeln!(writer, "XXC black1")?,
        Color::None => {}
    }
    let defaults = PointSystem::default();
    let points = &tournament.point_system;
    if points.points_for_win != defaults.points_for_win {
        writeln!(writer, "BBW {:>4}", crate::swiss::format_points(points.points_for_win))?;
    }
    if points.points_for_draw != defaults.points_for_draw {
        writeln!(writer, "BBD {:>4}", crate::swiss::format_points(points.points_for_draw))?;
    }
    if points.points_for_loss != defaults.points_for_loss {
        writeln!(writer, "BBL {:>4}", crate::swiss::format_points(points.points_for_loss))?;
    }
    if points.points_for_zero_point_bye != defaults.points_for_zero_point_bye {
        writeln!(writer, "BBZ {:>4}", crate::swiss::format_points(points.points_for_zero_point_bye))?;
    }
    if points.points_for_forfeit_loss != defaults.points_for_forfeit_loss {
        writeln!(writer, "BBF {:>4}", crate::swiss::format_points(points.points_for_forfeit_loss))?;
    }
    if points.points_for_pairing_allocated_bye != defaults.points_for_pairing_allocated_bye {
        writeln!(writer, "BBU {:>4}", crate::swiss::format_points(points.points_for_pairing_allocated_bye))?;
    }

    for &player_id in tournament.players_by_rank.iter() {
        let player = &tournament.players[player_id as usize];
        if !player.is_valid {
            continue;
        }
        let mut line = format!(
            "001 {:>4} {:1} {:3} {:<33} {:>4} {:3} {:>11} {:>10} {:>4} {:>4}",
            player.id + 1,
            "",
            "",
            format!("Player {}", player.id + 1),
            if player.rating > 0 { player.rating.to_string() } else { String::new() },
            "",
            "",
            "",
            crate::swiss::format_points(player.score_without_acceleration),
            player.rank_index + 1,
        );
        for game in player.matches.iter() {
            line.push_str(&match_cell(player, game));
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    for &player_id in tournament.players_by_rank.iter() {
        let player = &tournament.players[player_id as usize];
        if player.is_valid && player.accelerations.iter().any(|&points| points > 0) {
            let mut line = format!("XXA {:>4}", player.id + 1);
            for &points in player.accelerations.iter() {
                line.push_str(&format!(" {:>4}", crate::swiss::format_points(points)));
            }
            writeln!(writer, "{}", line)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::io::BufReader;

    /// Build a `001` line with the fields in their fixed columns.
    fn player_line(number: usize, rating: &str, score: &str, rank: usize, cells: &[&str]) -> String {
        format!(
            "001 {:>4} {:1} {:3} {:<33} {:>4} {:3} {:>11} {:>10} {:>4} {:>4}{}",
            number,
            "",
            "",
            format!("Player {}", number),
            rating,
            "",
            "",
            "",
            score,
            rank,
            cells.join(""),
        )
    }

    fn two_player_round_one() -> String {
        format!(
            "012 Test tournament\nXXR 2\nXXC white1\n{}\n{}\n",
            player_line(1, "2000", "1.0", 1, &["  0002 w 1"]),
            player_line(2, "1900", "0.0", 2, &["  0001 b 0"]),
        )
    }

    #[test]
    fn trf_read_basic_tournament_1() {
        // cargo test trf_read_basic_tournament_1 -- --nocapture
        let content = two_player_round_one();
        let mut reader = BufReader::new(content.as_bytes());
        let tournament = read_tournament(&mut reader, true).unwrap();
        assert_eq!(tournament.players.len(), 2);
        assert_eq!(tournament.played_rounds, 1);
        assert_eq!(tournament.expected_rounds, 2);
        assert_eq!(tournament.initial_color, Color::White);
        let winner = &tournament.players[0];
        assert_eq!(winner.score_without_acceleration, 10);
        assert_eq!(winner.rating, 2000);
        assert_eq!(winner.matches.len(), 1);
        assert_eq!(winner.matches[0].opponent, 1);
        assert_eq!(winner.matches[0].color, Color::White);
        assert_eq!(winner.matches[0].match_score, MatchScore::Win);
        assert!(winner.matches[0].game_was_played);
    }

    #[test]
    fn trf_round_trip_1() {
        // cargo test trf_round_trip_1 -- --nocapture
        let content = two_player_round_one();
        let mut reader = BufReader::new(content.as_bytes());
        let tournament = read_tournament(&mut reader, true).unwrap();
        let mut buffer = Vec::new();
        write_tournament(&tournament, &mut buffer).unwrap();
        let mut reader = BufReader::new(buffer.as_slice());
        let reread = read_tournament(&mut reader, true).unwrap();
        assert_eq!(reread.players.len(), tournament.players.len());
        assert_eq!(reread.played_rounds, tournament.played_rounds);
        for (player, original) in reread.players.iter().zip(tournament.players.iter()) {
            assert_eq!(player.score_without_acceleration, original.score_without_acceleration);
            assert_eq!(player.matches, original.matches);
        }
    }

    #[test]
    fn trf_score_mismatch_is_rejected_1() {
        // cargo test trf_score_mismatch_is_rejected_1 -- --nocapture
        let content = format!(
            "XXR 2\n{}\n{}\n",
            player_line(1, "2000", "0.5", 1, &["  0002 w 1"]),
            player_line(2, "1900", "0.0", 2, &["  0001 b 0"]),
        );
        let mut reader = BufReader::new(content.as_bytes());
        match read_tournament(&mut reader, true) {
            Err(FileError::Format(_)) => {}
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn trf_inconsistent_colors_are_rejected_1() {
        // cargo test trf_inconsistent_colors_are_rejected_1 -- --nocapture
        let content = format!(
            "XXR 2\n{}\n{}\n",
            player_line(1, "2000", "1.0", 1, &["  0002 w 1"]),
            player_line(2, "1900", "0.0", 2, &["  0001 w 0"]),
        );
        let mut reader = BufReader::new(content.as_bytes());
        match read_tournament(&mut reader, true) {
            Err(FileError::Format(_)) => {}
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn trf_half_point_bye_cell_1() {
        // cargo test trf_half_point_bye_cell_1 -- --nocapture
        let content = format!(
            "XXR 2\n{}\n{}\n",
            player_line(1, "2000", "0.5", 1, &["  0000 - H"]),
            player_line(2, "1900", "0.5", 2, &["  0000 - H"]),
        );
        let mut reader = BufReader::new(content.as_bytes());
        let tournament = read_tournament(&mut reader, false).unwrap();
        assert_eq!(tournament.played_rounds, 1);
        let player = &tournament.players[0];
        assert_eq!(player.matches[0].match_score, MatchScore::Draw);
        assert!(!player.matches[0].game_was_played);
        assert!(!player.matches[0].participated_in_pairing);
        assert_eq!(player.score_without_acceleration, 5);
    }

    #[test]
    fn trf_forbidden_pairs_line_1() {
        // cargo test trf_forbidden_pairs_line_1 -- --nocapture
        let content = format!("{}XXP 1 2\n", two_player_round_one());
        let mut reader = BufReader::new(content.as_bytes());
        let tournament = read_tournament(&mut reader, true).unwrap();
        assert!(tournament.players[0].forbidden_pairs.contains(&1));
        assert!(tournament.players[1].forbidden_pairs.contains(&0));
    }
}
