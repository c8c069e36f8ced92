//! Go Text Protocol (GTP) front end.
//!
//! Implements GTP version 2 so the engine can be driven by graphical
//! interfaces or test scripts. Besides the standard commands this adds
//! the `uct_param_*` family for tuning the search, policy and player at
//! runtime, `uct_savetree` for dumping the search tree as SGF, and
//! `loadsgf` for loading a position.
//!
//! Every command error is reported as a protocol failure (`?` prefix)
//! with a readable reason; the session always continues.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::board::{Board, Color, KoRule};
use crate::constants::{GTP_MIN_SIZE, MAX_SIZE};
use crate::player::{GenMove, PlayerParam, SearchMode, UctPlayer};
use crate::policy::PolicyParam;
use crate::prior::{PriorMode, PriorParam};
use crate::search::{MoveSelect, SearchParam};
use crate::sgf;

/// The list of known GTP commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "final_status_list",
    "genmove",
    "known_command",
    "komi",
    "list_commands",
    "loadsgf",
    "name",
    "play",
    "protocol_version",
    "quit",
    "showboard",
    "uct_param_player",
    "uct_param_policy",
    "uct_param_search",
    "uct_savetree",
    "version",
];

/// GTP engine state.
pub struct GtpEngine {
    board: Board,
    player: UctPlayer,
}

impl Default for GtpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GtpEngine {
    pub fn new() -> GtpEngine {
        GtpEngine::with_params(
            PlayerParam::default(),
            SearchParam::default(),
            PolicyParam::default(),
            PriorParam::default(),
        )
    }

    pub fn with_params(
        player_param: PlayerParam,
        search_param: SearchParam,
        policy_param: PolicyParam,
        prior_param: PriorParam,
    ) -> GtpEngine {
        GtpEngine {
            board: Board::new(MAX_SIZE),
            player: UctPlayer::new(player_param, search_param, policy_param, prior_param),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Run the GTP command loop, reading from stdin and writing to
    /// stdout. Returns when `quit` is received or input ends.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            let command = parts[0].to_lowercase();
            let args = &parts[1..];
            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            let _ = writeln!(stdout, "{prefix}{id_str} {message}\n");
            let _ = stdout.flush();
            if command == "quit" {
                break;
            }
            // Think on the opponent's time after answering a genmove.
            if command == "genmove" && success && self.player.param.ponder {
                self.player.ponder(&mut self.board);
            }
        }
    }

    /// Parse an optional numeric command ID from the beginning of a line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        match trimmed[..end].parse::<u32>() {
            Ok(id) => (Some(id), trimmed[end..].trim()),
            Err(_) => (None, trimmed),
        }
    }

    /// Execute a GTP command and return (success, response).
    pub fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match command {
            "name" => (true, "tengen".to_string()),

            "version" => (true, env!("CARGO_PKG_VERSION").to_string()),

            "protocol_version" => (true, "2".to_string()),

            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "known_command" => {
                if args.is_empty() {
                    return (false, "missing argument".to_string());
                }
                let known = KNOWN_COMMANDS.contains(&args[0].to_lowercase().as_str());
                (true, if known { "true" } else { "false" }.to_string())
            }

            "quit" => (true, String::new()),

            "boardsize" => {
                let Some(size) = args.first().and_then(|a| a.parse::<usize>().ok()) else {
                    return (false, "invalid size".to_string());
                };
                if !(GTP_MIN_SIZE..=MAX_SIZE).contains(&size) {
                    return (
                        false,
                        format!("unacceptable size, supported range is {GTP_MIN_SIZE}..{MAX_SIZE}"),
                    );
                }
                let komi = self.board.komi();
                let ko_rule = self.board.ko_rule();
                self.board = Board::new(size);
                self.board.set_komi(komi);
                self.board.set_ko_rule(ko_rule);
                self.player.clear_search();
                (true, String::new())
            }

            "clear_board" => {
                self.board.clear();
                self.player.clear_search();
                (true, String::new())
            }

            "komi" => match args.first().and_then(|a| a.parse::<f32>().ok()) {
                Some(komi) => {
                    self.board.set_komi(komi);
                    (true, String::new())
                }
                None => (false, "invalid komi".to_string()),
            },

            "play" => {
                if args.len() < 2 {
                    return (false, "missing arguments".to_string());
                }
                let Some(color) = Color::from_gtp(args[0]) else {
                    return (false, "invalid color".to_string());
                };
                let Some(mv) = self.board.parse_coord(args[1]) else {
                    return (false, "invalid vertex".to_string());
                };
                match self.board.play(mv, color) {
                    Ok(()) => (true, String::new()),
                    Err(e) => (false, format!("illegal move: {e}")),
                }
            }

            "genmove" => {
                let Some(color) = args.first().copied().and_then(Color::from_gtp) else {
                    return (false, "invalid color".to_string());
                };
                match self.player.gen_move(&mut self.board, color) {
                    GenMove::Resign => (true, "resign".to_string()),
                    GenMove::Move(mv) => match self.board.play(mv, color) {
                        Ok(()) => (true, self.board.str_coord(mv)),
                        Err(e) => (false, format!("generated illegal move: {e}")),
                    },
                }
            }

            "final_status_list" => {
                if args.first() != Some(&"dead") {
                    return (
                        false,
                        "only final_status_list dead is supported".to_string(),
                    );
                }
                let dead = self.player.final_status_dead(&self.board);
                let coords: Vec<String> = dead.iter().map(|&p| self.board.str_coord(p)).collect();
                (true, coords.join(" "))
            }

            "showboard" => (true, format!("\n{}", self.board)),

            "loadsgf" => {
                let Some(path) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                match std::fs::read_to_string(path)
                    .map_err(sgf::SgfError::from)
                    .and_then(|text| sgf::parse(&text))
                    .and_then(|root| sgf::setup_board(&root))
                {
                    Ok(board) => {
                        self.board = board;
                        self.player.clear_search();
                        (true, String::new())
                    }
                    Err(e) => (false, format!("cannot load sgf: {e}")),
                }
            }

            "uct_savetree" => {
                let Some(path) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                let max_depth = match args.get(1) {
                    None => None,
                    Some(a) => match a.parse::<usize>() {
                        Ok(d) => Some(d),
                        Err(_) => return (false, "invalid depth".to_string()),
                    },
                };
                let dump =
                    sgf::dump_search_tree(self.player.search().tree(), &self.board, max_depth);
                match std::fs::write(path, dump) {
                    Ok(()) => (true, String::new()),
                    Err(e) => (false, format!("cannot write tree: {e}")),
                }
            }

            "uct_param_search" => self.param_search(args),
            "uct_param_policy" => self.param_policy(args),
            "uct_param_player" => self.param_player(args),

            _ => (false, format!("unknown command: {command}")),
        }
    }

    // =========================================================================
    // Parameter commands
    // =========================================================================

    fn param_search(&mut self, args: &[&str]) -> (bool, String) {
        let param = self.player.search_param_mut();
        if args.is_empty() {
            let listing = format!(
                "bias_term_constant {}\n\
                 expand_threshold {}\n\
                 first_play_urgency {}\n\
                 live_gfx_interval {}\n\
                 lock_free {}\n\
                 max_game_length {}\n\
                 max_nodes {}\n\
                 mercy_rule {}\n\
                 move_select {}\n\
                 number_threads {}\n\
                 rave {}\n\
                 rave_check_same {}\n\
                 rave_weight_final {}\n\
                 rave_weight_initial {}\n\
                 score_modification {}\n\
                 territory_statistics {}\n\
                 weight_rave_updates {}",
                param.bias_term_constant,
                param.expand_threshold,
                param.first_play_urgency,
                param.live_gfx_interval,
                param.lock_free as u8,
                param.max_game_length,
                param.max_nodes,
                param.mercy_rule as u8,
                match param.move_select {
                    MoveSelect::Value => "value",
                    MoveSelect::Count => "count",
                    MoveSelect::Bound => "bound",
                    MoveSelect::Estimate => "estimate",
                },
                param.number_threads,
                param.rave as u8,
                param.rave_check_same as u8,
                param.rave_weight_final,
                param.rave_weight_initial,
                param.score_modification,
                param.territory_statistics as u8,
                param.weight_rave_updates as u8,
            );
            return (true, listing);
        }
        if args.len() < 2 {
            return (false, "need name and value".to_string());
        }
        let value = args[1];
        match args[0] {
            "bias_term_constant" => set_f32(&mut param.bias_term_constant, value),
            "expand_threshold" => set_u32(&mut param.expand_threshold, value),
            "first_play_urgency" => set_f32(&mut param.first_play_urgency, value),
            "live_gfx_interval" => set_usize(&mut param.live_gfx_interval, value),
            "lock_free" => set_bool(&mut param.lock_free, value),
            "max_game_length" => set_usize(&mut param.max_game_length, value),
            "max_nodes" => set_usize(&mut param.max_nodes, value),
            "mercy_rule" => set_bool(&mut param.mercy_rule, value),
            "move_select" => match value {
                "value" => {
                    param.move_select = MoveSelect::Value;
                    ok()
                }
                "count" => {
                    param.move_select = MoveSelect::Count;
                    ok()
                }
                "bound" => {
                    param.move_select = MoveSelect::Bound;
                    ok()
                }
                "estimate" => {
                    param.move_select = MoveSelect::Estimate;
                    ok()
                }
                _ => (false, "unknown move_select mode".to_string()),
            },
            "number_threads" => match value.parse::<usize>() {
                Ok(n) if (1..=64).contains(&n) => {
                    param.number_threads = n;
                    ok()
                }
                _ => bad_value(value),
            },
            "rave" => set_bool(&mut param.rave, value),
            "rave_check_same" => set_bool(&mut param.rave_check_same, value),
            "rave_weight_final" => set_f32(&mut param.rave_weight_final, value),
            "rave_weight_initial" => set_f32(&mut param.rave_weight_initial, value),
            "score_modification" => set_f32(&mut param.score_modification, value),
            "seed" => {
                if value == "none" {
                    param.seed = None;
                    ok()
                } else {
                    match value.parse::<u64>() {
                        Ok(seed) => {
                            param.seed = Some(seed);
                            ok()
                        }
                        Err(_) => bad_value(value),
                    }
                }
            }
            "territory_statistics" => set_bool(&mut param.territory_statistics, value),
            "weight_rave_updates" => set_bool(&mut param.weight_rave_updates, value),
            name => (false, format!("unknown parameter: {name}")),
        }
    }

    fn param_policy(&mut self, args: &[&str]) -> (bool, String) {
        let param = self.player.policy_param_mut();
        if args.is_empty() {
            let listing = format!(
                "pure_random {}\nstatistics_enabled {}",
                param.pure_random as u8, param.statistics_enabled as u8
            );
            return (true, listing);
        }
        if args.len() < 2 {
            return (false, "need name and value".to_string());
        }
        let value = args[1];
        match args[0] {
            "pure_random" => set_bool(&mut param.pure_random, value),
            "statistics_enabled" => set_bool(&mut param.statistics_enabled, value),
            name => (false, format!("unknown parameter: {name}")),
        }
    }

    fn param_player(&mut self, args: &[&str]) -> (bool, String) {
        if args.is_empty() {
            let prior = self.player.prior_param_mut().clone();
            let param = &self.player.param;
            let listing = format!(
                "early_pass {}\n\
                 ko_rule {}\n\
                 max_games {}\n\
                 max_time {}\n\
                 ponder {}\n\
                 ponder_time {}\n\
                 prior_count_high {}\n\
                 prior_count_low {}\n\
                 prior_count_mid {}\n\
                 prior_knowledge {}\n\
                 prior_ladders {}\n\
                 resign_threshold {}\n\
                 reuse_subtree {}\n\
                 search_mode {}",
                param.early_pass as u8,
                match self.board.ko_rule() {
                    KoRule::Simple => "simple",
                    KoRule::PositionalSuperko => "positional_superko",
                    KoRule::SituationalSuperko => "situational_superko",
                },
                param.max_games,
                param.max_time.as_secs_f64(),
                param.ponder as u8,
                param.ponder_time.as_secs_f64(),
                prior.count_high,
                prior.count_low,
                prior.count_mid,
                match prior.mode {
                    PriorMode::None => "none",
                    PriorMode::Even => "even",
                    PriorMode::Policy => "default",
                },
                prior.ladders as u8,
                param.resign_threshold,
                param.reuse_subtree as u8,
                match param.search_mode {
                    SearchMode::Uct => "uct",
                    SearchMode::Policy => "policy",
                },
            );
            return (true, listing);
        }
        if args.len() < 2 {
            return (false, "need name and value".to_string());
        }
        let value = args[1];
        match args[0] {
            "early_pass" => set_bool(&mut self.player.param.early_pass, value),
            "ko_rule" => match value {
                "simple" => {
                    self.board.set_ko_rule(KoRule::Simple);
                    ok()
                }
                "positional_superko" => {
                    self.board.set_ko_rule(KoRule::PositionalSuperko);
                    ok()
                }
                "situational_superko" => {
                    self.board.set_ko_rule(KoRule::SituationalSuperko);
                    ok()
                }
                _ => (false, "unknown ko rule".to_string()),
            },
            "max_games" => set_usize(&mut self.player.param.max_games, value),
            "max_time" => match value.parse::<f64>() {
                Ok(secs) if secs > 0.0 => {
                    self.player.param.max_time = Duration::from_secs_f64(secs);
                    ok()
                }
                _ => bad_value(value),
            },
            "ponder" => set_bool(&mut self.player.param.ponder, value),
            "ponder_time" => match value.parse::<f64>() {
                Ok(secs) if secs > 0.0 => {
                    self.player.param.ponder_time = Duration::from_secs_f64(secs);
                    ok()
                }
                _ => bad_value(value),
            },
            "prior_count_high" => set_u32(&mut self.player.prior_param_mut().count_high, value),
            "prior_count_low" => set_u32(&mut self.player.prior_param_mut().count_low, value),
            "prior_count_mid" => set_u32(&mut self.player.prior_param_mut().count_mid, value),
            "prior_knowledge" => match value {
                "none" => {
                    self.player.prior_param_mut().mode = PriorMode::None;
                    ok()
                }
                "even" => {
                    self.player.prior_param_mut().mode = PriorMode::Even;
                    ok()
                }
                "default" | "policy" => {
                    self.player.prior_param_mut().mode = PriorMode::Policy;
                    ok()
                }
                _ => (false, "unknown prior mode".to_string()),
            },
            "prior_ladders" => set_bool(&mut self.player.prior_param_mut().ladders, value),
            "resign_threshold" => set_f32(&mut self.player.param.resign_threshold, value),
            "reuse_subtree" => set_bool(&mut self.player.param.reuse_subtree, value),
            "search_mode" => match value {
                "uct" => {
                    self.player.param.search_mode = SearchMode::Uct;
                    ok()
                }
                "policy" => {
                    self.player.param.search_mode = SearchMode::Policy;
                    ok()
                }
                _ => (false, "unknown search mode".to_string()),
            },
            name => (false, format!("unknown parameter: {name}")),
        }
    }
}

fn ok() -> (bool, String) {
    (true, String::new())
}

fn bad_value(value: &str) -> (bool, String) {
    (false, format!("invalid value: {value}"))
}

fn set_bool(target: &mut bool, value: &str) -> (bool, String) {
    match value {
        "0" | "false" => {
            *target = false;
            ok()
        }
        "1" | "true" => {
            *target = true;
            ok()
        }
        _ => bad_value(value),
    }
}

fn set_u32(target: &mut u32, value: &str) -> (bool, String) {
    match value.parse() {
        Ok(v) => {
            *target = v;
            ok()
        }
        Err(_) => bad_value(value),
    }
}

fn set_usize(target: &mut usize, value: &str) -> (bool, String) {
    match value.parse() {
        Ok(v) => {
            *target = v;
            ok()
        }
        Err(_) => bad_value(value),
    }
}

fn set_f32(target: &mut f32, value: &str) -> (bool, String) {
    match value.parse() {
        Ok(v) => {
            *target = v;
            ok()
        }
        Err(_) => bad_value(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> GtpEngine {
        let mut engine = GtpEngine::new();
        // Keep tests fast.
        engine.execute("uct_param_player", &["max_games", "200"]);
        engine
    }

    #[test]
    fn test_parse_id_with_id() {
        let (id, cmd) = GtpEngine::parse_id("123 name");
        assert_eq!(id, Some(123));
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_parse_id_without_id() {
        let (id, cmd) = GtpEngine::parse_id("name");
        assert_eq!(id, None);
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_name_and_protocol() {
        let mut engine = engine();
        assert_eq!(engine.execute("name", &[]), (true, "tengen".to_string()));
        assert_eq!(
            engine.execute("protocol_version", &[]),
            (true, "2".to_string())
        );
    }

    #[test]
    fn test_known_command() {
        let mut engine = engine();
        let (success, response) = engine.execute("known_command", &["genmove"]);
        assert!(success);
        assert_eq!(response, "true");
        let (success, response) = engine.execute("known_command", &["no_such_cmd"]);
        assert!(success);
        assert_eq!(response, "false");
    }

    #[test]
    fn test_boardsize() {
        let mut engine = engine();
        let (success, _) = engine.execute("boardsize", &["9"]);
        assert!(success);
        assert_eq!(engine.board().size(), 9);
        let (success, _) = engine.execute("boardsize", &["5"]);
        assert!(!success);
        let (success, _) = engine.execute("boardsize", &["x"]);
        assert!(!success);
    }

    #[test]
    fn test_play_and_clear() {
        let mut engine = engine();
        let (success, _) = engine.execute("play", &["black", "D4"]);
        assert!(success);
        let (success, msg) = engine.execute("play", &["white", "D4"]);
        assert!(!success);
        assert!(msg.contains("illegal"));
        let (success, _) = engine.execute("clear_board", &[]);
        assert!(success);
        assert_eq!(engine.board().history().len(), 0);
    }

    #[test]
    fn test_genmove_plays_a_move() {
        let mut engine = engine();
        engine.execute("boardsize", &["9"]);
        let (success, response) = engine.execute("genmove", &["b"]);
        assert!(success);
        assert!(!response.is_empty());
        if response != "resign" {
            assert_eq!(engine.board().history().len(), 1);
        }
    }

    #[test]
    fn test_param_commands() {
        let mut engine = engine();
        assert!(engine.execute("uct_param_search", &["rave", "0"]).0);
        assert!(engine.execute("uct_param_search", &["number_threads", "2"]).0);
        assert!(!engine.execute("uct_param_search", &["no_such", "1"]).0);
        assert!(engine.execute("uct_param_policy", &["pure_random", "1"]).0);
        assert!(engine
            .execute("uct_param_player", &["prior_knowledge", "even"])
            .0);
        let (success, listing) = engine.execute("uct_param_search", &[]);
        assert!(success);
        assert!(listing.contains("rave 0"));
        assert!(listing.contains("number_threads 2"));
    }

    #[test]
    fn test_komi() {
        let mut engine = engine();
        assert!(engine.execute("komi", &["6.5"]).0);
        assert_eq!(engine.board().komi(), 6.5);
        assert!(!engine.execute("komi", &["abc"]).0);
    }
}
