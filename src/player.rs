//! Global search facade.
//!
//! Drives whole-game move generation on top of the search core: the
//! pass-wins shortcut, subtree reuse across moves, the early-pass search
//! of clearly won positions, resignation, pondering, and the dead-stone
//! classification used by `final_status_list`.

use std::fmt;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::board::{Board, Color, Point};
use crate::constants::{MAX_BOARDSIZE, PASS};
use crate::policy::{PlayoutPolicy, PolicyParam};
use crate::prior::PriorParam;
use crate::scoring;
use crate::search::{EarlyAbortParam, SearchParam, SearchResult, UctSearch};
use crate::stats::Statistics;
use crate::tree::{NodeId, UctTree};

/// How `gen_move` computes its answer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SearchMode {
    /// Full UCT search (the default).
    Uct,
    /// Answer with a single playout-policy move (debugging aid).
    Policy,
}

/// Result of move generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GenMove {
    Move(Point),
    Resign,
}

/// Facade parameters, settable through the protocol.
#[derive(Debug, Clone)]
pub struct PlayerParam {
    pub search_mode: SearchMode,
    pub max_games: usize,
    pub max_time: Duration,
    /// Initialize each search with the reusable subtree of the previous
    /// one.
    pub reuse_subtree: bool,
    /// Allow passing early in clearly won positions.
    pub early_pass: bool,
    pub resign_threshold: f32,
    pub ponder: bool,
    pub ponder_time: Duration,
}

impl Default for PlayerParam {
    fn default() -> PlayerParam {
        PlayerParam {
            search_mode: SearchMode::Uct,
            max_games: 10_000,
            max_time: Duration::from_secs(1_000_000),
            reuse_subtree: false,
            early_pass: true,
            resign_threshold: 0.04,
            ponder: false,
            ponder_time: Duration::from_secs(60),
        }
    }
}

/// Counters across a game.
#[derive(Debug, Clone, Default)]
pub struct PlayerStatistics {
    pub nu_gen_move: u64,
    pub games_per_second: Statistics,
    /// Fraction of tree nodes reused between searches.
    pub reuse: Statistics,
}

impl fmt::Display for PlayerStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NuGenMove {}", self.nu_gen_move)?;
        writeln!(f, "GamesPerSec {}", self.games_per_second)?;
        writeln!(f, "Reuse {}", self.reuse)
    }
}

/// Ownership means closer to 0 or 1 than this count as settled.
const SETTLED_THRESHOLD: f32 = 0.2;

pub struct UctPlayer {
    pub param: PlayerParam,
    search: UctSearch,
    /// Moves to exclude at the root of the next search.
    root_filter: Vec<Point>,
    /// Game history and color to move of the last search position, for
    /// follow-up detection when reusing subtrees.
    last_search: Option<(Vec<(Point, Color)>, Color)>,
    statistics: PlayerStatistics,
    rng: ChaCha8Rng,
}

impl UctPlayer {
    pub fn new(
        param: PlayerParam,
        search_param: SearchParam,
        policy_param: PolicyParam,
        prior_param: PriorParam,
    ) -> UctPlayer {
        let rng = match search_param.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed ^ 0x706c_6179),
            None => ChaCha8Rng::from_entropy(),
        };
        UctPlayer {
            param,
            search: UctSearch::new(search_param, policy_param, prior_param),
            root_filter: Vec::new(),
            last_search: None,
            statistics: PlayerStatistics::default(),
            rng,
        }
    }

    pub fn search(&self) -> &UctSearch {
        &self.search
    }

    pub fn search_param_mut(&mut self) -> &mut SearchParam {
        &mut self.search.param
    }

    pub fn policy_param_mut(&mut self) -> &mut PolicyParam {
        &mut self.search.policy_param
    }

    pub fn prior_param_mut(&mut self) -> &mut PriorParam {
        &mut self.search.prior_param
    }

    pub fn statistics(&self) -> &PlayerStatistics {
        &self.statistics
    }

    /// Moves excluded from the root of subsequent searches.
    pub fn set_root_filter(&mut self, filter: Vec<Point>) {
        self.root_filter = filter;
    }

    /// Drop all search state (tree and reuse anchor).
    pub fn clear_search(&mut self) {
        self.search.clear_tree();
        self.last_search = None;
        self.root_filter.clear();
    }

    /// Generate a move for `color`. The board is used as scratch space
    /// for verification searches but is returned unchanged; the caller
    /// commits the move.
    pub fn gen_move(&mut self, bd: &mut Board, color: Color) -> GenMove {
        self.statistics.nu_gen_move += 1;
        bd.set_to_play(color);
        if self.param.search_mode == SearchMode::Policy {
            return GenMove::Move(self.gen_move_policy(bd, color));
        }
        if scoring::pass_wins(bd, color) {
            log::info!("gen_move: pass wins under Tromp-Taylor scoring");
            self.last_search = None;
            return GenMove::Move(PASS);
        }
        self.do_search(bd, color, self.param.max_time)
    }

    fn gen_move_policy(&mut self, bd: &Board, color: Color) -> Point {
        debug_assert_eq!(bd.to_play(), color);
        let mut policy = PlayoutPolicy::new(self.search.policy_param.clone());
        policy.start_playout(bd);
        policy.generate_move(bd, &mut self.rng)
    }

    fn do_search(&mut self, bd: &mut Board, color: Color, max_time: Duration) -> GenMove {
        let init_tree = if self.param.reuse_subtree {
            self.find_init_tree(bd, color)
        } else {
            None
        };
        let early_abort = EarlyAbortParam {
            threshold: 1.0 - self.param.resign_threshold,
            min_games: 100,
            // Abort after half the budget; the saved half pays for the
            // early-pass verification search.
            reduction_factor: 2,
        };
        self.last_search = Some((bd.history().to_vec(), color));
        let result = self.search.search(
            bd,
            self.param.max_games,
            max_time,
            &self.root_filter,
            init_tree,
            Some(early_abort),
        );
        let stats = self.search.statistics();
        self.statistics
            .games_per_second
            .add(stats.games_per_second as f32);
        log::debug!(
            "search: value {:.2} games {} sequence {}",
            result.value,
            result.games,
            result
                .sequence
                .iter()
                .map(|&m| bd.str_coord(m))
                .collect::<Vec<_>>()
                .join(" ")
        );

        if result.best_move.is_some() && result.value < self.param.resign_threshold {
            return GenMove::Resign;
        }
        let mut mv = result.best_move.unwrap_or(PASS);
        if self.param.early_pass {
            mv = self.apply_early_pass(bd, color, &result, mv);
        }
        GenMove::Move(mv)
    }

    /// Pass-early policy: a clearly won search may answer PASS, after a
    /// verification search confirms the position stays won and settled.
    fn apply_early_pass(
        &mut self,
        bd: &mut Board,
        color: Color,
        result: &SearchResult,
        mv: Point,
    ) -> Point {
        let winning = result.value >= 1.0 - self.param.resign_threshold;
        if winning && mv != PASS && bd.last_move() == PASS && scoring::pass_wins(bd, color) {
            log::info!("gen_move: opponent passed and pass wins");
            self.last_search = None;
            return PASS;
        }
        if result.was_early_abort {
            if let Some(early_move) = self.early_pass_search(bd, color) {
                return early_move;
            }
        }
        mv
    }

    /// Search the position after a hypothetical pass with territory
    /// statistics enabled. Returns PASS if the game stays clearly won
    /// with every point settled, or a neutral point worth filling first.
    fn early_pass_search(&mut self, bd: &mut Board, color: Color) -> Option<Point> {
        log::debug!("gen_move: checking if early pass is possible");
        bd.play(PASS, color).ok()?;
        let saved_territory = self.search.param.territory_statistics;
        self.search.param.territory_statistics = true;
        let result = self.search.search(
            bd,
            self.param.max_games / 2,
            self.param.max_time,
            &[],
            None,
            None,
        );
        self.search.param.territory_statistics = saved_territory;
        // The search tree now belongs to the passed position.
        self.last_search = Some((bd.history().to_vec(), color.opponent()));
        let ownership = self.collect_ownership(bd);
        bd.undo();
        // Root value is from the opponent's perspective after the pass.
        let value = 1.0 - result.value;
        if value < 1.0 - self.param.resign_threshold {
            log::debug!("gen_move: no early pass (not winning after pass)");
            return None;
        }
        let ownership = ownership?;
        let mut fill: Option<Point> = None;
        for p in bd.points() {
            let mean = ownership[p];
            if mean > SETTLED_THRESHOLD && mean < 1.0 - SETTLED_THRESHOLD {
                if self.is_fillable_neutral_point(bd, p, color, &ownership) {
                    fill = Some(p);
                } else {
                    log::debug!("gen_move: no early pass (unsettled point)");
                    return None;
                }
            }
        }
        match fill {
            Some(p) => {
                log::debug!("gen_move: filling neutral point before passing");
                Some(p)
            }
            None => {
                log::info!("gen_move: early pass is possible");
                Some(PASS)
            }
        }
    }

    /// Ownership mean per point from Black's perspective, or None when a
    /// point has no samples (for example all playouts ended by the mercy
    /// rule).
    fn collect_ownership(&self, bd: &Board) -> Option<Vec<f32>> {
        let mut ownership = vec![0.5f32; MAX_BOARDSIZE];
        for p in bd.points() {
            match self.search.territory_mean(p) {
                Some(mean) => ownership[p] = mean,
                None => {
                    log::debug!("gen_move: no ownership statistics for some point");
                    return None;
                }
            }
        }
        Some(ownership)
    }

    /// An unsettled empty point is worth filling when it touches settled
    /// territory of both sides (a plain dame).
    fn is_fillable_neutral_point(
        &self,
        bd: &Board,
        p: Point,
        color: Color,
        ownership: &[f32],
    ) -> bool {
        if !bd.is_empty(p) {
            return false;
        }
        let mine = |mean: f32| {
            if color == Color::Black {
                mean >= 1.0 - SETTLED_THRESHOLD
            } else {
                mean <= SETTLED_THRESHOLD
            }
        };
        let theirs = |mean: f32| {
            if color == Color::Black {
                mean <= SETTLED_THRESHOLD
            } else {
                mean >= 1.0 - SETTLED_THRESHOLD
            }
        };
        let mut safe_mine = false;
        let mut safe_theirs = false;
        for n in bd.neighbors(p) {
            if bd.is_out(n) {
                continue;
            }
            if mine(ownership[n]) {
                safe_mine = true;
            }
            if theirs(ownership[n]) {
                safe_theirs = true;
            }
        }
        safe_mine && safe_theirs && bd.is_legal(p, color)
    }

    /// Extract the reusable subtree when the current position is an
    /// alternate-play follow-up of the last searched position.
    fn find_init_tree(&mut self, bd: &Board, color: Color) -> Option<UctTree> {
        let (old_history, old_to_play) = self.last_search.as_ref()?;
        let current = bd.history();
        if current.len() < old_history.len() || current[..old_history.len()] != old_history[..] {
            log::debug!("gen_move: no tree to reuse");
            return None;
        }
        let mut expected = *old_to_play;
        let mut sequence = Vec::new();
        for &(mv, c) in &current[old_history.len()..] {
            if c != expected {
                log::debug!("gen_move: no tree to reuse (not alternating)");
                return None;
            }
            sequence.push(mv);
            expected = expected.opponent();
        }
        if expected != color {
            return None;
        }
        let old_nodes = self.search.tree().nu_nodes();
        let budget = self.param.max_time.min(Duration::from_secs(10));
        let tree = self.search.find_subtree(&sequence, budget)?;
        // A reused child must still be legal in the real game (superko).
        for (_, child) in tree.children(NodeId::ROOT) {
            let mv = child.mv();
            if mv != PASS && !bd.is_legal(mv, color) {
                log::warn!("gen_move: illegal move in reused subtree, discarding");
                return None;
            }
        }
        let reused_nodes = tree.nu_nodes();
        if old_nodes > 1 && reused_nodes > 1 {
            let fraction = reused_nodes as f32 / old_nodes as f32;
            log::debug!(
                "gen_move: reusing {reused_nodes} nodes ({:.0}%)",
                fraction * 100.0
            );
            self.statistics.reuse.add(fraction);
        } else {
            self.statistics.reuse.add(0.0);
        }
        Some(tree)
    }

    /// Search the opponent's position while waiting for their move.
    /// Needs subtree reuse, otherwise the result would be discarded.
    pub fn ponder(&mut self, bd: &mut Board) {
        if !self.param.ponder || self.param.search_mode != SearchMode::Uct {
            return;
        }
        if !self.param.reuse_subtree {
            log::warn!("pondering needs reuse_subtree enabled");
            return;
        }
        if bd.two_passes() {
            return;
        }
        log::debug!("ponder: start");
        let color = bd.to_play();
        self.do_search(bd, color, self.param.ponder_time);
        log::debug!("ponder: end");
    }

    /// Stones judged dead: blocks whose mean ownership from Black's
    /// perspective contradicts their color after a territory search.
    pub fn final_status_dead(&mut self, bd: &Board) -> Vec<Point> {
        let saved_territory = self.search.param.territory_statistics;
        self.search.param.territory_statistics = true;
        let games = self.param.max_games.min(5000).max(1000);
        self.search
            .search(&bd.clone(), games, Duration::from_secs(30), &[], None, None);
        self.search.param.territory_statistics = saved_territory;
        self.last_search = None;

        let mut dead = Vec::new();
        let mut visited = [false; MAX_BOARDSIZE];
        for p in bd.points() {
            if visited[p] || bd.color_at(p).is_none() {
                continue;
            }
            let stones = bd.block_stones(p);
            for &s in &stones {
                visited[s] = true;
            }
            let mut mean = Statistics::new();
            for &s in &stones {
                if let Some(m) = self.search.territory_mean(s) {
                    mean.add(m);
                }
            }
            if !mean.is_defined() {
                continue;
            }
            let block_dead = match bd.color_at(p) {
                Some(Color::Black) => mean.mean() < 0.5,
                Some(Color::White) => mean.mean() > 0.5,
                None => false,
            };
            if block_dead {
                dead.extend(stones);
            }
        }
        dead.sort_unstable();
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player() -> UctPlayer {
        UctPlayer::new(
            PlayerParam {
                max_games: 300,
                ..PlayerParam::default()
            },
            SearchParam {
                max_nodes: 50_000,
                seed: Some(5),
                ..SearchParam::default()
            },
            PolicyParam::default(),
            PriorParam::default(),
        )
    }

    #[test]
    fn test_gen_move_is_legal() {
        let mut player = test_player();
        let mut bd = Board::new(9);
        match player.gen_move(&mut bd, Color::Black) {
            GenMove::Move(mv) => assert!(bd.is_legal(mv, Color::Black)),
            GenMove::Resign => panic!("resigned the empty board"),
        }
        // The board is unchanged by move generation.
        assert_eq!(bd.history().len(), 0);
    }

    #[test]
    fn test_pass_wins_shortcut() {
        // Black owns the whole board; passing wins immediately without
        // running a single simulation.
        let mut player = test_player();
        player.param.max_games = 1_000_000;
        let mut bd = Board::new(9);
        bd.set_komi(6.5);
        bd.play(bd.parse_coord("E5").unwrap(), Color::Black).unwrap();
        let before = std::time::Instant::now();
        let result = player.gen_move(&mut bd, Color::Black);
        assert_eq!(result, GenMove::Move(PASS));
        assert!(before.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_policy_mode() {
        let mut player = test_player();
        player.param.search_mode = SearchMode::Policy;
        let mut bd = Board::new(9);
        let GenMove::Move(mv) = player.gen_move(&mut bd, Color::Black) else {
            panic!("policy mode never resigns");
        };
        assert!(bd.is_pseudo_legal(mv, Color::Black));
    }

    #[test]
    fn test_subtree_reuse_between_moves() {
        let mut player = test_player();
        player.param.reuse_subtree = true;
        player.param.early_pass = false;
        let mut bd = Board::new(9);
        let GenMove::Move(mv) = player.gen_move(&mut bd, Color::Black) else {
            panic!("unexpected resign");
        };
        bd.play(mv, Color::Black).unwrap();
        // Answer with whichever probe point the engine did not take.
        let reply = ["C3", "G7"]
            .iter()
            .map(|c| bd.parse_coord(c).unwrap())
            .find(|&p| bd.is_empty(p))
            .unwrap();
        bd.play(reply, Color::White).unwrap();
        let GenMove::Move(mv2) = player.gen_move(&mut bd, Color::Black) else {
            panic!("unexpected resign");
        };
        assert!(bd.is_legal(mv2, Color::Black));
        assert!(player.statistics().reuse.count() > 0);
    }

    #[test]
    fn test_root_filter_excludes_move() {
        let mut player = test_player();
        let mut bd = Board::new(9);
        let filtered = bd.parse_coord("E5").unwrap();
        player.set_root_filter(vec![filtered]);
        let GenMove::Move(mv) = player.gen_move(&mut bd, Color::Black) else {
            panic!("unexpected resign");
        };
        assert_ne!(mv, filtered);
        assert!(player
            .search()
            .tree()
            .children(NodeId::ROOT)
            .all(|(_, c)| c.mv() != filtered));
    }

    #[test]
    fn test_clear_search_resets_tree() {
        let mut player = test_player();
        let mut bd = Board::new(9);
        player.gen_move(&mut bd, Color::Black);
        assert!(player.search().tree().nu_nodes() > 1);
        player.clear_search();
        assert_eq!(player.search().tree().nu_nodes(), 1);
    }
}
