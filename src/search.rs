//! Monte Carlo tree search with UCT selection and RAVE.
//!
//! A fixed pool of worker threads runs `select -> (expand) -> simulate ->
//! backpropagate` iterations against one shared [`UctTree`] until a stop
//! condition trips (games, time, nodes, abort, or a decided root). Each
//! worker owns a scratch board, a playout policy, a prior-knowledge seeder
//! and an RNG; the tree is the only shared mutable structure and is
//! accessed lock-free by default (see `tree` for the publication
//! contract). With `lock_free` disabled and more than one worker, a
//! global mutex protects the in-tree and update phases; playouts always
//! run unlocked.
//!
//! Node means are stored from the perspective of the player to move at
//! the parent, so selection and final move choice never invert values.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::board::{Board, Color, Point};
use crate::constants::{GAME_LEN_FACTOR, PASS};
use crate::policy::{PlayoutPolicy, PolicyParam};
use crate::prior::{PriorInit, PriorKnowledge, PriorParam};
use crate::scoring::{self, Ownership};
use crate::stats::{AtomicStatistics, Statistics, StatisticsExt};
use crate::tree::{NodeId, UctNode, UctTree};

/// Move selection strategy after the search is finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveSelect {
    /// Select the move with the highest mean value.
    Value,
    /// Select the most-visited move (the default).
    Count,
    /// Use the selection bound (combined bound if RAVE is enabled).
    Bound,
    /// Use the weighted estimate without the bias term.
    Estimate,
}

/// Search parameters. All of these are settable through the protocol.
#[derive(Debug, Clone)]
pub struct SearchParam {
    pub number_threads: usize,
    /// Total tree capacity in nodes, split evenly between the workers.
    pub max_nodes: usize,
    /// Run without the global mutex (the default).
    pub lock_free: bool,
    /// Visits required before a node is expanded. The root is always
    /// expandable.
    pub expand_threshold: u32,
    /// Constant `c` of the UCT bias term; 0 disables the term.
    pub bias_term_constant: f32,
    /// Value of a child without any evidence during selection.
    pub first_play_urgency: f32,
    pub rave: bool,
    /// Initial RAVE weight parameter (weight at count 1).
    pub rave_weight_initial: f32,
    /// Final RAVE weight parameter (asymptotic weight).
    pub rave_weight_final: f32,
    /// Skip a RAVE update if the opponent played the move first.
    pub rave_check_same: bool,
    /// Weight RAVE updates by distance from the position.
    pub weight_rave_updates: bool,
    pub move_select: MoveSelect,
    /// Hard cap on simulation length; the effective cap is also bounded
    /// by three times the board area.
    pub max_game_length: usize,
    /// Abort playouts with a decisive result once the capture difference
    /// exceeds 30% of the board area.
    pub mercy_rule: bool,
    /// Small score-proportional stretch of the 0/1 outcome, rewarding
    /// larger wins.
    pub score_modification: f32,
    /// Collect per-point ownership statistics during simulations.
    pub territory_statistics: bool,
    /// Log a status line every this many games (0 disables).
    pub live_gfx_interval: usize,
    /// Base RNG seed; worker `i` uses `seed + i`. None seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SearchParam {
    fn default() -> SearchParam {
        SearchParam {
            number_threads: 1,
            max_nodes: 1 << 20,
            lock_free: true,
            expand_threshold: 2,
            bias_term_constant: 0.7,
            first_play_urgency: 10_000.0,
            rave: true,
            rave_weight_initial: 1.0,
            rave_weight_final: 5000.0,
            rave_check_same: false,
            weight_rave_updates: true,
            move_select: MoveSelect::Count,
            max_game_length: usize::MAX,
            mercy_rule: true,
            score_modification: 0.02,
            territory_statistics: false,
            live_gfx_interval: 0,
            seed: None,
        }
    }
}

/// Early-abort rule: stop when the root value is already decisive.
#[derive(Debug, Copy, Clone)]
pub struct EarlyAbortParam {
    /// Root mean that counts as decided.
    pub threshold: f32,
    /// Minimum root visits before the rule applies.
    pub min_games: u32,
    /// The search must have used at least `1/reduction_factor` of its
    /// games or time budget.
    pub reduction_factor: usize,
}

/// Aggregate statistics of one search.
#[derive(Debug, Clone, Default)]
pub struct SearchStatistics {
    pub time: f64,
    pub games_per_second: f64,
    pub game_length: StatisticsExt,
    pub moves_in_tree: StatisticsExt,
    pub aborted: Statistics,
}

impl std::fmt::Display for SearchStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Time {:.2}", self.time)?;
        writeln!(f, "GameLen {}", self.game_length)?;
        writeln!(f, "InTree {}", self.moves_in_tree)?;
        writeln!(f, "Aborted {}", self.aborted)?;
        writeln!(f, "Games/s {:.1}", self.games_per_second)
    }
}

/// Result of a completed search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Best root move, or `None` if the root has no children.
    pub best_move: Option<Point>,
    /// Value of the root position for the player to move there.
    pub value: f32,
    /// Best sequence from the root.
    pub sequence: Vec<Point>,
    pub games: usize,
    pub was_early_abort: bool,
}

pub struct UctSearch {
    pub param: SearchParam,
    pub policy_param: PolicyParam,
    pub prior_param: PriorParam,
    tree: UctTree,
    root_board: Option<Board>,
    root_color: Color,
    root_filter: Vec<Point>,
    max_games: usize,
    max_time: Duration,
    max_game_len: usize,
    start_time: Instant,
    early_abort: Option<EarlyAbortParam>,
    rave_param1: f32,
    rave_param2: f32,
    abort: AtomicBool,
    /// Set when a worker's allocator fills up; stops the search after the
    /// iteration that observed it finishes as a plain playout.
    tree_out_of_mem: AtomicBool,
    was_early_abort: AtomicBool,
    number_games: AtomicUsize,
    check_interval: AtomicUsize,
    territory: Option<Vec<AtomicStatistics>>,
    statistics: Mutex<SearchStatistics>,
    global_mutex: Mutex<()>,
}

impl UctSearch {
    pub fn new(param: SearchParam, policy_param: PolicyParam, prior_param: PriorParam) -> UctSearch {
        let tree = UctTree::new(param.number_threads.max(1), param.max_nodes);
        UctSearch {
            param,
            policy_param,
            prior_param,
            tree,
            root_board: None,
            root_color: Color::Black,
            root_filter: Vec::new(),
            max_games: 0,
            max_time: Duration::MAX,
            max_game_len: usize::MAX,
            start_time: Instant::now(),
            early_abort: None,
            rave_param1: 1.0,
            rave_param2: 0.0,
            abort: AtomicBool::new(false),
            tree_out_of_mem: AtomicBool::new(false),
            was_early_abort: AtomicBool::new(false),
            number_games: AtomicUsize::new(0),
            check_interval: AtomicUsize::new(1),
            territory: None,
            statistics: Mutex::new(SearchStatistics::default()),
            global_mutex: Mutex::new(()),
        }
    }

    pub fn tree(&self) -> &UctTree {
        &self.tree
    }

    /// Drop the current tree contents (used between games).
    pub fn clear_tree(&mut self) {
        self.tree.clear();
    }

    pub fn statistics(&self) -> SearchStatistics {
        self.statistics.lock().unwrap().clone()
    }

    /// Mean ownership of a point from Black's perspective, from the
    /// territory statistics of the last search. None without samples.
    pub fn territory_mean(&self, p: Point) -> Option<f32> {
        let territory = self.territory.as_ref()?;
        let stat = &territory[p];
        if stat.is_defined() {
            Some(stat.mean())
        } else {
            None
        }
    }

    /// Extract the subtree reached from the root by `sequence` into a
    /// fresh tree, for reuse as the next search's initial tree.
    pub fn find_subtree(&self, sequence: &[Point], max_time: Duration) -> Option<UctTree> {
        let mut node = NodeId::ROOT;
        for &mv in sequence {
            node = self.tree.child_with_move(node, mv)?;
        }
        let mut target = UctTree::new(self.tree.nu_allocators(), self.tree.max_nodes());
        self.tree.extract_subtree(&mut target, node, max_time);
        Some(target)
    }

    /// Run the search from `board` under the given budget and return the
    /// chosen move and root value. Never fails: budget exhaustion returns
    /// the best known move, and a root without legal moves returns PASS.
    pub fn search(
        &mut self,
        board: &Board,
        max_games: usize,
        max_time: Duration,
        root_filter: &[Point],
        init_tree: Option<UctTree>,
        early_abort: Option<EarlyAbortParam>,
    ) -> SearchResult {
        let threads = self.param.number_threads.max(1);
        self.prepare_tree(threads, init_tree);
        self.root_board = Some(board.clone());
        self.root_color = board.to_play();
        self.root_filter = root_filter.to_vec();
        self.max_games = max_games;
        self.max_time = max_time;
        self.max_game_len = self
            .param
            .max_game_length
            .min(GAME_LEN_FACTOR * board.size() * board.size());
        self.start_time = Instant::now();
        self.early_abort = early_abort;
        self.rave_param1 = 1.0 / self.param.rave_weight_initial;
        self.rave_param2 = 1.0 / self.param.rave_weight_final;
        self.abort.store(false, Ordering::Relaxed);
        self.tree_out_of_mem.store(false, Ordering::Relaxed);
        self.was_early_abort.store(false, Ordering::Relaxed);
        self.number_games.store(0, Ordering::Relaxed);
        self.check_interval.store(1, Ordering::Relaxed);
        self.territory = if self.param.territory_statistics {
            Some((0..board.cells_len()).map(|_| AtomicStatistics::default()).collect())
        } else {
            None
        };
        *self.statistics.lock().unwrap() = SearchStatistics::default();

        // Filter already-expanded root children of a reused tree.
        if self.tree.root().has_children() && !self.root_filter.is_empty() {
            let allowed: Vec<Point> = self
                .tree
                .children(NodeId::ROOT)
                .map(|(_, c)| c.mv())
                .filter(|mv| !self.root_filter.contains(mv))
                .collect();
            self.tree.apply_filter(0, NodeId::ROOT, &allowed);
        }

        let this: &UctSearch = self;
        std::thread::scope(|scope| {
            for thread_id in 0..threads {
                scope.spawn(move || {
                    let mut state = SearchState::new(thread_id, this);
                    state.search_loop();
                });
            }
        });

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let games = self.number_games.load(Ordering::Relaxed);
        {
            let mut stats = self.statistics.lock().unwrap();
            stats.time = elapsed;
            if elapsed > f64::EPSILON {
                stats.games_per_second = games as f64 / elapsed;
            }
        }

        let sequence = self.find_best_sequence();
        SearchResult {
            best_move: sequence.first().copied(),
            value: if self.tree.root().has_mean() {
                self.tree.root().mean()
            } else {
                0.5
            },
            sequence,
            games,
            was_early_abort: self.was_early_abort.load(Ordering::Relaxed),
        }
    }

    fn prepare_tree(&mut self, threads: usize, init_tree: Option<UctTree>) {
        let max_nodes = self.param.max_nodes;
        let fits = |t: &UctTree| t.nu_allocators() == threads && t.max_nodes() == max_nodes;
        match init_tree {
            Some(t) if fits(&t) => self.tree = t,
            _ => {
                if fits(&self.tree) {
                    self.tree.clear();
                } else {
                    self.tree = UctTree::new(threads, self.param.max_nodes);
                }
            }
        }
    }

    // =========================================================================
    // Move selection
    // =========================================================================

    /// Best child of `id` under the configured move-select mode.
    pub fn find_best_child(&self, id: NodeId, exclude: &[Point]) -> Option<NodeId> {
        let node = self.tree.node(id);
        if !node.has_children() {
            return None;
        }
        let log_pos_count = (node.pos_count().max(1) as f32).ln();
        let mut best: Option<(NodeId, f32)> = None;
        for (child_id, child) in self.tree.children(id) {
            if exclude.contains(&child.mv()) {
                continue;
            }
            let uses_rave_evidence = matches!(
                self.param.move_select,
                MoveSelect::Bound | MoveSelect::Estimate
            ) && self.param.rave
                && child.has_rave_value();
            if !child.has_mean() && !uses_rave_evidence {
                continue;
            }
            let value = match self.param.move_select {
                MoveSelect::Value => child.mean(),
                MoveSelect::Count => child.move_count() as f32,
                MoveSelect::Bound => self.get_bound(log_pos_count, child),
                MoveSelect::Estimate => self.value_estimate(child),
            };
            if best.map_or(true, |(_, b)| value > b) {
                best = Some((child_id, value));
            }
        }
        best.map(|(id, _)| id)
    }

    fn find_best_sequence(&self) -> Vec<Point> {
        let mut sequence = Vec::new();
        let mut current = NodeId::ROOT;
        while let Some(child) = self.find_best_child(current, &[]) {
            sequence.push(self.tree.node(child).mv());
            current = child;
        }
        sequence
    }

    /// The bound used for in-tree selection.
    fn get_bound(&self, log_pos_count: f32, child: &UctNode) -> f32 {
        let value = self.value_estimate(child);
        let c = self.param.bias_term_constant;
        if c == 0.0 {
            value
        } else {
            value + c * (log_pos_count / (child.move_count() as f32 + 1.0)).sqrt()
        }
    }

    /// Weighted mix of move value and RAVE value; the first-play urgency
    /// when the child has no evidence at all.
    fn value_estimate(&self, child: &UctNode) -> f32 {
        if !self.param.rave {
            return if child.has_mean() {
                child.mean()
            } else {
                self.param.first_play_urgency
            };
        }
        let has_rave = child.has_rave_value();
        if child.has_mean() {
            let move_value = child.mean();
            if has_rave {
                let move_count = child.move_count() as f32;
                let rave_count = child.rave_count();
                let beta = rave_count
                    / (move_count * (self.rave_param1 + self.rave_param2 * rave_count)
                        + rave_count);
                beta * child.rave_value() + (1.0 - beta) * move_value
            } else {
                // Can happen in lock-free mode: the move value was already
                // updated but the RAVE value not.
                move_value
            }
        } else if has_rave {
            child.rave_value()
        } else {
            self.param.first_play_urgency
        }
    }

    // =========================================================================
    // Abort checks
    // =========================================================================

    fn check_abort(&self, games: usize) -> bool {
        if self.abort.load(Ordering::Relaxed) {
            return true;
        }
        if games >= self.max_games {
            log::debug!("search: max games reached");
            return true;
        }
        if self.tree_out_of_mem.load(Ordering::Relaxed) {
            log::debug!("search: maximum tree size reached");
            return true;
        }
        if let Some(early) = self.early_abort {
            let root = self.tree.root();
            let decided = root.has_mean()
                && root.move_count() > early.min_games
                && root.mean() > early.threshold;
            if decided && early.reduction_factor * games >= self.max_games {
                log::debug!("search: early abort (games)");
                self.was_early_abort.store(true, Ordering::Relaxed);
                return true;
            }
        }
        if games % self.check_interval.load(Ordering::Relaxed) == 0 {
            let elapsed = self.start_time.elapsed();
            if elapsed > self.max_time {
                log::debug!("search: max time reached");
                return true;
            }
            if let Some(early) = self.early_abort {
                let root = self.tree.root();
                let decided = root.has_mean()
                    && root.move_count() > early.min_games
                    && root.mean() > early.threshold;
                if decided && elapsed.mul_f64(early.reduction_factor as f64) > self.max_time {
                    log::debug!("search: early abort (time)");
                    self.was_early_abort.store(true, Ordering::Relaxed);
                    return true;
                }
            }
            self.update_check_interval(elapsed, games);
        }
        false
    }

    /// Adapt the time-check interval to roughly ten checks per second.
    fn update_check_interval(&self, elapsed: Duration, games: usize) {
        let elapsed = elapsed.as_secs_f64();
        if elapsed < f64::EPSILON {
            return;
        }
        let max_time = self.max_time.as_secs_f64();
        let wanted_time_diff = if max_time > 1.0 { 0.1 } else { 0.1 * max_time };
        let interval = if elapsed < wanted_time_diff / 10.0 {
            self.check_interval.load(Ordering::Relaxed) * 2
        } else {
            let games_per_second = games as f64 / elapsed;
            let per_thread = games_per_second / self.param.number_threads.max(1) as f64;
            (wanted_time_diff * per_thread) as usize
        };
        self.check_interval.store(interval.max(1), Ordering::Relaxed);
    }
}

// =============================================================================
// Per-worker search state
// =============================================================================

/// Everything a worker mutates during one iteration.
struct SearchState<'a> {
    thread_id: usize,
    search: &'a UctSearch,
    /// Pristine copy of the search position, for cheap per-game resets.
    pristine: Board,
    board: Board,
    policy: PlayoutPolicy,
    prior: PriorKnowledge,
    rng: ChaCha8Rng,
    /// Nodes visited during selection, root first.
    path: Vec<NodeId>,
    /// Moves from the root: in-tree prefix plus the playout.
    sequence: Vec<Point>,
    /// Moves excluded from RAVE updates (playout passes).
    skip_rave: Vec<bool>,
    first_play: Vec<u32>,
    first_play_opp: Vec<u32>,
    owner: Vec<Ownership>,
    is_terminal: bool,
    aborted_playout: bool,
    /// Capture balance of the running playout, for the mercy rule.
    stone_diff: i32,
    mercy_threshold: i32,
    /// Decisive mercy result (true = Black wins), if triggered.
    mercy_result: Option<bool>,
    /// Trailing passes generated inside the playout phase.
    playout_passes: usize,
}

impl<'a> SearchState<'a> {
    fn new(thread_id: usize, search: &'a UctSearch) -> SearchState<'a> {
        let board = search
            .root_board
            .as_ref()
            .expect("search position not set")
            .clone();
        let rng = match search.param.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(thread_id as u64)),
            None => ChaCha8Rng::from_entropy(),
        };
        let cells = board.cells_len();
        let size = board.size();
        SearchState {
            thread_id,
            search,
            pristine: board.clone(),
            board,
            policy: PlayoutPolicy::new(search.policy_param.clone()),
            prior: PriorKnowledge::new(search.prior_param.clone(), search.policy_param.clone()),
            rng,
            path: Vec::new(),
            sequence: Vec::new(),
            skip_rave: Vec::new(),
            first_play: vec![u32::MAX; cells],
            first_play_opp: vec![u32::MAX; cells],
            owner: vec![Ownership::Neutral; cells],
            is_terminal: false,
            aborted_playout: false,
            stone_diff: 0,
            mercy_threshold: (3 * size * size / 10) as i32,
            mercy_result: None,
            playout_passes: 0,
        }
    }

    fn search_loop(&mut self) {
        let search = self.search;
        let use_lock = !search.param.lock_free && search.param.number_threads > 1;
        let mut guard = if use_lock {
            Some(search.global_mutex.lock().unwrap())
        } else {
            None
        };
        loop {
            self.play_game(&mut guard, use_lock);
            let games = search.number_games.fetch_add(1, Ordering::Relaxed) + 1;
            let interval = search.param.live_gfx_interval;
            if interval > 0 && self.thread_id == 0 && games % interval == 0 {
                self.log_live_gfx(games);
            }
            if search.check_abort(games) {
                search.abort.store(true, Ordering::Relaxed);
                break;
            }
            if search.abort.load(Ordering::Relaxed) {
                break;
            }
        }
        drop(guard);
    }

    fn log_live_gfx(&self, games: usize) {
        let search = self.search;
        let best = search
            .find_best_child(NodeId::ROOT, &[])
            .map(|id| self.pristine.str_coord(search.tree.node(id).mv()))
            .unwrap_or_else(|| "none".into());
        let value = if search.tree.root().has_mean() {
            search.tree.root().mean()
        } else {
            0.5
        };
        let elapsed = search.start_time.elapsed().as_secs_f64().max(f64::EPSILON);
        log::debug!(
            "gfx: move {best} value {value:.2} games {games} gps {:.0}",
            games as f64 / elapsed
        );
    }

    /// One complete search iteration.
    fn play_game(
        &mut self,
        guard: &mut Option<std::sync::MutexGuard<'a, ()>>,
        use_lock: bool,
    ) {
        self.board.clone_from(&self.pristine);
        self.path.clear();
        self.sequence.clear();
        self.skip_rave.clear();
        self.is_terminal = false;
        self.aborted_playout = false;
        self.mercy_result = None;
        self.playout_passes = 0;

        let abort_in_tree = !self.play_in_tree();

        // The playout phase always runs unlocked.
        if use_lock {
            *guard = None;
        }
        let eval_black = if abort_in_tree {
            0.5
        } else if self.is_terminal {
            self.evaluate()
        } else {
            self.simulate();
            if self.aborted_playout {
                0.5
            } else {
                self.evaluate()
            }
        };
        if use_lock {
            *guard = Some(self.search.global_mutex.lock().unwrap());
        }

        let eval_root = if self.search.root_color == Color::Black {
            eval_black
        } else {
            1.0 - eval_black
        };
        self.update_tree(eval_root);
        if self.search.param.rave {
            self.update_rave(eval_root);
        }
        self.update_statistics();
    }

    // =========================================================================
    // Selection and expansion
    // =========================================================================

    /// Walk the in-tree phase. Returns false if the game hit the length
    /// cap while still inside the tree.
    fn play_in_tree(&mut self) -> bool {
        let tree = &self.search.tree;
        let expand_threshold = self.search.param.expand_threshold;
        let mut current = NodeId::ROOT;
        self.path.push(current);
        let mut break_after_select = false;
        loop {
            if self.sequence.len() >= self.search.max_game_len {
                return false;
            }
            let node = tree.node(current);
            if !node.has_children() {
                let moves = self.generate_all_moves(current == NodeId::ROOT);
                if moves.is_empty() {
                    self.is_terminal = true;
                    return true;
                }
                let expandable = current == NodeId::ROOT || node.move_count() >= expand_threshold;
                if !expandable || !self.expand(current, &moves) {
                    // Not mature yet, or out of tree memory: play out from
                    // here.
                    return true;
                }
                break_after_select = true;
            }
            let child = self.select_child(current);
            let mv = tree.node(child).mv();
            let color = self.board.to_play();
            self.board
                .play_if_legal(mv, color)
                .expect("selected in-tree move must be playable");
            self.sequence.push(mv);
            self.skip_rave.push(false);
            self.path.push(child);
            current = child;
            if break_after_select {
                return true;
            }
        }
    }

    /// Legal candidate moves at the current scratch position, or empty at
    /// a terminal position. The root applies full legality and the root
    /// filter; deeper nodes use pseudo-legality.
    fn generate_all_moves(&mut self, at_root: bool) -> Vec<Point> {
        if self.board.two_passes() {
            return Vec::new();
        }
        let color = self.board.to_play();
        let mut moves: Vec<Point> = self
            .board
            .points()
            .filter(|&p| {
                self.board.is_empty(p)
                    && !self.board.is_simple_eye(p, color)
                    && if at_root {
                        self.board.is_legal(p, color)
                    } else {
                        self.board.is_pseudo_legal(p, color)
                    }
            })
            .collect();
        if at_root && !self.search.root_filter.is_empty() {
            moves.retain(|mv| !self.search.root_filter.contains(mv));
        }
        // A random move up front: the first point of a board iteration is
        // often a bad corner move, and full shuffling is unnecessary once
        // priors or RAVE order the children.
        if moves.len() > 1 {
            let idx = self.rng.gen_range(0..moves.len());
            moves.swap(0, idx);
        }
        moves.push(PASS);
        moves
    }

    /// Create children with seeded priors. Returns false when the worker's
    /// allocator is out of capacity (treated as a non-expansion).
    fn expand(&mut self, node: NodeId, moves: &[Point]) -> bool {
        let seeds = self.prior.seed(&self.board, moves, &mut self.rng);
        let init = self.prior.init();
        let created = self.search.tree.create_children(
            self.thread_id,
            node,
            moves,
            |i, child: &UctNode| {
                if let Some(seeds) = &seeds {
                    let seed = seeds[i];
                    if seed.count > 0 {
                        if matches!(init, PriorInit::Move | PriorInit::Both) {
                            child.initialize_value(seed.value, seed.count);
                        }
                        if matches!(init, PriorInit::Rave | PriorInit::Both) {
                            child.initialize_rave_value(seed.value, seed.count as f32);
                        }
                    }
                }
            },
        );
        if !created {
            log::debug!(
                "search: tree out of memory ({} nodes)",
                self.search.tree.nu_nodes()
            );
            self.search.tree_out_of_mem.store(true, Ordering::Relaxed);
        }
        created
    }

    /// UCT+RAVE selection among the children of `id`. Ties break toward
    /// the earlier child, which makes single-threaded runs deterministic.
    fn select_child(&self, id: NodeId) -> NodeId {
        let search = self.search;
        let tree = &search.tree;
        let node = tree.node(id);
        let pos_count = node.pos_count();
        let mut iter = tree.children(id);
        if pos_count == 0 {
            // No position count yet: bias terms are undefined, take the
            // first child.
            return iter.next().expect("select_child needs children").0;
        }
        let log_pos_count = (pos_count as f32).ln();
        let mut best = None;
        let mut best_bound = 0.0f32;
        for (child_id, child) in iter {
            let bound = search.get_bound(log_pos_count, child);
            if best.is_none() || bound > best_bound {
                best = Some(child_id);
                best_bound = bound;
            }
        }
        best.expect("select_child needs children")
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    fn simulate(&mut self) {
        self.policy.start_playout(&self.board);
        self.stone_diff = 0;
        self.playout_passes = 0;
        loop {
            if self.sequence.len() >= self.search.max_game_len {
                self.aborted_playout = true;
                return;
            }
            if self.search.param.mercy_rule && self.check_mercy_rule() {
                return;
            }
            let color = self.board.to_play();
            let mv = self.policy.generate_move(&self.board, &mut self.rng);
            self.board
                .play_if_legal(mv, color)
                .expect("policy move must be pseudo-legal");
            self.sequence.push(mv);
            if mv == PASS {
                self.skip_rave.push(true);
                self.playout_passes += 1;
                if self.board.two_passes() {
                    return;
                }
            } else {
                self.skip_rave.push(false);
                self.playout_passes = 0;
                let captured = self.board.last_nu_captured() as i32;
                if color == Color::Black {
                    self.stone_diff += captured;
                } else {
                    self.stone_diff -= captured;
                }
                self.policy.on_play(&self.board);
            }
        }
    }

    fn check_mercy_rule(&mut self) -> bool {
        if self.stone_diff >= self.mercy_threshold {
            self.mercy_result = Some(true);
        } else if self.stone_diff <= -self.mercy_threshold {
            self.mercy_result = Some(false);
        }
        self.mercy_result.is_some()
    }

    /// Evaluate the scratch position as a win probability for Black.
    ///
    /// Two passes inside the playout phase allow the fast scoring; all
    /// other terminals use Tromp-Taylor. The 0/1 outcome is stretched by
    /// the score-modification bonus to reward larger wins.
    fn evaluate(&mut self) -> f32 {
        if let Some(black_wins) = self.mercy_result {
            return if black_wins { 1.0 } else { 0.0 };
        }
        let komi = self.board.komi();
        let size = self.board.size();
        let owner = if self.search.territory.is_some() {
            self.owner.iter_mut().for_each(|o| *o = Ownership::Neutral);
            Some(&mut self.owner[..])
        } else {
            None
        };
        let score = if self.playout_passes >= 2 {
            scoring::simple_end_score(&self.board, komi, owner)
        } else {
            scoring::tromp_taylor_score(&self.board, komi, owner)
        };
        if let Some(territory) = &self.search.territory {
            for p in self.board.points() {
                let value = match self.owner[p] {
                    Ownership::Black => 1.0,
                    Ownership::White => 0.0,
                    Ownership::Neutral => 0.5,
                };
                territory[p].add(value);
            }
        }
        let modification = self.search.param.score_modification;
        let inv_max_score = 1.0 / (size as f32 * size as f32 + komi.abs());
        if score > 0.0 {
            (1.0 - modification) + modification * score * inv_max_score
        } else {
            modification + modification * score * inv_max_score
        }
    }

    // =========================================================================
    // Back-propagation
    // =========================================================================

    /// Update counts and means along the visited path. `eval_root` is the
    /// game result from the root player's perspective; the per-ply
    /// inversion keeps every node's mean oriented toward the player who
    /// moves into it.
    fn update_tree(&mut self, eval_root: f32) {
        let tree = &self.search.tree;
        for (i, &id) in self.path.iter().enumerate() {
            if i > 0 {
                tree.node(self.path[i - 1]).inc_pos_count();
            }
            let value = if i == 0 || i % 2 == 1 {
                eval_root
            } else {
                1.0 - eval_root
            };
            tree.node(id).add_game_result(value);
        }
    }

    /// All-moves-as-first update: every child of a visited node whose move
    /// was later played by the side to move at that node receives the
    /// outcome, weighted down with distance.
    fn update_rave(&mut self, eval_root: f32) {
        let len = self.sequence.len();
        if len == 0 {
            return;
        }
        for v in &mut self.first_play {
            *v = u32::MAX;
        }
        for v in &mut self.first_play_opp {
            *v = u32::MAX;
        }
        let nu_nodes = self.path.len();
        let mut i = len - 1;
        let mut opp = i % 2 != 0;
        // Playout suffix: only record first-play indices.
        while i + 1 > nu_nodes {
            if !self.skip_rave[i] {
                let mv = self.sequence[i];
                let first = if opp {
                    &mut self.first_play_opp[mv]
                } else {
                    &mut self.first_play[mv]
                };
                if (i as u32) < *first {
                    *first = i as u32;
                }
            }
            i -= 1;
            opp = !opp;
        }
        // In-tree part: record and update the children of each node.
        loop {
            if !self.skip_rave[i] {
                let mv = self.sequence[i];
                {
                    let first = if opp {
                        &mut self.first_play_opp[mv]
                    } else {
                        &mut self.first_play[mv]
                    };
                    if (i as u32) < *first {
                        *first = i as u32;
                    }
                }
                let eval = if opp { 1.0 - eval_root } else { eval_root };
                self.update_rave_node(i, eval, len, opp);
            }
            if i == 0 {
                break;
            }
            i -= 1;
            opp = !opp;
        }
    }

    fn update_rave_node(&self, i: usize, eval: f32, len: usize, opp: bool) {
        let search = self.search;
        let tree = &search.tree;
        let node_id = self.path[i];
        if !tree.node(node_id).has_children() {
            return;
        }
        let (first_play, first_play_opp) = if opp {
            (&self.first_play_opp, &self.first_play)
        } else {
            (&self.first_play, &self.first_play_opp)
        };
        for (_, child) in tree.children(node_id) {
            let mv = child.mv();
            let first = first_play[mv];
            if first == u32::MAX {
                continue;
            }
            debug_assert!(first as usize >= i);
            if search.param.rave_check_same {
                let first_opp = first_play_opp[mv];
                if first_opp != u32::MAX && (i as u32) <= first_opp && first_opp <= first {
                    continue;
                }
            }
            let weight = if search.param.weight_rave_updates {
                2.0 - (first as f32 - i as f32) / (len as f32 - i as f32)
            } else {
                1.0
            };
            child.add_rave_value(eval, weight);
        }
    }

    fn update_statistics(&mut self) {
        let nu_in_tree = self.path.len() - 1;
        let mut stats = self.search.statistics.lock().unwrap();
        stats.moves_in_tree.add(nu_in_tree as f32);
        stats.game_length.add(self.sequence.len() as f32);
        stats.aborted.add(if self.aborted_playout { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::PriorMode;

    fn quick_param(threads: usize) -> SearchParam {
        SearchParam {
            number_threads: threads,
            max_nodes: 50_000,
            seed: Some(42),
            ..SearchParam::default()
        }
    }

    fn quick_search(threads: usize) -> UctSearch {
        UctSearch::new(
            quick_param(threads),
            PolicyParam::default(),
            PriorParam::default(),
        )
    }

    #[test]
    fn test_returns_root_child() {
        let bd = Board::new(9);
        let mut search = quick_search(1);
        let result = search.search(
            &bd,
            200,
            Duration::from_secs(60),
            &[],
            None,
            None,
        );
        let best = result.best_move.unwrap();
        let root_moves: Vec<Point> = search
            .tree()
            .children(NodeId::ROOT)
            .map(|(_, c)| c.mv())
            .collect();
        assert!(root_moves.contains(&best));
        assert_eq!(result.games, 200);
    }

    #[test]
    fn test_single_thread_deterministic() {
        let bd = Board::new(9);
        let mut s1 = quick_search(1);
        let mut s2 = quick_search(1);
        let r1 = s1.search(&bd, 150, Duration::from_secs(60), &[], None, None);
        let r2 = s2.search(&bd, 150, Duration::from_secs(60), &[], None, None);
        assert_eq!(r1.best_move, r2.best_move);
        assert_eq!(r1.value, r2.value);
    }

    #[test]
    fn test_root_filter_is_respected() {
        let bd = Board::new(9);
        let filtered = bd.parse_coord("E5").unwrap();
        let mut search = quick_search(1);
        search.search(
            &bd,
            100,
            Duration::from_secs(60),
            &[filtered],
            None,
            None,
        );
        assert!(search
            .tree()
            .children(NodeId::ROOT)
            .all(|(_, c)| c.mv() != filtered));
    }

    #[test]
    fn test_visit_count_accounting() {
        // With priors and RAVE off, the root count equals the number of
        // games and no child exceeds it.
        let bd = Board::new(9);
        let mut search = UctSearch::new(
            SearchParam {
                rave: false,
                expand_threshold: 10,
                ..quick_param(1)
            },
            PolicyParam::default(),
            PriorParam {
                mode: PriorMode::None,
                ..PriorParam::default()
            },
        );
        search.search(&bd, 1000, Duration::from_secs(120), &[], None, None);
        assert_eq!(search.tree().root().move_count(), 1000);
        for (_, child) in search.tree().children(NodeId::ROOT) {
            assert!(child.move_count() <= 1000);
        }
        search.tree().check_consistency();
    }

    #[test]
    fn test_multithreaded_smoke() {
        let bd = Board::new(9);
        let mut search = quick_search(2);
        let result = search.search(&bd, 400, Duration::from_secs(60), &[], None, None);
        assert!(result.best_move.is_some());
        assert!(result.games >= 400);
        search.tree().check_consistency();
    }

    #[test]
    fn test_subtree_reuse_preserves_counts() {
        let bd = Board::new(9);
        let mut search = quick_search(1);
        search.search(&bd, 300, Duration::from_secs(60), &[], None, None);
        let best = search
            .find_best_child(NodeId::ROOT, &[])
            .expect("root expanded");
        let best_move = search.tree().node(best).mv();
        let best_count = search.tree().node(best).move_count();
        let child_counts: Vec<(Point, u32)> = search
            .tree()
            .children(best)
            .map(|(_, c)| (c.mv(), c.move_count()))
            .collect();
        let reused = search
            .find_subtree(&[best_move], Duration::from_secs(10))
            .unwrap();
        assert_eq!(reused.root().move_count(), best_count);
        let reused_counts: Vec<(Point, u32)> = reused
            .children(NodeId::ROOT)
            .map(|(_, c)| (c.mv(), c.move_count()))
            .collect();
        assert_eq!(child_counts, reused_counts);
    }

    #[test]
    fn test_territory_statistics_cover_settled_board() {
        let mut bd = Board::new(9);
        bd.play(bd.parse_coord("E5").unwrap(), Color::Black).unwrap();
        let mut search = UctSearch::new(
            SearchParam {
                territory_statistics: true,
                ..quick_param(1)
            },
            PolicyParam::default(),
            PriorParam::default(),
        );
        search.search(&bd, 100, Duration::from_secs(60), &[], None, None);
        let sampled = bd
            .points()
            .filter(|&p| search.territory_mean(p).is_some())
            .count();
        assert!(sampled > 0);
    }
}
