//! Rule-based playout move generation.
//!
//! The policy generates one move per simulation step using a strictly
//! ordered cascade; the first rule that yields a non-empty candidate set
//! decides:
//!
//! 1. Atari capture: take the last liberty of the opponent's last-move
//!    block if it is in atari.
//! 2. Atari defense: escape or counter-capture own blocks next to the
//!    opponent's last move that are in atari.
//! 3. Capture: take the liberty of any opponent block in atari, using an
//!    incrementally maintained candidate list.
//! 4. Pattern: 3x3 pattern matches around the last and second-last move.
//! 5. Random: a uniformly chosen pseudo-legal non-eye point.
//! 6. Pass, when nothing qualifies.
//!
//! The chosen move finally goes through a deterministic self-atari
//! correction. The policy never mutates the board; the simulation driver
//! executes the move and reports it back through [`PlayoutPolicy::on_play`].

use rand::Rng;
use smallvec::SmallVec;

use crate::board::{Board, Color, Point};
use crate::constants::{NULL_MOVE, PASS};
use crate::patterns::matches_pat3;
use crate::stats::Statistics;

/// Which rule of the cascade produced the last generated move.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PolicyMoveType {
    AtariCapture,
    AtariDefense,
    Capture,
    Pattern,
    Random,
    Pass,
}

/// Parameters shared by all policy instances of a search.
#[derive(Debug, Clone)]
pub struct PolicyParam {
    /// Don't use any move generating heuristics.
    pub pure_random: bool,
    /// Collect generation statistics (costs a little performance).
    pub statistics_enabled: bool,
}

impl Default for PolicyParam {
    fn default() -> PolicyParam {
        PolicyParam {
            pure_random: false,
            statistics_enabled: false,
        }
    }
}

/// Statistics collected by the policy when enabled.
#[derive(Debug, Clone, Default)]
pub struct PolicyStat {
    /// Number of moves generated.
    pub nu_moves: usize,
    /// Number of pure random moves played.
    pub nu_random_moves: usize,
    /// Length of the equivalent-best-move list of non-random moves.
    pub move_list_len: Statistics,
}

/// Filter for points played in the random phase and for candidate checks:
/// empty, not an own simple eye, pseudo-legal.
pub fn generate_point(bd: &Board, p: Point, color: Color) -> bool {
    bd.is_empty(p) && !bd.is_simple_eye(p, color) && bd.is_pseudo_legal(p, color)
}

/// All eight neighbors of a point.
fn eight_neighborhood(bd: &Board, p: Point) -> [Point; 8] {
    let n = bd.neighbors(p);
    let d = bd.diag_neighbors(p);
    [n[0], n[1], n[2], n[3], d[0], d[1], d[2], d[3]]
}

fn in_eight_neighborhood(bd: &Board, center: Point, p: Point) -> bool {
    p == center || eight_neighborhood(bd, center).contains(&p)
}

/// Anchors of blocks of `color` in atari adjacent to the block at `p`.
fn adjacent_blocks_in_atari(bd: &Board, p: Point, color: Color) -> SmallVec<[Point; 8]> {
    let mut anchors: SmallVec<[Point; 8]> = SmallVec::new();
    for s in bd.block_stones(p) {
        for n in bd.neighbors(s) {
            if bd.color_at(n) != Some(color) {
                continue;
            }
            let a = bd.anchor(n);
            if !anchors.contains(&a) && bd.in_atari(a) {
                anchors.push(a);
            }
        }
    }
    anchors
}

/// Deterministic self-atari correction.
///
/// If playing `p` would put the moving color into atari without capturing
/// enough to prevent it, a nearby alternative is proposed: the liberty the
/// resulting block would have, or the empty neighbor of an isolated stone.
/// Identical inputs yield the same replacement, and correcting a corrected
/// move never corrects again.
pub fn self_atari_correction(bd: &Board, p: Point) -> Option<Point> {
    let to_play = bd.to_play();
    // Cheap exit: two empty neighbors can never be self-atari.
    if bd.num_empty_neighbors(p) >= 2 {
        return None;
    }
    let opp = to_play.opponent();
    let has_own_neighbor = bd
        .neighbors(p)
        .into_iter()
        .any(|n| bd.color_at(n) == Some(to_play));
    if has_own_neighbor {
        // p joins an existing block.
        if !bd.self_atari(p, to_play) {
            return None;
        }
        // The replacement is the liberty the block would have after p.
        let mut replace = None;
        'outer: for n in bd.neighbors(p) {
            match bd.color_at(n) {
                None => {
                    if !bd.is_out(n) {
                        replace = Some(n);
                        break 'outer;
                    }
                }
                Some(c) if c == to_play => {
                    let (_, libs) = bd.block(n, 2);
                    for lib in libs {
                        if lib != p {
                            replace = Some(lib);
                            break 'outer;
                        }
                    }
                }
                Some(_) => {
                    if bd.in_atari(n) {
                        replace = Some(n);
                        break 'outer;
                    }
                }
            }
        }
        let replace = replace?;
        if bd.is_pseudo_legal(replace, to_play) && !bd.self_atari(replace, to_play) {
            return Some(replace);
        }
    } else if bd.num_empty_neighbors(p) > 0 {
        // Isolated stone with a single empty neighbor.
        let nb = bd.empty_neighbor(p)?;
        if bd.is_pseudo_legal(nb, to_play) {
            if bd.num_empty_neighbors(nb) >= 2 {
                // Keep p if it is a capturing move.
                if !bd.neighbor_blocks(p, opp, 1).is_empty() {
                    return None;
                }
            }
            return Some(nb);
        }
    }
    None
}

/// Rule-cascade playout policy. One instance per search worker.
pub struct PlayoutPolicy {
    param: PolicyParam,
    /// Candidate moves of the rule that fired.
    moves: Vec<Point>,
    move_type: PolicyMoveType,
    /// True once `moves` holds only checked (corrected) moves.
    checked: bool,
    /// Stones that may belong to capturable blocks, maintained across the
    /// playout. Stale entries are dropped lazily.
    capture_candidates: Vec<Point>,
    stats: PolicyStat,
    /// Consecutive non-random moves, for statistics.
    non_random_len: u64,
}

impl PlayoutPolicy {
    pub fn new(param: PolicyParam) -> PlayoutPolicy {
        PlayoutPolicy {
            param,
            moves: Vec::new(),
            move_type: PolicyMoveType::Pass,
            checked: false,
            capture_candidates: Vec::new(),
            stats: PolicyStat::default(),
            non_random_len: 0,
        }
    }

    pub fn param_mut(&mut self) -> &mut PolicyParam {
        &mut self.param
    }

    /// Prepare for a playout starting at the given position.
    pub fn start_playout(&mut self, bd: &Board) {
        self.capture_candidates.clear();
        for p in bd.points() {
            if bd.color_at(p).is_some() && bd.anchor(p) == p && bd.in_atari(p) {
                self.capture_candidates.push(p);
            }
        }
        self.non_random_len = 0;
    }

    /// Notify the policy that a move was executed on the board.
    pub fn on_play(&mut self, bd: &Board) {
        let last = bd.last_move();
        if last == PASS || last == NULL_MOVE {
            return;
        }
        if bd.in_atari(last) {
            self.capture_candidates.push(last);
        }
        for n in bd.neighbors(last) {
            if bd.color_at(n).is_some() && bd.in_atari(n) {
                self.capture_candidates.push(n);
            }
        }
    }

    /// The rule that produced the most recently generated move.
    pub fn move_type(&self) -> PolicyMoveType {
        self.move_type
    }

    pub fn statistics(&self) -> &PolicyStat {
        &self.stats
    }

    pub fn clear_statistics(&mut self) {
        self.stats = PolicyStat::default();
    }

    /// Generate a move for the player to move. Returns `PASS` when no rule
    /// produces a playable move. Does not mutate the board.
    pub fn generate_move(&mut self, bd: &Board, rng: &mut impl Rng) -> Point {
        self.moves.clear();
        self.checked = false;
        let mut mv = None;
        if self.param.pure_random {
            self.move_type = PolicyMoveType::Random;
            mv = self.generate_random(bd, rng);
        } else {
            let last = bd.last_move();
            let last_is_stone = last != PASS && last != NULL_MOVE;
            if last_is_stone {
                if self.generate_atari_capture(bd) {
                    self.move_type = PolicyMoveType::AtariCapture;
                    mv = self.select_random(bd, rng);
                }
                if mv.is_none() {
                    self.moves.clear();
                    if self.generate_atari_defense(bd) {
                        self.move_type = PolicyMoveType::AtariDefense;
                        mv = self.select_random(bd, rng);
                    }
                }
            }
            if mv.is_none() {
                self.moves.clear();
                if self.generate_captures(bd) {
                    self.move_type = PolicyMoveType::Capture;
                    mv = self.select_random(bd, rng);
                }
            }
            if mv.is_none() && last_is_stone {
                self.moves.clear();
                if self.generate_pattern_moves(bd) {
                    self.move_type = PolicyMoveType::Pattern;
                    mv = self.select_random(bd, rng);
                }
            }
            if mv.is_none() {
                self.moves.clear();
                self.move_type = PolicyMoveType::Random;
                mv = self.generate_random(bd, rng);
            }
        }
        if self.param.statistics_enabled {
            self.update_statistics();
        }
        match mv {
            None => {
                self.move_type = PolicyMoveType::Pass;
                self.moves.clear();
                PASS
            }
            Some(p) => match self_atari_correction(bd, p) {
                Some(replacement) => {
                    self.moves.clear();
                    self.moves.push(replacement);
                    self.checked = true;
                    replacement
                }
                None => p,
            },
        }
    }

    /// Moves the deciding rule considered tied. Used by the prior module;
    /// for a random move this is every point the random rule could play.
    pub fn equivalent_best_moves(&self, bd: &Board) -> Vec<Point> {
        let to_play = bd.to_play();
        if self.move_type == PolicyMoveType::Random {
            return bd
                .points()
                .filter(|&p| generate_point(bd, p, to_play))
                .collect();
        }
        self.moves
            .iter()
            .copied()
            .filter(|&p| self.checked || generate_point(bd, p, to_play))
            .collect()
    }

    // =========================================================================
    // Rules
    // =========================================================================

    fn generate_atari_capture(&mut self, bd: &Board) -> bool {
        let last = bd.last_move();
        if bd.in_atari(last) {
            self.moves.push(bd.the_liberty(last));
            return true;
        }
        false
    }

    fn generate_atari_defense(&mut self, bd: &Board) -> bool {
        let to_play = bd.to_play();
        let last = bd.last_move();
        let mut anchors: SmallVec<[Point; 4]> = SmallVec::new();
        for n in bd.neighbors(last) {
            if bd.color_at(n) != Some(to_play) || !bd.in_atari(n) {
                continue;
            }
            let anchor = bd.anchor(n);
            if anchors.contains(&anchor) {
                continue;
            }
            anchors.push(anchor);
            // Escape on the last liberty if that is not self-atari.
            let the_liberty = bd.the_liberty(anchor);
            if !bd.self_atari(the_liberty, to_play) {
                self.moves.push(the_liberty);
            }
            // Counter-capture adjacent opponent blocks. If the opponent's
            // last liberty is our own last liberty the escape check above
            // already covered it.
            for opp_anchor in adjacent_blocks_in_atari(bd, anchor, to_play.opponent()) {
                let opp_liberty = bd.the_liberty(opp_anchor);
                if opp_liberty != the_liberty {
                    self.moves.push(opp_liberty);
                }
            }
        }
        !self.moves.is_empty()
    }

    fn generate_captures(&mut self, bd: &Board) -> bool {
        let opp = bd.to_play().opponent();
        let mut i = 0;
        while i < self.capture_candidates.len() {
            let p = self.capture_candidates[i];
            if bd.color_at(p).is_none() || !bd.in_atari(p) {
                self.capture_candidates.swap_remove(i);
                continue;
            }
            if bd.color_at(p) == Some(opp) {
                self.moves.push(bd.the_liberty(p));
            }
            i += 1;
        }
        !self.moves.is_empty()
    }

    fn generate_pattern_moves(&mut self, bd: &Board) -> bool {
        let to_play = bd.to_play();
        let last = bd.last_move();
        for n in eight_neighborhood(bd, last) {
            if bd.is_empty(n) && matches_pat3(bd, n) && !bd.self_atari(n, to_play) {
                self.moves.push(n);
            }
        }
        let last2 = bd.second_last_move();
        if last2 != PASS && last2 != NULL_MOVE {
            for n in eight_neighborhood(bd, last2) {
                if bd.is_empty(n)
                    && !in_eight_neighborhood(bd, last, n)
                    && matches_pat3(bd, n)
                    && !bd.self_atari(n, to_play)
                {
                    self.moves.push(n);
                }
            }
        }
        !self.moves.is_empty()
    }

    /// Uniform choice among all playable points.
    fn generate_random(&mut self, bd: &Board, rng: &mut impl Rng) -> Option<Point> {
        let to_play = bd.to_play();
        let mut candidates: Vec<Point> = bd
            .points()
            .filter(|&p| generate_point(bd, p, to_play))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..candidates.len());
        Some(candidates.swap_remove(idx))
    }

    /// Random choice from `self.moves`, dropping unplayable candidates.
    fn select_random(&mut self, bd: &Board, rng: &mut impl Rng) -> Option<Point> {
        let to_play = bd.to_play();
        while !self.moves.is_empty() {
            let idx = rng.gen_range(0..self.moves.len());
            let p = self.moves[idx];
            if generate_point(bd, p, to_play) {
                return Some(p);
            }
            self.moves.swap_remove(idx);
        }
        None
    }

    fn update_statistics(&mut self) {
        self.stats.nu_moves += 1;
        if self.move_type == PolicyMoveType::Random {
            self.stats.nu_random_moves += 1;
            self.non_random_len = 0;
        } else {
            self.non_random_len += 1;
            self.stats.move_list_len.add(self.moves.len() as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn test_atari_capture_rule() {
        let mut bd = Board::new(9);
        // White D4 reduced to one liberty, then White moves elsewhere is
        // not needed: the last move must be the block in atari.
        for (mv, c) in [
            ("D3", Color::Black),
            ("D5", Color::Black),
            ("C4", Color::Black),
            ("D4", Color::White), // white plays into atari
        ] {
            bd.play(bd.parse_coord(mv).unwrap(), c).unwrap();
        }
        let mut policy = PlayoutPolicy::new(PolicyParam::default());
        policy.start_playout(&bd);
        let mv = policy.generate_move(&bd, &mut rng());
        assert_eq!(policy.move_type(), PolicyMoveType::AtariCapture);
        assert_eq!(mv, bd.parse_coord("E4").unwrap());
    }

    #[test]
    fn test_atari_defense_rule() {
        let mut bd = Board::new(9);
        // Black D4 is put in atari by White's last move; Black to answer.
        for (mv, c) in [
            ("D4", Color::Black),
            ("D3", Color::White),
            ("D5", Color::White),
            ("C4", Color::White),
        ] {
            bd.play(bd.parse_coord(mv).unwrap(), c).unwrap();
        }
        let mut policy = PlayoutPolicy::new(PolicyParam::default());
        policy.start_playout(&bd);
        let mv = policy.generate_move(&bd, &mut rng());
        assert_eq!(policy.move_type(), PolicyMoveType::AtariDefense);
        assert_eq!(mv, bd.parse_coord("E4").unwrap());
    }

    #[test]
    fn test_policy_moves_are_pseudo_legal() {
        // The policy contract: every generated move is pseudo-legal on
        // the state at the time of generation.
        let mut bd = Board::new(9);
        let mut policy = PlayoutPolicy::new(PolicyParam::default());
        let mut rng = rng();
        policy.start_playout(&bd);
        for _ in 0..120 {
            let color = bd.to_play();
            let mv = policy.generate_move(&bd, &mut rng);
            assert!(bd.is_pseudo_legal(mv, color));
            if bd.play_if_legal(mv, color).is_ok() {
                policy.on_play(&bd);
            }
            if bd.two_passes() {
                break;
            }
        }
    }

    #[test]
    fn test_correction_single_stone() {
        // Black stone at A2: the white candidate A1 is replaced by B1,
        // and the correction is idempotent.
        let mut bd = Board::new(19);
        bd.play(bd.parse_coord("A2").unwrap(), Color::Black).unwrap();
        assert_eq!(bd.to_play(), Color::White);
        let a1 = bd.parse_coord("A1").unwrap();
        let b1 = bd.parse_coord("B1").unwrap();
        assert_eq!(self_atari_correction(&bd, a1), Some(b1));
        assert_eq!(self_atari_correction(&bd, b1), None);
    }

    #[test]
    fn test_correction_keeps_capture() {
        // The candidate captures, so it stays.
        let mut bd = Board::new(19);
        for (mv, c) in [
            ("A2", Color::Black),
            ("B2", Color::Black),
            ("A3", Color::White),
            ("B1", Color::White),
            ("B3", Color::White),
            ("C2", Color::White),
        ] {
            bd.play(bd.parse_coord(mv).unwrap(), c).unwrap();
        }
        bd.set_to_play(Color::White);
        let a1 = bd.parse_coord("A1").unwrap();
        assert_eq!(self_atari_correction(&bd, a1), None);
    }

    #[test]
    fn test_statistics_collection() {
        let mut bd = Board::new(9);
        let mut policy = PlayoutPolicy::new(PolicyParam {
            statistics_enabled: true,
            ..PolicyParam::default()
        });
        let mut rng = rng();
        policy.start_playout(&bd);
        for _ in 0..20 {
            let color = bd.to_play();
            let mv = policy.generate_move(&bd, &mut rng);
            bd.play_if_legal(mv, color).unwrap();
            policy.on_play(&bd);
        }
        assert_eq!(policy.statistics().nu_moves, 20);
        assert!(policy.statistics().nu_random_moves > 0);
        policy.clear_statistics();
        assert_eq!(policy.statistics().nu_moves, 0);
    }

    #[test]
    fn test_pure_random_plays_no_eye_fill() {
        let mut bd = Board::new(9);
        for mv in ["A2", "B1", "B2"] {
            bd.play(bd.parse_coord(mv).unwrap(), Color::Black).unwrap();
        }
        bd.set_to_play(Color::Black);
        let a1 = bd.parse_coord("A1").unwrap();
        let mut policy = PlayoutPolicy::new(PolicyParam {
            pure_random: true,
            ..PolicyParam::default()
        });
        policy.start_playout(&bd);
        let mut rng = rng();
        for _ in 0..50 {
            let mv = policy.generate_move(&bd, &mut rng);
            assert_ne!(mv, a1, "policy filled a true eye");
        }
    }
}
