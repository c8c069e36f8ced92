//! Prior knowledge seeding for freshly expanded nodes.
//!
//! At expansion time every legal child move receives a `(value,
//! equivalent count)` pair, interpreted as if that many simulations had
//! already been observed with that mean. The default scheme runs the
//! playout policy once without committing a move: every move tied in the
//! deciding rule gets a winning prior, other pseudo-legal moves a neutral
//! one, and moves flagged as bad (self-atari, pass) a losing one.

use rand::Rng;

use crate::board::{Board, Point};
use crate::constants::PASS;
use crate::policy::{PlayoutPolicy, PolicyMoveType, PolicyParam};

/// How freshly expanded children are initialized.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PriorMode {
    /// No seeding; children start at zero count.
    None,
    /// All moves receive an identical neutral prior.
    Even,
    /// Derive priors from the playout policy (the default).
    Policy,
}

/// Which node statistics the priors initialize.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PriorInit {
    Move,
    Rave,
    Both,
}

/// Tunable prior constants. The equivalent counts were empirically tuned
/// in the original engine; they are parameters here.
#[derive(Debug, Clone)]
pub struct PriorParam {
    pub mode: PriorMode,
    pub init: PriorInit,
    /// Count for moves the policy would play (value 1).
    pub count_high: u32,
    /// Count for ordinary pseudo-legal moves (value 0.5).
    pub count_mid: u32,
    /// Count for bad moves (value 0).
    pub count_low: u32,
    /// Count used by the `Even` mode.
    pub count_even: u32,
    /// Down-weight moves that run into a working ladder.
    pub ladders: bool,
}

impl Default for PriorParam {
    fn default() -> PriorParam {
        PriorParam {
            mode: PriorMode::Policy,
            init: PriorInit::Both,
            count_high: 9,
            count_mid: 9,
            count_low: 9,
            count_even: 30,
            ladders: false,
        }
    }
}

/// A seeded prior for one child move.
#[derive(Debug, Copy, Clone)]
pub struct MovePrior {
    pub value: f32,
    pub count: u32,
}

/// Produces `(value, count)` priors for each legal move at a node.
/// One instance per search worker; owns a policy clone for the probe run.
pub struct PriorKnowledge {
    param: PriorParam,
    policy: PlayoutPolicy,
}

impl PriorKnowledge {
    pub fn new(param: PriorParam, policy_param: PolicyParam) -> PriorKnowledge {
        PriorKnowledge {
            param,
            policy: PlayoutPolicy::new(policy_param),
        }
    }

    pub fn mode(&self) -> PriorMode {
        self.param.mode
    }

    pub fn init(&self) -> PriorInit {
        self.param.init
    }

    /// Seed priors for the candidate moves at the current position.
    ///
    /// Returns one prior per entry of `moves`, or `None` when seeding is
    /// disabled (mode `None`, or the policy move was pure random and
    /// carries no information).
    pub fn seed(
        &mut self,
        bd: &Board,
        moves: &[Point],
        rng: &mut impl Rng,
    ) -> Option<Vec<MovePrior>> {
        match self.param.mode {
            PriorMode::None => None,
            PriorMode::Even => Some(
                moves
                    .iter()
                    .map(|_| MovePrior {
                        value: 0.5,
                        count: self.param.count_even,
                    })
                    .collect(),
            ),
            PriorMode::Policy => self.seed_from_policy(bd, moves, rng),
        }
    }

    fn seed_from_policy(
        &mut self,
        bd: &Board,
        moves: &[Point],
        rng: &mut impl Rng,
    ) -> Option<Vec<MovePrior>> {
        self.policy.start_playout(bd);
        self.policy.generate_move(bd, rng);
        if self.policy.move_type() == PolicyMoveType::Random {
            return None;
        }
        let to_play = bd.to_play();
        let best = self.policy.equivalent_best_moves(bd);
        let priors = moves
            .iter()
            .map(|&mv| {
                if mv == PASS || bd.self_atari(mv, to_play) {
                    MovePrior {
                        value: 0.0,
                        count: self.param.count_low,
                    }
                } else if best.contains(&mv) {
                    let value = if self.param.ladders && ladder_refutes(bd, mv) {
                        0.0
                    } else {
                        1.0
                    };
                    MovePrior {
                        value,
                        count: self.param.count_high,
                    }
                } else {
                    MovePrior {
                        value: 0.5,
                        count: self.param.count_mid,
                    }
                }
            })
            .collect();
        Some(priors)
    }
}

/// Does playing `mv` leave the played block capturable in a ladder?
///
/// A shallow capture read: if the resulting block has exactly two
/// liberties, the attacker chases it and the defender may only run or
/// counter-capture. Used to down-weight prior values only; never consulted
/// during playouts.
fn ladder_refutes(bd: &Board, mv: Point) -> bool {
    let color = bd.to_play();
    let mut after = bd.clone();
    if after.play_if_legal(mv, color).is_err() {
        return false;
    }
    if after.color_at(mv).is_none() {
        return false;
    }
    let (_, libs) = after.block(mv, 3);
    libs.len() == 2 && read_ladder_attack(&after, mv).is_some()
}

/// Try to capture the two-liberty block at `p` in a ladder. The attacker
/// is to move. Returns the working attack move, if any.
pub fn read_ladder_attack(bd: &Board, p: Point) -> Option<Point> {
    let (_, libs) = bd.block(p, 3);
    if libs.len() != 2 {
        return None;
    }
    let attacker = bd.to_play();
    for &lib in &libs {
        let mut b = bd.clone();
        if b.play_if_legal(lib, attacker).is_err() {
            continue;
        }
        if ladder_captures(&b, p, 2 * bd.size()) {
            return Some(lib);
        }
    }
    None
}

/// Defender to move; is the block at `p` lost?
fn ladder_captures(bd: &Board, p: Point, depth: usize) -> bool {
    if depth == 0 {
        return false;
    }
    let Some(defender) = bd.color_at(p) else {
        return true; // already captured
    };
    let (_, libs) = bd.block(p, 3);
    match libs.len() {
        0 => true,
        1 => {
            let lib = libs[0];
            // Run on the last liberty; the run itself captures any
            // attacker stone that shares it.
            let mut b = bd.clone();
            if b.play_if_legal(lib, defender).is_err() {
                return true;
            }
            let (_, libs_after) = b.block(p, 3);
            match libs_after.len() {
                0 | 1 => true,
                2 => read_ladder_attack(&b, p).is_some(),
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    fn legal_moves(bd: &Board) -> Vec<Point> {
        let mut moves: Vec<Point> = bd
            .points()
            .filter(|&p| bd.is_legal(p, bd.to_play()))
            .collect();
        moves.push(PASS);
        moves
    }

    #[test]
    fn test_none_mode_seeds_nothing() {
        let bd = Board::new(9);
        let mut prior = PriorKnowledge::new(
            PriorParam {
                mode: PriorMode::None,
                ..PriorParam::default()
            },
            PolicyParam::default(),
        );
        assert!(prior.seed(&bd, &legal_moves(&bd), &mut rng()).is_none());
    }

    #[test]
    fn test_even_mode_is_uniform() {
        let bd = Board::new(9);
        let mut prior = PriorKnowledge::new(
            PriorParam {
                mode: PriorMode::Even,
                ..PriorParam::default()
            },
            PolicyParam::default(),
        );
        let moves = legal_moves(&bd);
        let priors = prior.seed(&bd, &moves, &mut rng()).unwrap();
        assert_eq!(priors.len(), moves.len());
        assert!(priors.iter().all(|p| p.value == 0.5 && p.count == 30));
    }

    #[test]
    fn test_policy_mode_boosts_capture() {
        // White D4 in atari; the capturing move E4 gets a winning prior,
        // pass gets a losing one.
        let mut bd = Board::new(9);
        for (mv, c) in [
            ("D3", Color::Black),
            ("D5", Color::Black),
            ("C4", Color::Black),
            ("D4", Color::White),
        ] {
            bd.play(bd.parse_coord(mv).unwrap(), c).unwrap();
        }
        let mut prior = PriorKnowledge::new(PriorParam::default(), PolicyParam::default());
        let moves = legal_moves(&bd);
        let priors = prior.seed(&bd, &moves, &mut rng()).unwrap();
        let e4 = bd.parse_coord("E4").unwrap();
        for (mv, p) in moves.iter().zip(&priors) {
            if *mv == e4 {
                assert_eq!(p.value, 1.0);
            } else if *mv == PASS {
                assert_eq!(p.value, 0.0);
            }
        }
    }

    #[test]
    fn test_policy_mode_on_empty_board_is_random() {
        // Nothing to react to on an empty board: the probe move is pure
        // random and seeds nothing.
        let bd = Board::new(9);
        let mut prior = PriorKnowledge::new(PriorParam::default(), PolicyParam::default());
        assert!(prior.seed(&bd, &legal_moves(&bd), &mut rng()).is_none());
    }

    #[test]
    fn test_first_line_ladder_is_read() {
        // A lone white stone on the second line with two liberties along
        // the edge is captured in a ladder.
        let mut bd = Board::new(9);
        for (mv, c) in [
            ("C2", Color::White),
            ("B2", Color::Black),
            ("C3", Color::Black),
            ("D3", Color::Black),
        ] {
            bd.play(bd.parse_coord(mv).unwrap(), c).unwrap();
        }
        bd.set_to_play(Color::Black);
        let c2 = bd.parse_coord("C2").unwrap();
        assert!(read_ladder_attack(&bd, c2).is_some());
    }
}
