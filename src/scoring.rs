//! Terminal position scoring.
//!
//! Two score conventions are provided, both from Black's perspective:
//!
//! - [`tromp_taylor_score`]: area scoring with all stones considered
//!   alive; empty regions are awarded to the unique adjacent color. Used
//!   for terminal positions reached by two passes inside the search tree
//!   and for the pass-wins test.
//! - [`simple_end_score`]: fast scoring that assigns each empty point to
//!   the color surrounding it (eyeish test). Sound only for positions at
//!   the end of a playout, where the policy has filled every point that is
//!   not an eye.

use crate::board::{Board, Color, Point};
use crate::constants::MAX_BOARDSIZE;

/// Per-point owner produced alongside a score.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    Black,
    White,
    Neutral,
}

impl Ownership {
    fn of(color: Color) -> Ownership {
        match color {
            Color::Black => Ownership::Black,
            Color::White => Ownership::White,
        }
    }
}

/// Tromp-Taylor score from Black's perspective.
///
/// If `owner` is given it must have length `bd.cells_len()` and is filled
/// with the owner of every on-board point.
pub fn tromp_taylor_score(bd: &Board, komi: f32, mut owner: Option<&mut [Ownership]>) -> f32 {
    let mut black = 0i32;
    let mut white = 0i32;
    let mut region_visited = [false; MAX_BOARDSIZE];
    let mut region: Vec<Point> = Vec::new();
    for p in bd.points() {
        match bd.color_at(p) {
            Some(c) => {
                if c == Color::Black {
                    black += 1;
                } else {
                    white += 1;
                }
                if let Some(owner) = owner.as_deref_mut() {
                    owner[p] = Ownership::of(c);
                }
            }
            None => {
                if region_visited[p] {
                    continue;
                }
                // Flood fill the empty region and record which colors it
                // touches.
                region.clear();
                let mut touches = [false; 2];
                let mut stack = vec![p];
                region_visited[p] = true;
                while let Some(pt) = stack.pop() {
                    region.push(pt);
                    for n in bd.neighbors(pt) {
                        if bd.is_out(n) {
                            continue;
                        }
                        match bd.color_at(n) {
                            Some(c) => touches[c.index()] = true,
                            None => {
                                if !region_visited[n] {
                                    region_visited[n] = true;
                                    stack.push(n);
                                }
                            }
                        }
                    }
                }
                let region_owner = match (touches[0], touches[1]) {
                    (true, false) => Ownership::Black,
                    (false, true) => Ownership::White,
                    _ => Ownership::Neutral,
                };
                match region_owner {
                    Ownership::Black => black += region.len() as i32,
                    Ownership::White => white += region.len() as i32,
                    Ownership::Neutral => {}
                }
                if let Some(owner) = owner.as_deref_mut() {
                    for &pt in &region {
                        owner[pt] = region_owner;
                    }
                }
            }
        }
    }
    black as f32 - white as f32 - komi
}

/// Fast end-position score from Black's perspective.
///
/// Empty points are awarded by the eyeish test; mixed empty points score
/// nothing. See the module comment for when this is sound.
pub fn simple_end_score(bd: &Board, komi: f32, mut owner: Option<&mut [Ownership]>) -> f32 {
    let mut score = -komi;
    for p in bd.points() {
        let c = bd.color_at(p).or_else(|| bd.is_eyeish(p));
        match c {
            Some(Color::Black) => score += 1.0,
            Some(Color::White) => score -= 1.0,
            None => {}
        }
        if let Some(owner) = owner.as_deref_mut() {
            owner[p] = c.map_or(Ownership::Neutral, Ownership::of);
        }
    }
    score
}

/// Would passing win for `color` if the opponent answers with a pass?
///
/// Tromp-Taylor: after two passes all stones are alive and the area score
/// decides. A strict win is required.
pub fn pass_wins(bd: &Board, color: Color) -> bool {
    let score = tromp_taylor_score(bd, bd.komi(), None);
    let score = if color == Color::Black { score } else { -score };
    score > 0.0
}

/// Neutral owner buffer sized for `bd`.
pub fn owner_buffer(bd: &Board) -> Vec<Ownership> {
    vec![Ownership::Neutral; bd.cells_len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_board_score_is_komi() {
        let bd = Board::new(9);
        // One empty region touching no color stays neutral.
        assert_eq!(tromp_taylor_score(&bd, 6.5, None), -6.5);
        assert_eq!(simple_end_score(&bd, 6.5, None), -6.5);
    }

    #[test]
    fn test_single_stone_owns_the_board() {
        let mut bd = Board::new(9);
        bd.play(bd.parse_coord("E5").unwrap(), Color::Black).unwrap();
        assert_eq!(tromp_taylor_score(&bd, 6.5, None), 81.0 - 6.5);
    }

    #[test]
    fn test_split_board() {
        let mut bd = Board::new(9);
        // A black wall on column E splits nothing by itself; add a white
        // stone so both colors touch the remaining region.
        bd.play(bd.parse_coord("E5").unwrap(), Color::Black).unwrap();
        bd.play(bd.parse_coord("C5").unwrap(), Color::White).unwrap();
        let score = tromp_taylor_score(&bd, 0.0, None);
        // One stone each, shared region neutral.
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_owner_map() {
        let mut bd = Board::new(9);
        bd.play(bd.parse_coord("E5").unwrap(), Color::Black).unwrap();
        let mut owner = owner_buffer(&bd);
        tromp_taylor_score(&bd, 6.5, Some(&mut owner));
        for p in bd.points() {
            assert_eq!(owner[p], Ownership::Black);
        }
    }

    #[test]
    fn test_pass_wins() {
        let mut bd = Board::new(9);
        bd.set_komi(6.5);
        bd.play(bd.parse_coord("E5").unwrap(), Color::Black).unwrap();
        assert!(pass_wins(&bd, Color::Black));
        assert!(!pass_wins(&bd, Color::White));
    }
}
