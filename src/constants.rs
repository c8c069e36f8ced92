/// Smallest board size the board representation supports. The protocol
/// layer restricts sizes further (see `GTP_MIN_SIZE`).
pub const MIN_SIZE: usize = 5;
/// Largest supported board size.
pub const MAX_SIZE: usize = 19;
/// Smallest board size accepted over the protocol.
pub const GTP_MIN_SIZE: usize = 9;

/// Padded array length for a board of the given size.
pub const fn boardsize(size: usize) -> usize {
    (size + 1) * (size + 2) + 1
}
/// Padded array length for the largest supported board.
pub const MAX_BOARDSIZE: usize = boardsize(MAX_SIZE);

/// Pass move encoding (shares the index space with board points).
pub const PASS: usize = 0;
/// "No move" marker (root node, empty history slots).
pub const NULL_MOVE: usize = usize::MAX;

pub const DEFAULT_KOMI: f32 = 7.5;
/// Playout length cap, as a multiple of the board area.
pub const GAME_LEN_FACTOR: usize = 3;
