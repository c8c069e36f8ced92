//! Go board representation and move execution.
//!
//! This module provides the board state consumed by the search core:
//! - Board state as a 1D array with a border of padding cells
//! - Stone placement, capture detection and the simple ko rule
//! - Positional/situational superko via a zobrist position history
//! - Block, liberty and eye queries used by the playout policy
//!
//! The board stores absolute colors. Points are indices into the padded
//! array; the row stride is `size + 1`, so the four orthogonal neighbors
//! of `p` are `p - stride`, `p - 1`, `p + 1` and `p + stride`.
//!
//! Two play entry points exist with different legality levels:
//! `play_if_legal` is the pseudo-legal move used by simulations (rejects
//! occupied points, simple ko and suicide), while `play` is the game-level
//! move that additionally enforces superko and supports `undo`.

use std::fmt;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use thiserror::Error;

use crate::constants::{boardsize, DEFAULT_KOMI, MAX_BOARDSIZE, MAX_SIZE, MIN_SIZE, PASS};

/// A point on the board, represented as an index into the 1D board array.
pub type Point = usize;

/// Cell value of an empty point.
pub const EMPTY: u8 = b'.';
/// Cell value of a padding (off-board) point.
pub const OUT: u8 = b' ';

/// Stone color.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    #[inline]
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Cell value used for stones of this color.
    #[inline]
    pub fn cell(self) -> u8 {
        match self {
            Color::Black => b'X',
            Color::White => b'O',
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }

    /// Parse a GTP color argument (`b`, `black`, `w`, `white`).
    pub fn from_gtp(s: &str) -> Option<Color> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Some(Color::Black),
            "w" | "white" => Some(Color::White),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "B"),
            Color::White => write!(f, "W"),
        }
    }
}

/// Ko handling for game-level moves.
///
/// Simulations always use the simple ko rule only; the superko variants
/// are enforced by [`Board::play`] and [`Board::is_legal`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KoRule {
    Simple,
    PositionalSuperko,
    SituationalSuperko,
}

/// Result of attempting to play a move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("point not empty")]
    Occupied,
    #[error("retakes ko")]
    Ko,
    #[error("suicide")]
    Suicide,
    #[error("repeats earlier position")]
    Superko,
}

/// Zobrist value for a colored stone on a point.
///
/// Computed from a SplitMix64 mix of the cell index rather than a stored
/// table; deterministic across runs and processes.
#[inline]
fn zobrist(color: Color, pt: Point) -> u64 {
    let mut z = (((pt as u64) << 1) | color.index() as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Salt mixed into the superko key when the rule is situational.
const TO_PLAY_SALT: u64 = 0xD6E8_FEB8_6659_FD93;

/// Saved board state for `undo`.
#[derive(Clone)]
struct Snapshot {
    cells: Vec<u8>,
    to_play: Color,
    ko: Point,
    last: Point,
    last2: Point,
    consecutive_passes: usize,
    last_nu_captured: usize,
    captures: [usize; 2],
    hash: u64,
    /// Superko key added by the move this snapshot precedes, if any.
    key_added: Option<u64>,
}

/// A Go position.
#[derive(Clone)]
pub struct Board {
    size: usize,
    /// Row stride of the padded array (`size + 1`).
    stride: usize,
    cells: Vec<u8>,
    to_play: Color,
    komi: f32,
    ko_rule: KoRule,
    /// Ko point (0 if none).
    ko: Point,
    /// Last move played (`PASS` for a pass); `NULL_MOVE` before any move.
    last: Point,
    last2: Point,
    consecutive_passes: usize,
    last_nu_captured: usize,
    /// Stones captured by each color over the game.
    captures: [usize; 2],
    hash: u64,
    /// Superko keys of all positions reached by game-level moves.
    seen: FxHashSet<u64>,
    /// Game-level move history (for undo and subtree-reuse detection).
    history: Vec<(Point, Color)>,
    snapshots: Vec<Snapshot>,
}

impl Board {
    pub fn new(size: usize) -> Board {
        assert!(
            (MIN_SIZE..=MAX_SIZE).contains(&size),
            "unsupported board size {size}"
        );
        let mut bd = Board {
            size,
            stride: size + 1,
            cells: vec![OUT; boardsize(size)],
            to_play: Color::Black,
            komi: DEFAULT_KOMI,
            ko_rule: KoRule::PositionalSuperko,
            ko: 0,
            last: crate::constants::NULL_MOVE,
            last2: crate::constants::NULL_MOVE,
            consecutive_passes: 0,
            last_nu_captured: 0,
            captures: [0, 0],
            hash: 0,
            seen: FxHashSet::default(),
            history: Vec::new(),
            snapshots: Vec::new(),
        };
        bd.clear();
        bd
    }

    /// Reset to the empty position, keeping size, komi and rules.
    pub fn clear(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell = OUT;
        }
        for row in 1..=self.size {
            for col in 1..=self.size {
                self.cells[row * self.stride + col] = EMPTY;
            }
        }
        self.to_play = Color::Black;
        self.ko = 0;
        self.last = crate::constants::NULL_MOVE;
        self.last2 = crate::constants::NULL_MOVE;
        self.consecutive_passes = 0;
        self.last_nu_captured = 0;
        self.captures = [0, 0];
        self.hash = 0;
        self.seen.clear();
        self.seen.insert(self.superko_key_for(self.to_play));
        self.history.clear();
        self.snapshots.clear();
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn to_play(&self) -> Color {
        self.to_play
    }

    /// Set the player to move. Clears the ko point if the color changes.
    pub fn set_to_play(&mut self, color: Color) {
        if color != self.to_play {
            self.to_play = color;
            self.ko = 0;
        }
    }

    #[inline]
    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    pub fn ko_rule(&self) -> KoRule {
        self.ko_rule
    }

    pub fn set_ko_rule(&mut self, rule: KoRule) {
        self.ko_rule = rule;
    }

    #[inline]
    pub fn is_empty(&self, p: Point) -> bool {
        self.cells[p] == EMPTY
    }

    #[inline]
    pub fn is_out(&self, p: Point) -> bool {
        self.cells[p] == OUT
    }

    #[inline]
    pub fn color_at(&self, p: Point) -> Option<Color> {
        match self.cells[p] {
            b'X' => Some(Color::Black),
            b'O' => Some(Color::White),
            _ => None,
        }
    }

    /// Length of the padded cell array (exclusive upper bound for points).
    #[inline]
    pub fn cells_len(&self) -> usize {
        self.cells.len()
    }

    /// The four orthogonal neighbors (N, W, E, S).
    #[inline]
    pub fn neighbors(&self, p: Point) -> [Point; 4] {
        [p - self.stride, p - 1, p + 1, p + self.stride]
    }

    /// The four diagonal neighbors (NW, NE, SW, SE).
    #[inline]
    pub fn diag_neighbors(&self, p: Point) -> [Point; 4] {
        [
            p - self.stride - 1,
            p - self.stride + 1,
            p + self.stride - 1,
            p + self.stride + 1,
        ]
    }

    /// Iterate all on-board points in row-major order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        let size = self.size;
        let stride = self.stride;
        (1..=size).flat_map(move |row| (1..=size).map(move |col| row * stride + col))
    }

    /// Point for 1-based GTP coordinates (column from the left, row from
    /// the bottom).
    pub fn point(&self, col: usize, row: usize) -> Point {
        debug_assert!((1..=self.size).contains(&col) && (1..=self.size).contains(&row));
        (self.size - row + 1) * self.stride + col
    }

    #[inline]
    pub fn last_move(&self) -> Point {
        self.last
    }

    #[inline]
    pub fn second_last_move(&self) -> Point {
        self.last2
    }

    #[inline]
    pub fn consecutive_passes(&self) -> usize {
        self.consecutive_passes
    }

    /// Two passes in a row end the game.
    #[inline]
    pub fn two_passes(&self) -> bool {
        self.consecutive_passes >= 2
    }

    /// Stones captured by the previous move.
    #[inline]
    pub fn last_nu_captured(&self) -> usize {
        self.last_nu_captured
    }

    pub fn captures(&self, color: Color) -> usize {
        self.captures[color.index()]
    }

    #[inline]
    pub fn zobrist_hash(&self) -> u64 {
        self.hash
    }

    pub fn history(&self) -> &[(Point, Color)] {
        &self.history
    }

    // =========================================================================
    // Blocks and liberties
    // =========================================================================

    /// Stones and liberties of the block at `p` (occupied point).
    ///
    /// Liberty collection stops early once `max_libs` liberties are found.
    pub fn block(&self, p: Point, max_libs: usize) -> (Vec<Point>, Vec<Point>) {
        debug_assert!(self.color_at(p).is_some());
        let cell = self.cells[p];
        let mut stones = Vec::new();
        let mut libs = Vec::new();
        let mut visited = [false; MAX_BOARDSIZE];
        let mut lib_visited = [false; MAX_BOARDSIZE];
        let mut stack = vec![p];
        visited[p] = true;
        while let Some(pt) = stack.pop() {
            stones.push(pt);
            for n in self.neighbors(pt) {
                if visited[n] {
                    continue;
                }
                if self.cells[n] == cell {
                    visited[n] = true;
                    stack.push(n);
                } else if self.cells[n] == EMPTY && !lib_visited[n] {
                    lib_visited[n] = true;
                    libs.push(n);
                    if libs.len() >= max_libs {
                        return (stones, libs);
                    }
                }
            }
        }
        (stones, libs)
    }

    /// Number of liberties of the block at `p`, capped at `cap`.
    pub fn num_liberties(&self, p: Point, cap: usize) -> usize {
        self.block(p, cap).1.len()
    }

    /// Does the block at `p` have exactly one liberty?
    pub fn in_atari(&self, p: Point) -> bool {
        self.num_liberties(p, 2) == 1
    }

    /// The single liberty of a block in atari.
    pub fn the_liberty(&self, p: Point) -> Point {
        let (_, libs) = self.block(p, 2);
        debug_assert_eq!(libs.len(), 1);
        libs[0]
    }

    /// All stones of the block at `p`.
    pub fn block_stones(&self, p: Point) -> Vec<Point> {
        self.block(p, usize::MAX).0
    }

    /// Representative point of the block at `p` (smallest index).
    pub fn anchor(&self, p: Point) -> Point {
        self.block_stones(p).into_iter().min().unwrap_or(p)
    }

    /// Anchors of blocks of `color` adjacent to `p` with at most `max_lib`
    /// liberties. At most four blocks can touch a point.
    pub fn neighbor_blocks(&self, p: Point, color: Color, max_lib: usize) -> SmallVec<[Point; 4]> {
        let mut anchors: SmallVec<[Point; 4]> = SmallVec::new();
        for n in self.neighbors(p) {
            if self.cells[n] != color.cell() {
                continue;
            }
            let a = self.anchor(n);
            if anchors.contains(&a) {
                continue;
            }
            if self.num_liberties(a, max_lib + 1) <= max_lib {
                anchors.push(a);
            }
        }
        anchors
    }

    pub fn num_empty_neighbors(&self, p: Point) -> usize {
        self.neighbors(p)
            .into_iter()
            .filter(|&n| self.cells[n] == EMPTY)
            .count()
    }

    pub fn has_empty_neighbors(&self, p: Point) -> bool {
        self.num_empty_neighbors(p) > 0
    }

    /// Some empty neighbor of `p`, if any.
    pub fn empty_neighbor(&self, p: Point) -> Option<Point> {
        self.neighbors(p)
            .into_iter()
            .find(|&n| self.cells[n] == EMPTY)
    }

    // =========================================================================
    // Eyes
    // =========================================================================

    /// Check if an empty point is surrounded by stones of one color.
    ///
    /// Returns the surrounding color, or `None` if neighbors are mixed or
    /// any neighbor is empty. May report false eyes.
    pub fn is_eyeish(&self, p: Point) -> Option<Color> {
        let mut eye_color = None;
        for n in self.neighbors(p) {
            match self.cells[n] {
                OUT => continue,
                EMPTY => return None,
                cell => {
                    let c = if cell == b'X' { Color::Black } else { Color::White };
                    match eye_color {
                        None => eye_color = Some(c),
                        Some(e) if e != c => return None,
                        _ => {}
                    }
                }
            }
        }
        eye_color
    }

    /// True eye test for `color`: eyeish, and the diagonals do not refute
    /// it (one bad diagonal allowed at the edge, none in the center).
    pub fn is_simple_eye(&self, p: Point, color: Color) -> bool {
        if self.is_eyeish(p) != Some(color) {
            return false;
        }
        let false_cell = color.opponent().cell();
        let mut at_edge = false;
        let mut false_count = 0;
        for d in self.diag_neighbors(p) {
            if self.cells[d] == OUT {
                at_edge = true;
            } else if self.cells[d] == false_cell {
                false_count += 1;
            }
        }
        false_count <= usize::from(at_edge)
    }

    // =========================================================================
    // Legality without mutation
    // =========================================================================

    /// Liberties the block containing a stone played at `mv` would have,
    /// counting points freed by captures. Capped at `cap` for early exit.
    pub fn liberties_after_play(&self, mv: Point, color: Color, cap: usize) -> usize {
        debug_assert!(self.cells[mv] == EMPTY);
        let opp = color.opponent();
        // Mark stones of opponent blocks that would be captured.
        let mut captured_mark = [false; MAX_BOARDSIZE];
        let mut checked = [false; MAX_BOARDSIZE];
        for n in self.neighbors(mv) {
            if self.cells[n] != opp.cell() || checked[n] {
                continue;
            }
            let (stones, libs) = self.block(n, 2);
            for &s in &stones {
                checked[s] = true;
            }
            if libs.len() == 1 && libs[0] == mv {
                for &s in &stones {
                    captured_mark[s] = true;
                }
            }
        }
        // Flood fill the merged block: mv plus adjacent own blocks.
        let mut visited = [false; MAX_BOARDSIZE];
        let mut lib_seen = [false; MAX_BOARDSIZE];
        let mut stack = vec![mv];
        visited[mv] = true;
        let mut libs = 0;
        while let Some(pt) = stack.pop() {
            for n in self.neighbors(pt) {
                if visited[n] {
                    continue;
                }
                if self.cells[n] == color.cell() && !captured_mark[n] {
                    visited[n] = true;
                    stack.push(n);
                } else if (self.cells[n] == EMPTY || captured_mark[n]) && !lib_seen[n] {
                    lib_seen[n] = true;
                    libs += 1;
                    if libs >= cap {
                        return libs;
                    }
                }
            }
        }
        libs
    }

    /// Would playing at `mv` put the played stone's block in atari?
    pub fn self_atari(&self, mv: Point, color: Color) -> bool {
        self.liberties_after_play(mv, color, 2) == 1
    }

    /// Pseudo-legality for simulations: empty, not the ko point, not
    /// suicide. Superko is deliberately not checked.
    pub fn is_pseudo_legal(&self, mv: Point, color: Color) -> bool {
        if mv == PASS {
            return true;
        }
        if self.cells[mv] != EMPTY {
            return false;
        }
        if mv == self.ko && color == self.to_play {
            return false;
        }
        self.liberties_after_play(mv, color, 1) > 0
    }

    /// Position hash after playing `mv`, or `None` if the move is suicide.
    fn hash_after_play(&self, mv: Point, color: Color) -> Option<u64> {
        let opp = color.opponent();
        let mut hash = self.hash ^ zobrist(color, mv);
        let mut captured = 0usize;
        let mut checked: SmallVec<[Point; 4]> = SmallVec::new();
        for n in self.neighbors(mv) {
            if self.cells[n] != opp.cell() {
                continue;
            }
            let a = self.anchor(n);
            if checked.contains(&a) {
                continue;
            }
            checked.push(a);
            let (stones, libs) = self.block(a, 2);
            if libs.len() == 1 && libs[0] == mv {
                captured += stones.len();
                for &s in &stones {
                    hash ^= zobrist(opp, s);
                }
            }
        }
        if captured == 0 && self.liberties_after_play(mv, color, 1) == 0 {
            return None;
        }
        Some(hash)
    }

    /// Full legality used at the search root and by the protocol layer:
    /// pseudo-legality plus the configured superko rule.
    pub fn is_legal(&self, mv: Point, color: Color) -> bool {
        if mv == PASS {
            return true;
        }
        if self.cells[mv] != EMPTY {
            return false;
        }
        if mv == self.ko && color == self.to_play {
            return false;
        }
        match self.hash_after_play(mv, color) {
            None => false,
            Some(hash) => {
                self.ko_rule == KoRule::Simple
                    || !self
                        .seen
                        .contains(&Self::superko_key(hash, self.ko_rule, color.opponent()))
            }
        }
    }

    // =========================================================================
    // Move execution
    // =========================================================================

    #[inline]
    fn put_stone(&mut self, pt: Point, color: Color) {
        self.cells[pt] = color.cell();
        self.hash ^= zobrist(color, pt);
    }

    #[inline]
    fn remove_stone(&mut self, pt: Point, color: Color) {
        self.cells[pt] = EMPTY;
        self.hash ^= zobrist(color, pt);
    }

    fn make_pass(&mut self) {
        self.last2 = self.last;
        self.last = PASS;
        self.ko = 0;
        self.last_nu_captured = 0;
        self.consecutive_passes += 1;
        self.to_play = self.to_play.opponent();
    }

    /// Play a pseudo-legal move. Used by simulations; does not check
    /// superko and does not support undo. On error the stones are
    /// unchanged, but the player to move has been set to `color`.
    pub fn play_if_legal(&mut self, mv: Point, color: Color) -> Result<(), MoveError> {
        self.set_to_play(color);
        if mv == PASS {
            self.make_pass();
            return Ok(());
        }
        if self.cells[mv] != EMPTY {
            return Err(MoveError::Occupied);
        }
        if mv == self.ko {
            return Err(MoveError::Ko);
        }
        let opp = color.opponent();
        let in_enemy_eye = self.is_eyeish(mv) == Some(opp);
        self.put_stone(mv, color);
        let mut captured = 0usize;
        let mut capture_point = 0;
        for i in 0..4 {
            let n = self.neighbors(mv)[i];
            if self.cells[n] != opp.cell() {
                continue;
            }
            let (stones, libs) = self.block(n, 1);
            if libs.is_empty() {
                captured += stones.len();
                capture_point = n;
                for &s in &stones {
                    self.remove_stone(s, opp);
                }
            }
        }
        if captured == 0 && self.num_liberties(mv, 1) == 0 {
            self.remove_stone(mv, color);
            return Err(MoveError::Suicide);
        }
        self.ko = if captured == 1 && in_enemy_eye {
            capture_point
        } else {
            0
        };
        self.captures[color.index()] += captured;
        self.last_nu_captured = captured;
        self.last2 = self.last;
        self.last = mv;
        self.consecutive_passes = 0;
        self.to_play = opp;
        Ok(())
    }

    fn superko_key(hash: u64, rule: KoRule, to_play: Color) -> u64 {
        match rule {
            KoRule::SituationalSuperko if to_play == Color::White => hash ^ TO_PLAY_SALT,
            _ => hash,
        }
    }

    fn superko_key_for(&self, to_play: Color) -> u64 {
        Self::superko_key(self.hash, self.ko_rule, to_play)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            cells: self.cells.clone(),
            to_play: self.to_play,
            ko: self.ko,
            last: self.last,
            last2: self.last2,
            consecutive_passes: self.consecutive_passes,
            last_nu_captured: self.last_nu_captured,
            captures: self.captures,
            hash: self.hash,
            key_added: None,
        }
    }

    fn restore(&mut self, snap: &Snapshot) {
        self.cells.clone_from(&snap.cells);
        self.to_play = snap.to_play;
        self.ko = snap.ko;
        self.last = snap.last;
        self.last2 = snap.last2;
        self.consecutive_passes = snap.consecutive_passes;
        self.last_nu_captured = snap.last_nu_captured;
        self.captures = snap.captures;
        self.hash = snap.hash;
    }

    /// Play a game-level move: pseudo-legality plus the configured superko
    /// rule, with undo support. The position is unchanged on error.
    pub fn play(&mut self, mv: Point, color: Color) -> Result<(), MoveError> {
        let mut snap = self.snapshot();
        if let Err(e) = self.play_if_legal(mv, color) {
            self.restore(&snap);
            return Err(e);
        }
        if mv != PASS && self.ko_rule != KoRule::Simple {
            let key = self.superko_key_for(self.to_play);
            if !self.seen.insert(key) {
                self.restore(&snap);
                return Err(MoveError::Superko);
            }
            snap.key_added = Some(key);
        }
        self.snapshots.push(snap);
        self.history.push((mv, color));
        Ok(())
    }

    /// Take back the last game-level move. Returns false if there is none.
    pub fn undo(&mut self) -> bool {
        let Some(snap) = self.snapshots.pop() else {
            return false;
        };
        if let Some(key) = snap.key_added {
            self.seen.remove(&key);
        }
        self.restore(&snap);
        self.history.pop();
        true
    }

    // =========================================================================
    // Coordinates
    // =========================================================================

    /// Parse a coordinate string (e.g. `D4`, `pass`) into a point.
    ///
    /// Go coordinates use letters A..T (skipping I) for columns and
    /// numbers from the bottom for rows.
    pub fn parse_coord(&self, s: &str) -> Option<Point> {
        if s.eq_ignore_ascii_case("pass") {
            return Some(PASS);
        }
        let bytes = s.as_bytes();
        if bytes.len() < 2 || !bytes[0].is_ascii_alphabetic() {
            return None;
        }
        let col_char = bytes[0].to_ascii_uppercase();
        if col_char == b'I' {
            return None;
        }
        let mut col = (col_char - b'A' + 1) as usize;
        if col_char > b'I' {
            col -= 1;
        }
        let row: usize = s[1..].parse().ok()?;
        if !(1..=self.size).contains(&col) || !(1..=self.size).contains(&row) {
            return None;
        }
        Some(self.point(col, row))
    }

    /// Convert a point to a coordinate string (e.g. `D4`, `pass`).
    pub fn str_coord(&self, pt: Point) -> String {
        if pt == PASS {
            return "pass".into();
        }
        let row = pt / self.stride;
        let col = pt % self.stride;
        let mut c = (b'@' + col as u8) as char;
        if c >= 'I' {
            c = (c as u8 + 1) as char;
        }
        format!("{c}{}", self.size + 1 - row)
    }
}

/// Column labels for board display (skipping 'I' per Go convention).
const COL_LABELS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Moves: {:<3}  Black: {} caps  White: {} caps  Komi: {:.1}",
            self.history.len(),
            self.captures[0],
            self.captures[1],
            self.komi
        )?;
        for row in 1..=self.size {
            write!(f, " {:>2} ", self.size + 1 - row)?;
            for col in 1..=self.size {
                let pt = row * self.stride + col;
                if self.last == pt {
                    write!(f, "({})", self.cells[pt] as char)?;
                } else {
                    write!(f, " {} ", self.cells[pt] as char)?;
                }
            }
            writeln!(f)?;
        }
        write!(f, "    ")?;
        for col in 0..self.size {
            write!(f, " {} ", COL_LABELS[col] as char)?;
        }
        writeln!(f)
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Board {{ size: {}, to_play: {}, ko: {}",
            self.size, self.to_play, self.ko
        )?;
        write!(f, "{self}")?;
        write!(f, "}}")
    }
}
