//! SGF game-tree reading and writing.
//!
//! A small SGF (FF[4]) implementation covering what the engine needs:
//! loading games (`loadsgf`), and dumping the search tree with per-node
//! statistics (`uct_savetree`). Properties that are not understood are
//! carried through a parse/write round trip verbatim.
//!
//! Bracket escaping: backslash escapes `]` and backslash itself. Values
//! of composite properties additionally escape `:`; this reader
//! unescapes any backslash sequence, so composite values survive.

use std::fmt::Write as _;

use thiserror::Error;

use crate::board::{Board, Color, Point};
use crate::constants::{MAX_SIZE, MIN_SIZE, PASS};
use crate::tree::{NodeId, UctTree};

#[derive(Debug, Error)]
pub enum SgfError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character '{0}' at offset {1}")]
    Unexpected(char, usize),
    #[error("bad value for property {0}: {1}")]
    BadProperty(String, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One SGF property: identifier plus raw (unescaped) values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgfProp {
    pub ident: String,
    pub values: Vec<String>,
}

/// One SGF node. A linear sequence is represented as a chain of
/// single-child nodes; variations become multiple children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SgfNode {
    pub props: Vec<SgfProp>,
    pub children: Vec<SgfNode>,
}

impl SgfNode {
    pub fn prop(&self, ident: &str) -> Option<&SgfProp> {
        self.props.iter().find(|p| p.ident == ident)
    }

    pub fn prop_value(&self, ident: &str) -> Option<&str> {
        self.prop(ident).and_then(|p| p.values.first()).map(String::as_str)
    }
}

// =============================================================================
// Parsing
// =============================================================================

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Parser<'a> {
        Parser {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, c: u8) -> Result<(), SgfError> {
        match self.peek() {
            Some(found) if found == c => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(SgfError::Unexpected(found as char, self.pos)),
            None => Err(SgfError::UnexpectedEnd),
        }
    }

    /// GameTree = "(" Node+ GameTree* ")"
    fn game_tree(&mut self) -> Result<SgfNode, SgfError> {
        self.expect(b'(')?;
        let mut root = self.node()?;
        // Chain the sequence, then attach variations to the last node.
        let mut chain: Vec<SgfNode> = vec![root];
        while self.peek() == Some(b';') {
            chain.push(self.node()?);
        }
        let mut last = chain.pop().expect("chain starts non-empty");
        while self.peek() == Some(b'(') {
            last.children.push(self.game_tree()?);
        }
        self.expect(b')')?;
        while let Some(mut parent) = chain.pop() {
            parent.children.push(last);
            last = parent;
        }
        root = last;
        Ok(root)
    }

    /// Node = ";" Property*
    fn node(&mut self) -> Result<SgfNode, SgfError> {
        self.expect(b';')?;
        let mut node = SgfNode::default();
        while matches!(self.peek(), Some(c) if c.is_ascii_uppercase()) {
            node.props.push(self.property()?);
        }
        Ok(node)
    }

    fn property(&mut self) -> Result<SgfProp, SgfError> {
        let mut ident = String::new();
        while let Some(&c) = self.input.get(self.pos) {
            if c.is_ascii_uppercase() {
                ident.push(c as char);
                self.pos += 1;
            } else {
                break;
            }
        }
        let mut values = Vec::new();
        while self.peek() == Some(b'[') {
            values.push(self.bracket_value()?);
        }
        if values.is_empty() {
            return Err(SgfError::BadProperty(ident, "no values".into()));
        }
        Ok(SgfProp { ident, values })
    }

    /// Bracketed value with backslash escapes.
    fn bracket_value(&mut self) -> Result<String, SgfError> {
        self.expect(b'[')?;
        let mut value = Vec::new();
        loop {
            match self.input.get(self.pos) {
                None => return Err(SgfError::UnexpectedEnd),
                Some(b'\\') => {
                    self.pos += 1;
                    match self.input.get(self.pos) {
                        None => return Err(SgfError::UnexpectedEnd),
                        Some(&c) => {
                            value.push(c);
                            self.pos += 1;
                        }
                    }
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(String::from_utf8_lossy(&value).into_owned());
                }
                Some(&c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

/// Parse an SGF document into its root node.
pub fn parse(input: &str) -> Result<SgfNode, SgfError> {
    let mut parser = Parser::new(input);
    let root = parser.game_tree()?;
    Ok(root)
}

// =============================================================================
// Writing
// =============================================================================

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == ']' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn write_node(out: &mut String, node: &SgfNode) {
    out.push(';');
    for prop in &node.props {
        out.push_str(&prop.ident);
        for value in &prop.values {
            out.push('[');
            out.push_str(&escape_value(value));
            out.push(']');
        }
    }
    match node.children.len() {
        0 => {}
        1 => {
            out.push('\n');
            write_node(out, &node.children[0]);
        }
        _ => {
            for child in &node.children {
                out.push_str("\n(");
                write_node(out, child);
                out.push(')');
            }
        }
    }
}

/// Write a game tree as an SGF document.
pub fn write(root: &SgfNode) -> String {
    let mut out = String::from("(");
    write_node(&mut out, root);
    out.push_str(")\n");
    out
}

// =============================================================================
// Board conversion
// =============================================================================

/// SGF point value for a board point ("" for pass).
pub fn point_to_sgf(size: usize, pt: Point) -> String {
    if pt == PASS {
        return String::new();
    }
    let stride = size + 1;
    let row = pt / stride; // 1-based from the top, as in SGF
    let col = pt % stride;
    let x = (b'a' + (col - 1) as u8) as char;
    let y = (b'a' + (row - 1) as u8) as char;
    format!("{x}{y}")
}

/// Board point for an SGF point value ("" and "tt" mean pass).
pub fn sgf_to_point(size: usize, s: &str) -> Option<Point> {
    if s.is_empty() || (size <= 19 && s == "tt") {
        return Some(PASS);
    }
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let col = (bytes[0].checked_sub(b'a')? as usize) + 1;
    let row = (bytes[1].checked_sub(b'a')? as usize) + 1;
    if col > size || row > size {
        return None;
    }
    Some(row * (size + 1) + col)
}

/// Build a board from a parsed game: size, komi, setup stones, player to
/// move, and the main-line moves.
pub fn setup_board(root: &SgfNode) -> Result<Board, SgfError> {
    let size = match root.prop_value("SZ") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| SgfError::BadProperty("SZ".into(), v.into()))?,
        None => MAX_SIZE,
    };
    if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
        return Err(SgfError::BadProperty("SZ".into(), size.to_string()));
    }
    let mut bd = Board::new(size);
    if let Some(v) = root.prop_value("KM") {
        let komi = v
            .parse::<f32>()
            .map_err(|_| SgfError::BadProperty("KM".into(), v.into()))?;
        bd.set_komi(komi);
    }
    let mut node = Some(root);
    while let Some(current) = node {
        for prop in &current.props {
            match prop.ident.as_str() {
                "AB" | "AW" => {
                    let color = if prop.ident == "AB" {
                        Color::Black
                    } else {
                        Color::White
                    };
                    for v in &prop.values {
                        let pt = sgf_to_point(size, v)
                            .filter(|&p| p != PASS)
                            .ok_or_else(|| SgfError::BadProperty(prop.ident.clone(), v.clone()))?;
                        bd.play(pt, color)
                            .map_err(|e| SgfError::BadProperty(prop.ident.clone(), e.to_string()))?;
                    }
                }
                "B" | "W" => {
                    let color = if prop.ident == "B" {
                        Color::Black
                    } else {
                        Color::White
                    };
                    let v = prop.values.first().map(String::as_str).unwrap_or("");
                    let pt = sgf_to_point(size, v)
                        .ok_or_else(|| SgfError::BadProperty(prop.ident.clone(), v.into()))?;
                    bd.play(pt, color)
                        .map_err(|e| SgfError::BadProperty(prop.ident.clone(), e.to_string()))?;
                }
                "PL" => {
                    let v = prop.values.first().map(String::as_str).unwrap_or("");
                    let color = Color::from_gtp(v)
                        .ok_or_else(|| SgfError::BadProperty("PL".into(), v.into()))?;
                    bd.set_to_play(color);
                }
                _ => {}
            }
        }
        node = current.children.first();
    }
    Ok(bd)
}

// =============================================================================
// Search tree dump
// =============================================================================

/// Dump the search tree as SGF. Node comments carry the visit count,
/// position count, mean and the RAVE statistics of the children; child
/// counts appear as labels. `max_depth` limits the dumped depth.
pub fn dump_search_tree(tree: &UctTree, bd: &Board, max_depth: Option<usize>) -> String {
    let size = bd.size();
    let mut out = String::new();
    let _ = writeln!(out, "(;FF[4]GM[1]SZ[{size}]");
    for color in [Color::Black, Color::White] {
        let stones: Vec<Point> = bd.points().filter(|&p| bd.color_at(p) == Some(color)).collect();
        if stones.is_empty() {
            continue;
        }
        out.push_str(if color == Color::Black { "AB" } else { "AW" });
        for p in stones {
            let _ = write!(out, "[{}]", point_to_sgf(size, p));
        }
        out.push('\n');
    }
    let _ = writeln!(out, "PL[{}]", bd.to_play());
    dump_node(&mut out, tree, bd, NodeId::ROOT, bd.to_play(), max_depth, 0);
    out.push_str(")\n");
    out
}

fn dump_node(
    out: &mut String,
    tree: &UctTree,
    bd: &Board,
    id: NodeId,
    to_play: Color,
    max_depth: Option<usize>,
    depth: usize,
) {
    let node = tree.node(id);
    let mean = if node.has_mean() { node.mean() } else { 0.0 };
    let _ = write!(
        out,
        "C[Count {} PosCount {} Mean {:.2}",
        node.move_count(),
        node.pos_count(),
        mean
    );
    if !node.has_children() {
        out.push_str("]\n");
        return;
    }
    out.push_str("\n\nRave:");
    for (_, child) in tree.children(id) {
        if child.rave_count() > 0.0 {
            let _ = write!(
                out,
                "\n{} {:.2} ({:.1})",
                bd.str_coord(child.mv()),
                child.rave_value(),
                child.rave_count()
            );
        }
    }
    out.push(']');
    if tree.children(id).any(|(_, c)| c.move_count() > 0) {
        out.push_str("\nLB");
        for (_, child) in tree.children(id) {
            if child.move_count() > 0 {
                let _ = write!(
                    out,
                    "[{}:{}]",
                    point_to_sgf(bd.size(), child.mv()),
                    child.move_count()
                );
            }
        }
    }
    out.push('\n');
    if let Some(limit) = max_depth {
        if depth >= limit {
            return;
        }
    }
    for (child_id, child) in tree.children(id) {
        if child.move_count() == 0 {
            continue;
        }
        let _ = write!(
            out,
            "(;{}[{}]",
            to_play,
            point_to_sgf(bd.size(), child.mv())
        );
        dump_node(out, tree, bd, child_id, to_play.opponent(), max_depth, depth + 1);
        out.push_str(")\n");
    }
}
