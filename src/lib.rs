//! Tengen: a parallel Monte-Carlo tree search Go engine.
//!
//! The core is a multi-threaded UCT search with RAVE value estimation,
//! prior-knowledge seeding of expanded nodes, and a rule-based playout
//! policy, driven through a GTP front end.
//!
//! ## Modules
//!
//! - [`constants`] - Board geometry limits and engine defaults
//! - [`board`] - Board state, moves, captures, ko and superko
//! - [`stats`] - Statistics primitives (plain and lock-free atomic)
//! - [`scoring`] - Tromp-Taylor and fast end-position scoring
//! - [`patterns`] - 3x3 playout patterns
//! - [`policy`] - Rule-cascade playout move generation
//! - [`prior`] - Prior knowledge for freshly expanded nodes
//! - [`tree`] - Lock-free search tree with per-worker allocators
//! - [`search`] - The UCT+RAVE search core
//! - [`player`] - Whole-game move generation facade
//! - [`sgf`] - SGF reading/writing and search tree dumps
//! - [`gtp`] - GTP protocol front end
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use tengen::board::{Board, Color};
//! use tengen::policy::PolicyParam;
//! use tengen::prior::PriorParam;
//! use tengen::search::{SearchParam, UctSearch};
//!
//! let bd = Board::new(9);
//! let mut search = UctSearch::new(
//!     SearchParam { max_nodes: 10_000, ..SearchParam::default() },
//!     PolicyParam::default(),
//!     PriorParam::default(),
//! );
//! let result = search.search(&bd, 100, Duration::from_secs(5), &[], None, None);
//! println!("best: {}", bd.str_coord(result.best_move.unwrap()));
//! ```

pub mod board;
pub mod constants;
pub mod gtp;
pub mod patterns;
pub mod player;
pub mod policy;
pub mod prior;
pub mod scoring;
pub mod search;
pub mod sgf;
pub mod stats;
pub mod tree;
