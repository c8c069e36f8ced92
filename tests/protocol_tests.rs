//! GTP session and SGF persistence tests.

use std::io::Write as _;

use tengen::board::Color;
use tengen::gtp::GtpEngine;
use tengen::sgf;

fn engine() -> GtpEngine {
    let mut engine = GtpEngine::new();
    engine.execute("uct_param_player", &["max_games", "300"]);
    engine.execute("uct_param_search", &["seed", "23"]);
    engine
}

#[test]
fn test_full_session() {
    let mut engine = engine();
    for (cmd, args) in [
        ("boardsize", vec!["9"]),
        ("komi", vec!["6.5"]),
        ("play", vec!["b", "E5"]),
        ("play", vec!["w", "C3"]),
        ("genmove", vec!["b"]),
        ("showboard", vec![]),
    ] {
        let (success, msg) = engine.execute(cmd, &args);
        assert!(success, "{cmd} failed: {msg}");
    }
    assert!(engine.board().history().len() >= 2);
}

#[test]
fn test_illegal_move_leaves_position_unchanged() {
    let mut engine = engine();
    engine.execute("boardsize", &["9"]);
    engine.execute("play", &["b", "E5"]);
    let before = engine.board().zobrist_hash();
    let (success, _) = engine.execute("play", &["w", "E5"]);
    assert!(!success);
    assert_eq!(engine.board().zobrist_hash(), before);
}

#[test]
fn test_unknown_command_keeps_session_alive() {
    let mut engine = engine();
    let (success, msg) = engine.execute("frobnicate", &[]);
    assert!(!success);
    assert!(msg.contains("unknown command"));
    assert!(engine.execute("name", &[]).0);
}

#[test]
fn test_loadsgf_and_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.sgf");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "(;FF[4]GM[1]SZ[9]KM[5.5];B[ee];W[cc])").unwrap();
    drop(file);

    let mut engine = engine();
    let (success, msg) = engine.execute("loadsgf", &[path.to_str().unwrap()]);
    assert!(success, "loadsgf failed: {msg}");
    assert_eq!(engine.board().size(), 9);
    assert_eq!(engine.board().komi(), 5.5);
    assert_eq!(
        engine.board().color_at(engine.board().parse_coord("E5").unwrap()),
        Some(Color::Black)
    );
    // Corrupt input: protocol failure, no partial state committed.
    let bad = dir.path().join("bad.sgf");
    std::fs::write(&bad, "(;SZ[9];B[ee").unwrap();
    let before = engine.board().zobrist_hash();
    let (success, _) = engine.execute("loadsgf", &[bad.to_str().unwrap()]);
    assert!(!success);
    assert_eq!(engine.board().zobrist_hash(), before);
}

#[test]
fn test_savetree_produces_parseable_sgf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.sgf");
    let mut engine = engine();
    engine.execute("boardsize", &["9"]);
    let (success, _) = engine.execute("genmove", &["b"]);
    assert!(success);
    let (success, msg) = engine.execute("uct_savetree", &[path.to_str().unwrap(), "2"]);
    assert!(success, "uct_savetree failed: {msg}");
    let text = std::fs::read_to_string(&path).unwrap();
    let root = sgf::parse(&text).expect("dump parses");
    assert_eq!(root.prop_value("SZ"), Some("9"));
    let comment = root.prop_value("C").expect("root has statistics comment");
    assert!(comment.contains("Count"));
    assert!(comment.contains("Mean"));
}

#[test]
fn test_final_status_list_dead_stone() {
    // A white stone in atari inside black's sphere is judged dead.
    let mut engine = engine();
    engine.execute("boardsize", &["9"]);
    engine.execute("komi", &["6.5"]);
    for (color, mv) in [
        ("w", "D4"),
        ("b", "D3"),
        ("b", "D5"),
        ("b", "C4"),
        ("b", "E5"),
        ("b", "F4"),
        ("b", "E3"),
    ] {
        let (success, msg) = engine.execute("play", &[color, mv]);
        assert!(success, "play {mv} failed: {msg}");
    }
    let (success, response) = engine.execute("final_status_list", &["dead"]);
    assert!(success);
    assert!(
        response.split_whitespace().any(|c| c == "D4"),
        "D4 not judged dead: {response}"
    );
    let (success, _) = engine.execute("final_status_list", &["alive"]);
    assert!(!success);
}

#[test]
fn test_sgf_roundtrip_through_files() {
    let text = "(;FF[4]GM[1]SZ[19]KM[7.5]AB[dd][pp]AW[dp]C[escaped \\] value];B[pd](;W[qf];B[nd])(;W[nc]))";
    let once = sgf::parse(text).unwrap();
    let written = sgf::write(&once);
    let twice = sgf::parse(&written).unwrap();
    assert_eq!(once, twice);
}
