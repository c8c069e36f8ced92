use std::io::Write;

use tengen::gtp::GtpEngine;

fn main() {
    // Diagnostics go to stderr; stdout carries only protocol responses.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
    let mut engine = GtpEngine::new();
    engine.run();
}
