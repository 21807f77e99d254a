use anyhow::Result;
use chess_rules::console::ConsoleHandler;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries console replies only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut console = ConsoleHandler::new();
    console.run()
}
