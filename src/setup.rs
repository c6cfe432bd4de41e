//! Process setup shared by the binaries.

use std::str::FromStr;

use color_eyre::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the error report handler and the tracing subscriber.
///
/// `RUST_LOG` holding a plain level name wins over `level`.
pub fn setup(level: Level) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(level);
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
