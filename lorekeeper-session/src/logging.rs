//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (from `general.log_level`)
/// applies to the lorekeeper crates and `warn` to everything else.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,lorekeeper={level},lorekeeper_core={level},lorekeeper_llm={level},lorekeeper_session={level}"
        ))
    });
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
