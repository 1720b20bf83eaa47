// ABOUTME: Shared logging setup for hearth binaries
// ABOUTME: Two functions: init() for INFO on stderr, init_verbose() for DEBUG

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    init_with(Level::INFO);
}

/// Debug logging to stderr, used by `--verbose`. RUST_LOG still overrides.
/// Compose CLI stderr and sent console commands are logged at this level.
pub fn init_verbose() {
    init_with(Level::DEBUG);
}

fn init_with(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_verbose() {
        let _ = super::init_verbose as fn();
    }
}
