//! Logging helpers
//!
//! Thin wrapper over `env_logger` so the daemon and the helper binaries share
//! one initialisation path. `RUST_LOG` always wins over the level passed in.

/// Initialise the global logger
///
/// # Parameters
///
/// * `level` - Default filter used when `RUST_LOG` is not set
///
/// Returns `false` when a logger was already installed (tests call this
/// repeatedly).
pub fn init_logger(level: &str) -> bool {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
