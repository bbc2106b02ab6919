use std::sync::Once;

/// Log filter for the preloaded library, kept apart from `RUST_LOG` so a
/// Rust target program's own logging setup is left alone.
pub const LOG_ENV: &str = "DNS_REROUTE_LOG";

static INIT: Once = Once::new();

/// Install the logger inside the host process on first use.
pub fn init() {
    INIT.call_once(|| {
        // The host may already own the global logger; that is fine.
        let _ = env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "warn"))
            .try_init();
    });
}
