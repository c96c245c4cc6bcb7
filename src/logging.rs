//! Process-wide logging and trace setup.

/// Set to `1` to record a chrome trace into `trace.json`.
pub const TRACE_ENV: &str = "REDFLASH_TRACE";

/// Keeps the chrome trace writer alive; the file is flushed on drop.
pub struct LogGuard {
    #[cfg(feature = "chrome-trace")]
    _chrome: Option<tracing_chrome::FlushGuard>,
}

/// Initialise `env_logger` (default filter `info`, `RUST_LOG` overrides) and
/// the optional chrome trace. Safe to call more than once.
pub fn init() -> LogGuard {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    LogGuard {
        #[cfg(feature = "chrome-trace")]
        _chrome: init_tracing(),
    }
}

#[cfg(feature = "chrome-trace")]
fn init_tracing() -> Option<tracing_chrome::FlushGuard> {
    use tracing_subscriber::prelude::*;

    if std::env::var(TRACE_ENV).ok().as_deref() != Some("1") {
        return None;
    }

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new().file("trace.json").build();

    let subscriber = tracing_subscriber::registry().with(chrome_layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }

    log::info!("chrome trace enabled, writing trace.json");
    Some(guard)
}
