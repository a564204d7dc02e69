//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set, otherwise `Config::log_level` applies.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::Config;

/// Install the global subscriber. Returns false if one was already set,
/// which is expected when several tests or embedders race to initialize.
pub fn init(config: &Config) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = Config {
            log_level: "debug".into(),
            ..Default::default()
        };
        init(&config);
        assert!(!init(&config));
    }
}
