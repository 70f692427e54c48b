//! Logging setup on top of `env_logger`

pub use log::{debug, error, info, trace, warn};

/// Initialize the logger
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `"info"` or
/// `"vk_renderer=debug"`) is used. Calling this more than once is harmless.
pub fn init(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init("debug");
        init("info");
        log::debug!("logger initialized");
    }
}
