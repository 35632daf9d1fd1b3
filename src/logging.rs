//! 日志初始化

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use crate::queue::{Result, UploadError};

/// Build the filter: `RUST_LOG` wins over the configured default
pub fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a console subscriber. Fails if one is already installed.
pub fn init_logging(default_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(build_filter(default_filter))
        .try_init()
        .map_err(|err| UploadError::internal_error(format!("Failed to init logging: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_falls_back() {
        // 不应 panic
        let _ = build_filter("stowage=notalevel[");
        let _ = build_filter("stowage=debug");
    }
}
