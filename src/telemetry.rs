use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a JSON tracing subscriber for hosts that do not bring their own.
///
/// Honors `RUST_LOG`; defaults to `m3u_relink=info`. Calling it twice is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "m3u_relink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::info!("telemetry initialized");
    }
}
