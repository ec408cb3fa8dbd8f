use time::UtcOffset;
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::errors::{ConfigError, StackError};

/// Initializes a `tracing` subscriber for applications embedding the stack.
///
/// `default_filter` applies when `RUST_LOG` is not set; `trace_frames`
/// additionally enables per-byte wire dumps from the codecs and the
/// transmission core.
pub fn setup_logging(default_filter: &str, trace_frames: bool) -> Result<(), StackError> {
    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_filter)
    });

    if trace_frames {
        for directive in [
            "modbus_serial::codec=trace",
            "modbus_serial::transmission=trace",
        ] {
            env_filter = env_filter.add_directive(
                directive
                    .parse()
                    .expect("static trace directives are well-formed"),
            );
        }
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(timer)
        .with_filter(env_filter);

    Registry::default().with(layer).try_init().map_err(|e| {
        StackError::Config(ConfigError::Logging(format!(
            "Failed to initialize logging: {}",
            e
        )))
    })?;

    Ok(())
}
