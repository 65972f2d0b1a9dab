use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
///
/// RUST_LOG wins over the configured level. JSON output carries the current
/// span so session ids travel with every line.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }

    tracing::debug!("fabflow telemetry initialized");
    Ok(())
}

/// Generate an id for a new workflow session
pub fn generate_session_id() -> Uuid {
    Uuid::new_v4()
}

/// Span wrapping everything done on behalf of one workflow session
pub fn create_workflow_span(file: &str, session_id: Uuid) -> tracing::Span {
    tracing::info_span!(
        "workflow",
        workflow.file = file,
        session.id = %session_id,
        otel.kind = "internal"
    )
}
