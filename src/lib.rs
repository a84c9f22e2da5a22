pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Controls the verbosity of oino's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
///
/// | Variant | `tracing` level | When to use                          |
/// |---------|-----------------|---------------------------------------|
/// | `Error` | `error`         | `--quiet` / CI scripting              |
/// | `Info`  | `info`          | Default — per-request status only     |
/// | `Debug` | `debug`         | `--verbose` — shows SQL on error too  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for oino.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise. Call
/// this once at application startup, before any async entry point. Library
/// consumers who manage their own subscriber should skip this and
/// configure tracing themselves.
///
/// Only available when the `cli` feature is enabled (pulls in
/// `tracing-subscriber`).
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "oino=error",
        LogLevel::Info => "oino=info",
        LogLevel::Debug => "oino=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();
}

// ─── Public API Facade ──────────────────────────────────────────────────────

pub use application::api::{Api, Method, Request};
pub use application::api_result::ApiResult;
pub use application::modelset::ModelSet;
pub use domain::datamodel::{DataModel, Row};
pub use domain::error::{Message, MessageClass, OinoError};
pub use domain::field::{Cell, Field, FieldFlags, FieldKind};
pub use domain::hashid::{Hashid, HashidMode};
pub use domain::ports::ApiConfig;
pub use domain::sql_params::SqlParams;
pub use infrastructure::codec::ContentType;
pub use infrastructure::config::{ApiSettings, DbConfig, GatewayConfig};
pub use infrastructure::db::pool::connect;

use std::sync::Arc;

/// Connect to the database named by `cfg.db`, introspect `cfg.api.table_name`,
/// and return a ready-to-use [`Api`].
pub async fn build_api(cfg: &GatewayConfig) -> anyhow::Result<Api> {
    let dialect = connect(&cfg.db).await?;
    let api = Api::new(Arc::clone(&dialect), cfg.api.clone().into_api_config()).await?;
    Ok(api)
}
