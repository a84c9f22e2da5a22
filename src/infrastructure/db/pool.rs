//! Connects a `DbConfig` to a concrete `Dialect` implementation. The only
//! place in the crate that knows the mapping from a driver name to a
//! `Dialect` constructor.

use std::sync::Arc;

use crate::domain::error::OinoError;
use crate::domain::ports::Dialect;
use crate::infrastructure::config::DbConfig;
use crate::infrastructure::db::dialect::{AnySqlDialect, SqlServerDialect};

/// Build the `Dialect` named by `cfg.driver`, then connect and validate it.
/// Every real engine shares one connection pool type (`sqlx::AnyPool`);
/// `mssql` returns a dialect whose `connect` immediately fails with a
/// structured backend error (see `SqlServerDialect`).
pub async fn connect(cfg: &DbConfig) -> Result<Arc<dyn Dialect>, OinoError> {
    let dialect: Arc<dyn Dialect> = match cfg.driver.as_str() {
        "postgres" | "postgresql" => Arc::new(AnySqlDialect::postgres(cfg.url())),
        "mysql" => Arc::new(AnySqlDialect::mysql(cfg.url())),
        "mariadb" => Arc::new(AnySqlDialect::mariadb(cfg.url())),
        "sqlite" => Arc::new(AnySqlDialect::sqlite(cfg.url())),
        "mssql" | "sqlserver" => Arc::new(SqlServerDialect::new(cfg.url())),
        other => return Err(OinoError::backend(format!("unknown driver '{other}'"))),
    };

    dialect.connect().await?;
    dialect.validate().await?;
    Ok(dialect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config() -> DbConfig {
        DbConfig { driver: "sqlite".to_string(), host: String::new(), port: 0, dbname: ":memory:".to_string(), user: String::new(), password: String::new(), schema: String::new() }
    }

    #[tokio::test]
    async fn unknown_driver_is_rejected_before_any_connection_attempt() {
        let mut cfg = sqlite_config();
        cfg.driver = "db2".to_string();
        let err = match connect(&cfg).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn mssql_driver_fails_with_structured_error_not_a_panic() {
        let mut cfg = sqlite_config();
        cfg.driver = "mssql".to_string();
        let err = match connect(&cfg).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.status_code(), 500);
    }
}
