//! # oino — library usage example
//!
//! Shows two common patterns for consuming oino as a Rust library:
//!
//! 1. **From a config file** — simplest, mirrors the CLI
//! 2. **Programmatic config** — build a `GatewayConfig` in code, no TOML
//!    file needed, then inspect the `ApiResult` directly
//!
//! Run with a config file:
//!   cargo run --example gateway_as_lib -- oino.toml
//!
//! Run with the built-in programmatic config (needs a local SQLite file):
//!   cargo run --example gateway_as_lib

use std::collections::HashMap;

use anyhow::Result;
use oino::{ApiSettings, ContentType, DbConfig, GatewayConfig, Method, Request};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some(path) => from_config_file(path).await,
        None => programmatic_config().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 1 — load config from a TOML file (same as the CLI does internally)
// ─────────────────────────────────────────────────────────────────────────────
async fn from_config_file(path: &str) -> Result<()> {
    println!("=== Pattern 1: from config file ({path}) ===\n");

    let cfg = GatewayConfig::load(Some(path))?;
    let api = oino::build_api(&cfg).await?;
    run_and_print(&api, None).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 2 — build GatewayConfig entirely in code, no TOML file required.
// Useful when config comes from env vars, a CLI flag, a database row, etc.
// ─────────────────────────────────────────────────────────────────────────────
async fn programmatic_config() -> Result<()> {
    println!("=== Pattern 2: programmatic config ===\n");

    let cfg = GatewayConfig {
        db: DbConfig {
            driver: "sqlite".into(),
            host: String::new(),
            port: 0,
            dbname: std::env::var("OINO_DEMO_DB").unwrap_or_else(|_| "./oino_demo.db".into()),
            user: String::new(),
            password: String::new(),
            schema: String::new(),
        },
        api: ApiSettings {
            table_name: "orders".into(),
            api_name: "orders".into(),
            fail_on_oversized_values: true,
            fail_on_update_on_autoinc: true,
            fail_on_insert_without_key: false,
            use_dates_as_string: false,
            hashid_key: None,
            hashid_length: 12,
            hashid_static_ids: true,
            cache_modified_field: None,
            excluded_fields: Vec::new(),
        },
    };

    let api = oino::build_api(&cfg).await?;

    let mut params = HashMap::new();
    params.insert("oinosqllimit".to_string(), "10".to_string());
    run_and_print(&api, Some(params)).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Run one GET and print the rows plus any classified messages. The
// `ApiResult` is plain Rust data — no callbacks, no magic.
// ─────────────────────────────────────────────────────────────────────────────
async fn run_and_print(api: &oino::Api, query_params: Option<HashMap<String, String>>) -> Result<()> {
    let request = Request {
        method: Method::Get,
        row_id: None,
        body: b"",
        content_type: ContentType::Json,
        response_type: ContentType::Json,
        multipart_boundary: None,
        query_params: query_params.unwrap_or_default(),
    };

    let mut result = api.run(request).await;
    println!("status: {} {}", result.status_code, result.status_message);

    if let Some(model_set) = result.model_set.as_mut() {
        let (body, mut messages) = model_set.serialize(ContentType::Json).await?;
        println!("rows  : {body}");
        result.messages.append(&mut messages);
    }

    for message in &result.messages {
        println!("  {}", message.rendered());
    }

    if !result.success {
        eprintln!("request failed: {}", result.status_message);
    }
    Ok(())
}
