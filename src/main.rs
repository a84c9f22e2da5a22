use std::collections::HashMap;

use anyhow::{anyhow, Result};
use clap::Parser;
use oino::presentation::cli::print_result_summary;
use oino::{ContentType, GatewayConfig, LogLevel, Method, Request};

#[derive(Parser, Debug)]
#[command(name = "oino", about = "oino — schema-driven REST-over-SQL gateway, demo CLI.")]
struct Cli {
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long, default_value = "GET")]
    method: String,

    #[arg(long)]
    id: Option<String>,

    /// Request body, read verbatim (use with POST/PUT).
    #[arg(long)]
    body: Option<String>,

    #[arg(long, default_value = "application/json")]
    content_type: String,

    /// `oinosqlfilter`/`oinosqlorder`/etc, e.g. `oinosqlfilter=(age)-ge(30)`.
    #[arg(long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    #[arg(long)]
    verbose: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((k.to_string(), v.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    oino::init_tracing(if cli.verbose { LogLevel::Debug } else { LogLevel::Info });

    let cfg = GatewayConfig::load(cli.config.as_deref())?;
    let api = oino::build_api(&cfg).await?;

    let method = match cli.method.to_ascii_uppercase().as_str() {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        other => return Err(anyhow!("unsupported method '{other}'")),
    };
    let content_type = ContentType::from_mime(&cli.content_type).ok_or_else(|| anyhow!("unrecognized content type '{}'", cli.content_type))?;
    let body = cli.body.unwrap_or_default();
    let query_params: HashMap<String, String> = cli.params.into_iter().collect();

    let request = Request {
        method,
        row_id: cli.id.as_deref(),
        body: body.as_bytes(),
        content_type,
        response_type: ContentType::Json,
        multipart_boundary: None,
        query_params,
    };

    let mut result = api.run(request).await;
    if let Some(model_set) = result.model_set.as_mut() {
        let (body, mut messages) = model_set.serialize(ContentType::Json).await?;
        println!("{body}");
        result.messages.append(&mut messages);
    }

    let success = print_result_summary(&result);
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
