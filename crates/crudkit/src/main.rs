//! Issue one CRUD call against a configured provider API and print the
//! response.
//!
//! # Examples
//!
//! ```sh
//! # Fetch one resource
//! crudkit --config openai.json --op get --route "threads/{0}" --id thread_abc
//!
//! # List with query params
//! crudkit --config openai.json --op list --route files --query limit=5 --query order=desc
//!
//! # Create from a JSON file
//! crudkit --config openai.json --op create --route threads --body thread.json
//!
//! # Stream text fragments as they arrive, body from stdin
//! echo '{"contents":[{"parts":[{"text":"hi"}]}]}' | crudkit --config gemini.json \
//!   --op query --route "models/{0}" --id gemini-2.0-flash \
//!   --method ":streamGenerateContent" --query alt=sse --body - --stream
//! ```

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use crudkit::api::StreamEvent;
use crudkit::client::{DeleteResponse, LoggingHandler};
use crudkit::{ClientConfiguration, CrudClient, Operation, PathParam, Request, RouteTable};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Issue one CRUD call against a configured provider API.
#[derive(Parser)]
#[command(name = "crudkit", version)]
struct Cli {
    // ── Target ─────────────────────────────────────────────────
    /// Path to the client configuration JSON file
    #[arg(long)]
    config: PathBuf,

    /// Operation: create, get, retrieve, list, update, patch, delete, cancel, query
    #[arg(long, value_parser = parse_operation)]
    op: Operation,

    /// Route template, e.g. "threads/{0}/messages"
    #[arg(long)]
    route: String,

    /// Service name used in diagnostics
    #[arg(long, default_value = "cli")]
    service: String,

    // ── Path parameters ────────────────────────────────────────
    /// Ids substituted for {0}, {1}, ... in order
    #[arg(long = "id")]
    ids: Vec<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "query", value_parser = parse_query)]
    queries: Vec<(String, String)>,

    /// Extra path segment appended after the route (repeatable)
    #[arg(long = "child")]
    children: Vec<String>,

    /// Method suffix appended verbatim, e.g. ":generateContent"
    #[arg(long)]
    method: Option<String>,

    // ── Request ────────────────────────────────────────────────
    /// JSON body file, or "-" for stdin
    #[arg(long)]
    body: Option<String>,

    /// Maximum attempts (overrides the configured default)
    #[arg(long)]
    retries: Option<u32>,

    /// Request timeout in seconds (overrides the configured default)
    #[arg(long)]
    timeout: Option<u64>,

    // ── Output ─────────────────────────────────────────────────
    /// Treat the response as an SSE stream and print text fragments
    #[arg(long)]
    stream: bool,

    /// Log request and response bodies
    #[arg(long, short)]
    verbose: bool,
}

// ── Argument parsing ───────────────────────────────────────────────

fn parse_operation(s: &str) -> Result<Operation, String> {
    Operation::parse(s).ok_or_else(|| {
        let names: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        format!("unknown operation '{s}' (expected one of: {})", names.join(", "))
    })
}

fn parse_query(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_body(source: &str) -> Result<Value, String> {
    let text = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| format!("failed to read body file '{source}': {e}"))?
    };
    serde_json::from_str(&text).map_err(|e| format!("body is not valid JSON: {e}"))
}

fn build_params(cli: &Cli) -> Vec<PathParam> {
    let mut params = Vec::new();
    if !cli.ids.is_empty() {
        params.push(PathParam::ids(cli.ids.iter().cloned()));
    }
    if let Some(method) = &cli.method {
        params.push(PathParam::method(method.clone()));
    }
    params.extend(cli.children.iter().cloned().map(PathParam::child));
    params.extend(
        cli.queries
            .iter()
            .map(|(k, v)| PathParam::query(k.clone(), v)),
    );
    params
}

fn build_request(cli: &Cli) -> Result<Request, String> {
    let mut request = Request::new().with_logging(cli.verbose);
    if let Some(source) = &cli.body {
        request = request.with_body(read_body(source)?);
    }
    if let Some(retries) = cli.retries {
        request = request.with_retries(retries);
    }
    if let Some(secs) = cli.timeout {
        request = request.with_timeout(Duration::from_secs(secs));
    }
    Ok(request)
}

fn pretty(value: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to format response: {e}"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "crudkit=debug" } else { "crudkit=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

// ── Main ───────────────────────────────────────────────────────────

async fn run(cli: &Cli) -> Result<String, String> {
    let config = ClientConfiguration::from_json_file(&cli.config).map_err(|e| e.to_string())?;
    let client = CrudClient::new(config)
        .map_err(|e| e.to_string())?
        .with_event_handler(LoggingHandler);
    let routes = RouteTable::new(cli.service.clone()).with(cli.op, cli.route.clone());
    let params = build_params(cli);
    let request = build_request(cli)?;

    if cli.stream {
        let mut stdout = io::stdout();
        let state = client
            .stream::<Value>(cli.op, &routes, request, params, |event| match event {
                StreamEvent::Text(text) => {
                    let _ = write!(stdout, "{text}");
                    let _ = stdout.flush();
                }
                StreamEvent::Error(message) => eprintln!("  [stream error] {message}"),
                _ => {}
            })
            .await
            .map_err(|e| e.to_string())?;
        if state.skipped > 0 {
            eprintln!("  {} malformed chunk(s) skipped", state.skipped);
        }
        return Ok("\n".to_string());
    }

    let request = (cli.body.is_some() || cli.op.requires_body()).then_some(request);
    let output = match cli.op {
        Operation::Delete => {
            let deleted = client
                .delete::<DeleteResponse>(&routes, request, params)
                .await
                .map_err(|e| e.to_string())?;
            pretty(&serde_json::json!({ "deleted": deleted }))?
        }
        op => {
            let response: Option<Value> = client
                .dispatch(op, &routes, request, params)
                .await
                .map_err(|e| e.to_string())?;
            match response {
                Some(value) => pretty(&value)?,
                None => "(no content)".to_string(),
            }
        }
    };
    Ok(format!("{output}\n"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
