//! AppShell smoke harness.
//!
//! Installs and activates a worker against a live origin, then replays a list
//! of page visits through it and prints a JSON summary. With `--offline-replay`
//! every visit is repeated with the network cut off, which shows what the
//! cache can serve on its own.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use appshell_common::{init_logging, LogConfig, LogFormat, WorkerConfig};
use appshell_net::{Fetcher, HttpFetcher, LoaderConfig, NetError, Request, Response};
use appshell_sw::{FetchOutcome, ServiceWorker};
use async_trait::async_trait;
use clap::Parser;
use http::header::{HeaderValue, ACCEPT};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "appshell-smoke")]
#[command(about = "Exercise the app shell worker against a live origin")]
struct Args {
    /// Worker configuration file (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured origin
    #[arg(long)]
    origin: Option<Url>,

    /// Override the configured generation name
    #[arg(long)]
    generation: Option<String>,

    /// Paths to visit after activation, as navigations
    #[arg(long = "visit", value_name = "PATH")]
    visits: Vec<String>,

    /// Replay every visit with the network disabled
    #[arg(long)]
    offline_replay: bool,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: String,

    /// Extra tracing filter directives, e.g. `appshell_sw=trace`
    #[arg(long)]
    log_filter: Option<String>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

/// Operation timings, summarized per operation.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        for (op, durations) in &self.timings {
            if durations.is_empty() {
                continue;
            }
            let millis: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
            let total: f64 = millis.iter().sum();
            let max = millis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            summary.insert(
                op.to_string(),
                json!({
                    "count": millis.len(),
                    "total_ms": round2(total),
                    "avg_ms": round2(total / millis.len() as f64),
                    "max_ms": round2(max),
                }),
            );
        }
        serde_json::Value::Object(summary)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Network that can be switched off between visits.
struct SwitchableFetcher {
    inner: HttpFetcher,
    offline: AtomicBool,
}

#[async_trait]
impl Fetcher for SwitchableFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("network disabled".to_string()));
        }
        self.inner.fetch(request).await
    }
}

#[derive(Serialize)]
struct Visit {
    path: String,
    offline: bool,
    source: Option<String>,
    from_cache: bool,
    status: Option<u16>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SmokeResult {
    status: String,
    origin: String,
    generation: String,
    installed: usize,
    deleted_generations: Vec<String>,
    visits: Vec<Visit>,
    timings: serde_json::Value,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let format = LogFormat::from_name(&args.log_format).unwrap_or(LogFormat::Compact);
    let mut log_config = match (args.verbose, format) {
        (true, _) => LogConfig::debug().with_format(format),
        (false, LogFormat::Json) => LogConfig::production(),
        (false, _) => LogConfig::default().with_format(format),
    };
    if let Some(filter) = &args.log_filter {
        log_config = log_config.with_filter(filter.clone());
    }
    if let Err(e) = init_logging(log_config) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match run(&args).await {
        Ok(result) => {
            let failed = result.status != "ok";
            match serde_json::to_string_pretty(&result) {
                Ok(text) => println!("{}", text),
                Err(e) => error!(error = %e, "Could not serialize result"),
            }
            if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Smoke run failed");
            println!("{}", json!({ "status": "error", "error": format!("{:#}", e) }));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<SmokeResult> {
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    if let Some(origin) = &args.origin {
        config = config.with_origin(origin.clone());
    }
    if let Some(generation) = &args.generation {
        config = config.with_generation(generation.clone());
    }

    let fetcher = Arc::new(SwitchableFetcher {
        inner: HttpFetcher::new(LoaderConfig::default())?,
        offline: AtomicBool::new(false),
    });
    let origin = config.origin.clone();
    let worker = ServiceWorker::builder(config)
        .fetcher(fetcher.clone())
        .build()?;

    let mut perf = PerfTiming::default();

    let started = Instant::now();
    let installed = worker.install().await.context("install")?;
    perf.record("install", started.elapsed());

    let started = Instant::now();
    let report = worker.activate().await.context("activate")?;
    perf.record("activate", started.elapsed());

    let mut visits = Vec::new();
    for path in &args.visits {
        visits.push(visit(&worker, path, false, &mut perf).await?);
    }
    worker.settle().await;

    if args.offline_replay {
        fetcher.offline.store(true, Ordering::SeqCst);
        for path in &args.visits {
            visits.push(visit(&worker, path, true, &mut perf).await?);
        }
    }

    let status = if visits.iter().all(|v| v.error.is_none()) {
        "ok"
    } else {
        "degraded"
    };
    info!(status, installed, visits = visits.len(), "Smoke run finished");

    Ok(SmokeResult {
        status: status.to_string(),
        origin: origin.to_string(),
        generation: worker.generations().current().to_string(),
        installed,
        deleted_generations: report.deleted,
        visits,
        timings: perf.summary(),
    })
}

async fn visit(
    worker: &ServiceWorker,
    path: &str,
    offline: bool,
    perf: &mut PerfTiming,
) -> Result<Visit> {
    let url = worker.config().resolve(path)?;
    let started = Instant::now();
    let request = Request::navigate(url).header(ACCEPT, HeaderValue::from_static("text/html"));
    let outcome = worker.fetch(request).await;
    perf.record(if offline { "visit_offline" } else { "visit" }, started.elapsed());

    let mut visit = Visit {
        path: path.to_string(),
        offline,
        source: None,
        from_cache: false,
        status: None,
        error: None,
    };
    match outcome {
        Ok(FetchOutcome::Respond(response)) => {
            visit.source = Some(format!("{:?}", response.source));
            visit.from_cache = response.from_cache();
            visit.status = Some(response.response.status.as_u16());
        }
        Ok(FetchOutcome::PassThrough) => {
            visit.source = Some("PassThrough".to_string());
        }
        Err(e) => visit.error = Some(e.to_string()),
    }
    Ok(visit)
}
