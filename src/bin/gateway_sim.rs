//! gateway-sim: 用模拟上游驱动请求管理器并输出用量统计
//!
//! Usage:
//!   gateway-sim [--config <path>] [--requests <n>] [--distinct <n>] [--fail-every <n>]
//!
//! Sends a burst of mixed-priority requests through a `RequestManager` backed by
//! a simulated upstream, then prints the usage snapshot as JSON.
//! Set `RUST_LOG` to control log output (default: info).

use ai_lib_gateway::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct Options {
    config: Option<String>,
    requests: usize,
    distinct: usize,
    fail_every: u64,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut opts = Options {
        config: None,
        requests: 20,
        distinct: 8,
        fail_every: 0,
    };
    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1).ok_or_else(|| format!("missing value for {}", args[i]))?;
        match args[i].as_str() {
            "--config" => opts.config = Some(value.clone()),
            "--requests" => opts.requests = value.parse().map_err(|_| "invalid --requests")?,
            "--distinct" => opts.distinct = value.parse().map_err(|_| "invalid --distinct")?,
            "--fail-every" => opts.fail_every = value.parse().map_err(|_| "invalid --fail-every")?,
            other => return Err(format!("unknown option: {other}")),
        }
        i += 2;
    }
    opts.distinct = opts.distinct.max(1);
    Ok(opts)
}

fn print_usage() {
    println!(
        r#"gateway-sim: drive the request manager against a simulated upstream

USAGE:
    gateway-sim [--config <path>] [--requests <n>] [--distinct <n>] [--fail-every <n>]

OPTIONS:
    --config <path>      YAML gateway configuration
    --requests <n>       Requests to send (default 20)
    --distinct <n>       Distinct prompts among them (default 8)
    --fail-every <n>     Fail every n-th upstream call (default 0 = never)

ENVIRONMENT:
    RUST_LOG             Log filter (default: info)"#
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }
    let opts = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{e}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(opts).await {
        eprintln!("gateway-sim failed: {e}");
        std::process::exit(1);
    }
}

async fn run(opts: Options) -> ai_lib_gateway::Result<()> {
    let config = match &opts.config {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::default(),
    };

    let calls = Arc::new(AtomicU64::new(0));
    let counter = calls.clone();
    let fail_every = opts.fail_every;
    let upstream = Arc::new(FnBackend::new(move |req: Request| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::time::sleep(Duration::from_millis(50 + (req.prompt.len() as u64 % 7) * 25)).await;
            if fail_every > 0 && n % fail_every == 0 {
                anyhow::bail!("simulated upstream failure on call {n}");
            }
            Ok(UpstreamResponse::text(format!(
                "[{}] generated answer for: {}",
                req.model, req.prompt
            )))
        }
    }));

    let manager = RequestManager::new(config, upstream)?;

    let warmup: Vec<Request> = (0..opts.distinct.min(3))
        .map(|i| prompt_for(i).with_category(CacheCategory::MealPlan))
        .collect();
    let _ = manager.preload(warmup).await;

    let mut handles = Vec::with_capacity(opts.requests);
    for i in 0..opts.requests {
        let manager = manager.clone();
        let request = prompt_for(i % opts.distinct).with_category(CacheCategory::MealPlan);
        let options = if i % 4 == 0 {
            GenerateOptions::high()
        } else {
            GenerateOptions::new()
        };
        handles.push(tokio::spawn(async move { manager.generate(request, options).await }));
    }
    let mut failures = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(error = %e, "request failed");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, "request task panicked");
            }
        }
    }
    manager.shutdown().await;

    let stats = manager.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!(
        "upstream calls: {}, failures: {}, hit ratio: {:.2}",
        calls.load(Ordering::SeqCst),
        failures,
        stats.hit_ratio()
    );
    Ok(())
}

fn prompt_for(i: usize) -> Request {
    Request::new(
        format!("Plan a balanced day of meals for profile #{i}, with calories per meal and a short shopping list."),
        "gemini-1.5-pro",
    )
}
