use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use mini_miner::client::ChallengeClient;
use mini_miner::config::Config;
use mini_miner::metrics::MetricsCollector;
use mini_miner::prometheus_metrics::PrometheusMetrics;
use mini_miner::types::{Solution, SolveReceipt};
use mini_miner::Solver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let dotenv_loaded = dotenv::dotenv().is_ok();
    let config = Config::from_env()?;
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if dotenv_loaded {
        debug!(target: "mini_miner", "loaded variables from .env");
    }

    let prometheus = config.metrics_enabled.then(|| Arc::new(PrometheusMetrics::new()));
    let mut collector = MetricsCollector::new();
    if let Some(prom) = &prometheus {
        collector = collector.with_prometheus(Arc::clone(prom));
    }
    let metrics = Arc::new(collector);

    let client = ChallengeClient::new(&config).with_metrics(Arc::clone(&metrics));
    let problem = client.fetch_problem().await.context("fetching problem")?;
    let (difficulty, payload) = problem.into_parts()?;

    let solver = Arc::new(Solver::new(config.solver_config()).with_metrics(Arc::clone(&metrics)));
    info!(
        target: "mini_miner",
        %difficulty,
        workers = solver.config().workers,
        hash = ?solver.config().hash,
        key_order = ?solver.config().key_order,
        "solving"
    );

    let result = Arc::clone(&solver)
        .solve_async(difficulty.bits(), payload.clone(), config.budget())
        .await?;

    let Some(nonce) = result.nonce else {
        error!(target: "mini_miner", stop = ?result.stop, tested = result.tested, "no nonce found");
        bail!("no nonce found ({:?} after {} candidates)", result.stop, result.tested);
    };

    let digest = solver.digest_of(&payload, nonce)?;
    let receipt = SolveReceipt {
        difficulty: difficulty.bits(),
        nonce,
        digest_hex: hex::encode(digest),
        tested: result.tested,
        elapsed_ms: result.elapsed.as_millis() as u64,
        workers: solver.config().workers,
        solved_at: chrono::Utc::now(),
    };
    eprintln!("{}", serde_json::to_string(&receipt)?);

    let reply = client
        .submit(Solution { nonce })
        .await
        .context("submitting solution")?;
    println!("{reply}");

    if let Some(prom) = &prometheus {
        prom.update_from_metrics(&metrics.get_metrics());
        eprint!("{}", prom.export_metrics()?);
    }

    Ok(())
}
