//! `herald run`: spawn the worker pool and supervise it until shutdown.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use herald_core::config::HeraldConfig;
use herald_store::{init_db, open, JobManager, ScheduleManager};
use herald_worker::retry::{retry, DEFAULT_MAX_ELAPSED};
use herald_worker::{repetitive, JobWorker, ScheduleWorker};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

pub async fn run(config: HeraldConfig) -> Result<()> {
    let workers = &config.workers;
    if workers.job_workers == 0 && workers.schedule_workers == 0 {
        bail!("nothing to run: job_workers and schedule_workers are both 0");
    }

    let node = node_name(config.node_name.as_deref());
    let path = config.database.path.as_str();
    let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
    info!(
        node = %node,
        db = %path,
        job_workers = workers.job_workers,
        schedule_workers = workers.schedule_workers,
        "starting herald"
    );

    // Another node may hold the write lock while it creates the schema.
    retry(DEFAULT_MAX_ELAPSED, move || async move {
        let conn = open(path, busy_timeout)?;
        init_db(&conn)
    })
    .await?;
    info!("database schema ready");

    let executor = herald_executor::from_config(&config.executor).await?;
    let pause = Duration::from_secs(workers.poll_interval_secs);
    let budget = Duration::from_secs(workers.retry_max_elapsed_secs);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    // each worker gets its own connection
    for i in 0..workers.schedule_workers {
        let name = format!("{node}_schedules_{i}");
        let queue = Arc::new(ScheduleManager::new(open(path, busy_timeout)?));
        let worker = ScheduleWorker::new(name.clone(), workers.lease_minutes, queue)
            .with_retry_budget(budget);
        let rx = shutdown_rx.clone();
        tasks.spawn(async move {
            repetitive::work(Arc::new(worker), pause, rx).await;
            name
        });
        tokio::time::sleep(startup_jitter(workers.startup_jitter_ms)).await;
    }

    for i in 0..workers.job_workers {
        let name = format!("{node}_jobs_{i}");
        let queue = Arc::new(JobManager::new(open(path, busy_timeout)?));
        let worker = JobWorker::new(name.clone(), workers.lease_minutes, queue, executor.clone())
            .with_retry_budget(budget);
        let rx = shutdown_rx.clone();
        tasks.spawn(async move {
            repetitive::work(Arc::new(worker), pause, rx).await;
            name
        });
        tokio::time::sleep(startup_jitter(workers.startup_jitter_ms)).await;
    }

    let total = tasks.len();
    info!(total, "all workers started");

    shutdown_signal().await?;
    let _ = shutdown_tx.send(true);
    info!("shutdown requested, waiting for workers to finish their current cycle");

    let mut stopped = 0;
    while let Some(joined) = tasks.join_next().await {
        stopped += 1;
        match joined {
            Ok(name) => info!(worker = %name, stopped, total, "worker shut down"),
            Err(e) => error!(error = %e, stopped, total, "worker task failed"),
        }
    }
    info!("exiting");
    Ok(())
}

/// Claim owner prefix for this process: the configured name, or
/// `herald_<host>_<pid>`.
pub fn node_name(configured: Option<&str>) -> String {
    if let Some(name) = configured {
        return name.to_string();
    }
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("herald_{}_{}", host, std::process::id())
}

/// A delay in `0..max_ms` so workers across nodes do not poll in lockstep.
fn startup_jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(u64::from(nanos) % max_ms)
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_node_name_wins() {
        assert_eq!(node_name(Some("node-a")), "node-a");
    }

    #[test]
    fn generated_node_name_has_host_and_pid() {
        let name = node_name(None);
        assert!(name.starts_with("herald_"));
        assert!(name.ends_with(&format!("_{}", std::process::id())));
    }

    #[test]
    fn jitter_stays_below_bound() {
        assert_eq!(startup_jitter(0), Duration::ZERO);
        for _ in 0..100 {
            assert!(startup_jitter(50) < Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn refuses_to_run_without_workers() {
        let mut config = HeraldConfig::default();
        config.workers.job_workers = 0;
        config.workers.schedule_workers = 0;
        assert!(run(config).await.is_err());
    }
}
