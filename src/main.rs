//! Application entry point for the voice assistant.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Resolve [`AppPaths`] and open the [`ConfigStore`].  An override file
//!    that cannot produce valid settings is fatal here.
//! 3. Open the [`HistoryStore`].
//! 4. Create the [`tokio`] runtime.
//! 5. Start the background tasks: stats sampler, settings watcher, status
//!    publisher and signal handling.
//! 6. Run the [`Orchestrator`] until farewell, `SIGINT` or `SIGTERM`.
//! 7. Give in-flight work [`SHUTDOWN_GRACE`], then flush and close history.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use voice_assistant::{
    audio::CpalSource,
    config::{AppPaths, ConfigStore, ConfigWatcher},
    history::{HistoryStore, ProcProbe, StatsSampler},
    monitor::{MonitorApi, StatusPublisher, STATUS_INTERVAL},
    pipeline::{new_shared_status, DefaultProviders, ExitReason, Orchestrator, SHUTDOWN_GRACE},
    stt::ModelPaths,
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Settings
    let paths = AppPaths::new();
    std::fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("creating {}", paths.config_dir.display()))?;
    let config = Arc::new(
        ConfigStore::open(&paths.settings_file).context("cannot load settings")?,
    );

    // 3. History
    let history = Arc::new(
        HistoryStore::open(&paths.history_file)
            .with_context(|| format!("cannot open {}", paths.history_file.display()))?,
    );

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("assistant")
        .build()
        .context("failed to create tokio runtime")?;

    let reason = rt.block_on(run(paths, Arc::clone(&config), Arc::clone(&history)))?;

    // 7. Persist everything appended before shutdown.
    history.close();
    log::info!("main: exited ({reason:?})");
    Ok(())
}

async fn run(
    paths: AppPaths,
    config: Arc<ConfigStore>,
    history: Arc<HistoryStore>,
) -> anyhow::Result<ExitReason> {
    let shutdown = CancellationToken::new();

    // 5. Background services
    let sampler = StatsSampler::spawn(
        Arc::clone(&history),
        ProcProbe::new(),
        config.current().stats_interval(),
        shutdown.clone(),
    );

    // Keep the watcher alive for the whole run; without it only SIGHUP reloads.
    let _watcher = match ConfigWatcher::spawn(
        Arc::clone(&config),
        &paths.config_dir,
        &paths.reload_signal_file,
    ) {
        Ok(w) => Some(w),
        Err(e) => {
            log::warn!("main: settings watcher unavailable: {e}");
            None
        }
    };

    spawn_signal_handler(Arc::clone(&config), shutdown.clone())?;

    // State and mute are shared with the dashboard through status.json.
    let client = reqwest::Client::new();
    let muted = Arc::new(AtomicBool::new(false));
    let status = new_shared_status();
    let monitor = MonitorApi::new(
        Arc::clone(&config),
        Arc::clone(&history),
        Arc::clone(&status),
        Arc::clone(&muted),
        client.clone(),
    );
    let publisher = StatusPublisher::spawn(
        monitor,
        paths.status_file.clone(),
        STATUS_INTERVAL,
        shutdown.clone(),
    );

    // 6. Orchestrator
    let factory = Arc::new(DefaultProviders::new(
        client,
        Arc::new(CpalSource::new()),
        ModelPaths::from_app_paths(&paths),
        muted,
    ));
    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        Arc::clone(&history),
        factory,
        status,
        shutdown.clone(),
    );
    let mut cycle = tokio::spawn(orchestrator.run());

    let reason = tokio::select! {
        r = &mut cycle => r.context("orchestrator task failed")?,
        _ = shutdown.cancelled() => {
            log::info!("main: shutdown requested, waiting up to {}s", SHUTDOWN_GRACE.as_secs());
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut cycle).await {
                Ok(r) => r.context("orchestrator task failed")?,
                Err(_) => {
                    log::warn!("main: orchestrator did not stop in time, aborting");
                    cycle.abort();
                    ExitReason::Shutdown
                }
            }
        }
    };

    // Farewell ends the run without a signal; stop the background tasks too.
    shutdown.cancel();
    if let Err(e) = sampler.await {
        log::warn!("main: stats sampler task failed: {e}");
    }
    if let Err(e) = publisher.await {
        log::warn!("main: status publisher task failed: {e}");
    }

    let h = Arc::clone(&history);
    tokio::task::spawn_blocking(move || h.flush())
        .await
        .context("history flush task failed")?;

    Ok(reason)
}

/// `SIGHUP` reloads settings; `SIGINT` and `SIGTERM` request shutdown.
#[cfg(unix)]
fn spawn_signal_handler(config: Arc<ConfigStore>, shutdown: CancellationToken) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    log::info!("main: SIGHUP, reloading settings");
                    // A rejected reload is logged by the store.
                    let config = Arc::clone(&config);
                    let _ = tokio::task::spawn_blocking(move || config.reload()).await;
                }
                _ = terminate.recv() => break,
                _ = tokio::signal::ctrl_c() => break,
                _ = shutdown.cancelled() => return,
            }
        }
        log::info!("main: termination signal received");
        shutdown.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_handler(_config: Arc<ConfigStore>, shutdown: CancellationToken) -> anyhow::Result<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("main: interrupt received");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });
    Ok(())
}
