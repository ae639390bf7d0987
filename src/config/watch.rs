//! File-system watcher that turns edits into [`ConfigStore::reload`] calls.
//!
//! Watches the config directory (not the file itself, so editors that
//! save via rename are still seen) and reacts to two paths:
//!
//! - `settings.toml`, edited by hand or by another tool
//! - `.reload_signal`, touched by external tooling to request a reload
//!
//! Events are debounced: a burst of writes produces one reload.  The signal
//! file is deleted once its reload succeeds, so tooling can tell the request
//! was consumed.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::store::ConfigStore;

const DEBOUNCE: Duration = Duration::from_millis(150);

/// Handle keeping the watcher alive.  Dropping it stops watching.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_dir` for changes to `settings_file` or
    /// `reload_signal_file`.
    pub fn spawn(
        store: Arc<ConfigStore>,
        config_dir: &Path,
        reload_signal_file: &Path,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config_dir)?;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(tx)?;
        watcher.watch(config_dir, RecursiveMode::NonRecursive)?;

        let targets = vec![
            store.settings_file().to_path_buf(),
            reload_signal_file.to_path_buf(),
        ];
        let signal = reload_signal_file.to_path_buf();

        std::thread::Builder::new()
            .name("config-watch".into())
            .spawn(move || watch_loop(rx, &store, &targets, &signal))?;

        log::info!("config: watching {}", config_dir.display());
        Ok(Self { _watcher: watcher })
    }
}

fn watch_loop(
    rx: mpsc::Receiver<notify::Result<Event>>,
    store: &ConfigStore,
    targets: &[PathBuf],
    signal: &Path,
) {
    // Ends when the watcher (and with it the sender) is dropped.
    while let Ok(event) = rx.recv() {
        let relevant = match event {
            Ok(event) => is_relevant(&event, targets) && !is_signal_removal(&event, signal),
            Err(e) => {
                log::warn!("config: watcher error: {e}");
                false
            }
        };
        if !relevant {
            continue;
        }

        // Swallow the rest of the burst.
        while rx.recv_timeout(DEBOUNCE).is_ok() {}

        match store.reload() {
            Ok(_) => consume_signal(signal),
            Err(e) => log::warn!("config: reload after file change failed: {e}"),
        }
    }
    log::debug!("config: watcher stopped");
}

/// Delete the reload signal if present.
fn consume_signal(signal: &Path) {
    match std::fs::remove_file(signal) {
        Ok(()) => log::debug!("config: consumed {}", signal.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("config: cannot remove {}: {e}", signal.display()),
    }
}

/// Our own deletion of the signal file must not trigger another reload.
fn is_signal_removal(event: &Event, signal: &Path) -> bool {
    event.kind.is_remove()
        && !event.paths.is_empty()
        && event.paths.iter().all(|p| p.file_name() == signal.file_name())
}

fn is_relevant(event: &Event, targets: &[PathBuf]) -> bool {
    if event.kind.is_access() {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| targets.iter().any(|t| p.file_name() == t.file_name() && p.file_name().is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsPatch;
    use notify::event::{AccessKind, CreateKind, EventKind, ModifyKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_target_files_are_relevant() {
        let targets = vec![
            PathBuf::from("/cfg/settings.toml"),
            PathBuf::from("/cfg/.reload_signal"),
        ];
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/settings.toml"),
            &targets
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/cfg/.reload_signal"),
            &targets
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/history.json"),
            &targets
        ));
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/cfg/settings.toml"),
            &targets
        ));
    }

    #[test]
    fn touching_reload_signal_reloads_store() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("config");
        std::fs::create_dir_all(&cfg).unwrap();
        let store = Arc::new(
            ConfigStore::open_with_env(cfg.join("settings.toml"), SettingsPatch::default()).unwrap(),
        );
        let signal = cfg.join(".reload_signal");
        let _watcher = ConfigWatcher::spawn(Arc::clone(&store), &cfg, &signal).unwrap();

        // Edit the file behind the store's back, then request a reload.
        std::fs::write(store.settings_file(), "wake_word = \"apple\"\n").unwrap();
        std::fs::write(&signal, "").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while store.current().wake_word != "apple" && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(store.current().wake_word, "apple");

        while signal.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(!signal.exists(), "reload signal should be consumed");
    }

    #[test]
    fn signal_removal_is_ignored() {
        use notify::event::RemoveKind;
        let signal = PathBuf::from("/cfg/.reload_signal");
        assert!(is_signal_removal(
            &event(EventKind::Remove(RemoveKind::File), "/cfg/.reload_signal"),
            &signal
        ));
        assert!(!is_signal_removal(
            &event(EventKind::Remove(RemoveKind::File), "/cfg/settings.toml"),
            &signal
        ));
        assert!(!is_signal_removal(
            &event(EventKind::Create(CreateKind::File), "/cfg/.reload_signal"),
            &signal
        ));
    }

    #[test]
    fn consuming_a_missing_signal_is_quiet() {
        let dir = TempDir::new().unwrap();
        let signal = dir.path().join(".reload_signal");
        consume_signal(&signal);
        std::fs::write(&signal, "").unwrap();
        consume_signal(&signal);
        assert!(!signal.exists());
    }
}
