//! Configuration file watcher for live limit changes.

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::PoolConfig;
use crate::pool::ConnPool;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<PoolConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<PoolConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config: {}. Keeping current configuration.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// The configuration currently in effect for a running pool.
#[derive(Debug)]
pub struct LiveConfig {
    current: ArcSwap<PoolConfig>,
}

impl LiveConfig {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn current(&self) -> Arc<PoolConfig> {
        self.current.load_full()
    }

    /// Push changed limits from `next` into `pool` and make them current.
    ///
    /// Backend and selection changes are not applied; the previous values are kept.
    /// Returns true if any limit changed.
    pub fn apply<P: ConnPool + ?Sized>(&self, mut next: PoolConfig, pool: &P) -> bool {
        let prev = self.current.load_full();
        let mut changed = false;

        if prev.backends != next.backends || prev.limits.selection != next.limits.selection {
            tracing::warn!("Backend or selection changes require a restart; ignoring them");
            next.backends = prev.backends.clone();
            next.limits.selection = prev.limits.selection;
        }
        if prev.limits.max_open != next.limits.max_open {
            pool.set_max_open_conns(next.limits.max_open);
            changed = true;
        }
        if prev.limits.max_idle != next.limits.max_idle {
            pool.set_max_idle_conns(next.limits.max_idle);
            changed = true;
        }
        if changed {
            tracing::info!(
                max_open = next.limits.max_open,
                max_idle = next.limits.max_idle,
                "Pool limits updated"
            );
        }

        self.current.store(Arc::new(next));
        changed
    }
}

/// Apply reloaded configurations until shutdown or until the watcher goes away.
pub async fn apply_updates<P: ConnPool + ?Sized>(
    live: Arc<LiveConfig>,
    pool: Arc<P>,
    mut updates: mpsc::UnboundedReceiver<PoolConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    live.apply(config, &*pool);
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config update loop stopped");
}
