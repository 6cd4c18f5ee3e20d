//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServerConfig;

/// Publishes a freshly loaded [`ServerConfig`] whenever the file changes.
///
/// Editors often emit several events per save; a reload that yields the same
/// configuration as the last published one is not sent again.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ServerConfig,
}

impl ConfigWatcher {
    pub fn new(path: &Path, current: ServerConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            current,
        }
    }

    /// Start watching. The returned watcher must be kept alive for updates to flow.
    pub fn spawn(
        self,
    ) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<ServerConfig>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.path.clone();
        let mut last = self.current;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&path) {
                        Ok(next) if next == last => {
                            tracing::trace!(path = ?path, "Config unchanged, skipping reload");
                        }
                        Ok(next) => {
                            tracing::info!(path = ?path, "Config file changed, publishing reload");
                            last = next.clone();
                            let _ = tx.send(next);
                        }
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Failed to reload config, keeping current configuration"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");

        Ok((watcher, rx))
    }
}
