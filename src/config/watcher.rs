//! Hot reload of the gate configuration file.
//!
//! The parent directory is watched rather than the file itself so editors
//! that save by rename are still picked up. A reload is only forwarded when
//! the file content actually changed and the new document validates.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::GateConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GateConfig>,
}

/// Decides which file events turn into configuration updates.
#[derive(Debug)]
struct ReloadFilter {
    path: PathBuf,
    last_content: Option<String>,
}

impl ReloadFilter {
    fn new(path: PathBuf) -> Self {
        let last_content = fs::read_to_string(&path).ok();
        Self { path, last_content }
    }

    fn concerns(&self, event: &Event) -> bool {
        let file_name = self.path.file_name();
        (event.kind.is_modify() || event.kind.is_create())
            && event.paths.iter().any(|p| p.file_name() == file_name)
    }

    fn on_event(&mut self, event: &Event) -> Option<GateConfig> {
        if !self.concerns(event) {
            return None;
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Config file unreadable, keeping current configuration");
                return None;
            }
        };
        if self.last_content.as_deref() == Some(content.as_str()) {
            return None;
        }

        match parse_config(&content) {
            Ok(config) => {
                self.last_content = Some(content);
                tracing::info!(path = ?self.path, "Config file changed, reloading");
                Some(config)
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected config reload, keeping current configuration");
                None
            }
        }
    }
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver validated updates arrive on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GateConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Keep the returned handle alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut filter = ReloadFilter::new(self.path.clone());
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(config) = filter.on_event(&event) {
                        let _ = tx.send(config);
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Watching config file for changes");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    fn temp_config(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("gate-watch-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    fn modified(path: &Path) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.to_path_buf())
    }

    #[test]
    fn test_forwards_only_changed_valid_content() {
        let path = temp_config("[security]\nescalation_threshold = 3\n");
        let mut filter = ReloadFilter::new(path.clone());

        // Unchanged content is not a reload.
        assert!(filter.on_event(&modified(&path)).is_none());

        fs::write(&path, "[security]\nescalation_threshold = 2\n").unwrap();
        let config = filter.on_event(&modified(&path)).unwrap();
        assert_eq!(config.security.escalation_threshold, 2);
        assert!(filter.on_event(&modified(&path)).is_none());

        fs::write(&path, "[rate_limiting]\nwindow_ms = 0\n").unwrap();
        assert!(filter.on_event(&modified(&path)).is_none());

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_ignores_other_files_and_event_kinds() {
        let path = temp_config("");
        let mut filter = ReloadFilter::new(path.clone());
        fs::write(&path, "[security]\nescalation_threshold = 4\n").unwrap();

        let other = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/tmp/other.toml"));
        assert!(filter.on_event(&other).is_none());
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(path.clone());
        assert!(filter.on_event(&access).is_none());

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert!(filter.on_event(&created).is_some());

        fs::remove_file(&path).unwrap_or_default();
    }
}
