//! Reload automations when their files change

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::RunnerResult;
use crate::loader::AutomationsLoader;
use crate::scheduler::Scheduler;

/// Default quiet period before a burst of file events triggers a reload
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Watches the automations directory and reloads on change
pub struct ReloadController<C: Clock> {
    loader: Arc<AutomationsLoader>,
    scheduler: Arc<Scheduler<C>>,
    debounce: Duration,
}

impl<C: Clock> ReloadController<C> {
    pub fn new(loader: Arc<AutomationsLoader>, scheduler: Arc<Scheduler<C>>, debounce: Duration) -> Self {
        Self {
            loader,
            scheduler,
            debounce,
        }
    }

    /// Reload now, tolerating a broken directory
    ///
    /// Schedules are restarted only when the automations hash changed, so
    /// pending fires survive a no-op or failed reload. Returns whether they
    /// were restarted.
    pub async fn reload(&self) -> bool {
        let previous = self.loader.current().hash.clone();
        match self.loader.reload(true).await {
            Ok(automations) if automations.hash != previous => {
                self.scheduler.start(&automations);
                true
            }
            Ok(_) => {
                debug!(hash = %previous, "Automations unchanged, schedules left running");
                false
            }
            Err(e) => {
                error!("Unable to reload automations: {}", e);
                false
            }
        }
    }

    /// Watch until `shutdown` fires
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> RunnerResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;
        watch_tree(&mut watcher, self.loader.root())?;
        info!(path = %self.loader.root().display(), "Watching automations for changes");

        let mut deadline: Option<Instant> = None;
        loop {
            let debounced = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                received = rx.recv() => match received {
                    Some(Ok(event)) => {
                        if !is_relevant(&event) {
                            continue;
                        }
                        trace_event(&event);
                        if matches!(event.kind, EventKind::Create(_)) {
                            for path in event.paths.iter().filter(|p| p.is_dir()) {
                                if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
                                    warn!(path = %path.display(), "Unable to watch new directory: {}", e);
                                }
                            }
                        }
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    Some(Err(e)) => warn!("File watch error: {}", e),
                    None => break,
                },
                _ = debounced => {
                    deadline = None;
                    info!("Automation files changed, reloading");
                    self.reload().await;
                }
                _ = shutdown.recv() => {
                    debug!("Stopping automations watcher");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Watch `root` and each directory directly under it
fn watch_tree(watcher: &mut RecommendedWatcher, root: &Path) -> notify::Result<()> {
    watcher.watch(root, RecursiveMode::NonRecursive)?;
    let entries = std::fs::read_dir(root).map_err(notify::Error::io)?;
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            watcher.watch(&entry.path(), RecursiveMode::NonRecursive)?;
        }
    }
    Ok(())
}

/// Content changes only; permission and access events are ignored
fn is_relevant(event: &Event) -> bool {
    match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
    }
}

fn trace_event(event: &Event) {
    for path in &event.paths {
        debug!(path = %path.display(), kind = ?event.kind, "Automation file event");
    }
}
