//! Module types built into the host binary.
//!
//! An archive uses one by naming it as its `mainClass` and shipping an empty
//! definition entry for it (`builtin/Heartbeat.def`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;

use crate::modules::{Catalog, LoadedModule, Module, ModuleFactory};

/// Symbol of the [`Heartbeat`] module type.
pub const HEARTBEAT: &str = "builtin.Heartbeat";

/// Register every built-in module type.
pub fn register_builtins(catalog: &Catalog) {
    catalog.register_factory(HEARTBEAT, ModuleFactory::of::<Heartbeat>());
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Logs a beat at a fixed interval while enabled.
pub struct Heartbeat {
    interval: Duration,
    beats: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
}

impl Heartbeat {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            beats: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::with_interval(Duration::from_secs(30))
    }
}

impl Module for Heartbeat {
    fn on_enable(&self, module: &LoadedModule) -> anyhow::Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let beats = self.beats.clone();
        let interval = self.interval;
        let span = module.span().clone();
        let flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("heartbeat-{}", module.name()))
            .spawn(move || {
                let _entered = span.enter();
                while !flag.load(Ordering::Acquire) {
                    std::thread::park_timeout(interval);
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    let beat = beats.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::debug!(beat, "Heartbeat");
                }
            })
            .context("Failed to spawn heartbeat thread")?;

        *self.worker.lock() = Some(Worker { stop, handle });
        tracing::info!(interval = ?interval, "Heartbeat started");
        Ok(())
    }

    fn on_disable(&self, _module: &LoadedModule) -> anyhow::Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::Release);
        worker.handle.thread().unpark();
        worker
            .handle
            .join()
            .map_err(|_| anyhow::anyhow!("heartbeat thread panicked"))?;
        tracing::info!(beats = self.beats(), "Heartbeat stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("interval", &self.interval)
            .field("beats", &self.beats())
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::modules::testing::ArchiveBuilder;
    use crate::modules::{HostSymbols, ModuleRegistry};
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn builtins_are_registered() {
        let catalog = Catalog::new();
        register_builtins(&catalog);
        assert!(catalog.contains(HEARTBEAT));
    }

    #[test]
    fn heartbeat_beats_while_enabled() {
        let tmp = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new());
        catalog.register_factory(
            HEARTBEAT,
            ModuleFactory::with(|| Ok(Heartbeat::with_interval(Duration::from_millis(5)))),
        );
        ArchiveBuilder::new()
            .descriptor("pulse", HEARTBEAT)
            .definition(HEARTBEAT, "")
            .write(tmp.path(), "pulse.zip");

        let registry = ModuleRegistry::from_config(
            &HostConfig::default(),
            catalog,
            Arc::new(HostSymbols::new()),
        )
        .unwrap();
        let module = registry.discover_and_load(tmp.path()).unwrap().remove(0);
        let heartbeat = module.entry::<Heartbeat>().unwrap();

        registry.enable(&module);
        let deadline = Instant::now() + Duration::from_secs(5);
        while heartbeat.beats() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(heartbeat.beats() >= 2);

        registry.disable_all();
        assert!(!module.is_enabled());
        let stopped_at = heartbeat.beats();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(heartbeat.beats(), stopped_at);
    }

    #[test]
    fn disabling_an_idle_heartbeat_is_fine() {
        let tmp = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::new());
        register_builtins(&catalog);
        ArchiveBuilder::new()
            .descriptor("idle", HEARTBEAT)
            .definition(HEARTBEAT, "")
            .write(tmp.path(), "idle.zip");

        let registry = ModuleRegistry::from_config(
            &HostConfig::default(),
            catalog,
            Arc::new(HostSymbols::new()),
        )
        .unwrap();
        let module = registry.discover_and_load(tmp.path()).unwrap().remove(0);
        let heartbeat = module.entry::<Heartbeat>().unwrap();
        heartbeat.on_disable(&module).unwrap();
        assert_eq!(heartbeat.beats(), 0);
    }
}
