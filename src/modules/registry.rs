//! Module registry: discovery, naming and lifecycle containment.
//!
//! The registry maps file-name patterns to loaders, loads every matching
//! archive in a directory, and tracks the resulting modules under their
//! descriptor names. Hook failures never escape it: errors and panics from
//! `on_load`, `on_enable` and `on_disable` are logged with the module's
//! identity and swallowed.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::Serialize;

use super::catalog::{HostSymbols, Linker, SymbolResolver};
use super::descriptor::Descriptor;
use super::error::{DescriptorError, InvalidModuleKind, LoadError, RegistryError};
use super::instance::LoadedModule;
use super::loader::{ArchiveLoader, ModuleLoader};
use super::traits::panic_message;
use crate::config::HostConfig;

/// Something discovery skipped, kept for the host to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Two archives declare the same module name; only `kept` was loaded.
    AmbiguousName {
        name: String,
        kept: PathBuf,
        skipped: PathBuf,
    },
    /// An archive could not be loaded.
    LoadFailed { path: PathBuf, message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousName {
                name,
                kept,
                skipped,
            } => write!(
                f,
                "ambiguous module name `{name}`: kept '{}', skipped '{}'",
                kept.display(),
                skipped.display()
            ),
            Self::LoadFailed { path, message } => {
                write!(f, "could not load '{}': {message}", path.display())
            }
        }
    }
}

struct LoaderBinding {
    pattern: Regex,
    loader: Arc<dyn ModuleLoader>,
}

#[derive(Default)]
struct ModuleTable {
    order: Vec<Arc<LoadedModule>>,
    by_name: HashMap<String, usize>,
}

impl ModuleTable {
    fn get(&self, name: &str) -> Option<&Arc<LoadedModule>> {
        self.by_name.get(name).map(|&index| &self.order[index])
    }

    fn insert(&mut self, module: Arc<LoadedModule>) {
        self.by_name
            .insert(module.name().to_string(), self.order.len());
        self.order.push(module);
    }
}

/// Registry of loaders and the modules they produced.
///
/// Thread-safe; loads are serialized, lookups and lifecycle calls are not.
pub struct ModuleRegistry {
    /// Loaders keyed by file pattern in registration order
    loaders: RwLock<Vec<LoaderBinding>>,
    /// Loaded modules keyed by name
    modules: RwLock<ModuleTable>,
    /// Serializes discovery so names are claimed in file order
    load_lock: Mutex<()>,
    /// Host symbols shared with every loader
    host: Arc<HostSymbols>,
    /// Archives skipped by the last discovery
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl ModuleRegistry {
    /// Create an empty registry around the host's shared symbols.
    pub fn new(host: Arc<HostSymbols>) -> Self {
        Self {
            loaders: RwLock::new(Vec::new()),
            modules: RwLock::new(ModuleTable::default()),
            load_lock: Mutex::new(()),
            host,
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Create a registry with an [`ArchiveLoader`] set up from configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Host configuration (reserved prefix, file patterns)
    /// * `linker` - Materializes definitions found in archives
    /// * `host` - Symbols shared with every module
    pub fn from_config(
        config: &HostConfig,
        linker: Arc<dyn Linker>,
        host: Arc<HostSymbols>,
    ) -> anyhow::Result<Self> {
        let host_ref = Arc::downgrade(&host);
        let host_ref: Weak<dyn SymbolResolver> = host_ref;
        let loader = ArchiveLoader::new(linker, host_ref)
            .with_reserved_prefix(config.reserved_prefix.clone())
            .with_file_filters(config.file_filters()?);

        let registry = Self::new(host);
        registry.register_loader_filters(Arc::new(loader));
        Ok(registry)
    }

    /// Route file names matching `pattern` to `loader`.
    ///
    /// The most recent registration wins when several patterns match; a
    /// pattern registered again moves to the front with its new loader.
    pub fn register_loader(&self, pattern: Regex, loader: Arc<dyn ModuleLoader>) {
        let mut loaders = self.loaders.write();
        loaders.retain(|binding| binding.pattern.as_str() != pattern.as_str());
        tracing::debug!(pattern = %pattern, "Registered module loader");
        loaders.push(LoaderBinding { pattern, loader });
    }

    /// Register `loader` for each of its own file filters.
    pub fn register_loader_filters(&self, loader: Arc<dyn ModuleLoader>) {
        for pattern in loader.file_filters() {
            self.register_loader(pattern, loader.clone());
        }
    }

    fn loader_for(&self, path: &Path) -> Option<Arc<dyn ModuleLoader>> {
        let file_name = path.file_name()?.to_string_lossy();
        self.loaders
            .read()
            .iter()
            .rev()
            .find(|binding| binding.pattern.is_match(&file_name))
            .map(|binding| binding.loader.clone())
    }

    /// Load every matching archive in `dir`, in file-name order.
    ///
    /// Archives that fail to load, and later archives reusing an earlier
    /// module name, are skipped and recorded in [`last_diagnostics`].
    ///
    /// [`last_diagnostics`]: Self::last_diagnostics
    pub fn discover_and_load(&self, dir: &Path) -> Result<Vec<Arc<LoadedModule>>, RegistryError> {
        let files = list_files(dir)?;

        let _loading = self.load_lock.lock();
        let mut diagnostics = Vec::new();
        let mut pending: Vec<(PathBuf, Arc<dyn ModuleLoader>)> = Vec::new();
        let mut claimed: HashMap<String, PathBuf> = self
            .modules
            .read()
            .order
            .iter()
            .map(|module| (module.name().to_string(), module.archive_path().to_path_buf()))
            .collect();

        for path in files {
            let Some(loader) = self.loader_for(&path) else {
                tracing::trace!(path = %path.display(), "No loader for file, skipping");
                continue;
            };

            let descriptor = match loader.descriptor(&path) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    let err = LoadError::invalid_because(&path, InvalidModuleKind::Descriptor, e);
                    diagnostics.push(Self::load_failed(&path, err));
                    continue;
                }
            };

            if let Some(kept) = claimed.get(descriptor.name()) {
                tracing::warn!(
                    module = %descriptor.name(),
                    kept = %kept.display(),
                    skipped = %path.display(),
                    "Ambiguous module name"
                );
                diagnostics.push(Diagnostic::AmbiguousName {
                    name: descriptor.name().to_string(),
                    kept: kept.clone(),
                    skipped: path,
                });
                continue;
            }

            claimed.insert(descriptor.name().to_string(), path.clone());
            pending.push((path, loader));
        }

        let mut loaded = Vec::with_capacity(pending.len());
        for (path, loader) in pending {
            match loader.load(&path) {
                Ok(module) => {
                    self.modules.write().insert(module.clone());
                    loaded.push(module);
                }
                Err(e) => diagnostics.push(Self::load_failed(&path, e)),
            }
        }

        tracing::info!(
            dir = %dir.display(),
            loaded = loaded.len(),
            skipped = diagnostics.len(),
            "Module discovery finished"
        );
        *self.diagnostics.lock() = diagnostics;
        Ok(loaded)
    }

    /// Read the descriptor of every archive in `dir` some loader accepts,
    /// in file-name order, without loading anything.
    pub fn describe(
        &self,
        dir: &Path,
    ) -> Result<Vec<(PathBuf, Result<Descriptor, DescriptorError>)>, RegistryError> {
        Ok(list_files(dir)?
            .into_iter()
            .filter_map(|path| {
                let loader = self.loader_for(&path)?;
                let descriptor = loader.descriptor(&path);
                Some((path, descriptor))
            })
            .collect())
    }

    fn load_failed(path: &Path, error: LoadError) -> Diagnostic {
        let message = format!("{:#}", anyhow::Error::new(error));
        tracing::error!(path = %path.display(), error = %message, "Could not load module");
        Diagnostic::LoadFailed {
            path: path.to_path_buf(),
            message,
        }
    }

    /// Load a single archive and register it under its descriptor name.
    pub fn load(&self, path: &Path) -> Result<Arc<LoadedModule>, RegistryError> {
        let loader = self
            .loader_for(path)
            .ok_or_else(|| RegistryError::NoLoader(path.to_path_buf()))?;

        let _loading = self.load_lock.lock();
        let descriptor = loader
            .descriptor(path)
            .map_err(|e| LoadError::invalid_because(path, InvalidModuleKind::Descriptor, e))?;
        if let Some(existing) = self.modules.read().get(descriptor.name()) {
            return Err(RegistryError::DuplicateName {
                name: descriptor.name().to_string(),
                existing: existing.archive_path().to_path_buf(),
            });
        }

        let module = loader.load(path)?;
        self.modules.write().insert(module.clone());
        Ok(module)
    }

    /// The module registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules.read().get(name).cloned()
    }

    /// Every registered module, in registration order.
    pub fn modules(&self) -> Vec<Arc<LoadedModule>> {
        self.modules.read().order.clone()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.lookup(name).is_some_and(|module| module.is_enabled())
    }

    pub fn enabled_count(&self) -> usize {
        self.modules
            .read()
            .order
            .iter()
            .filter(|module| module.is_enabled())
            .count()
    }

    /// Run `on_load` for a freshly loaded module.
    pub fn notify_loaded(&self, module: &LoadedModule) {
        Self::contain(module, "loading", || module.run_on_load());
    }

    /// Enable a module through its loader. Failures are logged, not returned.
    pub fn enable(&self, module: &LoadedModule) {
        if module.is_enabled() {
            return;
        }
        Self::contain(module, "enabling", || module.loader().enable(module));
    }

    /// Disable a module through its loader. Failures are logged, not returned.
    pub fn disable(&self, module: &LoadedModule) {
        if !module.is_enabled() {
            return;
        }
        Self::contain(module, "disabling", || module.loader().disable(module));
    }

    /// Disable every enabled module, most recently enabled first.
    pub fn disable_all(&self) {
        let mut enabled: Vec<Arc<LoadedModule>> = self
            .modules()
            .into_iter()
            .filter(|module| module.is_enabled())
            .collect();
        enabled.sort_by_key(|module| std::cmp::Reverse(module.enabled_at()));

        for module in enabled {
            self.disable(&module);
        }
    }

    fn contain(module: &LoadedModule, action: &str, hook: impl FnOnce() -> anyhow::Result<()>) {
        match catch_unwind(AssertUnwindSafe(hook)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(
                module = %module.full_name(),
                error = %format!("{e:#}"),
                "Error occurred while {action} module"
            ),
            Err(payload) => tracing::error!(
                module = %module.full_name(),
                panic = %panic_message(payload.as_ref()),
                "Module panicked while {action}"
            ),
        }
    }

    /// Symbols shared with every module namespace.
    pub fn host_symbols(&self) -> &Arc<HostSymbols> {
        &self.host
    }

    /// Diagnostics recorded by the most recent discovery.
    pub fn last_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }
}

/// Regular files directly inside `dir`, sorted by file name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    if !dir.is_dir() {
        return Err(RegistryError::NotADirectory(dir.to_path_buf()));
    }
    let io_error = |source: std::io::Error| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("loaders", &self.loaders.read().len())
            .field("modules", &self.modules.read().order.len())
            .field("enabled", &self.enabled_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::Catalog;
    use crate::modules::testing::ArchiveBuilder;
    use crate::modules::traits::{Module, Shape};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Quiet;

    impl Module for Quiet {}

    #[derive(Default)]
    struct Counter {
        enables: AtomicUsize,
        disables: AtomicUsize,
    }

    impl Module for Counter {
        fn on_enable(&self, _module: &LoadedModule) -> anyhow::Result<()> {
            self.enables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_disable(&self, _module: &LoadedModule) -> anyhow::Result<()> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Flaky;

    impl Module for Flaky {
        fn on_enable(&self, _module: &LoadedModule) -> anyhow::Result<()> {
            anyhow::bail!("database unreachable")
        }
    }

    #[derive(Default)]
    struct Volatile;

    impl Module for Volatile {
        fn on_load(&self, _module: &LoadedModule) -> anyhow::Result<()> {
            panic!("on_load exploded")
        }

        fn on_enable(&self, _module: &LoadedModule) -> anyhow::Result<()> {
            panic!("on_enable exploded")
        }
    }

    static TEARDOWN: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Ordered;

    impl Module for Ordered {
        fn on_disable(&self, module: &LoadedModule) -> anyhow::Result<()> {
            TEARDOWN.lock().push(module.name().to_string());
            Ok(())
        }
    }

    struct Fixture {
        tmp: TempDir,
        catalog: Arc<Catalog>,
        registry: ModuleRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = Arc::new(Catalog::new());
            catalog.register_module::<Quiet>("test.Quiet");
            catalog.register_module::<Counter>("test.Counter");
            catalog.register_module::<Flaky>("test.Flaky");
            catalog.register_module::<Volatile>("test.Volatile");
            catalog.register_module::<Ordered>("test.Ordered");

            let registry = ModuleRegistry::from_config(
                &HostConfig::default(),
                catalog.clone(),
                Arc::new(HostSymbols::new()),
            )
            .unwrap();
            Self {
                tmp: TempDir::new().unwrap(),
                catalog,
                registry,
            }
        }

        fn dir(&self) -> &Path {
            self.tmp.path()
        }

        fn archive(&self, file_name: &str, name: &str, main: &str) -> PathBuf {
            ArchiveBuilder::new()
                .descriptor(name, main)
                .definition(main, "")
                .write(self.dir(), file_name)
        }

        fn discover(&self) -> Vec<Arc<LoadedModule>> {
            self.registry.discover_and_load(self.dir()).unwrap()
        }
    }

    #[test]
    fn from_config_routes_configured_patterns_to_one_loader() {
        let catalog = Arc::new(Catalog::new());
        let config = HostConfig {
            file_patterns: vec![r"\.zip$".into(), r"\.mod$".into()],
            ..HostConfig::default()
        };
        let registry =
            ModuleRegistry::from_config(&config, catalog, Arc::new(HostSymbols::new())).unwrap();

        let zip = registry.loader_for(Path::new("a.zip")).unwrap();
        let module = registry.loader_for(Path::new("b.mod")).unwrap();
        assert!(std::ptr::addr_eq(Arc::as_ptr(&zip), Arc::as_ptr(&module)));
        assert!(registry.loader_for(Path::new("c.txt")).is_none());
    }

    #[test]
    fn discovers_matching_archives_in_file_name_order() {
        let fx = Fixture::new();
        fx.archive("b.zip", "beta", "test.Quiet");
        fx.archive("a.zip", "alpha", "test.Quiet");
        std::fs::write(fx.dir().join("notes.txt"), "not a module").unwrap();
        std::fs::create_dir(fx.dir().join("nested.zip")).unwrap();

        let loaded = fx.discover();
        let names: Vec<&str> = loaded.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert!(fx.registry.lookup("alpha").is_some());
        assert!(fx.registry.lookup("gamma").is_none());
        assert!(fx.registry.last_diagnostics().is_empty());
        assert_eq!(fx.registry.modules().len(), 2);
    }

    #[test]
    fn duplicate_names_keep_first_archive() {
        let fx = Fixture::new();
        let first = fx.archive("a-foo.zip", "Foo", "test.Quiet");
        let second = fx.archive("b-foo.zip", "Foo", "test.Quiet");

        let loaded = fx.discover();
        assert_eq!(loaded.len(), 1);
        assert_eq!(fx.registry.lookup("Foo").unwrap().archive_path(), first);
        assert_eq!(
            fx.registry.last_diagnostics(),
            vec![Diagnostic::AmbiguousName {
                name: "Foo".into(),
                kept: first,
                skipped: second,
            }]
        );
    }

    #[test]
    fn failed_loads_are_skipped_and_recorded() {
        let fx = Fixture::new();
        fx.archive("a.zip", "alpha", "test.Quiet");
        fx.archive("b.zip", "broken", "test.Missing");
        std::fs::write(fx.dir().join("c.zip"), b"not a zip").unwrap();

        let loaded = fx.discover();
        assert_eq!(loaded.len(), 1);

        let diagnostics = fx.registry.last_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        for diagnostic in &diagnostics {
            assert!(matches!(diagnostic, Diagnostic::LoadFailed { .. }));
        }
        assert!(diagnostics
            .iter()
            .any(|d| d.to_string().contains("cannot find entry type test.Missing")));
        assert!(diagnostics
            .iter()
            .any(|d| d.to_string().contains("is not a module archive")));
    }

    #[test]
    fn rediscovery_does_not_reload_known_names() {
        let fx = Fixture::new();
        let path = fx.archive("a.zip", "alpha", "test.Quiet");
        fx.discover();

        let loaded = fx.discover();
        assert!(loaded.is_empty());
        assert_eq!(fx.registry.modules().len(), 1);
        assert!(matches!(
            &fx.registry.last_diagnostics()[..],
            [Diagnostic::AmbiguousName { kept, .. }] if *kept == path
        ));
    }

    #[test]
    fn discovery_requires_a_directory() {
        let fx = Fixture::new();
        let file = fx.archive("a.zip", "alpha", "test.Quiet");
        assert!(matches!(
            fx.registry.discover_and_load(&file),
            Err(RegistryError::NotADirectory(_))
        ));
    }

    #[test]
    fn single_load_rejects_duplicates_and_unknown_files() {
        let fx = Fixture::new();
        let first = fx.archive("a.zip", "alpha", "test.Quiet");
        let again = fx.archive("b.zip", "alpha", "test.Quiet");
        let text = fx.dir().join("alpha.txt");
        std::fs::write(&text, "hi").unwrap();

        fx.registry.load(&first).unwrap();
        match fx.registry.load(&again) {
            Err(RegistryError::DuplicateName { name, existing }) => {
                assert_eq!(name, "alpha");
                assert_eq!(existing, first);
            }
            other => panic!("expected duplicate name, got {other:?}"),
        }
        assert!(matches!(
            fx.registry.load(&text),
            Err(RegistryError::NoLoader(_))
        ));
        assert!(matches!(
            fx.registry.load(&fx.dir().join("missing.zip")),
            Err(RegistryError::Load(_))
        ));
    }

    #[test]
    fn most_recent_matching_loader_wins() {
        let fx = Fixture::new();
        let host_ref = Arc::downgrade(fx.registry.host_symbols());
        let host_ref: Weak<dyn SymbolResolver> = host_ref;
        let special = Arc::new(ArchiveLoader::new(fx.catalog.clone(), host_ref));
        fx.registry
            .register_loader(Regex::new(r"^special-.*\.zip$").unwrap(), special.clone());

        let plain = fx.archive("plain.zip", "plain", "test.Quiet");
        let custom = fx.archive("special-one.zip", "custom", "test.Quiet");

        let plain = fx.registry.load(&plain).unwrap();
        let custom = fx.registry.load(&custom).unwrap();
        assert!(std::ptr::addr_eq(
            Arc::as_ptr(custom.loader()),
            Arc::as_ptr(&special)
        ));
        assert!(!std::ptr::addr_eq(
            Arc::as_ptr(plain.loader()),
            Arc::as_ptr(&special)
        ));
    }

    #[test]
    fn enable_twice_runs_hook_once() {
        let fx = Fixture::new();
        fx.archive("a.zip", "counter", "test.Counter");
        let module = fx.discover().remove(0);

        fx.registry.enable(&module);
        fx.registry.enable(&module);
        assert!(fx.registry.is_enabled("counter"));
        fx.registry.disable(&module);
        fx.registry.disable(&module);
        assert!(!fx.registry.is_enabled("counter"));

        let counter = module.entry::<Counter>().unwrap();
        assert_eq!(counter.enables.load(Ordering::SeqCst), 1);
        assert_eq!(counter.disables.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_registry_enables_run_hook_once() {
        let fx = Fixture::new();
        fx.archive("a.zip", "counter", "test.Counter");
        let module = fx.discover().remove(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| fx.registry.enable(&module));
            }
        });

        assert!(fx.registry.is_enabled("counter"));
        let counter = module.entry::<Counter>().unwrap();
        assert_eq!(counter.enables.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disable_all_runs_in_reverse_enable_order() {
        let fx = Fixture::new();
        fx.archive("a.zip", "A", "test.Ordered");
        fx.archive("b.zip", "B", "test.Ordered");
        fx.archive("c.zip", "C", "test.Ordered");
        fx.discover();

        for name in ["B", "C", "A"] {
            fx.registry.enable(&fx.registry.lookup(name).unwrap());
        }
        assert_eq!(fx.registry.enabled_count(), 3);

        fx.registry.disable_all();
        assert_eq!(fx.registry.enabled_count(), 0);
        assert_eq!(*TEARDOWN.lock(), ["A", "C", "B"]);
    }

    #[test]
    fn hook_failures_are_contained() {
        let fx = Fixture::new();
        fx.archive("a.zip", "flaky", "test.Flaky");
        fx.archive("b.zip", "volatile", "test.Volatile");
        fx.archive("c.zip", "steady", "test.Counter");
        let modules = fx.discover();

        for module in &modules {
            fx.registry.notify_loaded(module);
            fx.registry.enable(module);
        }

        assert!(fx.registry.is_enabled("flaky"));
        assert!(fx.registry.is_enabled("volatile"));
        assert!(fx.registry.is_enabled("steady"));
        let steady = fx.registry.lookup("steady").unwrap();
        assert_eq!(
            steady.entry::<Counter>().unwrap().enables.load(Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn modules_resolve_host_symbols() {
        let fx = Fixture::new();
        fx.registry
            .host_symbols()
            .define("api.Clock", Shape::Plain);
        fx.archive("a.zip", "alpha", "test.Quiet");
        let module = fx.discover().remove(0);

        let clock = module.namespace().resolve("api.Clock").unwrap();
        assert_eq!(clock.symbol(), "api.Clock");
    }

    #[test]
    fn describe_reads_descriptors_without_loading() {
        let fx = Fixture::new();
        fx.archive("a.zip", "alpha", "test.Quiet");
        std::fs::write(fx.dir().join("b.zip"), b"not a zip").unwrap();
        std::fs::write(fx.dir().join("c.txt"), b"ignored").unwrap();

        let described = fx.registry.describe(fx.dir()).unwrap();
        assert_eq!(described.len(), 2);
        assert_eq!(described[0].1.as_ref().unwrap().name(), "alpha");
        assert!(described[1].1.is_err());
        assert!(fx.registry.modules().is_empty());
    }

    #[test]
    fn diagnostics_serialize_with_kind_tag() {
        let diagnostic = Diagnostic::LoadFailed {
            path: PathBuf::from("mods/a.zip"),
            message: "boom".into(),
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["kind"], "load_failed");
        assert_eq!(json["message"], "boom");
    }
}
