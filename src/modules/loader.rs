//! Archive module loader.
//!
//! Turns a zip archive into a running [`LoadedModule`]: descriptor, data
//! directory, namespace, entry type, construction, binding. Failures are
//! reported as [`LoadError::InvalidModule`] with the cause attached; a
//! violated binding surfaces as [`LoadError::AlreadyRegistered`].

use std::path::Path;
use std::sync::{Arc, LazyLock, Weak};

use regex::Regex;

use super::catalog::{Linker, SymbolResolver};
use super::descriptor::{Descriptor, RESERVED_PREFIX};
use super::error::{DescriptorError, InvalidModuleKind, LoadError};
use super::instance::LoadedModule;
use super::namespace::{ModuleNamespace, NamespaceList};
use super::traits::{Constructor, Definition, ModuleFactory, Shape};

/// Default file-name filter for module archives.
pub const DEFAULT_FILE_FILTER: &str = r"\.zip$";

static DEFAULT_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_FILE_FILTER).expect("default file filter is a valid regex")
});

/// Loads modules of one archive format and drives their lifecycle.
pub trait ModuleLoader: Send + Sync {
    /// File-name patterns this loader accepts.
    fn file_filters(&self) -> Vec<Regex>;

    /// Parse just the descriptor of an archive.
    fn descriptor(&self, path: &Path) -> Result<Descriptor, DescriptorError>;

    /// Fully load an archive into a module instance.
    fn load(self: Arc<Self>, path: &Path) -> Result<Arc<LoadedModule>, LoadError>;

    /// Enable a module; hook errors are returned, not handled.
    fn enable(&self, module: &LoadedModule) -> anyhow::Result<()>;

    /// Disable a module; hook errors are returned, not handled.
    fn disable(&self, module: &LoadedModule) -> anyhow::Result<()>;
}

/// Loader for zip-packaged modules.
///
/// Thread-safe; namespaces of loaded modules are recorded for cross-module
/// symbol lookup.
pub struct ArchiveLoader {
    /// Materializes definitions found in archives
    linker: Arc<dyn Linker>,
    /// Host-level fallback resolver
    host: Weak<dyn SymbolResolver>,
    /// Symbols under this prefix are never read from archives
    reserved_prefix: String,
    /// File name patterns this loader handles
    filters: Vec<Regex>,
    /// Namespaces of every module this loader produced
    namespaces: Arc<NamespaceList>,
}

impl ArchiveLoader {
    /// Create a loader.
    ///
    /// # Arguments
    ///
    /// * `linker` - Materializes definitions found in archives
    /// * `host` - Host-level fallback resolver, held weakly
    pub fn new(linker: Arc<dyn Linker>, host: Weak<dyn SymbolResolver>) -> Self {
        Self {
            linker,
            host,
            reserved_prefix: RESERVED_PREFIX.to_string(),
            filters: vec![DEFAULT_FILTER.clone()],
            namespaces: Arc::new(NamespaceList::default()),
        }
    }

    /// Use a different reserved host prefix.
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_prefix = prefix.into();
        self
    }

    /// Accept a different set of file names.
    pub fn with_file_filters(mut self, filters: Vec<Regex>) -> Self {
        self.filters = filters;
        self
    }

    pub fn reserved_prefix(&self) -> &str {
        &self.reserved_prefix
    }

    /// Namespaces of every module this loader has produced, in load order.
    pub fn namespaces(&self) -> Vec<Arc<ModuleNamespace>> {
        self.namespaces.snapshot()
    }

    /// Look a symbol up in the archives of every loaded module.
    pub fn find_symbol(&self, symbol: &str) -> Option<Definition> {
        self.namespaces
            .snapshot()
            .iter()
            .find_map(|namespace| namespace.find_local(symbol).ok().flatten())
    }

    /// Resolve the entry type and check it is a constructible module type.
    fn entry_factory(
        namespace: &ModuleNamespace,
        path: &Path,
        main: &str,
    ) -> Result<ModuleFactory, LoadError> {
        let definition = namespace.resolve(main).map_err(|e| {
            LoadError::invalid_because(path, InvalidModuleKind::EntryNotFound(main.into()), e)
        })?;

        match definition.shape() {
            Shape::Plain => Err(LoadError::invalid(
                path,
                InvalidModuleKind::NotAModule(main.into()),
            )),
            Shape::Module(Constructor::Inaccessible) => Err(LoadError::invalid(
                path,
                InvalidModuleKind::NoAccessibleConstructor(main.into()),
            )),
            Shape::Module(Constructor::Abstract) => Err(LoadError::invalid(
                path,
                InvalidModuleKind::Abstract(main.into()),
            )),
            Shape::Module(Constructor::Public(factory)) => Ok(factory.clone()),
        }
    }
}

impl ModuleLoader for ArchiveLoader {
    fn file_filters(&self) -> Vec<Regex> {
        self.filters.clone()
    }

    fn descriptor(&self, path: &Path) -> Result<Descriptor, DescriptorError> {
        Descriptor::from_archive(path, &self.reserved_prefix)
    }

    fn load(self: Arc<Self>, path: &Path) -> Result<Arc<LoadedModule>, LoadError> {
        if !path.exists() {
            return Err(LoadError::invalid_because(
                path,
                InvalidModuleKind::ArchiveMissing,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                ),
            ));
        }

        let descriptor = self
            .descriptor(path)
            .map_err(|e| LoadError::invalid_because(path, InvalidModuleKind::Descriptor, e))?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let data_dir = parent.join(descriptor.name());
        if data_dir.exists() && !data_dir.is_dir() {
            return Err(LoadError::invalid(
                path,
                InvalidModuleKind::DataDirConflict(data_dir),
            ));
        }

        tracing::debug!(
            module = %descriptor.name(),
            archive = %path.display(),
            main = %descriptor.main(),
            "Loading module"
        );

        let namespace = ModuleNamespace::open(
            descriptor.name(),
            path,
            &self.reserved_prefix,
            self.linker.clone(),
            self.host.clone(),
            Arc::downgrade(&self.namespaces),
        )
        .map_err(|e| LoadError::invalid_because(path, InvalidModuleKind::Archive, e))?;

        let factory = Self::entry_factory(&namespace, path, descriptor.main())?;
        let entry = factory.construct().map_err(|e| {
            LoadError::invalid_because(
                path,
                InvalidModuleKind::ConstructionFailed(descriptor.main().into()),
                e,
            )
        })?;

        let loader: Arc<dyn ModuleLoader> = self.clone();
        let module = Arc::new(LoadedModule::new(
            entry,
            &factory,
            Arc::new(descriptor),
            namespace.clone(),
            loader,
            path.to_path_buf(),
            data_dir,
        ));
        namespace.bind(&module)?;
        self.namespaces.push(namespace);

        tracing::info!(
            module = %module.name(),
            version = %module.descriptor().version(),
            entry_type = %module.entry_type_name(),
            "Module loaded"
        );
        Ok(module)
    }

    fn enable(&self, module: &LoadedModule) -> anyhow::Result<()> {
        if module.is_enabled() {
            return Ok(());
        }
        module
            .span()
            .in_scope(|| tracing::info!("Enabling {}", module.full_name()));

        if !self.namespaces.contains(module.namespace()) {
            self.namespaces.push(module.namespace().clone());
            tracing::warn!(
                module = %module.full_name(),
                "Enabled module with unregistered namespace"
            );
        }

        module.set_enabled(true)
    }

    fn disable(&self, module: &LoadedModule) -> anyhow::Result<()> {
        if !module.is_enabled() {
            return Ok(());
        }
        module
            .span()
            .in_scope(|| tracing::info!("Disabling {}", module.full_name()));

        module.set_enabled(false)
    }
}

impl std::fmt::Debug for ArchiveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveLoader")
            .field("reserved_prefix", &self.reserved_prefix)
            .field("filters", &self.filters)
            .field("namespaces", &self.namespaces.snapshot().len())
            .finish_non_exhaustive()
    }
}
