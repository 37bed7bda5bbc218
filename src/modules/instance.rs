//! Base state shared by every loaded module.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use anyhow::Context;
use parking_lot::{ReentrantMutex, RwLock};

use super::descriptor::Descriptor;
use super::error::InstanceError;
use super::loader::ModuleLoader;
use super::namespace::ModuleNamespace;
use super::traits::{Module, ModuleFactory};

/// Namespaces that have linked a given concrete module type, oldest first.
static TYPE_OWNERS: LazyLock<RwLock<HashMap<TypeId, Vec<Weak<ModuleNamespace>>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Monotonic stamp of enable transitions, for teardown ordering.
static ENABLE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub(crate) fn claim_type(type_id: TypeId, namespace: Weak<ModuleNamespace>) {
    let mut owners = TYPE_OWNERS.write();
    let claims = owners.entry(type_id).or_default();
    claims.retain(|claim| claim.strong_count() > 0);
    if !claims.iter().any(|claim| claim.ptr_eq(&namespace)) {
        claims.push(namespace);
    }
}

/// A constructed module entry together with its host-managed state.
pub struct LoadedModule {
    /// Constructed entry object whose hooks run on transitions
    entry: Box<dyn Module>,
    /// Concrete type of `entry`, matched by `instance_for`
    entry_type: TypeId,
    /// Type name of `entry`, for errors and logs
    entry_type_name: &'static str,
    /// Parsed `module.toml`
    descriptor: Arc<Descriptor>,
    /// Namespace the entry type was linked in
    namespace: Arc<ModuleNamespace>,
    /// Loader that produced this module and drives its hooks
    loader: Arc<dyn ModuleLoader>,
    /// Archive the module was loaded from
    archive_path: PathBuf,
    /// `<modules dir>/<name>`, not created until asked for
    data_dir: PathBuf,
    /// Set before the enable hook runs, cleared before the disable hook
    enabled: AtomicBool,
    /// Stamp of the latest enable, used to order teardown
    enabled_at: AtomicU64,
    /// Serializes enable and disable, reentrant so hooks may toggle
    transition: ReentrantMutex<()>,
    /// Span carrying the module name, entered around hooks
    span: tracing::Span,
}

impl LoadedModule {
    pub(crate) fn new(
        entry: Box<dyn Module>,
        factory: &ModuleFactory,
        descriptor: Arc<Descriptor>,
        namespace: Arc<ModuleNamespace>,
        loader: Arc<dyn ModuleLoader>,
        archive_path: PathBuf,
        data_dir: PathBuf,
    ) -> Self {
        let span = tracing::info_span!("module", name = %descriptor.name());
        Self {
            entry,
            entry_type: factory.type_id(),
            entry_type_name: factory.type_name(),
            descriptor,
            namespace,
            loader,
            archive_path,
            data_dir,
            enabled: AtomicBool::new(false),
            enabled_at: AtomicU64::new(0),
            transition: ReentrantMutex::new(()),
            span,
        }
    }

    /// The loaded module whose entry is a `T`.
    ///
    /// Fails with [`InstanceError::IllegalState`] while no module with a `T`
    /// entry has finished construction, e.g. when called from its own
    /// factory, and with [`InstanceError::NotManaged`] when no module
    /// namespace ever linked `T`.
    pub fn instance_for<T: Module>() -> Result<Arc<LoadedModule>, InstanceError> {
        let type_name = std::any::type_name::<T>();
        let claims: Vec<Arc<ModuleNamespace>> = TYPE_OWNERS
            .read()
            .get(&TypeId::of::<T>())
            .map(|claims| claims.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default();

        if claims.is_empty() {
            return Err(InstanceError::NotManaged { type_name });
        }
        // A namespace may link `T` without `T` being its entry type.
        claims
            .iter()
            .filter_map(|namespace| namespace.instance())
            .find(|module| module.entry_type == TypeId::of::<T>())
            .ok_or(InstanceError::IllegalState { type_name })
    }

    /// The entry as its concrete type.
    pub fn entry<T: Module>(&self) -> Option<&T> {
        let entry: &dyn Any = &*self.entry;
        entry.downcast_ref::<T>()
    }

    /// Flip the enabled flag, then run the matching hook.
    ///
    /// A no-op when the flag already has the target value. Transitions are
    /// serialized per module; a hook re-entering with the same target returns
    /// immediately. Loaders drive this; hosts go through the registry.
    pub fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        let _transition = self.transition.lock();
        if self.enabled.load(Ordering::Acquire) == enabled {
            return Ok(());
        }

        self.enabled.store(enabled, Ordering::Release);
        if enabled {
            let stamp = ENABLE_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
            self.enabled_at.store(stamp, Ordering::Relaxed);
        }

        let _entered = self.span.enter();
        if enabled {
            self.entry.on_enable(self)
        } else {
            self.entry.on_disable(self)
        }
    }

    pub(crate) fn run_on_load(&self) -> anyhow::Result<()> {
        let _entered = self.span.enter();
        self.entry.on_load(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stamp of the most recent enable; later enables have larger stamps.
    pub(crate) fn enabled_at(&self) -> u64 {
        self.enabled_at.load(Ordering::Relaxed)
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn full_name(&self) -> String {
        self.descriptor.full_name()
    }

    pub fn namespace(&self) -> &Arc<ModuleNamespace> {
        &self.namespace
    }

    pub fn loader(&self) -> &Arc<dyn ModuleLoader> {
        &self.loader
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Sibling directory of the archive named after the module. Not created
    /// until [`ensure_data_dir`](Self::ensure_data_dir) is called.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ensure_data_dir(&self) -> std::io::Result<&Path> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(&self.data_dir)
    }

    /// Span tagged with the module's name; hooks already run inside it.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub(crate) fn entry_type_id(&self) -> TypeId {
        self.entry_type
    }

    pub fn entry_type_name(&self) -> &'static str {
        self.entry_type_name
    }

    /// A bundled resource from the module's archive.
    pub fn resource(&self, path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.namespace
            .resource(path)
            .with_context(|| format!("Failed to read {path} from {}", self.full_name()))
    }

    /// A bundled UTF-8 text resource from the module's archive.
    pub fn text_resource(&self, path: &str) -> anyhow::Result<Option<String>> {
        self.resource(path)?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .with_context(|| format!("{path} in {} is not UTF-8", self.full_name()))
            })
            .transpose()
    }
}

impl fmt::Display for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor.full_name())
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.descriptor.name())
            .field("entry_type", &self.entry_type_name)
            .field("archive_path", &self.archive_path)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
