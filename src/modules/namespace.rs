//! Per-module symbol namespace.
//!
//! Resolution order for a symbol:
//!
//! 1. symbols under the reserved host prefix never resolve;
//! 2. the namespace's own cache;
//! 3. the module's archive (`a.b.C` lives at `a/b/C.def`);
//! 4. the host's shared symbol table;
//! 5. the archives of sibling modules loaded by the same loader.
//!
//! Only successful resolutions are cached, first writer wins, so a symbol
//! maps to at most one definition for the lifetime of the namespace.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use zip::result::{ZipError, ZipResult};
use zip::ZipArchive;

use super::catalog::{Linker, SymbolResolver};
use super::error::{AlreadyRegistered, SymbolNotFound};
use super::instance::{claim_type, LoadedModule};
use super::traits::{Definition, Origin};

/// Suffix of definition entries inside an archive.
pub const DEFINITION_SUFFIX: &str = ".def";

/// Optional archive manifest; its main section describes every group.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Archive entry holding the definition of `symbol`.
pub fn definition_path(symbol: &str) -> String {
    format!("{}{DEFINITION_SUFFIX}", symbol.replace('.', "/"))
}

/// Descriptive metadata attached to a symbol grouping (`a.b` for `a.b.C`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

/// Append-only list of namespaces, safe to iterate while others append.
#[derive(Default)]
pub(crate) struct NamespaceList {
    namespaces: RwLock<Vec<Arc<ModuleNamespace>>>,
}

impl NamespaceList {
    pub(crate) fn push(&self, namespace: Arc<ModuleNamespace>) {
        self.namespaces.write().push(namespace);
    }

    pub(crate) fn contains(&self, namespace: &ModuleNamespace) -> bool {
        self.namespaces
            .read()
            .iter()
            .any(|ns| std::ptr::eq(Arc::as_ptr(ns), namespace))
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<ModuleNamespace>> {
        self.namespaces.read().clone()
    }
}

/// Isolated symbol space of one module archive.
pub struct ModuleNamespace {
    /// Self reference recorded as the owner of linked types
    this: Weak<ModuleNamespace>,
    /// Name from the descriptor
    module_name: String,
    /// Archive this namespace reads from
    archive_path: PathBuf,
    /// Open archive, locked per entry read
    archive: Mutex<ZipArchive<File>>,
    /// Group metadata read from the archive manifest
    manifest: BTreeMap<String, String>,
    /// Symbols under this prefix resolve only from the host
    reserved_prefix: String,
    /// Materializes definitions found in the archive
    linker: Arc<dyn Linker>,
    /// Host fallback table
    host: Weak<dyn SymbolResolver>,
    /// Namespaces of the same loader, searched last
    siblings: Weak<NamespaceList>,
    /// Successful resolutions, first writer wins
    definitions: RwLock<HashMap<String, Definition>>,
    /// Groups with manifest metadata attached, keyed by name
    groups: RwLock<HashMap<String, Arc<Group>>>,
    /// Module types linked here, each claimed in the global owner map
    linked_types: RwLock<HashSet<TypeId>>,
    /// Module bound to this namespace, set at most once
    instance: OnceLock<Weak<LoadedModule>>,
}

impl ModuleNamespace {
    pub(crate) fn open(
        module_name: &str,
        archive_path: &Path,
        reserved_prefix: &str,
        linker: Arc<dyn Linker>,
        host: Weak<dyn SymbolResolver>,
        siblings: Weak<NamespaceList>,
    ) -> ZipResult<Arc<Self>> {
        let mut archive = ZipArchive::new(File::open(archive_path)?)?;
        let manifest = match read_entry(&mut archive, MANIFEST_PATH)? {
            Some(bytes) => parse_manifest(&String::from_utf8_lossy(&bytes)),
            None => BTreeMap::new(),
        };

        tracing::debug!(
            module = %module_name,
            archive = %archive_path.display(),
            entries = archive.len(),
            "Opened module namespace"
        );

        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            module_name: module_name.to_string(),
            archive_path: archive_path.to_path_buf(),
            archive: Mutex::new(archive),
            manifest,
            reserved_prefix: reserved_prefix.to_string(),
            linker,
            host,
            siblings,
            definitions: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            linked_types: RwLock::new(HashSet::new()),
            instance: OnceLock::new(),
        }))
    }

    /// Resolve a symbol through the full delegation chain.
    pub fn resolve(&self, symbol: &str) -> Result<Definition, SymbolNotFound> {
        if let Some(definition) = self.find_local(symbol)? {
            return Ok(definition);
        }

        if let Some(host) = self.host.upgrade() {
            if let Some(definition) = host.resolve_symbol(symbol) {
                return Ok(self.commit(symbol, definition));
            }
        }

        if let Some(siblings) = self.siblings.upgrade() {
            for sibling in siblings.snapshot() {
                if std::ptr::eq(Arc::as_ptr(&sibling), self) {
                    continue;
                }
                match sibling.find_local(symbol) {
                    Ok(Some(definition)) => return Ok(self.commit(symbol, definition)),
                    Ok(None) => {}
                    Err(e) => tracing::debug!(
                        module = %self.module_name,
                        sibling = %sibling.module_name,
                        symbol = %symbol,
                        error = %e,
                        "Sibling namespace could not define symbol"
                    ),
                }
            }
        }

        Err(SymbolNotFound::new(symbol))
    }

    /// Resolve from this namespace's cache and archive only.
    ///
    /// `Ok(None)` means the archive does not carry the symbol; errors mean it
    /// is reserved or carries it but could not be materialized.
    pub fn find_local(&self, symbol: &str) -> Result<Option<Definition>, SymbolNotFound> {
        if symbol.starts_with(&self.reserved_prefix) {
            return Err(SymbolNotFound::with_source(
                symbol,
                format!("`{}` is reserved for the host", self.reserved_prefix),
            ));
        }

        if let Some(definition) = self.definitions.read().get(symbol) {
            return Ok(Some(definition.clone()));
        }

        let bytes = {
            let mut archive = self.archive.lock();
            read_entry(&mut archive, &definition_path(symbol))
                .map_err(|e| SymbolNotFound::with_source(symbol, e))?
        };
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let shape = self
            .linker
            .link(symbol, &bytes)
            .map_err(|e| SymbolNotFound::with_source(symbol, e))?;

        if let Some((group, _)) = symbol.rsplit_once('.') {
            self.define_group(group);
        }
        if let Some(factory) = shape.factory() {
            self.linked_types.write().insert(factory.type_id());
            claim_type(factory.type_id(), self.this.clone());
        }

        let definition = Definition::new(
            symbol,
            Origin::Module(self.module_name.clone()),
            shape,
            bytes.len(),
        );
        tracing::trace!(module = %self.module_name, symbol = %symbol, "Defined symbol");
        Ok(Some(self.commit(symbol, definition)))
    }

    /// Cache a definition unless one is already cached; return the winner.
    fn commit(&self, symbol: &str, definition: Definition) -> Definition {
        self.definitions
            .write()
            .entry(symbol.to_string())
            .or_insert(definition)
            .clone()
    }

    /// Attach group metadata. Repeated calls return the existing group.
    fn define_group(&self, name: &str) -> Arc<Group> {
        if let Some(group) = self.groups.read().get(name) {
            return group.clone();
        }
        self.groups
            .write()
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(module = %self.module_name, group = %name, "Defined group");
                Arc::new(Group {
                    name: name.to_string(),
                    attributes: self.manifest.clone(),
                })
            })
            .clone()
    }

    /// Bind the module instance constructed from this namespace. Once only.
    pub(crate) fn bind(&self, module: &Arc<LoadedModule>) -> Result<(), AlreadyRegistered> {
        if !self.linked_types.read().contains(&module.entry_type_id()) {
            return Err(AlreadyRegistered {
                module: self.module_name.clone(),
                detail: format!(
                    "{} was not constructed through this namespace",
                    module.entry_type_name()
                ),
            });
        }
        self.instance
            .set(Arc::downgrade(module))
            .map_err(|_| AlreadyRegistered {
                module: self.module_name.clone(),
                detail: "module already initialized".to_string(),
            })
    }

    /// The module bound to this namespace, once construction has finished.
    pub fn instance(&self) -> Option<Arc<LoadedModule>> {
        self.instance.get().and_then(Weak::upgrade)
    }

    /// Raw bytes of any archive entry.
    pub fn resource(&self, path: &str) -> ZipResult<Option<Vec<u8>>> {
        read_entry(&mut self.archive.lock(), path)
    }

    /// Every symbol this namespace has resolved so far, sorted.
    pub fn resolved_symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn manifest(&self) -> &BTreeMap<String, String> {
        &self.manifest
    }
}

impl std::fmt::Debug for ModuleNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNamespace")
            .field("module_name", &self.module_name)
            .field("archive_path", &self.archive_path)
            .field("resolved", &self.definitions.read().len())
            .finish_non_exhaustive()
    }
}

fn read_entry(archive: &mut ZipArchive<File>, path: &str) -> ZipResult<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(path) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Main section of a `Key: Value` manifest; continuation lines start with a space.
fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    let mut attributes: BTreeMap<String, String> = BTreeMap::new();
    let mut last: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if let Some(continued) = line.strip_prefix(' ') {
            if let Some(value) = last.as_ref().and_then(|key| attributes.get_mut(key)) {
                value.push_str(continued);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            attributes.insert(key.clone(), value.trim().to_string());
            last = Some(key);
        }
    }

    attributes
}
