//! Linking raw definitions to behavior, and the host's shared symbol table.
//!
//! Archives carry definition entries (`a/b/C.def`) that make a symbol visible
//! inside one module's namespace. A [`Linker`] turns those bytes into a
//! [`Shape`]. The stock linker is [`Catalog`], a table of factories keyed by
//! implementation name that the host fills before discovery.
//!
//! A definition entry's first non-blank line names the implementation to bind.
//! An empty entry binds the implementation registered under the symbol's own
//! name, so two archives may ship the same symbol backed by different code.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::traits::{Constructor, Definition, Module, ModuleFactory, Origin, Shape};

/// Materializes raw definition bytes found in an archive.
pub trait Linker: Send + Sync {
    fn link(&self, symbol: &str, bytes: &[u8]) -> anyhow::Result<Shape>;
}

/// Factory table keyed by implementation name.
#[derive(Default)]
pub struct Catalog {
    shapes: RwLock<HashMap<String, Shape>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shape; the last registration for a name wins.
    pub fn register(&self, implementation: impl Into<String>, shape: Shape) -> Option<Shape> {
        self.shapes.write().insert(implementation.into(), shape)
    }

    /// Register a module type constructed through `Default`.
    pub fn register_module<T: Module + Default>(&self, implementation: impl Into<String>) {
        self.register(implementation, Shape::module::<T>());
    }

    /// Register a module type with a custom constructor.
    pub fn register_factory(&self, implementation: impl Into<String>, factory: ModuleFactory) {
        self.register(implementation, Shape::Module(Constructor::Public(factory)));
    }

    /// Register a type that is not a module.
    pub fn register_plain(&self, implementation: impl Into<String>) {
        self.register(implementation, Shape::Plain);
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.shapes.read().contains_key(implementation)
    }

    pub fn len(&self) -> usize {
        self.shapes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.read().is_empty()
    }
}

impl Linker for Catalog {
    fn link(&self, symbol: &str, bytes: &[u8]) -> anyhow::Result<Shape> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| anyhow::anyhow!("definition of `{symbol}` is not UTF-8: {e}"))?;
        let implementation = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(symbol);

        self.shapes
            .read()
            .get(implementation)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("no implementation `{implementation}` is linked for `{symbol}`")
            })
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("implementations", &self.shapes.read().len())
            .finish()
    }
}

/// Host-level fallback lookup consulted by module namespaces.
pub trait SymbolResolver: Send + Sync {
    fn resolve_symbol(&self, symbol: &str) -> Option<Definition>;
}

/// Definitions the host shares with every module.
#[derive(Default)]
pub struct HostSymbols {
    definitions: RwLock<HashMap<String, Definition>>,
}

impl HostSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a shared symbol. An existing definition is kept and returned.
    pub fn define(&self, symbol: impl Into<String>, shape: Shape) -> Definition {
        let symbol = symbol.into();
        self.definitions
            .write()
            .entry(symbol.clone())
            .or_insert_with(|| Definition::new(symbol, Origin::Host, shape, 0))
            .clone()
    }

    /// Names of every shared symbol, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SymbolResolver for HostSymbols {
    fn resolve_symbol(&self, symbol: &str) -> Option<Definition> {
        self.definitions.read().get(symbol).cloned()
    }
}

impl std::fmt::Debug for HostSymbols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSymbols")
            .field("symbols", &self.definitions.read().len())
            .finish()
    }
}
