//! The module contract and the typed definitions namespaces hand out.
//!
//! A module author implements [`Module`] on their entry type. The host
//! makes the type constructible by registering a [`ModuleFactory`] for it;
//! namespaces then resolve symbols into [`Definition`]s whose [`Shape`]
//! says whether, and how, they can be instantiated.

use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::instance::LoadedModule;

/// Lifecycle contract implemented by every module entry type.
///
/// All hooks default to no-ops. Each receives the [`LoadedModule`] that owns
/// the entry so it can read its descriptor, data directory and enable state.
/// Errors returned from hooks are contained and logged by the registry.
pub trait Module: Any + Send + Sync {
    /// Called once by the host after discovery, before the first enable.
    fn on_load(&self, module: &LoadedModule) -> anyhow::Result<()> {
        let _ = module;
        Ok(())
    }

    /// Called after the enabled flag has flipped to `true`.
    fn on_enable(&self, module: &LoadedModule) -> anyhow::Result<()> {
        let _ = module;
        Ok(())
    }

    /// Called after the enabled flag has flipped to `false`.
    fn on_disable(&self, module: &LoadedModule) -> anyhow::Result<()> {
        let _ = module;
        Ok(())
    }
}

type BuildFn = dyn Fn() -> anyhow::Result<Box<dyn Module>> + Send + Sync;

/// No-argument constructor for a concrete module type.
#[derive(Clone)]
pub struct ModuleFactory {
    type_id: TypeId,
    type_name: &'static str,
    build: Arc<BuildFn>,
}

impl ModuleFactory {
    /// Factory for a type constructed through `Default`.
    pub fn of<T: Module + Default>() -> Self {
        Self::with(|| Ok(T::default()))
    }

    /// Factory running a fallible constructor.
    pub fn with<T, F>(build: F) -> Self
    where
        T: Module,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            build: Arc::new(move || build().map(|entry| Box::new(entry) as Box<dyn Module>)),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Run the constructor; a panic becomes an error at this boundary.
    pub(crate) fn construct(&self) -> anyhow::Result<Box<dyn Module>> {
        match catch_unwind(AssertUnwindSafe(|| (self.build)())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "constructor panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

impl fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// How a module type may be constructed.
#[derive(Debug, Clone)]
pub enum Constructor {
    /// Accessible no-argument constructor.
    Public(ModuleFactory),
    /// The type exists but exposes no accessible no-argument constructor.
    Inaccessible,
    /// The type cannot be instantiated at all.
    Abstract,
}

/// What a resolved symbol is.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Any type that does not implement [`Module`].
    Plain,
    /// A type implementing [`Module`].
    Module(Constructor),
}

impl Shape {
    /// Shape of a module type constructed through `Default`.
    pub fn module<T: Module + Default>() -> Self {
        Shape::Module(Constructor::Public(ModuleFactory::of::<T>()))
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Shape::Module(_))
    }

    /// The factory, when the shape is a constructible module type.
    pub fn factory(&self) -> Option<&ModuleFactory> {
        match self {
            Shape::Module(Constructor::Public(factory)) => Some(factory),
            _ => None,
        }
    }
}

/// Where a definition was materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The host's shared symbol table.
    Host,
    /// A module archive, by module name.
    Module(String),
}

struct DefinitionInner {
    symbol: String,
    origin: Origin,
    shape: Shape,
    size: usize,
}

/// A resolved symbol. Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct Definition(Arc<DefinitionInner>);

impl Definition {
    pub(crate) fn new(symbol: impl Into<String>, origin: Origin, shape: Shape, size: usize) -> Self {
        Self(Arc::new(DefinitionInner {
            symbol: symbol.into(),
            origin,
            shape,
            size,
        }))
    }

    pub fn symbol(&self) -> &str {
        &self.0.symbol
    }

    pub fn origin(&self) -> &Origin {
        &self.0.origin
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    /// Size in bytes of the raw definition this was materialized from.
    pub fn size(&self) -> usize {
        self.0.size
    }

    /// Whether two handles are the same materialized definition.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("symbol", &self.0.symbol)
            .field("origin", &self.0.origin)
            .field("shape", &self.0.shape)
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Quiet;

    impl Module for Quiet {}

    struct Exploding;

    impl Module for Exploding {}

    #[test]
    fn factory_records_concrete_type() {
        let factory = ModuleFactory::of::<Quiet>();
        assert_eq!(factory.type_id(), TypeId::of::<Quiet>());
        assert!(factory.type_name().ends_with("Quiet"));
        assert!(factory.construct().is_ok());
    }

    #[test]
    fn factory_errors_pass_through() {
        let factory = ModuleFactory::with::<Exploding, _>(|| anyhow::bail!("no config"));
        let err = factory.construct().err().unwrap();
        assert_eq!(err.to_string(), "no config");
    }

    #[test]
    fn factory_panics_become_errors() {
        let factory = ModuleFactory::with::<Exploding, _>(|| panic!("boom"));
        let err = factory.construct().err().unwrap();
        assert_eq!(err.to_string(), "constructor panicked: boom");
    }

    #[test]
    fn definition_clones_share_identity() {
        let a = Definition::new("x.Y", Origin::Host, Shape::Plain, 0);
        let b = a.clone();
        let c = Definition::new("x.Y", Origin::Host, Shape::Plain, 0);
        assert!(Definition::ptr_eq(&a, &b));
        assert!(!Definition::ptr_eq(&a, &c));
    }

    #[test]
    fn shape_exposes_factory_only_for_public_constructors() {
        assert!(Shape::module::<Quiet>().factory().is_some());
        assert!(Shape::Module(Constructor::Abstract).factory().is_none());
        assert!(Shape::Module(Constructor::Inaccessible).is_module());
        assert!(!Shape::Plain.is_module());
    }
}
