//! Heap Effect Elaboration
//!
//! This crate compiles away heap-manipulating object operations (allocation,
//! field access, runtime type checks, reference equality) into pure
//! functional form:
//!
//! - an explicit heap value (a map from references to class values) is
//!   threaded through every function that touches the heap;
//! - every cross-function call is routed through a synthesized *shim* that
//!   checks the callee's `reads`/`modifies` frame against the caller's and
//!   merges the two heaps;
//! - pattern matches against heap classes become calls to synthesized
//!   `unapply` extractors parameterized by the current heap.
//!
//! The pass is a pure input-to-output transformation over immutable trees:
//! it never mutates the input table, and its only shared state is a set of
//! set-once memoization caches.

pub mod effects;
pub mod expr_rewrite;
pub mod oracle;
pub mod pattern_rewrite;
pub mod preamble;
pub mod split;
pub mod type_rewrite;

use lang_ir::{
    ClassDef, ElabConfig, EffectLevel, Expr, FunDef, Reporter, SortDef, SymbolId, Symbols, Type,
    TypeAliasDef,
};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

/// Internal invariant violations. User-program errors never surface here;
/// they go through the [`Reporter`] and the pass keeps going.
#[derive(Debug, Error)]
pub enum ElabError {
    #[error("unknown symbol {0}")]
    UnknownSymbol(SymbolId),

    #[error("class hierarchy cycle involving `{name}`")]
    CyclicHierarchy { name: String },

    #[error("no shim was allocated for function {0}")]
    MissingShim(SymbolId),

    #[error("no unapply was allocated for class {0}")]
    MissingUnapply(SymbolId),
}

pub type ElabResult<T> = Result<T, ElabError>;

/// Allocator for globally fresh identifiers, seeded past the input table
#[derive(Debug)]
pub struct FreshIds {
    counter: u64,
}

impl FreshIds {
    #[must_use]
    pub fn new(start: SymbolId) -> Self {
        Self { counter: start.0 }
    }

    pub fn fresh(&mut self) -> SymbolId {
        let id = SymbolId(self.counter);
        self.counter += 1;
        id
    }
}

// Local binder ids live in a namespace derived from the definition being
// rewritten, so the output is independent of the order definitions are
// processed in. Assumes input definition ids below 2^24 and fewer than 2^16
// fresh binders per definition.
const LOCAL_BASE: u64 = 1 << 40;
const LOCAL_STRIDE: u64 = 1 << 16;

/// Allocator for binder ids local to one definition's rewrite
#[derive(Debug)]
pub struct LocalIds {
    counter: u64,
}

impl LocalIds {
    #[must_use]
    pub fn for_def(def: SymbolId) -> Self {
        Self {
            counter: LOCAL_BASE + def.0 * LOCAL_STRIDE,
        }
    }

    pub fn fresh(&mut self) -> SymbolId {
        let id = SymbolId(self.counter);
        self.counter += 1;
        id
    }
}

/// Identifiers of the support definitions installed by the preamble
#[derive(Debug, Clone)]
pub struct StdLib {
    pub heap_ref_sort: SymbolId,
    pub heap_ref_ctor: SymbolId,
    pub heap_ref_id_field: SymbolId,
    pub dummy_heap: SymbolId,
    pub dummy_heap_binder: SymbolId,
    pub option_sort: SymbolId,
    pub option_tparam: SymbolId,
    pub none_ctor: SymbolId,
    pub some_ctor: SymbolId,
    pub some_value_field: SymbolId,
    pub option_is_empty: SymbolId,
    pub is_empty_tparam: SymbolId,
    pub is_empty_param: SymbolId,
    pub option_get: SymbolId,
    pub get_tparam: SymbolId,
    pub get_param: SymbolId,
}

impl StdLib {
    fn allocate(fresh: &mut FreshIds) -> Self {
        Self {
            heap_ref_sort: fresh.fresh(),
            heap_ref_ctor: fresh.fresh(),
            heap_ref_id_field: fresh.fresh(),
            dummy_heap: fresh.fresh(),
            dummy_heap_binder: fresh.fresh(),
            option_sort: fresh.fresh(),
            option_tparam: fresh.fresh(),
            none_ctor: fresh.fresh(),
            some_ctor: fresh.fresh(),
            some_value_field: fresh.fresh(),
            option_is_empty: fresh.fresh(),
            is_empty_tparam: fresh.fresh(),
            is_empty_param: fresh.fresh(),
            option_get: fresh.fresh(),
            get_tparam: fresh.fresh(),
            get_param: fresh.fresh(),
        }
    }

    /// The opaque reference handle type
    #[must_use]
    pub fn heap_ref_type(&self) -> Type {
        Type::sort(self.heap_ref_sort)
    }

    /// The heap: a total map from references to class values
    #[must_use]
    pub fn heap_type(&self) -> Type {
        Type::map_of(self.heap_ref_type(), Type::Any)
    }

    /// A frame set
    #[must_use]
    pub fn heap_ref_set_type(&self) -> Type {
        Type::set_of(self.heap_ref_type())
    }

    #[must_use]
    pub fn option_type(&self, t: Type) -> Type {
        Type::Sort(self.option_sort, vec![t])
    }

    #[must_use]
    pub fn none(&self, t: Type) -> Expr {
        Expr::adt_ctor(self.none_ctor, vec![t], vec![])
    }

    #[must_use]
    pub fn some(&self, t: Type, value: Expr) -> Expr {
        Expr::adt_ctor(self.some_ctor, vec![t], vec![value])
    }

    /// A call to the `dummyHeap` constant
    #[must_use]
    pub fn dummy_heap_call(&self) -> Expr {
        Expr::call(self.dummy_heap, vec![], vec![])
    }
}

/// Per-invocation state of the elaboration pass.
///
/// Shim and unapply identifiers are assigned once at construction, walking
/// the table in id order, so the output is deterministic and independent of
/// the order definitions are later processed in. The memoization caches are
/// set-once maps: concurrent writers for the same key always agree because
/// the memoized computation is deterministic.
#[derive(Debug)]
pub struct ElabContext<'a> {
    pub symbols: &'a Symbols,
    pub config: &'a ElabConfig,
    pub reporter: &'a Reporter,
    pub lib: StdLib,
    pub(crate) heap_class_cache: RwLock<HashMap<SymbolId, bool>>,
    pub(crate) effect_cache: RwLock<HashMap<SymbolId, EffectLevel>>,
    shim_ids: HashMap<SymbolId, SymbolId>,
    unapply_ids: HashMap<SymbolId, SymbolId>,
}

impl<'a> ElabContext<'a> {
    pub fn new(
        symbols: &'a Symbols,
        config: &'a ElabConfig,
        reporter: &'a Reporter,
    ) -> ElabResult<Self> {
        let mut fresh = FreshIds::new(symbols.next_free_id());
        let lib = StdLib::allocate(&mut fresh);
        let mut ctx = Self {
            symbols,
            config,
            reporter,
            lib,
            heap_class_cache: RwLock::new(HashMap::new()),
            effect_cache: RwLock::new(HashMap::new()),
            shim_ids: HashMap::new(),
            unapply_ids: HashMap::new(),
        };

        let mut unapply_ids = HashMap::new();
        for (id, cd) in &symbols.classes {
            if cd.flags.is_any_heap_ref() {
                continue;
            }
            if ctx.is_heap_class(*id)? {
                unapply_ids.insert(*id, fresh.fresh());
            }
        }
        let mut shim_ids = HashMap::new();
        for (id, fd) in &symbols.functions {
            if fd.flags.is_ref_eq() {
                continue;
            }
            if ctx.effect_level_of(fd) != EffectLevel::Pure {
                shim_ids.insert(*id, fresh.fresh());
            }
        }
        ctx.unapply_ids = unapply_ids;
        ctx.shim_ids = shim_ids;
        Ok(ctx)
    }

    pub fn function(&self, id: SymbolId) -> ElabResult<&FunDef> {
        self.symbols.function(id).ok_or(ElabError::UnknownSymbol(id))
    }

    pub fn class(&self, id: SymbolId) -> ElabResult<&ClassDef> {
        self.symbols.class(id).ok_or(ElabError::UnknownSymbol(id))
    }

    /// The identifier of the shim synthesized for an effectful function
    pub fn shim_id(&self, id: SymbolId) -> ElabResult<SymbolId> {
        self.shim_ids.get(&id).copied().ok_or(ElabError::MissingShim(id))
    }

    /// The identifier of the unapply synthesized for a heap class
    pub fn unapply_id(&self, id: SymbolId) -> ElabResult<SymbolId> {
        self.unapply_ids
            .get(&id)
            .copied()
            .ok_or(ElabError::MissingUnapply(id))
    }

    /// Rewrite every definition of the input table
    pub fn elaborate(&self) -> ElabResult<Symbols> {
        let mut out = Symbols::new();

        for cd in self.symbols.classes.values() {
            if cd.flags.is_any_heap_ref() {
                debug!(class = %cd.name, "dropping heap marker class");
                continue;
            }
            let (rewritten, unapply) = self.extract_class(cd)?;
            out.add_class(rewritten);
            if let Some(fd) = unapply {
                out.add_function(fd);
            }
        }

        for fd in self.symbols.functions.values() {
            if fd.flags.is_ref_eq() {
                debug!(function = %fd.name, "dropping built-in reference equality");
                continue;
            }
            for out_fd in self.extract_function(fd)? {
                out.add_function(out_fd);
            }
        }

        for sd in self.symbols.sorts.values() {
            out.add_sort(self.extract_sort(sd)?);
        }
        for ad in self.symbols.aliases.values() {
            out.add_alias(self.extract_alias(ad)?);
        }

        preamble::install(self, &mut out);
        debug!(
            input = self.symbols.len(),
            output = out.len(),
            "heap elaboration finished"
        );
        Ok(out)
    }

    /// Rewrite one function into its output form(s): the definition itself
    /// for pure functions, an inner/shim pair for effectful ones.
    pub fn extract_function(&self, fd: &FunDef) -> ElabResult<Vec<FunDef>> {
        split::extract_function(self, fd)
    }

    /// Rewrite one class, along with its unapply extractor when the class is
    /// heap-resident.
    pub fn extract_class(&self, cd: &ClassDef) -> ElabResult<(ClassDef, Option<FunDef>)> {
        let rewritten = self.rewrite_class(cd)?;
        let unapply = if self.is_heap_class(cd.id)? {
            Some(pattern_rewrite::synthesize_unapply(self, cd)?)
        } else {
            None
        };
        Ok((rewritten, unapply))
    }

    pub fn extract_sort(&self, sd: &SortDef) -> ElabResult<SortDef> {
        self.rewrite_sort(sd)
    }

    pub fn extract_alias(&self, ad: &TypeAliasDef) -> ElabResult<TypeAliasDef> {
        self.rewrite_alias(ad)
    }

    /// Frame-condition assertion, collapsed to its continuation when
    /// `check-heap-contracts` is off
    pub(crate) fn check(&self, pred: Expr, message: &str, body: Expr) -> Expr {
        if self.config.check_heap_contracts {
            Expr::assert_in(pred, message, body)
        } else {
            body
        }
    }

    pub(crate) fn read_cache<K: Copy + Eq + std::hash::Hash, V: Copy>(
        cache: &RwLock<HashMap<K, V>>,
        key: K,
    ) -> Option<V> {
        cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    pub(crate) fn write_cache<K: Copy + Eq + std::hash::Hash, V: Copy>(
        cache: &RwLock<HashMap<K, V>>,
        key: K,
        value: V,
    ) {
        cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}

/// Main entry point: elaborate a full symbol table.
///
/// The returned table omits the heap marker class and every `refEq`-flagged
/// function, contains an inner/shim pair per effectful input function, and is
/// augmented with the `HeapRef` sort, `dummyHeap` and `Option` support.
pub fn run(
    symbols: &Symbols,
    config: &ElabConfig,
    reporter: &Reporter,
) -> ElabResult<Symbols> {
    debug!(definitions = symbols.len(), "running heap elaboration");
    let ctx = ElabContext::new(symbols, config, reporter)?;
    ctx.elaborate()
}
