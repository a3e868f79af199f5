//! Specification clauses and effect levels
//!
//! A function's contract: frame clauses (`reads`, `modifies`), pre- and
//! postconditions, and the termination measure. The effect level of a
//! function is derived purely from the presence of its frame clauses.

use crate::{Expr, Variable};
use serde::{Deserialize, Serialize};

/// A postcondition: a predicate over the result binder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensures {
    pub binder: Variable,
    pub pred: Expr,
}

impl Ensures {
    #[must_use]
    pub fn new(binder: Variable, pred: Expr) -> Self {
        Self { binder, pred }
    }
}

/// The specification attached to a function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// `reads R`: the set of references the body may observe
    pub reads: Option<Expr>,
    /// `modifies M`: the set of references the body may mutate
    pub modifies: Option<Expr>,
    /// Preconditions
    pub requires: Vec<Expr>,
    /// Postconditions
    pub ensures: Vec<Ensures>,
    /// Termination measure
    pub decreases: Option<Expr>,
}

impl FunctionSpec {
    /// Derive the effect level from the frame clauses.
    ///
    /// A `modifies` clause implies `reads`.
    #[must_use]
    pub fn effect_level(&self) -> EffectLevel {
        if self.modifies.is_some() {
            EffectLevel::ReadsWrites
        } else if self.reads.is_some() {
            EffectLevel::Reads
        } else {
            EffectLevel::Pure
        }
    }
}

/// How a function interacts with the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectLevel {
    Pure,
    Reads,
    ReadsWrites,
}

impl EffectLevel {
    /// True if the function observes the heap
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Reads | Self::ReadsWrites)
    }

    /// True if the function mutates the heap
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::ReadsWrites)
    }
}

impl std::fmt::Display for EffectLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pure => "pure",
            Self::Reads => "reads",
            Self::ReadsWrites => "reads+writes",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SymbolId, Type};

    #[test]
    fn test_effect_level_from_clauses() {
        let mut spec = FunctionSpec::default();
        assert_eq!(spec.effect_level(), EffectLevel::Pure);

        spec.reads = Some(Expr::empty_set(Type::Int));
        assert_eq!(spec.effect_level(), EffectLevel::Reads);

        spec.modifies = Some(Expr::empty_set(Type::Int));
        assert_eq!(spec.effect_level(), EffectLevel::ReadsWrites);
    }

    #[test]
    fn test_modifies_implies_reads() {
        let spec = FunctionSpec {
            modifies: Some(Expr::empty_set(Type::Int)),
            ..FunctionSpec::default()
        };
        assert!(spec.effect_level().reads());
        assert!(spec.effect_level().writes());
    }

    #[test]
    fn test_ensures_binder() {
        let res = Variable::new(SymbolId(9), "res", Type::Int);
        let post = Ensures::new(res.clone(), Expr::var(res).equals(Expr::int(0)));
        assert_eq!(post.binder.name, "res");
    }
}
