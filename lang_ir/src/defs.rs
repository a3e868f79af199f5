//! Definitions: functions, classes, sorts, type aliases
//!
//! All definitions are immutable values. Passes build new definitions and
//! assemble them into a fresh symbol table.

use crate::{Expr, FunctionSpec, SourceSpan, SymbolId, Type, Variable};
use serde::{Deserialize, Serialize};

/// A definition-level marker flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    /// Marks the root marker-class whose descendants live on the heap
    AnyHeapRef,
    /// Marks a function whose body is the built-in reference equality
    RefEq,
    /// Definition was synthesized by a pass
    Synthetic,
    /// No verification conditions are generated inside this definition
    DropVcs,
    /// The inliner must inline this function exactly once per call site
    InlineOnce,
    /// The function is an extractor; `is_empty`/`get` destructure its result
    IsUnapply { is_empty: SymbolId, get: SymbolId },
}

/// The flag set attached to a definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags(pub Vec<Flag>);

impl Flags {
    #[must_use]
    pub fn new(flags: Vec<Flag>) -> Self {
        Self(flags)
    }

    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    /// Add a flag unless an equal one is already present
    pub fn add(&mut self, flag: Flag) {
        if !self.contains(&flag) {
            self.0.push(flag);
        }
    }

    /// Union of two flag sets, keeping this set's order
    #[must_use]
    pub fn union(&self, other: &Flags) -> Flags {
        let mut out = self.clone();
        for f in &other.0 {
            out.add(f.clone());
        }
        out
    }

    #[must_use]
    pub fn is_any_heap_ref(&self) -> bool {
        self.contains(&Flag::AnyHeapRef)
    }

    #[must_use]
    pub fn is_ref_eq(&self) -> bool {
        self.contains(&Flag::RefEq)
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.contains(&Flag::Synthetic)
    }

    #[must_use]
    pub fn is_unapply(&self) -> bool {
        self.0.iter().any(|f| matches!(f, Flag::IsUnapply { .. }))
    }
}

/// A declared type parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParamDef {
    pub id: SymbolId,
    pub name: String,
}

impl TypeParamDef {
    #[must_use]
    pub fn new(id: SymbolId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The type referring to this parameter
    #[must_use]
    pub fn to_type(&self) -> Type {
        Type::TypeParam(self.id)
    }
}

/// A function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunDef {
    pub id: SymbolId,
    pub name: String,
    pub tparams: Vec<TypeParamDef>,
    pub params: Vec<Variable>,
    pub return_type: Type,
    pub body: Expr,
    pub spec: FunctionSpec,
    pub flags: Flags,
    pub span: SourceSpan,
}

/// A class definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: SymbolId,
    pub name: String,
    pub tparams: Vec<TypeParamDef>,
    /// Parent class types
    pub parents: Vec<Type>,
    pub fields: Vec<Variable>,
    pub flags: Flags,
    pub span: SourceSpan,
}

impl ClassDef {
    /// The class type applied to its own parameters
    #[must_use]
    pub fn self_type(&self) -> Type {
        Type::Class(self.id, self.tparams.iter().map(TypeParamDef::to_type).collect())
    }
}

/// One constructor of an algebraic sort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDef {
    pub id: SymbolId,
    pub name: String,
    pub fields: Vec<Variable>,
}

/// An algebraic sort definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortDef {
    pub id: SymbolId,
    pub name: String,
    pub tparams: Vec<TypeParamDef>,
    pub constructors: Vec<ConstructorDef>,
    pub flags: Flags,
    pub span: SourceSpan,
}

/// A type alias definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDef {
    pub id: SymbolId,
    pub name: String,
    pub tparams: Vec<TypeParamDef>,
    pub body: Type,
    pub flags: Flags,
    pub span: SourceSpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_add_is_idempotent() {
        let mut flags = Flags::default();
        flags.add(Flag::Synthetic);
        flags.add(Flag::Synthetic);
        assert_eq!(flags.0.len(), 1);
    }

    #[test]
    fn test_flags_union_keeps_order() {
        let a = Flags::new(vec![Flag::Synthetic, Flag::DropVcs]);
        let b = Flags::new(vec![Flag::DropVcs, Flag::InlineOnce]);
        let u = a.union(&b);
        assert_eq!(
            u.0,
            vec![Flag::Synthetic, Flag::DropVcs, Flag::InlineOnce]
        );
    }

    #[test]
    fn test_is_unapply_matches_payload() {
        let flags = Flags::new(vec![Flag::IsUnapply {
            is_empty: SymbolId(1),
            get: SymbolId(2),
        }]);
        assert!(flags.is_unapply());
        assert!(!flags.is_any_heap_ref());
    }
}
