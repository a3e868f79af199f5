//! The type universe
//!
//! Types as produced by the frontend, extended with the abstract set and map
//! types the heap elaboration targets: after the pass, `Heap` is
//! `Map(HeapRef, Any)` and frame sets are `Set(HeapRef)`.

use crate::SymbolId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A type in the source or elaborated program
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Unit,
    Bool,
    Int,
    /// Top type of all class values; the codomain of the heap map
    Any,
    /// Class type with type arguments
    Class(SymbolId, Vec<Type>),
    /// Algebraic sort with type arguments
    Sort(SymbolId, Vec<Type>),
    /// Reference to a bound type parameter
    TypeParam(SymbolId),
    Tuple(Vec<Type>),
    Function(Vec<Type>, Box<Type>),
    /// Finite set
    Set(Box<Type>),
    /// Total map
    Map(Box<Type>, Box<Type>),
    /// Placeholder used when recovering from a user error
    Untyped,
}

impl Type {
    #[must_use]
    pub fn class(id: SymbolId) -> Self {
        Self::Class(id, vec![])
    }

    #[must_use]
    pub fn sort(id: SymbolId) -> Self {
        Self::Sort(id, vec![])
    }

    #[must_use]
    pub fn set_of(elem: Type) -> Self {
        Self::Set(Box::new(elem))
    }

    #[must_use]
    pub fn map_of(key: Type, value: Type) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Replace type-parameter references according to `subst`
    #[must_use]
    pub fn substituted(&self, subst: &HashMap<SymbolId, Type>) -> Type {
        match self {
            Self::TypeParam(id) => subst.get(id).cloned().unwrap_or_else(|| self.clone()),
            Self::Class(id, targs) => Self::Class(
                *id,
                targs.iter().map(|t| t.substituted(subst)).collect(),
            ),
            Self::Sort(id, targs) => Self::Sort(
                *id,
                targs.iter().map(|t| t.substituted(subst)).collect(),
            ),
            Self::Tuple(tps) => {
                Self::Tuple(tps.iter().map(|t| t.substituted(subst)).collect())
            }
            Self::Function(from, to) => Self::Function(
                from.iter().map(|t| t.substituted(subst)).collect(),
                Box::new(to.substituted(subst)),
            ),
            Self::Set(elem) => Self::Set(Box::new(elem.substituted(subst))),
            Self::Map(k, v) => Self::Map(
                Box::new(k.substituted(subst)),
                Box::new(v.substituted(subst)),
            ),
            Self::Unit | Self::Bool | Self::Int | Self::Any | Self::Untyped => self.clone(),
        }
    }

    /// True if a function type occurs anywhere inside this type
    #[must_use]
    pub fn contains_function(&self) -> bool {
        match self {
            Self::Function(..) => true,
            Self::Class(_, targs) | Self::Sort(_, targs) | Self::Tuple(targs) => {
                targs.iter().any(Type::contains_function)
            }
            Self::Set(elem) => elem.contains_function(),
            Self::Map(k, v) => k.contains_function() || v.contains_function(),
            Self::Unit
            | Self::Bool
            | Self::Int
            | Self::Any
            | Self::TypeParam(_)
            | Self::Untyped => false,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn args(f: &mut std::fmt::Formatter<'_>, targs: &[Type]) -> std::fmt::Result {
            if targs.is_empty() {
                return Ok(());
            }
            write!(f, "[")?;
            for (i, t) in targs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{t}")?;
            }
            write!(f, "]")
        }

        match self {
            Self::Unit => write!(f, "Unit"),
            Self::Bool => write!(f, "Bool"),
            Self::Int => write!(f, "Int"),
            Self::Any => write!(f, "Any"),
            Self::Class(id, targs) => {
                write!(f, "class{id}")?;
                args(f, targs)
            }
            Self::Sort(id, targs) => {
                write!(f, "sort{id}")?;
                args(f, targs)
            }
            Self::TypeParam(id) => write!(f, "tp{id}"),
            Self::Tuple(tps) => {
                write!(f, "(")?;
                for (i, t) in tps.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Self::Function(from, to) => {
                write!(f, "(")?;
                for (i, t) in from.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ") => {to}")
            }
            Self::Set(elem) => write!(f, "Set[{elem}]"),
            Self::Map(k, v) => write!(f, "Map[{k}, {v}]"),
            Self::Untyped => write!(f, "<untyped>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_replaces_params() {
        let tp = SymbolId(7);
        let t = Type::Tuple(vec![Type::TypeParam(tp), Type::Int]);
        let mut subst = HashMap::new();
        subst.insert(tp, Type::Bool);
        assert_eq!(t.substituted(&subst), Type::Tuple(vec![Type::Bool, Type::Int]));
    }

    #[test]
    fn test_contains_function_nested() {
        let t = Type::Set(Box::new(Type::Function(vec![Type::Int], Box::new(Type::Int))));
        assert!(t.contains_function());
        assert!(!Type::Set(Box::new(Type::Int)).contains_function());
    }

    #[test]
    fn test_display_map() {
        let t = Type::map_of(Type::sort(SymbolId(1)), Type::Any);
        assert_eq!(t.to_string(), "Map[sort#1, Any]");
    }
}
