//! Heap-class oracle
//!
//! Decides whether a type lives on the heap: a class is heap-resident iff it
//! is the `anyHeapRef` marker class itself or some transitive parent carries
//! the marker. Results are memoized per class; every other type shape
//! (functions, tuples, primitives, sorts) is a value type.

use crate::{ElabContext, ElabError, ElabResult};
use lang_ir::{SymbolId, Type};

impl ElabContext<'_> {
    /// True iff `tpe` denotes a heap-resident class
    pub fn is_heap_type(&self, tpe: &Type) -> ElabResult<bool> {
        match tpe {
            Type::Class(id, _) => self.is_heap_class(*id),
            _ => Ok(false),
        }
    }

    /// True iff the class or one of its transitive parents carries the
    /// `anyHeapRef` marker
    pub fn is_heap_class(&self, id: SymbolId) -> ElabResult<bool> {
        self.heap_class_walk(id, &mut Vec::new())
    }

    fn heap_class_walk(&self, id: SymbolId, visiting: &mut Vec<SymbolId>) -> ElabResult<bool> {
        if let Some(known) = Self::read_cache(&self.heap_class_cache, id) {
            return Ok(known);
        }
        // The frontend rules out cyclic hierarchies; report rather than loop
        // if a malformed table reaches us anyway.
        if visiting.contains(&id) {
            return Err(ElabError::CyclicHierarchy {
                name: self.class(id)?.name.clone(),
            });
        }

        let cd = self.class(id)?;
        visiting.push(id);
        let mut result = cd.flags.is_any_heap_ref();
        if !result {
            for parent in &cd.parents {
                if let Type::Class(pid, _) = parent {
                    if self.heap_class_walk(*pid, visiting)? {
                        result = true;
                        break;
                    }
                }
            }
        }
        visiting.pop();

        Self::write_cache(&self.heap_class_cache, id, result);
        Ok(result)
    }
}
