//! Type rewriting
//!
//! Replaces every heap-class type by the opaque `HeapRef` handle and
//! recursively rewrites all other type shapes. Also rewrites class, sort and
//! type-alias declarations: a heap class loses the marker from its parent
//! list and keeps its own identity, since the dynamic class value stored in
//! the heap is still described by the class.
//!
//! The rewriter is idempotent: heap-class types never survive a rewrite, so
//! a second application finds nothing to replace.

use crate::{ElabContext, ElabResult};
use lang_ir::{ClassDef, SortDef, Type, TypeAliasDef, Variable};

impl ElabContext<'_> {
    pub fn rewrite_type(&self, tpe: &Type) -> ElabResult<Type> {
        if self.is_heap_type(tpe)? {
            return Ok(self.lib.heap_ref_type());
        }
        Ok(match tpe {
            Type::Class(id, targs) => Type::Class(*id, self.rewrite_types(targs)?),
            Type::Sort(id, targs) => Type::Sort(*id, self.rewrite_types(targs)?),
            Type::Tuple(tps) => Type::Tuple(self.rewrite_types(tps)?),
            Type::Function(from, to) => Type::Function(
                self.rewrite_types(from)?,
                Box::new(self.rewrite_type(to)?),
            ),
            Type::Set(elem) => Type::Set(Box::new(self.rewrite_type(elem)?)),
            Type::Map(k, v) => Type::Map(
                Box::new(self.rewrite_type(k)?),
                Box::new(self.rewrite_type(v)?),
            ),
            Type::Unit
            | Type::Bool
            | Type::Int
            | Type::Any
            | Type::TypeParam(_)
            | Type::Untyped => tpe.clone(),
        })
    }

    pub fn rewrite_types(&self, tps: &[Type]) -> ElabResult<Vec<Type>> {
        tps.iter().map(|t| self.rewrite_type(t)).collect()
    }

    /// Same binder with its type rewritten
    pub fn rewrite_var(&self, v: &Variable) -> ElabResult<Variable> {
        Ok(v.with_type(self.rewrite_type(&v.tpe)?))
    }

    /// A class type whose head is kept but whose arguments are rewritten.
    ///
    /// Used where the class identity itself is wanted (parent lists, the
    /// dynamic type stored in the heap), not the handle that replaces it.
    pub fn rewrite_class_type(&self, tpe: &Type) -> ElabResult<Type> {
        match tpe {
            Type::Class(id, targs) => Ok(Type::Class(*id, self.rewrite_types(targs)?)),
            other => self.rewrite_type(other),
        }
    }

    pub fn rewrite_class(&self, cd: &ClassDef) -> ElabResult<ClassDef> {
        let is_heap = self.is_heap_class(cd.id)?;

        let mut parents = Vec::with_capacity(cd.parents.len());
        for parent in &cd.parents {
            if let Type::Class(pid, _) = parent {
                if self.class(*pid)?.flags.is_any_heap_ref() {
                    continue;
                }
            }
            parents.push(self.rewrite_class_type(parent)?);
        }

        let mut fields = Vec::with_capacity(cd.fields.len());
        for field in &cd.fields {
            if is_heap && field.tpe.contains_function() {
                self.reporter.error(
                    cd.span.clone(),
                    "Cannot use heap-accessing construct (function-valued field) here",
                );
            }
            fields.push(self.rewrite_var(field)?);
        }

        Ok(ClassDef {
            id: cd.id,
            name: cd.name.clone(),
            tparams: cd.tparams.clone(),
            parents,
            fields,
            flags: cd.flags.clone(),
            span: cd.span.clone(),
        })
    }

    pub fn rewrite_sort(&self, sd: &SortDef) -> ElabResult<SortDef> {
        let mut constructors = Vec::with_capacity(sd.constructors.len());
        for ctor in &sd.constructors {
            let fields = ctor
                .fields
                .iter()
                .map(|f| self.rewrite_var(f))
                .collect::<ElabResult<Vec<_>>>()?;
            constructors.push(lang_ir::ConstructorDef {
                id: ctor.id,
                name: ctor.name.clone(),
                fields,
            });
        }
        Ok(SortDef {
            id: sd.id,
            name: sd.name.clone(),
            tparams: sd.tparams.clone(),
            constructors,
            flags: sd.flags.clone(),
            span: sd.span.clone(),
        })
    }

    pub fn rewrite_alias(&self, ad: &TypeAliasDef) -> ElabResult<TypeAliasDef> {
        Ok(TypeAliasDef {
            id: ad.id,
            name: ad.name.clone(),
            tparams: ad.tparams.clone(),
            body: self.rewrite_type(&ad.body)?,
            flags: ad.flags.clone(),
            span: ad.span.clone(),
        })
    }
}
