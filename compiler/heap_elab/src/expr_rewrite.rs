//! Expression rewriting
//!
//! The core term transformer. It walks an expression under an environment
//! carrying the current heap binding and the reads/modifies frame bounds and
//! compiles every heap-touching form into explicit map operations, inserting
//! frame-condition assertions along the way.
//!
//! On a user error (heap use without the matching clause) the rewriter
//! reports through the reporter and keeps going with a dummy binding, so one
//! run surfaces every error in the program.

use crate::{ElabContext, ElabResult, LocalIds};
use lang_ir::{
    EffectLevel, Expr, ExprKind, MatchCase, SourceSpan, SymbolId, Type, Variable,
};
use std::collections::HashMap;
use tracing::trace;

/// Bound on a frame: either every access is allowed, or accesses are
/// restricted to the set denoted by a variable.
#[derive(Debug, Clone)]
pub enum FrameBound {
    Unrestricted,
    Restricted(Variable),
}

/// Environment of the rewrite: which heap the code runs in, and what it may
/// read and write. An absent binding means the corresponding capability is
/// not available at all.
#[derive(Debug, Clone, Default)]
pub struct RewriteEnv {
    pub heap: Option<Variable>,
    pub reads: Option<FrameBound>,
    pub modifies: Option<FrameBound>,
    /// Heap to evaluate `old(..)` in; only set inside postconditions
    pub pre_heap: Option<Variable>,
}

impl RewriteEnv {
    /// No heap access at all (pure functions)
    #[must_use]
    pub fn pure() -> Self {
        Self::default()
    }

    /// Body of an effectful function
    #[must_use]
    pub fn body(heap: Variable, reads: FrameBound, modifies: Option<FrameBound>) -> Self {
        Self {
            heap: Some(heap),
            reads: Some(reads),
            modifies,
            pre_heap: None,
        }
    }

    /// Spec clause translation: reads allowed everywhere, no writes
    #[must_use]
    pub fn spec(heap: Variable) -> Self {
        Self {
            heap: Some(heap),
            reads: Some(FrameBound::Unrestricted),
            modifies: None,
            pre_heap: None,
        }
    }

    /// Postcondition translation: `heap` is the post-state, `pre` the
    /// pre-state seen by `old(..)`
    #[must_use]
    pub fn post(heap: Variable, pre: Variable) -> Self {
        Self {
            pre_heap: Some(pre),
            ..Self::spec(heap)
        }
    }
}

impl ElabContext<'_> {
    /// Membership assertion against a frame bound, collapsed when the bound
    /// is unrestricted or contract checking is off
    pub(crate) fn check_elem(
        &self,
        bound: &FrameBound,
        elem: Expr,
        message: &str,
        body: Expr,
    ) -> Expr {
        match bound {
            FrameBound::Unrestricted => body,
            FrameBound::Restricted(set) => {
                self.check(elem.elem_of(Expr::var(set.clone())), message, body)
            }
        }
    }
}

/// Term transformer for one definition's worth of rewriting
pub struct Rewriter<'a, 'b> {
    pub(crate) ctx: &'a ElabContext<'b>,
    locals: LocalIds,
}

impl<'a, 'b> Rewriter<'a, 'b> {
    #[must_use]
    pub fn new(ctx: &'a ElabContext<'b>, def: SymbolId) -> Self {
        Self {
            ctx,
            locals: LocalIds::for_def(def),
        }
    }

    pub(crate) fn fresh_var(&mut self, name: &str, tpe: Type) -> Variable {
        Variable::new(self.locals.fresh(), name, tpe)
    }

    /// The current heap variable, or a dummy binding after an error so that
    /// rewriting can continue
    pub(crate) fn heap_or_dummy(&mut self, env: &RewriteEnv) -> Variable {
        match &env.heap {
            Some(h) => h.clone(),
            None => self.fresh_var("heap", self.ctx.lib.heap_type()),
        }
    }

    pub(crate) fn expect_reads(
        &mut self,
        env: &RewriteEnv,
        span: &SourceSpan,
        usage: &str,
    ) -> FrameBound {
        match &env.reads {
            Some(bound) => bound.clone(),
            None => {
                self.ctx
                    .reporter
                    .error(span.clone(), format!("Cannot {usage} without a reads clause"));
                FrameBound::Unrestricted
            }
        }
    }

    pub(crate) fn expect_modifies(
        &mut self,
        env: &RewriteEnv,
        span: &SourceSpan,
        usage: &str,
    ) -> FrameBound {
        match &env.modifies {
            Some(bound) => bound.clone(),
            None => {
                let message = if env.reads.is_some() {
                    "Can't modify heap in read-only context".to_string()
                } else {
                    format!("Cannot {usage} without a modifies clause")
                };
                self.ctx.reporter.error(span.clone(), message);
                FrameBound::Unrestricted
            }
        }
    }

    /// The frame set passed to a shim: the current set, or the empty set in
    /// an unrestricted context
    fn frame_arg(&self, bound: &FrameBound) -> Expr {
        match bound {
            FrameBound::Restricted(v) => Expr::var(v.clone()),
            FrameBound::Unrestricted => Expr::empty_set(self.ctx.lib.heap_ref_type()),
        }
    }

    fn boxed(&mut self, env: &RewriteEnv, e: &Expr) -> ElabResult<Box<Expr>> {
        Ok(Box::new(self.rewrite(env, e)?))
    }

    fn rewrite_all(&mut self, env: &RewriteEnv, exprs: &[Expr]) -> ElabResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            out.push(self.rewrite(env, e)?);
        }
        Ok(out)
    }

    /// Rewrite one expression under the given environment
    pub fn rewrite(&mut self, env: &RewriteEnv, e: &Expr) -> ElabResult<Expr> {
        let span = e.span.clone();
        match &e.kind {
            ExprKind::UnitLit | ExprKind::BoolLit(_) | ExprKind::IntLit(_) => Ok(e.clone()),

            ExprKind::Var(v) => Ok(Expr::var(self.ctx.rewrite_var(v)?).at(span)),

            // Left untouched except inside postconditions, where the
            // environment carries the pre-state heap to evaluate it in.
            ExprKind::Old(inner) => match env.pre_heap.clone() {
                Some(pre) => {
                    let mut pre_env = env.clone();
                    pre_env.heap = Some(pre);
                    pre_env.pre_heap = None;
                    pre_env.modifies = None;
                    self.rewrite(&pre_env, inner)
                }
                None => Ok(Expr::new(ExprKind::Old(self.boxed(env, inner)?)).at(span)),
            },

            ExprKind::Let { binder, value, body } => Ok(Expr::let_in(
                self.ctx.rewrite_var(binder)?,
                self.rewrite(env, value)?,
                self.rewrite(env, body)?,
            )
            .at(span)),

            ExprKind::LetVar { binder, value, body } => Ok(Expr::let_var(
                self.ctx.rewrite_var(binder)?,
                self.rewrite(env, value)?,
                self.rewrite(env, body)?,
            )
            .at(span)),

            ExprKind::Assign { target, value } => Ok(Expr::assign(
                self.ctx.rewrite_var(target)?,
                self.rewrite(env, value)?,
            )
            .at(span)),

            ExprKind::Block { exprs, last } => Ok(Expr::block(
                self.rewrite_all(env, exprs)?,
                self.rewrite(env, last)?,
            )
            .at(span)),

            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => Ok(Expr::ite(
                self.rewrite(env, cond)?,
                self.rewrite(env, then_branch)?,
                self.rewrite(env, else_branch)?,
            )
            .at(span)),

            ExprKind::Match { scrutinee, cases } => {
                let scrutinee = self.boxed(env, scrutinee)?;
                let mut out_cases = Vec::with_capacity(cases.len());
                for case in cases {
                    out_cases.push(MatchCase {
                        pattern: self.rewrite_pattern(env, &case.pattern)?,
                        guard: match &case.guard {
                            Some(g) => Some(self.rewrite(env, g)?),
                            None => None,
                        },
                        rhs: self.rewrite(env, &case.rhs)?,
                    });
                }
                Ok(Expr::new(ExprKind::Match {
                    scrutinee,
                    cases: out_cases,
                })
                .at(span))
            }

            ExprKind::Lambda { params, body } => {
                let params = params
                    .iter()
                    .map(|p| self.ctx.rewrite_var(p))
                    .collect::<ElabResult<Vec<_>>>()?;
                Ok(Expr::new(ExprKind::Lambda {
                    params,
                    body: self.boxed(env, body)?,
                })
                .at(span))
            }

            ExprKind::Choose { binder, pred } => Ok(Expr::choose(
                self.ctx.rewrite_var(binder)?,
                self.rewrite(env, pred)?,
            )
            .at(span)),

            ExprKind::Assert {
                pred,
                message,
                body,
            } => Ok(Expr::new(ExprKind::Assert {
                pred: self.boxed(env, pred)?,
                message: message.clone(),
                body: self.boxed(env, body)?,
            })
            .at(span)),

            ExprKind::Assume { pred, body } => Ok(Expr::assume_in(
                self.rewrite(env, pred)?,
                self.rewrite(env, body)?,
            )
            .at(span)),

            ExprKind::FunCall { fun, targs, args } => self.rewrite_call(env, span, *fun, targs, args),

            ExprKind::ClassCtor { class, targs, args } => {
                let targs = self.ctx.rewrite_types(targs)?;
                let args = self.rewrite_all(env, args)?;
                if !self.ctx.is_heap_class(*class)? {
                    return Ok(Expr::class_ctor(*class, targs, args).at(span));
                }
                // Allocation: pick an unconstrained fresh reference and
                // update the heap there. Aliasing with existing references
                // is ruled out by later analyses, not here.
                self.expect_modifies(env, &span, "allocate a heap object");
                let heap = self.heap_or_dummy(env);
                let chosen = self.fresh_var("r", self.ctx.lib.heap_ref_type());
                let refv = self.fresh_var("ref", self.ctx.lib.heap_ref_type());
                let value = Expr::class_ctor(*class, targs, args);
                let update = Expr::assign(
                    heap.clone(),
                    Expr::var(heap).map_updated(Expr::var(refv.clone()), value),
                );
                Ok(Expr::let_in(
                    refv.clone(),
                    Expr::choose(chosen, Expr::bool_lit(true)),
                    Expr::block(vec![update], Expr::var(refv)),
                )
                .at(span))
            }

            ExprKind::FieldSelect {
                object,
                class,
                targs,
                field,
            } => {
                let targs2 = self.ctx.rewrite_types(targs)?;
                let object2 = self.rewrite(env, object)?;
                if !self.ctx.is_heap_class(*class)? {
                    return Ok(Expr::new(ExprKind::FieldSelect {
                        object: Box::new(object2),
                        class: *class,
                        targs: targs2,
                        field: *field,
                    })
                    .at(span));
                }
                let bound = self.expect_reads(env, &span, "read from heap object");
                let heap = self.heap_or_dummy(env);
                let ct = Type::Class(*class, targs2.clone());
                let refv = self.fresh_var("obj", self.ctx.lib.heap_ref_type());
                let valv = self.fresh_var("val", Type::Any);
                let select = Expr::new(ExprKind::FieldSelect {
                    object: Box::new(Expr::var(valv.clone()).as_instance_of(ct.clone())),
                    class: *class,
                    targs: targs2,
                    field: *field,
                });
                // The stored value is known to have the receiver's class.
                let read = Expr::let_in(
                    valv.clone(),
                    Expr::var(heap).map_apply(Expr::var(refv.clone())),
                    Expr::assume_in(Expr::var(valv).is_instance_of(ct), select),
                );
                let checked = self.ctx.check_elem(
                    &bound,
                    Expr::var(refv.clone()),
                    "heap reference not in the reads set",
                    read,
                );
                Ok(Expr::let_in(refv, object2, checked).at(span))
            }

            ExprKind::FieldAssign {
                object,
                class,
                targs,
                field,
                value,
            } => {
                let targs2 = self.ctx.rewrite_types(targs)?;
                let object2 = self.rewrite(env, object)?;
                let value2 = self.rewrite(env, value)?;
                if !self.ctx.is_heap_class(*class)? {
                    return Ok(Expr::new(ExprKind::FieldAssign {
                        object: Box::new(object2),
                        class: *class,
                        targs: targs2,
                        field: *field,
                        value: Box::new(value2),
                    })
                    .at(span));
                }
                let bound = self.expect_modifies(env, &span, "write to heap object");
                let heap = self.heap_or_dummy(env);
                let ct = Type::Class(*class, targs2.clone());
                let cd = self.ctx.class(*class)?;
                let declared = cd
                    .fields
                    .iter()
                    .find(|f| f.id == *field)
                    .ok_or(crate::ElabError::UnknownSymbol(*field))?;
                let subst: HashMap<SymbolId, Type> = cd
                    .tparams
                    .iter()
                    .map(|tp| tp.id)
                    .zip(targs2.iter().cloned())
                    .collect();
                let field_tpe = self.ctx.rewrite_type(&declared.tpe)?.substituted(&subst);

                let refv = self.fresh_var("obj", self.ctx.lib.heap_ref_type());
                let updv = self.fresh_var("upd", field_tpe);
                let valv = self.fresh_var("val", Type::Any);

                // The replacement object keeps every other field of the old
                // value.
                let mut ctor_args = Vec::with_capacity(cd.fields.len());
                for fld in &cd.fields {
                    if fld.id == *field {
                        ctor_args.push(Expr::var(updv.clone()));
                    } else {
                        ctor_args.push(Expr::new(ExprKind::FieldSelect {
                            object: Box::new(
                                Expr::var(valv.clone()).as_instance_of(ct.clone()),
                            ),
                            class: *class,
                            targs: targs2.clone(),
                            field: fld.id,
                        }));
                    }
                }
                let replacement = Expr::class_ctor(*class, targs2, ctor_args);
                let update = Expr::assign(
                    heap.clone(),
                    Expr::var(heap.clone()).map_updated(Expr::var(refv.clone()), replacement),
                );
                // The membership assertion comes after the update, so the
                // state effect is visible even when the assertion fails.
                let after = self.ctx.check_elem(
                    &bound,
                    Expr::var(refv.clone()),
                    "heap reference not in the modifies set",
                    Expr::unit(),
                );
                Ok(Expr::let_in(
                    refv.clone(),
                    object2,
                    Expr::let_in(
                        updv,
                        value2,
                        Expr::let_in(
                            valv.clone(),
                            Expr::var(heap).map_apply(Expr::var(refv)),
                            Expr::assume_in(
                                Expr::var(valv).is_instance_of(ct),
                                Expr::block(vec![update], after),
                            ),
                        ),
                    ),
                )
                .at(span))
            }

            ExprKind::RefEq { lhs, rhs } => Ok(Expr::new(ExprKind::Equals(
                self.boxed(env, lhs)?,
                self.boxed(env, rhs)?,
            ))
            .at(span)),

            ExprKind::ObjectIdentity(obj) => Ok(self
                .rewrite(env, obj)?
                .adt_select(self.ctx.lib.heap_ref_id_field)
                .at(span)),

            ExprKind::IsInstanceOf { expr, tpe } => {
                if let Type::Class(cid, ctargs) = tpe {
                    if self.ctx.is_heap_class(*cid)? {
                        let bound =
                            self.expect_reads(env, &span, "test the type of a heap object");
                        let heap = self.heap_or_dummy(env);
                        let object2 = self.rewrite(env, expr)?;
                        let ct = Type::Class(*cid, self.ctx.rewrite_types(ctargs)?);
                        let refv = self.fresh_var("obj", self.ctx.lib.heap_ref_type());
                        let test = Expr::var(heap)
                            .map_apply(Expr::var(refv.clone()))
                            .is_instance_of(ct);
                        let checked = self.ctx.check_elem(
                            &bound,
                            Expr::var(refv.clone()),
                            "heap reference not in the reads set",
                            test,
                        );
                        return Ok(Expr::let_in(refv, object2, checked).at(span));
                    }
                }
                Ok(Expr::new(ExprKind::IsInstanceOf {
                    expr: self.boxed(env, expr)?,
                    tpe: self.ctx.rewrite_type(tpe)?,
                })
                .at(span))
            }

            ExprKind::AsInstanceOf { expr, tpe } => Ok(Expr::new(ExprKind::AsInstanceOf {
                expr: self.boxed(env, expr)?,
                tpe: self.ctx.rewrite_type(tpe)?,
            })
            .at(span)),

            ExprKind::AdtCtor { ctor, targs, args } => Ok(Expr::adt_ctor(
                *ctor,
                self.ctx.rewrite_types(targs)?,
                self.rewrite_all(env, args)?,
            )
            .at(span)),

            ExprKind::AdtSelect { expr, field } => Ok(Expr::new(ExprKind::AdtSelect {
                expr: self.boxed(env, expr)?,
                field: *field,
            })
            .at(span)),

            ExprKind::IsCtor { expr, ctor } => Ok(Expr::new(ExprKind::IsCtor {
                expr: self.boxed(env, expr)?,
                ctor: *ctor,
            })
            .at(span)),

            ExprKind::Equals(l, r) => Ok(Expr::new(ExprKind::Equals(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),
            ExprKind::Not(x) => Ok(Expr::new(ExprKind::Not(self.boxed(env, x)?)).at(span)),
            ExprKind::And(l, r) => Ok(Expr::new(ExprKind::And(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),
            ExprKind::Or(l, r) => Ok(Expr::new(ExprKind::Or(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),
            ExprKind::Implies(l, r) => Ok(Expr::new(ExprKind::Implies(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),
            ExprKind::Plus(l, r) => Ok(Expr::new(ExprKind::Plus(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),
            ExprKind::Minus(l, r) => Ok(Expr::new(ExprKind::Minus(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),

            ExprKind::Tuple(es) => Ok(Expr::tuple(self.rewrite_all(env, es)?).at(span)),

            ExprKind::TupleSelect { tuple, index } => Ok(Expr::new(ExprKind::TupleSelect {
                tuple: self.boxed(env, tuple)?,
                index: *index,
            })
            .at(span)),

            ExprKind::FiniteSet { elems, elem_tpe } => Ok(Expr::finite_set(
                self.rewrite_all(env, elems)?,
                self.ctx.rewrite_type(elem_tpe)?,
            )
            .at(span)),

            ExprKind::SetUnion(l, r) => Ok(Expr::new(ExprKind::SetUnion(
                self.boxed(env, l)?,
                self.boxed(env, r)?,
            ))
            .at(span)),

            ExprKind::ElementOfSet { elem, set } => Ok(Expr::new(ExprKind::ElementOfSet {
                elem: self.boxed(env, elem)?,
                set: self.boxed(env, set)?,
            })
            .at(span)),

            ExprKind::SubsetOf { lhs, rhs } => Ok(Expr::new(ExprKind::SubsetOf {
                lhs: self.boxed(env, lhs)?,
                rhs: self.boxed(env, rhs)?,
            })
            .at(span)),

            ExprKind::MapApply { map, key } => Ok(Expr::new(ExprKind::MapApply {
                map: self.boxed(env, map)?,
                key: self.boxed(env, key)?,
            })
            .at(span)),

            ExprKind::MapUpdated { map, key, value } => Ok(Expr::new(ExprKind::MapUpdated {
                map: self.boxed(env, map)?,
                key: self.boxed(env, key)?,
                value: self.boxed(env, value)?,
            })
            .at(span)),

            ExprKind::MapMerge { mask, left, right } => Ok(Expr::new(ExprKind::MapMerge {
                mask: self.boxed(env, mask)?,
                left: self.boxed(env, left)?,
                right: self.boxed(env, right)?,
            })
            .at(span)),
        }
    }

    /// Rewrite a call: pure callees are kept, effectful callees are routed
    /// through their shim with the caller's frame sets prepended.
    fn rewrite_call(
        &mut self,
        env: &RewriteEnv,
        span: SourceSpan,
        fun: SymbolId,
        targs: &[Type],
        args: &[Expr],
    ) -> ElabResult<Expr> {
        let level = self.ctx.effect_level(fun)?;
        let targs2 = self.ctx.rewrite_types(targs)?;
        let args2 = self.rewrite_all(env, args)?;
        trace!(callee = %fun, ?level, "rewriting call");

        match level {
            EffectLevel::Pure => Ok(Expr::call(fun, targs2, args2).at(span)),

            EffectLevel::Reads => {
                let bound = self.expect_reads(env, &span, "call a heap-reading function");
                let heap = self.heap_or_dummy(env);
                let mut call_args = vec![Expr::var(heap), self.frame_arg(&bound)];
                call_args.extend(args2);
                Ok(Expr::call(self.ctx.shim_id(fun)?, targs2, call_args).at(span))
            }

            EffectLevel::ReadsWrites => {
                let modifies_bound =
                    self.expect_modifies(env, &span, "call a heap-updating function");
                let reads_bound = env.reads.clone().unwrap_or(FrameBound::Unrestricted);
                let heap = self.heap_or_dummy(env);

                let callee = self.ctx.function(fun)?;
                let subst: HashMap<SymbolId, Type> = callee
                    .tparams
                    .iter()
                    .map(|tp| tp.id)
                    .zip(targs2.iter().cloned())
                    .collect();
                let value_tpe = self
                    .ctx
                    .rewrite_type(&callee.return_type)?
                    .substituted(&subst);
                let pair = self.fresh_var(
                    "res",
                    Type::Tuple(vec![value_tpe, self.ctx.lib.heap_type()]),
                );

                let mut call_args = vec![
                    Expr::var(heap.clone()),
                    self.frame_arg(&reads_bound),
                    self.frame_arg(&modifies_bound),
                ];
                call_args.extend(args2);
                let call = Expr::call(self.ctx.shim_id(fun)?, targs2, call_args);

                // Bind the (result, heap') pair, commit the new heap, and
                // evaluate to the result.
                let commit = Expr::assign(heap, Expr::var(pair.clone()).tuple_select(1));
                Ok(Expr::let_in(
                    pair.clone(),
                    call,
                    Expr::block(vec![commit], Expr::var(pair).tuple_select(0)),
                )
                .at(span))
            }
        }
    }
}
