//! Pattern rewriting and unapply synthesis
//!
//! A class pattern against a heap class cannot match the reference directly:
//! the matched value lives in the heap. Such patterns become extractor
//! patterns calling the class's synthesized `unapply` function, which takes
//! the current heap and an optional reads domain, and returns `Some` of the
//! stored value when it has the expected class.

use crate::{ElabContext, ElabResult, LocalIds};
use lang_ir::{
    ClassDef, Expr, Flag, Flags, FunctionSpec, Pattern, SourceSpan, FunDef, Type,
    TypeParamDef, Variable,
};

use crate::expr_rewrite::{FrameBound, RewriteEnv, Rewriter};

impl Rewriter<'_, '_> {
    /// Rewrite one pattern under the current environment
    pub fn rewrite_pattern(&mut self, env: &RewriteEnv, pat: &Pattern) -> ElabResult<Pattern> {
        match pat {
            Pattern::Wildcard { binder, span } => Ok(Pattern::Wildcard {
                binder: self.rewrite_opt_var(binder)?,
                span: span.clone(),
            }),

            Pattern::Literal { value, span } => Ok(Pattern::Literal {
                value: self.rewrite(env, value)?,
                span: span.clone(),
            }),

            Pattern::Tuple { binder, sub, span } => Ok(Pattern::Tuple {
                binder: self.rewrite_opt_var(binder)?,
                sub: self.rewrite_patterns(env, sub)?,
                span: span.clone(),
            }),

            Pattern::Class {
                binder,
                tpe,
                sub,
                span,
            } => {
                if let Type::Class(cid, ctargs) = tpe {
                    if self.ctx.is_heap_class(*cid)? {
                        return self.rewrite_heap_pattern(env, binder, *cid, ctargs, sub, span);
                    }
                }
                Ok(Pattern::Class {
                    binder: self.rewrite_opt_var(binder)?,
                    tpe: self.ctx.rewrite_type(tpe)?,
                    sub: self.rewrite_patterns(env, sub)?,
                    span: span.clone(),
                })
            }

            Pattern::Unapply {
                binder,
                recs,
                fun,
                targs,
                sub,
                span,
            } => Ok(Pattern::Unapply {
                binder: self.rewrite_opt_var(binder)?,
                recs: {
                    let mut out = Vec::with_capacity(recs.len());
                    for r in recs {
                        out.push(self.rewrite(env, r)?);
                    }
                    out
                },
                fun: *fun,
                targs: self.ctx.rewrite_types(targs)?,
                sub: self.rewrite_patterns(env, sub)?,
                span: span.clone(),
            }),
        }
    }

    fn rewrite_heap_pattern(
        &mut self,
        env: &RewriteEnv,
        binder: &Option<Variable>,
        cid: lang_ir::SymbolId,
        ctargs: &[Type],
        sub: &[Pattern],
        span: &SourceSpan,
    ) -> ElabResult<Pattern> {
        let bound = self.expect_reads(env, span, "match against a heap class");
        let heap = self.heap_or_dummy(env);
        let targs = self.ctx.rewrite_types(ctargs)?;

        let set_tpe = self.ctx.lib.heap_ref_set_type();
        let reads_dom = match &bound {
            FrameBound::Restricted(v) => {
                self.ctx.lib.some(set_tpe, Expr::var(v.clone()))
            }
            FrameBound::Unrestricted => self.ctx.lib.none(set_tpe),
        };

        // The extractor binds the stored value; the original binder keeps
        // binding the scrutinee, which is now a reference.
        Ok(Pattern::Unapply {
            binder: self.rewrite_opt_var(binder)?,
            recs: vec![Expr::var(heap), reads_dom],
            fun: self.ctx.unapply_id(cid)?,
            targs: targs.clone(),
            sub: vec![Pattern::Class {
                binder: None,
                tpe: Type::Class(cid, targs),
                sub: self.rewrite_patterns(env, sub)?,
                span: span.clone(),
            }],
            span: span.clone(),
        })
    }

    fn rewrite_patterns(
        &mut self,
        env: &RewriteEnv,
        pats: &[Pattern],
    ) -> ElabResult<Vec<Pattern>> {
        let mut out = Vec::with_capacity(pats.len());
        for p in pats {
            out.push(self.rewrite_pattern(env, p)?);
        }
        Ok(out)
    }

    fn rewrite_opt_var(&self, binder: &Option<Variable>) -> ElabResult<Option<Variable>> {
        match binder {
            Some(v) => Ok(Some(self.ctx.rewrite_var(v)?)),
            None => Ok(None),
        }
    }
}

/// Synthesize the extractor for a heap class:
///
/// ```text
/// unapply_C[T…](heap: Heap, readsDom: Option[HeapRefSet], x: HeapRef): Option[C[T…]]
///   requires isEmpty(readsDom) || x ∈ get(readsDom)
///   = let val = heap(x) in
///     if val is C[T…] then Some(val as C[T…]) else None
/// ```
pub fn synthesize_unapply(ctx: &ElabContext<'_>, cd: &ClassDef) -> ElabResult<FunDef> {
    let mut locals = LocalIds::for_def(cd.id);
    let lib = &ctx.lib;
    let set_tpe = lib.heap_ref_set_type();

    let heap_p = Variable::new(locals.fresh(), "heap", lib.heap_type());
    let reads_dom_p = Variable::new(
        locals.fresh(),
        "readsDom",
        lib.option_type(set_tpe.clone()),
    );
    let x_p = Variable::new(locals.fresh(), "x", lib.heap_ref_type());

    let ct = Type::Class(
        cd.id,
        cd.tparams.iter().map(TypeParamDef::to_type).collect(),
    );

    let requires = Expr::call(
        lib.option_is_empty,
        vec![set_tpe.clone()],
        vec![Expr::var(reads_dom_p.clone())],
    )
    .or(Expr::var(x_p.clone()).elem_of(Expr::call(
        lib.option_get,
        vec![set_tpe],
        vec![Expr::var(reads_dom_p.clone())],
    )));

    let valv = Variable::new(locals.fresh(), "val", Type::Any);
    let body = Expr::let_in(
        valv.clone(),
        Expr::var(heap_p.clone()).map_apply(Expr::var(x_p.clone())),
        Expr::ite(
            Expr::var(valv.clone()).is_instance_of(ct.clone()),
            lib.some(ct.clone(), Expr::var(valv).as_instance_of(ct.clone())),
            lib.none(ct.clone()),
        ),
    );

    Ok(FunDef {
        id: ctx.unapply_id(cd.id)?,
        name: format!("unapply_{}", cd.name),
        tparams: cd.tparams.clone(),
        params: vec![heap_p, reads_dom_p, x_p],
        return_type: lib.option_type(ct),
        body,
        spec: FunctionSpec {
            requires: vec![requires],
            ..FunctionSpec::default()
        },
        flags: Flags::new(vec![
            Flag::Synthetic,
            Flag::DropVcs,
            Flag::IsUnapply {
                is_empty: lib.option_is_empty,
                get: lib.option_get,
            },
        ]),
        span: cd.span.clone(),
    })
}
