//! Function splitting
//!
//! Pure functions are rewritten in place. Each effectful function becomes a
//! pair:
//!
//! - the *inner* function keeps the original identifier, takes the heap as a
//!   leading parameter, and (when it writes) returns a `(result, heap)` pair
//!   computed through a locally mutable heap binding;
//! - the *shim* is the externally visible entry: it evaluates the callee's
//!   frame sets, checks them against the caller-supplied domains, runs the
//!   inner on the heap restricted to the reads set, and merges written
//!   locations back into the caller's heap.
//!
//! Every call site rewritten by the expression rewriter targets the shim;
//! only the shim itself calls the inner.

use crate::expr_rewrite::{FrameBound, RewriteEnv, Rewriter};
use crate::{ElabContext, ElabResult};
use lang_ir::{
    EffectLevel, Ensures, Expr, Flag, Flags, FunDef, FunctionSpec, Type, TypeParamDef, Variable,
};
use tracing::debug;

pub fn extract_function(ctx: &ElabContext<'_>, fd: &FunDef) -> ElabResult<Vec<FunDef>> {
    let level = ctx.effect_level_of(fd);
    debug!(function = %fd.name, %level, "splitting function");
    match level {
        EffectLevel::Pure => Ok(vec![extract_pure(ctx, fd)?]),
        _ => {
            let mut rw = Rewriter::new(ctx, fd.id);
            let inner = make_inner(ctx, &mut rw, fd, level)?;
            let shim = make_shim(ctx, &mut rw, fd, level)?;
            Ok(vec![inner, shim])
        }
    }
}

fn extract_pure(ctx: &ElabContext<'_>, fd: &FunDef) -> ElabResult<FunDef> {
    let mut rw = Rewriter::new(ctx, fd.id);
    let env = RewriteEnv::pure();

    let params = fd
        .params
        .iter()
        .map(|p| ctx.rewrite_var(p))
        .collect::<ElabResult<Vec<_>>>()?;

    let mut requires = Vec::with_capacity(fd.spec.requires.len());
    for r in &fd.spec.requires {
        requires.push(rw.rewrite(&env, r)?);
    }
    let mut ensures = Vec::with_capacity(fd.spec.ensures.len());
    for e in &fd.spec.ensures {
        ensures.push(Ensures::new(
            ctx.rewrite_var(&e.binder)?,
            rw.rewrite(&env, &e.pred)?,
        ));
    }
    let decreases = match &fd.spec.decreases {
        Some(d) => Some(rw.rewrite(&env, d)?),
        None => None,
    };

    Ok(FunDef {
        id: fd.id,
        name: fd.name.clone(),
        tparams: fd.tparams.clone(),
        params,
        return_type: ctx.rewrite_type(&fd.return_type)?,
        body: rw.rewrite(&env, &fd.body)?,
        spec: FunctionSpec {
            reads: None,
            modifies: None,
            requires,
            ensures,
            decreases,
        },
        flags: fd.flags.clone(),
        span: fd.span.clone(),
    })
}

/// The declared reads set; defaults to the empty set when only `modifies`
/// was written, since `modifies` implies `reads`.
fn reads_clause(ctx: &ElabContext<'_>, fd: &FunDef) -> Expr {
    fd.spec
        .reads
        .clone()
        .unwrap_or_else(|| Expr::empty_set(ctx.lib.heap_ref_type()))
}

fn modifies_clause(ctx: &ElabContext<'_>, fd: &FunDef) -> Expr {
    fd.spec
        .modifies
        .clone()
        .unwrap_or_else(|| Expr::empty_set(ctx.lib.heap_ref_type()))
}

fn make_inner(
    ctx: &ElabContext<'_>,
    rw: &mut Rewriter<'_, '_>,
    fd: &FunDef,
    level: EffectLevel,
) -> ElabResult<FunDef> {
    let lib = &ctx.lib;
    let heap0 = rw.fresh_var("heap0", lib.heap_type());

    let mut params = Vec::with_capacity(fd.params.len() + 1);
    params.push(heap0.clone());
    for p in &fd.params {
        params.push(ctx.rewrite_var(p)?);
    }

    let value_tpe = ctx.rewrite_type(&fd.return_type)?;
    let return_type = if level.writes() {
        Type::Tuple(vec![value_tpe.clone(), lib.heap_type()])
    } else {
        value_tpe.clone()
    };

    // The reads clause is translated twice: once with reads unrestricted to
    // bind the frame set without bootstrapping through itself, and a second
    // copy under the restricted environment so the clause's own heap reads
    // are subject to the frame checks the shim installs.
    let reads_vd = rw.fresh_var("reads", lib.heap_ref_set_type());
    let spec_env = RewriteEnv::spec(heap0.clone());
    let reads_first = rw.rewrite(&spec_env, &reads_clause(ctx, fd))?;
    let checked_env = RewriteEnv::body(
        heap0.clone(),
        FrameBound::Restricted(reads_vd.clone()),
        None,
    );
    let reads_second = rw.rewrite(&checked_env, &reads_clause(ctx, fd))?;

    let body = if level.writes() {
        let modifies_vd = rw.fresh_var("modifies", lib.heap_ref_set_type());
        let modifies_t = rw.rewrite(&spec_env, &modifies_clause(ctx, fd))?;
        let heap_vd = rw.fresh_var("heap", lib.heap_type());

        let body_env = RewriteEnv::body(
            heap_vd.clone(),
            FrameBound::Restricted(reads_vd.clone()),
            Some(FrameBound::Restricted(modifies_vd.clone())),
        );
        let core = rw.rewrite(&body_env, &fd.body)?;
        let paired = Expr::tuple(vec![core, Expr::var(heap_vd.clone())]);
        let threaded = Expr::let_var(heap_vd, Expr::var(heap0.clone()), paired);
        let with_copy = Expr::block(vec![reads_second], threaded);
        let guarded = ctx.check(
            Expr::var(modifies_vd.clone()).subset_of(Expr::var(reads_vd.clone())),
            "modifies set not included in the reads set",
            with_copy,
        );
        Expr::let_in(
            reads_vd.clone(),
            reads_first,
            Expr::let_in(modifies_vd, modifies_t, guarded),
        )
    } else {
        let body_env = RewriteEnv::body(
            heap0.clone(),
            FrameBound::Restricted(reads_vd.clone()),
            None,
        );
        let core = rw.rewrite(&body_env, &fd.body)?;
        Expr::let_in(
            reads_vd.clone(),
            reads_first,
            Expr::block(vec![reads_second], core),
        )
    };

    // Pre- and postconditions move to the inner; the frame clauses are now
    // compiled into the body and the shim.
    let mut requires = Vec::with_capacity(fd.spec.requires.len());
    for r in &fd.spec.requires {
        requires.push(rw.rewrite(&spec_env, r)?);
    }
    let decreases = match &fd.spec.decreases {
        Some(d) => Some(rw.rewrite(&spec_env, d)?),
        None => None,
    };

    let mut ensures = Vec::with_capacity(fd.spec.ensures.len());
    for ens in &fd.spec.ensures {
        if level.writes() {
            // The result binder splits: the original binder sees the value
            // component, a fresh binder the output heap. `old(..)` reads the
            // input heap, everything else the output heap.
            let pair_binder = rw.fresh_var(
                &ens.binder.name,
                Type::Tuple(vec![value_tpe.clone(), lib.heap_type()]),
            );
            let heap1 = rw.fresh_var("heap1", lib.heap_type());
            let orig = ctx.rewrite_var(&ens.binder)?;
            let post_env = RewriteEnv::post(heap1.clone(), heap0.clone());
            let pred = rw.rewrite(&post_env, &ens.pred)?;
            ensures.push(Ensures::new(
                pair_binder.clone(),
                Expr::let_in(
                    orig,
                    Expr::var(pair_binder.clone()).tuple_select(0),
                    Expr::let_in(heap1, Expr::var(pair_binder).tuple_select(1), pred),
                ),
            ));
        } else {
            let post_env = RewriteEnv::post(heap0.clone(), heap0.clone());
            ensures.push(Ensures::new(
                ctx.rewrite_var(&ens.binder)?,
                rw.rewrite(&post_env, &ens.pred)?,
            ));
        }
    }

    Ok(FunDef {
        id: fd.id,
        name: fd.name.clone(),
        tparams: fd.tparams.clone(),
        params,
        return_type,
        body,
        spec: FunctionSpec {
            reads: None,
            modifies: None,
            requires,
            ensures,
            decreases,
        },
        flags: fd.flags.clone(),
        span: fd.span.clone(),
    })
}

fn make_shim(
    ctx: &ElabContext<'_>,
    rw: &mut Rewriter<'_, '_>,
    fd: &FunDef,
    level: EffectLevel,
) -> ElabResult<FunDef> {
    let lib = &ctx.lib;
    let heap_p = rw.fresh_var("heap", lib.heap_type());
    let reads_dom_p = rw.fresh_var("readsDom", lib.heap_ref_set_type());

    // Real parameters keep the inner's identifiers; binders are scoped per
    // definition, and the translated frame clauses refer to them.
    let mut real_params: Vec<Variable> = Vec::with_capacity(fd.params.len());
    for p in &fd.params {
        real_params.push(ctx.rewrite_var(p)?);
    }

    let spec_env = RewriteEnv::spec(heap_p.clone());
    let reads_vd = rw.fresh_var("reads", lib.heap_ref_set_type());
    let reads_t = rw.rewrite(&spec_env, &reads_clause(ctx, fd))?;

    let value_tpe = ctx.rewrite_type(&fd.return_type)?;
    let targs: Vec<Type> = fd.tparams.iter().map(TypeParamDef::to_type).collect();
    let heap_in = rw.fresh_var("heapIn", lib.heap_type());

    // The inner call carries no position: the inliner stamps the call-site
    // position later.
    let mut inner_args: Vec<Expr> = vec![Expr::var(heap_in.clone())];
    inner_args.extend(real_params.iter().cloned().map(Expr::var));
    let inner_call = Expr::call(fd.id, targs, inner_args);

    let restricted_heap = Expr::map_merge(
        Expr::var(reads_vd.clone()),
        Expr::var(heap_p.clone()),
        lib.dummy_heap_call(),
    );

    let (params, return_type, body) = if level.writes() {
        let modifies_dom_p = rw.fresh_var("modifiesDom", lib.heap_ref_set_type());
        let modifies_vd = rw.fresh_var("modifies", lib.heap_ref_set_type());
        let modifies_t = rw.rewrite(&spec_env, &modifies_clause(ctx, fd))?;

        let pair_tpe = Type::Tuple(vec![value_tpe, lib.heap_type()]);
        let res_p = rw.fresh_var("res", pair_tpe.clone());

        // Written locations flow back into the caller's heap; everything
        // else is untouched.
        let merged_out = Expr::tuple(vec![
            Expr::var(res_p.clone()).tuple_select(0),
            Expr::map_merge(
                Expr::var(modifies_vd.clone()),
                Expr::var(res_p.clone()).tuple_select(1),
                Expr::var(heap_p.clone()),
            ),
        ]);
        let call_part = Expr::let_in(
            heap_in,
            restricted_heap,
            Expr::let_in(res_p, inner_call, merged_out),
        );
        let checked = ctx.check(
            Expr::var(reads_vd.clone()).subset_of(Expr::var(reads_dom_p.clone())),
            "reads set not included in the reads domain",
            ctx.check(
                Expr::var(modifies_vd.clone()).subset_of(Expr::var(modifies_dom_p.clone())),
                "modifies set not included in the modifies domain",
                call_part,
            ),
        );
        let body = Expr::let_in(
            reads_vd,
            reads_t,
            Expr::let_in(modifies_vd, modifies_t, checked),
        );

        let mut params = vec![heap_p, reads_dom_p, modifies_dom_p];
        params.extend(real_params);
        (params, pair_tpe, body)
    } else {
        let call_part = Expr::let_in(heap_in, restricted_heap, inner_call);
        let checked = ctx.check(
            Expr::var(reads_vd.clone()).subset_of(Expr::var(reads_dom_p.clone())),
            "reads set not included in the reads domain",
            call_part,
        );
        let body = Expr::let_in(reads_vd, reads_t, checked);

        let mut params = vec![heap_p, reads_dom_p];
        params.extend(real_params);
        (params, value_tpe, body)
    };

    Ok(FunDef {
        id: ctx.shim_id(fd.id)?,
        name: format!("{}__shim", fd.name),
        tparams: fd.tparams.clone(),
        params,
        return_type,
        body,
        spec: FunctionSpec::default(),
        flags: Flags::new(vec![Flag::Synthetic, Flag::DropVcs, Flag::InlineOnce])
            .union(&fd.flags),
        span: fd.span.clone(),
    })
}
