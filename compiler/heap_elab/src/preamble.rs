//! Preamble injection
//!
//! Installs the shared support definitions into the output table: the
//! `HeapRef` sort (a single-constructor record carrying the reference
//! identity), the `dummyHeap` constant used by shims to blank out
//! unreadable locations, and the `Option` sort with its `isEmpty`/`get`
//! helpers used by the synthesized unapply extractors.

use crate::ElabContext;
use lang_ir::{
    ConstructorDef, Expr, Flag, Flags, FunDef, FunctionSpec, SortDef, SourceSpan, Symbols, Type,
    TypeParamDef, Variable,
};

pub fn install(ctx: &ElabContext<'_>, out: &mut Symbols) {
    let lib = &ctx.lib;

    out.add_sort(SortDef {
        id: lib.heap_ref_sort,
        name: "HeapRef".to_string(),
        tparams: vec![],
        constructors: vec![ConstructorDef {
            id: lib.heap_ref_ctor,
            name: "HeapRef".to_string(),
            fields: vec![Variable::new(lib.heap_ref_id_field, "id", Type::Int)],
        }],
        flags: Flags::new(vec![Flag::Synthetic]),
        span: SourceSpan::default(),
    });

    // An arbitrary heap; downstream treats it as an uninterpreted constant.
    let h = Variable::new(lib.dummy_heap_binder, "h", lib.heap_type());
    out.add_function(FunDef {
        id: lib.dummy_heap,
        name: "dummyHeap".to_string(),
        tparams: vec![],
        params: vec![],
        return_type: lib.heap_type(),
        body: Expr::choose(h, Expr::bool_lit(true)),
        spec: FunctionSpec::default(),
        flags: Flags::new(vec![Flag::Synthetic, Flag::DropVcs]),
        span: SourceSpan::default(),
    });

    let t = TypeParamDef::new(lib.option_tparam, "T");
    out.add_sort(SortDef {
        id: lib.option_sort,
        name: "Option".to_string(),
        tparams: vec![t.clone()],
        constructors: vec![
            ConstructorDef {
                id: lib.none_ctor,
                name: "None".to_string(),
                fields: vec![],
            },
            ConstructorDef {
                id: lib.some_ctor,
                name: "Some".to_string(),
                fields: vec![Variable::new(lib.some_value_field, "value", t.to_type())],
            },
        ],
        flags: Flags::new(vec![Flag::Synthetic]),
        span: SourceSpan::default(),
    });

    let te = TypeParamDef::new(lib.is_empty_tparam, "T");
    let opt_e = Variable::new(
        lib.is_empty_param,
        "opt",
        Type::Sort(lib.option_sort, vec![te.to_type()]),
    );
    out.add_function(FunDef {
        id: lib.option_is_empty,
        name: "isEmpty".to_string(),
        tparams: vec![te],
        params: vec![opt_e.clone()],
        return_type: Type::Bool,
        body: Expr::var(opt_e).is_ctor(lib.none_ctor),
        spec: FunctionSpec::default(),
        flags: Flags::new(vec![Flag::Synthetic, Flag::DropVcs]),
        span: SourceSpan::default(),
    });

    let tg = TypeParamDef::new(lib.get_tparam, "T");
    let opt_g = Variable::new(
        lib.get_param,
        "opt",
        Type::Sort(lib.option_sort, vec![tg.to_type()]),
    );
    out.add_function(FunDef {
        id: lib.option_get,
        name: "get".to_string(),
        tparams: vec![tg.clone()],
        params: vec![opt_g.clone()],
        return_type: tg.to_type(),
        body: Expr::var(opt_g.clone()).adt_select(lib.some_value_field),
        spec: FunctionSpec {
            requires: vec![Expr::var(opt_g).is_ctor(lib.none_ctor).not()],
            ..FunctionSpec::default()
        },
        flags: Flags::new(vec![Flag::Synthetic, Flag::DropVcs]),
        span: SourceSpan::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang_ir::{ElabConfig, Reporter, SymbolId};

    #[test]
    fn test_preamble_contents() {
        let symbols = Symbols::new();
        let config = ElabConfig::default();
        let reporter = Reporter::new();
        let ctx = ElabContext::new(&symbols, &config, &reporter).unwrap();

        let mut out = Symbols::new();
        install(&ctx, &mut out);

        let heap_ref = out.sort(ctx.lib.heap_ref_sort).unwrap();
        assert_eq!(heap_ref.name, "HeapRef");
        assert_eq!(heap_ref.constructors.len(), 1);
        assert_eq!(heap_ref.constructors[0].fields.len(), 1);

        let option = out.sort(ctx.lib.option_sort).unwrap();
        assert_eq!(option.constructors.len(), 2);

        assert!(out.function(ctx.lib.dummy_heap).is_some());
        assert!(out.function(ctx.lib.option_is_empty).is_some());
        let get = out.function(ctx.lib.option_get).unwrap();
        assert_eq!(get.spec.requires.len(), 1);
    }

    #[test]
    fn test_preamble_ids_start_past_input() {
        let mut symbols = Symbols::new();
        symbols.add_sort(SortDef {
            id: SymbolId(5),
            name: "S".to_string(),
            tparams: vec![],
            constructors: vec![],
            flags: Flags::default(),
            span: SourceSpan::default(),
        });
        let config = ElabConfig::default();
        let reporter = Reporter::new();
        let ctx = ElabContext::new(&symbols, &config, &reporter).unwrap();
        assert!(ctx.lib.heap_ref_sort.0 > 5);
    }
}
