//! End-to-end tests of the heap elaboration pass: the concrete scenarios and
//! the universal output invariants.

use heap_elab::run;
use lang_ir::{
    ClassDef, ElabConfig, Ensures, Expr, ExprKind, Flag, Flags, FunDef, FunctionSpec, Pattern,
    Reporter, SourceSpan, SymbolId, Symbols, Type, TypeAliasDef, Variable,
};

const MARKER: SymbolId = SymbolId(1);
const CELL: SymbolId = SymbolId(2);
const FIELD_V: SymbolId = SymbolId(20);
const PEEK: SymbolId = SymbolId(10);
const BUMP: SymbolId = SymbolId(11);
const COPY: SymbolId = SymbolId(12);
const MATCH_CELL: SymbolId = SymbolId(13);
const ID_FUN: SymbolId = SymbolId(14);
const CALL_PEEK: SymbolId = SymbolId(15);
const REF_EQ_FUN: SymbolId = SymbolId(16);

fn cell_type() -> Type {
    Type::class(CELL)
}

fn cell_select(obj: &Variable) -> Expr {
    Expr::new(ExprKind::FieldSelect {
        object: Box::new(Expr::var(obj.clone())),
        class: CELL,
        targs: vec![],
        field: FIELD_V,
    })
}

fn reads_set(vars: &[&Variable]) -> Expr {
    Expr::finite_set(
        vars.iter().map(|v| Expr::var((*v).clone())).collect(),
        cell_type(),
    )
}

fn fun(id: SymbolId, name: &str, params: Vec<Variable>, ret: Type, body: Expr) -> FunDef {
    FunDef {
        id,
        name: name.to_string(),
        tparams: vec![],
        params,
        return_type: ret,
        body,
        spec: FunctionSpec::default(),
        flags: Flags::default(),
        span: SourceSpan::default(),
    }
}

/// The input program used by most tests: a heap class `Cell` plus one
/// function per scenario.
fn verifier_fixture() -> Symbols {
    let mut symbols = Symbols::new();

    symbols.add_class(ClassDef {
        id: MARKER,
        name: "AnyHeapRef".to_string(),
        tparams: vec![],
        parents: vec![],
        fields: vec![],
        flags: Flags::new(vec![Flag::AnyHeapRef]),
        span: SourceSpan::default(),
    });
    symbols.add_class(ClassDef {
        id: CELL,
        name: "Cell".to_string(),
        tparams: vec![],
        parents: vec![Type::class(MARKER)],
        fields: vec![Variable::new(FIELD_V, "v", Type::Int)],
        flags: Flags::default(),
        span: SourceSpan::default(),
    });

    // S1: pure pass-through
    let x = Variable::new(SymbolId(100), "x", Type::Int);
    symbols.add_function(fun(
        ID_FUN,
        "id",
        vec![x.clone()],
        Type::Int,
        Expr::var(x),
    ));

    // S2: read-only access
    let c = Variable::new(SymbolId(101), "c", cell_type());
    let mut peek = fun(PEEK, "peek", vec![c.clone()], Type::Int, cell_select(&c));
    peek.spec.reads = Some(reads_set(&[&c]));
    symbols.add_function(peek);

    // S3: write
    let c = Variable::new(SymbolId(102), "c", cell_type());
    let mut bump = fun(
        BUMP,
        "bump",
        vec![c.clone()],
        Type::Unit,
        Expr::new(ExprKind::FieldAssign {
            object: Box::new(Expr::var(c.clone())),
            class: CELL,
            targs: vec![],
            field: FIELD_V,
            value: Box::new(cell_select(&c).plus(Expr::int(1))),
        }),
    );
    bump.spec.reads = Some(reads_set(&[&c]));
    bump.spec.modifies = Some(reads_set(&[&c]));
    symbols.add_function(bump);

    // S4: postcondition with old(..)
    let a = Variable::new(SymbolId(103), "a", cell_type());
    let b = Variable::new(SymbolId(104), "b", cell_type());
    let res = Variable::new(SymbolId(105), "res", Type::Unit);
    let mut copy = fun(
        COPY,
        "copy",
        vec![a.clone(), b.clone()],
        Type::Unit,
        Expr::new(ExprKind::FieldAssign {
            object: Box::new(Expr::var(a.clone())),
            class: CELL,
            targs: vec![],
            field: FIELD_V,
            value: Box::new(cell_select(&b)),
        }),
    );
    copy.spec.reads = Some(reads_set(&[&a, &b]));
    copy.spec.modifies = Some(reads_set(&[&a]));
    copy.spec.ensures = vec![Ensures::new(
        res,
        cell_select(&a).equals(Expr::old(cell_select(&b))),
    )];
    symbols.add_function(copy);

    // S5: heap-class pattern
    let m = Variable::new(SymbolId(106), "m", cell_type());
    let v = Variable::new(SymbolId(107), "v", Type::Int);
    let mut match_cell = fun(
        MATCH_CELL,
        "matchCell",
        vec![m.clone()],
        Type::Int,
        Expr::new(ExprKind::Match {
            scrutinee: Box::new(Expr::var(m.clone())),
            cases: vec![lang_ir::MatchCase {
                pattern: Pattern::Class {
                    binder: None,
                    tpe: cell_type(),
                    sub: vec![Pattern::Wildcard {
                        binder: Some(v.clone()),
                        span: SourceSpan::default(),
                    }],
                    span: SourceSpan::default(),
                },
                guard: None,
                rhs: Expr::var(v),
            }],
        }),
    );
    match_cell.spec.reads = Some(reads_set(&[&m]));
    symbols.add_function(match_cell);

    // Caller used by the call-routing invariant
    let c = Variable::new(SymbolId(108), "c", cell_type());
    let mut call_peek = fun(
        CALL_PEEK,
        "callPeek",
        vec![c.clone()],
        Type::Int,
        Expr::call(PEEK, vec![], vec![Expr::var(c.clone())]),
    );
    call_peek.spec.reads = Some(reads_set(&[&c]));
    symbols.add_function(call_peek);

    // Built-in reference equality, dropped from the output
    let p = Variable::new(SymbolId(109), "p", cell_type());
    let q = Variable::new(SymbolId(110), "q", cell_type());
    let mut ref_eq = fun(
        REF_EQ_FUN,
        "refEq",
        vec![p.clone(), q.clone()],
        Type::Bool,
        Expr::new(ExprKind::RefEq {
            lhs: Box::new(Expr::var(p)),
            rhs: Box::new(Expr::var(q)),
        }),
    );
    ref_eq.flags.add(Flag::RefEq);
    symbols.add_function(ref_eq);

    symbols
}

fn elaborate(symbols: &Symbols) -> (Symbols, Reporter) {
    let config = ElabConfig::default();
    let reporter = Reporter::new();
    let out = run(symbols, &config, &reporter).expect("elaboration succeeds");
    (out, reporter)
}

fn find_fun<'a>(symbols: &'a Symbols, name: &str) -> &'a FunDef {
    symbols
        .functions
        .values()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no function named {name}"))
}

fn type_mentions_class(tpe: &Type, id: SymbolId) -> bool {
    match tpe {
        Type::Class(cid, targs) => {
            *cid == id || targs.iter().any(|t| type_mentions_class(t, id))
        }
        Type::Sort(_, targs) | Type::Tuple(targs) => {
            targs.iter().any(|t| type_mentions_class(t, id))
        }
        Type::Function(from, to) => {
            from.iter().any(|t| type_mentions_class(t, id)) || type_mentions_class(to, id)
        }
        Type::Set(elem) => type_mentions_class(elem, id),
        Type::Map(k, v) => type_mentions_class(k, id) || type_mentions_class(v, id),
        _ => false,
    }
}

#[test]
fn s1_pure_pass_through() {
    let input = verifier_fixture();
    let (out, reporter) = elaborate(&input);
    assert!(!reporter.has_errors());

    let id_outs: Vec<_> = out.functions.values().filter(|f| f.id == ID_FUN).collect();
    assert_eq!(id_outs.len(), 1);
    let id_out = id_outs[0];
    assert_eq!(id_out.params.len(), 1, "pure functions gain no parameters");
    assert_eq!(id_out.params[0].tpe, Type::Int);
    assert_eq!(id_out.return_type, Type::Int);
    assert!(matches!(&id_out.body.kind, ExprKind::Var(v) if v.name == "x"));
    assert!(
        !out.functions.values().any(|f| f.name == "id__shim"),
        "no shim for a pure function"
    );
}

#[test]
fn s2_read_only_access() {
    let input = verifier_fixture();
    let (out, _) = elaborate(&input);

    let heap_ref = out
        .sorts
        .values()
        .find(|s| s.name == "HeapRef")
        .expect("HeapRef sort installed");
    let heap_ref_tpe = Type::sort(heap_ref.id);
    let heap_tpe = Type::map_of(heap_ref_tpe.clone(), Type::Any);

    let inner = out.function(PEEK).expect("inner keeps its id");
    assert_eq!(inner.params.len(), 2);
    assert_eq!(inner.params[0].tpe, heap_tpe);
    assert_eq!(inner.params[1].tpe, heap_ref_tpe);
    assert_eq!(inner.return_type, Type::Int);

    // The body reads the heap explicitly and asserts frame membership
    let mut has_assert = false;
    let mut has_map_apply = false;
    inner.body.walk(&mut |e| {
        has_assert |= matches!(e.kind, ExprKind::Assert { .. });
        has_map_apply |= matches!(e.kind, ExprKind::MapApply { .. });
    });
    assert!(has_assert);
    assert!(has_map_apply);

    let shim = find_fun(&out, "peek__shim");
    assert_eq!(shim.params.len(), 3);
    assert_eq!(shim.params[0].tpe, heap_tpe);
    assert_eq!(shim.params[1].tpe, Type::set_of(heap_ref_tpe));
    assert_eq!(shim.return_type, Type::Int);
    assert!(shim.flags.contains(&Flag::InlineOnce));

    // The shim checks the reads domain and restricts the heap with the
    // dummy heap before calling the inner
    let dummy_heap = find_fun(&out, "dummyHeap");
    let mut merges_with_dummy = false;
    let mut has_subset_assert = false;
    shim.body.walk(&mut |e| {
        if let ExprKind::MapMerge { right, .. } = &e.kind {
            if let ExprKind::FunCall { fun, .. } = &right.kind {
                merges_with_dummy |= *fun == dummy_heap.id;
            }
        }
        if let ExprKind::Assert { pred, .. } = &e.kind {
            has_subset_assert |= matches!(pred.kind, ExprKind::SubsetOf { .. });
        }
    });
    assert!(merges_with_dummy);
    assert!(has_subset_assert);
}

#[test]
fn s3_write() {
    let input = verifier_fixture();
    let (out, _) = elaborate(&input);

    let heap_ref = out.sorts.values().find(|s| s.name == "HeapRef").unwrap();
    let heap_tpe = Type::map_of(Type::sort(heap_ref.id), Type::Any);
    let pair = Type::Tuple(vec![Type::Unit, heap_tpe.clone()]);

    let inner = out.function(BUMP).unwrap();
    assert_eq!(inner.return_type, pair);
    assert_eq!(inner.params.len(), 2);

    // The inner threads a locally mutable heap and updates it
    let mut has_let_var = false;
    let mut has_map_updated = false;
    inner.body.walk(&mut |e| {
        has_let_var |= matches!(&e.kind, ExprKind::LetVar { binder, .. } if binder.name == "heap");
        has_map_updated |= matches!(e.kind, ExprKind::MapUpdated { .. });
    });
    assert!(has_let_var);
    assert!(has_map_updated);

    let shim = find_fun(&out, "bump__shim");
    assert_eq!(shim.params.len(), 4, "heap, readsDom, modifiesDom, c");
    assert_eq!(shim.params[2].name, "modifiesDom");
    assert_eq!(shim.return_type, pair);

    // The written locations are merged back into the caller's heap
    let mut merge_count = 0;
    shim.body.walk(&mut |e| {
        if matches!(e.kind, ExprKind::MapMerge { .. }) {
            merge_count += 1;
        }
    });
    assert!(merge_count >= 2, "restrict on entry, merge back on exit");
}

#[test]
fn s4_postcondition_with_old() {
    let input = verifier_fixture();
    let (out, reporter) = elaborate(&input);
    assert!(!reporter.has_errors());

    let inner = out.function(COPY).unwrap();
    assert_eq!(inner.spec.ensures.len(), 1);
    let post = &inner.spec.ensures[0];

    // The binder now carries the (value, heap) pair
    assert!(matches!(&post.binder.tpe, Type::Tuple(tps) if tps.len() == 2));

    let mut has_old = false;
    let mut heaps_read = Vec::new();
    post.pred.walk(&mut |e| {
        has_old |= matches!(e.kind, ExprKind::Old(_));
        if let ExprKind::MapApply { map, .. } = &e.kind {
            if let ExprKind::Var(v) = &map.kind {
                heaps_read.push(v.name.clone());
            }
        }
    });
    assert!(!has_old, "old(..) is compiled away");
    assert!(
        heaps_read.iter().any(|n| n == "heap1"),
        "post-state reads the output heap: {heaps_read:?}"
    );
    assert!(
        heaps_read.iter().any(|n| n == "heap0"),
        "old(..) reads the input heap: {heaps_read:?}"
    );
}

#[test]
fn s5_heap_class_pattern() {
    let input = verifier_fixture();
    let (out, reporter) = elaborate(&input);
    assert!(!reporter.has_errors());

    let unapply = find_fun(&out, "unapply_Cell");
    assert!(unapply.flags.is_unapply());

    let option = out.sorts.values().find(|s| s.name == "Option").unwrap();
    let some_ctor = option
        .constructors
        .iter()
        .find(|c| c.name == "Some")
        .unwrap();

    let inner = out.function(MATCH_CELL).unwrap();
    let mut seen_pattern = None;
    inner.body.walk(&mut |e| {
        if let ExprKind::Match { cases, .. } = &e.kind {
            seen_pattern = Some(cases[0].pattern.clone());
        }
    });
    let Some(Pattern::Unapply { recs, fun, sub, .. }) = seen_pattern else {
        panic!("heap-class pattern was not rewritten to an unapply")
    };
    assert_eq!(fun, unapply.id);
    assert_eq!(recs.len(), 2, "heap and reads domain");
    // Restricted context: the reads domain is some(reads)
    let ExprKind::AdtCtor { ctor, .. } = &recs[1].kind else {
        panic!("reads domain must be an option value")
    };
    assert_eq!(*ctor, some_ctor.id);
    // The nested pattern matches the stored value against the class itself
    assert!(matches!(&sub[0], Pattern::Class { tpe: Type::Class(id, _), .. } if *id == CELL));
}

#[test]
fn s6_error_path() {
    let mut input = verifier_fixture();
    let c = Variable::new(SymbolId(120), "c", cell_type());
    input.add_function(fun(
        SymbolId(17),
        "bad",
        vec![c.clone()],
        Type::Int,
        cell_select(&c),
    ));

    let config = ElabConfig::default();
    let reporter = Reporter::new();
    let out = run(&input, &config, &reporter).expect("the pass completes");
    assert_eq!(reporter.error_count(), 1);
    assert_eq!(
        reporter.diagnostics()[0].message,
        "Cannot read from heap object without a reads clause"
    );
    assert!(out.function(SymbolId(17)).is_some(), "a placeholder is still emitted");
}

#[test]
fn calls_target_shims_never_inners() {
    let input = verifier_fixture();
    let (out, _) = elaborate(&input);

    let shim = find_fun(&out, "peek__shim");
    let caller = out.function(CALL_PEEK).unwrap();

    let mut calls_inner = false;
    let mut calls_shim = false;
    caller.body.walk(&mut |e| {
        if let ExprKind::FunCall { fun, .. } = &e.kind {
            calls_inner |= *fun == PEEK;
            calls_shim |= *fun == shim.id;
        }
    });
    assert!(!calls_inner, "call sites must never target the inner");
    assert!(calls_shim);

    // Only the shim itself calls the inner
    for f in out.functions.values() {
        if f.name.ends_with("__shim") || f.id == PEEK {
            continue;
        }
        f.body.walk(&mut |e| {
            if let ExprKind::FunCall { fun, .. } = &e.kind {
                assert_ne!(*fun, PEEK, "{} calls the inner directly", f.name);
            }
        });
    }
}

#[test]
fn heap_class_types_replaced_everywhere() {
    let input = verifier_fixture();
    let (out, _) = elaborate(&input);

    for f in out.functions.values() {
        for p in &f.params {
            assert!(
                !type_mentions_class(&p.tpe, CELL),
                "parameter {} of {} still has a heap-class type",
                p.name,
                f.name
            );
        }
        // Extractors alone keep the class in their result: they return the
        // stored class value, not a reference.
        if !f.flags.is_unapply() {
            assert!(!type_mentions_class(&f.return_type, CELL));
        }
    }
    for c in out.classes.values() {
        for field in &c.fields {
            assert!(!type_mentions_class(&field.tpe, CELL));
        }
    }
}

#[test]
fn output_table_contract() {
    let input = verifier_fixture();
    let (out, _) = elaborate(&input);

    assert!(out.class(MARKER).is_none(), "marker class is dropped");
    assert!(
        out.function(REF_EQ_FUN).is_none(),
        "refEq functions are dropped"
    );
    assert!(out.class(CELL).is_some(), "heap classes survive, rewritten");
    assert!(out.classes.get(&CELL).unwrap().parents.is_empty());

    assert!(out.sorts.values().any(|s| s.name == "HeapRef"));
    assert!(out.sorts.values().any(|s| s.name == "Option"));
    assert!(out.functions.values().any(|f| f.name == "dummyHeap"));
    assert!(out.functions.values().any(|f| f.name == "isEmpty"));
    assert!(out.functions.values().any(|f| f.name == "get"));

    // Effectful input functions appear as inner + shim
    for (id, name) in [(PEEK, "peek"), (BUMP, "bump"), (COPY, "copy")] {
        assert!(out.function(id).is_some());
        assert!(out
            .functions
            .values()
            .any(|f| f.name == format!("{name}__shim")));
    }
}

#[test]
fn disabling_contract_checks_removes_all_assertions() {
    let input = verifier_fixture();
    let config = ElabConfig::new().without_contract_checks();
    let reporter = Reporter::new();
    let out = run(&input, &config, &reporter).unwrap();

    for f in out.functions.values() {
        f.body.walk(&mut |e| {
            assert!(
                !matches!(e.kind, ExprKind::Assert { .. }),
                "assertion left in {} with checks disabled",
                f.name
            );
        });
    }
}

#[test]
fn elaboration_is_deterministic() {
    let input = verifier_fixture();
    let (first, _) = elaborate(&input);
    let (second, _) = elaborate(&input);
    assert_eq!(first, second);
}

#[test]
fn output_is_invariant_under_definition_order() {
    let input = verifier_fixture();

    // Reassemble the same table in reverse insertion order
    let mut reversed = Symbols::new();
    for f in input.functions.values().rev().cloned().collect::<Vec<_>>() {
        reversed.add_function(f);
    }
    for c in input.classes.values().rev().cloned().collect::<Vec<_>>() {
        reversed.add_class(c);
    }
    assert_eq!(input, reversed);

    let (a, _) = elaborate(&input);
    let (b, _) = elaborate(&reversed);
    assert_eq!(a, b);
}

#[test]
fn aliases_are_rewritten() {
    let mut input = verifier_fixture();
    input.add_alias(TypeAliasDef {
        id: SymbolId(60),
        name: "CellPair".to_string(),
        tparams: vec![],
        body: Type::Tuple(vec![cell_type(), cell_type()]),
        flags: Flags::default(),
        span: SourceSpan::default(),
    });
    let (out, _) = elaborate(&input);

    let alias = out.alias(SymbolId(60)).unwrap();
    let heap_ref = out.sorts.values().find(|s| s.name == "HeapRef").unwrap();
    assert_eq!(
        alias.body,
        Type::Tuple(vec![Type::sort(heap_ref.id), Type::sort(heap_ref.id)])
    );
}
