//! Expressions and patterns
//!
//! The closed expression variant set of the frontend language, plus the pure
//! set/map forms the heap elaboration compiles object operations into. Every
//! node carries its source span so rewrites can preserve positions.

// Allow builder method names that overlap with std traits - intentional DSL design
#![allow(clippy::should_implement_trait)]

use crate::{SourceSpan, SymbolId, Type, Variable};
use serde::{Deserialize, Serialize};

/// An expression: a kind plus its source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

/// One case of a pattern match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub rhs: Expr,
}

/// The expression forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    // Literals
    UnitLit,
    BoolLit(bool),
    IntLit(i64),

    // Variables and binding
    Var(Variable),
    Let {
        binder: Variable,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Locally mutable binding; targets of `Assign`
    LetVar {
        binder: Variable,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    Assign {
        target: Variable,
        value: Box<Expr>,
    },
    Block {
        exprs: Vec<Expr>,
        last: Box<Expr>,
    },

    // Control
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    Lambda {
        params: Vec<Variable>,
        body: Box<Expr>,
    },
    /// Non-deterministic choice of a value satisfying the predicate
    Choose {
        binder: Variable,
        pred: Box<Expr>,
    },
    /// Checked condition wrapping its continuation
    Assert {
        pred: Box<Expr>,
        message: Option<String>,
        body: Box<Expr>,
    },
    /// Assumed condition wrapping its continuation
    Assume {
        pred: Box<Expr>,
        body: Box<Expr>,
    },
    /// Pre-state value inside a postcondition
    Old(Box<Expr>),

    // Calls and objects
    FunCall {
        fun: SymbolId,
        targs: Vec<Type>,
        args: Vec<Expr>,
    },
    ClassCtor {
        class: SymbolId,
        targs: Vec<Type>,
        args: Vec<Expr>,
    },
    FieldSelect {
        object: Box<Expr>,
        class: SymbolId,
        targs: Vec<Type>,
        field: SymbolId,
    },
    FieldAssign {
        object: Box<Expr>,
        class: SymbolId,
        targs: Vec<Type>,
        field: SymbolId,
        value: Box<Expr>,
    },
    /// Reference equality of two class values
    RefEq {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// The numeric identity of a reference
    ObjectIdentity(Box<Expr>),
    IsInstanceOf {
        expr: Box<Expr>,
        tpe: Type,
    },
    AsInstanceOf {
        expr: Box<Expr>,
        tpe: Type,
    },

    // Algebraic sorts
    AdtCtor {
        ctor: SymbolId,
        targs: Vec<Type>,
        args: Vec<Expr>,
    },
    AdtSelect {
        expr: Box<Expr>,
        field: SymbolId,
    },
    IsCtor {
        expr: Box<Expr>,
        ctor: SymbolId,
    },

    // Logic and arithmetic
    Equals(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Plus(Box<Expr>, Box<Expr>),
    Minus(Box<Expr>, Box<Expr>),

    // Tuples
    Tuple(Vec<Expr>),
    TupleSelect {
        tuple: Box<Expr>,
        /// Zero-based component index
        index: usize,
    },

    // Finite sets
    FiniteSet {
        elems: Vec<Expr>,
        elem_tpe: Type,
    },
    SetUnion(Box<Expr>, Box<Expr>),
    ElementOfSet {
        elem: Box<Expr>,
        set: Box<Expr>,
    },
    SubsetOf {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    // Total maps
    MapApply {
        map: Box<Expr>,
        key: Box<Expr>,
    },
    MapUpdated {
        map: Box<Expr>,
        key: Box<Expr>,
        value: Box<Expr>,
    },
    /// Equals `left` on keys in `mask`, `right` elsewhere
    MapMerge {
        mask: Box<Expr>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A pattern in a match case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Wildcard {
        binder: Option<Variable>,
        span: SourceSpan,
    },
    Literal {
        value: Expr,
        span: SourceSpan,
    },
    Class {
        binder: Option<Variable>,
        tpe: Type,
        sub: Vec<Pattern>,
        span: SourceSpan,
    },
    Tuple {
        binder: Option<Variable>,
        sub: Vec<Pattern>,
        span: SourceSpan,
    },
    /// Extractor pattern: `fun(recs…)(scrutinee)` matching `some(sub…)`
    Unapply {
        binder: Option<Variable>,
        recs: Vec<Expr>,
        fun: SymbolId,
        targs: Vec<Type>,
        sub: Vec<Pattern>,
        span: SourceSpan,
    },
}

impl Pattern {
    #[must_use]
    pub fn span(&self) -> &SourceSpan {
        match self {
            Self::Wildcard { span, .. }
            | Self::Literal { span, .. }
            | Self::Class { span, .. }
            | Self::Tuple { span, .. }
            | Self::Unapply { span, .. } => span,
        }
    }
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            span: SourceSpan::default(),
        }
    }

    /// Same expression stamped with a position
    #[must_use]
    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }

    // Builder methods for convenience

    #[must_use]
    pub fn unit() -> Self {
        Self::new(ExprKind::UnitLit)
    }

    #[must_use]
    pub fn bool_lit(b: bool) -> Self {
        Self::new(ExprKind::BoolLit(b))
    }

    #[must_use]
    pub fn int(i: i64) -> Self {
        Self::new(ExprKind::IntLit(i))
    }

    #[must_use]
    pub fn var(v: Variable) -> Self {
        Self::new(ExprKind::Var(v))
    }

    #[must_use]
    pub fn let_in(binder: Variable, value: Expr, body: Expr) -> Self {
        Self::new(ExprKind::Let {
            binder,
            value: Box::new(value),
            body: Box::new(body),
        })
    }

    #[must_use]
    pub fn let_var(binder: Variable, value: Expr, body: Expr) -> Self {
        Self::new(ExprKind::LetVar {
            binder,
            value: Box::new(value),
            body: Box::new(body),
        })
    }

    #[must_use]
    pub fn assign(target: Variable, value: Expr) -> Self {
        Self::new(ExprKind::Assign {
            target,
            value: Box::new(value),
        })
    }

    #[must_use]
    pub fn block(exprs: Vec<Expr>, last: Expr) -> Self {
        Self::new(ExprKind::Block {
            exprs,
            last: Box::new(last),
        })
    }

    #[must_use]
    pub fn ite(cond: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Self::new(ExprKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    #[must_use]
    pub fn choose(binder: Variable, pred: Expr) -> Self {
        Self::new(ExprKind::Choose {
            binder,
            pred: Box::new(pred),
        })
    }

    #[must_use]
    pub fn assert_in(pred: Expr, message: impl Into<String>, body: Expr) -> Self {
        Self::new(ExprKind::Assert {
            pred: Box::new(pred),
            message: Some(message.into()),
            body: Box::new(body),
        })
    }

    #[must_use]
    pub fn assume_in(pred: Expr, body: Expr) -> Self {
        Self::new(ExprKind::Assume {
            pred: Box::new(pred),
            body: Box::new(body),
        })
    }

    #[must_use]
    pub fn old(e: Expr) -> Self {
        Self::new(ExprKind::Old(Box::new(e)))
    }

    #[must_use]
    pub fn call(fun: SymbolId, targs: Vec<Type>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::FunCall { fun, targs, args })
    }

    #[must_use]
    pub fn class_ctor(class: SymbolId, targs: Vec<Type>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::ClassCtor { class, targs, args })
    }

    #[must_use]
    pub fn adt_ctor(ctor: SymbolId, targs: Vec<Type>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::AdtCtor { ctor, targs, args })
    }

    #[must_use]
    pub fn adt_select(self, field: SymbolId) -> Self {
        Self::new(ExprKind::AdtSelect {
            expr: Box::new(self),
            field,
        })
    }

    #[must_use]
    pub fn is_ctor(self, ctor: SymbolId) -> Self {
        Self::new(ExprKind::IsCtor {
            expr: Box::new(self),
            ctor,
        })
    }

    #[must_use]
    pub fn is_instance_of(self, tpe: Type) -> Self {
        Self::new(ExprKind::IsInstanceOf {
            expr: Box::new(self),
            tpe,
        })
    }

    #[must_use]
    pub fn as_instance_of(self, tpe: Type) -> Self {
        Self::new(ExprKind::AsInstanceOf {
            expr: Box::new(self),
            tpe,
        })
    }

    #[must_use]
    pub fn equals(self, other: Expr) -> Self {
        Self::new(ExprKind::Equals(Box::new(self), Box::new(other)))
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::new(ExprKind::Not(Box::new(self)))
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        Self::new(ExprKind::And(Box::new(self), Box::new(other)))
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Self {
        Self::new(ExprKind::Or(Box::new(self), Box::new(other)))
    }

    #[must_use]
    pub fn implies(self, other: Expr) -> Self {
        Self::new(ExprKind::Implies(Box::new(self), Box::new(other)))
    }

    #[must_use]
    pub fn plus(self, other: Expr) -> Self {
        Self::new(ExprKind::Plus(Box::new(self), Box::new(other)))
    }

    #[must_use]
    pub fn tuple(exprs: Vec<Expr>) -> Self {
        Self::new(ExprKind::Tuple(exprs))
    }

    #[must_use]
    pub fn tuple_select(self, index: usize) -> Self {
        Self::new(ExprKind::TupleSelect {
            tuple: Box::new(self),
            index,
        })
    }

    #[must_use]
    pub fn finite_set(elems: Vec<Expr>, elem_tpe: Type) -> Self {
        Self::new(ExprKind::FiniteSet { elems, elem_tpe })
    }

    #[must_use]
    pub fn empty_set(elem_tpe: Type) -> Self {
        Self::finite_set(vec![], elem_tpe)
    }

    #[must_use]
    pub fn elem_of(self, set: Expr) -> Self {
        Self::new(ExprKind::ElementOfSet {
            elem: Box::new(self),
            set: Box::new(set),
        })
    }

    #[must_use]
    pub fn subset_of(self, other: Expr) -> Self {
        Self::new(ExprKind::SubsetOf {
            lhs: Box::new(self),
            rhs: Box::new(other),
        })
    }

    #[must_use]
    pub fn map_apply(self, key: Expr) -> Self {
        Self::new(ExprKind::MapApply {
            map: Box::new(self),
            key: Box::new(key),
        })
    }

    #[must_use]
    pub fn map_updated(self, key: Expr, value: Expr) -> Self {
        Self::new(ExprKind::MapUpdated {
            map: Box::new(self),
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    #[must_use]
    pub fn map_merge(mask: Expr, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::MapMerge {
            mask: Box::new(mask),
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Direct sub-expressions, in evaluation order.
    ///
    /// Patterns contribute their prefix arguments and literal values; match
    /// cases contribute guards and right-hand sides.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::UnitLit | ExprKind::BoolLit(_) | ExprKind::IntLit(_) | ExprKind::Var(_) => {
                vec![]
            }
            ExprKind::Old(e)
            | ExprKind::ObjectIdentity(e)
            | ExprKind::Not(e)
            | ExprKind::IsInstanceOf { expr: e, .. }
            | ExprKind::AsInstanceOf { expr: e, .. }
            | ExprKind::AdtSelect { expr: e, .. }
            | ExprKind::IsCtor { expr: e, .. }
            | ExprKind::TupleSelect { tuple: e, .. }
            | ExprKind::Assign { value: e, .. }
            | ExprKind::Lambda { body: e, .. }
            | ExprKind::Choose { pred: e, .. } => vec![&**e],
            ExprKind::Let { value, body, .. }
            | ExprKind::LetVar { value, body, .. }
            | ExprKind::Assert {
                pred: value, body, ..
            }
            | ExprKind::Assume { pred: value, body } => vec![&**value, &**body],
            ExprKind::Equals(l, r)
            | ExprKind::And(l, r)
            | ExprKind::Or(l, r)
            | ExprKind::Implies(l, r)
            | ExprKind::Plus(l, r)
            | ExprKind::Minus(l, r)
            | ExprKind::SetUnion(l, r)
            | ExprKind::RefEq { lhs: l, rhs: r }
            | ExprKind::ElementOfSet { elem: l, set: r }
            | ExprKind::SubsetOf { lhs: l, rhs: r }
            | ExprKind::MapApply { map: l, key: r } => vec![&**l, &**r],
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => vec![&**cond, &**then_branch, &**else_branch],
            ExprKind::MapUpdated { map, key, value } => vec![&**map, &**key, &**value],
            ExprKind::MapMerge { mask, left, right } => vec![&**mask, &**left, &**right],
            ExprKind::Block { exprs, last } => {
                let mut out: Vec<&Expr> = exprs.iter().collect();
                out.push(&**last);
                out
            }
            ExprKind::FunCall { args, .. }
            | ExprKind::ClassCtor { args, .. }
            | ExprKind::AdtCtor { args, .. } => args.iter().collect(),
            ExprKind::Tuple(es) => es.iter().collect(),
            ExprKind::FiniteSet { elems, .. } => elems.iter().collect(),
            ExprKind::FieldSelect { object, .. } => vec![&**object],
            ExprKind::FieldAssign { object, value, .. } => vec![&**object, &**value],
            ExprKind::Match { scrutinee, cases } => {
                let mut out = vec![&**scrutinee];
                for case in cases {
                    out.extend(case.pattern.exprs());
                    if let Some(g) = &case.guard {
                        out.push(g);
                    }
                    out.push(&case.rhs);
                }
                out
            }
        }
    }

    /// Pre-order traversal of the whole expression tree
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

impl Pattern {
    /// Expressions embedded in this pattern tree
    #[must_use]
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Wildcard { .. } => vec![],
            Self::Literal { value, .. } => vec![value],
            Self::Class { sub, .. } | Self::Tuple { sub, .. } => {
                sub.iter().flat_map(Pattern::exprs).collect()
            }
            Self::Unapply { recs, sub, .. } => {
                let mut out: Vec<&Expr> = recs.iter().collect();
                out.extend(sub.iter().flat_map(Pattern::exprs));
                out
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn list(f: &mut std::fmt::Formatter<'_>, args: &[Expr]) -> std::fmt::Result {
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            Ok(())
        }

        match &self.kind {
            ExprKind::UnitLit => write!(f, "()"),
            ExprKind::BoolLit(b) => write!(f, "{b}"),
            ExprKind::IntLit(i) => write!(f, "{i}"),
            ExprKind::Var(v) => write!(f, "{v}"),
            ExprKind::Let { binder, value, body } => {
                write!(f, "let {binder} = {value} in {body}")
            }
            ExprKind::LetVar { binder, value, body } => {
                write!(f, "var {binder} = {value} in {body}")
            }
            ExprKind::Assign { target, value } => write!(f, "{target} := {value}"),
            ExprKind::Block { exprs, last } => {
                write!(f, "{{ ")?;
                for e in exprs {
                    write!(f, "{e}; ")?;
                }
                write!(f, "{last} }}")
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => write!(f, "if {cond} then {then_branch} else {else_branch}"),
            ExprKind::Match { scrutinee, cases } => {
                write!(f, "match {scrutinee} {{ {} cases }}", cases.len())
            }
            ExprKind::Lambda { params, body } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") => {body}")
            }
            ExprKind::Choose { binder, pred } => write!(f, "choose {binder} s.t. {pred}"),
            ExprKind::Assert { pred, body, .. } => write!(f, "assert({pred}); {body}"),
            ExprKind::Assume { pred, body } => write!(f, "assume({pred}); {body}"),
            ExprKind::Old(e) => write!(f, "old({e})"),
            ExprKind::FunCall { fun, args, .. } => {
                write!(f, "fun{fun}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            ExprKind::ClassCtor { class, args, .. } => {
                write!(f, "new class{class}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            ExprKind::FieldSelect { object, field, .. } => write!(f, "{object}.{field}"),
            ExprKind::FieldAssign {
                object,
                field,
                value,
                ..
            } => write!(f, "{object}.{field} = {value}"),
            ExprKind::RefEq { lhs, rhs } => write!(f, "{lhs} eq {rhs}"),
            ExprKind::ObjectIdentity(e) => write!(f, "identity({e})"),
            ExprKind::IsInstanceOf { expr, tpe } => write!(f, "{expr} is {tpe}"),
            ExprKind::AsInstanceOf { expr, tpe } => write!(f, "{expr} as {tpe}"),
            ExprKind::AdtCtor { ctor, args, .. } => {
                write!(f, "ctor{ctor}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            ExprKind::AdtSelect { expr, field } => write!(f, "{expr}.{field}"),
            ExprKind::IsCtor { expr, ctor } => write!(f, "{expr} is ctor{ctor}"),
            ExprKind::Equals(l, r) => write!(f, "{l} == {r}"),
            ExprKind::Not(e) => write!(f, "!{e}"),
            ExprKind::And(l, r) => write!(f, "({l} && {r})"),
            ExprKind::Or(l, r) => write!(f, "({l} || {r})"),
            ExprKind::Implies(l, r) => write!(f, "({l} ==> {r})"),
            ExprKind::Plus(l, r) => write!(f, "({l} + {r})"),
            ExprKind::Minus(l, r) => write!(f, "({l} - {r})"),
            ExprKind::Tuple(es) => {
                write!(f, "(")?;
                list(f, es)?;
                write!(f, ")")
            }
            ExprKind::TupleSelect { tuple, index } => write!(f, "{tuple}._{index}"),
            ExprKind::FiniteSet { elems, .. } => {
                write!(f, "Set(")?;
                list(f, elems)?;
                write!(f, ")")
            }
            ExprKind::SetUnion(l, r) => write!(f, "({l} ++ {r})"),
            ExprKind::ElementOfSet { elem, set } => write!(f, "({elem} in {set})"),
            ExprKind::SubsetOf { lhs, rhs } => write!(f, "({lhs} subsetOf {rhs})"),
            ExprKind::MapApply { map, key } => write!(f, "{map}({key})"),
            ExprKind::MapUpdated { map, key, value } => {
                write!(f, "{map}.updated({key}, {value})")
            }
            ExprKind::MapMerge { mask, left, right } => {
                write!(f, "mapMerge({mask}, {left}, {right})")
            }
        }
    }
}
