//! Proptest strategies for generating well-formed conditional views, plus
//! the valuation semantics used to state the guarder-preservation property.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::expr::{BoolExpr, Mark, MarkedVar, Sym};
use crate::view::{CFunc, CView, Func, GView, Multiset, VFunc};

/// The Boolean variable pool conditions draw from.
pub const BOOL_VARS: [&str; 3] = ["b0", "b1", "b2"];

fn bvar(i: usize) -> BoolExpr<MarkedVar> {
    BoolExpr::var(Mark::Before.var(BOOL_VARS[i]))
}

/// Strategy for a condition over the variable pool.
pub fn arb_cond() -> impl Strategy<Value = BoolExpr<MarkedVar>> {
    prop_oneof![
        (0..BOOL_VARS.len()).prop_map(bvar),
        (0..BOOL_VARS.len()).prop_map(|i| bvar(i).not()),
        ((0..BOOL_VARS.len()), (0..BOOL_VARS.len()))
            .prop_map(|(i, j)| BoolExpr::And(vec![bvar(i), bvar(j)])),
        ((0..BOOL_VARS.len()), (0..BOOL_VARS.len()))
            .prop_map(|(i, j)| BoolExpr::Or(vec![bvar(i), bvar(j)])),
    ]
}

fn arb_func() -> impl Strategy<Value = VFunc<MarkedVar>> {
    (0..4usize).prop_map(|i| Func::new(format!("p{i}"), vec![]))
}

/// Strategy for a well-formed conditional view: bounded nesting of unions
/// and conditionals over a small func pool.
pub fn arb_cview() -> impl Strategy<Value = CView<MarkedVar>> {
    let leaf = prop_oneof![
        arb_func().prop_map(|f| Multiset::singleton(CFunc::Func(f))),
        Just(Multiset::new()),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.union(b)),
            (arb_cond(), inner.clone(), inner)
                .prop_map(|(c, t, e)| Multiset::singleton(CFunc::Ite(c, t, e))),
        ]
    })
}

/// Strategy for a total valuation of the variable pool.
pub fn arb_valuation() -> impl Strategy<Value = BTreeMap<String, bool>> {
    proptest::collection::vec(any::<bool>(), BOOL_VARS.len()).prop_map(|vals| {
        BOOL_VARS
            .iter()
            .zip(vals)
            .map(|(n, v)| (n.to_string(), v))
            .collect()
    })
}

/// Evaluate a condition under a valuation. Supports the Boolean fragment
/// the generators emit.
pub fn eval_cond(e: &BoolExpr<MarkedVar>, env: &BTreeMap<String, bool>) -> bool {
    match e {
        BoolExpr::Lit(b) => *b,
        BoolExpr::Var(Sym::Reg(mv)) => *env
            .get(&mv.name)
            .unwrap_or_else(|| panic!("valuation misses '{}'", mv.name)),
        BoolExpr::And(xs) => xs.iter().all(|x| eval_cond(x, env)),
        BoolExpr::Or(xs) => xs.iter().any(|x| eval_cond(x, env)),
        BoolExpr::Not(x) => !eval_cond(x, env),
        BoolExpr::Implies(l, r) => !eval_cond(l, env) || eval_cond(r, env),
        other => panic!("condition outside the generated fragment: {other}"),
    }
}

/// The funcs a conditional view denotes under a valuation, with ITEs
/// resolved by the condition's truth value.
pub fn resolve_cview(
    view: &CView<MarkedVar>,
    env: &BTreeMap<String, bool>,
) -> Multiset<VFunc<MarkedVar>> {
    let mut out = Multiset::new();
    for (cf, count) in view.iter() {
        match cf {
            CFunc::Func(f) => out.insert(f.clone(), count),
            CFunc::Ite(cond, then_view, else_view) => {
                let chosen = if eval_cond(cond, env) {
                    then_view
                } else {
                    else_view
                };
                for (f, n) in resolve_cview(chosen, env) {
                    out.insert(f, n * count);
                }
            }
        }
    }
    out
}

/// The funcs a guarded view denotes under a valuation: those whose guard
/// holds.
pub fn resolve_gview(
    view: &GView<MarkedVar>,
    env: &BTreeMap<String, bool>,
) -> Multiset<VFunc<MarkedVar>> {
    let mut out = Multiset::new();
    for (gf, count) in view.iter() {
        if eval_cond(&gf.guard, env) {
            out.insert(gf.item.clone(), count);
        }
    }
    out
}
