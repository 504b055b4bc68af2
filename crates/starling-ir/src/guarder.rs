//! The guarder: conditional views → guarded views.
//!
//! Every `ITE` element is flattened into its leaf funcs, each carrying the
//! conjunction of the Boolean conditions on its path. Funcs present in both
//! branches of an `ITE` merge back onto the enclosing guard, since the two
//! branch conditions are mutually exclusive and exhaustive.

use crate::expr::{BoolExpr, MarkedVar};
use crate::model::Block;
use crate::view::{conjoin, guard_all, CFunc, CView, GFunc, GView, Multiset, ViewExpr};
use crate::{CViewModel, GViewModel};

/// Guard every view in the model. Total: guarding cannot fail.
pub fn guard_model(model: CViewModel) -> GViewModel {
    model.map_axioms(|body: Block<ViewExpr<CView<MarkedVar>>>| {
        body.map_view(&mut |view| view.map(|cv| guard_cview(&cv, &BoolExpr::Lit(true))))
    })
}

/// Flatten a conditional view under `guard`.
pub fn guard_cview(view: &CView<MarkedVar>, guard: &BoolExpr<MarkedVar>) -> GView<MarkedVar> {
    let mut out = Multiset::new();
    for (cfunc, count) in view.iter() {
        let expanded = match cfunc {
            CFunc::Func(f) => Multiset::singleton(GFunc::new(guard.clone(), f.clone())),
            CFunc::Ite(cond, then_view, else_view) => {
                let then_guard = conjoin(guard, cond.clone());
                let else_guard = conjoin(guard, cond.clone().not());
                let then_guarded = guard_cview(then_view, &then_guard);
                let else_guarded = guard_cview(else_view, &else_guard);
                merge_branches(then_guarded, else_guarded, guard, &then_guard, &else_guard)
            }
        };
        for (gf, n) in expanded {
            out.insert(gf, n * count);
        }
    }
    out
}

/// Union the two branch expansions of an `ITE`, lifting funcs present
/// unconditionally in both branches back onto the enclosing guard.
///
/// The branch guards `g ∧ b` and `g ∧ ¬b` are mutually exclusive and
/// exhaustive under `g`, so `min(m, n)` copies of a func carried by both
/// sides at exactly those guards are present exactly when `g` holds. Funcs
/// under deeper conditions keep their path guards. This is the or-merge
/// canonicalisation; it shrinks downstream VCs but is not needed for
/// soundness.
fn merge_branches(
    then_view: GView<MarkedVar>,
    else_view: GView<MarkedVar>,
    guard: &BoolExpr<MarkedVar>,
    then_guard: &BoolExpr<MarkedVar>,
    else_guard: &BoolExpr<MarkedVar>,
) -> GView<MarkedVar> {
    let mut out = Multiset::new();
    let mut else_view = else_view;
    for (gf, then_count) in then_view {
        if gf.guard != *then_guard {
            out.insert(gf, then_count);
            continue;
        }
        let counterpart = GFunc::new(else_guard.clone(), gf.item.clone());
        let else_count = else_view.count_of(&counterpart);
        let shared = then_count.min(else_count);
        if shared > 0 {
            out.insert(GFunc::new(guard.clone(), gf.item.clone()), shared);
            let mut taken = Multiset::new();
            taken.insert(counterpart, shared);
            else_view = else_view.difference(&taken);
        }
        if then_count > shared {
            out.insert(gf, then_count - shared);
        }
    }
    out.union(else_view)
}

/// Distribute an extra guard over an already-guarded view. Re-exported shape
/// of the algebra's distribution law, used by downstream VC generation.
pub fn guard_gview(guard: &BoolExpr<MarkedVar>, view: GView<MarkedVar>) -> GView<MarkedVar> {
    guard_all(guard, view)
}
