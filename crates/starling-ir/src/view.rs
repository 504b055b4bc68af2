//! Multiset view algebra: funcs, views, conditional and guarded variants.
//!
//! Views are multisets of predicate applications. The multiset is backed by
//! a `BTreeMap` so equality is order-insensitive while iteration and
//! printing are canonical.

use std::collections::BTreeMap;
use std::fmt;

use crate::expr::{BoolExpr, Expr, IntExpr, TypedVar};

/// A multiset: element → multiplicity. Zero-count entries are never stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Multiset<T: Ord> {
    contents: BTreeMap<T, usize>,
}

impl<T: Ord> Default for Multiset<T> {
    fn default() -> Self {
        Self {
            contents: BTreeMap::new(),
        }
    }
}

impl<T: Ord> Multiset<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(item: T) -> Self {
        let mut m = Self::new();
        m.insert(item, 1);
        m
    }

    /// Add `count` copies of `item`.
    pub fn insert(&mut self, item: T, count: usize) {
        if count == 0 {
            return;
        }
        *self.contents.entry(item).or_insert(0) += count;
    }

    /// Total multiplicity.
    pub fn len(&self) -> usize {
        self.contents.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn count_of(&self, item: &T) -> usize {
        self.contents.get(item).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> {
        self.contents.iter().map(|(t, n)| (t, *n))
    }

    /// Multiset sum.
    pub fn union(mut self, other: Self) -> Self {
        for (item, count) in other.contents {
            self.insert(item, count);
        }
        self
    }

    /// Multiset difference, clamped at zero.
    pub fn difference(mut self, other: &Self) -> Self {
        for (item, count) in &other.contents {
            if let Some(mine) = self.contents.get_mut(item) {
                *mine = mine.saturating_sub(*count);
                if *mine == 0 {
                    self.contents.remove(item);
                }
            }
        }
        self
    }

    /// Map over elements, merging multiplicities of collisions.
    pub fn map<U: Ord, F: FnMut(T) -> U>(self, mut f: F) -> Multiset<U> {
        let mut out = Multiset::new();
        for (item, count) in self.contents {
            out.insert(f(item), count);
        }
        out
    }

    /// Flat list in canonical order, multiplicities expanded.
    pub fn to_flat_list(&self) -> Vec<&T>
    where
        T: Clone,
    {
        let mut out = Vec::with_capacity(self.len());
        for (item, count) in &self.contents {
            for _ in 0..*count {
                out.push(item);
            }
        }
        out
    }
}

impl<T: Ord> FromIterator<T> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut m = Multiset::new();
        for item in iter {
            m.insert(item, 1);
        }
        m
    }
}

impl<T: Ord> IntoIterator for Multiset<T> {
    type Item = (T, usize);
    type IntoIter = std::collections::btree_map::IntoIter<T, usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.contents.into_iter()
    }
}

/// A named application `name(p1, ..., pn)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Func<P> {
    pub name: String,
    pub params: Vec<P>,
}

impl<P> Func<P> {
    pub fn new(name: impl Into<String>, params: Vec<P>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl<P: fmt::Display> fmt::Display for Func<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")")
    }
}

/// A func over expressions, as used inside views.
pub type VFunc<V> = Func<Expr<V>>;
/// A func over typed names, as used in prototypes and definitions.
pub type DFunc = Func<TypedVar>;

/// Unordered view: multiset of funcs.
pub type View<V> = Multiset<VFunc<V>>;
/// Ordered view, used where order matters.
pub type OView<V> = Vec<VFunc<V>>;

/// A view element optionally carrying an iterator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Iterated<T> {
    pub func: T,
    pub iterator: Option<TypedVar>,
}

impl<T> Iterated<T> {
    pub fn plain(func: T) -> Self {
        Self {
            func,
            iterator: None,
        }
    }
}

/// The signature side of a view definition.
pub type DView = Vec<Iterated<DFunc>>;

/// Conditional view: multiset of conditional funcs.
pub type CView<V> = Multiset<CFunc<V>>;

/// A view element that may be conditional on a Boolean expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CFunc<V: Ord> {
    Func(VFunc<V>),
    Ite(BoolExpr<V>, CView<V>, CView<V>),
}

/// A func carrying the Boolean condition for its presence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GFunc<V> {
    pub guard: BoolExpr<V>,
    pub item: VFunc<V>,
}

impl<V> GFunc<V> {
    pub fn new(guard: BoolExpr<V>, item: VFunc<V>) -> Self {
        Self { guard, item }
    }

    /// An unconditionally-present func.
    pub fn always(item: VFunc<V>) -> Self {
        Self {
            guard: BoolExpr::Lit(true),
            item,
        }
    }
}

impl<V: fmt::Display> fmt::Display for GFunc<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} if {}", self.item, self.guard)
    }
}

/// Guarded view: multiset of guarded funcs.
pub type GView<V> = Multiset<GFunc<V>>;

/// Conjoin `guard` onto a Boolean expression, keeping `true` transparent.
pub fn conjoin<V: Ord + Clone>(guard: &BoolExpr<V>, with: BoolExpr<V>) -> BoolExpr<V> {
    match (guard, &with) {
        (BoolExpr::Lit(true), _) => with,
        (_, BoolExpr::Lit(true)) => guard.clone(),
        _ => BoolExpr::And(vec![guard.clone(), with]),
    }
}

/// Distribute `guard` over every element of a guarded view.
pub fn guard_all<V: Ord + Clone>(guard: &BoolExpr<V>, view: GView<V>) -> GView<V> {
    view.map(|gf| GFunc {
        guard: conjoin(guard, gf.guard),
        item: gf.item,
    })
}

/// A guarded func with an iteration count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IteratedGFunc<V> {
    pub func: GFunc<V>,
    pub num_iterations: IntExpr<V>,
}

impl<V: Clone + Ord> IteratedGFunc<V> {
    /// Multiply the iteration count by `k`, folding literal counts.
    pub fn normalise(self, k: i64) -> Self {
        let num_iterations = match self.num_iterations {
            IntExpr::Lit(n) => IntExpr::Lit(n * k),
            IntExpr::Mul(mut xs) => {
                // Fold the new constant into an existing literal factor.
                match xs.iter_mut().find_map(|x| match x {
                    IntExpr::Lit(n) => Some(n),
                    _ => None,
                }) {
                    Some(n) => *n *= k,
                    None => xs.push(IntExpr::Lit(k)),
                }
                IntExpr::Mul(xs)
            }
            other => IntExpr::mul(vec![other, IntExpr::Lit(k)]),
        };
        Self {
            func: self.func,
            num_iterations,
        }
    }
}

impl<V> Func<Expr<V>> {
    /// Rename every variable in the func's arguments.
    pub fn map_vars<W, F: Fn(&V) -> W>(&self, f: &F) -> Func<Expr<W>> {
        Func {
            name: self.name.clone(),
            params: self.params.iter().map(|p| p.map_vars(f)).collect(),
        }
    }
}

impl<V: Ord> CFunc<V> {
    /// Rename every variable in the func, recursing through conditionals.
    pub fn map_vars<W: Ord, F: Fn(&V) -> W>(&self, f: &F) -> CFunc<W> {
        match self {
            CFunc::Func(func) => CFunc::Func(func.map_vars(f)),
            CFunc::Ite(cond, then_view, else_view) => CFunc::Ite(
                cond.map_vars(f),
                map_cview_vars(then_view, f),
                map_cview_vars(else_view, f),
            ),
        }
    }
}

/// Rename every variable in a conditional view.
pub fn map_cview_vars<V: Ord, W: Ord, F: Fn(&V) -> W>(view: &CView<V>, f: &F) -> CView<W> {
    let mut out = Multiset::new();
    for (cf, count) in view.iter() {
        out.insert(cf.map_vars(f), count);
    }
    out
}

/// A view wrapped with its usage kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViewExpr<V> {
    /// Must be exercised by the proof.
    Mandatory(V),
    /// May be elided by downstream passes.
    Advisory(V),
}

impl<V> ViewExpr<V> {
    pub fn view(&self) -> &V {
        match self {
            ViewExpr::Mandatory(v) | ViewExpr::Advisory(v) => v,
        }
    }

    pub fn is_advisory(&self) -> bool {
        matches!(self, ViewExpr::Advisory(_))
    }

    /// Rebuild with a transformed view, preserving the kind.
    pub fn map<W, F: FnOnce(V) -> W>(self, f: F) -> ViewExpr<W> {
        match self {
            ViewExpr::Mandatory(v) => ViewExpr::Mandatory(f(v)),
            ViewExpr::Advisory(v) => ViewExpr::Advisory(f(v)),
        }
    }
}
