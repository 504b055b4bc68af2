//! Typed expression trees and the variable core.
//!
//! Expressions are generic over the variable type `V`: surface expressions
//! use `String`, post-modelling expressions use [`MarkedVar`]. Every variable
//! position holds a [`Sym`], so an uninterpreted symbol can stand in for any
//! construct the core cannot natively model.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// The two primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    Int,
    Bool,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
        }
    }
}

/// A type paired with an identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypedVar {
    pub name: String,
    pub ty: Type,
}

impl TypedVar {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for TypedVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// Temporal role of a variable occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mark {
    /// Pre-state of an atomic step.
    Before,
    /// Post-state of an atomic step.
    After,
    /// The k-th internal stage of a composed command.
    Intermediate(u32),
    /// A proof goal's k-th fresh copy.
    Goal(u32),
}

impl Mark {
    pub fn var(self, name: impl Into<String>) -> MarkedVar {
        MarkedVar {
            name: name.into(),
            mark: self,
        }
    }
}

/// A variable annotated with its temporal role.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MarkedVar {
    pub name: String,
    pub mark: Mark,
}

impl fmt::Display for MarkedVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mark {
            Mark::Before => write!(f, "{}!before", self.name),
            Mark::After => write!(f, "{}!after", self.name),
            Mark::Intermediate(k) => write!(f, "{}!int:{k}", self.name),
            Mark::Goal(k) => write!(f, "{}!goal:{k}", self.name),
        }
    }
}

/// A variable position: a regular variable or an uninterpreted symbol.
///
/// Symbol names are opaque text; their arguments are real expressions and
/// participate in traversal and substitution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sym<V> {
    Reg(V),
    Sym { name: String, args: Vec<Expr<V>> },
}

/// Integer expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntExpr<V> {
    Lit(i64),
    Var(Sym<V>),
    Add(Vec<IntExpr<V>>),
    Sub(Vec<IntExpr<V>>),
    Mul(Vec<IntExpr<V>>),
    Div(Box<IntExpr<V>>, Box<IntExpr<V>>),
}

/// Boolean expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BoolExpr<V> {
    Lit(bool),
    Var(Sym<V>),
    And(Vec<BoolExpr<V>>),
    Or(Vec<BoolExpr<V>>),
    Not(Box<BoolExpr<V>>),
    Implies(Box<BoolExpr<V>>, Box<BoolExpr<V>>),
    /// Polymorphic equality: both sides must have the same type.
    Eq(Box<Expr<V>>, Box<Expr<V>>),
    Gt(Box<IntExpr<V>>, Box<IntExpr<V>>),
    Ge(Box<IntExpr<V>>, Box<IntExpr<V>>),
    Lt(Box<IntExpr<V>>, Box<IntExpr<V>>),
    Le(Box<IntExpr<V>>, Box<IntExpr<V>>),
}

/// Expression of either type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expr<V> {
    Int(IntExpr<V>),
    Bool(BoolExpr<V>),
}

impl<V> Expr<V> {
    pub fn ty(&self) -> Type {
        match self {
            Expr::Int(_) => Type::Int,
            Expr::Bool(_) => Type::Bool,
        }
    }
}

impl<V> IntExpr<V> {
    pub fn lit(n: i64) -> Self {
        IntExpr::Lit(n)
    }

    pub fn var(v: V) -> Self {
        IntExpr::Var(Sym::Reg(v))
    }

    pub fn sym(name: impl Into<String>, args: Vec<Expr<V>>) -> Self {
        IntExpr::Var(Sym::Sym {
            name: name.into(),
            args,
        })
    }

    pub fn add(mut xs: Vec<IntExpr<V>>) -> Self {
        match xs.len() {
            0 => IntExpr::Lit(0),
            1 => xs.remove(0),
            _ => IntExpr::Add(xs),
        }
    }

    pub fn sub(mut xs: Vec<IntExpr<V>>) -> Self {
        match xs.len() {
            1 => xs.remove(0),
            _ => IntExpr::Sub(xs),
        }
    }

    pub fn mul(mut xs: Vec<IntExpr<V>>) -> Self {
        match xs.len() {
            0 => IntExpr::Lit(1),
            1 => xs.remove(0),
            _ => IntExpr::Mul(xs),
        }
    }

    pub fn div(num: IntExpr<V>, den: IntExpr<V>) -> Self {
        IntExpr::Div(Box::new(num), Box::new(den))
    }
}

#[allow(clippy::should_implement_trait)]
impl<V> BoolExpr<V> {
    pub fn lit(b: bool) -> Self {
        BoolExpr::Lit(b)
    }

    pub fn var(v: V) -> Self {
        BoolExpr::Var(Sym::Reg(v))
    }

    pub fn sym(name: impl Into<String>, args: Vec<Expr<V>>) -> Self {
        BoolExpr::Var(Sym::Sym {
            name: name.into(),
            args,
        })
    }

    /// `and [] → true`, `and [x] → x`.
    pub fn and(mut xs: Vec<BoolExpr<V>>) -> Self {
        match xs.len() {
            0 => BoolExpr::Lit(true),
            1 => xs.remove(0),
            _ => BoolExpr::And(xs),
        }
    }

    /// `or [] → false`, `or [x] → x`.
    pub fn or(mut xs: Vec<BoolExpr<V>>) -> Self {
        match xs.len() {
            0 => BoolExpr::Lit(false),
            1 => xs.remove(0),
            _ => BoolExpr::Or(xs),
        }
    }

    pub fn not(self) -> Self {
        BoolExpr::Not(Box::new(self))
    }

    /// `implies(false, _) → true`, `implies(_, true) → true`.
    pub fn implies(self, conseq: BoolExpr<V>) -> Self {
        match (self, conseq) {
            (BoolExpr::Lit(false), _) => BoolExpr::Lit(true),
            (_, BoolExpr::Lit(true)) => BoolExpr::Lit(true),
            (l, r) => BoolExpr::Implies(Box::new(l), Box::new(r)),
        }
    }

    /// No syntactic-identity folding: `eq(x, x)` stays a node, since `x` may
    /// contain symbols whose two occurrences need not agree after
    /// approximation.
    pub fn eq(lhs: Expr<V>, rhs: Expr<V>) -> Self {
        BoolExpr::Eq(Box::new(lhs), Box::new(rhs))
    }

    pub fn gt(lhs: IntExpr<V>, rhs: IntExpr<V>) -> Self {
        BoolExpr::Gt(Box::new(lhs), Box::new(rhs))
    }

    pub fn ge(lhs: IntExpr<V>, rhs: IntExpr<V>) -> Self {
        BoolExpr::Ge(Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(lhs: IntExpr<V>, rhs: IntExpr<V>) -> Self {
        BoolExpr::Lt(Box::new(lhs), Box::new(rhs))
    }

    pub fn le(lhs: IntExpr<V>, rhs: IntExpr<V>) -> Self {
        BoolExpr::Le(Box::new(lhs), Box::new(rhs))
    }
}

// ---------------------------------------------------------------
// Variable renaming (marking)
// ---------------------------------------------------------------

impl<V> Sym<V> {
    pub fn map_vars<W, F: Fn(&V) -> W>(&self, f: &F) -> Sym<W> {
        match self {
            Sym::Reg(v) => Sym::Reg(f(v)),
            // The symbol name is untouched; only its arguments are remarked.
            Sym::Sym { name, args } => Sym::Sym {
                name: name.clone(),
                args: args.iter().map(|a| a.map_vars(f)).collect(),
            },
        }
    }
}

impl<V> IntExpr<V> {
    pub fn map_vars<W, F: Fn(&V) -> W>(&self, f: &F) -> IntExpr<W> {
        match self {
            IntExpr::Lit(n) => IntExpr::Lit(*n),
            IntExpr::Var(s) => IntExpr::Var(s.map_vars(f)),
            IntExpr::Add(xs) => IntExpr::Add(xs.iter().map(|x| x.map_vars(f)).collect()),
            IntExpr::Sub(xs) => IntExpr::Sub(xs.iter().map(|x| x.map_vars(f)).collect()),
            IntExpr::Mul(xs) => IntExpr::Mul(xs.iter().map(|x| x.map_vars(f)).collect()),
            IntExpr::Div(n, d) => {
                IntExpr::Div(Box::new(n.map_vars(f)), Box::new(d.map_vars(f)))
            }
        }
    }
}

impl<V> BoolExpr<V> {
    pub fn map_vars<W, F: Fn(&V) -> W>(&self, f: &F) -> BoolExpr<W> {
        match self {
            BoolExpr::Lit(b) => BoolExpr::Lit(*b),
            BoolExpr::Var(s) => BoolExpr::Var(s.map_vars(f)),
            BoolExpr::And(xs) => BoolExpr::And(xs.iter().map(|x| x.map_vars(f)).collect()),
            BoolExpr::Or(xs) => BoolExpr::Or(xs.iter().map(|x| x.map_vars(f)).collect()),
            BoolExpr::Not(x) => BoolExpr::Not(Box::new(x.map_vars(f))),
            BoolExpr::Implies(l, r) => {
                BoolExpr::Implies(Box::new(l.map_vars(f)), Box::new(r.map_vars(f)))
            }
            BoolExpr::Eq(l, r) => BoolExpr::Eq(Box::new(l.map_vars(f)), Box::new(r.map_vars(f))),
            BoolExpr::Gt(l, r) => BoolExpr::Gt(Box::new(l.map_vars(f)), Box::new(r.map_vars(f))),
            BoolExpr::Ge(l, r) => BoolExpr::Ge(Box::new(l.map_vars(f)), Box::new(r.map_vars(f))),
            BoolExpr::Lt(l, r) => BoolExpr::Lt(Box::new(l.map_vars(f)), Box::new(r.map_vars(f))),
            BoolExpr::Le(l, r) => BoolExpr::Le(Box::new(l.map_vars(f)), Box::new(r.map_vars(f))),
        }
    }
}

impl<V> Expr<V> {
    pub fn map_vars<W, F: Fn(&V) -> W>(&self, f: &F) -> Expr<W> {
        match self {
            Expr::Int(e) => Expr::Int(e.map_vars(f)),
            Expr::Bool(e) => Expr::Bool(e.map_vars(f)),
        }
    }
}

impl IntExpr<String> {
    /// Replace every regular variable with its `mark`-annotated form.
    pub fn marked(&self, mark: Mark) -> IntExpr<MarkedVar> {
        self.map_vars(&|v| mark.var(v.as_str()))
    }
}

impl BoolExpr<String> {
    pub fn marked(&self, mark: Mark) -> BoolExpr<MarkedVar> {
        self.map_vars(&|v| mark.var(v.as_str()))
    }
}

impl Expr<String> {
    pub fn marked(&self, mark: Mark) -> Expr<MarkedVar> {
        self.map_vars(&|v| mark.var(v.as_str()))
    }
}

// ---------------------------------------------------------------
// Polarity and symbol approximation
// ---------------------------------------------------------------

/// Polarity of a Boolean position.
///
/// Tracked explicitly so approximation soundness does not depend on ambient
/// state: the context flips under negation and on the antecedent of an
/// implication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Positive,
    Negative,
}

impl Position {
    pub fn flip(self) -> Self {
        match self {
            Position::Positive => Position::Negative,
            Position::Negative => Position::Positive,
        }
    }

    /// The sound underapproximation of an opaque Boolean atom here.
    pub fn approx<V>(self) -> BoolExpr<V> {
        match self {
            Position::Positive => BoolExpr::Lit(false),
            Position::Negative => BoolExpr::Lit(true),
        }
    }
}

impl<V> Sym<V> {
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Sym::Sym { .. })
    }
}

impl<V> IntExpr<V> {
    pub fn has_sym(&self) -> bool {
        match self {
            IntExpr::Lit(_) => false,
            IntExpr::Var(s) => s.is_symbolic(),
            IntExpr::Add(xs) | IntExpr::Sub(xs) | IntExpr::Mul(xs) => {
                xs.iter().any(IntExpr::has_sym)
            }
            IntExpr::Div(n, d) => n.has_sym() || d.has_sym(),
        }
    }
}

impl<V> BoolExpr<V> {
    pub fn has_sym(&self) -> bool {
        match self {
            BoolExpr::Lit(_) => false,
            BoolExpr::Var(s) => s.is_symbolic(),
            BoolExpr::And(xs) | BoolExpr::Or(xs) => xs.iter().any(BoolExpr::has_sym),
            BoolExpr::Not(x) => x.has_sym(),
            BoolExpr::Implies(l, r) => l.has_sym() || r.has_sym(),
            BoolExpr::Eq(l, r) => l.has_sym() || r.has_sym(),
            BoolExpr::Gt(l, r) | BoolExpr::Ge(l, r) | BoolExpr::Lt(l, r) | BoolExpr::Le(l, r) => {
                l.has_sym() || r.has_sym()
            }
        }
    }
}

impl<V> Expr<V> {
    pub fn has_sym(&self) -> bool {
        match self {
            Expr::Int(e) => e.has_sym(),
            Expr::Bool(e) => e.has_sym(),
        }
    }
}

impl<V: Clone> BoolExpr<V> {
    /// Underapproximate every symbol in a Boolean position.
    ///
    /// A symbol standing as a Boolean atom, or a comparison whose operands
    /// contain symbols, is replaced wholesale by `false` in positive
    /// position and `true` in negative position. Integer positions outside
    /// comparisons are never rewritten. The result is a sound weakening
    /// amenable to SMT.
    pub fn under_approx(&self, pos: Position) -> BoolExpr<V> {
        match self {
            BoolExpr::Lit(b) => BoolExpr::Lit(*b),
            BoolExpr::Var(Sym::Reg(v)) => BoolExpr::Var(Sym::Reg(v.clone())),
            BoolExpr::Var(Sym::Sym { .. }) => pos.approx(),
            BoolExpr::And(xs) => {
                BoolExpr::and(xs.iter().map(|x| x.under_approx(pos)).collect())
            }
            BoolExpr::Or(xs) => BoolExpr::or(xs.iter().map(|x| x.under_approx(pos)).collect()),
            BoolExpr::Not(x) => BoolExpr::Not(Box::new(x.under_approx(pos.flip()))),
            BoolExpr::Implies(l, r) => {
                l.under_approx(pos.flip()).implies(r.under_approx(pos))
            }
            // The polarity of a sub-position of a comparison is not
            // monotone, so the whole comparison is the atom.
            cmp @ (BoolExpr::Eq(..)
            | BoolExpr::Gt(..)
            | BoolExpr::Ge(..)
            | BoolExpr::Lt(..)
            | BoolExpr::Le(..)) => {
                if cmp.has_sym() {
                    pos.approx()
                } else {
                    cmp.clone()
                }
            }
        }
    }
}

// ---------------------------------------------------------------
// Symbol removal
// ---------------------------------------------------------------

/// Returned when a tree that must be symbol-free still contains a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("uninterpreted symbol '{0}' remains in an expression bound for the solver")]
pub struct SymbolPresent(pub String);

impl<V> IntExpr<V> {
    fn first_sym(&self) -> Option<&str> {
        match self {
            IntExpr::Lit(_) => None,
            IntExpr::Var(Sym::Reg(_)) => None,
            IntExpr::Var(Sym::Sym { name, .. }) => Some(name),
            IntExpr::Add(xs) | IntExpr::Sub(xs) | IntExpr::Mul(xs) => {
                xs.iter().find_map(IntExpr::first_sym)
            }
            IntExpr::Div(n, d) => n.first_sym().or_else(|| d.first_sym()),
        }
    }
}

impl<V> BoolExpr<V> {
    fn first_sym(&self) -> Option<&str> {
        match self {
            BoolExpr::Lit(_) => None,
            BoolExpr::Var(Sym::Reg(_)) => None,
            BoolExpr::Var(Sym::Sym { name, .. }) => Some(name),
            BoolExpr::And(xs) | BoolExpr::Or(xs) => xs.iter().find_map(BoolExpr::first_sym),
            BoolExpr::Not(x) => x.first_sym(),
            BoolExpr::Implies(l, r) => l.first_sym().or_else(|| r.first_sym()),
            BoolExpr::Eq(l, r) => l.first_sym().or_else(|| r.first_sym()),
            BoolExpr::Gt(l, r) | BoolExpr::Ge(l, r) | BoolExpr::Lt(l, r) | BoolExpr::Le(l, r) => {
                l.first_sym().or_else(|| r.first_sym())
            }
        }
    }
}

impl<V> Expr<V> {
    fn first_sym(&self) -> Option<&str> {
        match self {
            Expr::Int(e) => e.first_sym(),
            Expr::Bool(e) => e.first_sym(),
        }
    }
}

impl<V: Clone> BoolExpr<V> {
    /// Fail if any symbol remains; downstream SMT encoding requires
    /// symbol-free trees.
    pub fn ensure_sym_free(&self) -> Result<BoolExpr<V>, SymbolPresent> {
        match self.first_sym() {
            Some(name) => Err(SymbolPresent(name.to_string())),
            None => Ok(self.clone()),
        }
    }
}

impl<V: Clone> Expr<V> {
    pub fn ensure_sym_free(&self) -> Result<Expr<V>, SymbolPresent> {
        match self.first_sym() {
            Some(name) => Err(SymbolPresent(name.to_string())),
            None => Ok(self.clone()),
        }
    }
}

// ---------------------------------------------------------------
// Free variables
// ---------------------------------------------------------------

impl<V: Ord + Clone> Sym<V> {
    fn collect_vars(&self, out: &mut BTreeSet<V>) {
        match self {
            Sym::Reg(v) => {
                out.insert(v.clone());
            }
            Sym::Sym { args, .. } => {
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }
}

impl<V: Ord + Clone> IntExpr<V> {
    fn collect_vars(&self, out: &mut BTreeSet<V>) {
        match self {
            IntExpr::Lit(_) => {}
            IntExpr::Var(s) => s.collect_vars(out),
            IntExpr::Add(xs) | IntExpr::Sub(xs) | IntExpr::Mul(xs) => {
                for x in xs {
                    x.collect_vars(out);
                }
            }
            IntExpr::Div(n, d) => {
                n.collect_vars(out);
                d.collect_vars(out);
            }
        }
    }

    pub fn free_vars(&self) -> BTreeSet<V> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }
}

impl<V: Ord + Clone> BoolExpr<V> {
    fn collect_vars(&self, out: &mut BTreeSet<V>) {
        match self {
            BoolExpr::Lit(_) => {}
            BoolExpr::Var(s) => s.collect_vars(out),
            BoolExpr::And(xs) | BoolExpr::Or(xs) => {
                for x in xs {
                    x.collect_vars(out);
                }
            }
            BoolExpr::Not(x) => x.collect_vars(out),
            BoolExpr::Implies(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            BoolExpr::Eq(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            BoolExpr::Gt(l, r) | BoolExpr::Ge(l, r) | BoolExpr::Lt(l, r) | BoolExpr::Le(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
        }
    }

    pub fn free_vars(&self) -> BTreeSet<V> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }
}

impl<V: Ord + Clone> Expr<V> {
    fn collect_vars(&self, out: &mut BTreeSet<V>) {
        match self {
            Expr::Int(e) => e.collect_vars(out),
            Expr::Bool(e) => e.collect_vars(out),
        }
    }

    pub fn free_vars(&self) -> BTreeSet<V> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }
}

impl BoolExpr<MarkedVar> {
    /// Highest `Intermediate(k)` stage mentioned, if any. Used when
    /// sequentially composing command relations.
    pub fn highest_intermediate(&self) -> Option<u32> {
        self.free_vars()
            .into_iter()
            .filter_map(|v| match v.mark {
                Mark::Intermediate(k) => Some(k),
                _ => None,
            })
            .max()
    }
}

// ---------------------------------------------------------------
// Display
// ---------------------------------------------------------------

impl<V: fmt::Display> fmt::Display for Sym<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sym::Reg(v) => write!(f, "{v}"),
            Sym::Sym { name, args } => {
                write!(f, "%{{{name}}}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    xs: &[T],
    sep: &str,
) -> fmt::Result {
    write!(f, "(")?;
    for (i, x) in xs.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        write!(f, "{x}")?;
    }
    write!(f, ")")
}

impl<V: fmt::Display> fmt::Display for IntExpr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntExpr::Lit(n) => write!(f, "{n}"),
            IntExpr::Var(s) => write!(f, "{s}"),
            IntExpr::Add(xs) => write_joined(f, xs, "+"),
            IntExpr::Sub(xs) => write_joined(f, xs, "-"),
            IntExpr::Mul(xs) => write_joined(f, xs, "*"),
            IntExpr::Div(n, d) => write!(f, "({n} / {d})"),
        }
    }
}

impl<V: fmt::Display> fmt::Display for BoolExpr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolExpr::Lit(b) => write!(f, "{b}"),
            BoolExpr::Var(s) => write!(f, "{s}"),
            BoolExpr::And(xs) => write_joined(f, xs, "&&"),
            BoolExpr::Or(xs) => write_joined(f, xs, "||"),
            BoolExpr::Not(x) => write!(f, "!{x}"),
            BoolExpr::Implies(l, r) => write!(f, "({l} => {r})"),
            BoolExpr::Eq(l, r) => write!(f, "({l} == {r})"),
            BoolExpr::Gt(l, r) => write!(f, "({l} > {r})"),
            BoolExpr::Ge(l, r) => write!(f, "({l} >= {r})"),
            BoolExpr::Lt(l, r) => write!(f, "({l} < {r})"),
            BoolExpr::Le(l, r) => write!(f, "({l} <= {r})"),
        }
    }
}

impl<V: fmt::Display> fmt::Display for Expr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(e) => write!(f, "{e}"),
            Expr::Bool(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bsym(name: &str) -> BoolExpr<String> {
        BoolExpr::sym(name, vec![])
    }

    // ---------------------------------------------------------------
    // Smart constructors
    // ---------------------------------------------------------------

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        assert_eq!(BoolExpr::<String>::and(vec![]), BoolExpr::Lit(true));
        assert_eq!(BoolExpr::<String>::or(vec![]), BoolExpr::Lit(false));
    }

    #[test]
    fn singleton_and_or_collapse() {
        let x = BoolExpr::var("x".to_string());
        assert_eq!(BoolExpr::and(vec![x.clone()]), x);
        assert_eq!(BoolExpr::or(vec![x.clone()]), x);
    }

    #[test]
    fn implies_false_antecedent_and_true_consequent_fold() {
        let x = BoolExpr::var("x".to_string());
        assert_eq!(
            BoolExpr::Lit(false).implies(x.clone()),
            BoolExpr::Lit(true)
        );
        assert_eq!(x.clone().implies(BoolExpr::Lit(true)), BoolExpr::Lit(true));
        assert!(matches!(
            x.clone().implies(BoolExpr::Lit(false)),
            BoolExpr::Implies(..)
        ));
    }

    #[test]
    fn eq_of_identical_terms_is_not_folded() {
        let x: Expr<String> = Expr::Int(IntExpr::var("x".to_string()));
        let eq = BoolExpr::eq(x.clone(), x);
        assert!(matches!(eq, BoolExpr::Eq(..)));
    }

    #[test]
    fn arithmetic_builders_collapse_trivial_lists() {
        assert_eq!(IntExpr::<String>::add(vec![]), IntExpr::Lit(0));
        assert_eq!(IntExpr::<String>::mul(vec![]), IntExpr::Lit(1));
        let x = IntExpr::var("x".to_string());
        assert_eq!(IntExpr::add(vec![x.clone()]), x);
    }

    // ---------------------------------------------------------------
    // Marking
    // ---------------------------------------------------------------

    #[test]
    fn marking_replaces_regular_vars() {
        let e = BoolExpr::eq(
            Expr::Int(IntExpr::var("x".to_string())),
            Expr::Int(IntExpr::Lit(1)),
        );
        let marked = e.marked(Mark::Before);
        assert_eq!(
            marked.free_vars().into_iter().collect::<Vec<_>>(),
            vec![Mark::Before.var("x")]
        );
    }

    #[test]
    fn marking_recurses_into_symbol_args_but_not_names() {
        let e: BoolExpr<String> =
            BoolExpr::sym("opaque", vec![Expr::Int(IntExpr::var("x".to_string()))]);
        let marked = e.marked(Mark::After);
        match marked {
            BoolExpr::Var(Sym::Sym { name, args }) => {
                assert_eq!(name, "opaque");
                assert_eq!(args[0], Expr::Int(IntExpr::var(Mark::After.var("x"))));
            }
            other => panic!("expected symbol, got {other:?}"),
        }
    }

    #[test]
    fn intermediate_marks_are_ranked() {
        let e = BoolExpr::and(vec![
            BoolExpr::var(Mark::Intermediate(2).var("x")),
            BoolExpr::var(Mark::Intermediate(5).var("y")),
            BoolExpr::var(Mark::Before.var("z")),
        ]);
        assert_eq!(e.highest_intermediate(), Some(5));
    }

    // ---------------------------------------------------------------
    // Polarity and approximation
    // ---------------------------------------------------------------

    #[test]
    fn positive_symbol_underapproximates_to_false() {
        assert_eq!(
            bsym("s").under_approx(Position::Positive),
            BoolExpr::Lit(false)
        );
    }

    #[test]
    fn negated_symbol_underapproximates_to_not_true() {
        let e = bsym("s").not();
        assert_eq!(
            e.under_approx(Position::Positive),
            BoolExpr::Not(Box::new(BoolExpr::Lit(true)))
        );
    }

    #[test]
    fn implication_antecedent_flips_polarity() {
        let e = bsym("s").implies(BoolExpr::var("x".to_string()));
        // Antecedent is negative: symbol becomes true.
        assert_eq!(
            e.under_approx(Position::Positive),
            BoolExpr::Lit(true).implies(BoolExpr::var("x".to_string()))
        );
    }

    #[test]
    fn doubly_nested_implication_restores_positive_polarity() {
        // implies(implies(sym, sym), sym): the middle symbol sits in
        // negative-then-negative, i.e. positive, position.
        let e = bsym("a").implies(bsym("b")).implies(bsym("c"));
        let approx = e.under_approx(Position::Positive);
        // Inner antecedent: a at flip(flip(pos)) = positive -> false, so the
        // inner implication folds to true; c at positive -> false.
        assert_eq!(
            approx,
            BoolExpr::Implies(
                Box::new(BoolExpr::Lit(true)),
                Box::new(BoolExpr::Lit(false))
            )
        );
    }

    #[test]
    fn comparison_containing_symbol_is_an_atom() {
        let e: BoolExpr<String> = BoolExpr::gt(IntExpr::sym("len", vec![]), IntExpr::Lit(0));
        assert_eq!(e.under_approx(Position::Positive), BoolExpr::Lit(false));
        assert_eq!(e.under_approx(Position::Negative), BoolExpr::Lit(true));
    }

    #[test]
    fn symbol_free_comparison_is_untouched() {
        let e: BoolExpr<String> =
            BoolExpr::gt(IntExpr::var("x".to_string()), IntExpr::Lit(0));
        assert_eq!(e.under_approx(Position::Positive), e);
    }

    // ---------------------------------------------------------------
    // Symbol removal and free variables
    // ---------------------------------------------------------------

    #[test]
    fn sym_free_tree_passes_removal() {
        let e: BoolExpr<String> =
            BoolExpr::ge(IntExpr::var("ticket".to_string()), IntExpr::var("serving".to_string()));
        assert_eq!(e.ensure_sym_free(), Ok(e.clone()));
    }

    #[test]
    fn remaining_symbol_fails_removal_with_its_name() {
        let e = BoolExpr::and(vec![
            BoolExpr::var("x".to_string()),
            bsym("stubborn"),
        ]);
        assert_eq!(
            e.ensure_sym_free(),
            Err(SymbolPresent("stubborn".to_string()))
        );
    }

    #[test]
    fn free_vars_sees_through_symbol_args() {
        let e: BoolExpr<String> = BoolExpr::and(vec![
            BoolExpr::var("a".to_string()),
            BoolExpr::sym("f", vec![Expr::Int(IntExpr::var("b".to_string()))]),
        ]);
        let vars: Vec<_> = e.free_vars().into_iter().collect();
        assert_eq!(vars, vec!["a".to_string(), "b".to_string()]);
    }
}
