//! The model: commands, structured bodies, axioms, view definitions, and the
//! top-level container threaded through the pipeline stages.

use std::fmt;

use indexmap::IndexMap;

use crate::expr::{BoolExpr, Expr, MarkedVar, Type, TypedVar};
use crate::view::{DView, DFunc};

/// One invocation of an atomic primitive: `results := name(params)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandType<V> {
    pub results: Vec<TypedVar>,
    pub name: String,
    pub params: Vec<Expr<V>>,
}

impl<V> CommandType<V> {
    pub fn new(results: Vec<TypedVar>, name: impl Into<String>, params: Vec<Expr<V>>) -> Self {
        Self {
            results,
            name: name.into(),
            params,
        }
    }
}

impl<V: fmt::Display> fmt::Display for CommandType<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.results.is_empty() {
            for (i, r) in self.results.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", r.name)?;
            }
            write!(f, " := ")?;
        }
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

/// Sequential composition of primitive invocations.
pub type Command<V> = Vec<CommandType<V>>;

/// A structured command over views of type `V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartCmd<V> {
    /// An atomic step.
    Prim(Command<MarkedVar>),
    While {
        is_do: bool,
        cond: BoolExpr<MarkedVar>,
        inner: Block<V>,
    },
    Ite {
        cond: BoolExpr<MarkedVar>,
        then_block: Block<V>,
        else_block: Block<V>,
    },
}

/// `{pre} c1 {v1} c2 {v2} ... cn {vn}` — alternating views and commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<V> {
    pub pre: V,
    pub steps: Vec<(PartCmd<V>, V)>,
}

impl<V> Block<V> {
    /// The view the block ends in: the last step's postcondition, or the
    /// precondition of an empty block.
    pub fn post(&self) -> &V {
        self.steps.last().map(|(_, v)| v).unwrap_or(&self.pre)
    }

    /// Transform every view in the block, preserving structure.
    pub fn map_view<W, F: FnMut(V) -> W>(self, f: &mut F) -> Block<W> {
        Block {
            pre: f(self.pre),
            steps: self
                .steps
                .into_iter()
                .map(|(cmd, view)| (cmd.map_view(f), f(view)))
                .collect(),
        }
    }
}

impl<V> PartCmd<V> {
    pub fn map_view<W, F: FnMut(V) -> W>(self, f: &mut F) -> PartCmd<W> {
        match self {
            PartCmd::Prim(c) => PartCmd::Prim(c),
            PartCmd::While { is_do, cond, inner } => PartCmd::While {
                is_do,
                cond,
                inner: inner.map_view(f),
            },
            PartCmd::Ite {
                cond,
                then_block,
                else_block,
            } => PartCmd::Ite {
                cond,
                then_block: then_block.map_view(f),
                else_block: else_block.map_view(f),
            },
        }
    }
}

/// A Hoare triple over views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axiom<V, C> {
    pub pre: V,
    pub cmd: C,
    pub post: V,
}

/// A verification-condition obligation. Not produced by the core pipeline,
/// but the shape downstream VC generation consumes is fixed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term<C, W, G> {
    pub cmd: C,
    pub wpre: W,
    pub goal: G,
}

/// Semantic constraint attached to a view signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewDef {
    /// The view is equivalent to the body.
    Definite {
        view: DView,
        body: BoolExpr<String>,
    },
    /// Definition left for a downstream synthesis pass.
    Indefinite { view: DView },
    /// The body is an opaque symbol.
    Uninterpreted { view: DView, symbol: String },
}

impl ViewDef {
    pub fn view(&self) -> &DView {
        match self {
            ViewDef::Definite { view, .. }
            | ViewDef::Indefinite { view }
            | ViewDef::Uninterpreted { view, .. } => view,
        }
    }
}

/// Signature of a declared view prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proto {
    pub params: Vec<TypedVar>,
    pub iterated: bool,
    /// Declared without a parameter list at all.
    pub anonymous: bool,
}

/// The top-level model container, parameterised by the per-method axiom
/// value `A` and the view-definition type `D`.
///
/// Each pipeline stage consumes its input model and produces a new one;
/// nothing is mutated downstream of its creating stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model<A, D> {
    /// Shared (process-wide) variables.
    pub globals: IndexMap<String, Type>,
    /// Thread-local variables.
    pub locals: IndexMap<String, Type>,
    /// Method name → axiom-like value, in source order.
    pub axioms: IndexMap<String, A>,
    /// Relation defining each atomic primitive over Before/After marks.
    pub semantics: Vec<(DFunc, BoolExpr<MarkedVar>)>,
    /// Declared view prototypes.
    pub view_protos: IndexMap<String, Proto>,
    /// Per-signature semantic constraints.
    pub view_defs: Vec<D>,
}

impl<A, D> Model<A, D> {
    /// Rebuild the container with transformed axioms.
    pub fn map_axioms<B, F: FnMut(A) -> B>(self, mut f: F) -> Model<B, D> {
        Model {
            globals: self.globals,
            locals: self.locals,
            axioms: self.axioms.into_iter().map(|(k, a)| (k, f(a))).collect(),
            semantics: self.semantics,
            view_protos: self.view_protos,
            view_defs: self.view_defs,
        }
    }

    /// Rebuild the container with fallibly transformed axioms, stopping at
    /// the first failure.
    pub fn try_map_axioms<B, E, F: FnMut(&str, A) -> Result<B, E>>(
        self,
        mut f: F,
    ) -> Result<Model<B, D>, E> {
        let mut axioms = IndexMap::with_capacity(self.axioms.len());
        for (k, a) in self.axioms {
            let b = f(&k, a)?;
            axioms.insert(k, b);
        }
        Ok(Model {
            globals: self.globals,
            locals: self.locals,
            axioms,
            semantics: self.semantics,
            view_protos: self.view_protos,
            view_defs: self.view_defs,
        })
    }

    pub fn type_of(&self, name: &str) -> Option<Type> {
        self.locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .copied()
    }
}

impl<A, D> fmt::Display for Model<A, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model:")?;
        writeln!(f, "  Shared:")?;
        for (name, ty) in &self.globals {
            writeln!(f, "    {name}: {ty}")?;
        }
        writeln!(f, "  Thread-local:")?;
        for (name, ty) in &self.locals {
            writeln!(f, "    {name}: {ty}")?;
        }
        writeln!(f, "  Prototypes:")?;
        for (name, proto) in &self.view_protos {
            write!(f, "    {name}(")?;
            for (i, p) in proto.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{p}")?;
            }
            writeln!(f, "){}", if proto.iterated { " iter" } else { "" })?;
        }
        writeln!(f, "  Primitives:")?;
        for (sig, _) in &self.semantics {
            writeln!(f, "    {sig}")?;
        }
        writeln!(f, "  Methods:")?;
        for name in self.axioms.keys() {
            writeln!(f, "    {name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_model() -> Model<u32, ViewDef> {
        Model {
            globals: IndexMap::new(),
            locals: IndexMap::new(),
            axioms: IndexMap::from([("a".to_string(), 1u32), ("b".to_string(), 2u32)]),
            semantics: Vec::new(),
            view_protos: IndexMap::new(),
            view_defs: Vec::new(),
        }
    }

    #[test]
    fn map_axioms_preserves_method_order() {
        let m = empty_model().map_axioms(|n| n * 10);
        let entries: Vec<_> = m.axioms.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(entries, vec![("a", 10), ("b", 20)]);
    }

    #[test]
    fn try_map_axioms_stops_at_first_error() {
        let res = empty_model().try_map_axioms(|name, n| {
            if name == "b" {
                Err(format!("boom on {name}"))
            } else {
                Ok(n)
            }
        });
        assert_eq!(res.unwrap_err(), "boom on b");
    }

    #[test]
    fn block_post_falls_back_to_pre() {
        let b: Block<&str> = Block {
            pre: "v0",
            steps: Vec::new(),
        };
        assert_eq!(*b.post(), "v0");
        let b2 = Block {
            pre: "v0",
            steps: vec![(
                PartCmd::Prim(vec![CommandType::new(
                    vec![],
                    "id",
                    Vec::<Expr<MarkedVar>>::new(),
                )]),
                "v1",
            )],
        };
        assert_eq!(*b2.post(), "v1");
    }

    #[test]
    fn type_lookup_covers_both_scopes() {
        let mut m = empty_model();
        m.globals.insert("g".into(), Type::Int);
        m.locals.insert("t".into(), Type::Bool);
        assert_eq!(m.type_of("g"), Some(Type::Int));
        assert_eq!(m.type_of("t"), Some(Type::Bool));
        assert_eq!(m.type_of("missing"), None);
    }
}
