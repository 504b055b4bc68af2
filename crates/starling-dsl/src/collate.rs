//! Collation: partitioning a parsed script into per-kind buckets.
//!
//! A single pure pass over the item list; no validation beyond shape. The
//! modeller consumes the buckets. `flatten` is the inverse up to bucket
//! ordering: collating a flattened collation yields an equal value.

use crate::ast::{
    ConstraintDecl, MethodDecl, Script, ScriptItem, Span, Spanned, VarDecl, ViewProtoDecl,
};

/// A script partitioned by item kind, each bucket in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collated {
    pub shared: Vec<VarDecl>,
    pub thread: Vec<VarDecl>,
    pub view_protos: Vec<Spanned<ViewProtoDecl>>,
    pub constraints: Vec<Spanned<ConstraintDecl>>,
    pub methods: Vec<Spanned<MethodDecl>>,
}

/// Partition `script` into buckets, preserving source order within each.
pub fn collate(script: Script) -> Collated {
    let mut out = Collated::default();
    for item in script {
        let span = item.span;
        match item.node {
            ScriptItem::SharedDecl(vars) => out.shared.extend(vars),
            ScriptItem::ThreadDecl(vars) => out.thread.extend(vars),
            ScriptItem::ViewProto(p) => out.view_protos.push(Spanned::new(p, span)),
            ScriptItem::Constraint(c) => out.constraints.push(Spanned::new(c, span)),
            ScriptItem::Method(m) => out.methods.push(Spanned::new(m, span)),
        }
    }
    out
}

impl Collated {
    /// Rebuild a script in bucket order:
    /// shared ++ thread ++ prototypes ++ constraints ++ methods.
    pub fn flatten(&self) -> Script {
        let mut items: Script = Vec::new();
        for v in &self.shared {
            items.push(Spanned::new(
                ScriptItem::SharedDecl(vec![v.clone()]),
                Span::new(0, 0),
            ));
        }
        for v in &self.thread {
            items.push(Spanned::new(
                ScriptItem::ThreadDecl(vec![v.clone()]),
                Span::new(0, 0),
            ));
        }
        for p in &self.view_protos {
            items.push(Spanned::new(ScriptItem::ViewProto(p.node.clone()), p.span));
        }
        for c in &self.constraints {
            items.push(Spanned::new(ScriptItem::Constraint(c.node.clone()), c.span));
        }
        for m in &self.methods {
            items.push(Spanned::new(ScriptItem::Method(m.node.clone()), m.span));
        }
        items
    }
}
