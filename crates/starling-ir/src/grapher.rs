//! The grapher: structured method bodies → control-flow graphs.
//!
//! Each method body becomes a directed labelled multigraph whose nodes carry
//! view assertions and whose edges carry atomic commands. Every structured
//! construct is decomposed into simple edges, so each edge is an atomic
//! Hoare triple `{src} cmd {dst}`.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::expr::{BoolExpr, Expr, MarkedVar};
use crate::model::{Axiom, Block, Command, CommandType, PartCmd};
use crate::{GViewModel, GraphModel};

/// Structural malformation of a method body. Valid modeller output cannot
/// trigger this; an occurrence is a pipeline bug, not a user error.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Malformed body of method '{method}': {reason}")]
    MalformedBlock { method: String, reason: String },
}

/// Node identifier within one method's graph (`V0`, `V1`, ...).
pub type NodeId = String;

/// A labelled edge: one atomic Hoare triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<C> {
    pub name: String,
    pub src: NodeId,
    pub dst: NodeId,
    pub cmd: C,
}

/// A per-method control-flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph<V> {
    pub name: String,
    pub nodes: IndexMap<NodeId, V>,
    pub edges: Vec<Edge<Command<MarkedVar>>>,
    pub entry: NodeId,
    pub exit: NodeId,
}

impl<V> Graph<V> {
    pub fn edges_from<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Edge<Command<MarkedVar>>> + 'a {
        self.edges.iter().filter(move |e| e.src == node)
    }

    pub fn edges_into<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Edge<Command<MarkedVar>>> + 'a {
        self.edges.iter().filter(move |e| e.dst == node)
    }

    /// Every edge as the atomic Hoare triple it represents.
    pub fn axioms(&self) -> impl Iterator<Item = Axiom<&V, &Command<MarkedVar>>> {
        self.edges.iter().map(|e| Axiom {
            pre: &self.nodes[&e.src],
            cmd: &e.cmd,
            post: &self.nodes[&e.dst],
        })
    }
}

impl<V> fmt::Display for Graph<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} (entry {}, exit {}):", self.name, self.entry, self.exit)?;
        for edge in &self.edges {
            write!(f, "  {}: {} -> {} [", edge.name, edge.src, edge.dst)?;
            for (i, c) in edge.cmd.iter().enumerate() {
                if i > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{c}")?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

/// Graph every method body in the model.
pub fn graph_model(model: GViewModel) -> Result<GraphModel, GraphError> {
    model.try_map_axioms(|name, body| graph_method(name, body))
}

/// Decompose one structured body into its control-flow graph.
pub fn graph_method<V>(name: &str, body: Block<V>) -> Result<Graph<V>, GraphError> {
    let mut builder = Builder {
        graph: Graph {
            name: name.to_string(),
            nodes: IndexMap::new(),
            edges: Vec::new(),
            entry: NodeId::new(),
            exit: NodeId::new(),
        },
        next_node: 0,
        next_edge: 0,
    };
    let (entry, exit) = builder.graph_block(body)?;
    builder.graph.entry = entry;
    builder.graph.exit = exit;
    Ok(builder.graph)
}

struct Builder<V> {
    graph: Graph<V>,
    next_node: usize,
    next_edge: usize,
}

impl<V> Builder<V> {
    fn add_node(&mut self, view: V) -> NodeId {
        let id = format!("V{}", self.next_node);
        self.next_node += 1;
        self.graph.nodes.insert(id.clone(), view);
        id
    }

    fn add_edge(&mut self, src: NodeId, dst: NodeId, cmd: Command<MarkedVar>) {
        let name = format!("C{}", self.next_edge);
        self.next_edge += 1;
        self.graph.edges.push(Edge {
            name,
            src,
            dst,
            cmd,
        });
    }

    fn assume(cond: BoolExpr<MarkedVar>) -> Command<MarkedVar> {
        vec![CommandType::new(vec![], "assume", vec![Expr::Bool(cond)])]
    }

    fn epsilon() -> Command<MarkedVar> {
        vec![CommandType::new(vec![], "id", vec![])]
    }

    /// Emit nodes for every view in the block and wire each structured
    /// command between its surrounding nodes. Returns (entry, exit).
    fn graph_block(&mut self, block: Block<V>) -> Result<(NodeId, NodeId), GraphError> {
        let entry = self.add_node(block.pre);
        let mut prev = entry.clone();
        for (cmd, post) in block.steps {
            let next = self.add_node(post);
            self.graph_cmd(cmd, &prev, &next)?;
            prev = next;
        }
        Ok((entry, prev))
    }

    fn graph_cmd(&mut self, cmd: PartCmd<V>, src: &NodeId, dst: &NodeId) -> Result<(), GraphError> {
        match cmd {
            PartCmd::Prim(command) => {
                if command.is_empty() {
                    return Err(GraphError::MalformedBlock {
                        method: self.graph.name.clone(),
                        reason: "primitive with no command".into(),
                    });
                }
                self.add_edge(src.clone(), dst.clone(), command);
            }
            PartCmd::Ite {
                cond,
                then_block,
                else_block,
            } => {
                let (t_entry, t_exit) = self.graph_block(then_block)?;
                let (e_entry, e_exit) = self.graph_block(else_block)?;
                self.add_edge(src.clone(), t_entry, Self::assume(cond.clone()));
                self.add_edge(src.clone(), e_entry, Self::assume(cond.not()));
                self.add_edge(t_exit, dst.clone(), Self::epsilon());
                self.add_edge(e_exit, dst.clone(), Self::epsilon());
            }
            PartCmd::While { is_do, cond, inner } => {
                let (b_entry, b_exit) = self.graph_block(inner)?;
                if is_do {
                    // A do-while always runs its body once.
                    self.add_edge(src.clone(), b_entry.clone(), Self::epsilon());
                } else {
                    self.add_edge(src.clone(), b_entry.clone(), Self::assume(cond.clone()));
                    self.add_edge(src.clone(), dst.clone(), Self::assume(cond.clone().not()));
                }
                self.add_edge(b_exit.clone(), b_entry, Self::assume(cond.clone()));
                self.add_edge(b_exit, dst.clone(), Self::assume(cond.not()));
            }
        }
        Ok(())
    }
}
