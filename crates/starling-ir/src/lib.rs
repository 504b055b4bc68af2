#![doc = include_str!("../README.md")]

//! Starling intermediate representation and pipeline stages.
//!
//! This crate defines the typed expression core, the multiset view algebra,
//! the model container, and the modeller, guarder, and grapher passes that
//! turn a collated script into per-method control-flow graphs of atomic
//! Hoare triples.

pub mod expr;
pub mod grapher;
pub mod guarder;
pub mod model;
pub mod modeller;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
pub mod view;

use expr::MarkedVar;
use model::{Block, Model, ViewDef};
use view::{CView, GView, ViewExpr};

/// Model as produced by the modeller: structured bodies over conditional views.
pub type CViewModel = Model<Block<ViewExpr<CView<MarkedVar>>>, ViewDef>;
/// Model as produced by the guarder: structured bodies over guarded views.
pub type GViewModel = Model<Block<ViewExpr<GView<MarkedVar>>>, ViewDef>;
/// Model as produced by the grapher: per-method CFGs of atomic Hoare triples.
pub type GraphModel = Model<grapher::Graph<ViewExpr<GView<MarkedVar>>>, ViewDef>;
