#![doc = include_str!("../README.md")]

pub mod ast;
pub mod collate;
pub mod errors;
pub mod parser;

pub use collate::{collate, Collated};
pub use parser::parse;
