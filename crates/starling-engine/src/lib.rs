#![doc = include_str!("../README.md")]

//! Starling frontend driver.

pub mod pipeline;

pub use pipeline::{run, Output, PipelineError, Stage, Target};
