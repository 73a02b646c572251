#![deny(unused)]
//! Agent turn layer for Pycell.
//!
//! Consumes the agent runtime's streamed run events and folds them into an
//! ordered, categorized transcript, firing per-category callbacks as the
//! stream arrives. The heavy lifting of actually executing code lives in
//! `pycell_sandbox`; this crate never blocks on sandbox I/O.

pub mod classifier;
pub mod context;

pub use classifier::{ClassifierState, EventStreamClassifier};
pub use context::AgentContext;
