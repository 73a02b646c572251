#![deny(unused)]
//! Core types, traits, and error definitions for Pycell.
//!
//! This crate provides the foundational building blocks shared by the sandbox
//! execution plane and the agent turn layer: the error taxonomy, the layered
//! configuration, the tool contract, the instrumentation envelope, and the
//! domain types that cross crate boundaries (execution results, stream
//! events, transcripts).

pub mod config;
pub mod error;
pub mod events;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use traits::*;
pub use types::*;
