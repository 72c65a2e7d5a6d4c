//! Core protocol types for streamrpc.
//!
//! This crate provides the types shared by the runtime (`streamrpc`) and
//! anything that talks to it over the wire.
//!
//! ## Modules
//!
//! - [`error`]: Status codes and error types
//! - [`envelope`]: Streaming envelope framing and the incremental decoder

mod envelope;
mod error;

pub use envelope::*;
pub use error::*;
