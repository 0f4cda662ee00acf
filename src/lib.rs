//! modrpc: a module RPC server.
//!
//! The binary serves the demo modules over HTTP; [`app`] holds the wiring
//! so tests can stand up the same service.

pub mod app;
pub mod demo;
