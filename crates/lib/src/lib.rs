//! kiln-lib: build-state coordination for compiled Lua artifacts
//!
//! This crate sits between a compiler that rebuilds Lua sources and the code
//! that wants to load the compiled result:
//! - `coordinator`: tracks whether the output is valid, queues callers, coalesces rebuilds
//! - `resolver`: waits for a valid build, reads an artifact and evaluates it
//! - `loader`: evaluates artifacts in isolated Lua states
//! - `driver`: the compiler interface and a passthrough compiler
//! - `store`: disk and in-memory output storage
//! - `config`: pipeline configuration and entry assembly

pub mod config;
pub mod coordinator;
pub mod driver;
pub mod loader;
pub mod pipeline;
pub mod resolver;
pub mod store;

pub use pipeline::Pipeline;
pub use resolver::{ResolveError, Resolver};
