//! Kiln - container build pipelines compiled to BuildKit builds
//!
//! Resolves a declarative build definition into a target graph, generates
//! multi-stage Dockerfiles and drives the builder one step at a time.

pub mod backend;
pub mod build;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod definition;
pub mod dockerfile;
pub mod error;
pub mod ui;

pub use error::{KilnError, KilnResult};
