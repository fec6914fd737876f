//! Build definition loading and graph resolution
//!
//! The definition file is evaluated into flat JSON, parsed into the schema
//! types and resolved into an arena-backed `Definition`.

mod evaluate;
mod model;
mod resolve;
mod schema;
mod trace;

pub use evaluate::{
    compile_definition, load_definition, parse_flat_config, ConfigEvaluator, JsonEvaluator,
    DEFAULT_DEFINITION_NAME,
};
pub use model::{
    Cache, Copy, CopySource, Definition, Network, Output, Secret, Ssh, Stage, Var, VarCopy,
    Vertex, VertexId,
};
pub use resolve::resolve;
pub use schema::{FlatConfig, API_VERSION_V1};
