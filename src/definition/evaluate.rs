//! Build definition evaluation
//!
//! Turning a source document into flat JSON is delegated to a
//! `ConfigEvaluator`. The built-in evaluator accepts documents that are
//! already flat JSON.

use crate::definition::schema::FlatConfig;
use crate::error::{KilnError, KilnResult};
use serde::de::IgnoredAny;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Default build definition file name, looked up in the working directory
pub const DEFAULT_DEFINITION_NAME: &str = "kiln.json";

/// Pure source-text to flat-JSON-text transformation
pub trait ConfigEvaluator: Send + Sync {
    /// Evaluate `source`; `name` identifies the document in error messages
    fn evaluate(&self, name: &Path, source: &str) -> KilnResult<String>;
}

/// Evaluator for documents that are plain JSON. The source is checked for
/// syntax and returned untouched, so key order and duplicate keys reach the
/// schema as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEvaluator;

impl ConfigEvaluator for JsonEvaluator {
    fn evaluate(&self, name: &Path, source: &str) -> KilnResult<String> {
        serde_json::from_str::<IgnoredAny>(source).map_err(|e| KilnError::DefinitionInvalid {
            path: name.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(source.to_string())
    }
}

/// Read and evaluate a build definition, returning the flat JSON text
pub async fn compile_definition(
    path: &Path,
    evaluator: &dyn ConfigEvaluator,
) -> KilnResult<String> {
    let source = fs::read_to_string(path).await.map_err(|e| {
        KilnError::io(format!("reading build definition {}", path.display()), e)
    })?;

    debug!("Evaluating build definition {}", path.display());
    evaluator.evaluate(path, &source)
}

/// Parse evaluated flat JSON into the definition schema
pub fn parse_flat_config(path: &Path, flat: &str) -> KilnResult<FlatConfig> {
    serde_json::from_str(flat).map_err(|e| KilnError::DefinitionInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read, evaluate and parse a build definition
pub async fn load_definition(
    path: &Path,
    evaluator: &dyn ConfigEvaluator,
) -> KilnResult<FlatConfig> {
    let flat = compile_definition(path, evaluator).await?;
    parse_flat_config(path, &flat)
}
