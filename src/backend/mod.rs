//! Builder backend abstraction
//!
//! The orchestrator talks to the container builder only through
//! `BuilderBackend`. One call is in flight at a time; every call observes the
//! cancellation token.

mod docker;
pub mod exec;
mod output;
mod ssh;

pub use docker::DockerBackend;
pub use output::extract_run_output;
pub use ssh::SshAgentProvider;

use crate::cancel::CancelToken;
use crate::config::SecretSource;
use crate::dockerfile::Document;
use crate::error::KilnResult;
use async_trait::async_trait;

/// Secret forwarded to the builder as `id=<id>,src=<path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretData {
    pub id: String,
    pub path: String,
}

impl From<&SecretSource> for SecretData {
    fn from(source: &SecretSource) -> Self {
        Self {
            id: source.id.clone(),
            path: source.path.clone(),
        }
    }
}

/// Parameters for building one stage of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    pub target: String,
    pub ssh_agent: Option<String>,
    pub secrets: Vec<SecretData>,
    /// Local directory receiving the target's filesystem
    pub output: Option<String>,
}

/// Parameters for computing a variable value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueParams {
    pub target: String,
    pub ssh_agent: Option<String>,
    pub secrets: Vec<SecretData>,
    pub use_cache: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearCacheParams {
    /// Remove all build cache, not only dangling entries
    pub all: bool,
}

/// Container builder reached through a narrow, sequential contract
#[async_trait]
pub trait BuilderBackend: Send + Sync {
    /// Build `params.target` of `document`
    async fn build(
        &self,
        document: &Document,
        params: &BuildParams,
        cancel: &CancelToken,
    ) -> KilnResult<()>;

    /// Build `params.target` and return the output of its RUN step
    async fn value(
        &self,
        document: &Document,
        params: &ValueParams,
        cancel: &CancelToken,
    ) -> KilnResult<String>;

    /// Pull an image into the local store
    async fn pull_image(&self, image: &str, cancel: &CancelToken) -> KilnResult<()>;

    /// Return those of `images` that are already present locally
    async fn list_images(&self, images: &[String], cancel: &CancelToken)
        -> KilnResult<Vec<String>>;

    /// Prune the builder cache
    async fn clear_cache(&self, params: ClearCacheParams, cancel: &CancelToken) -> KilnResult<()>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}
