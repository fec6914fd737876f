//! Build orchestration
//!
//! A build runs in three strictly sequential phases:
//!
//! 1. Pre-pull: every base image reachable from the requested target, every
//!    variable image and the frontend image are collected; missing ones (or
//!    all of them with force pull) are pulled before anything is built.
//! 2. Variables: each variable is computed in declaration order with the
//!    cache disabled and its value captured from the builder transcript.
//! 3. Targets: one document covering the target closure is generated and
//!    each stage-carrying vertex is built at most once, dependencies first.

mod plan;

pub use plan::{plan_execution, Step};

use crate::backend::{BuildParams, BuilderBackend, SecretData, ValueParams};
use crate::cancel::CancelToken;
use crate::definition::{CopySource, Definition, Vertex};
use crate::dockerfile::{generate_target, generate_var, VarValues, SCRATCH};
use crate::error::{KilnError, KilnResult};
use std::collections::HashSet;
use tracing::{debug, info};

/// Target built when none is requested
pub const DEFAULT_TARGET: &str = "all";

/// Progress notifications emitted while a build runs
pub trait BuildReporter: Send + Sync {
    fn images_pulling(&self, _images: &[String], _forced: bool) {}

    fn var_started(&self, _name: &str) {}

    fn var_computed(&self, _name: &str, _value: &str) {}

    fn step_started(&self, _step: &Step) {}

    fn step_finished(&self, _step: &Step) {}
}

/// Reporter that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl BuildReporter for SilentReporter {}

/// Drives a backend through pre-pull, variable materialization and target
/// execution
pub struct BuildOrchestrator {
    backend: Box<dyn BuilderBackend>,
    reporter: Box<dyn BuildReporter>,
    syntax_image: String,
    ssh_agent: Option<String>,
    secrets: Vec<SecretData>,
    cancel: CancelToken,
}

impl BuildOrchestrator {
    pub fn new(backend: Box<dyn BuilderBackend>, syntax_image: impl Into<String>) -> Self {
        Self {
            backend,
            reporter: Box::new(SilentReporter),
            syntax_image: syntax_image.into(),
            ssh_agent: None,
            secrets: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn BuildReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_ssh_agent(mut self, agent: Option<String>) -> Self {
        self.ssh_agent = agent;
        self
    }

    pub fn with_secrets(mut self, secrets: Vec<SecretData>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build `targets` of `definition`
    pub async fn execute(
        &self,
        targets: &[String],
        definition: &Definition,
        force_pull: bool,
    ) -> KilnResult<()> {
        let root = select_root(targets, definition)?;
        debug!("Building {} ({} vertices known)", root.name, definition.vertices().len());

        let images = discover_images(definition, &root, &self.syntax_image);
        self.pre_pull(&images, force_pull).await?;

        let vars = self.materialize_vars(definition).await?;

        self.execute_vertex(definition, &root, &vars).await
    }

    async fn pre_pull(&self, images: &[String], force_pull: bool) -> KilnResult<()> {
        let to_pull: Vec<String> = if force_pull {
            images.to_vec()
        } else {
            let present = self.backend.list_images(images, &self.cancel).await?;
            images
                .iter()
                .filter(|image| !present.contains(image))
                .cloned()
                .collect()
        };

        if to_pull.is_empty() {
            debug!("All {} images present", images.len());
            return Ok(());
        }

        self.reporter.images_pulling(&to_pull, force_pull);
        for image in &to_pull {
            self.backend.pull_image(image, &self.cancel).await?;
        }
        Ok(())
    }

    async fn materialize_vars(&self, definition: &Definition) -> KilnResult<VarValues> {
        let mut values = VarValues::new();

        for var in definition.vars() {
            self.checkpoint()?;
            self.reporter.var_started(&var.name);

            let document = generate_var(var, &self.syntax_image);
            debug!("Dockerfile for {} var:\n{}", var.name, document);

            let params = ValueParams {
                target: var.name.clone(),
                ssh_agent: self.ssh_agent.clone(),
                secrets: self.secrets.clone(),
                use_cache: false,
            };

            let value = self
                .backend
                .value(&document, &params, &self.cancel)
                .await
                .map_err(|e| match e {
                    KilnError::Cancelled | KilnError::VarParse { .. } => e,
                    other => KilnError::var_failed(&var.name, other),
                })?;

            self.reporter.var_computed(&var.name, &value);
            values.insert(var.name.clone(), value);
        }

        Ok(values)
    }

    async fn execute_vertex(
        &self,
        definition: &Definition,
        root: &Vertex,
        vars: &VarValues,
    ) -> KilnResult<()> {
        let document = generate_target(definition, root, vars, &self.syntax_image);
        debug!("Dockerfile:\n{}", document);

        let steps = plan_execution(definition, root);
        if steps.is_empty() {
            info!("Nothing to build for {}", root.name);
        }

        for step in &steps {
            self.checkpoint()?;
            self.reporter.step_started(step);

            let params = BuildParams {
                target: step.target.clone(),
                ssh_agent: self.ssh_agent.clone(),
                secrets: self.secrets.clone(),
                output: step.output.clone(),
            };
            self.backend.build(&document, &params, &self.cancel).await?;

            self.reporter.step_finished(step);
        }

        Ok(())
    }

    fn checkpoint(&self) -> KilnResult<()> {
        if self.cancel.is_cancelled() {
            return Err(KilnError::Cancelled);
        }
        Ok(())
    }
}

/// Resolve the requested target names to the vertex to build.
///
/// No names selects `all`; several names are wrapped in a transient
/// aggregator depending on each of them.
pub fn select_root(targets: &[String], definition: &Definition) -> KilnResult<Vertex> {
    let lookup = |name: &str| {
        definition
            .find(name)
            .ok_or_else(|| KilnError::TargetNotFound(name.to_string()))
    };

    match targets {
        [] => Ok(definition.vertex(lookup(DEFAULT_TARGET)?).clone()),
        [single] => Ok(definition.vertex(lookup(single)?).clone()),
        many => {
            let ids = many
                .iter()
                .map(|name| lookup(name))
                .collect::<KilnResult<Vec<_>>>()?;
            Ok(Vertex::aggregate(DEFAULT_TARGET, ids))
        }
    }
}

/// Images needed to build `root` and compute every variable, in discovery
/// order without duplicates: the frontend image, then base images and copy
/// images of the target closure, then variable images. `scratch` is skipped.
pub fn discover_images(definition: &Definition, root: &Vertex, syntax_image: &str) -> Vec<String> {
    let mut discovery = ImageDiscovery {
        definition,
        visited: HashSet::new(),
        images: Vec::new(),
    };

    discovery.add(syntax_image);
    discovery.walk(root);
    for var in definition.vars() {
        discovery.add(&var.from);
    }

    discovery.images
}

struct ImageDiscovery<'a> {
    definition: &'a Definition,
    visited: HashSet<&'a str>,
    images: Vec<String>,
}

impl<'a> ImageDiscovery<'a> {
    fn add(&mut self, image: &str) {
        if image != SCRATCH && !self.images.iter().any(|i| i == image) {
            self.images.push(image.to_string());
        }
    }

    fn walk(&mut self, vertex: &Vertex) {
        let definition = self.definition;

        if let Some(parent) = vertex.from {
            self.walk_id(definition.vertex(parent));
        }

        if let Some(stage) = &vertex.stage {
            if vertex.from.is_none() {
                self.add(&stage.from);
            }

            for copy in &stage.copy {
                match &copy.from {
                    Some(CopySource::Vertex(id)) => self.walk_id(definition.vertex(*id)),
                    Some(CopySource::Image(image)) => self.add(image),
                    None => {}
                }
            }
        }

        for &dep in &vertex.depends_on {
            self.walk_id(definition.vertex(dep));
        }
    }

    /// Walk a vertex owned by the definition, once
    fn walk_id(&mut self, vertex: &'a Vertex) {
        if self.visited.insert(vertex.name.as_str()) {
            self.walk(vertex);
        }
    }
}
