//! Docker CLI backend
//!
//! Drives BuildKit through `docker builder build`, feeding the generated
//! Dockerfile on stdin and using the working directory as build context.

use crate::backend::exec::{self, Finished, LineSink};
use crate::backend::output::extract_run_output;
use crate::backend::{BuildParams, BuilderBackend, ClearCacheParams, SecretData, ValueParams};
use crate::cancel::CancelToken;
use crate::config::BuilderConfig;
use crate::dockerfile::Document;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, trace};

/// Sink for builder output that is shown to the user
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Backend invoking the docker CLI
pub struct DockerBackend {
    executable: String,
    client_config: Option<PathBuf>,
    on_output: OutputSink,
}

impl DockerBackend {
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            client_config: config.docker_config.clone(),
            on_output: Arc::new(exec::discard),
        }
    }

    /// Forward build and pull output to `sink`
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.on_output = sink;
        self
    }

    /// Arguments shared by every command
    fn common_args(&self) -> Vec<String> {
        match &self.client_config {
            Some(path) => vec!["--config".to_string(), path.display().to_string()],
            None => Vec::new(),
        }
    }

    fn build_args(&self, params: &BuildParams) -> Vec<String> {
        let mut args = self.common_args();
        args.extend(["builder".to_string(), "build".to_string()]);
        push_agent_and_secrets(&mut args, params.ssh_agent.as_deref(), &params.secrets);
        args.extend(["--target".to_string(), params.target.clone()]);
        if let Some(output) = &params.output {
            args.extend(["--output".to_string(), output.clone()]);
        }
        args.extend(["-f-".to_string(), ".".to_string()]);
        args
    }

    fn value_args(&self, params: &ValueParams) -> Vec<String> {
        let mut args = self.common_args();
        args.extend(["builder", "build", "--progress", "plain"].map(String::from));
        if !params.use_cache {
            args.push("--no-cache".to_string());
        }
        push_agent_and_secrets(&mut args, params.ssh_agent.as_deref(), &params.secrets);
        args.extend(["--target".to_string(), params.target.clone()]);
        args.extend(["-f-".to_string(), ".".to_string()]);
        args
    }

    fn list_args(&self, images: &[String]) -> Vec<String> {
        let mut args = self.common_args();
        args.extend(["image".to_string(), "ls".to_string()]);
        for image in images {
            args.extend(["--filter".to_string(), format!("reference={}", image)]);
        }
        args.extend(["--format".to_string(), "{{.Repository}}:{{.Tag}}".to_string()]);
        args
    }

    fn prune_args(&self, params: ClearCacheParams) -> Vec<String> {
        let mut args = self.common_args();
        args.extend(["builder", "prune", "-f"].map(String::from));
        if params.all {
            args.push("-a".to_string());
        }
        args
    }

    async fn exec(
        &self,
        args: Vec<String>,
        stdin: Option<&str>,
        cancel: &CancelToken,
        on_output: LineSink<'_>,
    ) -> KilnResult<(String, Finished)> {
        let command_line = format!("{} {}", self.executable, args.join(" "));

        let mut command = Command::new(&self.executable);
        command.args(&args).env("DOCKER_BUILDKIT", "1");

        let finished = exec::run(command, &command_line, stdin, cancel, on_output).await?;
        Ok((command_line, finished))
    }
}

fn push_agent_and_secrets(args: &mut Vec<String>, ssh_agent: Option<&str>, secrets: &[SecretData]) {
    if let Some(agent) = ssh_agent {
        args.extend(["--ssh".to_string(), format!("default={}", agent)]);
    }
    for secret in secrets {
        args.extend([
            "--secret".to_string(),
            format!("id={},src={}", secret.id, secret.path),
        ]);
    }
}

/// Whether `requested` is among the `repository:tag` lines docker printed.
/// An untagged reference matches its `latest` tag.
fn is_listed(requested: &str, listed: &[&str]) -> bool {
    let last_segment = requested.rsplit('/').next().unwrap_or(requested);
    let untagged = !last_segment.contains(':') && !requested.contains('@');

    listed.iter().any(|l| {
        *l == requested || (untagged && l.strip_suffix(":latest") == Some(requested))
    })
}

#[async_trait]
impl BuilderBackend for DockerBackend {
    async fn build(
        &self,
        document: &Document,
        params: &BuildParams,
        cancel: &CancelToken,
    ) -> KilnResult<()> {
        info!("Building target {}", params.target);
        let text = document.to_string();
        let sink = self.on_output.clone();

        let (command_line, finished) = self
            .exec(self.build_args(params), Some(&text), cancel, &*sink)
            .await?;
        finished.into_result(&command_line)?;
        Ok(())
    }

    async fn value(
        &self,
        document: &Document,
        params: &ValueParams,
        cancel: &CancelToken,
    ) -> KilnResult<String> {
        let text = document.to_string();
        let (command_line, finished) = self
            .exec(self.value_args(params), Some(&text), cancel, &|line: &str| {
                trace!("{}", line)
            })
            .await?;
        let finished = finished.into_result(&command_line)?;

        extract_run_output(&finished.stderr).map_err(|source| KilnError::VarParse {
            name: params.target.clone(),
            source,
        })
    }

    async fn pull_image(&self, image: &str, cancel: &CancelToken) -> KilnResult<()> {
        info!("Pulling image: {}", image);
        let mut args = self.common_args();
        args.extend(["pull".to_string(), image.to_string()]);
        let sink = self.on_output.clone();

        let (_, finished) = self.exec(args, None, cancel, &*sink).await?;
        if finished.success() {
            Ok(())
        } else {
            Err(KilnError::ImagePull {
                image: image.to_string(),
                reason: finished.stderr.trim_end().to_string(),
            })
        }
    }

    async fn list_images(
        &self,
        images: &[String],
        cancel: &CancelToken,
    ) -> KilnResult<Vec<String>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let (command_line, finished) = self
            .exec(self.list_args(images), None, cancel, &exec::discard)
            .await?;
        let finished = finished.into_result(&command_line)?;

        let listed: Vec<&str> = finished.stdout.lines().map(str::trim).collect();
        debug!("Local images: {:?}", listed);

        Ok(images
            .iter()
            .filter(|image| is_listed(image, &listed))
            .cloned()
            .collect())
    }

    async fn clear_cache(&self, params: ClearCacheParams, cancel: &CancelToken) -> KilnResult<()> {
        let sink = self.on_output.clone();
        let (command_line, finished) = self
            .exec(self.prune_args(params), None, cancel, &*sink)
            .await?;
        finished.into_result(&command_line)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "docker"
    }
}
