//! Build command - resolve the definition and run the requested targets

use crate::backend::{DockerBackend, SecretData, SshAgentProvider};
use crate::build::{BuildOrchestrator, DEFAULT_TARGET};
use crate::cancel::{cancel_on_signals, CancelToken};
use crate::cli::args::{BuildAction, BuildArgs};
use crate::config::Config;
use crate::definition::{
    compile_definition, load_definition, resolve, Definition, JsonEvaluator,
    DEFAULT_DEFINITION_NAME,
};
use crate::error::KilnResult;
use crate::ui::{self, ConsoleReporter, UiContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> KilnResult<()> {
    let path = args
        .definition
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFINITION_NAME));

    match args.action {
        Some(BuildAction::DefinitionDebug) => {
            let flat = compile_definition(&path, &JsonEvaluator).await?;
            println!("{}", flat);
            Ok(())
        }
        Some(BuildAction::Definition) => {
            let definition = resolve_definition(&path, config).await?;
            println!("{}", definition.to_json()?);
            Ok(())
        }
        None => run_build(&args, &path, config).await,
    }
}

async fn resolve_definition(path: &Path, config: &Config) -> KilnResult<Definition> {
    let secrets = config.expanded_secrets()?;
    let flat = load_definition(path, &JsonEvaluator).await?;
    resolve(&flat, &secrets)
}

async fn run_build(args: &BuildArgs, path: &Path, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let definition = resolve_definition(path, config).await?;

    let secrets: Vec<SecretData> = config
        .expanded_secrets()?
        .iter()
        .map(SecretData::from)
        .collect();
    let ssh_agent = SshAgentProvider::from_env().default_agent();
    if ssh_agent.is_none() {
        debug!("SSH_AUTH_SOCK not set, building without an SSH agent");
    }

    let cancel = CancelToken::new();
    cancel_on_signals(cancel.clone());

    let backend = DockerBackend::new(&config.builder).with_output(Arc::new(ui::builder_line));
    let reporter = ConsoleReporter::new(ctx.clone()).with_values(args.show_vars);

    let orchestrator = BuildOrchestrator::new(Box::new(backend), &config.builder.syntax_image)
        .with_reporter(Box::new(reporter))
        .with_ssh_agent(ssh_agent)
        .with_secrets(secrets)
        .with_cancel(cancel);

    let force_pull = args.force_pull || config.builder.force_pull;
    orchestrator
        .execute(&args.targets, &definition, force_pull)
        .await?;

    let built = if args.targets.is_empty() {
        DEFAULT_TARGET.to_string()
    } else {
        args.targets.join(" ")
    };
    ui::step_ok_detail(&ctx, "Build finished", &built);

    Ok(())
}
