//! Cache command - manage the builder cache

use crate::backend::{BuilderBackend, ClearCacheParams, DockerBackend};
use crate::cancel::{cancel_on_signals, CancelToken};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::config::Config;
use crate::error::KilnResult;
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let backend = DockerBackend::new(&config.builder).with_output(Arc::new(ui::builder_line));

    match args.action {
        CacheAction::Clear { all } => clear_cache(&backend, all).await,
    }
}

async fn clear_cache(backend: &dyn BuilderBackend, all: bool) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let cancel = CancelToken::new();
    cancel_on_signals(cancel.clone());

    ui::section(&ctx, &format!("Clearing {} build cache", backend.backend_name()));
    backend.clear_cache(ClearCacheParams { all }, &cancel).await?;

    if all {
        ui::step_ok(&ctx, "All build cache removed");
    } else {
        ui::step_ok(&ctx, "Dangling build cache removed");
    }
    Ok(())
}
