//! Per-invocation run context.

use std::path::Path;

use crate::app::AppOptions;
use crate::config::{finalize_config, ConfigError, NodeConfig};
use crate::lifecycle::QuitTrigger;

/// Validated configuration and derived application options for one run.
///
/// Built once, before anything is constructed, and passed by reference.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: NodeConfig,
    pub options: AppOptions,
    pub span: tracing::Span,
}

impl RunContext {
    /// Validate `config` and derive the application options from it.
    pub fn new(config: NodeConfig) -> Result<Self, ConfigError> {
        let config = finalize_config(config)?;
        let options = AppOptions::from_config(&config).map_err(|e| ConfigError::Validation(vec![e]))?;
        let span = tracing::info_span!("node", home = %config.home.display());
        Ok(Self { config, options, span })
    }

    /// Let the application raise halts through `trigger`.
    pub fn with_halt_trigger(mut self, trigger: QuitTrigger) -> Self {
        self.options = self.options.with_halt_trigger(trigger);
        self
    }

    pub fn home(&self) -> &Path {
        &self.config.home
    }

    /// Whether a component needs the node's in-process client.
    pub fn needs_local_client(&self) -> bool {
        self.config.api.enable || self.config.grpc.enable
    }

    /// Child span for a named component.
    pub fn span_for(&self, module: &'static str) -> tracing::Span {
        tracing::info_span!(parent: &self.span, "module", module)
    }
}
