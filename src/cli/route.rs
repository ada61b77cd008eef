//! CLI route: single route table and run context. Dispatches to the backend facade,
//! the pull registry, and presentation.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::cli::parse::{Commands, OutputFormat};
use crate::cli::presentation::{
    format_event_json, format_event_text, format_library_models_json,
    format_library_models_text, format_local_models_json, format_local_models_text,
    format_status_json, format_status_text,
};
use crate::config::{ConfigLoader, PullstreamConfig};
use crate::error::{PullError, GENERIC_PULL_FAILURE};
use crate::progress::{ProgressEvent, PullRegistry, PullUpdate, TransportKind};

/// Runtime context for CLI execution: loaded config, backend client and pull registry.
pub struct RunContext {
    config: PullstreamConfig,
    client: Arc<BackendClient>,
    registry: PullRegistry,
    color: bool,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        backend_url: Option<String>,
    ) -> Result<Self, PullError> {
        let mut config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        if let Some(url) = backend_url {
            config.backend.base_url = url;
        }
        Self::from_config(config)
    }

    /// Build from an already-loaded configuration. The configuration is validated first.
    pub fn from_config(config: PullstreamConfig) -> Result<Self, PullError> {
        config.validate().map_err(|errors| {
            PullError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let client = Arc::new(BackendClient::new(&config.backend)?);
        let registry = PullRegistry::new(client.clone())
            .with_stall_timeout(config.backend.stall_timeout());
        Ok(Self {
            config,
            client,
            registry,
            color: std::io::stdout().is_terminal(),
        })
    }

    pub fn config(&self) -> &PullstreamConfig {
        &self.config
    }

    pub fn registry(&self) -> &PullRegistry {
        &self.registry
    }

    /// Execute a command. Pull progress is written to stdout as it arrives; the
    /// returned string is the final summary.
    pub async fn execute(&self, command: &Commands) -> Result<String, PullError> {
        match command {
            Commands::Pull {
                model,
                transport,
                format,
            } => {
                let kind = transport.unwrap_or(self.config.backend.default_transport);
                self.pull(model, kind, *format, &mut std::io::stdout()).await
            }
            Commands::Models { format } => {
                let models = self.client.list_local_models().await?;
                Ok(match format {
                    OutputFormat::Text => format_local_models_text(&models),
                    OutputFormat::Json => format_local_models_json(&models),
                })
            }
            Commands::Library { format } => {
                let models = self.client.library_models().await?;
                Ok(match format {
                    OutputFormat::Text => format_library_models_text(&models),
                    OutputFormat::Json => format_library_models_json(&models),
                })
            }
            Commands::Status { format } => {
                let status = self.client.backend_status().await;
                Ok(match format {
                    OutputFormat::Text => {
                        format_status_text(self.client.base_url(), &status, self.color)
                    }
                    OutputFormat::Json => format_status_json(self.client.base_url(), &status),
                })
            }
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| PullError::Config(format!("Failed to render configuration: {}", e))),
        }
    }

    /// Pull `model` and write one line per event to `out`. Ctrl-C aborts the
    /// pull through the registry; the loop still drains the `Aborted` event.
    /// A failed write to `out` aborts the pull the same way.
    pub async fn pull(
        &self,
        model: &str,
        kind: TransportKind,
        format: OutputFormat,
        out: &mut (dyn Write + Send),
    ) -> Result<String, PullError> {
        let session = self.registry.start_pull(model, kind).await?;
        let session_id = session.id();
        let mut events = Box::pin(session.events());

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;
        let mut output_failed = false;
        let mut last = None;

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => {
                        let line = match format {
                            OutputFormat::Text => format_event_text(model, &event, self.color),
                            OutputFormat::Json => format_event_json(&PullUpdate::with_now(
                                model,
                                session_id,
                                event.clone(),
                            )),
                        };
                        if !output_failed {
                            if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                                warn!(model = %model, error = %e, "Output failed, aborting pull");
                                output_failed = true;
                                self.registry.abort(model);
                            }
                        }
                        last = Some(event);
                    }
                    None => break,
                },
                signal = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    match signal {
                        Ok(()) => {
                            warn!(model = %model, "Interrupted, aborting pull");
                            self.registry.abort(model);
                        }
                        Err(e) => warn!(error = %e, "Ctrl-C handler unavailable"),
                    }
                }
            }
        }

        match last {
            Some(ProgressEvent::Completed) => {
                info!(model = %model, session_id, "Pull completed");
                Ok(format!("Pulled {}", model))
            }
            Some(ProgressEvent::Aborted) => Err(PullError::Aborted(model.to_string())),
            Some(ProgressEvent::Failed { message }) => Err(PullError::PullFailed {
                key: model.to_string(),
                message,
            }),
            _ => Err(PullError::PullFailed {
                key: model.to_string(),
                message: GENERIC_PULL_FAILURE.to_string(),
            }),
        }
    }
}
