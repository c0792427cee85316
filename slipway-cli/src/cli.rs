use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use slipway::cancellation::CancellationToken;
use slipway::config::{PipelineConfig, ReleaseCredentials};
use slipway::events::LoggingEventSink;
use slipway::hosts::ports_from_config;
use slipway::observability::{init_tracing, LogFormat};
use slipway::run::PipelineOrchestrator;
use slipway::trigger::TriggerEvent;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(author, version, about = "Build-and-release pipeline runner", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one trigger event.
    Run {
        /// The pushed ref, e.g. "main" or "v1.2.0".
        #[arg(long = "ref")]
        reference: String,

        /// How the ref arrived.
        #[arg(long, value_enum)]
        event: EventKind,

        /// Configuration file. Defaults to ./slipway.toml, then ./slipway.json.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overrides the configured workspace root.
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Writes the run report here instead of stdout.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Release host token.
        #[arg(long, env = "SLIPWAY_RELEASE_TOKEN")]
        token: Option<String>,
    },

    /// Print what the pipeline would do for one trigger event.
    Plan {
        /// The pushed ref, e.g. "main" or "v1.2.0".
        #[arg(long = "ref")]
        reference: String,

        /// How the ref arrived.
        #[arg(long, value_enum)]
        event: EventKind,

        /// Configuration file. Defaults to ./slipway.toml, then ./slipway.json.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EventKind {
    /// A branch push.
    Push,
    /// A tag push.
    Tag,
}

impl EventKind {
    fn trigger(self, reference: &str) -> TriggerEvent {
        match self {
            Self::Push => TriggerEvent::push(reference),
            Self::Tag => TriggerEvent::tag(reference),
        }
    }
}

impl Cli {
    /// Installs the tracing subscriber chosen by `--json-logs`.
    pub fn init_tracing(&self) {
        let format = if self.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
        init_tracing(format);
    }

    /// Executes the selected subcommand, returning the process exit code.
    pub async fn execute(&self) -> Result<i32> {
        match &self.command {
            Commands::Run {
                reference,
                event,
                config,
                workspace,
                report,
                token,
            } => {
                Self::execute_run(
                    reference,
                    *event,
                    config.as_deref(),
                    workspace.clone(),
                    report.as_deref(),
                    token.as_deref(),
                )
                .await
            }
            Commands::Plan {
                reference,
                event,
                config,
            } => Self::execute_plan(reference, *event, config.as_deref()),
        }
    }

    async fn execute_run(
        reference: &str,
        event: EventKind,
        config_path: Option<&Path>,
        workspace: Option<PathBuf>,
        report_path: Option<&Path>,
        token: Option<&str>,
    ) -> Result<i32> {
        let mut config = PipelineConfig::load(config_path).context("loading configuration")?;
        if let Some(workspace) = workspace {
            config.workspace_root = workspace;
        }

        let credentials = token.map(ReleaseCredentials::new);
        let ports =
            ports_from_config(&config, credentials).context("assembling collaborators")?;
        let orchestrator = PipelineOrchestrator::new(config, ports)
            .context("constructing orchestrator")?
            .with_event_sink(Arc::new(LoggingEventSink::info()));

        let cancel = CancellationToken::shared();
        let signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel("interrupted");
            }
        });

        let run_report = orchestrator
            .run_with_token(&event.trigger(reference), cancel)
            .await?;

        let json = run_report.to_json_pretty().context("serializing report")?;
        match report_path {
            Some(path) => {
                std::fs::write(path, &json)
                    .with_context(|| format!("writing report to {}", path.display()))?;
                tracing::info!(path = %path.display(), "report written");
            }
            None => println!("{json}"),
        }

        Ok(run_report.exit_code())
    }

    fn execute_plan(reference: &str, event: EventKind, config_path: Option<&Path>) -> Result<i32> {
        let config = PipelineConfig::load(config_path).context("loading configuration")?;
        let ports = ports_from_config(&config, None).context("assembling collaborators")?;
        let orchestrator =
            PipelineOrchestrator::new(config, ports).context("constructing orchestrator")?;

        let plan = orchestrator.plan(&event.trigger(reference));
        println!("{}", serde_json::to_string_pretty(&plan)?);
        Ok(0)
    }
}
