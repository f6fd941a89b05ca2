use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Result, bail};

use kubexm_cluster::{CreateClusterPipeline, DeleteClusterPipeline, RenewCertsPipeline};
use kubexm_context::{CancelSignal, ContextBuilder, PipelineContext};
use kubexm_engine::{Engine, EngineOptions, GraphExecutionResult};
use kubexm_host::Inventory;
use kubexm_plan::Pipeline;
use kubexm_runner::{RouterRunner, SharedRunner};

use crate::display;
use crate::logging::{LoggingFormat, LoggingLevel};

/// Kubernetes cluster lifecycle manager
#[derive(Debug, Parser)]
#[command(name = "kubexm", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path of the cluster specification
    #[arg(short = 'f', long, global = true, default_value = "cluster.yaml")]
    pub config: PathBuf,

    /// Plan and report without touching any host
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Forbid downloads; artifacts must already be present
    #[arg(long, global = true)]
    pub offline: bool,

    /// Maximum concurrently executing nodes
    #[arg(long, global = true)]
    pub fanout: Option<usize>,

    /// The minimum log level to output
    #[arg(long, global = true, default_value = "info")]
    pub log_level: LoggingLevel,

    /// A filter for log entries from other crates
    #[arg(long, global = true, default_value = "")]
    pub log_filter: String,

    /// The format for log output
    #[arg(long, global = true, default_value = "compact")]
    pub log_format: LoggingFormat,

    /// The format results are reported in
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the cluster described by the specification
    Create,

    /// Tear the cluster down
    Delete,

    /// Show the execution plan without running it
    Plan,

    /// Certificate operations
    Certs {
        #[command(subcommand)]
        command: CertsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CertsCommand {
    /// Renew etcd and kubeadm certificates
    Renew,
}

/// How results are rendered.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Run the parsed command to completion.
    pub async fn run(self) -> Result<()> {
        let dry_run = self.dry_run || matches!(self.command, Command::Plan);
        let ctx = self.context(dry_run)?;
        let engine = Engine::new(EngineOptions {
            node_fanout: self.fanout,
            host_fanout: None,
        });

        let result = match &self.command {
            Command::Create | Command::Plan => CreateClusterPipeline.run(&ctx, &engine).await,
            Command::Delete => DeleteClusterPipeline.run(&ctx, &engine).await,
            Command::Certs {
                command: CertsCommand::Renew,
            } => RenewCertsPipeline.run(&ctx, &engine).await,
        };

        self.report(&result)?;
        if !result.is_success() {
            bail!("{} failed", result.graph);
        }
        Ok(())
    }

    /// Build the run context: configuration, inventory, runner,
    /// work directories, and an interrupt-wired cancellation signal.
    fn context(&self, dry_run: bool) -> Result<PipelineContext> {
        let config = Arc::new(kubexm_config::load(&self.config)?);
        let inventory = Arc::new(Inventory::from_spec(&config)?);
        let runner: SharedRunner = Arc::new(RouterRunner::local_only());

        let cancel = CancelSignal::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, draining to a terminal state");
                    cancel.cancel();
                }
            }
        });

        let ctx = ContextBuilder::new(config, inventory, runner)
            .dry_run(dry_run)
            .offline(self.offline)
            .cancel_signal(cancel)
            .build();
        if !dry_run {
            ctx.workspace().ensure_created()?;
        }
        Ok(ctx)
    }

    fn report(&self, result: &GraphExecutionResult) -> Result<()> {
        match self.output {
            OutputFormat::Text => display::text(result),
            OutputFormat::Json => display::json(result)?,
        }
        Ok(())
    }
}
