//! XJP Kube Bootstrap - 通过 SSH 将裸机引导为 Kubernetes 集群
//!
//! Usage:
//! - `KUBE_BOOTSTRAP_PASSWORD=... xjp-kube-bootstrap --ip 10.0.0.1 10.0.0.2 10.0.0.3`
//! - `xjp-kube-bootstrap --ip 10.0.0.1 10.0.0.2 --identity-file ~/.ssh/id_ed25519`

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xjp_kube_bootstrap::config::constants::VERSION;
use xjp_kube_bootstrap::infra::SshTransport;
use xjp_kube_bootstrap::{write_summary, CliArgs, RoleOrchestrator, RolloutConfig};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }

    let config = match RolloutConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(e.exit_code());
        }
    };

    match run(config) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(config: RolloutConfig) -> Result<u8> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    rt.block_on(async move {
        info!(version = VERSION, "XJP Kube Bootstrap starting");

        let transport = SshTransport::new(&config.credentials, config.strict_host_keys)
            .context("Failed to prepare SSH client")?;
        let save_dir = config.save_dir.clone();

        let cancel = CancellationToken::new();
        let signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight commands before stopping");
                signal.cancel();
            }
        });

        let orchestrator = RoleOrchestrator::new(Arc::new(config), Arc::new(transport), cancel);
        let summary = orchestrator.run().await;
        summary.print();

        match write_summary(&summary, &save_dir).await {
            Ok(path) => println!("Summary saved to {}", path.display()),
            Err(e) => warn!(error = %e, "Failed to write summary"),
        }

        Ok(summary.exit_code)
    })
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("xjp_kube_bootstrap=debug,warn"),
        Err(_) => EnvFilter::new("xjp_kube_bootstrap=info,warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialise logging")
}
