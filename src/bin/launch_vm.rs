use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use launch_vm::azure::{ArmClient, AzureApi, Credential, OperationContext};
use launch_vm::{Args, Config, Lifecycle, build_launch_plan};

/// RUST_LOG filters; defaults to info.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = Config::resolve(args)?;
    let plan = build_launch_plan(&config)?;

    if config.dry_run {
        if let Some(nic) = &plan.network_interface {
            println!("{}", serde_json::to_string_pretty(nic)?);
        }
        println!("{}", serde_json::to_string_pretty(&plan.virtual_machine)?);
        return Ok(());
    }

    let credential = Credential::from_env();
    tracing::info!(credential = credential.kind(), "using Azure credential");
    let client = ArmClient::new(&config.arm_endpoint, &config.subscription_id, credential)
        .with_poll_interval(config.poll_interval);
    let api = AzureApi::new(client, &config.resource_group);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C detected, abandoning the current operation");
            on_interrupt.cancel();
        }
    });

    let ctx = OperationContext::new(config.operation_timeout, cancel);
    let mut lifecycle = Lifecycle::new(&api, ctx);
    let outcome = lifecycle
        .run(&plan, config.keep)
        .await
        .context("Failed to launch virtual machine")?;

    if outcome.kept {
        println!("{}", outcome.vm_id);
    } else {
        tracing::info!(vm = %outcome.resources.vm_name, "virtual machine deleted successfully");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
