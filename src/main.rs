//! mptcp-installer - main entry point
//!
//! Exit codes: 0 on success or when already up to date, 1 on any failure.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mptcp_installer::cli::{Cli, Commands};
use mptcp_installer::orchestrator::{ArtifactAction, RunOutcome, UpdateCheck};
use mptcp_installer::{
    Dpkg, GithubReleases, Grub, InstallerConfig, Orchestrator, ProgressStore, sanity,
};

/// Initialize the tracing subscriber; RUST_LOG overrides the verbosity flag
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match cli.action() {
        Commands::ValidateConfig { file } => {
            info!("Validating configuration file: {:?}", file);
            let config = InstallerConfig::load_from_file(&file)?;
            config.validate()?;
            println!("✓ Configuration file is valid: {}", file.display());
            Ok(())
        }
        Commands::Status => show_status(&resolve_config(cli)?),
        Commands::Check => check_for_update(&resolve_config(cli)?),
        Commands::Install { skip_preflight } => {
            let config = resolve_config(cli)?;
            if skip_preflight {
                warn!("Pre-flight checks skipped");
            } else {
                preflight()?;
            }
            install(&config)
        }
    }
}

/// Defaults, then the config file, then flags and environment
fn resolve_config(cli: &Cli) -> Result<InstallerConfig> {
    let mut config = match &cli.config {
        Some(path) => InstallerConfig::load_from_file(path)?,
        None => InstallerConfig::default(),
    };
    if let Some(root_dir) = &cli.root_dir {
        config.root_dir = root_dir.clone();
    }
    if let Some(url) = &cli.release_url {
        config.release_url = url.clone();
    }
    if let Some(path) = &cli.grub_cfg {
        config.grub_cfg = path.clone();
    }
    if let Some(path) = &cli.grub_default {
        config.grub_default = path.clone();
    }
    config.validate().context("Invalid configuration")?;
    debug!(?config, "Resolved configuration");
    Ok(config)
}

fn preflight() -> Result<()> {
    let result = sanity::verify_environment();
    if !result.is_ok() {
        eprint!("{}", result.report());
        anyhow::bail!("Pre-flight checks failed");
    }
    info!("Pre-flight checks passed");
    Ok(())
}

fn install(config: &InstallerConfig) -> Result<()> {
    let mut store = ProgressStore::load(config.progress_file())?;
    let source = GithubReleases::new(config.release_url()?)?;
    let grub = Grub::new(&config.grub_cfg, &config.grub_default);

    let mut orchestrator = Orchestrator::new(config, &mut store, &source, &Dpkg, &grub);
    match orchestrator.run()? {
        RunOutcome::UpToDate(version) => {
            println!("✓ {} is already installed", version);
        }
        RunOutcome::Installed(report) => {
            println!(
                "✓ Installed {} (kernel {}): {} downloaded, {} reused",
                report.version,
                report.kernel_version,
                report.fetched.len(),
                report.reused.len()
            );
            println!("  Boot default: {}", report.boot_entry.default_target());
        }
    }
    Ok(())
}

fn check_for_update(config: &InstallerConfig) -> Result<()> {
    let mut store = ProgressStore::load(config.progress_file())?;
    let source = GithubReleases::new(config.release_url()?)?;
    let grub = Grub::new(&config.grub_cfg, &config.grub_default);

    let orchestrator = Orchestrator::new(config, &mut store, &source, &Dpkg, &grub);
    match orchestrator.check()? {
        UpdateCheck::UpToDate(version) => println!("✓ {} is already installed", version),
        UpdateCheck::Available(plan) => {
            let current = plan
                .previous
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string);
            println!(
                "Update available: {} (installed: {}, kernel {})",
                plan.version, current, plan.kernel_version
            );
            for planned in &plan.artifacts {
                let action = match &planned.action {
                    ArtifactAction::Reuse(_) => "reuse",
                    ArtifactAction::Fetch(_) => "fetch",
                };
                println!("  {:<6} {}", action, planned.artifact.filename);
            }
        }
    }
    Ok(())
}

fn show_status(config: &InstallerConfig) -> Result<()> {
    let store = ProgressStore::load(config.progress_file())?;
    println!("Progress file: {}", store.path().display());
    println!(
        "Version:        {}",
        store.version().map_or("none", |v| v.as_str())
    );
    println!("Kernel version: {}", store.kernel_version().unwrap_or("none"));
    let deprecated: Vec<_> = store
        .deprecated_versions()
        .iter()
        .map(|v| v.as_str())
        .collect();
    println!(
        "Deprecated:     {}",
        if deprecated.is_empty() {
            "none".to_string()
        } else {
            deprecated.join(", ")
        }
    );
    for (class, filename) in &store.record().files {
        println!("  {:<15} {}", class, filename);
    }
    Ok(())
}
