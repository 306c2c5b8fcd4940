use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use easyport_config::{init_tracing, load_for_workspace, EasyportConfig};
use easyport_workspace::{DetectedProject, ImportReport, ImportSession};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "easyport",
    version,
    about = "easyport (detect and import Maven projects)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import every Maven project below a directory and configure it
    Import(ImportArgs),
    /// List the Maven projects an import would pick up
    Detect(DetectArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Root of the tree to import
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
    /// Config file (defaults to `easyport.toml` or `.easyport/config.toml` in the import root)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct DetectArgs {
    /// Root of the tree to scan
    path: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
    /// Config file (defaults to `easyport.toml` or `.easyport/config.toml` in the scan root)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Import(args) => {
            let config = load_config(&args.path, args.config.as_deref())?;
            init_tracing(&config.logging);

            let session = ImportSession::new(&config.import);
            let report = session
                .import(&args.path)
                .with_context(|| format!("failed to import {}", args.path.display()))?;
            let exit = if report.settled && report.maven_updates.failures == 0 {
                0
            } else {
                1
            };
            print_output(&report, args.json)?;
            Ok(exit)
        }
        Command::Detect(args) => {
            let config = load_config(&args.path, args.config.as_deref())?;
            init_tracing(&config.logging);

            let session = ImportSession::new(&config.import);
            let projects = session
                .detect(&args.path)
                .with_context(|| format!("failed to scan {}", args.path.display()))?;
            print_output(&projects, args.json)?;
            Ok(0)
        }
    }
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<EasyportConfig> {
    match explicit {
        Some(path) => EasyportConfig::load_from_path(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => load_for_workspace(root).context("failed to load workspace config"),
    }
}

fn print_output<T: Serialize + 'static>(value: &T, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
        return Ok(());
    }

    // Human output for key types. Everything else falls back to pretty JSON.
    let any = value as &dyn std::any::Any;
    if let Some(report) = any.downcast_ref::<ImportReport>() {
        println!("imported: {}", report.root.display());
        for project in &report.projects {
            println!(
                "  {} ({}) {}",
                project.name,
                project.root.display(),
                project.maven.as_deref().unwrap_or("<not updated>")
            );
        }
        println!(
            "maven updates: {} batches, {} projects, {} failed batches",
            report.maven_updates.batches, report.maven_updates.items, report.maven_updates.failures
        );
        if !report.settled {
            println!("warning: background configuration did not settle");
        }
        println!("elapsed_ms: {}", report.elapsed_ms);
    } else if let Some(projects) = any.downcast_ref::<Vec<DetectedProject>>() {
        for project in projects {
            println!(
                "{}: {} [{}]",
                project.name,
                project.root.display(),
                project.configurator
            );
        }
        println!("summary: {} projects", projects.len());
    } else {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
    }
    Ok(())
}
