//! Workspace automation tasks.
//!
//! Run with: `cargo xtask <command>`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

const CRATE_PREFIX: &str = "tmi-";
const DEMO_DIR: &str = "demos";

#[derive(Parser)]
#[command(name = "xtask", about = "TMI workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks locally
    Ci,
    /// Validate workspace conventions
    Lint,
    /// Generate coverage report
    Coverage,
    /// Run every demo scenario through the CLI
    Demos,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => run_ci(),
        Commands::Lint => run_lint(),
        Commands::Coverage => run_coverage(),
        Commands::Demos => run_demos(),
    }
}

fn run_ci() -> Result<()> {
    println!("Running CI checks...\n");

    run_lint()?;
    run_cmd("cargo", &["fmt", "--check"])?;
    run_cmd("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
    run_cmd("cargo", &["test", "--workspace"])?;
    run_cmd("cargo", &["doc", "--workspace", "--no-deps"])?;
    run_demos()?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint() -> Result<()> {
    println!("Validating workspace conventions...\n");

    for dir in crate_dirs()? {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !name.starts_with(CRATE_PREFIX) {
            anyhow::bail!("Crate '{name}' does not follow {CRATE_PREFIX}* naming");
        }

        let manifest = fs::read_to_string(dir.join("Cargo.toml"))
            .with_context(|| format!("Crate '{name}' has no Cargo.toml"))?;
        if !manifest.contains(&format!("name = \"{name}\"")) {
            anyhow::bail!("Crate '{name}' package name does not match its directory");
        }
        if !manifest.contains("[lints]") || !manifest.contains("workspace = true") {
            anyhow::bail!("Crate '{name}' does not inherit workspace lints");
        }

        let lib = dir.join("src/lib.rs");
        if lib.exists() {
            let source = fs::read_to_string(&lib)?;
            for attr in ["#![forbid(unsafe_code)]", "#![deny(missing_docs)]"] {
                if !source.contains(attr) {
                    anyhow::bail!("{} is missing {attr}", lib.display());
                }
            }
        }
    }

    for demo in demo_files()? {
        let raw = fs::read_to_string(&demo)?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", demo.display()))?;
        if value.get("request").is_none() {
            anyhow::bail!("{} has no request", demo.display());
        }
    }

    println!("All conventions validated!");
    Ok(())
}

fn run_coverage() -> Result<()> {
    run_cmd("cargo", &["llvm-cov", "--workspace", "--html"])?;
    println!("\nCoverage report: target/llvm-cov/html/index.html");
    Ok(())
}

fn run_demos() -> Result<()> {
    for demo in demo_files()? {
        let path = demo.to_string_lossy().into_owned();
        for command in ["preview", "simulate", "apply", "purge", "purge-local"] {
            run_cmd(
                "cargo",
                &["run", "--quiet", "-p", "tmi-cli", "--", "--scenario", &path, command],
            )?;
        }
    }
    Ok(())
}

fn crate_dirs() -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir("crates")? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn demo_files() -> Result<Vec<PathBuf>> {
    let dir = Path::new(DEMO_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn run_cmd(cmd: &str, args: &[&str]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}
