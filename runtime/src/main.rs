use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use hotswap_runtime::config::Manifest;
use hotswap_runtime::{PluginManager, Resolver, RuntimeConfig};

/// Hotswap - dependency-ordered loading and hot reload of plugins
#[derive(Parser, Debug)]
#[command(name = "hotswap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the global load order of a plugin manifest
    Resolve {
        /// Manifest file (defaults to the configured manifest)
        #[arg(short = 'm', long = "manifest", value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Check one plugin's declared dependencies
    Check {
        name: String,

        #[arg(short = 'm', long = "manifest", value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Print the dependency tree of one plugin as JSON
    Tree {
        name: String,

        #[arg(short = 'm', long = "manifest", value_name = "FILE")]
        manifest: Option<PathBuf>,
    },

    /// Load the built-in plugins, call them and hot-reload the counter
    Demo {
        /// Number of calls before and after the reload
        #[arg(short = 'n', long = "calls", default_value_t = 3)]
        calls: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path),
        None => RuntimeConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Commands::Resolve { manifest } => {
            let manifest = load_manifest(manifest.as_deref(), &config)?;
            let resolution = Resolver::new(&manifest.plugins).resolve_load_order();
            if !resolution.is_ok() {
                for message in resolution.error_messages() {
                    eprintln!("error: {message}");
                }
                anyhow::bail!("load order could not be resolved");
            }
            for (position, name) in resolution.order.iter().enumerate() {
                println!("{:>3}. {}", position + 1, name);
            }
        }
        Commands::Check { name, manifest } => {
            let manifest = load_manifest(manifest.as_deref(), &config)?;
            let report = Resolver::new(&manifest.plugins)
                .check_dependencies(&name)
                .ok_or_else(|| anyhow!("plugin '{name}' is not in the manifest"))?;
            if report.is_satisfied() {
                println!("{name}: all dependencies satisfied");
            } else {
                for missing in report.missing() {
                    println!("{name}: unmet {missing}");
                }
                anyhow::bail!("plugin '{name}' has unmet dependencies");
            }
        }
        Commands::Tree { name, manifest } => {
            let manifest = load_manifest(manifest.as_deref(), &config)?;
            let tree = Resolver::new(&manifest.plugins)
                .dependency_tree(&name)
                .ok_or_else(|| anyhow!("plugin '{name}' is not in the manifest"))?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Commands::Demo { calls } => run_demo(config, calls).await?,
    }

    Ok(())
}

fn load_manifest(path: Option<&Path>, config: &RuntimeConfig) -> anyhow::Result<Manifest> {
    let path = path
        .or(config.manifest_path.as_deref())
        .ok_or_else(|| anyhow!("no manifest given (use --manifest or HOTSWAP_MANIFEST)"))?;
    Manifest::from_file(path).with_context(|| format!("Failed to load manifest {}", path.display()))
}

async fn run_demo(config: RuntimeConfig, calls: u32) -> anyhow::Result<()> {
    let autoload = config.autoload.clone();
    let manager = PluginManager::with_builtins(config);

    // counter pulls in echo
    for name in autoload.iter().map(String::as_str).chain(["counter"]) {
        if manager.state_of(name).is_some_and(|state| state.is_active()) {
            continue;
        }
        manager.load_plugin(name).await?;
    }
    for plugin in manager.list_plugins() {
        info!(
            plugin = %plugin.name,
            version = %plugin.version,
            state = %plugin.state,
            "Plugin ready"
        );
    }

    let echoed = manager.invoke("echo", json!({"hello": "world"})).await?;
    println!("echo -> {echoed}");

    for _ in 0..calls {
        let out = manager.invoke("counter", json!({})).await?;
        println!("counter -> {out}");
    }

    manager.reload_plugin("counter").await?;
    let generation = manager
        .live_instance("counter")
        .map(|live| live.generation)
        .unwrap_or_default();
    println!("counter reloaded (generation {generation})");

    for _ in 0..calls {
        let out = manager.invoke("counter", json!({})).await?;
        println!("counter -> {out}");
    }

    if let Some(metrics) = manager.plugin_metrics("counter") {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }

    let errors = manager.shutdown().await;
    if !errors.is_empty() {
        anyhow::bail!(
            "shutdown finished with errors: {}",
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
    }
    Ok(())
}
