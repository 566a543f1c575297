mod ipc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use nbt_kernel::config::{config_path, load_config, load_config_from};
use nbt_kernel::manifest::Manifest;
use nbt_kernel::Kernel;

#[derive(Parser)]
#[command(name = "nbtools", version, about = "nbtools: notebook tool and data registry")]
struct Cli {
    /// Config file (defaults to ~/.nbtools/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the registry to a notebook front-end
    Serve {
        /// Socket path (named pipe on Windows)
        #[arg(long)]
        socket: Option<String>,
    },
    /// Show current status
    Status,
    /// Parse a tool manifest and list what it registers
    Check { manifest: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { socket } => {
            let addr = socket.unwrap_or_else(|| ipc::default_address(&cfg.sync.comm_name));
            let kernel = Arc::new(Kernel::new(cfg)?);
            let imported = kernel.import_defaults();
            info!("Imported {} entries from default manifests", imported);

            tokio::select! {
                res = ipc::serve(kernel, &addr) => res,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    Ok(())
                }
            }
        }
        Commands::Status => {
            let path = cli.config.unwrap_or_else(config_path);
            println!("nbtools v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", path.display());
            println!("Comm: {}", cfg.sync.comm_name);
            println!("Debounce: {} ms", cfg.sync.debounce_ms);
            println!("Socket: {}", ipc::default_address(&cfg.sync.comm_name));
            println!(
                "Usage pings: {}",
                match (&cfg.usage.endpoint, cfg.usage.enabled) {
                    (Some(endpoint), true) => endpoint.as_str(),
                    _ => "off",
                }
            );
            if cfg.load.manifests.is_empty() {
                println!("Manifests: none");
            }
            for manifest in &cfg.load.manifests {
                println!("Manifest: {}", manifest.display());
            }
            Ok(())
        }
        Commands::Check { manifest } => {
            let parsed = Manifest::load(&manifest)?;
            for tool in &parsed.tools {
                let name = tool.name.as_deref().unwrap_or(&tool.id);
                println!("tool  {} | {}  {}", tool.origin, tool.id, name);
            }
            for data in &parsed.data {
                println!("data  {} | {}  [{}]", data.origin, data.uri, data.group);
            }
            println!("{} tools, {} data", parsed.tools.len(), parsed.data.len());
            Ok(())
        }
    }
}
