use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vpn_proxy_fetch::{Config, FetchError, Overrides, ReqwestTransport, output};

#[derive(Parser)]
#[command(name = "vpn-proxy-fetch")]
#[command(about = "Acquire a working proxy from free-tier VPN vendor APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config dir, then built-ins)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire and validate a proxy
    Fetch {
        /// Vendor profile name (see `vendors`)
        #[arg(long)]
        vendor: Option<String>,

        /// Preferred location code, e.g. US
        #[arg(long)]
        country: Option<String>,

        /// Maximum number of candidates to validate
        #[arg(long)]
        limit: Option<usize>,

        /// Probe timeout in seconds
        #[arg(long)]
        probe_timeout: Option<u64>,

        /// URL fetched through each candidate
        #[arg(long)]
        probe_target: Option<String>,

        /// Print the result as JSON
        #[arg(long, conflicts_with = "exports_only")]
        json: bool,

        /// Print only the export lines
        #[arg(long)]
        exports_only: bool,
    },
    /// List configured vendors
    Vendors,
    /// Write the default config file
    Init {
        /// Destination (defaults to the user config dir)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the result
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Fetch {
            vendor,
            country,
            limit,
            probe_timeout,
            probe_target,
            json,
            exports_only,
        } => {
            let overrides = Overrides {
                preferred_code: country,
                limit,
                probe_timeout_secs: probe_timeout,
                probe_target,
            };
            match fetch(cli.config, vendor.as_deref(), &overrides).await {
                Ok(proxy) => {
                    if json {
                        println!("{}", output::render_json(&proxy)?);
                    } else if exports_only {
                        for line in output::export_lines(&proxy) {
                            println!("{}", line);
                        }
                    } else {
                        print!("{}", output::render_text(&proxy));
                    }
                }
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(e.exit_code());
                }
            }
        }
        Commands::Vendors => {
            let config = Config::load_or_default(cli.config.as_deref())?;
            for (key, profile) in &config.vendors {
                let marker = if *key == config.default_vendor { " (default)" } else { "" };
                println!("{:<8} {} [{}]{}", key, profile.name, profile.scheme, marker);
            }
        }
        Commands::Init { path, force } => {
            let path = path
                .or(cli.config)
                .or_else(Config::default_path)
                .ok_or("No config directory available, pass a path")?;
            if path.exists() && !force {
                println!("Config already exists: {} (use --force to overwrite)", path.display());
                return Ok(());
            }
            info!("Generating default config...");
            Config::default().save(&path)?;
            println!("Created default config: {}", path.display());
        }
    }

    Ok(())
}

async fn fetch(
    config_path: Option<PathBuf>,
    vendor: Option<&str>,
    overrides: &Overrides,
) -> Result<vpn_proxy_fetch::ValidatedProxy, FetchError> {
    let config = Config::load_or_default(config_path.as_deref())?;
    let (profile, probe) = config.resolve(vendor, overrides)?;

    let transport = ReqwestTransport::new().map_err(|source| FetchError::Network {
        stage: vpn_proxy_fetch::Stage::DomainResolution,
        source,
    })?;
    let mut rng = StdRng::from_entropy();

    vpn_proxy_fetch::acquire(&transport, &profile, &probe, &mut rng).await
}
