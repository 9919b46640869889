use anyhow::Result;
use bandwidth_monitor::*;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "bandwidth-monitor", version = VERSION)]
#[command(about = "Agentless SSH/vnStat bandwidth monitor with a web dashboard")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Port for the web dashboard (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Polling interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Username for HTTP Basic Auth (overrides config)
    #[arg(long)]
    user: Option<String>,

    /// Password for HTTP Basic Auth (overrides config)
    #[arg(long)]
    password: Option<String>,

    /// Disable HTTP Basic Auth
    #[arg(long)]
    no_auth: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the monitor and web dashboard (default)
    Web,
    /// List configured servers
    List,
    /// Add a server to the configuration
    Add {
        name: String,
        #[arg(long)]
        ip: String,
        #[arg(long, default_value = "root")]
        user: String,
        #[arg(long, default_value_t = 22)]
        port: u16,
        #[arg(long)]
        interface: String,
    },
    /// Remove a server by name
    Remove { name: String },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let mut args = Args::parse();
    match args.command.take() {
        Some(Command::List) => list_servers(),
        Some(Command::Add {
            name,
            ip,
            user,
            port,
            interface,
        }) => add_server(config::ServerConfig {
            name,
            ip,
            user,
            port,
            interface,
        }),
        Some(Command::Remove { name }) => remove_server(&name),
        Some(Command::Version) => {
            println!("{} v{}", NAME, VERSION);
            Ok(())
        }
        Some(Command::Web) | None => run_web(args).await,
    }
}

fn list_servers() -> Result<()> {
    let cfg = config::Config::load()?;
    if cfg.servers.is_empty() {
        println!("No servers configured. Add one with: bandwidth-monitor add");
        return Ok(());
    }
    println!(
        "{:<20} {:<15} {:<6} {:<12} {:<15}",
        "Name", "IP", "Port", "User", "Interface"
    );
    for server in &cfg.servers {
        println!(
            "{:<20} {:<15} {:<6} {:<12} {:<15}",
            server.name, server.ip, server.port, server.user, server.interface
        );
    }
    println!("\nTotal: {} server(s)", cfg.servers.len());
    Ok(())
}

fn add_server(server: config::ServerConfig) -> Result<()> {
    let mut cfg = config::Config::load()?;
    let name = server.name.clone();
    cfg.add_server(server)?;
    cfg.save()?;
    println!("Server '{}' added", name);
    Ok(())
}

fn remove_server(name: &str) -> Result<()> {
    let mut cfg = config::Config::load()?;
    anyhow::ensure!(cfg.remove_server(name), "server '{}' not found", name);
    cfg.save()?;
    println!("Server '{}' removed", name);
    Ok(())
}

async fn run_web(args: Args) -> Result<()> {
    let mut cfg = config::Config::load()?;
    if let Some(port) = args.port {
        cfg.settings.listen_port = port;
    }
    if let Some(interval) = args.interval {
        cfg.settings.poll_interval = interval.max(1);
    }
    if let Some(user) = args.user {
        cfg.settings.auth_user = user;
    }
    if let Some(password) = args.password {
        cfg.settings.auth_pass = password;
    }
    if args.no_auth {
        cfg.settings.auth_enabled = false;
    }

    if cfg.servers.is_empty() {
        tracing::warn!("no servers configured; add one with `bandwidth-monitor add`");
    }

    let mut settings = cfg.settings.clone();
    if settings.auth_enabled && settings.auth_pass.is_empty() {
        settings.auth_pass = generate_password(8);
        tracing::info!(
            user = %settings.auth_user,
            password = %settings.auth_pass,
            "HTTP Basic Auth enabled with a generated password"
        );
    } else if settings.auth_enabled {
        tracing::info!(user = %settings.auth_user, "HTTP Basic Auth enabled");
    } else {
        tracing::warn!("HTTP Basic Auth disabled; the dashboard is open to everyone");
    }

    let private_key = shell::SshShell::load_private_key()?;
    let poll_interval = Duration::from_secs(settings.poll_interval);
    let shell: Arc<dyn shell::RemoteShell> =
        Arc::new(shell::SshShell::new(private_key, poll_interval * 3));

    let monitor = monitor::Monitor::start(cfg.servers.clone(), shell, poll_interval);
    tracing::info!(servers = cfg.servers.len(), "monitor started");

    if !settings.dashboard_enabled {
        tracing::info!("dashboard disabled; running headless until shutdown");
        shutdown_signal().await;
        monitor.stop().await;
        return Ok(());
    }

    let app = routes::app(monitor.store(), settings.clone());
    let addr = format!("0.0.0.0:{}", settings.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Dashboard listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            monitor.stop().await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn generate_password(length: usize) -> String {
    use rand::Rng;
    const CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}
