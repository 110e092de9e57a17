use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};
use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio_turn_server::UdpTurnServer;
use turn_relay::config::Credential;
use turn_relay::{ServerConfigBuilder, StaticCredentials};

#[derive(Parser, Debug)]
#[command(author, version, about = "UDP TURN relay server", long_about = None)]
struct Args {
    /// IP address advertised to clients in relayed addresses
    #[arg(long, env = "TURN_PUBLIC_IP")]
    public_ip: IpAddr,

    /// Address the listening socket is bound to
    #[arg(long, env = "TURN_LISTEN_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    listen_addr: IpAddr,

    /// UDP port for STUN and TURN requests
    #[arg(long, env = "TURN_PORT", default_value_t = 3478)]
    port: u16,

    /// Lowest relay port
    #[arg(long, env = "TURN_RELAY_MIN", default_value_t = 40000)]
    relay_min: u16,

    /// Highest relay port
    #[arg(long, env = "TURN_RELAY_MAX", default_value_t = 40099)]
    relay_max: u16,

    /// Realm of the long-term credentials
    #[arg(long, env = "TURN_REALM", default_value = "echo-chamber")]
    realm: String,

    /// Username of the default credential
    #[arg(long, env = "TURN_USER")]
    username: Option<String>,

    /// Password of the default credential
    #[arg(long, env = "TURN_PASS", hide_env_values = true)]
    password: Option<String>,

    /// Additional credential as name:password, may be repeated
    #[arg(long = "user", value_parser = parse_credential)]
    users: Vec<Credential>,

    /// Value of the SOFTWARE attribute added to responses
    #[arg(long, env = "TURN_SOFTWARE")]
    software: Option<String>,

    /// File the log is appended to, in addition to stdout
    #[arg(long, env = "TURN_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn parse_credential(value: &str) -> Result<Credential, String> {
    match value.split_once(':') {
        Some((username, password)) if !username.is_empty() && !password.is_empty() => {
            Ok(Credential::new(username, password))
        }
        _ => Err(String::from("expected name:password")),
    }
}

/// Copies log records to stdout and to a file
struct Tee(File);

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.0.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.0.flush()
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Can not create log directory {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Can not open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee(file))));
    }
    builder.init();
    Ok(())
}

/// Completes on ctrl-c or, on unix, SIGTERM. The handlers are installed
/// before this returns.
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut terminate = signal(SignalKind::terminate()).context("Can not listen for SIGTERM")?;

    Ok(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Can not listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };
        #[cfg(unix)]
        let terminate = async move {
            terminate.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = interrupt => info!("Interrupted"),
            _ = terminate => info!("Terminated"),
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let mut builder = ServerConfigBuilder::default()
        .with_listen_addr(SocketAddr::new(args.listen_addr, args.port))
        .with_relay_public_ip(args.public_ip)
        .with_relay_ports(args.relay_min, args.relay_max)
        .with_realm(args.realm);
    match (args.username, args.password) {
        (Some(username), Some(password)) => {
            builder = builder.with_credential(username, password);
        }
        (None, None) => {}
        _ => bail!("TURN_USER and TURN_PASS must be given together"),
    }
    for user in &args.users {
        builder = builder.with_credential(user.username(), user.password());
    }
    if let Some(software) = args.software {
        builder = builder.with_software(software);
    }
    let config = builder.build().context("Invalid configuration")?;

    let auth = StaticCredentials::new(config.realm(), config.credentials())
        .context("Invalid credentials")?;
    info!("{} users configured", auth.len());

    let shutdown = shutdown_signal()?;
    let server = UdpTurnServer::bind(config, Arc::new(auth))
        .await
        .context("Can not bind listening socket")?;
    server.run_until(shutdown).await?;
    Ok(())
}
