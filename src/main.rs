use clap::{Parser, Subcommand};
use sockowner::config::{self, Config, SourceKind};
use sockowner::dataplane::{
    ConnTrackTable, InetSocketTable, LookupMode, NetDevice, SocketResolver,
};
use sockowner::telemetry::init_logging;
use sockowner::{system, Error, Result};
use std::ffi::CString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "sockowner")]
#[command(about = "Find the local socket that owns a packet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Resolve the socket owning a hex-encoded IPv4/IPv6 packet
    Resolve {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Receiving interface, looked up by name
        #[arg(short, long, conflicts_with = "ifindex")]
        device: Option<String>,

        /// Receiving interface index
        #[arg(long, default_value_t = 0)]
        ifindex: u32,

        /// Which sockets may match: any, listener, established
        #[arg(short, long, default_value_t = LookupMode::Any)]
        mode: LookupMode,

        /// Packet bytes in hex, starting at the IP header
        packet: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => cmd_config_validate(&config),
        Commands::Resolve {
            config,
            device,
            ifindex,
            mode,
            packet,
        } => cmd_resolve(&config, device, ifindex, mode, &packet),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_config_validate(config_path: &Path) -> Result<()> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path)?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err(Error::Config("validation failed".to_string()))
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_resolve(
    config_path: &Path,
    device: Option<String>,
    ifindex: u32,
    mode: LookupMode,
    packet_hex: &str,
) -> Result<()> {
    let cfg = config::load(config_path)?;
    init_logging(Some(&cfg.logging));

    let packet = hex::decode(packet_hex.trim())
        .map_err(|e| Error::Parse(format!("packet is not valid hex: {}", e)))?;
    let device = match device {
        Some(name) => NetDevice::new(interface_index(&name)?, name),
        None => NetDevice::new(ifindex, format!("if{}", ifindex)),
    };

    let resolver = build_resolver(&cfg)?;
    info!(
        sockets = resolver.sockets().len(),
        dev = %device.name,
        %mode,
        "resolving packet"
    );

    let version = packet.first().map(|b| b >> 4);
    let sock = match version {
        Some(4) => resolver.lookup_v4_socket_with_mode(&packet, &device, mode),
        Some(6) => resolver.lookup_v6_socket_with_mode(&packet, &device, mode),
        _ => {
            return Err(Error::InvalidPacket(
                "expected an IPv4 or IPv6 header".to_string(),
            ))
        }
    };

    match sock {
        Some(sock) => println!("{}", *sock),
        None => println!("no socket"),
    }

    for (name, value) in resolver.metrics().export() {
        debug!(metric = %name, value, "lookup metric");
    }
    Ok(())
}

/// Socket table per `source.kind`, conntrack from the config file
fn build_resolver(cfg: &Config) -> Result<SocketResolver<InetSocketTable, ConnTrackTable>> {
    let sockets = match cfg.source.kind {
        SourceKind::Static => cfg.build_socket_table()?,
        SourceKind::Procfs => system::load_socket_table()?,
    };
    let conntrack = cfg.build_conntrack()?;
    Ok(SocketResolver::new(sockets, conntrack))
}

fn interface_index(name: &str) -> Result<u32> {
    let not_found = || Error::InterfaceNotFound {
        name: name.to_string(),
    };
    let c_name = CString::new(name).map_err(|_| not_found())?;

    // SAFETY: c_name is a valid NUL-terminated string for the duration of the call
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(not_found());
    }
    Ok(index)
}
