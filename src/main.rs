use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bouncer::proxy::{self, ProxyConfig};

#[derive(Parser)]
#[command(name = "bouncer")]
#[command(about = "Filtering DNS forwarding relay", long_about = None)]
struct Args {
    /// Path to the configuration document
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Local port to listen on
    #[arg(short, long, default_value = "5353")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind_addr: SocketAddr = match format!("{}:{}", args.bind, args.port).parse() {
        Ok(addr) => addr,
        Err(_) => {
            eprintln!("invalid bind address {}:{}", args.bind, args.port);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let proxy = ProxyConfig {
        bind_addr,
        config_path: args.config,
    };

    match rt.block_on(proxy::run(proxy)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
