//! Command line of the `webstore` binary.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::context::StoreOptions;
use crate::kv::Destination;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "webstore", version, about = "content addressed http storage gateway")]
#[command(group(ArgGroup::new("store").required(true).args(["rsock", "rtcp"])))]
pub struct Cli {
    /// HTTP bind address
    #[arg(short = 'I', long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub ip: IpAddr,

    /// HTTP port
    #[arg(short = 'P', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Serve every connection from one thread instead of a thread pool
    #[arg(short = 's', long)]
    pub single_threaded: bool,

    /// Append log lines to this file instead of stderr
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Store unix socket path
    #[arg(long, value_name = "PATH")]
    pub rsock: Option<PathBuf>,

    /// Store tcp address
    #[arg(long, value_name = "HOST:PORT", value_parser = parse_tcp_destination)]
    pub rtcp: Option<Destination>,

    /// TLS certificate chain (PEM)
    #[arg(long, value_name = "FILE", requires = "key")]
    pub cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, value_name = "FILE", requires = "cert")]
    pub key: Option<PathBuf>,

    /// CA bundle appended to the served certificate chain (PEM)
    #[arg(long, value_name = "FILE", requires = "cert")]
    pub ca: Option<PathBuf>,

    /// Largest accepted POST body in bytes
    #[arg(long, value_name = "BYTES", default_value_t = StoreOptions::DEFAULT_MAX_POST)]
    pub maxpost: u64,

    /// Never overwrite a stored object
    #[arg(long)]
    pub immutable: bool,

    /// Burn after read: delete an object once fetched
    #[arg(long)]
    pub bar: bool,

    /// Close connections idle for this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Print per-route handler timings every second
    #[arg(long)]
    pub stats: bool,
}

impl Cli {
    /// The store destination; the argument group guarantees exactly one is set.
    pub fn destination(&self) -> Option<Destination> {
        self.rtcp.clone().or_else(|| self.rsock.clone().map(Destination::Unix))
    }
}

fn parse_tcp_destination(value: &str) -> Result<Destination, String> {
    let (host, port) = value.rsplit_once(':').ok_or_else(|| format!("`{value}` has no port"))?;
    if host.is_empty() {
        return Err(format!("`{value}` has no host"));
    }
    let port: u16 = port.parse().map_err(|_| format!("`{port}` is not a port"))?;
    if port == 0 {
        return Err("port must not be zero".to_owned());
    }
    Ok(Destination::Tcp { host: host.to_owned(), port })
}
