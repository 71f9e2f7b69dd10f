//! Startup configuration: CLI flags via `clap`, validated once before the
//! listener binds (spec.md §6.6's persisted-state layout plus the ambient
//! process-configuration concern SPEC_FULL.md §13 adds).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::errors::{ServerError, ServerResult};

#[derive(Parser, Debug)]
#[command(name = "tyrant-rs", about = "Networked key-value server with update-log replication", version)]
pub struct Args {
    /// Address to bind a TCP listener to. Ignored if --unix-socket is set.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_addr: String,

    /// TCP port to bind. Ignored if --unix-socket is set.
    #[arg(long, default_value_t = 1978)]
    pub port: u16,

    /// Bind a Unix domain socket at this path instead of TCP.
    #[arg(long)]
    pub unix_socket: Option<PathBuf>,

    /// Fixed worker pool size: at most this many connections are served concurrently (spec.md §4.1).
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Per-connection idle recv timeout in seconds. 0 disables the timeout.
    #[arg(long, default_value_t = 0)]
    pub timeout_secs: u64,

    /// Directory holding update-log segments (spec.md §4.7).
    #[arg(long, default_value = "./ulog")]
    pub ulog_dir: PathBuf,

    /// Update-log segment size limit in bytes. 0 = unlimited.
    #[arg(long, default_value_t = 0)]
    pub ulog_limit_bytes: u64,

    /// This server's replication origin id (spec.md §2.2, §4.8).
    #[arg(long, default_value_t = 1)]
    pub sid: u32,

    /// Access mask bits (spec.md §3, §4.5). Accepts decimal or 0x-prefixed hex.
    #[arg(long, default_value = "0", value_parser = parse_mask)]
    pub mask: u64,

    /// Replication master to follow, `host:port`. Repeatable for multiple masters.
    #[arg(long = "master")]
    pub masters: Vec<String>,

    /// Write the process id here at startup; removed on clean shutdown.
    #[arg(long)]
    pub pidfile: Option<PathBuf>,
}

fn parse_mask(raw: &str) -> Result<u64, String> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        raw.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum BindTarget {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

#[derive(Debug, Clone)]
pub struct MasterTarget {
    pub host: String,
    pub port: u16,
}

/// Validated configuration, ready to hand to the server. `Args` is the raw
/// CLI surface; `Config` is what the rest of the crate depends on.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: BindTarget,
    pub workers: usize,
    pub timeout_secs: u64,
    pub ulog_dir: PathBuf,
    pub ulog_limit_bytes: u64,
    pub sid: u32,
    pub mask: u64,
    pub masters: Vec<MasterTarget>,
    pub pidfile: Option<PathBuf>,
}

impl Config {
    pub fn from_args(args: Args) -> ServerResult<Self> {
        if args.workers == 0 {
            return Err(ServerError::config("--workers must be at least 1"));
        }

        let bind = match args.unix_socket {
            Some(path) => BindTarget::Unix(path),
            None => {
                let addr = format!("{}:{}", args.bind_addr, args.port)
                    .parse::<SocketAddr>()
                    .map_err(|e| ServerError::config(format!("invalid bind address: {e}")))?;
                BindTarget::Tcp(addr)
            }
        };

        let masters = args
            .masters
            .iter()
            .map(|spec| parse_master(spec))
            .collect::<ServerResult<Vec<_>>>()?;

        Ok(Config {
            bind,
            workers: args.workers,
            timeout_secs: args.timeout_secs,
            ulog_dir: args.ulog_dir,
            ulog_limit_bytes: args.ulog_limit_bytes,
            sid: args.sid,
            mask: args.mask,
            masters,
            pidfile: args.pidfile,
        })
    }

    /// Where each configured master's last-applied-timestamp state file
    /// lives (spec.md §2.3, §6.6), namespaced by the master's address so
    /// multiple followers in one process don't collide.
    pub fn repl_state_path(&self, master: &MasterTarget) -> PathBuf {
        self.ulog_dir.join(format!("repl-state-{}-{}.ts", master.host, master.port))
    }
}

fn parse_master(spec: &str) -> ServerResult<MasterTarget> {
    let (host, port) = spec
        .rsplit_once(':')
        .ok_or_else(|| ServerError::config(format!("master {spec:?} must be host:port")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ServerError::config(format!("master {spec:?} has an invalid port")))?;
    Ok(MasterTarget { host: host.to_string(), port })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            bind_addr: "127.0.0.1".to_string(),
            port: 1978,
            unix_socket: None,
            workers: 8,
            timeout_secs: 0,
            ulog_dir: PathBuf::from("./ulog"),
            ulog_limit_bytes: 0,
            sid: 1,
            mask: 0,
            masters: vec![],
            pidfile: None,
        }
    }

    #[test]
    fn rejects_zero_workers() {
        let mut args = base_args();
        args.workers = 0;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn parses_master_host_port() {
        let mut args = base_args();
        args.masters = vec!["db-master:1978".to_string()];
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.masters[0].host, "db-master");
        assert_eq!(config.masters[0].port, 1978);
    }

    #[test]
    fn hex_mask_is_accepted() {
        assert_eq!(parse_mask("0x10").unwrap(), 0x10);
        assert_eq!(parse_mask("16").unwrap(), 16);
    }
}
