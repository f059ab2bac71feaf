//! Per-address connection rate limiting.
//!
//! A fixed window per peer address, kept in the store under `IPS:<ip>`: the first
//! connection opens the window with a TTL of `period` seconds, later ones only
//! increment the counter until the key expires. Admissions are checked one at a
//! time so that simultaneous connections from one peer cannot all read the same count.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};
use webstore_web::AddressCheck;

use crate::kv::{Command, KvStore, RespValue};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Window length in seconds
    pub period: u64,
    /// Connections allowed per window
    pub max_count: u64,
}

impl LimiterConfig {
    /// `None` unless both values are positive, which disables limiting.
    pub fn new(period: i64, max_count: i64) -> Option<Self> {
        let period = u64::try_from(period).ok().filter(|&p| p > 0)?;
        let max_count = u64::try_from(max_count).ok().filter(|&c| c > 0)?;
        Some(Self { period, max_count })
    }
}

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    config: LimiterConfig,
    /// Held from the counter lookup until its update has been sent.
    admission: Mutex<()>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("config", &self.config).finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: LimiterConfig) -> Self {
        Self { store, config, admission: Mutex::new(()) }
    }

    fn key(ip: IpAddr) -> String {
        format!("IPS:{ip}")
    }

    async fn open_window(&self, ip: IpAddr) {
        let command = Command::new("SET").arg(Self::key(ip)).arg("1").arg("EX").arg(self.config.period.to_string());
        match self.store.execute(command).await {
            Ok(RespValue::Error(message)) => warn!(client_ip = %ip, cause = %message, "store refused window"),
            Ok(_) => {}
            Err(e) => warn!(client_ip = %ip, cause = %e, "open window failed"),
        }
    }

    async fn bump(&self, ip: IpAddr) {
        match self.store.execute(Command::new("INCR").arg(Self::key(ip))).await {
            Ok(RespValue::Error(message)) => warn!(client_ip = %ip, cause = %message, "store refused increment"),
            Ok(_) => {}
            Err(e) => warn!(client_ip = %ip, cause = %e, "increment failed"),
        }
    }
}

/// Counter text as stored; anything unparsable counts as zero.
fn parse_count(value: &[u8]) -> u64 {
    std::str::from_utf8(value).ok().and_then(|text| text.trim().parse().ok()).unwrap_or(0)
}

#[async_trait]
impl AddressCheck for RateLimiter {
    async fn allow(&self, ip: IpAddr) -> bool {
        // a dual-stack listener reports IPv4 peers as ::ffff:a.b.c.d
        let ip = ip.to_canonical();
        if ip == LOOPBACK {
            return true;
        }

        let _admission = self.admission.lock().await;

        match self.store.execute(Command::new("GET").arg(Self::key(ip))).await {
            Ok(RespValue::Nil) => {
                self.open_window(ip).await;
                info!("{ip} new connection allowed (count: 1)");
                true
            }
            Ok(RespValue::Bulk(value)) => {
                let count = parse_count(&value);
                if count < self.config.max_count {
                    self.bump(ip).await;
                    info!("{ip} new connection allowed (count: {})", count + 1);
                    true
                } else {
                    info!("{ip} new connection denied (count: {})", count.saturating_add(1));
                    false
                }
            }
            Ok(other) => {
                warn!(client_ip = %ip, reply = other.type_name(), "unexpected limiter reply, connection denied");
                false
            }
            Err(e) => {
                warn!(client_ip = %ip, cause = %e, "limiter lookup failed, connection denied");
                false
            }
        }
    }
}
