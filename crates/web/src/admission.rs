use std::net::IpAddr;

use async_trait::async_trait;

/// Admission control, consulted for every accepted connection before any HTTP
/// state exists. A denied peer's socket is closed right away.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressCheck: Send + Sync {
    async fn allow(&self, ip: IpAddr) -> bool;
}
