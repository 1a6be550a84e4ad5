//! Virtual network interface detection

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, trace};

/// A detected tunnel interface and the address assigned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInterface {
    pub name: String,
    pub address: Ipv4Addr,
}

impl fmt::Display for TunnelInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Source of the current tunnel interface
pub trait InterfaceProbe: Send + Sync {
    /// The first interface that looks like a tunnel, if any
    fn detect(&self) -> Option<TunnelInterface>;
}

/// Whether an interface name contains one of `keywords`, ignoring case
pub fn matches_keywords(name: &str, keywords: &[String]) -> bool {
    let name = name.to_ascii_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && name.contains(&k.to_ascii_lowercase()))
}

/// Pick the tunnel interface out of `(name, address)` pairs: name matches
/// a keyword and the address is non-loopback IPv4.
pub fn select_interface<I>(interfaces: I, keywords: &[String]) -> Option<TunnelInterface>
where
    I: IntoIterator<Item = (String, IpAddr)>,
{
    interfaces.into_iter().find_map(|(name, addr)| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => {
            matches_keywords(&name, keywords).then_some(TunnelInterface { name, address: v4 })
        }
        _ => None,
    })
}

/// Detects interfaces through the operating system's address list
pub struct SystemInterfaceProbe {
    keywords: Vec<String>,
}

impl SystemInterfaceProbe {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

impl InterfaceProbe for SystemInterfaceProbe {
    fn detect(&self) -> Option<TunnelInterface> {
        let interfaces = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                debug!(error = %e, "Failed to list network interfaces");
                return None;
            }
        };
        trace!(count = interfaces.len(), "Listed network interfaces");

        select_interface(
            interfaces
                .into_iter()
                .filter(|i| !i.is_loopback())
                .map(|i| {
                    let ip = i.ip();
                    (i.name, ip)
                }),
            &self.keywords,
        )
    }
}
