use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use ipnet::IpNet;

/// Nameservers we refuse to query. Built once at startup and shared through
/// an `Arc`; membership tests take no lock.
#[derive(Debug, Default)]
pub struct Blacklist {
    nets: Vec<IpNet>,
}

impl Blacklist {
    pub fn from_nets(nets: Vec<IpNet>) -> Self {
        Blacklist { nets }
    }

    /// Parse a file of IPs and CIDR prefixes, one per line. Blank lines and
    /// `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read blacklist file {}", path.display()))?;
        let mut nets = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let net = parse_net(line)
                .with_context(|| format!("invalid blacklist entry {line:?} in {}", path.display()))?;
            nets.push(net);
        }
        Ok(Blacklist { nets })
    }

    pub fn is_listed(&self, addr: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&addr))
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }
}

fn parse_net(entry: &str) -> Result<IpNet> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    let addr: IpAddr = entry.parse()?;
    Ok(IpNet::from(addr))
}
