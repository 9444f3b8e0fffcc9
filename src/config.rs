use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use serde::{Serialize, Serializer};

/// The 13 IANA root servers, used as the starting point for iterative
/// resolution when no nameservers are configured.
pub const ROOT_SERVERS: [&str; 13] = [
    "198.41.0.4:53",
    "192.228.79.201:53",
    "192.33.4.12:53",
    "199.7.91.13:53",
    "192.203.230.10:53",
    "192.5.5.241:53",
    "192.112.36.4:53",
    "198.97.190.53:53",
    "192.36.148.17:53",
    "192.58.128.30:53",
    "193.0.14.129:53",
    "199.7.83.42:53",
    "202.12.27.33:53",
];

lazy_static! {
    static ref CLASS_NAMES: HashMap<u16, &'static str> = HashMap::from([
        (1, "IN"),
        (2, "CS"),
        (3, "CH"),
        (4, "HS"),
        (254, "NONE"),
        (255, "ANY"),
    ]);
}

/// Map a `--class` argument onto its numeric code.
pub fn parse_class(value: &str) -> Result<u16> {
    match value.to_ascii_uppercase().as_str() {
        "INET" | "IN" => Ok(1),
        "CSNET" | "CS" => Ok(2),
        "CHAOS" | "CH" => Ok(3),
        "HESIOD" | "HS" => Ok(4),
        "NONE" => Ok(254),
        "ANY" => Ok(255),
        other => bail!(
            "unknown record class {other}. Valid values are INET (default), CSNET, CHAOS, HESIOD, NONE, ANY"
        ),
    }
}

pub fn class_name(code: u16) -> String {
    CLASS_NAMES
        .get(&code)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("CLASS{code}"))
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

/// Everything a run needs, resolved from the CLI surface. Read-only once the
/// worker pool starts.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalConfig {
    pub module: String,
    pub qtype: u16,
    pub qclass: u16,
    pub threads: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub iteration_timeout: Duration,
    pub retries: usize,
    pub max_depth: usize,
    pub cache_size: usize,
    pub iterative: bool,
    pub alexa_format: bool,
    pub metadata_format: bool,
    pub name_server_mode: bool,
    pub tcp_only: bool,
    pub udp_only: bool,
    pub reuse_sockets: bool,
    pub nanoseconds: bool,
    pub verbosity: u8,
    pub result_verbosity: String,
    pub output_groups: Vec<String>,
    pub name_servers: Vec<String>,
    pub name_servers_specified: bool,
    pub local_addrs: Vec<IpAddr>,
    pub prefix: String,
    pub override_name: String,
    pub input_file: String,
    pub output_file: String,
    pub metadata_file: String,
    pub log_file: String,
    pub blacklist_file: String,
}

impl GlobalConfig {
    /// The slice of the configuration the resolver itself consumes.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            iterative: self.iterative,
            traced: self.result_verbosity == "trace",
            timeout: self.timeout,
            iteration_timeout: self.iteration_timeout,
            retries: self.retries,
            max_depth: self.max_depth,
            name_servers: self.name_servers.clone(),
            tcp_only: self.tcp_only,
            udp_only: self.udp_only,
        }
    }
}

/// Immutable per-resolver configuration; one copy shared by every worker.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub iterative: bool,
    pub traced: bool,
    pub timeout: Duration,
    pub iteration_timeout: Duration,
    pub retries: usize,
    pub max_depth: usize,
    pub name_servers: Vec<String>,
    pub tcp_only: bool,
    pub udp_only: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            iterative: false,
            traced: false,
            timeout: Duration::from_secs(15),
            iteration_timeout: Duration::from_secs(4),
            retries: 1,
            max_depth: 10,
            name_servers: ROOT_SERVERS.iter().map(|s| s.to_string()).collect(),
            tcp_only: false,
            udp_only: false,
        }
    }
}
