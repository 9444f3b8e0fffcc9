use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use crate::config::{parse_class, GlobalConfig, ROOT_SERVERS};
use crate::input::add_default_port;
use crate::modules::ModuleSet;

const RESOLV_CONF: &str = "/etc/resolv.conf";
const FALLBACK_RESOLVERS: [&str; 4] =
    ["8.8.8.8:53", "8.8.4.4:53", "1.1.1.1:53", "1.0.0.1:53"];

/// High-speed bulk DNS lookups: reads names line by line, fans the queries
/// out over a worker pool, writes one JSON record per input.
#[derive(Parser, Debug)]
#[command(name = "dnsprobe", version)]
pub struct Cli {
    /// Record type module to query (A, AAAA, MX, ...), case-insensitive
    #[arg(value_name = "MODULE")]
    pub module: String,

    /// Number of lightweight worker tasks
    #[arg(long, default_value_t = 1000, env = "DNSPROBE_THREADS")]
    pub threads: usize,

    /// Name prepended to every input name (e.g. www.)
    #[arg(long, default_value = "", env = "DNSPROBE_PREFIX")]
    pub prefix: String,

    /// Name that overrides all input names
    #[arg(long, default_value = "", env = "DNSPROBE_OVERRIDE_NAME")]
    pub override_name: String,

    /// Input lines are `rank,name` from an Alexa-style ranking
    #[arg(long, env = "DNSPROBE_ALEXA")]
    pub alexa: bool,

    /// Input lines are `name,metadata`; metadata is copied to the output
    #[arg(long, env = "DNSPROBE_METADATA_PASSTHROUGH")]
    pub metadata_passthrough: bool,

    /// Input lines are nameservers; the queried name comes from
    /// --override-name
    #[arg(long, env = "DNSPROBE_NAME_SERVER_MODE")]
    pub name_server_mode: bool,

    /// Walk the delegation chain from the roots instead of asking a
    /// recursive resolver
    #[arg(long, env = "DNSPROBE_ITERATIVE")]
    pub iterative: bool,

    /// Names to read; - for stdin
    #[arg(long, default_value = "-", env = "DNSPROBE_INPUT_FILE")]
    pub input_file: String,

    /// Where JSON results go; - for stdout
    #[arg(long, default_value = "-", env = "DNSPROBE_OUTPUT_FILE")]
    pub output_file: String,

    /// Where the end-of-run JSON summary goes; - for stderr
    #[arg(long, default_value = "", env = "DNSPROBE_METADATA_FILE")]
    pub metadata_file: String,

    /// Redirect logs to a file instead of stderr
    #[arg(long, default_value = "", env = "DNSPROBE_LOG_FILE")]
    pub log_file: String,

    /// Per-record field detail: short, normal, long, trace
    #[arg(long, default_value = "normal", env = "DNSPROBE_RESULT_VERBOSITY")]
    pub result_verbosity: String,

    /// Extra field groups beyond the verbosity: class, protocol, ttl,
    /// resolver, flags
    #[arg(long, default_value = "", env = "DNSPROBE_INCLUDE_FIELDS")]
    pub include_fields: String,

    /// Log verbosity, 1 (lowest) to 5 (highest)
    #[arg(long, default_value_t = 3, env = "DNSPROBE_VERBOSITY")]
    pub verbosity: u8,

    /// How many times to retry on timeout or temporary failure
    #[arg(long, default_value_t = 1, env = "DNSPROBE_RETRIES")]
    pub retries: usize,

    /// Recursion depth cap for iterative lookups
    #[arg(long, default_value_t = 10, env = "DNSPROBE_MAX_DEPTH")]
    pub max_depth: usize,

    /// Entry cap for the iterative lookup cache
    #[arg(long, default_value_t = 10000, env = "DNSPROBE_CACHE_SIZE")]
    pub cache_size: usize,

    /// Only perform lookups over TCP
    #[arg(long, env = "DNSPROBE_TCP_ONLY")]
    pub tcp_only: bool,

    /// Only perform lookups over UDP
    #[arg(long, env = "DNSPROBE_UDP_ONLY")]
    pub udp_only: bool,

    /// Comma-delimited servers, or @/path/to/file; port 53 added when
    /// missing
    #[arg(long, default_value = "", env = "DNSPROBE_NAME_SERVERS")]
    pub name_servers: String,

    /// Comma-delimited local addresses to send from
    #[arg(long, default_value = "", env = "DNSPROBE_LOCAL_ADDR")]
    pub local_addr: String,

    /// Seconds to wait for a single exchange
    #[arg(long, default_value_t = 15, env = "DNSPROBE_TIMEOUT")]
    pub timeout: u64,

    /// Seconds allowed for a whole iterative walk
    #[arg(long, default_value_t = 4, env = "DNSPROBE_ITERATION_TIMEOUT")]
    pub iteration_timeout: u64,

    /// DNS class: INET, CSNET, CHAOS, HESIOD, NONE, ANY
    #[arg(long, default_value = "INET", env = "DNSPROBE_CLASS")]
    pub class: String,

    /// Nanosecond resolution output timestamps
    #[arg(long, env = "DNSPROBE_NANOSECONDS")]
    pub nanoseconds: bool,

    /// File of nameserver IPs/prefixes never to query
    #[arg(long, default_value = "", env = "DNSPROBE_BLACKLIST_FILE")]
    pub blacklist_file: String,

    /// Share one UDP socket across all workers
    #[arg(long, default_value_t = true, env = "DNSPROBE_REUSE_SOCKETS",
          action = clap::ArgAction::Set)]
    pub reuse_sockets: bool,
}

/// Translate the 1..5 scale onto log levels.
pub fn verbosity_level(verbosity: u8) -> Result<Level> {
    match verbosity {
        1 | 2 => Ok(Level::ERROR),
        3 => Ok(Level::WARN),
        4 => Ok(Level::INFO),
        5 => Ok(Level::DEBUG),
        _ => bail!("unknown verbosity level, must be between 1 (lowest) and 5 (highest)"),
    }
}

/// Validate the raw CLI surface and resolve it into the run configuration.
pub fn resolve(cli: &Cli, modules: &ModuleSet) -> Result<GlobalConfig> {
    let Some(qtype) = modules.get(&cli.module) else {
        bail!(
            "invalid lookup module {:?}. Valid modules: {}",
            cli.module,
            modules.valid_modules().join(", ")
        );
    };
    verbosity_level(cli.verbosity)?;

    if !matches!(cli.result_verbosity.as_str(), "short" | "normal" | "long" | "trace") {
        bail!("invalid result verbosity. Options: short, normal, long, trace");
    }
    if cli.tcp_only && cli.udp_only {
        bail!("--tcp-only and --udp-only are conflicting");
    }
    if cli.name_server_mode && cli.alexa {
        bail!("--alexa is incompatible with --name-server-mode");
    }
    if cli.name_server_mode && cli.metadata_passthrough {
        bail!("--metadata-passthrough is incompatible with --name-server-mode");
    }
    if cli.name_server_mode && !cli.name_servers.is_empty() {
        bail!("name servers cannot be specified in --name-server-mode");
    }
    if cli.name_server_mode && cli.override_name.is_empty() {
        bail!("--override-name must be set in --name-server-mode");
    }

    let qclass = parse_class(&cli.class)?;

    let (name_servers, name_servers_specified) = if cli.name_servers.is_empty() {
        let servers = if cli.iterative {
            ROOT_SERVERS.iter().map(|s| s.to_string()).collect()
        } else {
            default_resolvers()
        };
        info!(servers = %servers.join(", "), "no name servers specified, using defaults");
        (servers, false)
    } else {
        (load_name_servers(&cli.name_servers)?, true)
    };

    let mut local_addrs: Vec<IpAddr> = Vec::new();
    if !cli.local_addr.is_empty() {
        for spec in cli.local_addr.split(',') {
            let addr = spec
                .trim()
                .parse::<IpAddr>()
                .with_context(|| format!("invalid --local-addr entry {spec:?}"))?;
            local_addrs.push(addr);
        }
    } else {
        local_addrs.push(discover_local_addr()?);
    }

    let mut output_groups = vec![cli.result_verbosity.clone()];
    for field in cli.include_fields.split(',') {
        let field = field.trim();
        if !field.is_empty() {
            output_groups.push(field.to_string());
        }
    }

    Ok(GlobalConfig {
        module: cli.module.to_ascii_uppercase(),
        qtype,
        qclass,
        threads: cli.threads.max(1),
        timeout: Duration::from_secs(cli.timeout),
        iteration_timeout: Duration::from_secs(cli.iteration_timeout),
        retries: cli.retries,
        max_depth: cli.max_depth,
        cache_size: cli.cache_size,
        iterative: cli.iterative,
        alexa_format: cli.alexa,
        metadata_format: cli.metadata_passthrough,
        name_server_mode: cli.name_server_mode,
        tcp_only: cli.tcp_only,
        udp_only: cli.udp_only,
        reuse_sockets: cli.reuse_sockets,
        nanoseconds: cli.nanoseconds,
        verbosity: cli.verbosity,
        result_verbosity: cli.result_verbosity.clone(),
        output_groups,
        name_servers,
        name_servers_specified,
        local_addrs,
        prefix: cli.prefix.clone(),
        override_name: cli.override_name.clone(),
        input_file: cli.input_file.clone(),
        output_file: cli.output_file.clone(),
        metadata_file: cli.metadata_file.clone(),
        log_file: cli.log_file.clone(),
        blacklist_file: cli.blacklist_file.clone(),
    })
}

/// A `--name-servers` value: a comma-delimited list, or `@path` naming a
/// file with one server per line. Only the file's outer newlines are
/// trimmed; an interior blank line becomes an entry like any other and
/// fails at lookup time. Only a truly empty file is fatal.
fn load_name_servers(spec: &str) -> Result<Vec<String>> {
    let entries: Vec<String> = if let Some(path) = spec.strip_prefix('@') {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read name servers file {path:?}"))?;
        if contents.is_empty() {
            bail!("empty name servers file {path:?}");
        }
        contents
            .trim_matches('\n')
            .split('\n')
            .map(str::to_string)
            .collect()
    } else {
        spec.split(',').map(str::to_string).collect()
    };
    Ok(entries.iter().map(|s| add_default_port(s)).collect())
}

/// Nameservers for external-recursive mode when none are given: the
/// system's resolv.conf, falling back to well-known public recursors.
fn default_resolvers() -> Vec<String> {
    match std::fs::read_to_string(RESOLV_CONF) {
        Ok(contents) => {
            let servers = parse_resolv_conf(&contents);
            if servers.is_empty() {
                warn!("no usable nameservers in {RESOLV_CONF}, using fallback resolvers");
                FALLBACK_RESOLVERS.iter().map(|s| s.to_string()).collect()
            } else {
                servers
            }
        }
        Err(_) => {
            warn!("unable to read {RESOLV_CONF}, using fallback resolvers");
            FALLBACK_RESOLVERS.iter().map(|s| s.to_string()).collect()
        }
    }
}

fn parse_resolv_conf(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let server = line.strip_prefix("nameserver")?.trim();
            server.parse::<IpAddr>().ok()
        })
        .map(|addr| add_default_port(&addr.to_string()))
        .collect()
}

/// The address the OS would route upstream queries from, found by probing a
/// connected (but never used) UDP socket.
fn discover_local_addr() -> Result<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")
        .context("unable to bind a local UDP socket")?;
    socket
        .connect("8.8.8.8:53")
        .context("unable to find a default local address")?;
    Ok(socket.local_addr()?.ip())
}
