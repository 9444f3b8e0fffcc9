use std::net::{IpAddr, SocketAddr};

/// A normal input line: `name` or `name,server`.
pub fn parse_normal_line(line: &str) -> (String, Option<String>) {
    match line.split_once(',') {
        Some((name, server)) => (
            name.trim().to_string(),
            Some(add_default_port(server.trim())),
        ),
        None => (line.trim().to_string(), None),
    }
}

/// An Alexa-format line: `rank,name`.
pub fn parse_alexa_line(line: &str) -> Result<(String, i64), String> {
    let (rank, name) = line
        .split_once(',')
        .ok_or_else(|| format!("invalid alexa input line {line:?}"))?;
    let rank = rank
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid alexa rank in line {line:?}"))?;
    Ok((name.trim().to_string(), rank))
}

/// A metadata-passthrough line: `name,tag`. The tag is propagated verbatim.
pub fn parse_metadata_line(line: &str) -> (String, String) {
    match line.split_once(',') {
        Some((name, tag)) => (name.trim().to_string(), tag.to_string()),
        None => (line.trim().to_string(), String::new()),
    }
}

/// Append the default DNS port when the server string does not carry one.
pub fn add_default_port(server: &str) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    match server.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => format!("{v4}:53"),
        Ok(IpAddr::V6(v6)) => format!("[{v6}]:53"),
        Err(_) if !server.contains(':') => format!("{server}:53"),
        Err(_) => server.to_string(),
    }
}

/// Apply `--prefix` / `--override-name` to a raw input name. Returns the
/// name to query and whether it differs from what was read.
pub fn make_name(raw: &str, prefix: &str, name_override: &str) -> (String, bool) {
    if !name_override.is_empty() {
        return (name_override.to_string(), true);
    }
    let trimmed = raw.trim_end_matches('.');
    if prefix.is_empty() {
        (trimmed.to_string(), raw != trimmed)
    } else {
        (format!("{prefix}{trimmed}"), true)
    }
}
