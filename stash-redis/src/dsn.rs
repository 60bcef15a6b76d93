//! Redis DSN parsing.
//!
//! Accepted forms:
//!
//! - `redis://localhost`
//! - `redis://example.com:1234`
//! - `redis://secret@example.com/13`
//! - `redis:///var/run/redis.sock`
//! - `redis://secret@/var/run/redis.sock/13`
//! - `redis://?host[node1:7000]&host[node2:7001]&redis_cluster=1`
//!
//! Trailing digits of the path select the database. Recognized query
//! options are `redis_cluster`, `timeout` and `retry_interval` (both in
//! seconds) and `dbindex`; anything else is ignored.

use crate::config::{ConnectionOptions, DEFAULT_PORT, Host};
use crate::{RedisError, Result};
use std::time::Duration;

/// Parse a DSN over the default options.
pub fn parse_dsn(dsn: &str) -> Result<ConnectionOptions> {
    parse_dsn_with(dsn, ConnectionOptions::default())
}

/// Parse a DSN over `options`. Whatever the DSN specifies wins; the hosts
/// are always replaced.
pub fn parse_dsn_with(dsn: &str, mut options: ConnectionOptions) -> Result<ConnectionOptions> {
    let rest = dsn.strip_prefix("redis:").ok_or_else(|| {
        RedisError::InvalidArgument(format!(
            "Invalid Redis DSN: {} does not start with \"redis:\"",
            dsn
        ))
    })?;
    let rest = rest
        .strip_prefix("//")
        .ok_or_else(|| RedisError::invalid_dsn(dsn))?;

    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };

    let (userinfo, host_port) = match authority.rsplit_once('@') {
        Some((userinfo, host_port)) => (Some(userinfo), host_port),
        None => (None, authority),
    };

    let mut hosts = Vec::new();
    if let Some(query) = query {
        apply_query(dsn, query, &mut options, &mut hosts)?;
    }

    let (path, database) = split_database(path);
    if let Some(db) = database {
        options.database_index = Some(db.parse().map_err(|_| RedisError::invalid_dsn(dsn))?);
    }

    if !host_port.is_empty() {
        hosts.insert(0, parse_host_port(dsn, host_port)?);
    } else if !path.is_empty() {
        hosts.insert(0, Host::unix(path));
    }

    if hosts.is_empty() {
        return Err(RedisError::invalid_dsn(dsn));
    }
    options.hosts = hosts;

    if let Some(userinfo) = userinfo.filter(|u| !u.is_empty()) {
        match userinfo.split_once(':') {
            Some(("", password)) => options.password = Some(password.to_string()),
            Some((username, password)) => {
                options.username = Some(username.to_string());
                options.password = Some(password.to_string());
            }
            None => options.password = Some(userinfo.to_string()),
        }
    }

    Ok(options)
}

/// Split trailing digits off `path`; what remains loses its trailing slashes.
fn split_database(path: &str) -> (&str, Option<&str>) {
    let digits = path
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();

    let (path, database) = path.split_at(path.len() - digits);
    let database = (!database.is_empty()).then_some(database);
    (path.trim_end_matches('/'), database)
}

fn parse_host_port(dsn: &str, host_port: &str) -> Result<Host> {
    let invalid = || RedisError::invalid_dsn(dsn);

    // [::1]:6379
    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, rest) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match rest.strip_prefix(':') {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None if rest.is_empty() => DEFAULT_PORT,
            None => return Err(invalid()),
        };
        return Ok(Host::tcp(format!("[{}]", host), port));
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            Ok(Host::tcp(host, port.parse().map_err(|_| invalid())?))
        }
        Some(_) => Err(invalid()),
        None => Ok(Host::tcp(host_port, DEFAULT_PORT)),
    }
}

/// `node`, `node:port`, or a socket path followed by a non-numeric suffix.
fn parse_cluster_node(node: &str) -> Host {
    match node.rsplit_once(':') {
        None => Host::tcp(node, DEFAULT_PORT),
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) if port != 0 => Host::tcp(host, port),
            _ => Host::unix(host),
        },
    }
}

fn apply_query(
    dsn: &str,
    query: &str,
    options: &mut ConnectionOptions,
    hosts: &mut Vec<Host>,
) -> Result<()> {
    let invalid = || RedisError::invalid_dsn(dsn);

    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if let Some(node) = name.strip_prefix("host[").and_then(|n| n.strip_suffix(']')) {
            let host = parse_cluster_node(node);
            if !hosts.contains(&host) {
                hosts.push(host);
            }
            continue;
        }

        match name.as_ref() {
            "host" => return Err(invalid()),
            "redis_cluster" => options.cluster = is_truthy(&value),
            "timeout" => options.timeout = parse_seconds(&value).ok_or_else(invalid)?,
            "retry_interval" => {
                options.retry_interval = parse_seconds(&value).ok_or_else(invalid)?
            }
            "dbindex" => options.database_index = Some(value.parse().map_err(|_| invalid())?),
            _ => {}
        }
    }

    Ok(())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
