//! Broker address parsing.

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Resolved broker endpoint. Plain TCP only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse `host`, `host:port`, or `mqtt://host:port`. IPv6 hosts use
/// brackets (`[::1]:1883`). `mqtts://` is rejected: this stack speaks
/// plain TCP to a broker on a trusted network segment.
pub fn parse_broker_endpoint(addr: &str) -> Result<BrokerEndpoint> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("broker address must not be empty"));
    }
    if addr.starts_with("mqtts://") {
        return Err(anyhow!(
            "TLS broker endpoints are not supported; use mqtt:// or host:port"
        ));
    }
    let bare = addr.strip_prefix("mqtt://").unwrap_or(addr);
    let (host, port) = split_host_port(bare)
        .with_context(|| format!("invalid broker address '{addr}'"))?;
    if host.is_empty() {
        return Err(anyhow!("broker address '{addr}' has an empty host"));
    }
    Ok(BrokerEndpoint {
        host,
        port: port.unwrap_or(DEFAULT_MQTT_PORT),
    })
}

fn split_host_port(addr: &str) -> Result<(String, Option<u16>)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| anyhow!("unclosed '[' in address"))?;
        let host = rest[..end].to_string();
        let tail = &rest[end + 1..];
        if tail.is_empty() {
            return Ok((host, None));
        }
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("unexpected text after ']'"))?;
        let port = port.parse().context("invalid port")?;
        return Ok((host, Some(port)));
    }
    match addr.rsplit_once(':') {
        // A second ':' in the head means a bare IPv6 address, not host:port.
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse().context("invalid port")?;
            Ok((host.to_string(), Some(port)))
        }
        _ => Ok((addr.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port() {
        let ep = parse_broker_endpoint("broker.local").unwrap();
        assert_eq!(ep.host, "broker.local");
        assert_eq!(ep.port, DEFAULT_MQTT_PORT);
    }

    #[test]
    fn host_and_port_parse() {
        let ep = parse_broker_endpoint("10.0.0.5:2883").unwrap();
        assert_eq!(ep.host, "10.0.0.5");
        assert_eq!(ep.port, 2883);
    }

    #[test]
    fn mqtt_scheme_is_stripped() {
        let ep = parse_broker_endpoint("mqtt://127.0.0.1:1883").unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 1883);
    }

    #[test]
    fn mqtts_scheme_is_rejected() {
        let err = parse_broker_endpoint("mqtts://broker:8883").unwrap_err();
        assert!(format!("{err}").contains("not supported"));
    }

    #[test]
    fn ipv6_brackets_parse() {
        let ep = parse_broker_endpoint("[::1]:1884").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 1884);
        assert_eq!(format!("{ep}"), "[::1]:1884");
    }

    #[test]
    fn bare_ipv6_gets_default_port() {
        let ep = parse_broker_endpoint("fe80::1").unwrap();
        assert_eq!(ep.host, "fe80::1");
        assert_eq!(ep.port, DEFAULT_MQTT_PORT);
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(parse_broker_endpoint("host:notaport").is_err());
        assert!(parse_broker_endpoint("host:70000").is_err());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(parse_broker_endpoint("").is_err());
        assert!(parse_broker_endpoint("mqtt://").is_err());
    }
}
