//! Usage: Listen address parsing (`host`, `host:port`, `[v6]:port`).

const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedListenAddress {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl ParsedListenAddress {
    pub(crate) fn to_bind_string(&self) -> String {
        format_host_port(&self.host, self.port)
    }
}

pub(crate) fn is_wildcard_host(host: &str) -> bool {
    matches!(host.trim(), "0.0.0.0" | "::")
}

pub(crate) fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn parse_port(raw: &str) -> Result<u16, String> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid listen port: {}", raw.trim()))
}

/// Port 0 binds an ephemeral port.
pub(crate) fn parse_listen_address(input: &str) -> Result<ParsedListenAddress, String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err("listen address is required".to_string());
    }
    if raw.contains("://") || raw.contains('/') {
        return Err("listen address must be host or host:port".to_string());
    }

    if let Some(rest) = raw.strip_prefix('[') {
        let idx = rest
            .find(']')
            .ok_or_else(|| "invalid IPv6 address: missing closing ']'".to_string())?;
        let host = rest[..idx].trim();
        if host.is_empty() {
            return Err("listen address missing host".to_string());
        }
        let tail = rest[idx + 1..].trim();
        let port = if tail.is_empty() {
            DEFAULT_PORT
        } else {
            parse_port(
                tail.strip_prefix(':')
                    .ok_or_else(|| "listen address must be [ipv6]:port".to_string())?,
            )?
        };
        return Ok(ParsedListenAddress {
            host: host.to_string(),
            port,
        });
    }

    let parts: Vec<&str> = raw.split(':').collect();
    match parts.as_slice() {
        [host] => Ok(ParsedListenAddress {
            host: host.trim().to_string(),
            port: DEFAULT_PORT,
        }),
        [host, port] => {
            let host = host.trim();
            if host.is_empty() {
                return Err("listen address missing host".to_string());
            }
            Ok(ParsedListenAddress {
                host: host.to_string(),
                port: parse_port(port)?,
            })
        }
        _ => Err("IPv6 must use [addr]:port".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_forms() {
        assert_eq!(
            parse_listen_address("127.0.0.1:8080").expect("v4"),
            ParsedListenAddress {
                host: "127.0.0.1".into(),
                port: 8080
            }
        );
        assert_eq!(parse_listen_address("localhost").expect("host").port, DEFAULT_PORT);
        let v6 = parse_listen_address("[::1]:0").expect("v6");
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 0);
        assert_eq!(v6.to_bind_string(), "[::1]:0");
    }

    #[test]
    fn rejects_invalid_forms() {
        assert!(parse_listen_address("").is_err());
        assert!(parse_listen_address("http://x:1").is_err());
        assert!(parse_listen_address("::1:80").is_err());
        assert!(parse_listen_address("host:99999").is_err());
        assert!(parse_listen_address(":80").is_err());
    }

    #[test]
    fn wildcard_hosts() {
        assert!(is_wildcard_host("0.0.0.0"));
        assert!(is_wildcard_host("::"));
        assert!(!is_wildcard_host("127.0.0.1"));
    }
}
