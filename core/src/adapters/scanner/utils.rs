/// Extract the port from a local socket address as printed by `ss` or `lsof`.
///
/// Handles `127.0.0.1:3000`, `*:8080`, `[::1]:3000`, `[::]:22` and
/// interface-scoped forms such as `127.0.0.53%lo:53`. Wildcard ports (`*`)
/// and port 0 yield `None`.
pub(super) fn parse_port(address: &str) -> Option<u16> {
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    if host.starts_with('[') && !host.contains(']') {
        return None;
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_port() {
        assert_eq!(parse_port("127.0.0.1:3000"), Some(3000));
        assert_eq!(parse_port("*:8080"), Some(8080));
        assert_eq!(parse_port("0.0.0.0:5432"), Some(5432));
    }

    #[test]
    fn test_parse_ipv6_port() {
        assert_eq!(parse_port("[::1]:3000"), Some(3000));
        assert_eq!(parse_port("[::]:22"), Some(22));
        assert_eq!(parse_port("[::ffff:127.0.0.1]:5173"), Some(5173));
    }

    #[test]
    fn test_parse_scoped_address() {
        assert_eq!(parse_port("127.0.0.53%lo:53"), Some(53));
    }

    #[test]
    fn test_rejects_wildcards_and_garbage() {
        assert_eq!(parse_port("*:*"), None);
        assert_eq!(parse_port("0.0.0.0:0"), None);
        assert_eq!(parse_port("3000"), None);
        assert_eq!(parse_port(":3000"), None);
    }
}
