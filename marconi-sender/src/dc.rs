//! Static data-center directory.
//!
//! Addresses are compiled in; the server may still redirect a session
//! elsewhere at runtime via `303` errors, and callers can override any
//! entry through [`SenderConfig::dc_overrides`](crate::SenderConfig).

const PROD_V4: [(i32, &str); 5] = [
    (1, "149.154.175.53"),
    (2, "149.154.167.51"),
    (3, "149.154.175.100"),
    (4, "149.154.167.91"),
    (5, "91.108.56.130"),
];

const PROD_V6: [(i32, &str); 5] = [
    (1, "2001:b28:f23d:f001::a"),
    (2, "2001:67c:4e8:f002::a"),
    (3, "2001:b28:f23d:f003::a"),
    (4, "2001:67c:4e8:f004::a"),
    (5, "2001:b28:f23f:f005::a"),
];

const TEST_V4: [(i32, &str); 3] = [
    (1, "149.154.175.10"),
    (2, "149.154.167.40"),
    (3, "149.154.175.117"),
];

const TEST_V6: [(i32, &str); 3] = [
    (1, "2001:b28:f23d:f001::e"),
    (2, "2001:67c:4e8:f002::e"),
    (3, "2001:b28:f23d:f003::e"),
];

/// Looks up the host and port for a data-center.
///
/// # Panics
///
/// Panics when `dc_id` is not in the directory. The test network only
/// has data-centers 1 through 3.
pub fn resolve(dc_id: i32, test_mode: bool, ipv6: bool) -> (&'static str, u16) {
    let table: &[(i32, &str)] = match (test_mode, ipv6) {
        (false, false) => &PROD_V4,
        (false, true) => &PROD_V6,
        (true, false) => &TEST_V4,
        (true, true) => &TEST_V6,
    };
    let port = if test_mode { 80 } else { 443 };
    match table.iter().find(|(id, _)| *id == dc_id) {
        Some((_, host)) => (host, port),
        None => panic!("unknown data-center id {dc_id}"),
    }
}

/// Like [`resolve`], joined into a dialable `host:port` string.
pub fn address(dc_id: i32, test_mode: bool, ipv6: bool) -> String {
    let (host, port) = resolve(dc_id, test_mode, ipv6);
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_addresses() {
        assert_eq!(resolve(2, false, false), ("149.154.167.51", 443));
        assert_eq!(resolve(5, false, false), ("91.108.56.130", 443));
    }

    #[test]
    fn test_network_uses_port_80() {
        assert_eq!(resolve(1, true, false), ("149.154.175.10", 80));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        assert_eq!(address(2, false, true), "[2001:67c:4e8:f002::a]:443");
        assert_eq!(address(2, false, false), "149.154.167.51:443");
    }

    #[test]
    #[should_panic(expected = "unknown data-center id")]
    fn unknown_dc_panics() {
        resolve(9, false, false);
    }
}
