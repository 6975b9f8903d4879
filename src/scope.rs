//! IPv6 scope resolution
//!
//! Link-local and site-local addresses are only meaningful together with the
//! interface (zone) they live on. The scope table is built once per
//! enumeration from the interfaces' configured addresses:
//!
//! - **procfs**: `/proc/net/if_inet6`
//! - **other unix**: `getifaddrs(3)`
//!
//! Every non-global interface address contributes two rules, one for the
//! exact address (/128) and one for its on-link prefix. [`ScopeTable::resolve`]
//! picks the longest matching prefix; equal lengths go to the rule added
//! first.

use crate::config::ProcFs;
use log::debug;
use std::fs;
use std::net::Ipv6Addr;

/// `/proc/net/if_inet6` scope values
const IPV6_ADDR_LINKLOCAL: u32 = 0x20;
const IPV6_ADDR_SITELOCAL: u32 = 0x40;

/// One prefix-to-scope rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRule {
    prefix: u128,
    prefix_len: u8,
    scope_id: u32,
}

impl ScopeRule {
    pub fn new(addr: Ipv6Addr, prefix_len: u8, scope_id: u32) -> Self {
        let prefix_len = prefix_len.min(128);
        Self {
            prefix: u128::from(addr) & mask(prefix_len),
            prefix_len,
            scope_id,
        }
    }

    pub fn matches(&self, addr: &Ipv6Addr) -> bool {
        u128::from(*addr) & mask(self.prefix_len) == self.prefix
    }
}

fn mask(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n)),
    }
}

/// Ordered set of scope rules, valid for one enumeration call
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    rules: Vec<ScopeRule>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: ScopeRule) {
        self.rules.push(rule);
    }

    /// Add the host rule and the prefix rule for one interface address
    pub fn add_interface_address(&mut self, addr: Ipv6Addr, prefix_len: u8, scope_id: u32) {
        self.push(ScopeRule::new(addr, 128, scope_id));
        if prefix_len < 128 {
            self.push(ScopeRule::new(addr, prefix_len, scope_id));
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Scope id for `addr`, 0 for global / unknown.
    ///
    /// Multicast addresses report their own 4-bit scope field in host byte
    /// order (`ff02::/16` gives 2). That value is a scope level rather than
    /// an interface index, and no rule is consulted for it.
    pub fn resolve(&self, addr: &Ipv6Addr) -> u32 {
        if addr.is_unspecified() {
            return 0;
        }
        if addr.is_multicast() {
            return u32::from(addr.octets()[1] & 0x0f);
        }

        let mut best: Option<&ScopeRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(addr)) {
            match best {
                Some(b) if b.prefix_len >= rule.prefix_len => {}
                _ => best = Some(rule),
            }
        }
        best.map_or(0, |r| r.scope_id)
    }
}

impl FromIterator<ScopeRule> for ScopeTable {
    fn from_iter<I: IntoIterator<Item = ScopeRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// Clear a KAME-style scope embedded in bytes 2..4 of a link-local address
/// and return it.
pub fn take_embedded_scope(addr: &mut Ipv6Addr) -> u32 {
    let mut octets = addr.octets();
    if octets[0] != 0xfe || octets[1] & 0xc0 != 0x80 {
        return 0;
    }
    let embedded = u32::from(u16::from_be_bytes([octets[2], octets[3]]));
    octets[2] = 0;
    octets[3] = 0;
    *addr = Ipv6Addr::from(octets);
    embedded
}

// ============================================================================
// procfs Implementation
// ============================================================================

/// Build the scope table from `<root>/net/if_inet6`; empty when unreadable.
pub fn build_from_procfs(procfs: &ProcFs) -> ScopeTable {
    let path = procfs.if_inet6();
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("cannot read {}: {e}", path.display());
            return ScopeTable::new();
        }
    };

    let mut table = ScopeTable::new();
    for (addr, ifindex, prefix_len, scope) in contents.lines().filter_map(parse_if_inet6_line) {
        if scope & (IPV6_ADDR_LINKLOCAL | IPV6_ADDR_SITELOCAL) == 0 {
            continue;
        }
        table.add_interface_address(addr, prefix_len, ifindex);
    }

    debug!("scope table: {} rules", table.len());
    table
}

/// Parse one `/proc/net/if_inet6` line:
/// `fe800000000000000000000000000001 02 40 20 80 eth0`
/// (address, ifindex, prefix length, scope, flags, name; all hex).
fn parse_if_inet6_line(line: &str) -> Option<(Ipv6Addr, u32, u8, u32)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 6 || parts[0].len() != 32 {
        return None;
    }

    let addr = Ipv6Addr::from(u128::from_str_radix(parts[0], 16).ok()?);
    let ifindex = u32::from_str_radix(parts[1], 16).ok()?;
    let prefix_len = u8::from_str_radix(parts[2], 16).ok()?;
    let scope = u32::from_str_radix(parts[3], 16).ok()?;

    Some((addr, ifindex, prefix_len, scope))
}

// ============================================================================
// getifaddrs Implementation
// ============================================================================

/// Build the scope table from the interface list returned by `getifaddrs`.
#[cfg(unix)]
pub fn build_from_interfaces() -> ScopeTable {
    use libc::{freeifaddrs, getifaddrs, ifaddrs, sockaddr_in6, AF_INET6};
    use std::ptr;

    let mut table = ScopeTable::new();
    let mut head: *mut ifaddrs = ptr::null_mut();

    if unsafe { getifaddrs(&mut head) } != 0 {
        debug!("getifaddrs failed: {}", std::io::Error::last_os_error());
        return table;
    }

    let mut cursor = head;
    while !cursor.is_null() {
        let ifa = unsafe { &*cursor };
        cursor = ifa.ifa_next;

        if ifa.ifa_addr.is_null() || i32::from(unsafe { (*ifa.ifa_addr).sa_family }) != AF_INET6 {
            continue;
        }

        let sin6 = unsafe { &*(ifa.ifa_addr as *const sockaddr_in6) };
        let mut addr = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
        let embedded = take_embedded_scope(&mut addr);
        let scope_id = if sin6.sin6_scope_id != 0 {
            sin6.sin6_scope_id
        } else {
            embedded
        };
        if scope_id == 0 {
            continue;
        }

        let prefix_len = if ifa.ifa_netmask.is_null() {
            128
        } else {
            let mask = unsafe { &*(ifa.ifa_netmask as *const sockaddr_in6) };
            u128::from_be_bytes(mask.sin6_addr.s6_addr).count_ones() as u8
        };

        table.add_interface_address(addr, prefix_len, scope_id);
    }

    unsafe { freeifaddrs(head) };

    debug!("scope table: {} rules", table.len());
    table
}

#[cfg(not(unix))]
pub fn build_from_interfaces() -> ScopeTable {
    ScopeTable::new()
}
