//! Text-table source: `/proc/net/udp` and `/proc/net/udp6`
//!
//! Format (one socket per line after the header):
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
//!  123: 0100007F:0035 00000000:0000 07 00000000:00000000 00:00000000 00000000   101        0 23456 2 0000000000000000 0
//! ```
//!
//! Addresses are printed as native-endian 32-bit words, ports as host-order
//! hex.

use super::EndpointSource;
use crate::config::ProcFs;
use crate::error::Result;
use crate::process::{self, OwnerMap};
use crate::scope::{self, ScopeTable};
use crate::types::{EndpointFlags, LocalAddress, RawEndpoint, SocketId};
use log::debug;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Minimum number of whitespace-separated fields in a data line
const MIN_FIELDS: usize = 10;
const LOCAL_FIELD: usize = 1;
const INODE_FIELD: usize = 9;

/// Reads the procfs UDP tables under a [`ProcFs`] root
#[derive(Debug, Clone, Default)]
pub struct ProcNetSource {
    procfs: ProcFs,
}

impl ProcNetSource {
    pub fn new(procfs: ProcFs) -> Self {
        Self { procfs }
    }
}

impl EndpointSource for ProcNetSource {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn owner_map(&self) -> OwnerMap {
        process::build_from_procfs(&self.procfs)
    }

    fn scope_table(&self) -> ScopeTable {
        scope::build_from_procfs(&self.procfs)
    }

    fn scan(&self) -> Result<Vec<RawEndpoint>> {
        let udp4 = self.procfs.udp4_table();
        let contents = fs::read_to_string(&udp4)
            .inspect_err(|e| debug!("cannot read {}: {e}", udp4.display()))?;
        let mut rows = parse_table(&contents, parse_udp4_line);

        // Kernels built without IPv6 have no udp6 table
        let udp6 = self.procfs.udp6_table();
        match fs::read_to_string(&udp6) {
            Ok(contents) => rows.extend(parse_table(&contents, parse_udp6_line)),
            Err(e) => debug!("{} unavailable, IPv4 only: {e}", udp6.display()),
        }

        Ok(rows)
    }
}

/// Parse every line after the header, dropping lines that do not parse
pub fn parse_table(contents: &str, parse_line: fn(&str) -> Option<RawEndpoint>) -> Vec<RawEndpoint> {
    let mut skipped = 0usize;
    let rows: Vec<RawEndpoint> = contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let row = parse_line(line);
            if row.is_none() && !line.trim().is_empty() {
                skipped += 1;
            }
            row
        })
        .collect();

    if skipped > 0 {
        debug!("skipped {skipped} malformed socket table lines");
    }
    rows
}

/// Parse one `/proc/net/udp` data line
pub fn parse_udp4_line(line: &str) -> Option<RawEndpoint> {
    let (local, inode) = split_line(line)?;
    let (addr_hex, port_hex) = local.split_once(':')?;
    if addr_hex.is_empty() || addr_hex.len() > 8 {
        return None;
    }

    let addr = u32::from_str_radix(addr_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    Some(RawEndpoint {
        local: LocalAddress::V4 {
            addr: Ipv4Addr::from(addr.to_ne_bytes()),
            port,
        },
        socket: SocketId::Inode(inode),
        flags: EndpointFlags::empty(),
    })
}

/// Parse one `/proc/net/udp6` data line
pub fn parse_udp6_line(line: &str) -> Option<RawEndpoint> {
    let (local, inode) = split_line(line)?;
    let (addr_hex, port_hex) = local.split_once(':')?;
    if addr_hex.len() != 32 || !addr_hex.is_ascii() {
        return None;
    }

    // four native-endian 32-bit words
    let mut octets = [0u8; 16];
    for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
        let word = u32::from_str_radix(&addr_hex[i * 8..i * 8 + 8], 16).ok()?;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    Some(RawEndpoint {
        local: LocalAddress::V6 {
            addr: Ipv6Addr::from(octets),
            port,
            scope_id: 0,
        },
        socket: SocketId::Inode(inode),
        flags: EndpointFlags::empty(),
    })
}

/// Validate the field layout and return (local address field, inode)
fn split_line(line: &str) -> Option<(&str, u64)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < MIN_FIELDS {
        return None;
    }

    // slot number, e.g. "123:"
    parts[0].strip_suffix(':')?.parse::<u32>().ok()?;
    let inode = parts[INODE_FIELD].parse::<u64>().ok()?;

    Some((parts[LOCAL_FIELD], inode))
}
