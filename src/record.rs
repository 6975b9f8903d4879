//! Fixed-size record layout of the UDP endpoint table
//!
//! The table registry hands out opaque byte buffers sized in whole records.
//! Keys use a `sockaddr_inet` shape:
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0 | 2 | family, native endian (2 = IPv4, 23 = IPv6) |
//! | 2 | 2 | port, network byte order |
//! | 4 | 4 | IPv4 address / IPv6 flow info (always 0) |
//! | 8 | 16 | IPv6 address |
//! | 24 | 4 | IPv6 scope id, native endian |
//!
//! Static records hold the owning pid (4), flags (4), creation time (8,
//! 0 when not available) and modification info (8).

use crate::types::{EndpointKey, EndpointStatic, LocalAddress};

/// Size of one encoded [`EndpointKey`]
pub const KEY_SIZE: usize = 28;

/// Size of one encoded [`EndpointStatic`]
pub const STATIC_SIZE: usize = 24;

/// Family tag written for IPv4 keys
pub const FAMILY_INET: u16 = 2;

/// Family tag written for IPv6 keys
pub const FAMILY_INET6: u16 = 23;

impl EndpointKey {
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        let mut out = [0u8; KEY_SIZE];
        match self.local {
            LocalAddress::V4 { addr, port } => {
                out[0..2].copy_from_slice(&FAMILY_INET.to_ne_bytes());
                out[2..4].copy_from_slice(&port.to_be_bytes());
                out[4..8].copy_from_slice(&addr.octets());
            }
            LocalAddress::V6 {
                addr,
                port,
                scope_id,
            } => {
                out[0..2].copy_from_slice(&FAMILY_INET6.to_ne_bytes());
                out[2..4].copy_from_slice(&port.to_be_bytes());
                out[8..24].copy_from_slice(&addr.octets());
                out[24..28].copy_from_slice(&scope_id.to_ne_bytes());
            }
        }
        out
    }
}

impl EndpointStatic {
    pub fn to_bytes(&self) -> [u8; STATIC_SIZE] {
        let mut out = [0u8; STATIC_SIZE];
        out[0..4].copy_from_slice(&self.owning_pid.to_ne_bytes());
        out[4..8].copy_from_slice(&self.flags.bits().to_ne_bytes());
        out[8..16].copy_from_slice(&self.creation_time.unwrap_or(0).to_ne_bytes());
        out[16..24].copy_from_slice(&self.modification_info.to_ne_bytes());
        out
    }
}

/// Number of whole records of `record_size` that fit in `buf`
pub fn capacity_of(buf: Option<&[u8]>, record_size: usize) -> usize {
    buf.map_or(0, |b| b.len() / record_size)
}

/// Encode `keys` back to back at the start of `buf`
pub fn write_keys(buf: &mut [u8], keys: &[EndpointKey]) {
    for (chunk, key) in buf.chunks_exact_mut(KEY_SIZE).zip(keys) {
        chunk.copy_from_slice(&key.to_bytes());
    }
}

/// Encode `statics` back to back at the start of `buf`
pub fn write_statics(buf: &mut [u8], statics: &[EndpointStatic]) {
    for (chunk, stat) in buf.chunks_exact_mut(STATIC_SIZE).zip(statics) {
        chunk.copy_from_slice(&stat.to_bytes());
    }
}
