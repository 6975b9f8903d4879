//! Binary snapshot source: the `net.inet.udp.pcblist_n` sysctl
//!
//! The snapshot is a `struct xinpgen` header followed, for every socket, by
//! a group of tagged records (`xinpcb_n`, `xsocket_n`, `xsockbuf_n` x2,
//! `xsockstat_n`). Each record starts with its own length and kind and is
//! padded to 8 bytes. A trailing `xinpgen` ends the list.
//!
//! Control blocks whose generation count is newer than the header's were
//! created after the snapshot began and are not reported.

use super::EndpointSource;
use crate::error::Result;
use crate::process::OwnerMap;
use crate::scope::{self, ScopeTable};
use crate::types::{EndpointFlags, LocalAddress, RawEndpoint, SocketId};
use crate::util::{read_array, read_i32, read_u16_be, read_u32, read_u32_as_usize, read_u64, round_up8};
use log::debug;
use std::net::{Ipv4Addr, Ipv6Addr};

const IPPROTO_UDP: i32 = 17;

/// Record kinds (`xso_kind`)
pub const XSO_SOCKET: u32 = 0x001;
pub const XSO_RCVBUF: u32 = 0x002;
pub const XSO_SNDBUF: u32 = 0x004;
pub const XSO_STATS: u32 = 0x008;
pub const XSO_INPCB: u32 = 0x010;

/// `inp_vflag` bits
pub const INP_IPV4: u8 = 0x1;
pub const INP_IPV6: u8 = 0x2;

/// `inp_flags`: port was assigned by the kernel
pub const INP_ANONPORT: i32 = 0x40;

// struct xinpcb_n
const INP_LPORT: usize = 18;
const INP_GENCNT: usize = 32;
const INP_FLAGS: usize = 40;
const INP_VFLAG: usize = 48;
const INP_LADDR6: usize = 68;
const INP_LADDR4: usize = 80; // in_addr_4in6: 12 bytes padding, then in_addr

// struct xsocket_n
const XSO_PCB: usize = 32;
const XSO_PROTOCOL: usize = 40;

/// Anything that can hand back a raw pcblist snapshot
pub trait SnapshotQuery: Send + Sync {
    fn fetch(&self) -> Result<Vec<u8>>;
}

/// Snapshot generation header
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XinpGen {
    pub xig_len: u32,
    pub xig_count: u32,
    pub xig_gen: u64,
    pub xig_sogen: u64,
}

impl XinpGen {
    pub const SIZE: usize = 24;

    pub fn parse(buf: &[u8]) -> Option<Self> {
        Some(Self {
            xig_len: read_u32(buf, 0)?,
            xig_count: read_u32(buf, 4)?,
            xig_gen: read_u64(buf, 8)?,
            xig_sogen: read_u64(buf, 16)?,
        })
    }
}

/// Fields of an `xinpcb_n` record the table needs
#[derive(Debug, Clone, Copy)]
struct InpcbRecord {
    gencnt: u64,
    flags: i32,
    vflag: u8,
    lport: u16,
    laddr4: [u8; 4],
    laddr6: [u8; 16],
}

impl InpcbRecord {
    fn parse(record: &[u8]) -> Option<Self> {
        Some(Self {
            gencnt: read_u64(record, INP_GENCNT)?,
            flags: read_i32(record, INP_FLAGS)?,
            vflag: *record.get(INP_VFLAG)?,
            lport: read_u16_be(record, INP_LPORT)?,
            laddr4: read_array(record, INP_LADDR4)?,
            laddr6: read_array(record, INP_LADDR6)?,
        })
    }
}

/// Fields of an `xsocket_n` record the table needs
#[derive(Debug, Clone, Copy)]
struct XsocketRecord {
    pcb: u64,
    protocol: i32,
}

impl XsocketRecord {
    fn parse(record: &[u8]) -> Option<Self> {
        Some(Self {
            pcb: read_u64(record, XSO_PCB)?,
            protocol: read_i32(record, XSO_PROTOCOL)?,
        })
    }
}

/// Walk a pcblist_n snapshot and return the UDP endpoints it holds
pub fn parse_snapshot(buf: &[u8]) -> Vec<RawEndpoint> {
    let mut rows = Vec::new();

    // Might be nothing here; the first record is only the header
    if buf.len() <= XinpGen::SIZE {
        return rows;
    }
    let Some(header) = XinpGen::parse(buf) else {
        return rows;
    };

    let mut inp: Option<InpcbRecord> = None;
    let mut so: Option<XsocketRecord> = None;
    let mut offset = round_up8(header.xig_len as usize);

    while let Some(len) = read_u32_as_usize(buf, offset) {
        if len <= XinpGen::SIZE {
            break;
        }
        let Some(record) = offset.checked_add(len).and_then(|end| buf.get(offset..end)) else {
            break;
        };

        match read_u32(record, 4) {
            Some(XSO_INPCB) => inp = InpcbRecord::parse(record),
            Some(XSO_SOCKET) => so = XsocketRecord::parse(record),
            _ => {}
        }

        if let (Some(i), Some(s)) = (inp, so) {
            if let Some(row) = accept(&header, &i, &s) {
                rows.push(row);
            }
            inp = None;
            so = None;
        }

        offset += round_up8(len);
    }

    debug!(
        "pcblist snapshot gen {}: {} of {} sockets kept",
        header.xig_gen,
        rows.len(),
        header.xig_count
    );
    rows
}

fn accept(header: &XinpGen, inp: &InpcbRecord, so: &XsocketRecord) -> Option<RawEndpoint> {
    // other protocols
    if so.protocol != IPPROTO_UDP {
        return None;
    }
    // created after the snapshot was taken
    if inp.gencnt > header.xig_gen {
        return None;
    }
    if inp.vflag & (INP_IPV4 | INP_IPV6) == 0 {
        return None;
    }

    let local = if inp.vflag & INP_IPV4 != 0 {
        if inp.laddr4 == [0; 4] {
            return None;
        }
        LocalAddress::V4 {
            addr: Ipv4Addr::from(inp.laddr4),
            port: inp.lport,
        }
    } else {
        if inp.laddr6 == [0; 16] && inp.lport == 0 {
            return None;
        }
        let mut addr = Ipv6Addr::from(inp.laddr6);
        let scope_id = scope::take_embedded_scope(&mut addr);
        LocalAddress::V6 {
            addr,
            port: inp.lport,
            scope_id,
        }
    };

    let flags = if inp.flags & INP_ANONPORT == 0 {
        EndpointFlags::SPECIFIC_PORT
    } else {
        EndpointFlags::empty()
    };

    Some(RawEndpoint {
        local,
        socket: SocketId::ControlBlock(so.pcb),
        flags,
    })
}

/// Reads endpoint rows from a kernel pcblist snapshot
#[derive(Debug, Clone)]
pub struct PcbListSource<Q> {
    query: Q,
}

impl<Q: SnapshotQuery> PcbListSource<Q> {
    pub fn new(query: Q) -> Self {
        Self { query }
    }
}

impl<Q: SnapshotQuery> EndpointSource for PcbListSource<Q> {
    fn name(&self) -> &'static str {
        "pcblist"
    }

    fn owner_map(&self) -> OwnerMap {
        #[cfg(target_os = "macos")]
        return crate::process::build_from_libproc();

        #[cfg(not(target_os = "macos"))]
        OwnerMap::new()
    }

    fn scope_table(&self) -> ScopeTable {
        scope::build_from_interfaces()
    }

    fn scan(&self) -> Result<Vec<RawEndpoint>> {
        let snapshot = self.query.fetch()?;
        Ok(parse_snapshot(&snapshot))
    }
}

// ============================================================================
// macOS Implementation
// ============================================================================

#[cfg(target_os = "macos")]
pub use macos::SysctlQuery;

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use crate::error::EndpointError;
    use libc::{c_void, sysctlbyname};
    use log::error;
    use std::ffi::CStr;
    use std::ptr;

    /// Snapshot read through `sysctlbyname`
    #[derive(Debug, Clone, Copy)]
    pub struct SysctlQuery {
        name: &'static CStr,
    }

    impl SysctlQuery {
        pub fn udp() -> Self {
            Self {
                name: c"net.inet.udp.pcblist_n",
            }
        }

        fn last_error(&self) -> EndpointError {
            let err = std::io::Error::last_os_error();
            error!("failure to read {:?} via sysctlbyname: {err}", self.name);
            // kernels without the tagged pcblist do not know the name
            if err.raw_os_error() == Some(libc::ENOENT) {
                EndpointError::NotSupported(format!("{:?} not available", self.name))
            } else {
                EndpointError::SysCall(format!("sysctlbyname {:?}: {err}", self.name))
            }
        }
    }

    impl SnapshotQuery for SysctlQuery {
        fn fetch(&self) -> Result<Vec<u8>> {
            let mut len: usize = 0;

            // Get size needed
            let ret = unsafe {
                sysctlbyname(
                    self.name.as_ptr(),
                    ptr::null_mut(),
                    &mut len,
                    ptr::null_mut(),
                    0,
                )
            };
            if ret < 0 {
                return Err(self.last_error());
            }

            let mut buf: Vec<u8> = Vec::new();
            buf.try_reserve_exact(len)?;
            buf.resize(len, 0);

            let ret = unsafe {
                sysctlbyname(
                    self.name.as_ptr(),
                    buf.as_mut_ptr() as *mut c_void,
                    &mut len,
                    ptr::null_mut(),
                    0,
                )
            };
            if ret < 0 {
                return Err(self.last_error());
            }

            buf.truncate(len);
            Ok(buf)
        }
    }

}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_parse_udp4_and_udp6() {
        let snapshot = SnapshotBuilder::new(10)
            .pcb(&Pcb::udp4([192, 168, 1, 5], 53, 0xffff_8000_0000_1000))
            .pcb(&Pcb::udp6("2001:db8::5".parse().unwrap(), 123, 0xffff_8000_0000_2000))
            .build();

        let rows = parse_snapshot(&snapshot);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].local,
            LocalAddress::V4 {
                addr: Ipv4Addr::new(192, 168, 1, 5),
                port: 53
            }
        );
        assert_eq!(rows[0].socket, SocketId::ControlBlock(0xffff_8000_0000_1000));
        assert_eq!(rows[1].local.port(), 123);
        assert_eq!(rows[1].socket, SocketId::ControlBlock(0xffff_8000_0000_2000));
    }

    #[test]
    fn test_newer_generation_excluded() {
        let mut late = Pcb::udp4([10, 0, 0, 1], 4000, 2);
        late.gencnt = 11;
        let snapshot = SnapshotBuilder::new(10)
            .pcb(&Pcb::udp4([10, 0, 0, 1], 3000, 1))
            .pcb(&late)
            .build();

        let rows = parse_snapshot(&snapshot);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].local.port(), 3000);
    }

    #[test]
    fn test_same_generation_kept() {
        let mut pcb = Pcb::udp4([10, 0, 0, 1], 3000, 1);
        pcb.gencnt = 10;
        let snapshot = SnapshotBuilder::new(10).pcb(&pcb).build();
        assert_eq!(parse_snapshot(&snapshot).len(), 1);
    }

    #[test]
    fn test_zero_addresses_excluded() {
        let snapshot = SnapshotBuilder::new(5)
            // all-zero IPv4 address is dropped regardless of port
            .pcb(&Pcb::udp4([0, 0, 0, 0], 68, 1))
            // all-zero IPv6 address with port 0 is dropped
            .pcb(&Pcb::udp6(Ipv6Addr::UNSPECIFIED, 0, 2))
            // all-zero IPv6 address with a port is a wildcard bind and kept
            .pcb(&Pcb::udp6(Ipv6Addr::UNSPECIFIED, 5353, 3))
            .build();

        let rows = parse_snapshot(&snapshot);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].socket, SocketId::ControlBlock(3));
    }

    #[test]
    fn test_other_protocol_and_family_excluded() {
        let mut tcp = Pcb::udp4([10, 0, 0, 1], 80, 1);
        tcp.protocol = 6;
        let mut no_family = Pcb::udp4([10, 0, 0, 1], 81, 2);
        no_family.vflag = 0;
        let snapshot = SnapshotBuilder::new(5).pcb(&tcp).pcb(&no_family).build();

        assert!(parse_snapshot(&snapshot).is_empty());
    }

    #[test]
    fn test_anonymous_port_flag() {
        let mut anon = Pcb::udp4([10, 0, 0, 1], 50000, 1);
        anon.flags = INP_ANONPORT;
        let snapshot = SnapshotBuilder::new(5)
            .pcb(&anon)
            .pcb(&Pcb::udp4([10, 0, 0, 1], 53, 2))
            .build();

        let rows = parse_snapshot(&snapshot);
        assert!(rows[0].flags.is_empty());
        assert!(rows[1].flags.contains(EndpointFlags::SPECIFIC_PORT));
    }

    #[test]
    fn test_embedded_scope_is_lifted() {
        let snapshot = SnapshotBuilder::new(5)
            .pcb(&Pcb::udp6("fe80:4::1".parse().unwrap(), 546, 1))
            .build();

        let rows = parse_snapshot(&snapshot);
        assert_eq!(
            rows[0].local,
            LocalAddress::V6 {
                addr: "fe80::1".parse().unwrap(),
                port: 546,
                scope_id: 4
            }
        );
    }

    #[test]
    fn test_header_only_and_truncated() {
        let empty = SnapshotBuilder::new(1).build();
        assert!(parse_snapshot(&empty[..XinpGen::SIZE]).is_empty());
        assert!(parse_snapshot(&empty).is_empty());
        assert!(parse_snapshot(&[]).is_empty());

        // a record running past the end of the buffer stops the walk
        let snapshot = SnapshotBuilder::new(5)
            .pcb(&Pcb::udp4([10, 0, 0, 1], 53, 1))
            .pcb(&Pcb::udp4([10, 0, 0, 2], 53, 2))
            .build();
        let cut = XinpGen::SIZE + INPCB_LEN + XSOCKET_LEN + INPCB_LEN / 2;
        assert_eq!(parse_snapshot(&snapshot[..cut]).len(), 1);
    }

    #[test]
    fn test_xinpgen_parse() {
        let snapshot = SnapshotBuilder::new(77).pcb(&Pcb::udp4([1, 2, 3, 4], 5, 6)).build();
        let header = XinpGen::parse(&snapshot).unwrap();
        assert_eq!(header.xig_len as usize, XinpGen::SIZE);
        assert_eq!(header.xig_count, 1);
        assert_eq!(header.xig_gen, 77);
    }
}
