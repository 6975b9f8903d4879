//! Common types used across the library

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Call-level result of an enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    /// Every endpoint found was written
    Success,
    /// The output capacity was smaller than the total; retry with `total`
    MoreEntries,
    /// The data source is present but failed to answer
    NotSupported,
    /// Scratch memory could not be obtained
    NoMemory,
    /// No data source exists on this platform
    NotImplemented,
}

impl Status {
    /// Whether this status means no records were produced
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Status::NotSupported | Status::NoMemory | Status::NotImplemented
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "STATUS_SUCCESS"),
            Status::MoreEntries => write!(f, "STATUS_MORE_ENTRIES"),
            Status::NotSupported => write!(f, "STATUS_NOT_SUPPORTED"),
            Status::NoMemory => write!(f, "STATUS_NO_MEMORY"),
            Status::NotImplemented => write!(f, "STATUS_NOT_IMPLEMENTED"),
        }
    }
}

/// Address family of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressFamily {
    /// UDP over IPv4
    Ipv4,
    /// UDP over IPv6
    Ipv6,
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "udp"),
            AddressFamily::Ipv6 => write!(f, "udp6"),
        }
    }
}

/// Local address of a bound UDP socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum LocalAddress {
    V4 {
        addr: Ipv4Addr,
        port: u16,
    },
    V6 {
        addr: Ipv6Addr,
        port: u16,
        scope_id: u32,
    },
}

impl LocalAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            LocalAddress::V4 { .. } => AddressFamily::Ipv4,
            LocalAddress::V6 { .. } => AddressFamily::Ipv6,
        }
    }

    /// Port in host byte order
    pub fn port(&self) -> u16 {
        match *self {
            LocalAddress::V4 { port, .. } | LocalAddress::V6 { port, .. } => port,
        }
    }

    pub fn ip(&self) -> IpAddr {
        match *self {
            LocalAddress::V4 { addr, .. } => IpAddr::V4(addr),
            LocalAddress::V6 { addr, .. } => IpAddr::V6(addr),
        }
    }

    /// Scope id, always 0 for IPv4
    pub fn scope_id(&self) -> u32 {
        match *self {
            LocalAddress::V4 { .. } => 0,
            LocalAddress::V6 { scope_id, .. } => scope_id,
        }
    }
}

/// Key record identifying one bound UDP endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EndpointKey {
    pub local: LocalAddress,
}

impl EndpointKey {
    pub fn new(local: LocalAddress) -> Self {
        Self { local }
    }

    pub fn family(&self) -> AddressFamily {
        self.local.family()
    }

    pub fn port(&self) -> u16 {
        self.local.port()
    }

    /// Local address as a standard socket address; IPv6 keeps its scope id
    pub fn socket_addr(&self) -> SocketAddr {
        match self.local {
            LocalAddress::V4 { addr, port } => SocketAddr::V4(SocketAddrV4::new(addr, port)),
            LocalAddress::V6 {
                addr,
                port,
                scope_id,
            } => SocketAddr::V6(SocketAddrV6::new(addr, port, 0, scope_id)),
        }
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.family(), self.socket_addr())
    }
}

/// Port-binding flags of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct EndpointFlags(u32);

impl EndpointFlags {
    /// The port was chosen explicitly by the application, not assigned by the kernel
    pub const SPECIFIC_PORT: EndpointFlags = EndpointFlags(0x1);

    pub const fn empty() -> Self {
        EndpointFlags(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: EndpointFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Static information record, positionally paired with an [`EndpointKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EndpointStatic {
    /// Owning process id, 0 when unknown
    pub owning_pid: u32,
    /// Creation timestamp, `None` when the platform does not expose it
    pub creation_time: Option<u64>,
    /// Port-binding flags
    pub flags: EndpointFlags,
    /// Opaque modification token
    pub modification_info: u64,
}

/// Kernel-level identity of a socket, used to find its owning process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketId {
    /// Socket inode number (procfs)
    Inode(u64),
    /// Address of the socket's protocol control block (BSD-style kernels)
    ControlBlock(u64),
}

/// One row produced by a data source, before ownership and scope are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEndpoint {
    /// Local address; IPv6 scope ids are filled in later
    pub local: LocalAddress,
    pub socket: SocketId,
    pub flags: EndpointFlags,
}
