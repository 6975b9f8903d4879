//! Platform data sources for the UDP endpoint table
//!
//! - **Linux**: [`ProcNetSource`] parses `/proc/net/udp` and `/proc/net/udp6`
//! - **macOS**: [`PcbListSource`] walks the `net.inet.udp.pcblist_n` sysctl snapshot
//!
//! Every source also knows how to build the two per-call lookup tables,
//! because the key space of the owner map (inode vs control block) is
//! decided by where the rows came from.

pub mod pcblist;
pub mod proc_net;

pub use pcblist::{PcbListSource, SnapshotQuery};
pub use proc_net::ProcNetSource;

use crate::error::Result;
use crate::process::OwnerMap;
use crate::scope::ScopeTable;
use crate::types::RawEndpoint;

/// A place UDP endpoint rows can be read from
pub trait EndpointSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Socket id to pid map; best-effort, never fails
    fn owner_map(&self) -> OwnerMap;

    /// IPv6 scope rules; best-effort, never fails
    fn scope_table(&self) -> ScopeTable;

    /// Read every endpoint row in the source's natural order.
    ///
    /// Malformed or filtered rows are dropped here and never reach the
    /// caller.
    fn scan(&self) -> Result<Vec<RawEndpoint>>;
}

/// The data source for the platform this crate was built for, if any
pub fn platform_source() -> Option<Box<dyn EndpointSource>> {
    #[cfg(target_os = "linux")]
    return Some(Box::new(ProcNetSource::new(crate::config::ProcFs::from_env())));

    #[cfg(target_os = "macos")]
    return Some(Box::new(PcbListSource::new(pcblist::SysctlQuery::udp())));

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    None
}
