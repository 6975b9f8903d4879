//! # query_udp_endpoints
//!
//! A cross-platform library that lists the UDP endpoints bound on this
//! machine as a table of fixed-layout records:
//! - one [`EndpointKey`] per endpoint (local address, port, IPv6 scope id)
//! - one [`EndpointStatic`] per endpoint (owning pid, flags, ...), at the
//!   same position
//!
//! ## Platform Support
//!
//! | Part | Linux | macOS |
//! |------|-------|-------|
//! | Endpoints | `/proc/net/udp`, `/proc/net/udp6` | `net.inet.udp.pcblist_n` sysctl |
//! | Owning process | `/proc/<pid>/fd` socket links | `proc_pidfdinfo` |
//! | IPv6 scope | `/proc/net/if_inet6` | `getifaddrs` |
//!
//! Other platforms report [`Status::NotImplemented`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use query_udp_endpoints::{socket, EnumerateRequest, Status};
//!
//! fn main() -> query_udp_endpoints::Result<()> {
//!     // Ask for the count first, then for everything
//!     let total = socket::count_udp_endpoints()?;
//!     let result = socket::enumerate_udp_endpoints(EnumerateRequest::with_capacity(total))?;
//!     if result.status == Status::MoreEntries {
//!         println!("{} endpoints appeared since the count", result.total - total);
//!     }
//!
//!     for (key, stat) in result.keys.iter().zip(&result.statics) {
//!         println!("{key} pid {}", stat.owning_pid);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Fixed-size records
//!
//! Table registries that deal in raw buffers use
//! [`UdpEndpointTable::enumerate_into`] together with [`KEY_SIZE`] and
//! [`STATIC_SIZE`]:
//!
//! ```rust,no_run
//! use query_udp_endpoints::{UdpEndpointTable, KEY_SIZE, STATIC_SIZE};
//!
//! let table = UdpEndpointTable::new();
//! let counted = table.enumerate_into(None, None);
//! let mut keys = vec![0u8; counted.total * KEY_SIZE];
//! let mut statics = vec![0u8; counted.total * STATIC_SIZE];
//! let outcome = table.enumerate_into(Some(&mut keys), Some(&mut statics));
//! println!("{}: {} of {}", outcome.status, outcome.written, outcome.total);
//! ```

pub mod config;
pub mod error;
pub mod process;
pub mod record;
pub mod scope;
pub mod socket;
pub mod source;
pub mod types;
pub mod util;

// Re-export commonly used types
pub use config::ProcFs;
pub use error::{EndpointError, Result};
pub use record::{KEY_SIZE, STATIC_SIZE};
pub use socket::{EnumerateOutcome, EnumerateRequest, Enumeration, UdpEndpointTable};
pub use source::EndpointSource;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
