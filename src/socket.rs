//! UDP endpoint table
//!
//! One call scans the platform data source from scratch and returns a pair
//! of positionally matched arrays: [`EndpointKey`] and [`EndpointStatic`].
//!
//! Pagination works in two phases. The caller asks for at most `capacity`
//! records and always learns the true total. When the total does not fit,
//! the first `capacity` records in scan order come back with
//! [`Status::MoreEntries`] and the caller retries with a capacity of at
//! least `total`. A request with zero capacity for both arrays only counts.

use crate::error::{EndpointError, Result};
use crate::record::{self, KEY_SIZE, STATIC_SIZE};
use crate::source::{self, EndpointSource};
use crate::types::{EndpointKey, EndpointStatic, LocalAddress, RawEndpoint, Status};
use log::{debug, trace, warn};

/// Requested output capacity of each array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnumerateRequest {
    pub key_capacity: usize,
    pub static_capacity: usize,
}

impl EnumerateRequest {
    /// Learn the total without retrieving records
    pub fn count_only() -> Self {
        Self::default()
    }

    /// Room for `capacity` keys and `capacity` static records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            key_capacity: capacity,
            static_capacity: capacity,
        }
    }

    /// Number of records that may be written; `None` for a count-only request.
    ///
    /// When only one array is requested its capacity applies; when both are,
    /// the smaller one bounds the pair.
    pub fn capacity(&self) -> Option<usize> {
        match (self.key_capacity, self.static_capacity) {
            (0, 0) => None,
            (0, n) | (n, 0) => Some(n),
            (k, s) => Some(k.min(s)),
        }
    }
}

/// Result of one enumeration call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// `Success` or `MoreEntries`
    pub status: Status,
    /// True number of endpoints found, independent of what was returned
    pub total: usize,
    /// Empty unless keys were requested
    pub keys: Vec<EndpointKey>,
    /// Empty unless static records were requested
    pub statics: Vec<EndpointStatic>,
}

/// Outcome of [`UdpEndpointTable::enumerate_into`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerateOutcome {
    pub status: Status,
    /// True total; 0 when `status` is an error
    pub total: usize,
    /// Records written to each supplied buffer
    pub written: usize,
}

/// Stateless UDP endpoint enumerator bound to one data source
pub struct UdpEndpointTable {
    source: Option<Box<dyn EndpointSource>>,
}

impl UdpEndpointTable {
    /// Use the data source of the running platform
    pub fn new() -> Self {
        Self {
            source: source::platform_source(),
        }
    }

    pub fn with_source(source: impl EndpointSource + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
        }
    }

    /// A table with no data source; every call reports `NotImplemented`
    pub fn unsupported() -> Self {
        Self { source: None }
    }

    /// Name of the data source in use
    pub fn source_name(&self) -> Option<&'static str> {
        self.source.as_deref().map(|s| s.name())
    }

    /// Scan the data source and return up to the requested number of records.
    ///
    /// Errors carry the call-level status through [`EndpointError::status`];
    /// no records are returned on that path.
    pub fn enumerate(&self, request: EnumerateRequest) -> Result<Enumeration> {
        trace!(
            "enumerate: key_capacity {} static_capacity {}",
            request.key_capacity,
            request.static_capacity
        );

        let source = self.source.as_deref().ok_or_else(|| {
            EndpointError::NotImplemented("no UDP endpoint source for this platform".to_string())
        })?;

        let owners = source.owner_map();
        let scopes = source.scope_table();
        let rows = source.scan()?;

        let total = rows.len();
        let writable = request.capacity().map_or(0, |c| c.min(total));

        let mut keys = Vec::new();
        let mut statics = Vec::new();
        if request.key_capacity > 0 {
            keys.try_reserve_exact(writable)?;
        }
        if request.static_capacity > 0 {
            statics.try_reserve_exact(writable)?;
        }

        for row in rows.into_iter().take(writable) {
            let RawEndpoint {
                local,
                socket,
                flags,
            } = row;

            let local = match local {
                LocalAddress::V6 {
                    addr,
                    port,
                    scope_id: 0,
                } => LocalAddress::V6 {
                    addr,
                    port,
                    scope_id: scopes.resolve(&addr),
                },
                other => other,
            };

            if request.key_capacity > 0 {
                keys.push(EndpointKey::new(local));
            }
            if request.static_capacity > 0 {
                statics.push(EndpointStatic {
                    owning_pid: owners.lookup(socket),
                    creation_time: None,
                    flags,
                    modification_info: 0,
                });
            }
        }

        let status = match request.capacity() {
            Some(capacity) if total > capacity => Status::MoreEntries,
            _ => Status::Success,
        };

        debug!(
            "{}: {} endpoints, {} returned, {}",
            source.name(),
            total,
            writable,
            status
        );

        Ok(Enumeration {
            status,
            total,
            keys,
            statics,
        })
    }

    /// Fill caller buffers with fixed-size records.
    ///
    /// Capacities are the number of whole records each buffer holds; an
    /// absent buffer requests nothing for that array. On an error status
    /// the buffers are not touched.
    pub fn enumerate_into(
        &self,
        key_buf: Option<&mut [u8]>,
        static_buf: Option<&mut [u8]>,
    ) -> EnumerateOutcome {
        let request = EnumerateRequest {
            key_capacity: record::capacity_of(key_buf.as_deref(), KEY_SIZE),
            static_capacity: record::capacity_of(static_buf.as_deref(), STATIC_SIZE),
        };

        match self.enumerate(request) {
            Ok(result) => {
                if let Some(buf) = key_buf {
                    record::write_keys(buf, &result.keys);
                }
                if let Some(buf) = static_buf {
                    record::write_statics(buf, &result.statics);
                }
                EnumerateOutcome {
                    status: result.status,
                    total: result.total,
                    written: result.keys.len().max(result.statics.len()),
                }
            }
            Err(e) => {
                debug!("enumerate failed: {e}");
                EnumerateOutcome {
                    status: e.status(),
                    total: 0,
                    written: 0,
                }
            }
        }
    }

    /// Count-only call, then a call sized to the reported total.
    ///
    /// Endpoints created between the two calls push the second call to
    /// `MoreEntries`; the call is then repeated with the new total.
    pub fn enumerate_all(&self) -> Result<Enumeration> {
        let mut capacity = self.enumerate(EnumerateRequest::count_only())?.total;
        loop {
            // zero capacity would be a count-only request again
            let result = self.enumerate(EnumerateRequest::with_capacity(capacity.max(1)))?;
            if result.status != Status::MoreEntries {
                return Ok(result);
            }
            warn!(
                "table grew from {capacity} to {} endpoints, retrying",
                result.total
            );
            capacity = result.total;
        }
    }
}

impl Default for UdpEndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Enumerate UDP endpoints with the platform data source
pub fn enumerate_udp_endpoints(request: EnumerateRequest) -> Result<Enumeration> {
    UdpEndpointTable::new().enumerate(request)
}

/// Count UDP endpoints without retrieving them
pub fn count_udp_endpoints() -> Result<usize> {
    Ok(UdpEndpointTable::new()
        .enumerate(EnumerateRequest::count_only())?
        .total)
}

/// Retrieve every UDP endpoint as (key, static) pairs
pub fn get_udp_endpoints() -> Result<Vec<(EndpointKey, EndpointStatic)>> {
    let result = UdpEndpointTable::new().enumerate_all()?;
    Ok(result.keys.into_iter().zip(result.statics).collect())
}
