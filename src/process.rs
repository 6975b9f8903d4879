//! Process ownership module
//!
//! Builds the per-call map from a kernel socket identifier to the pid of the
//! process holding it.
//!
//! Platform-specific implementations:
//! - **Linux**: walks `/proc/<pid>/fd` and matches `socket:[inode]` links
//! - **macOS**: `proc_pidinfo(PROC_PIDLISTFDS)` + `proc_pidfdinfo(PROC_PIDFDSOCKETINFO)`,
//!   keyed by the socket's protocol control block address

use crate::config::ProcFs;
use crate::types::SocketId;
use log::debug;
use std::collections::HashMap;
use std::fs;

/// Socket identifier to owning pid, valid for one enumeration call
#[derive(Debug, Clone, Default)]
pub struct OwnerMap {
    owners: HashMap<SocketId, u32>,
}

impl OwnerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pid` as owner of `socket`; the first owner seen is kept
    pub fn insert(&mut self, socket: SocketId, pid: u32) {
        self.owners.entry(socket).or_insert(pid);
    }

    /// Owning pid of `socket`, 0 when unknown
    pub fn lookup(&self, socket: SocketId) -> u32 {
        self.owners.get(&socket).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl FromIterator<(SocketId, u32)> for OwnerMap {
    fn from_iter<I: IntoIterator<Item = (SocketId, u32)>>(iter: I) -> Self {
        let mut map = OwnerMap::new();
        for (socket, pid) in iter {
            map.insert(socket, pid);
        }
        map
    }
}

// ============================================================================
// procfs Implementation
// ============================================================================

/// Build the owner map by scanning every `<root>/<pid>/fd` directory.
///
/// Unreadable processes (permissions, exited mid-scan) are skipped; a
/// missing proc root yields an empty map.
pub fn build_from_procfs(procfs: &ProcFs) -> OwnerMap {
    let mut map = OwnerMap::new();

    let proc_dir = match fs::read_dir(procfs.root()) {
        Ok(dir) => dir,
        Err(e) => {
            debug!("cannot read {}: {e}", procfs.root().display());
            return map;
        }
    };

    for entry in proc_dir.flatten() {
        let file_name = entry.file_name();
        let Ok(pid) = file_name.to_string_lossy().parse::<u32>() else {
            continue;
        };

        let Ok(fds) = fs::read_dir(procfs.fd_dir(pid)) else {
            continue;
        };

        for fd in fds.flatten() {
            let Ok(target) = fs::read_link(fd.path()) else {
                continue;
            };
            if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                map.insert(SocketId::Inode(inode), pid);
            }
        }
    }

    debug!("owner map: {} sockets", map.len());
    map
}

/// Extract the inode from a `socket:[12345]` fd link target
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

// ============================================================================
// macOS Implementation
// ============================================================================

#[cfg(target_os = "macos")]
pub fn build_from_libproc() -> OwnerMap {
    macos::build()
}

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use crate::util::{fill_growing, read_i32, read_u32, read_u64};
    use libc::{c_int, c_void};
    use std::mem;

    const PROC_ALL_PIDS: u32 = 1;
    const PROC_PIDLISTFDS: c_int = 1;
    const PROC_PIDFDSOCKETINFO: c_int = 3;
    const PROX_FDTYPE_SOCKET: u32 = 2;

    // struct proc_fdinfo { int32_t proc_fd; uint32_t proc_fdtype; }
    const PROC_FDINFO_SIZE: usize = 8;

    // starting list size; grown while the kernel fills it
    const INITIAL_ENTRIES: usize = 4096;

    // struct socket_fdinfo { proc_fileinfo pfi (24); socket_info psi (768) }
    const SOCKET_FDINFO_SIZE: usize = 792;
    const SOI_PCB_OFFSET: usize = 24 + 144;
    const SOI_PROTOCOL_OFFSET: usize = 24 + 156;

    extern "C" {
        fn proc_listpids(
            type_: u32,
            typeinfo: u32,
            buffer: *mut c_void,
            buffersize: c_int,
        ) -> c_int;

        fn proc_pidinfo(
            pid: c_int,
            flavor: c_int,
            arg: u64,
            buffer: *mut c_void,
            buffersize: c_int,
        ) -> c_int;

        fn proc_pidfdinfo(
            pid: c_int,
            fd: c_int,
            flavor: c_int,
            buffer: *mut c_void,
            buffersize: c_int,
        ) -> c_int;
    }

    pub fn build() -> OwnerMap {
        let mut map = OwnerMap::new();

        for pid in list_pids() {
            for fd in list_socket_fds(pid) {
                if let Some(pcb) = udp_control_block(pid, fd) {
                    map.insert(SocketId::ControlBlock(pcb), pid as u32);
                }
            }
        }

        debug!("owner map: {} sockets", map.len());
        map
    }

    fn list_pids() -> Vec<c_int> {
        let buffer = fill_growing(INITIAL_ENTRIES * mem::size_of::<c_int>(), |buf| unsafe {
            proc_listpids(
                PROC_ALL_PIDS,
                0,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as c_int,
            )
        });
        let Some(buffer) = buffer else {
            debug!("proc_listpids failed: {}", std::io::Error::last_os_error());
            return Vec::new();
        };

        buffer
            .chunks_exact(mem::size_of::<c_int>())
            .filter_map(|pid| read_i32(pid, 0))
            .filter(|pid| *pid > 0)
            .collect()
    }

    fn list_socket_fds(pid: c_int) -> Vec<c_int> {
        let buffer = fill_growing(INITIAL_ENTRIES * PROC_FDINFO_SIZE, |buf| unsafe {
            proc_pidinfo(
                pid,
                PROC_PIDLISTFDS,
                0,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as c_int,
            )
        });
        let Some(buffer) = buffer else {
            return Vec::new();
        };

        buffer
            .chunks_exact(PROC_FDINFO_SIZE)
            .filter(|info| read_u32(info, 4) == Some(PROX_FDTYPE_SOCKET))
            .filter_map(|info| read_i32(info, 0))
            .collect()
    }

    fn udp_control_block(pid: c_int, fd: c_int) -> Option<u64> {
        let mut info = [0u8; SOCKET_FDINFO_SIZE];

        let ret = unsafe {
            proc_pidfdinfo(
                pid,
                fd,
                PROC_PIDFDSOCKETINFO,
                info.as_mut_ptr() as *mut c_void,
                SOCKET_FDINFO_SIZE as c_int,
            )
        };
        if ret <= 0 {
            return None;
        }

        if read_i32(&info, SOI_PROTOCOL_OFFSET)? != libc::IPPROTO_UDP {
            return None;
        }
        read_u64(&info, SOI_PCB_OFFSET)
    }
}
