//! Location of the proc filesystem used by the procfs-backed collaborators

use std::path::{Path, PathBuf};

/// Environment variable overriding the proc root
pub const PROC_ROOT_ENV: &str = "QUERY_UDP_PROC_ROOT";

const DEFAULT_PROC_ROOT: &str = "/proc";

/// Root of a proc filesystem (`/proc` unless overridden)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `/proc`, or the directory named by `QUERY_UDP_PROC_ROOT`
    pub fn from_env() -> Self {
        match std::env::var_os(PROC_ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::new(root),
            _ => Self::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// IPv4 UDP socket table
    pub fn udp4_table(&self) -> PathBuf {
        self.root.join("net").join("udp")
    }

    /// IPv6 UDP socket table
    pub fn udp6_table(&self) -> PathBuf {
        self.root.join("net").join("udp6")
    }

    /// Per-interface IPv6 address list
    pub fn if_inet6(&self) -> PathBuf {
        self.root.join("net").join("if_inet6")
    }

    /// Open file descriptors of a process
    pub fn fd_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string()).join("fd")
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}
