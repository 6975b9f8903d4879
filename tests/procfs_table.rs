//! End-to-end enumeration over a fake proc tree

#![cfg(unix)]

use query_udp_endpoints::source::ProcNetSource;
use query_udp_endpoints::{
    AddressFamily, EndpointError, EnumerateRequest, LocalAddress, ProcFs, Status,
    UdpEndpointTable, KEY_SIZE, STATIC_SIZE,
};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops";

fn udp_line(slot: u32, local: &str, inode: u64) -> String {
    format!(
        "  {slot}: {local} 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 {inode} 2 0000000000000000 0"
    )
}

fn udp6_line(slot: u32, local: &str, inode: u64) -> String {
    format!(
        "  {slot}: {local} 00000000000000000000000000000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 {inode} 2 0000000000000000 0"
    )
}

/// Builder for a minimal `/proc` layout
struct FakeProc {
    dir: TempDir,
}

impl FakeProc {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("net")).unwrap();
        FakeProc { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn udp(self, lines: &[String]) -> Self {
        self.write_table("udp", lines);
        self
    }

    fn udp6(self, lines: &[String]) -> Self {
        self.write_table("udp6", lines);
        self
    }

    fn if_inet6(self, contents: &str) -> Self {
        fs::write(self.root().join("net").join("if_inet6"), contents).unwrap();
        self
    }

    /// Give `pid` an fd pointing at each socket inode
    fn process(self, pid: u32, inodes: &[u64]) -> Self {
        let fd_dir = self.root().join(pid.to_string()).join("fd");
        fs::create_dir_all(&fd_dir).unwrap();
        for (fd, inode) in inodes.iter().enumerate() {
            symlink(format!("socket:[{inode}]"), fd_dir.join((fd + 3).to_string())).unwrap();
        }
        self
    }

    fn write_table(&self, name: &str, lines: &[String]) {
        let mut contents = String::from(HEADER);
        for line in lines {
            contents.push('\n');
            contents.push_str(line);
        }
        contents.push('\n');
        fs::write(self.root().join("net").join(name), contents).unwrap();
    }

    fn table(&self) -> UdpEndpointTable {
        UdpEndpointTable::with_source(ProcNetSource::new(ProcFs::new(self.root())))
    }
}

#[test]
fn test_loopback_endpoint_with_owner() {
    let proc = FakeProc::new()
        .udp(&[udp_line(0, "0100007F:0050", 4242)])
        .process(1234, &[4242]);

    let result = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(16))
        .unwrap();

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.total, 1);
    assert_eq!(
        result.keys[0].local,
        LocalAddress::V4 {
            addr: Ipv4Addr::LOCALHOST,
            port: 80
        }
    );
    assert_eq!(result.statics[0].owning_pid, 1234);
    assert_eq!(result.statics[0].creation_time, None);
    assert_eq!(result.statics[0].modification_info, 0);
}

#[test]
fn test_unowned_socket_has_pid_zero() {
    let proc = FakeProc::new()
        .udp(&[
            udp_line(0, "00000000:0035", 10),
            udp_line(1, "00000000:0044", 11),
        ])
        .process(77, &[11]);

    let result = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(2))
        .unwrap();

    let pids: Vec<u32> = result.statics.iter().map(|s| s.owning_pid).collect();
    assert_eq!(pids, vec![0, 77]);
}

#[test]
fn test_malformed_rows_not_counted() {
    let proc = FakeProc::new().udp(&[
        udp_line(0, "0100007F:0035", 1),
        "  1: this line is broken".to_string(),
        udp_line(2, "00000000:0044", 2),
        udp_line(3, "0A00020F:A1B2", 3),
    ]);

    let result = proc
        .table()
        .enumerate(EnumerateRequest::count_only())
        .unwrap();

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.total, 3);
    assert!(result.keys.is_empty());
    assert!(result.statics.is_empty());
}

#[test]
fn test_small_capacity_reports_more_entries() {
    let lines: Vec<String> = (0..5u16)
        .map(|i| udp_line(u32::from(i), &format!("0100007F:{:04X}", 1000 + i), u64::from(i) + 1))
        .collect();
    let proc = FakeProc::new().udp(&lines);

    let result = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(2))
        .unwrap();

    assert_eq!(result.status, Status::MoreEntries);
    assert_eq!(result.total, 5);
    let ports: Vec<u16> = result.keys.iter().map(|k| k.port()).collect();
    assert_eq!(ports, vec![1000, 1001]);
    assert_eq!(result.statics.len(), 2);
}

#[test]
fn test_ipv4_rows_precede_ipv6_rows() {
    let proc = FakeProc::new()
        .udp(&[udp_line(0, "00000000:0035", 1)])
        .udp6(&[udp6_line(
            0,
            "00000000000000000000000000000000:0035",
            2,
        )]);

    let result = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(4))
        .unwrap();

    let families: Vec<AddressFamily> = result.keys.iter().map(|k| k.family()).collect();
    assert_eq!(families, vec![AddressFamily::Ipv4, AddressFamily::Ipv6]);
    assert_eq!(result.keys[1].local.ip(), Ipv6Addr::UNSPECIFIED);
    assert_eq!(result.keys[1].local.scope_id(), 0);
}

#[test]
fn test_link_local_gets_interface_scope() {
    let proc = FakeProc::new()
        .udp(&[])
        .udp6(&[
            // fe80::1:546
            udp6_line(0, "000080FE000000000000000001000000:0222", 5),
            // ::1:547
            udp6_line(1, "00000000000000000000000001000000:0223", 6),
        ])
        .if_inet6(
            "fe800000000000000000000000000001 03 40 20 80     eth0\n\
             00000000000000000000000000000001 01 80 10 80       lo\n",
        );

    let result = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(4))
        .unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.keys[0].local.scope_id(), 3);
    assert_eq!(result.keys[0].to_string(), "udp6 [fe80::1%3]:546");
    assert_eq!(result.keys[1].local.scope_id(), 0);
}

#[test]
fn test_missing_udp6_table_is_ipv4_only() {
    let proc = FakeProc::new().udp(&[udp_line(0, "0100007F:0035", 1)]);

    let result = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(4))
        .unwrap();

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.total, 1);
    assert_eq!(result.keys[0].family(), AddressFamily::Ipv4);
}

#[test]
fn test_missing_udp_table_is_not_supported() {
    let proc = FakeProc::new().udp6(&[udp6_line(
        0,
        "00000000000000000000000001000000:0223",
        1,
    )]);

    let err = proc
        .table()
        .enumerate(EnumerateRequest::with_capacity(4))
        .unwrap_err();

    assert!(matches!(&err, EndpointError::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    assert_eq!(err.status(), Status::NotSupported);
}

#[test]
fn test_enumerate_into_writes_records() {
    let proc = FakeProc::new()
        .udp(&[udp_line(0, "0100007F:0050", 9)])
        .process(4321, &[9]);
    let table = proc.table();

    let counted = table.enumerate_into(None, None);
    assert_eq!(counted.status, Status::Success);
    assert_eq!(counted.total, 1);
    assert_eq!(counted.written, 0);

    let mut keys = vec![0u8; KEY_SIZE];
    let mut statics = vec![0u8; STATIC_SIZE];
    let outcome = table.enumerate_into(Some(&mut keys), Some(&mut statics));

    assert_eq!(outcome.status, Status::Success);
    assert_eq!(outcome.written, 1);
    // family, then big-endian port, then address
    assert_eq!(&keys[0..2], &2u16.to_ne_bytes());
    assert_eq!(&keys[2..4], &[0x00, 0x50]);
    assert_eq!(&keys[4..8], &[127, 0, 0, 1]);
    assert_eq!(&statics[0..4], &4321u32.to_ne_bytes());
}

#[test]
fn test_enumerate_into_error_leaves_buffers() {
    let proc = FakeProc::new();
    let table = proc.table();

    let mut keys = vec![0xAAu8; KEY_SIZE * 2];
    let outcome = table.enumerate_into(Some(&mut keys), None);

    assert_eq!(outcome.status, Status::NotSupported);
    assert_eq!(outcome.total, 0);
    assert!(keys.iter().all(|&b| b == 0xAA));
}

#[test]
fn test_enumerate_all_fetches_everything() {
    let lines: Vec<String> = (0..7u16)
        .map(|i| udp_line(u32::from(i), &format!("00000000:{:04X}", 2000 + i), u64::from(i) + 100))
        .collect();
    let proc = FakeProc::new().udp(&lines).process(55, &[100, 106]);

    let result = proc.table().enumerate_all().unwrap();

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.total, 7);
    assert_eq!(result.keys.len(), 7);
    assert_eq!(result.statics[0].owning_pid, 55);
    assert_eq!(result.statics[6].owning_pid, 55);
    assert_eq!(result.statics[3].owning_pid, 0);
}
