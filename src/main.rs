//! Command-line front end: print the UDP endpoint table

use clap::Parser;
use query_udp_endpoints::source::ProcNetSource;
use query_udp_endpoints::{
    EndpointKey, EndpointStatic, EnumerateRequest, Enumeration, ProcFs, Status, UdpEndpointTable,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "query-udp-endpoints",
    version,
    about = "List bound UDP endpoints with their owning process",
    after_help = "\
EXAMPLES:
    query-udp-endpoints                        All endpoints (count, then fetch)
    query-udp-endpoints --capacity 10          At most 10 endpoints
    query-udp-endpoints --count-only           Only the number of endpoints
    query-udp-endpoints --proc-root /mnt/proc  Read another proc filesystem"
)]
struct Args {
    /// Maximum number of endpoints to fetch (default: as many as exist)
    #[arg(short, long, conflicts_with = "count_only")]
    capacity: Option<usize>,

    /// Only report the number of endpoints
    #[arg(long)]
    count_only: bool,

    /// Read the procfs tables under DIR instead of /proc
    #[arg(long, value_name = "DIR")]
    proc_root: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Row<'a> {
    #[serde(flatten)]
    key: &'a EndpointKey,
    #[serde(flatten)]
    info: &'a EndpointStatic,
}

#[derive(Serialize)]
struct Report<'a> {
    status: Status,
    total: usize,
    endpoints: Vec<Row<'a>>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let table = match &args.proc_root {
        Some(root) => UdpEndpointTable::with_source(ProcNetSource::new(ProcFs::new(root))),
        None => UdpEndpointTable::new(),
    };

    let result = if args.count_only {
        table.enumerate(EnumerateRequest::count_only())
    } else {
        match args.capacity {
            Some(capacity) => table.enumerate(EnumerateRequest::with_capacity(capacity)),
            None => table.enumerate_all(),
        }
    };

    match result {
        Ok(result) => {
            print_result(&result, args.json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", e.status());
            ExitCode::FAILURE
        }
    }
}

fn print_result(result: &Enumeration, json: bool) {
    let rows: Vec<Row> = result
        .keys
        .iter()
        .zip(&result.statics)
        .map(|(key, info)| Row { key, info })
        .collect();

    if json {
        let report = Report {
            status: result.status,
            total: result.total,
            endpoints: rows,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("cannot serialize report: {e}"),
        }
        return;
    }

    if !rows.is_empty() {
        println!(
            "{:<6} {:<46} {:>8} {:>8} {:>6}",
            "Proto", "Local Address", "Scope", "PID", "Flags"
        );
    }
    for row in &rows {
        println!(
            "{:<6} {:<46} {:>8} {:>8} {:>6}",
            row.key.family().to_string(),
            row.key.socket_addr().to_string(),
            row.key.local.scope_id(),
            row.info.owning_pid,
            format!("{:#x}", row.info.flags.bits())
        );
    }
    println!("{} endpoints ({})", result.total, result.status);
}
