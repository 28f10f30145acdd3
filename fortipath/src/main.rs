#![forbid(unsafe_code)]

use clap::{Args, Parser, Subcommand};
use fortipath_config::ConfigManager;
use fortipath_core::{PathAnalyzer, TraceRequest, TraceResult};
use object_model::Protocol;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utils::{CONFIG_READONLY_ENV, config_root, enforce_writable};
mod runtime_config;
use runtime_config::load_runtime_config;

/// Packet-path analysis over FortiGate configuration snapshots.
#[derive(Parser, Debug)]
#[command(name = "fortipath", version, about)]
struct Cli {
    /// Config root; defaults to $FORTIPATH_CONFIG_ROOT or /etc/fortipath.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trace one tuple through the loaded devices.
    Trace(TraceArgs),
    /// Trace every tuple in a file, one `src dst port protocol` per line.
    TraceBatch(BatchArgs),
    /// Report shadowed and redundant policies.
    Conflicts(ConflictArgs),
    /// Report gateway cycles across devices.
    RoutingLoops(OutputArgs),
    /// List loaded devices.
    Devices(OutputArgs),
    /// Record the current snapshots as a new config version.
    RecordSnapshots,
    /// Print the config root and snapshot state.
    AuditStatus,
    ShowConfigRoot,
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct TraceArgs {
    #[arg(long)]
    src: String,
    #[arg(long)]
    dst: String,
    #[arg(long)]
    port: u16,
    #[arg(long, default_value = "tcp")]
    protocol: Protocol,
    #[arg(long)]
    session: Option<String>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[arg(long)]
    file: PathBuf,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct ConflictArgs {
    /// Limit to one device id.
    #[arg(long)]
    device: Option<String>,
    #[command(flatten)]
    output: OutputArgs,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = cli.root.unwrap_or_else(config_root);
    let result = match cli.command {
        Command::Trace(args) => cmd_trace(&root, args),
        Command::TraceBatch(args) => cmd_trace_batch(&root, args),
        Command::Conflicts(args) => cmd_conflicts(&root, args),
        Command::RoutingLoops(args) => cmd_routing_loops(&root, args),
        Command::Devices(args) => cmd_devices(&root, args),
        Command::RecordSnapshots => cmd_record_snapshots(&root),
        Command::AuditStatus => cmd_audit_status(&root),
        Command::ShowConfigRoot => {
            println!("{}", root.display());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_analyzer(root: &Path) -> Result<PathAnalyzer, String> {
    let runtime = load_runtime_config(root)?;
    let mgr = ConfigManager::new(root.to_path_buf()).map_err(|e| e.to_string())?;
    let snap = mgr.snapshot().map_err(|e| e.to_string())?;
    if snap.tampered {
        warn!(version = snap.version, "snapshots differ from the recorded version");
    }
    let devices = mgr.load_devices().map_err(|e| e.to_string())?;
    if devices.is_empty() {
        return Err(format!(
            "no device snapshots in {}",
            mgr.paths.devices_dir.display()
        ));
    }
    let mut analyzer = PathAnalyzer::new(runtime.settings());
    for device in devices {
        analyzer.load_device(device);
    }
    Ok(analyzer)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let body = serde_json::to_string_pretty(value).map_err(|e| format!("encode json: {e}"))?;
    println!("{body}");
    Ok(())
}

fn cmd_trace(root: &Path, args: TraceArgs) -> Result<(), String> {
    let analyzer = load_analyzer(root)?;
    let mut request = TraceRequest::new(&args.src, &args.dst, args.port, args.protocol);
    request.session_id = args.session;
    let result = analyzer.trace(&request);
    if args.output.json {
        print_json(&result)?;
    } else {
        print_trace(&result);
    }
    match &result.error {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

fn print_trace(result: &TraceResult) {
    println!(
        "Trace {} {} -> {} {}/{} ({} -> {})",
        result.session_id,
        result.source_ip,
        result.destination_ip,
        result.protocol,
        result.port,
        result.source_zone,
        result.destination_zone
    );
    for hop in &result.hops {
        let action = hop.action.map_or("implicit-deny".to_string(), |a| a.to_string());
        let policy = hop
            .matched_policy_id
            .map_or("-".to_string(), |id| id.to_string());
        println!(
            "  [{}] {} {}({}) -> {}({}) policy={} action={}",
            hop.hop_index,
            hop.device_id,
            hop.ingress_interface,
            hop.ingress_zone,
            hop.egress_interface,
            hop.egress_zone,
            policy,
            action
        );
    }
    match &result.blocked_by {
        Some(b) => println!(
            "Verdict: blocked at hop {} by {} policy={}",
            b.hop_index,
            b.device_id,
            b.policy_id.map_or("none".to_string(), |id| id.to_string())
        ),
        None if result.allowed => println!("Verdict: allowed"),
        None => println!("Verdict: not allowed"),
    }
    for rec in &result.recommendations {
        println!(
            "  ! {:?} {} {}: {}",
            rec.severity, rec.device_id, rec.description, rec.suggestion
        );
    }
}

/// `src dst port [protocol]`; blank lines and `#` comments are skipped.
fn parse_batch_line(line: &str) -> Result<Option<TraceRequest>, String> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (src, dst, port, proto) = match fields.as_slice() {
        [src, dst, port] => (*src, *dst, *port, "tcp"),
        [src, dst, port, proto] => (*src, *dst, *port, *proto),
        _ => return Err(format!("expected `src dst port [protocol]`, got {line:?}")),
    };
    let port: u16 = port.parse().map_err(|_| format!("invalid port {port:?}"))?;
    let protocol: Protocol = proto.parse().map_err(|e| format!("{e}"))?;
    Ok(Some(TraceRequest::new(src, dst, port, protocol)))
}

fn read_batch(path: &Path) -> Result<Vec<TraceRequest>, String> {
    let file = File::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
    let mut requests = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| format!("read {}: {e}", path.display()))?;
        if let Some(req) = parse_batch_line(&line).map_err(|e| format!("line {}: {e}", n + 1))? {
            requests.push(req);
        }
    }
    Ok(requests)
}

fn cmd_trace_batch(root: &Path, args: BatchArgs) -> Result<(), String> {
    let requests = read_batch(&args.file)?;
    if requests.is_empty() {
        return Err("no tuples to trace".into());
    }
    let analyzer = load_analyzer(root)?;
    let results = analyzer.trace_batch(&requests);
    if args.output.json {
        return print_json(&results);
    }
    let mut allowed = 0usize;
    let mut blocked = 0usize;
    let mut failed = 0usize;
    for r in &results {
        match (&r.error, r.allowed) {
            (Some(e), _) => {
                failed += 1;
                eprintln!("error: {} -> {}: {e}", r.source_ip, r.destination_ip);
            }
            (None, true) => allowed += 1,
            (None, false) => blocked += 1,
        }
    }
    println!(
        "Batch done: total={} allowed={} blocked={} failed={}",
        results.len(),
        allowed,
        blocked,
        failed
    );
    Ok(())
}

fn cmd_conflicts(root: &Path, args: ConflictArgs) -> Result<(), String> {
    let analyzer = load_analyzer(root)?;
    let ids: Vec<String> = match args.device {
        Some(id) => vec![id],
        None => analyzer.repository().devices().map(|d| d.id.clone()).collect(),
    };
    let mut conflicts = Vec::new();
    for id in &ids {
        let found = analyzer
            .policy_conflicts(id)
            .ok_or_else(|| format!("device {id} is not loaded"))?;
        conflicts.extend(found);
    }
    if args.output.json {
        return print_json(&conflicts);
    }
    for c in &conflicts {
        println!(
            "{} policy {} is {:?} by policy {}",
            c.device_id, c.policy_id, c.kind, c.covered_by
        );
    }
    println!("Conflicts: {}", conflicts.len());
    Ok(())
}

fn cmd_routing_loops(root: &Path, args: OutputArgs) -> Result<(), String> {
    let analyzer = load_analyzer(root)?;
    let loops = analyzer.routing_loops();
    if args.json {
        return print_json(&loops);
    }
    for l in &loops {
        println!("{} via {}", l.destination, l.devices.join(" -> "));
    }
    println!("Routing loops: {}", loops.len());
    Ok(())
}

#[derive(Serialize)]
struct DeviceRow<'a> {
    id: &'a str,
    name: &'a str,
    policies: usize,
    addresses: usize,
    services: usize,
    routes: usize,
    fingerprint: &'a str,
}

fn cmd_devices(root: &Path, args: OutputArgs) -> Result<(), String> {
    let analyzer = load_analyzer(root)?;
    let repo = analyzer.repository();
    let rows: Vec<DeviceRow<'_>> = repo
        .devices()
        .map(|d| DeviceRow {
            id: &d.id,
            name: &d.display_name,
            policies: d.policies.len(),
            addresses: d.addresses.len(),
            services: d.services.len(),
            routes: d.routes.len(),
            fingerprint: repo.fingerprint(&d.id).unwrap_or(""),
        })
        .collect();
    if args.json {
        return print_json(&rows);
    }
    for r in &rows {
        println!(
            "{} name={} policies={} addresses={} services={} routes={}",
            r.id, r.name, r.policies, r.addresses, r.services, r.routes
        );
    }
    Ok(())
}

fn cmd_record_snapshots(root: &Path) -> Result<(), String> {
    let mgr = ConfigManager::new(root.to_path_buf()).map_err(|e| e.to_string())?;
    enforce_writable(&mgr.paths.state_dir).map_err(|e| e.to_string())?;
    let meta = mgr.record_version().map_err(|e| e.to_string())?;
    info!(version = meta.version, "snapshots recorded");
    println!("Recorded version {} hash={}", meta.version, meta.hash_hex);
    Ok(())
}

fn cmd_audit_status(root: &Path) -> Result<(), String> {
    let mgr = ConfigManager::new(root.to_path_buf()).map_err(|e| e.to_string())?;
    let snap = mgr.snapshot().map_err(|e| e.to_string())?;
    println!(
        "Config root={} readonly={} version={} devices={} tampered={}",
        root.display(),
        std::env::var(CONFIG_READONLY_ENV).unwrap_or_else(|_| "unset".into()),
        snap.version,
        snap.device_files.len(),
        snap.tampered
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn batch_lines_parse_with_default_protocol() {
        let req = parse_batch_line("10.0.0.1 10.0.0.2 443").unwrap().unwrap();
        assert_eq!(req.protocol, Protocol::Tcp);
        assert_eq!(req.port, 443);
        let req = parse_batch_line("  10.0.0.1 8.8.8.8 53 udp # dns").unwrap().unwrap();
        assert_eq!(req.protocol, Protocol::Udp);
        assert!(parse_batch_line("# only a comment").unwrap().is_none());
        assert!(parse_batch_line("").unwrap().is_none());
    }

    #[test]
    fn batch_lines_reject_garbage() {
        assert!(parse_batch_line("10.0.0.1 10.0.0.2").is_err());
        assert!(parse_batch_line("10.0.0.1 10.0.0.2 http").is_err());
        assert!(parse_batch_line("10.0.0.1 10.0.0.2 80 sctp").is_err());
    }

    #[test]
    fn analyzer_loads_from_root() {
        let dir = tempdir().unwrap();
        let devices = dir.path().join("devices");
        fs::create_dir_all(&devices).unwrap();
        fs::write(
            devices.join("fw1.json"),
            r#"{"name": "FW1",
                "routing_table": [{"dst": "192.168.0.0/24", "interface": "port1"}],
                "policies": [{"policyid": 1, "srcaddr": [{"name": "all"}], "dstaddr": [{"name": "all"}],
                              "service": [{"name": "ALL"}], "action": "accept"}]}"#,
        )
        .unwrap();
        let analyzer = load_analyzer(dir.path()).unwrap();
        let result = analyzer.trace(&TraceRequest::new("192.168.0.10", "192.168.0.20", 443, Protocol::Tcp));
        assert!(result.allowed);
        assert_eq!(result.hops[0].device_id, "fw1");
    }

    #[test]
    fn empty_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load_analyzer(dir.path()).unwrap_err();
        assert!(err.contains("no device snapshots"));
    }
}
