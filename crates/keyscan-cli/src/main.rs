//! keyscan: page through the keyspace of a RESP store from the terminal.
//!
//! Connects to a standalone node (`-H/-p`) or a cluster (`--node`, one or
//! more seeds), lists one budgeted page of keys and prints the cursor to
//! continue from. `--all` keeps paging until every shard is done.

mod format;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use keyscan_core::cursor::{self, ShardCursor};
use keyscan_core::{
    Client, ClusterClient, DataType, ErrorKind, KeyscanConfig, KeysPage, KeyspaceScanner,
    ScanError, ScanRequest, ShardAddress, StandaloneClient, StoreClient, Topology,
};
use tracing::info;

/// Budgeted, resumable key listing for standalone and clustered stores.
#[derive(Parser, Debug)]
#[command(name = "keyscan", version, about)]
struct Args {
    /// Standalone server hostname.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Standalone server port.
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Cluster node (host:port). Repeat or comma-separate; the layout is
    /// discovered from the first reachable one.
    #[arg(long = "node", value_delimiter = ',', value_parser = ShardAddress::parse)]
    nodes: Vec<ShardAddress>,

    /// Use the --node list as the full set of primaries instead of asking
    /// CLUSTER SLOTS.
    #[arg(long, requires = "nodes")]
    static_nodes: bool,

    /// Password for AUTH.
    #[arg(short = 'a', long, env = "KEYSCAN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// ACL username for AUTH.
    #[arg(long, env = "KEYSCAN_USER")]
    user: Option<String>,

    /// Logical database (standalone only).
    #[arg(short = 'n', long, env = "KEYSCAN_DB")]
    db: Option<u32>,

    /// TOML config file.
    #[arg(long, env = "KEYSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Connect timeout in milliseconds.
    #[arg(long, env = "KEYSCAN_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: Option<u64>,

    /// Per-command timeout in milliseconds (0 disables it).
    #[arg(long, env = "KEYSCAN_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Default per-page budget in COUNT units.
    #[arg(long, env = "KEYSCAN_SCAN_THRESHOLD")]
    scan_threshold: Option<u32>,

    /// Glob pattern, or an exact key name.
    #[arg(short = 'm', long = "match", default_value = "*")]
    pattern: String,

    /// COUNT hint per SCAN call.
    #[arg(short, long)]
    count: Option<u32>,

    /// Only list keys of this type.
    #[arg(short = 't', long = "type")]
    data_type: Option<DataType>,

    /// Budget for this page in COUNT units.
    #[arg(short, long)]
    budget: Option<u32>,

    /// Cursor returned by a previous page.
    #[arg(long, default_value = "0")]
    cursor: String,

    /// Skip TTL, size and type lookups.
    #[arg(long)]
    names_only: bool,

    /// Print each page as a JSON line.
    #[arg(long)]
    json: bool,

    /// Keep paging until every shard is done.
    #[arg(long)]
    all: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) => ExitCode::from(2),
            CliError::Scan(e) if e.kind() == ErrorKind::BadRequest => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyscan=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            return e.exit_code();
        }
    };

    if args.print_config {
        return match config.to_toml() {
            Ok(toml) => {
                print!("{toml}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e.red());
                ExitCode::FAILURE
            }
        };
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", format!("failed to create runtime: {e}").red());
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(&args, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("error: {e}").red());
            e.exit_code()
        }
    }
}

/// Builds the effective config: defaults, then the TOML file, then
/// command-line and environment overrides.
fn load_config(args: &Args) -> Result<KeyscanConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => KeyscanConfig::from_file(path).map_err(CliError::Config)?,
        None => KeyscanConfig::default(),
    };

    let conn = &mut config.connection;
    if let Some(password) = &args.password {
        conn.password = Some(password.clone());
    }
    if let Some(user) = &args.user {
        conn.username = Some(user.clone());
    }
    if let Some(db) = args.db {
        conn.db = db;
    }
    if let Some(ms) = args.connect_timeout_ms {
        conn.connect_timeout_ms = ms;
    }
    if let Some(ms) = args.timeout_ms {
        conn.command_timeout_ms = ms;
    }
    if let Some(threshold) = args.scan_threshold {
        config.scanner.scan_threshold = threshold;
    }

    if !args.nodes.is_empty() && config.connection.db != 0 {
        return Err(CliError::Config(
            "--db is only supported for standalone servers".into(),
        ));
    }
    Ok(config)
}

fn build_request(args: &Args) -> ScanRequest {
    ScanRequest {
        cursor: args.cursor.clone(),
        count: args.count,
        pattern: args.pattern.clone(),
        data_type: args.data_type.clone(),
        include_metadata: !args.names_only,
        scan_budget: args.budget,
    }
}

async fn connect(args: &Args, config: &KeyscanConfig) -> Result<Client, CliError> {
    let conn = config.connection.clone();
    let client: Client = if args.nodes.is_empty() {
        let addr = ShardAddress::new(args.host.clone(), args.port);
        StandaloneClient::connect(addr, conn)
            .await
            .map_err(ScanError::from)?
            .into()
    } else if args.static_nodes {
        let nodes = args.nodes.iter().map(|n| (n.clone(), Vec::new())).collect();
        ClusterClient::connect(nodes, conn)
            .await
            .map_err(ScanError::from)?
            .into()
    } else {
        ClusterClient::discover(&args.nodes, conn).await?.into()
    };
    info!(shards = client.list_shards().len(), "connected");
    Ok(client)
}

async fn run(args: &Args, config: KeyscanConfig) -> Result<(), CliError> {
    let client = connect(args, &config).await?;
    let scanner = KeyspaceScanner::new(config.scanner);
    let mut req = build_request(args);
    let mut next_index = 1;

    loop {
        let page = scanner.get_keys(&client, &req).await?;
        if args.json {
            println!("{}", format::page_json(&page)?);
        } else {
            println!("{}", format::format_page(&page, next_index));
        }
        next_index += page.keys().count();

        if !args.all || page.is_complete() {
            return Ok(());
        }
        req.cursor = continuation(&page, client.topology());
    }
}

/// Cursor for the next page with finished shards marked excluded, so a
/// cluster page doesn't restart shards that wrapped back to `0`.
fn continuation(page: &KeysPage, topology: &Topology) -> String {
    let entries: Vec<ShardCursor> = page
        .shards
        .iter()
        .map(|s| {
            let position = if s.state.is_finished() { -1 } else { s.cursor };
            ShardCursor::new(s.shard.clone(), position)
        })
        .collect();
    cursor::encode(&entries, topology)
}
