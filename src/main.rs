// Command-line entry point for callreplay.

use anyhow::{bail, Context, Result};
use callreplay::api::dto::{load_steps, load_trace, ReplayPayload};
use callreplay::api::server::{ReplayServer, DEFAULT_INTERVAL, DEFAULT_PORT};
use callreplay::application::AnalyzeUsecase;
use callreplay::common::logging::init_tracing;
use callreplay::domain::callgraph::DisassemblyParser;
use callreplay::infrastructure::concurrency::build_resolver_pool;
use callreplay::infrastructure::config::AnalyzerConfig;
use callreplay::infrastructure::listing_loader::BinaryListings;
use callreplay::infrastructure::toolchain::Toolchain;
use callreplay::ports::dot_exporter::DotExporter;
use callreplay::ports::payload_exporter::ReplayJsonExporter;
use callreplay::ports::OutputExporter;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Static call graph recovery and replay for embedded binaries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recover the call graph of a binary and print its BFS tree
    Analyze(AnalyzeArgs),
    /// Serve a replay payload over newline-delimited JSON
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Binary to analyse
    binary: PathBuf,

    #[arg(long)]
    nm_tool: Option<String>,

    #[arg(long)]
    objdump_tool: Option<String>,

    #[arg(long)]
    addr2line_tool: Option<String>,

    /// Traversal root symbol [default: main]
    #[arg(long)]
    root_func: Option<String>,

    /// Root for module classification and relative paths
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Write the Graphviz description here
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Write the JSON replay payload here
    #[arg(long)]
    replay_json: Option<PathBuf>,

    /// Step metadata to embed in the replay payload
    #[arg(long)]
    steps_json: Option<PathBuf>,

    /// `TRACE|...` log from an instrumented run, embedded as runtime steps
    #[arg(long)]
    trace_log: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-invocation timeout for the binutils collaborators
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Worker threads for address resolution
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Pre-captured `nm` output instead of running nm
    #[arg(long)]
    symbols_listing: Option<PathBuf>,

    /// Pre-captured `objdump -d` output instead of running objdump
    #[arg(long)]
    disassembly_listing: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Replay payload written by `analyze --replay-json`
    #[arg(long)]
    payload: PathBuf,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Playback step interval
    #[arg(long, default_value_t = DEFAULT_INTERVAL.as_millis() as u64)]
    interval_ms: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => analyze(args),
        Commands::Serve(args) => serve(args),
    }
}

fn load_config(args: &AnalyzeArgs) -> AnalyzerConfig {
    let mut config = match args.config.as_deref().map(AnalyzerConfig::load) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            warn!(error = %format!("{:#}", e), "ignoring unreadable config; using defaults");
            AnalyzerConfig::default()
        }
        None => AnalyzerConfig::default(),
    };
    if let Some(tool) = &args.nm_tool {
        config.tools.nm = tool.clone();
    }
    if let Some(tool) = &args.objdump_tool {
        config.tools.objdump = tool.clone();
    }
    if let Some(tool) = &args.addr2line_tool {
        config.tools.addr2line = tool.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.tools.timeout_ms = ms;
    }
    if let Some(root) = &args.root_func {
        config.analysis.root_func = root.clone();
    }
    if let Some(jobs) = args.jobs {
        config.analysis.jobs = jobs.max(1);
    }
    config
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    if !args.binary.is_file() {
        bail!("Binary not found: {}", args.binary.display());
    }
    let config = load_config(&args);

    let mut required = vec![config.tools.addr2line.as_str()];
    if args.symbols_listing.is_none() {
        required.push(config.tools.nm.as_str());
    }
    if args.disassembly_listing.is_none() {
        required.push(config.tools.objdump.as_str());
    }
    Toolchain::check_available(required)?;

    let toolchain = Toolchain::from_config(&config.tools);
    let listings = BinaryListings {
        toolchain: &toolchain,
        binary: args.binary.clone(),
        symbols_file: args.symbols_listing.clone(),
        disassembly_file: args.disassembly_listing.clone(),
    };
    let lookup = toolchain.addr2line(&args.binary);
    let pool = build_resolver_pool(config.analysis.jobs)?;

    let usecase = AnalyzeUsecase {
        listings: &listings,
        lookup: &lookup,
        parser: DisassemblyParser::new(config.disassembly.call_mnemonics.clone()),
        rules: config.classification.clone(),
        pool: pool.as_ref(),
    };

    let binary_name = args
        .binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.binary.display().to_string());
    let analysis = usecase.run(&binary_name, &config.analysis.root_func, args.project_root.clone())?;

    if let Some(tree) = analysis.call_tree() {
        println!("{}", tree);
    }

    if let Some(path) = &args.dot {
        DotExporter.export(&analysis, path)?;
        info!(path = %path.display(), "wrote graph description");
    }
    if let Some(path) = &args.replay_json {
        let steps = args.steps_json.as_deref().map(load_steps).transpose()?;
        let trace = args.trace_log.as_deref().map(load_trace).transpose()?;
        ReplayJsonExporter { steps, trace }.export(&analysis, path)?;
        info!(path = %path.display(), "wrote replay payload");
    }

    println!(
        "Analysis completed: {} reachable functions, {} timeline edges",
        analysis.nodes.len(),
        analysis.timeline.len()
    );
    Ok(())
}

fn serve(args: ServeArgs) -> Result<()> {
    let payload = ReplayPayload::load(&args.payload)?;
    info!(
        binary = %payload.binary,
        root = %payload.root,
        edges = payload.edges.len(),
        "loaded replay payload"
    );
    let server = ReplayServer::bind(
        ("127.0.0.1", args.port),
        payload.into_session(),
        std::time::Duration::from_millis(args.interval_ms),
    )?
    .with_steps(payload.steps_document());
    server.serve()
}
