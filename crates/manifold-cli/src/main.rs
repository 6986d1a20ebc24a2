use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use manifold_core::{PatternId, PatternType, assess, unix_millis_to_iso8601};
use manifold_engine::descriptor::{CollapseParams, CreateParams, EvolveParams};
use manifold_engine::orchestrator::{
    DEFAULT_FIELD_DURATION, DEFAULT_MORPH_DURATION, DEFAULT_MORPH_STEPS,
};
use manifold_engine::{
    CommandDescriptor, CommandFactory, CommandState, InterferenceMode, ManifestKind, Orchestrator,
    RunReport,
};
use manifold_store::{GatewayConfig, PatternGateway, database_path, default_data_dir};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "manifold", about = "Reversible pattern commands over a vector store")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    /// Seed every random draw for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the pattern collection if needed and load it
    Init,

    /// Generate and store one pattern
    Create {
        /// quantum, dream or consciousness
        #[arg(long = "type", default_value = "quantum")]
        pattern_type: String,

        #[arg(long, default_value = "⦿")]
        symbol: String,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        phase: f64,
    },

    /// Evolve a stored pattern into a new one
    Evolve {
        /// Source pattern id
        id: PatternId,

        #[arg(long, default_value_t = 1.0)]
        rate: f64,

        #[arg(long, default_value_t = 1.0)]
        time_scale: f64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        phase: f64,
    },

    /// Superpose stored patterns and collapse onto one of them
    Collapse {
        /// Target pattern ids
        #[arg(required = true)]
        ids: Vec<PatternId>,

        #[arg(long, default_value_t = 1.0)]
        probability: f64,

        #[arg(long, default_value = "⦿")]
        symbol: String,
    },

    /// Show a stored pattern
    Get { id: PatternId },

    /// List stored patterns nearest to a stored pattern
    Search {
        id: PatternId,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Delete a stored pattern
    Delete { id: PatternId },

    /// Show store statistics
    Stats,

    /// Assess the quality of stored vectors
    Quality {
        /// Assess at most this many patterns
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run a JSON file holding an array of command descriptors
    Run { path: PathBuf },

    /// Run a canned manifestation sequence
    Manifest {
        /// particle, neural or code
        kind: String,
    },

    /// Animate a resonance field over the given symbols
    Resonate {
        #[arg(required = true)]
        symbols: Vec<String>,

        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Morph between two stored patterns
    Morph {
        from: PatternId,
        to: PatternId,

        #[arg(long, default_value_t = DEFAULT_MORPH_STEPS)]
        steps: usize,

        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Merge stored patterns constructively or destructively
    Interfere {
        #[arg(required = true)]
        ids: Vec<PatternId>,

        #[arg(long, default_value = "constructive")]
        mode: String,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_gateway() -> Result<(Arc<PatternGateway>, PathBuf)> {
    let data_dir = default_data_dir();
    let config = GatewayConfig::load(&data_dir).context("failed to load configuration")?;
    let gateway = PatternGateway::open(&data_dir, config)
        .with_context(|| format!("failed to open store in {}", data_dir.display()))?;
    Ok((Arc::new(gateway), data_dir))
}

fn orchestrator(cli: &Cli, gateway: Arc<PatternGateway>) -> Orchestrator {
    let factory = match cli.seed {
        Some(seed) => CommandFactory::with_seed(gateway, seed),
        None => CommandFactory::new(gateway),
    };
    let orchestrator = Orchestrator::new(factory);

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
    orchestrator
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (gateway, data_dir) = open_gateway()?;
    match &cli.command {
        Commands::Init => cmd_init(&gateway, &data_dir).await,
        Commands::Create {
            pattern_type,
            symbol,
            phase,
        } => cmd_create(&cli, gateway, pattern_type, symbol, *phase).await,
        Commands::Evolve {
            id,
            rate,
            time_scale,
            phase,
        } => cmd_evolve(&cli, gateway, *id, *rate, *time_scale, *phase).await,
        Commands::Collapse {
            ids,
            probability,
            symbol,
        } => cmd_collapse(&cli, gateway, ids, *probability, symbol).await,
        Commands::Get { id } => cmd_get(&gateway, *id).await,
        Commands::Search { id, top_k } => cmd_search(&cli, &gateway, *id, *top_k).await,
        Commands::Delete { id } => cmd_delete(&gateway, *id).await,
        Commands::Stats => cmd_stats(&cli, &gateway, &data_dir).await,
        Commands::Quality { limit } => cmd_quality(&cli, &gateway, *limit).await,
        Commands::Run { path } => cmd_run(&cli, gateway, path).await,
        Commands::Manifest { kind } => cmd_manifest(&cli, gateway, kind).await,
        Commands::Resonate {
            symbols,
            duration_ms,
        } => cmd_resonate(&cli, gateway, symbols, *duration_ms).await,
        Commands::Morph {
            from,
            to,
            steps,
            duration_ms,
        } => cmd_morph(&cli, gateway, *from, *to, *steps, *duration_ms).await,
        Commands::Interfere { ids, mode } => cmd_interfere(&cli, gateway, ids, mode).await,
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn print_state(cli: &Cli, state: &CommandState) -> Result<()> {
    if cli.json {
        return print_json(state);
    }
    match state.primary_pattern() {
        Some(p) => println!(
            "{}: pattern {} ({} {}) coherence={:.4}",
            state.kind(),
            p.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            p.pattern_type,
            p.symbol,
            p.coherence
        ),
        None => println!("{}: no pattern produced", state.kind()),
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &RunReport) -> Result<()> {
    if cli.json {
        return print_json(report);
    }
    println!(
        "{}: {} command(s), {} pattern(s){} [run {}]",
        report.label,
        report.commands,
        report.pattern_ids.len(),
        if report.cancelled { ", cancelled" } else { "" },
        report.run_id
    );
    Ok(())
}

async fn fetch_vector(gateway: &PatternGateway, id: PatternId) -> Result<Vec<f64>> {
    match gateway
        .get_pattern_by_id(id)
        .await
        .with_context(|| format!("failed to fetch pattern {id}"))?
    {
        Some(pattern) => Ok(pattern.vector),
        None => bail!("pattern {id} not found"),
    }
}

async fn fetch_vectors(gateway: &PatternGateway, ids: &[PatternId]) -> Result<Vec<Vec<f64>>> {
    let mut vectors = Vec::with_capacity(ids.len());
    for &id in ids {
        vectors.push(fetch_vector(gateway, id).await?);
    }
    Ok(vectors)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_init(gateway: &PatternGateway, data_dir: &Path) -> Result<()> {
    gateway
        .initialize()
        .await
        .context("failed to initialize store")?;
    println!(
        "collection '{}' ready at {}",
        gateway.config().collection,
        database_path(data_dir).display()
    );
    Ok(())
}

async fn cmd_create(
    cli: &Cli,
    gateway: Arc<PatternGateway>,
    pattern_type: &str,
    symbol: &str,
    phase: f64,
) -> Result<()> {
    let mut orch = orchestrator(cli, gateway);
    let descriptor = CommandDescriptor::Create(CreateParams {
        pattern_type: Some(pattern_type.to_string()),
        symbol: Some(symbol.to_string()),
        phase: Some(phase),
    });
    let state = orch.execute(&descriptor).await.context("create failed")?;
    print_state(cli, &state)
}

async fn cmd_evolve(
    cli: &Cli,
    gateway: Arc<PatternGateway>,
    id: PatternId,
    rate: f64,
    time_scale: f64,
    phase: f64,
) -> Result<()> {
    let mut orch = orchestrator(cli, gateway);
    let descriptor = CommandDescriptor::Evolve(EvolveParams {
        evolution_rate: Some(rate),
        target_states: Some(Vec::new()),
        symbol: Some(manifold_core::COLLAPSED_SYMBOL.to_string()),
        source_pattern_id: Some(id),
        time_scale: Some(time_scale),
        phase: Some(phase),
    });
    let state = orch.execute(&descriptor).await.context("evolve failed")?;
    print_state(cli, &state)
}

async fn cmd_collapse(
    cli: &Cli,
    gateway: Arc<PatternGateway>,
    ids: &[PatternId],
    probability: f64,
    symbol: &str,
) -> Result<()> {
    let mut targets = fetch_vectors(&gateway, ids).await?;
    let first = targets.remove(0);
    let mut orch = orchestrator(cli, gateway);
    let descriptor = CommandDescriptor::Collapse(CollapseParams {
        collapse_threshold: Some(1.0),
        target_state: Some(first),
        symbol: Some(symbol.to_string()),
        target_states: Some(targets),
        probability: Some(probability),
    });
    let state = orch.execute(&descriptor).await.context("collapse failed")?;
    print_state(cli, &state)
}

async fn cmd_get(gateway: &PatternGateway, id: PatternId) -> Result<()> {
    let pattern = gateway
        .get_pattern_by_id(id)
        .await
        .with_context(|| format!("failed to fetch pattern {id}"))?;
    match pattern {
        Some(pattern) => print_json(&pattern),
        None => bail!("pattern {id} not found"),
    }
}

async fn cmd_search(
    cli: &Cli,
    gateway: &PatternGateway,
    id: PatternId,
    top_k: Option<usize>,
) -> Result<()> {
    let vector = fetch_vector(gateway, id).await?;
    let top_k = top_k.unwrap_or(gateway.config().default_top_k);
    let hits = gateway
        .search_similar(&vector, top_k)
        .await
        .context("search failed")?;

    if cli.json {
        let ids: Vec<_> = hits.iter().filter_map(|p| p.id).collect();
        return print_json(&ids);
    }
    for (rank, p) in hits.iter().enumerate() {
        println!(
            "{:>3}. {:>6}  {:<13} {}",
            rank + 1,
            p.id.unwrap_or_default(),
            p.pattern_type.as_str(),
            p.symbol
        );
    }
    Ok(())
}

async fn cmd_delete(gateway: &PatternGateway, id: PatternId) -> Result<()> {
    gateway
        .delete_pattern(id)
        .await
        .with_context(|| format!("failed to delete pattern {id}"))?;
    println!("deleted {id}");
    Ok(())
}

#[derive(Serialize)]
struct Stats {
    collection: String,
    database: PathBuf,
    patterns: u64,
    by_type: Vec<(PatternType, usize)>,
    newest: Option<String>,
}

async fn cmd_stats(cli: &Cli, gateway: &PatternGateway, data_dir: &Path) -> Result<()> {
    let patterns = gateway.count().await.context("failed to count patterns")?;
    let listed = gateway
        .list_patterns(None)
        .await
        .context("failed to list patterns")?;
    let by_type = PatternType::ALL
        .iter()
        .map(|t| (*t, listed.iter().filter(|p| p.pattern_type == *t).count()))
        .collect();
    let newest = listed
        .iter()
        .filter_map(|p| p.timestamp)
        .max()
        .map(unix_millis_to_iso8601);

    let stats = Stats {
        collection: gateway.config().collection.clone(),
        database: database_path(data_dir),
        patterns,
        by_type,
        newest,
    };
    if cli.json {
        return print_json(&stats);
    }
    println!("collection: {}", stats.collection);
    println!("database:   {}", stats.database.display());
    println!("patterns:   {}", stats.patterns);
    for (t, n) in &stats.by_type {
        println!("  {:<13} {n}", t.as_str());
    }
    if let Some(newest) = &stats.newest {
        println!("newest:     {newest}");
    }
    Ok(())
}

async fn cmd_quality(cli: &Cli, gateway: &PatternGateway, limit: Option<usize>) -> Result<()> {
    let patterns = gateway
        .list_patterns(limit)
        .await
        .context("failed to list patterns")?;
    let vectors: Vec<Vec<f64>> = patterns.into_iter().map(|p| p.vector).collect();
    let Some(report) = assess(&vectors) else {
        println!("no patterns stored");
        return Ok(());
    };
    if cli.json {
        return print_json(&report);
    }
    println!("sample:         {}", report.sample_size);
    println!("normalization:  {:.1}", report.normalization);
    println!("consistency:    {:.1}", report.consistency);
    println!("dimensionality: {}", if report.dimensionality { "ok" } else { "bad" });
    println!("coverage:       {:.1}", report.coverage);
    println!("anomalies:      {}", report.anomalies);
    println!("grade:          {:?}", report.grade);
    for alert in &report.alerts {
        println!("alert: {alert}");
    }
    Ok(())
}

async fn cmd_run(cli: &Cli, gateway: Arc<PatternGateway>, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let sequence = CommandDescriptor::sequence_from_json(&value)
        .with_context(|| format!("invalid sequence in {}", path.display()))?;

    let mut orch = orchestrator(cli, gateway);
    let label = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sequence");
    let report = orch
        .run_sequence(label, &sequence)
        .await
        .context("sequence failed")?;
    print_report(cli, &report)
}

async fn cmd_manifest(cli: &Cli, gateway: Arc<PatternGateway>, kind: &str) -> Result<()> {
    let kind: ManifestKind = kind.parse().map_err(anyhow::Error::msg)?;
    let mut orch = orchestrator(cli, gateway);
    let report = orch
        .manifest(kind, None)
        .await
        .with_context(|| format!("{kind} manifestation failed"))?;
    print_report(cli, &report)
}

async fn cmd_resonate(
    cli: &Cli,
    gateway: Arc<PatternGateway>,
    symbols: &[String],
    duration_ms: Option<u64>,
) -> Result<()> {
    let duration = duration_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_FIELD_DURATION);
    let mut orch = orchestrator(cli, gateway);
    let report = orch
        .resonance_field(symbols, duration)
        .await
        .context("resonance field failed")?;
    print_report(cli, &report)
}

async fn cmd_morph(
    cli: &Cli,
    gateway: Arc<PatternGateway>,
    from: PatternId,
    to: PatternId,
    steps: usize,
    duration_ms: Option<u64>,
) -> Result<()> {
    let source = fetch_vector(&gateway, from).await?;
    let target = fetch_vector(&gateway, to).await?;
    let duration = duration_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_MORPH_DURATION);
    let mut orch = orchestrator(cli, gateway);
    let report = orch
        .morph(&source, &target, steps, duration)
        .await
        .context("morph failed")?;
    print_report(cli, &report)
}

async fn cmd_interfere(
    cli: &Cli,
    gateway: Arc<PatternGateway>,
    ids: &[PatternId],
    mode: &str,
) -> Result<()> {
    let mode: InterferenceMode = mode.parse().map_err(anyhow::Error::msg)?;
    let patterns = fetch_vectors(&gateway, ids).await?;
    let mut orch = orchestrator(cli, gateway);
    let state = orch
        .interference_pattern(patterns, mode)
        .await
        .context("interference failed")?;
    print_state(cli, &state)
}
