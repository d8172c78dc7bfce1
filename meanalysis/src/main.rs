use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rayon::ThreadPoolBuilder;

use mecore::density::registry::{DensityRegistry, DensityTableFile};

use meanalysis::config::Config;
use meanalysis::engine::{ConfigRegistry, NullEngine};
use meanalysis::event::EventInput;
use meanalysis::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "meanalysis")]
#[command(about = "Annotate events and evaluate matrix-element hypotheses")]
struct Args {
    /// Analysis configuration (JSON); built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// b-tag discriminant density tables (JSON)
    #[arg(long)]
    pdfs: PathBuf,

    /// Input events: JSON array of event records
    #[arg(long)]
    events: PathBuf,

    /// Processed events are written here as a JSON array
    #[arg(long)]
    output: Option<PathBuf>,

    /// Worker threads
    #[arg(long, default_value = "4")]
    threads: usize,

    /// Wall-clock budget per event in milliseconds
    #[arg(long)]
    event_budget_ms: Option<u64>,
}

fn main() -> meanalysis::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if args.event_budget_ms.is_some() {
        config.budget.event_budget_ms = args.event_budget_ms;
    }
    if config.mem.calc_me {
        log::warn!("no integration engine linked, running with calc_me = false");
        config.mem.calc_me = false;
    }

    let tables: DensityTableFile = serde_json::from_str(&fs::read_to_string(&args.pdfs)?)?;
    let densities = Arc::new(DensityRegistry::from_file(&tables)?);
    let pipeline = Pipeline::new(config, densities, &ConfigRegistry::standard())?;

    let inputs: Vec<EventInput> = serde_json::from_str(&fs::read_to_string(&args.events)?)?;
    log::info!("read {} events from {}", inputs.len(), args.events.display());

    let pool = ThreadPoolBuilder::new().num_threads(args.threads).build()?;
    let (events, counters) = pool.install(|| pipeline.process_events(inputs, NullEngine::default));

    if let Some(path) = &args.output {
        fs::write(path, serde_json::to_string_pretty(&events)?)?;
        log::info!("wrote {} events to {}", events.len(), path.display());
    }
    let cutflow: Vec<String> = counters
        .groups()
        .filter_map(|(stage, counts)| counts.get("passes").map(|n| format!("{}={}", stage, n)))
        .collect();
    log::info!("events passing each stage: {}", cutflow.join(" "));
    log::info!("{}", counters.summary());
    Ok(())
}
