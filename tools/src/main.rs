//! score-runner: headless scoring runner.
//!
//! Usage:
//!   score-runner --input customers.json --month 6 --db scores.db --export
//!   score-runner --synthetic 2000 --seed 7 --show-plot
//!
//! Input is a JSON array of customer rows (`master_id`, order dates,
//! per-channel order counts and totals, `interested_in_categories_12`).

use anyhow::{Context, Result};
use custscore_core::{
    cltv::CltvSegment,
    config::PipelineConfig,
    customer::{channel_summary, parse_rows, top_by_orders, top_by_value, Customer, CustomerRow},
    engine::{describe_failure, new_run_id, ScoringReport, ScoringEngine},
    population::{generate, PopulationConfig},
    store::ScoreStore,
};
use std::env;
use std::path::Path;
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "./data/pipeline_config.json";

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("score-runner: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config = load_config(flag_value(&args, "--config"))?;
    config.month = parse_arg(&args, "--month", config.month);
    config.optimizer.seed = parse_arg(&args, "--seed", config.optimizer.seed);
    config.export |= args.iter().any(|a| a == "--export");
    config.show_plot |= args.iter().any(|a| a == "--show-plot");
    config.validate()?;

    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let customers = load_customers(&args, config.optimizer.seed)?;

    println!("custscore score-runner");
    println!("  customers: {}", customers.len());
    println!("  month:     {}", config.month);
    println!("  seed:      {}", config.optimizer.seed);
    println!("  db:        {db}");
    println!();

    let store = if db == ":memory:" { ScoreStore::in_memory()? } else { ScoreStore::open(db)? };
    store.migrate()?;

    let run_id = new_run_id();
    let mut engine = ScoringEngine::new(run_id.clone(), config)?;
    engine.attach_store(store)?;

    let report = engine
        .run(&customers)
        .map_err(|e| anyhow::anyhow!("scoring failed at {}", describe_failure(&e)))?;

    print_preparation(&customers);
    print_summary(&engine, &report)?;
    Ok(())
}

fn load_config(path: Option<&str>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p),
        None if Path::new(DEFAULT_CONFIG).exists() => PipelineConfig::load(DEFAULT_CONFIG),
        None => {
            log::warn!("no config file found, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

fn load_customers(args: &[String], seed: u64) -> Result<Vec<Customer>> {
    if let Some(path) = flag_value(args, "--input") {
        let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
        let rows: Vec<CustomerRow> =
            serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;
        return Ok(parse_rows(rows)?);
    }
    let customers = parse_arg(args, "--synthetic", 1000usize);
    log::info!("no --input given, generating {customers} synthetic customers");
    Ok(generate(&PopulationConfig {
        customers,
        seed,
        ..Default::default()
    })?)
}

fn print_preparation(customers: &[Customer]) {
    println!("=== CHANNELS ===");
    for s in channel_summary(customers) {
        println!(
            "  {:<14} customers: {:>6}  orders: {:>7}  value: {:>12.2}",
            s.channel, s.customers, s.orders, s.value
        );
    }
    println!("  top by value:  {}", ids(&top_by_value(customers, 5)));
    println!("  top by orders: {}", ids(&top_by_orders(customers, 5)));
    println!();
}

fn ids(customers: &[&Customer]) -> String {
    customers.iter().map(|c| c.customer_id.as_str()).collect::<Vec<_>>().join(", ")
}

fn print_summary(engine: &ScoringEngine, report: &ScoringReport) -> Result<()> {
    let cltv = &report.cltv;
    let fm = cltv.frequency_model.params();
    let vm = cltv.value_model.params();

    println!("=== CLTV ({}) ===", engine.config().horizon_tag());
    println!("  analysis date:  {}", cltv.analysis_date);
    println!("  modelled:       {}", cltv.records.len());
    println!("  single-order:   {}", cltv.excluded);
    println!("  BG/NBD:         r={:.3} alpha={:.3} a={:.3} b={:.3}", fm.r, fm.alpha, fm.a, fm.b);
    println!("  Gamma-Gamma:    p={:.3} q={:.3} v={:.3}", vm.p, vm.q, vm.v);
    for segment in CltvSegment::ASCENDING.iter().rev() {
        let in_segment: Vec<f64> = cltv
            .records
            .iter()
            .filter(|r| r.segment == Some(*segment))
            .filter_map(|r| r.clv)
            .collect();
        let mean = in_segment.iter().sum::<f64>() / in_segment.len().max(1) as f64;
        println!(
            "  segment {}:      {:>6} customers, mean clv {:>10.2}",
            segment.as_str(),
            in_segment.len(),
            mean
        );
    }
    if let Some(diagnostic) = &cltv.diagnostic {
        println!("  period transactions (observed / simulated):");
        for bin in &diagnostic.bins {
            println!("    {:>3}: {:>6} / {:>6}", bin.label, bin.observed, bin.simulated);
        }
    }

    println!();
    println!("=== RFM ===");
    println!("  customers:      {}", report.rfm.len());
    if let Some(store) = engine.store().filter(|_| engine.config().export) {
        for (segment, count) in store.rfm_segment_counts(&report.run_id)? {
            println!("  {:<20} {count:>6}", segment.as_str());
        }
    } else {
        for (segment, count) in custscore_core::rfm::segment_counts(&report.rfm) {
            println!("  {:<20} {count:>6}", segment.as_str());
        }
    }

    println!();
    println!("=== ACTIONS ===");
    for action in &report.actions {
        println!("  {:<30} {:>6}", action.name, action.customer_ids.len());
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
