use anyhow::{Context, Result};
use isc_calculator::MarketRules;
use std::path::PathBuf;

mod capacity_price_processor;
mod hub_price_processor;
mod input_verifier;
mod raw_files;

use capacity_price_processor::CapacityPriceProcessor;
use hub_price_processor::HubPriceProcessor;

const DEFAULT_OUTPUT_DIR: &str = "data";

fn print_usage() {
    println!("Usage:");
    println!("  hub_price_processor --hub-prices <raw_dir> [out_dir]");
    println!("  hub_price_processor --capacity-prices <raw_dir> [out_dir]");
    println!("  hub_price_processor --verify <data_dir>");
    println!();
    println!("Set ISC_RULES=<market_rules.toml> to override the embedded market rules.");
}

fn load_rules() -> Result<MarketRules> {
    match std::env::var_os("ISC_RULES") {
        Some(path) => {
            let path = PathBuf::from(path);
            MarketRules::from_file(&path)
                .with_context(|| format!("loading market rules from {}", path.display()))
        }
        None => MarketRules::embedded().context("loading embedded market rules"),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()
        .context("configuring rayon thread pool")?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        return Ok(());
    }

    let rules = load_rules()?;
    let input_dir = PathBuf::from(&args[2]);
    let output_dir = PathBuf::from(args.get(3).map(String::as_str).unwrap_or(DEFAULT_OUTPUT_DIR));

    println!("🚀 ERCOT Hub Price Processor (market rules {})", rules.version);
    println!("Using {} CPU cores", num_cpus::get());
    let start = std::time::Instant::now();

    match args[1].as_str() {
        "--hub-prices" => {
            HubPriceProcessor::new(input_dir, output_dir, rules).process()?;
        }
        "--capacity-prices" => {
            CapacityPriceProcessor::new(input_dir, output_dir, rules).process()?;
        }
        "--verify" => {
            let report = input_verifier::verify_inputs(&input_dir, &rules)?;
            input_verifier::print_report(&report, &rules);
            if report.has_errors() {
                anyhow::bail!("input tables in {} failed verification", input_dir.display());
            }
        }
        other => {
            println!("Unknown mode: {}", other);
            print_usage();
            return Ok(());
        }
    }

    println!("\n✅ Done in {:?}", start.elapsed());
    Ok(())
}
