use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use isc_calculator::{
    calculate_strike_price, report, DataLoader, HubZoneMap, IscEngine, MarketRules, RunParameters,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "isc_calculator")]
#[command(about = "Estimate ERCOT battery reference prices and Index Storage Credits")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute reference prices, revenues and ISCs for one battery
    Run {
        /// Directory holding DAM_Hub_Prices_{year}.csv and DAM_CapPrices{year}.csv
        #[arg(long)]
        data_dir: PathBuf,

        #[command(flatten)]
        battery: BatteryArgs,

        #[command(flatten)]
        rules: RulesArg,

        /// Output format
        #[arg(short, long, value_enum, default_value = "summary")]
        output: OutputFormat,

        /// Directory for CSV tables
        #[arg(long, default_value = "isc_output")]
        output_dir: PathBuf,
    },

    /// Print the strike price breakdown only
    StrikePrice {
        #[command(flatten)]
        battery: BatteryArgs,

        #[command(flatten)]
        rules: RulesArg,
    },

    /// Print the hub zone to county mapping as CSV
    Zones {
        #[command(flatten)]
        rules: RulesArg,
    },
}

#[derive(Args)]
struct BatteryArgs {
    /// Battery duration in hours
    #[arg(short, long)]
    duration: u32,

    /// Battery power in MW
    #[arg(short, long)]
    capacity: f64,
}

#[derive(Args)]
struct RulesArg {
    /// Market rules TOML (defaults to the embedded rules)
    #[arg(long)]
    rules: Option<PathBuf>,
}

impl RulesArg {
    fn load(&self) -> Result<MarketRules> {
        match &self.rules {
            Some(path) => MarketRules::from_file(path)
                .with_context(|| format!("loading market rules from {}", path.display())),
            None => MarketRules::embedded().context("loading embedded market rules"),
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Summary,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            data_dir,
            battery,
            rules,
            output,
            output_dir,
        } => run(&data_dir, &battery, &rules.load()?, output, &output_dir),
        Command::StrikePrice { battery, rules } => {
            let rules = rules.load()?;
            let params = RunParameters::new(battery.duration, battery.capacity);
            let strike = calculate_strike_price(&rules, &params)?;
            println!("{}", serde_json::to_string_pretty(&strike)?);
            Ok(())
        }
        Command::Zones { rules } => {
            let map = HubZoneMap::from_rules(&rules.load()?);
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(["zone", "settlement_point", "county"])?;
            for (zone, point, county) in map.rows() {
                writer.write_record([zone.to_string().as_str(), point, county])?;
            }
            writer.flush()?;
            Ok(())
        }
    }
}

fn run(
    data_dir: &Path,
    battery: &BatteryArgs,
    rules: &MarketRules,
    output: OutputFormat,
    output_dir: &Path,
) -> Result<()> {
    info!("Loading market inputs from {}", data_dir.display());
    let inputs = DataLoader::new(rules.clone())
        .load_market_inputs(data_dir)
        .with_context(|| format!("loading market inputs from {}", data_dir.display()))?;

    let params = RunParameters::new(battery.duration, battery.capacity);
    let engine = IscEngine::new(rules.clone());
    let run = engine.run(&inputs, params)?;

    match output {
        OutputFormat::Json => println!("{}", report::to_json(&run)?),
        OutputFormat::Csv => {
            let written = report::write_csv_tables(&run, rules, output_dir)?;
            for path in written {
                println!("{}", path.display());
            }
        }
        OutputFormat::Summary => print!("{}", report::summary_text(&run, rules)?),
    }

    Ok(())
}
