use crate::raw_files::{
    discover_raw_files, progress_bar, read_raw_file, repeated_flag, write_csv, RawCsv,
};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use isc_calculator::data_loader::{capacity_file_name, parse_delivery_date, parse_hour_ending};
use isc_calculator::models::ServiceCategory;
use isc_calculator::MarketRules;
use log::warn;
use polars::df;
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// ERCOT ancillary type codes in output column order.
const SERVICE_CODES: [(&str, ServiceCategory); 4] = [
    ("REGDN", ServiceCategory::RegDown),
    ("REGUP", ServiceCategory::RegUp),
    ("RRS", ServiceCategory::Rrs),
    ("NSPIN", ServiceCategory::NonSpin),
];

const HOUR_COLUMNS: [&str; 6] = [
    "year",
    "date_ordinal",
    "hour",
    "repeated_flag",
    "delivery_date",
    "hour_label",
];

#[derive(Debug, Clone, PartialEq)]
struct McpcRow {
    delivery_date: NaiveDate,
    hour_ending: u8,
    repeated_hour: bool,
    service: usize,
    price: f64,
}

#[derive(Debug, Default)]
pub struct CapacityPriceStats {
    pub files: usize,
    pub failed_files: usize,
    pub hours_written: usize,
    pub incomplete_hours: usize,
    pub other_services_skipped: usize,
    pub years_written: Vec<i32>,
}

/// Pivots DAM ancillary service clearing prices (one row per hour and
/// service) into the wide annual `DAM_CapPrices{year}.csv` tables.
pub struct CapacityPriceProcessor {
    input_dir: PathBuf,
    output_dir: PathBuf,
    rules: MarketRules,
}

impl CapacityPriceProcessor {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, rules: MarketRules) -> Self {
        Self {
            input_dir,
            output_dir,
            rules,
        }
    }

    pub fn process(&self) -> Result<CapacityPriceStats> {
        println!("\n⚡ Processing DAM Ancillary Capacity Prices");
        println!("{}", "=".repeat(60));
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating {}", self.output_dir.display()))?;

        let files = discover_raw_files(&self.input_dir)?;
        println!("📁 Found {} raw files", files.len());
        let mut stats = CapacityPriceStats {
            files: files.len(),
            ..Default::default()
        };

        let pb = progress_bar(files.len())?;
        let parsed: Vec<Option<(Vec<McpcRow>, usize)>> = files
            .par_iter()
            .map(|file| {
                let result = read_raw_file(file).map(|tables| extract_mcpc_rows(&tables));
                pb.inc(1);
                match result {
                    Ok(rows) => Some(rows),
                    Err(e) => {
                        warn!("Skipping {:?}: {:#}", file, e);
                        None
                    }
                }
            })
            .collect();
        pb.finish_with_message("Files loaded");

        let mut lazy_frames = Vec::new();
        for entry in parsed {
            let Some((rows, other)) = entry else {
                stats.failed_files += 1;
                continue;
            };
            stats.other_services_skipped += other;
            if !rows.is_empty() {
                lazy_frames.push(mcpc_frame(&rows)?.lazy());
            }
        }
        if lazy_frames.is_empty() {
            warn!("No capacity prices found under {}", self.input_dir.display());
            return Ok(stats);
        }

        // Later postings win for the same hour and service.
        let combined = concat(lazy_frames.as_slice(), UnionArgs::default())?.collect()?;
        let key_columns: Vec<String> = ["date_ordinal", "hour", "repeated_flag", "service"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let long = combined.unique_stable(Some(&key_columns), UniqueKeepStrategy::Last, None)?;
        let wide = self.pivot_services(long)?;

        let years: BTreeSet<i32> = wide.column("year")?.i32()?.into_iter().flatten().collect();
        for year in years {
            let path = self.output_dir.join(capacity_file_name(year));
            let (mut table, incomplete) = self.year_table(&wide, year)?;
            write_csv(&path, &mut table)?;
            stats.hours_written += table.height();
            stats.incomplete_hours += incomplete;
            stats.years_written.push(year);
            if incomplete > 0 {
                warn!("{}: dropped {} hours missing a service price", year, incomplete);
            }
            println!("  💾 {}: {} hours -> {}", year, table.height(), path.display());
        }

        println!(
            "✅ Capacity prices complete: {} hours written, {} rows of other services skipped",
            stats.hours_written, stats.other_services_skipped
        );
        Ok(stats)
    }

    /// One row per delivery hour with a column per service. A service with
    /// no posted price for the hour is null.
    fn pivot_services(&self, long: DataFrame) -> Result<DataFrame> {
        let service_prices: Vec<Expr> = SERVICE_CODES
            .iter()
            .zip(self.service_columns())
            .map(|((code, _), name)| {
                col("mcpc")
                    .filter(col("service").eq(lit(*code)))
                    .first()
                    .alias(name)
            })
            .collect();
        let wide = long
            .lazy()
            .group_by(HOUR_COLUMNS.iter().map(|c| col(*c)).collect::<Vec<_>>())
            .agg(service_prices)
            .collect()?;
        Ok(wide)
    }

    /// Complete hours of one delivery year in hour order, plus the count of
    /// hours dropped for a missing service.
    fn year_table(&self, wide: &DataFrame, year: i32) -> Result<(DataFrame, usize)> {
        let columns = &self.rules.capacity_columns;
        let year_hours = wide.clone().lazy().filter(col("year").eq(lit(year)));
        let hours = year_hours.clone().collect()?.height();

        let complete = self
            .service_columns()
            .into_iter()
            .map(|name| col(name).is_not_null())
            .reduce(|acc, e| acc.and(e))
            .unwrap_or_else(|| lit(true));

        let mut selected = vec![
            col("delivery_date").alias(columns.delivery_date.as_str()),
            col("hour_label").alias(columns.hour_ending.as_str()),
        ];
        selected.extend(self.service_columns().into_iter().map(col));

        let table = year_hours
            .filter(complete)
            .sort_by_exprs(
                vec![col("date_ordinal"), col("hour"), col("repeated_flag")],
                SortMultipleOptions::default(),
            )
            .select(selected)
            .collect()?;
        let incomplete = hours - table.height();
        Ok((table, incomplete))
    }

    fn service_columns(&self) -> [&str; 4] {
        let columns = &self.rules.capacity_columns;
        [
            columns.reg_down.as_str(),
            columns.reg_up.as_str(),
            columns.rrs.as_str(),
            columns.non_spin.as_str(),
        ]
    }
}

fn mcpc_frame(rows: &[McpcRow]) -> PolarsResult<DataFrame> {
    df!(
        "year" => rows.iter().map(|r| r.delivery_date.year()).collect::<Vec<i32>>(),
        "date_ordinal" => rows.iter().map(|r| r.delivery_date.num_days_from_ce()).collect::<Vec<i32>>(),
        "hour" => rows.iter().map(|r| r.hour_ending as i32).collect::<Vec<i32>>(),
        "repeated_flag" => rows.iter().map(|r| repeated_flag(r.repeated_hour)).collect::<Vec<&str>>(),
        "delivery_date" => rows.iter().map(|r| r.delivery_date.format("%m/%d/%Y").to_string()).collect::<Vec<String>>(),
        "hour_label" => rows.iter().map(|r| format!("{:02}:00", r.hour_ending)).collect::<Vec<String>>(),
        "service" => rows.iter().map(|r| SERVICE_CODES[r.service].0).collect::<Vec<&str>>(),
        "mcpc" => rows.iter().map(|r| r.price).collect::<Vec<f64>>(),
    )
}

/// MCPC rows for the four services, plus the count of rows for other
/// ancillary types (ECRS and the like).
fn extract_mcpc_rows(tables: &[RawCsv]) -> (Vec<McpcRow>, usize) {
    let mut rows = Vec::new();
    let mut other = 0;

    for table in tables {
        let (Some(date_idx), Some(hour_idx), Some(type_idx), Some(price_idx)) = (
            table.column(&["DeliveryDate"]),
            table.column(&["HourEnding"]),
            table.column(&["AncillaryType"]),
            table.column(&["MCPC"]),
        ) else {
            warn!("{}: not an ancillary clearing price table", table.source);
            continue;
        };
        let flag_idx = table.column(&["DSTFlag", "RepeatedHourFlag"]);

        for record in &table.records {
            let code = record.get(type_idx).unwrap_or_default().trim().to_uppercase();
            let Some(service) = SERVICE_CODES.iter().position(|(c, _)| *c == code) else {
                other += 1;
                continue;
            };

            let parsed = (
                parse_delivery_date(record.get(date_idx).unwrap_or_default()),
                parse_hour_ending(record.get(hour_idx).unwrap_or_default()),
                record.get(price_idx).and_then(|p| p.parse::<f64>().ok()),
            );
            let (Some(delivery_date), Some(hour_ending), Some(price)) = parsed else {
                warn!(
                    "{}: unparseable {} row {:?}",
                    table.source, SERVICE_CODES[service].1, record
                );
                continue;
            };

            rows.push(McpcRow {
                delivery_date,
                hour_ending,
                repeated_hour: flag_idx
                    .and_then(|i| record.get(i))
                    .map(|f| f.eq_ignore_ascii_case("Y"))
                    .unwrap_or(false),
                service,
                price,
            });
        }
    }

    (rows, other)
}
