use crate::raw_files::{
    discover_raw_files, extract_year_from_filename, file_name, progress_bar, read_raw_file,
    repeated_flag, write_csv, RawCsv,
};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use isc_calculator::data_loader::{parse_delivery_date, parse_hour_ending, settlement_file_name};
use isc_calculator::{HubZone, MarketRules};
use log::warn;
use polars::df;
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct HubPriceRow {
    pub delivery_date: NaiveDate,
    pub hour_ending: u8,
    pub repeated_hour: bool,
    pub settlement_point: String,
    pub price: f64,
}

/// Columns identifying one hourly price; the fall-back day carries two
/// `02:00` rows told apart by the repeated hour flag.
const KEY_COLUMNS: [&str; 4] = ["date_ordinal", "hour", "repeated_flag", "settlement_point"];

#[derive(Debug, Default)]
pub struct HubPriceStats {
    pub files: usize,
    pub failed_files: usize,
    pub rows_kept: usize,
    pub rows_skipped: usize,
    pub duplicates_replaced: usize,
    pub years_written: Vec<i32>,
}

/// Builds the annual `DAM_Hub_Prices_{year}.csv` tables from raw ERCOT DAM
/// settlement point price downloads.
pub struct HubPriceProcessor {
    input_dir: PathBuf,
    output_dir: PathBuf,
    rules: MarketRules,
}

impl HubPriceProcessor {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, rules: MarketRules) -> Self {
        Self {
            input_dir,
            output_dir,
            rules,
        }
    }

    pub fn process(&self) -> Result<HubPriceStats> {
        println!("\n⚡ Processing DAM Hub Prices");
        println!("{}", "=".repeat(60));
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating {}", self.output_dir.display()))?;

        let files = discover_raw_files(&self.input_dir)?;
        let file_years: BTreeSet<i32> = files
            .iter()
            .filter_map(|f| extract_year_from_filename(&file_name(f)))
            .collect();
        println!("📁 Found {} raw files (posting years {:?})", files.len(), file_years);

        let mut stats = HubPriceStats {
            files: files.len(),
            ..Default::default()
        };

        let pb = progress_bar(files.len())?;
        let parsed: Vec<Option<(Vec<HubPriceRow>, usize)>> = files
            .par_iter()
            .map(|file| {
                let result = read_raw_file(file).map(|tables| self.extract_hub_rows(&tables));
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
            let Some((rows, skipped)) = entry else {
                stats.failed_files += 1;
                continue;
            };
            stats.rows_skipped += skipped;
            if !rows.is_empty() {
                lazy_frames.push(hub_frame(&rows)?.lazy());
            }
        }
        if lazy_frames.is_empty() {
            warn!("No hub rows found under {}", self.input_dir.display());
            return Ok(stats);
        }

        // Files are in posting order, so a later posting overwrites an earlier one.
        let combined = concat(lazy_frames.as_slice(), UnionArgs::default())?.collect()?;
        let key_columns: Vec<String> = KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
        let deduped = combined.unique_stable(Some(&key_columns), UniqueKeepStrategy::Last, None)?;
        stats.duplicates_replaced = combined.height() - deduped.height();

        let years: BTreeSet<i32> = deduped.column("year")?.i32()?.into_iter().flatten().collect();
        for year in years {
            let path = self.output_dir.join(settlement_file_name(year));
            let mut year_df = self.year_table(&deduped, year)?;
            write_csv(&path, &mut year_df)?;
            stats.rows_kept += year_df.height();
            stats.years_written.push(year);
            println!("  💾 {}: {} hub rows -> {}", year, year_df.height(), path.display());
        }

        println!(
            "✅ Hub prices complete: {} rows kept, {} non-hub rows skipped, {} duplicates replaced",
            stats.rows_kept, stats.rows_skipped, stats.duplicates_replaced
        );
        Ok(stats)
    }

    /// Hub rows from raw tables, plus the count of rows skipped.
    fn extract_hub_rows(&self, tables: &[RawCsv]) -> (Vec<HubPriceRow>, usize) {
        let mut rows = Vec::new();
        let mut skipped = 0;

        for table in tables {
            let (Some(date_idx), Some(hour_idx), Some(point_idx), Some(price_idx)) = (
                table.column(&["DeliveryDate"]),
                table.column(&["HourEnding", "DeliveryHour"]),
                table.column(&["SettlementPoint", "SettlementPointName"]),
                table.column(&["SettlementPointPrice"]),
            ) else {
                warn!("{}: not a settlement point price table", table.source);
                skipped += table.records.len();
                continue;
            };
            let flag_idx = table.column(&["DSTFlag", "RepeatedHourFlag"]);

            for record in &table.records {
                let point = record.get(point_idx).unwrap_or_default();
                if self.hub_zone(point).is_none() {
                    skipped += 1;
                    continue;
                }

                let parsed = (
                    parse_delivery_date(record.get(date_idx).unwrap_or_default()),
                    parse_hour_ending(record.get(hour_idx).unwrap_or_default()),
                    record.get(price_idx).and_then(|p| p.parse::<f64>().ok()),
                );
                let (Some(delivery_date), Some(hour_ending), Some(price)) = parsed else {
                    warn!("{}: unparseable row {:?}", table.source, record);
                    skipped += 1;
                    continue;
                };

                rows.push(HubPriceRow {
                    delivery_date,
                    hour_ending,
                    repeated_hour: flag_idx
                        .and_then(|i| record.get(i))
                        .map(|f| f.eq_ignore_ascii_case("Y"))
                        .unwrap_or(false),
                    settlement_point: point.to_uppercase(),
                    price,
                });
            }
        }

        (rows, skipped)
    }

    fn hub_zone(&self, settlement_point: &str) -> Option<HubZone> {
        self.rules
            .zones
            .iter()
            .find(|z| z.settlement_point.eq_ignore_ascii_case(settlement_point.trim()))
            .map(|z| z.zone)
    }

    /// One delivery year in hour order, with the configured column names.
    fn year_table(&self, deduped: &DataFrame, year: i32) -> Result<DataFrame> {
        let columns = &self.rules.settlement_columns;
        let table = deduped
            .clone()
            .lazy()
            .filter(col("year").eq(lit(year)))
            .sort_by_exprs(
                KEY_COLUMNS.iter().map(|c| col(*c)).collect::<Vec<_>>(),
                SortMultipleOptions::default(),
            )
            .select([
                col("delivery_date").alias(columns.delivery_date.as_str()),
                col("hour_label").alias(columns.hour_ending.as_str()),
                col("repeated_flag").alias(columns.repeated_hour.as_str()),
                col("settlement_point").alias(columns.settlement_point.as_str()),
                col("price").alias(columns.price.as_str()),
            ])
            .collect()?;
        Ok(table)
    }
}

fn hub_frame(rows: &[HubPriceRow]) -> PolarsResult<DataFrame> {
    df!(
        "year" => rows.iter().map(|r| r.delivery_date.year()).collect::<Vec<i32>>(),
        "date_ordinal" => rows.iter().map(|r| r.delivery_date.num_days_from_ce()).collect::<Vec<i32>>(),
        "hour" => rows.iter().map(|r| r.hour_ending as i32).collect::<Vec<i32>>(),
        "repeated_flag" => rows.iter().map(|r| repeated_flag(r.repeated_hour)).collect::<Vec<&str>>(),
        "settlement_point" => rows.iter().map(|r| r.settlement_point.as_str()).collect::<Vec<&str>>(),
        "delivery_date" => rows.iter().map(|r| r.delivery_date.format("%m/%d/%Y").to_string()).collect::<Vec<String>>(),
        "hour_label" => rows.iter().map(|r| format!("{:02}:00", r.hour_ending)).collect::<Vec<String>>(),
        "price" => rows.iter().map(|r| r.price).collect::<Vec<f64>>(),
    )
}
