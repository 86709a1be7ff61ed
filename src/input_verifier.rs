use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use glob::glob;
use isc_calculator::data_loader::{capacity_file_name, settlement_file_name};
use isc_calculator::models::{CapacityTable, SettlementTable};
use isc_calculator::{DataLoader, HubZone, MarketRules};
use polars::df;
use polars::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneCheck {
    pub zone: HubZone,
    pub records: usize,
    pub duplicate_hours: usize,
    pub short_days: usize,
    pub missing_months: Vec<u32>,
}

impl ZoneCheck {
    pub fn is_clean(&self) -> bool {
        self.records > 0
            && self.duplicate_hours == 0
            && self.short_days == 0
            && self.missing_months.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapacityCheck {
    pub records: usize,
    pub missing_months: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct YearCheck {
    pub year: i32,
    pub zones: Vec<ZoneCheck>,
    pub capacity: Option<CapacityCheck>,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub years: Vec<YearCheck>,
    /// Table files present in the directory for years outside the rules.
    pub unconfigured_files: Vec<PathBuf>,
}

impl VerificationReport {
    pub fn has_errors(&self) -> bool {
        self.years.iter().any(|y| !y.errors.is_empty())
    }

    pub fn warning_count(&self) -> usize {
        self.years
            .iter()
            .map(|y| {
                y.zones.iter().filter(|z| !z.is_clean()).count()
                    + y.capacity
                        .as_ref()
                        .map(|c| usize::from(!c.missing_months.is_empty()))
                        .unwrap_or(0)
            })
            .sum()
    }
}

/// Checks the annual input tables the way the engine will read them.
pub fn verify_inputs(data_dir: &Path, rules: &MarketRules) -> Result<VerificationReport> {
    let loader = DataLoader::new(rules.clone());
    let mut report = VerificationReport::default();

    for &year in &rules.market_years {
        let mut check = YearCheck {
            year,
            ..Default::default()
        };

        match loader.load_settlement_table(&data_dir.join(settlement_file_name(year)), year) {
            Ok(table) => {
                check.zones = HubZone::all()
                    .into_iter()
                    .map(|z| check_zone(&table, z))
                    .collect::<Result<_>>()?
            }
            Err(e) => check.errors.push(e.to_string()),
        }
        match loader.load_capacity_table(&data_dir.join(capacity_file_name(year)), year) {
            Ok(table) => check.capacity = Some(check_capacity(&table)),
            Err(e) => check.errors.push(e.to_string()),
        }
        report.years.push(check);
    }

    let configured: HashSet<PathBuf> = rules
        .market_years
        .iter()
        .flat_map(|&y| [data_dir.join(settlement_file_name(y)), data_dir.join(capacity_file_name(y))])
        .collect();
    for pattern in ["DAM_Hub_Prices_*.csv", "DAM_CapPrices*.csv"] {
        let pattern = data_dir.join(pattern);
        let Some(pattern) = pattern.to_str() else {
            continue;
        };
        for path in glob(pattern)?.filter_map(|p| p.ok()) {
            if !configured.contains(&path) {
                report.unconfigured_files.push(path);
            }
        }
    }

    Ok(report)
}

/// Counts repeated delivery hours and days with fewer hours than the clock
/// allows. The fall-back `02:00` flagged as repeated is a distinct hour.
pub fn check_zone(table: &SettlementTable, zone: HubZone) -> Result<ZoneCheck> {
    let records = table.zone_records(zone);
    let hours = df!(
        "date_ordinal" => records.iter().map(|r| r.delivery_date.num_days_from_ce()).collect::<Vec<i32>>(),
        "hour" => records.iter().map(|r| r.hour_ending as i32).collect::<Vec<i32>>(),
        "repeated_hour" => records.iter().map(|r| r.repeated_hour).collect::<Vec<bool>>(),
        "price" => records.iter().map(|r| r.price).collect::<Vec<f64>>(),
    )?;

    let distinct = hours
        .lazy()
        .group_by([col("date_ordinal"), col("hour"), col("repeated_hour")])
        .agg([col("price").count().alias("count")])
        .collect()?;
    let duplicate_hours = distinct
        .clone()
        .lazy()
        .filter(col("count").gt(lit(1)))
        .select([(col("count").cast(DataType::Int64) - lit(1i64)).sum().alias("extra")])
        .collect()?
        .column("extra")?
        .i64()?
        .get(0)
        .unwrap_or(0) as usize;

    let days = distinct
        .lazy()
        .group_by([col("date_ordinal")])
        .agg([col("hour").count().cast(DataType::Int64).alias("hours")])
        .collect()?;
    let dates = days.column("date_ordinal")?.i32()?;
    let day_hours = days.column("hours")?.i64()?;
    let short_days = dates
        .into_iter()
        .zip(day_hours.into_iter())
        .filter(|(ordinal, hours)| {
            match (ordinal.and_then(NaiveDate::from_num_days_from_ce_opt), hours) {
                (Some(date), Some(hours)) => (*hours as usize) < hours_in_day(date),
                _ => false,
            }
        })
        .count();

    Ok(ZoneCheck {
        zone,
        records: records.len(),
        duplicate_hours,
        short_days,
        missing_months: missing_months(records.iter().map(|r| r.delivery_date)),
    })
}

/// Delivery hours on a Central Prevailing Time date: 23 on the second Sunday
/// of March, 25 on the first Sunday of November.
pub fn hours_in_day(date: NaiveDate) -> usize {
    let sunday = |month, n| NaiveDate::from_weekday_of_month_opt(date.year(), month, Weekday::Sun, n);
    if sunday(3, 2) == Some(date) {
        23
    } else if sunday(11, 1) == Some(date) {
        25
    } else {
        24
    }
}

pub fn check_capacity(table: &CapacityTable) -> CapacityCheck {
    CapacityCheck {
        records: table.records.len(),
        missing_months: missing_months(table.records.iter().map(|r| r.delivery_date)),
    }
}

fn missing_months(dates: impl Iterator<Item = NaiveDate>) -> Vec<u32> {
    let present: BTreeSet<u32> = dates.map(|d| d.month()).collect();
    (1..=12).filter(|m| !present.contains(m)).collect()
}

pub fn print_report(report: &VerificationReport, rules: &MarketRules) {
    println!("\n🔍 Input Table Verification");
    println!("{}", "=".repeat(60));

    for year in &report.years {
        println!("\n📅 {}", year.year);
        for error in &year.errors {
            println!("    ❌ {}", error);
        }
        for zone in &year.zones {
            let status = if zone.is_clean() { "✅" } else { "⚠️ " };
            println!(
                "    {} {:<10} {:>6} records, {} duplicate hours, {} short days, missing months {:?}",
                status,
                rules.display_name(zone.zone),
                zone.records,
                zone.duplicate_hours,
                zone.short_days,
                zone.missing_months
            );
        }
        if let Some(capacity) = &year.capacity {
            let status = if capacity.missing_months.is_empty() { "✅" } else { "⚠️ " };
            println!(
                "    {} Capacity   {:>6} records, missing months {:?}",
                status, capacity.records, capacity.missing_months
            );
        }
    }

    for path in &report.unconfigured_files {
        println!("\n    ℹ️  {} is outside the configured market years", path.display());
    }

    println!("\n{}", "=".repeat(60));
    if report.has_errors() {
        println!("❌ Verification failed: schema errors found");
    } else if report.warning_count() == 0 {
        println!("✅ Input verification passed! No issues found.");
    } else {
        println!("⚠️  Input verification found {} issues", report.warning_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_year(dir: &Path, year: i32, skip_zone: Option<&str>, months: u32) {
        let mut hub = fs::File::create(dir.join(settlement_file_name(year))).unwrap();
        writeln!(hub, "Delivery Date,Hour Ending,Settlement Point,Settlement Point Price").unwrap();
        let mut caps = fs::File::create(dir.join(capacity_file_name(year))).unwrap();
        writeln!(caps, "Delivery Date,Hour Ending,REGDN,REGUP,RRS,NSPIN").unwrap();

        for month in 1..=months {
            let date = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
            let stamp = date.format("%m/%d/%Y");
            for hour in 1..=24 {
                for point in ["HB_HOUSTON", "HB_NORTH", "HB_PAN", "HB_SOUTH", "HB_WEST"] {
                    if Some(point) == skip_zone {
                        continue;
                    }
                    writeln!(hub, "{},{:02}:00,{},25.0", stamp, hour, point).unwrap();
                }
                writeln!(caps, "{},{:02}:00,1,2,3,4", stamp, hour).unwrap();
            }
        }
    }

    #[test]
    fn test_clean_inputs_pass() {
        let dir = tempfile::tempdir().unwrap();
        let rules = MarketRules::embedded().unwrap();
        for year in [2022, 2023, 2024] {
            write_year(dir.path(), year, None, 12);
        }

        let report = verify_inputs(dir.path(), &rules).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.warning_count(), 0);
        assert!(report.unconfigured_files.is_empty());
    }

    #[test]
    fn test_gaps_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let rules = MarketRules::embedded().unwrap();
        write_year(dir.path(), 2022, Some("HB_PAN"), 12);
        write_year(dir.path(), 2023, None, 11);
        write_year(dir.path(), 2021, None, 1);

        let report = verify_inputs(dir.path(), &rules).unwrap();
        // 2024 files are missing entirely.
        assert!(report.has_errors());

        let pan = &report.years[0].zones[2];
        assert_eq!(pan.zone, HubZone::Pan);
        assert_eq!(pan.records, 0);
        assert_eq!(pan.missing_months.len(), 12);

        let capacity_2023 = report.years[1].capacity.as_ref().unwrap();
        assert_eq!(capacity_2023.missing_months, vec![12]);
        assert_eq!(report.unconfigured_files.len(), 2);
    }

    #[test]
    fn test_duplicate_and_short_days() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.csv");
        fs::write(
            &path,
            "Delivery Date,Hour Ending,Settlement Point,Settlement Point Price\n\
             03/13/2023,01:00,HB_NORTH,1\n\
             03/13/2023,01:00,HB_NORTH,2\n\
             03/13/2023,03:00,HB_NORTH,3\n",
        )
        .unwrap();
        let table = DataLoader::new(MarketRules::embedded().unwrap())
            .load_settlement_table(&path, 2023)
            .unwrap();

        let check = check_zone(&table, HubZone::North).unwrap();
        assert_eq!(check.records, 3);
        assert_eq!(check.duplicate_hours, 1);
        assert_eq!(check.short_days, 1);
        assert_eq!(check.missing_months.len(), 11);
        assert!(!check.is_clean());
    }

    fn dst_table(dir: &Path, with_repeated_hour: bool) -> SettlementTable {
        let path = dir.join("hub.csv");
        let mut hub = fs::File::create(&path).unwrap();
        writeln!(
            hub,
            "Delivery Date,Hour Ending,Repeated Hour Flag,Settlement Point,Settlement Point Price"
        )
        .unwrap();
        // Spring forward: hour ending 03:00 never happens.
        for hour in (1..=24).filter(|h| *h != 3) {
            writeln!(hub, "03/12/2023,{:02}:00,N,HB_NORTH,20.0", hour).unwrap();
        }
        for hour in 1..=24 {
            writeln!(hub, "11/05/2023,{:02}:00,N,HB_NORTH,20.0", hour).unwrap();
            if hour == 2 && with_repeated_hour {
                writeln!(hub, "11/05/2023,02:00,Y,HB_NORTH,21.0").unwrap();
            }
        }
        drop(hub);
        DataLoader::new(MarketRules::embedded().unwrap())
            .load_settlement_table(&path, 2023)
            .unwrap()
    }

    #[test]
    fn test_dst_days_are_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_zone(&dst_table(dir.path(), true), HubZone::North).unwrap();
        assert_eq!(check.records, 23 + 25);
        assert_eq!(check.duplicate_hours, 0);
        assert_eq!(check.short_days, 0);
    }

    #[test]
    fn test_fall_back_day_without_repeated_hour_is_short() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_zone(&dst_table(dir.path(), false), HubZone::North).unwrap();
        assert_eq!(check.duplicate_hours, 0);
        assert_eq!(check.short_days, 1);
    }

    #[test]
    fn test_hours_in_day() {
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        assert_eq!(hours_in_day(day(3, 10)), 23);
        assert_eq!(hours_in_day(day(11, 3)), 25);
        assert_eq!(hours_in_day(day(3, 3)), 24);
        assert_eq!(hours_in_day(day(7, 4)), 24);
    }
}
