use crate::config::MarketRules;
use crate::engine::IscRun;
use crate::models::{HubZone, MonthlySeries, ZoneTable, MONTH_NAMES};
use anyhow::{Context, Result};
use csv::Writer;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

pub const REFERENCE_REVENUE_ROW: &str = "Annual Reference Revenues ($)";
pub const STRIKE_REVENUE_ROW: &str = "Annual Strike Price Revenues ($)";
pub const ISC_ROW: &str = "Index Storage Credits";

/// Write every run table as CSV into `dir`. Returns the paths written.
pub fn write_csv_tables(run: &IscRun, rules: &MarketRules, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let mut written = Vec::new();
    for year in &run.years {
        let path = dir.join(format!("reference_prices_{}.csv", year.year));
        write_zone_table(&path, rules, &year.reference, None)?;
        written.push(path);
    }

    let path = dir.join(format!("reference_prices_{}_adjusted.csv", run.adjustment.year));
    write_zone_table(&path, rules, &run.adjusted_year, None)?;
    written.push(path);

    let path = dir.join("test_year_reference_prices.csv");
    write_zone_table(&path, rules, &run.test_year, None)?;
    written.push(path);

    let path = dir.join("monthly_revenues.csv");
    write_zone_table(
        &path,
        rules,
        &run.projection.reference,
        Some(("Strike Price", &run.projection.strike)),
    )?;
    written.push(path);

    let path = dir.join("isc_summary.csv");
    write_isc_summary(&path, run, rules)?;
    written.push(path);

    Ok(written)
}

/// Month rows, one column per zone display name.
fn write_zone_table(
    path: &Path,
    rules: &MarketRules,
    table: &ZoneTable,
    extra: Option<(&str, &MonthlySeries)>,
) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["Month".to_string()];
    header.extend(table.keys().map(|zone| rules.display_name(*zone)));
    if let Some((name, _)) = extra {
        header.push(name.to_string());
    }
    writer.write_record(&header)?;

    for (idx, month) in MONTH_NAMES.iter().enumerate() {
        let mut row = vec![month.to_string()];
        row.extend(table.values().map(|s| format!("{:.2}", s.values()[idx])));
        if let Some((_, series)) = extra {
            row.push(format!("{:.2}", series.values()[idx]));
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_isc_summary(path: &Path, run: &IscRun, rules: &MarketRules) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec![String::new()];
    header.extend(run.results.iter().map(|r| rules.display_name(r.zone)));
    writer.write_record(&header)?;

    let rows: [(&str, fn(&crate::revenue::ZoneIsc) -> f64); 3] = [
        (REFERENCE_REVENUE_ROW, |r| r.annual_reference_revenue),
        (STRIKE_REVENUE_ROW, |r| r.annual_strike_revenue),
        (ISC_ROW, |r| r.isc),
    ];
    for (label, value) in rows {
        let mut row = vec![label.to_string()];
        row.extend(run.results.iter().map(|r| format!("{:.2}", value(r))));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn to_json(run: &IscRun) -> Result<String> {
    Ok(serde_json::to_string_pretty(run)?)
}

/// Human-readable run summary.
pub fn summary_text(run: &IscRun, rules: &MarketRules) -> Result<String, fmt::Error> {
    let name = |zone: HubZone| rules.display_name(zone);
    let mut out = String::new();
    let adjusted_month = run
        .adjustment
        .month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .copied()
        .unwrap_or("?");

    writeln!(out, "Index Storage Credit Summary")?;
    writeln!(out, "============================")?;
    writeln!(out, "Market rules: {}", run.rules_version)?;
    writeln!(
        out,
        "Battery: {} MW / {} h ({:.0} MWh per event, {} windows)",
        run.params.capacity_mw,
        run.params.duration_hours,
        run.params.energy_mwh(),
        run.regime
    )?;
    writeln!(
        out,
        "Test year: {}-{} with {} {} replaced by the mean of {} and {}",
        run.years.first().map(|y| y.year).unwrap_or_default(),
        run.years.last().map(|y| y.year).unwrap_or_default(),
        adjusted_month,
        run.adjustment.year,
        run.adjustment.source_years[0],
        run.adjustment.source_years[1]
    )?;
    writeln!(out)?;
    writeln!(out, "Strike price (CONE)")?;
    writeln!(out, "  Capital cost:           ${:.2}/kW", run.strike.capital_cost_per_kw)?;
    writeln!(out, "  Total capital cost:     ${:.2}", run.strike.total_capital_cost)?;
    writeln!(out, "  Annual revenue needed:  ${:.2}", run.strike.annual_revenue_needed)?;
    writeln!(out, "  Strike price:           ${:.2}/MWh", run.strike.value)?;
    writeln!(out)?;
    writeln!(
        out,
        "{:<12} {:>18} {:>18} {:>18}",
        "Zone", "Reference ($)", "Strike ($)", "ISC ($)"
    )?;
    for result in &run.results {
        writeln!(
            out,
            "{:<12} {:>18.2} {:>18.2} {:>18.2}",
            name(result.zone),
            result.annual_reference_revenue,
            result.annual_strike_revenue,
            result.isc
        )?;
    }
    writeln!(out)?;
    if let Some(zone) = run.max_zone {
        writeln!(out, "Highest reference revenues: {}", name(zone))?;
    }
    writeln!(out, "{}", run.outcome.message(name))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunParameters, WindowRegime};
    use crate::reference_price::{AdjustedValue, OutlierAdjustmentRecord, YearReferencePrices};
    use crate::revenue::{classify, compute_isc, RevenueComparator};
    use crate::strike_price::calculate_strike_price;
    use std::collections::BTreeMap;

    fn flat_table(value: f64) -> ZoneTable {
        HubZone::all()
            .into_iter()
            .map(|z| (z, MonthlySeries::from_fn(|_| value + z as u32 as f64)))
            .collect()
    }

    fn sample_run(rules: &MarketRules) -> IscRun {
        let params = RunParameters::new(4, 10.0);
        let strike = calculate_strike_price(rules, &params).unwrap();
        let test_year = flat_table(60.0);
        let projection = RevenueComparator::new(rules).project(&params, &test_year, &strike);
        let results = compute_isc(&projection);
        let classification = classify(&results);
        let years = rules
            .market_years
            .iter()
            .map(|&y| YearReferencePrices::combine(y, MonthlySeries::from_fn(|_| 5.0), flat_table(50.0)))
            .collect();
        let zones: BTreeMap<HubZone, AdjustedValue> = HubZone::all()
            .into_iter()
            .map(|z| (z, AdjustedValue { original: 90.0, replacement: 55.0 }))
            .collect();

        IscRun {
            rules_version: rules.version.clone(),
            params,
            regime: WindowRegime::Daily,
            years,
            adjustment: OutlierAdjustmentRecord {
                year: 2023,
                month: 8,
                source_years: [2022, 2024],
                zones,
            },
            adjusted_year: flat_table(55.0),
            test_year,
            strike,
            projection,
            results,
            max_zone: classification.max_zone,
            descending: classification.descending,
            sufficient: classification.sufficient,
            outcome: classification.outcome,
        }
    }

    #[test]
    fn test_write_csv_tables() {
        let rules = MarketRules::embedded().unwrap();
        let run = sample_run(&rules);
        let dir = tempfile::tempdir().unwrap();

        let written = write_csv_tables(&run, &rules, dir.path()).unwrap();
        assert_eq!(written.len(), 7);
        assert!(dir.path().join("reference_prices_2022.csv").exists());
        assert!(dir.path().join("reference_prices_2023_adjusted.csv").exists());

        let summary = std::fs::read_to_string(dir.path().join("isc_summary.csv")).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], ",Houston,North,Panhandle,South,West");
        assert!(lines[1].starts_with(REFERENCE_REVENUE_ROW));
        assert!(lines[3].starts_with(ISC_ROW));
        assert_eq!(lines.len(), 4);

        let test_year =
            std::fs::read_to_string(dir.path().join("test_year_reference_prices.csv")).unwrap();
        let lines: Vec<&str> = test_year.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[1], "Jan,60.00,61.00,62.00,63.00,64.00");

        let revenues = std::fs::read_to_string(dir.path().join("monthly_revenues.csv")).unwrap();
        assert!(revenues.lines().next().unwrap().ends_with(",Strike Price"));
    }

    #[test]
    fn test_summary_and_json() {
        let rules = MarketRules::embedded().unwrap();
        let run = sample_run(&rules);

        let text = summary_text(&run, &rules).unwrap();
        assert!(text.contains("Strike price:"));
        assert!(text.contains("Panhandle"));
        assert!(text.contains("Aug 2023"));

        let json: serde_json::Value = serde_json::from_str(&to_json(&run).unwrap()).unwrap();
        assert_eq!(json["params"]["duration_hours"], 4);
        assert_eq!(json["results"].as_array().unwrap().len(), 5);
        assert!(json["outcome"]["kind"].is_string());
    }
}
