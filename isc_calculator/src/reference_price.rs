use crate::config::MarketRules;
use crate::error::{IscError, IscResult};
use crate::models::{HubZone, MonthlySeries, ZoneTable};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// RCP, REAP and their sum for one market year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearReferencePrices {
    pub year: i32,
    pub rcp: MonthlySeries,
    pub reap: ZoneTable,
    pub reference: ZoneTable,
}

impl YearReferencePrices {
    /// Reference price = RCP + REAP, zone by zone. RCP is a separate revenue
    /// stream stacked on top of arbitrage.
    pub fn combine(year: i32, rcp: MonthlySeries, reap: ZoneTable) -> Self {
        let reference = reap
            .iter()
            .map(|(zone, series)| (*zone, rcp.zip_with(series, |c, r| c + r)))
            .collect();
        Self {
            year,
            rcp,
            reap,
            reference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedValue {
    pub original: f64,
    pub replacement: f64,
}

/// Record of the fixed outlier correction applied to the middle year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierAdjustmentRecord {
    pub year: i32,
    pub month: u32,
    pub source_years: [i32; 2],
    pub zones: BTreeMap<HubZone, AdjustedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePriceSummary {
    pub years: Vec<YearReferencePrices>,
    pub adjustment: OutlierAdjustmentRecord,
    /// Middle-year reference prices after the outlier correction.
    pub adjusted_year: ZoneTable,
    /// Mean of the three years, using the corrected middle year.
    pub test_year: ZoneTable,
}

pub struct ReferencePriceAggregator<'a> {
    rules: &'a MarketRules,
}

impl<'a> ReferencePriceAggregator<'a> {
    pub fn new(rules: &'a MarketRules) -> Self {
        Self { rules }
    }

    pub fn aggregate(&self, years: Vec<YearReferencePrices>) -> IscResult<ReferencePriceSummary> {
        let lookup = |year: i32| -> IscResult<&YearReferencePrices> {
            years.iter().find(|y| y.year == year).ok_or_else(|| {
                IscError::MarketYears(format!("reference prices for {} were not computed", year))
            })
        };
        let first = lookup(self.rules.first_year())?;
        let middle = lookup(self.rules.middle_year())?;
        let last = lookup(self.rules.last_year())?;

        let (adjustment, adjusted_year) = self.adjust_outlier(first, middle, last)?;

        let mut test_year = ZoneTable::new();
        for zone in HubZone::all() {
            let (a, b, c) = (
                zone_series(first, zone)?,
                &adjusted_year[&zone],
                zone_series(last, zone)?,
            );
            let mean = a.zip_with(b, |x, y| x + y).zip_with(c, |sum, z| (sum + z) / 3.0);
            test_year.insert(zone, mean);
        }

        info!(
            "Test year built from {}-{} with {}-{:02} adjusted",
            first.year, last.year, adjustment.year, adjustment.month
        );

        Ok(ReferencePriceSummary {
            years,
            adjustment,
            adjusted_year,
            test_year,
        })
    }

    /// Replace every zone's value for the adjusted month of the middle year
    /// with the mean of the first and last years' values. Applied
    /// unconditionally.
    fn adjust_outlier(
        &self,
        first: &YearReferencePrices,
        middle: &YearReferencePrices,
        last: &YearReferencePrices,
    ) -> IscResult<(OutlierAdjustmentRecord, ZoneTable)> {
        let month = self.rules.outlier_adjustment.month;
        let mut adjusted = middle.reference.clone();
        let mut zones = BTreeMap::new();

        let value_in = |series: &MonthlySeries| series.get(month).ok_or(IscError::InvalidMonth(month));

        for zone in HubZone::all() {
            let replacement =
                (value_in(zone_series(first, zone)?)? + value_in(zone_series(last, zone)?)?) / 2.0;
            let series = adjusted.get_mut(&zone).ok_or(IscError::EmptyZone {
                zone,
                year: middle.year,
            })?;
            zones.insert(
                zone,
                AdjustedValue {
                    original: value_in(series)?,
                    replacement,
                },
            );
            series.set(month, replacement)?;
        }

        let record = OutlierAdjustmentRecord {
            year: middle.year,
            month,
            source_years: [first.year, last.year],
            zones,
        };
        Ok((record, adjusted))
    }
}

fn zone_series(year: &YearReferencePrices, zone: HubZone) -> IscResult<&MonthlySeries> {
    year.reference.get(&zone).ok_or(IscError::EmptyZone {
        zone,
        year: year.year,
    })
}
