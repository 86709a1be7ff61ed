use crate::error::{IscError, IscResult};
use crate::models::{HubZone, MonthlySeries, SettlementRecord, WindowRegime, MONTHS_PER_YEAR};
use chrono::{Datelike, Duration, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// REAP for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReap {
    pub month: u32,
    /// Mean arbitrage spread across the month's windows ($/MWh).
    pub value: f64,
    pub window_count: usize,
}

/// Twelve monthly REAP values for one zone and market year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReapSeries {
    pub zone: HubZone,
    pub year: i32,
    pub regime: WindowRegime,
    pub months: Vec<MonthlyReap>,
}

impl ReapSeries {
    pub fn values(&self) -> MonthlySeries {
        MonthlySeries::from_fn(|month| {
            self.months
                .iter()
                .find(|m| m.month == month)
                .map(|m| m.value)
                .unwrap_or_default()
        })
    }
}

/// Top-bottom X hours arbitrage over daily or weekly windows.
pub struct ReapCalculator {
    duration_hours: u32,
    regime: WindowRegime,
}

impl ReapCalculator {
    pub fn new(duration_hours: u32, regime: WindowRegime) -> Self {
        Self {
            duration_hours,
            regime,
        }
    }

    pub fn regime(&self) -> WindowRegime {
        self.regime
    }

    /// Calculate monthly REAP for one zone's settlement series over one market year
    pub fn calculate_year(
        &self,
        zone: HubZone,
        year: i32,
        records: &[SettlementRecord],
    ) -> IscResult<ReapSeries> {
        if records.is_empty() {
            return Err(IscError::EmptyZone { zone, year });
        }

        let mut by_month: BTreeMap<u32, Vec<&SettlementRecord>> = BTreeMap::new();
        for record in records {
            by_month
                .entry(record.delivery_date.month())
                .or_default()
                .push(record);
        }

        let mut months = Vec::with_capacity(MONTHS_PER_YEAR);
        for month in 1..=MONTHS_PER_YEAR as u32 {
            let month_records = by_month.get(&month).ok_or_else(|| IscError::EmptyMonth {
                table: format!("settlement prices for {}", zone),
                year,
                month,
            })?;
            months.push(self.calculate_month(zone, year, month, month_records)?);
        }

        debug!(
            "REAP {} {}: {} regime, {:?}",
            zone,
            year,
            self.regime,
            months.iter().map(|m| m.value).collect::<Vec<_>>()
        );

        Ok(ReapSeries {
            zone,
            year,
            regime: self.regime,
            months,
        })
    }

    fn calculate_month(
        &self,
        zone: HubZone,
        year: i32,
        month: u32,
        records: &[&SettlementRecord],
    ) -> IscResult<MonthlyReap> {
        let windows = self.group_by_window(records);
        let required = 2 * self.duration_hours as usize;

        let mut total_spread = 0.0;
        for (window_start, prices) in &windows {
            if prices.len() < required {
                return Err(IscError::InsufficientWindowData {
                    zone,
                    year,
                    month,
                    window_start: *window_start,
                    available: prices.len(),
                    required,
                });
            }
            total_spread += self.window_spread(prices);
        }

        Ok(MonthlyReap {
            month,
            value: total_spread / windows.len() as f64,
            window_count: windows.len(),
        })
    }

    /// Group a month's prices into windows keyed by the window's first date.
    fn group_by_window(&self, records: &[&SettlementRecord]) -> BTreeMap<NaiveDate, Vec<f64>> {
        let mut windows: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();

        for record in records {
            let key = match self.regime {
                WindowRegime::Daily => record.delivery_date,
                WindowRegime::Weekly => week_start_in_month(record.delivery_date),
            };
            windows.entry(key).or_default().push(record.price);
        }

        windows
    }

    /// Mean spread between the top X and bottom X prices of one window.
    ///
    /// Prices are sorted descending; the first X form the sell set and the
    /// last X, re-sorted ascending, form the buy set. Pair i is
    /// `high[i] - low[i]`. The caller guarantees at least `2 * X` prices.
    pub fn window_spread(&self, prices: &[f64]) -> f64 {
        let x = self.duration_hours as usize;
        if x == 0 {
            return 0.0;
        }

        let mut sorted = prices.to_vec();
        sorted.sort_by(|a, b| b.total_cmp(a));

        let high = &sorted[..x];
        let mut low = sorted[sorted.len() - x..].to_vec();
        low.sort_by(|a, b| a.total_cmp(b));

        let spread: f64 = high.iter().zip(&low).map(|(h, l)| h - l).sum();
        spread / x as f64
    }
}

/// Monday of the ISO week containing `date`, clipped to the first of its month.
fn week_start_in_month(date: NaiveDate) -> NaiveDate {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    let first_of_month = date - Duration::days(date.day0() as i64);
    monday.max(first_of_month)
}
