use crate::error::{IscError, IscResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

pub const MONTHS_PER_YEAR: usize = 12;

pub const MONTH_NAMES: [&str; MONTHS_PER_YEAR] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// ERCOT hub zones. Declaration order is the canonical column order of every table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum HubZone {
    Hou,
    North,
    Pan,
    South,
    West,
}

impl HubZone {
    pub fn all() -> Vec<HubZone> {
        HubZone::iter().collect()
    }
}

/// Ancillary services whose day-ahead capacity prices make up the RCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum ServiceCategory {
    #[strum(serialize = "REG-DOWN")]
    RegDown,
    #[strum(serialize = "REG-UP")]
    RegUp,
    #[strum(serialize = "RRS")]
    Rrs,
    #[strum(serialize = "NON-SPIN")]
    NonSpin,
}

/// One hourly day-ahead settlement price at a hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub delivery_date: NaiveDate,
    pub hour_ending: u8,
    /// True for the second `02:00` on the fall-back day.
    #[serde(default)]
    pub repeated_hour: bool,
    pub zone: HubZone,
    pub price: f64,
}

/// One row of day-ahead ancillary capacity clearing prices ($/MW per hour).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityPriceRecord {
    pub delivery_date: NaiveDate,
    pub hour_ending: Option<u8>,
    pub reg_down: f64,
    pub reg_up: f64,
    pub rrs: f64,
    pub non_spin: f64,
}

impl CapacityPriceRecord {
    pub fn price(&self, category: ServiceCategory) -> f64 {
        match category {
            ServiceCategory::RegDown => self.reg_down,
            ServiceCategory::RegUp => self.reg_up,
            ServiceCategory::Rrs => self.rrs,
            ServiceCategory::NonSpin => self.non_spin,
        }
    }

    /// Mean across the four service categories.
    pub fn average(&self) -> f64 {
        let total: f64 = ServiceCategory::iter().map(|c| self.price(c)).sum();
        total / 4.0
    }
}

/// Twelve monthly values, January first.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MonthlySeries([f64; MONTHS_PER_YEAR]);

impl MonthlySeries {
    pub fn new(values: [f64; MONTHS_PER_YEAR]) -> Self {
        Self(values)
    }

    pub fn from_fn(mut f: impl FnMut(u32) -> f64) -> Self {
        Self(std::array::from_fn(|idx| f(idx as u32 + 1)))
    }

    /// Value for a calendar month (1 = January).
    pub fn get(&self, month: u32) -> Option<f64> {
        month_index(month).map(|idx| self.0[idx])
    }

    pub fn set(&mut self, month: u32, value: f64) -> IscResult<()> {
        let idx = month_index(month).ok_or(IscError::InvalidMonth(month))?;
        self.0[idx] = value;
        Ok(())
    }

    pub fn values(&self) -> &[f64; MONTHS_PER_YEAR] {
        &self.0
    }

    /// (month, value) pairs in calendar order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().enumerate().map(|(idx, v)| (idx as u32 + 1, *v))
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> MonthlySeries {
        MonthlySeries(self.0.map(f))
    }

    pub fn zip_with(&self, other: &MonthlySeries, f: impl Fn(f64, f64) -> f64) -> MonthlySeries {
        MonthlySeries(std::array::from_fn(|idx| f(self.0[idx], other.0[idx])))
    }
}

fn month_index(month: u32) -> Option<usize> {
    (1..=MONTHS_PER_YEAR as u32)
        .contains(&month)
        .then(|| month as usize - 1)
}

/// Per-zone monthly table (5 zones x 12 months).
pub type ZoneTable = BTreeMap<HubZone, MonthlySeries>;

/// One market year of hub settlement prices, grouped by zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementTable {
    pub year: i32,
    zones: BTreeMap<HubZone, Vec<SettlementRecord>>,
}

impl SettlementTable {
    pub fn new(year: i32, records: Vec<SettlementRecord>) -> Self {
        let mut zones: BTreeMap<HubZone, Vec<SettlementRecord>> = BTreeMap::new();
        for record in records {
            zones.entry(record.zone).or_default().push(record);
        }
        Self { year, zones }
    }

    /// All records for one zone, in input order. Empty when the zone is absent.
    pub fn zone_records(&self, zone: HubZone) -> &[SettlementRecord] {
        self.zones.get(&zone).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.zones.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One market year of ancillary capacity prices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityTable {
    pub year: i32,
    pub records: Vec<CapacityPriceRecord>,
}

impl CapacityTable {
    pub fn new(year: i32, records: Vec<CapacityPriceRecord>) -> Self {
        Self { year, records }
    }

    pub fn month_records(&self, month: u32) -> impl Iterator<Item = &CapacityPriceRecord> {
        self.records
            .iter()
            .filter(move |r| r.delivery_date.month() == month)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YearInputs {
    pub settlement: SettlementTable,
    pub capacity: CapacityTable,
}

/// Immutable input bundle for one engine run, keyed by market year.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketInputs {
    years: BTreeMap<i32, YearInputs>,
}

impl MarketInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(mut self, year: i32, inputs: YearInputs) -> Self {
        self.years.insert(year, inputs);
        self
    }

    pub fn insert(&mut self, year: i32, inputs: YearInputs) {
        self.years.insert(year, inputs);
    }

    pub fn get(&self, year: i32) -> Option<&YearInputs> {
        self.years.get(&year)
    }

    pub fn years(&self) -> Vec<i32> {
        self.years.keys().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub duration_hours: u32,
    pub capacity_mw: f64,
}

impl RunParameters {
    pub fn new(duration_hours: u32, capacity_mw: f64) -> Self {
        Self {
            duration_hours,
            capacity_mw,
        }
    }

    /// Energy moved per arbitrage event.
    pub fn energy_mwh(&self) -> f64 {
        self.capacity_mw * self.duration_hours as f64
    }
}

/// Sub-window used for arbitrage: calendar days or ISO weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum WindowRegime {
    Daily,
    Weekly,
}

impl WindowRegime {
    pub fn for_duration(duration_hours: u32, weekly_threshold_hours: u32) -> Self {
        if duration_hours < weekly_threshold_hours {
            WindowRegime::Daily
        } else {
            WindowRegime::Weekly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_parsing_and_order() {
        assert_eq!("hou".parse::<HubZone>().unwrap(), HubZone::Hou);
        assert_eq!("WEST".parse::<HubZone>().unwrap(), HubZone::West);
        assert_eq!(HubZone::Pan.to_string(), "PAN");
        assert_eq!(
            HubZone::all(),
            vec![
                HubZone::Hou,
                HubZone::North,
                HubZone::Pan,
                HubZone::South,
                HubZone::West
            ]
        );
    }

    #[test]
    fn test_capacity_record_average() {
        let record = CapacityPriceRecord {
            delivery_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            hour_ending: None,
            reg_down: 4.0,
            reg_up: 8.0,
            rrs: 12.0,
            non_spin: 16.0,
        };
        assert_eq!(record.average(), 10.0);
        assert_eq!(record.price(ServiceCategory::Rrs), 12.0);
        assert_eq!(ServiceCategory::NonSpin.to_string(), "NON-SPIN");
    }

    #[test]
    fn test_monthly_series_access() {
        let mut series = MonthlySeries::from_fn(|m| m as f64);
        assert_eq!(series.get(1).unwrap(), 1.0);
        assert_eq!(series.get(12).unwrap(), 12.0);
        series.set(8, 100.0).unwrap();
        assert_eq!(series.get(8).unwrap(), 100.0);
        assert_eq!(series.total(), 78.0 - 8.0 + 100.0);
    }

    #[test]
    fn test_monthly_series_rejects_out_of_range_month() {
        let mut series = MonthlySeries::from_fn(|m| m as f64);
        assert_eq!(series.get(0), None);
        assert_eq!(series.get(13), None);
        assert!(matches!(series.set(13, 1.0), Err(IscError::InvalidMonth(13))));
        assert_eq!(series.map(|v| v * 2.0).get(6), Some(12.0));
    }

    #[test]
    fn test_settlement_table_groups_by_zone() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
        let table = SettlementTable::new(
            2022,
            vec![
                SettlementRecord { delivery_date: date, hour_ending: 1, repeated_hour: false, zone: HubZone::North, price: 10.0 },
                SettlementRecord { delivery_date: date, hour_ending: 1, repeated_hour: false, zone: HubZone::Hou, price: 12.0 },
                SettlementRecord { delivery_date: date, hour_ending: 2, repeated_hour: false, zone: HubZone::North, price: 11.0 },
            ],
        );
        assert_eq!(table.zone_records(HubZone::North).len(), 2);
        assert_eq!(table.zone_records(HubZone::Hou).len(), 1);
        assert!(table.zone_records(HubZone::West).is_empty());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_window_regime_threshold() {
        assert_eq!(WindowRegime::for_duration(7, 8), WindowRegime::Daily);
        assert_eq!(WindowRegime::for_duration(8, 8), WindowRegime::Weekly);
        assert_eq!(WindowRegime::for_duration(0, 8), WindowRegime::Daily);
    }
}
