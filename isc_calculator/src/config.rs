use crate::error::{IscError, IscResult};
use crate::models::{HubZone, WindowRegime, MONTHS_PER_YEAR};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Market rules shipped with the crate.
pub const EMBEDDED_RULES: &str = include_str!("../config/market_rules.toml");

/// Static, versioned domain configuration: hub zones, input column names,
/// the capital cost curve and the outlier adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRules {
    pub version: String,
    pub market_years: Vec<i32>,
    #[serde(default)]
    pub non_ercot_counties: Vec<String>,
    pub settlement_columns: SettlementColumns,
    pub capacity_columns: CapacityColumns,
    pub windowing: Windowing,
    pub cost_curve: CostCurve,
    pub revenue: RevenueRules,
    pub outlier_adjustment: OutlierAdjustment,
    pub limits: Limits,
    pub zones: Vec<ZoneRules>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementColumns {
    pub delivery_date: String,
    pub hour_ending: String,
    pub settlement_point: String,
    pub price: String,
    /// Optional Y/N column marking the second occurrence of the fall-back hour.
    #[serde(default = "default_repeated_hour_column")]
    pub repeated_hour: String,
}

fn default_repeated_hour_column() -> String {
    "Repeated Hour Flag".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityColumns {
    pub delivery_date: String,
    pub hour_ending: String,
    pub reg_down: String,
    pub reg_up: String,
    pub rrs: String,
    pub non_spin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Windowing {
    pub weekly_threshold_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCurve {
    /// $/kW added per hour of duration.
    pub slope_per_hour: f64,
    /// $/kW at zero duration.
    pub intercept: f64,
    pub amortization_years: f64,
    pub daily_cycles_per_year: f64,
    pub weekly_cycles_per_year: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueRules {
    pub weeks_per_month: f64,
    pub days_per_month: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierAdjustment {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_duration_hours: u32,
    pub max_capacity_mw: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRules {
    pub zone: HubZone,
    pub settlement_point: String,
    pub display_name: String,
    #[serde(default)]
    pub counties: Vec<String>,
}

impl MarketRules {
    pub fn embedded() -> IscResult<Self> {
        Self::from_toml_str(EMBEDDED_RULES)
    }

    pub fn from_file(path: &Path) -> IscResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| IscError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> IscResult<Self> {
        let rules: MarketRules =
            toml::from_str(text).map_err(|e| IscError::Config(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> IscResult<()> {
        if self.version.trim().is_empty() {
            return Err(IscError::Config("version must not be empty".into()));
        }

        let years = &self.market_years;
        if years.len() != 3 || years.windows(2).any(|w| w[1] != w[0] + 1) {
            return Err(IscError::Config(format!(
                "market_years must be three consecutive years, got {:?}",
                years
            )));
        }

        let mut seen = HashSet::new();
        for zone in &self.zones {
            if !seen.insert(zone.zone) {
                return Err(IscError::Config(format!("zone {} listed twice", zone.zone)));
            }
            if zone.settlement_point.trim().is_empty() {
                return Err(IscError::Config(format!(
                    "zone {} has no settlement point",
                    zone.zone
                )));
            }
        }
        if let Some(missing) = HubZone::all().into_iter().find(|z| !seen.contains(z)) {
            return Err(IscError::Config(format!("zone {} is not configured", missing)));
        }

        let adjustment = &self.outlier_adjustment;
        if !(1..=12).contains(&adjustment.month) {
            return Err(IscError::Config(format!(
                "outlier adjustment month {} out of range",
                adjustment.month
            )));
        }
        if adjustment.year != self.middle_year() {
            return Err(IscError::Config(format!(
                "outlier adjustment year {} must be the middle market year {}",
                adjustment.year,
                self.middle_year()
            )));
        }

        let curve = &self.cost_curve;
        if curve.amortization_years <= 0.0
            || curve.daily_cycles_per_year <= 0.0
            || curve.weekly_cycles_per_year <= 0.0
        {
            return Err(IscError::Config(
                "amortization years and cycles per year must be positive".into(),
            ));
        }

        if self.revenue.days_per_month.len() != MONTHS_PER_YEAR
            || self.revenue.days_per_month.iter().any(|&d| d == 0)
        {
            return Err(IscError::Config(
                "days_per_month must list twelve positive day counts".into(),
            ));
        }
        if self.revenue.weeks_per_month <= 0.0 {
            return Err(IscError::Config("weeks_per_month must be positive".into()));
        }

        Ok(())
    }

    pub fn first_year(&self) -> i32 {
        self.market_years[0]
    }

    pub fn middle_year(&self) -> i32 {
        self.market_years[1]
    }

    pub fn last_year(&self) -> i32 {
        self.market_years[self.market_years.len() - 1]
    }

    pub fn regime(&self, duration_hours: u32) -> WindowRegime {
        WindowRegime::for_duration(duration_hours, self.windowing.weekly_threshold_hours)
    }

    pub fn zone_rules(&self, zone: HubZone) -> Option<&ZoneRules> {
        self.zones.iter().find(|z| z.zone == zone)
    }

    pub fn display_name(&self, zone: HubZone) -> String {
        self.zone_rules(zone)
            .map(|z| z.display_name.clone())
            .unwrap_or_else(|| zone.to_string())
    }

    /// Resolve a settlement point name (`HB_NORTH`) or a bare zone id (`NORTH`).
    pub fn zone_for_settlement_point(&self, name: &str) -> Option<HubZone> {
        let name = name.trim();
        self.zones
            .iter()
            .find(|z| z.settlement_point.eq_ignore_ascii_case(name))
            .map(|z| z.zone)
            .or_else(|| name.parse::<HubZone>().ok())
    }

    pub fn days_in_month(&self, month: u32) -> Option<u32> {
        let idx = month.checked_sub(1)? as usize;
        self.revenue.days_per_month.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_rules_are_valid() {
        let rules = MarketRules::embedded().unwrap();
        assert_eq!(rules.market_years, vec![2022, 2023, 2024]);
        assert_eq!(rules.middle_year(), 2023);
        assert_eq!(rules.outlier_adjustment.month, 8);
        assert_eq!(rules.zones.len(), 5);
        assert_eq!(rules.days_in_month(2), Some(28));
        assert_eq!(rules.days_in_month(13), None);
        assert_eq!(rules.display_name(HubZone::Pan), "Panhandle");
    }

    #[test]
    fn test_settlement_point_lookup() {
        let rules = MarketRules::embedded().unwrap();
        assert_eq!(rules.zone_for_settlement_point("HB_HOUSTON"), Some(HubZone::Hou));
        assert_eq!(rules.zone_for_settlement_point(" hb_west "), Some(HubZone::West));
        assert_eq!(rules.zone_for_settlement_point("SOUTH"), Some(HubZone::South));
        assert_eq!(rules.zone_for_settlement_point("HB_BUSAVG"), None);
        assert_eq!(rules.zone_for_settlement_point("LZ_NORTH"), None);
    }

    #[test]
    fn test_outlier_year_must_be_middle_year() {
        let text = EMBEDDED_RULES.replace("year = 2023", "year = 2024");
        let err = MarketRules::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, IscError::Config(_)));
    }

    #[test]
    fn test_non_consecutive_years_rejected() {
        let text = EMBEDDED_RULES.replace("[2022, 2023, 2024]", "[2021, 2023, 2024]");
        assert!(MarketRules::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_missing_zone_rejected() {
        let cut = EMBEDDED_RULES
            .find("[[zones]]\nzone = \"WEST\"")
            .unwrap();
        let err = MarketRules::from_toml_str(&EMBEDDED_RULES[..cut]).unwrap_err();
        assert!(err.to_string().contains("WEST"));
    }
}
