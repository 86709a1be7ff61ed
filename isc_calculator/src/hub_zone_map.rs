use crate::config::MarketRules;
use crate::models::HubZone;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// County to hub zone assignment for the map collaborator. Counties outside
/// the ERCOT footprint are dropped from every zone.
#[derive(Debug, Clone)]
pub struct HubZoneMap {
    settlement_points: BTreeMap<HubZone, String>,
    counties: BTreeMap<HubZone, BTreeSet<String>>,
    by_county: HashMap<String, HubZone>,
}

impl HubZoneMap {
    pub fn from_rules(rules: &MarketRules) -> Self {
        let excluded: BTreeSet<String> = rules
            .non_ercot_counties
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();

        let mut settlement_points = BTreeMap::new();
        let mut counties: BTreeMap<HubZone, BTreeSet<String>> = BTreeMap::new();
        let mut by_county = HashMap::new();

        for zone in &rules.zones {
            settlement_points.insert(zone.zone, zone.settlement_point.clone());
            let entry = counties.entry(zone.zone).or_default();
            for county in &zone.counties {
                let county = county.trim();
                let key = county.to_lowercase();
                if excluded.contains(&key) {
                    continue;
                }
                // First zone listing a county keeps it.
                if by_county.contains_key(&key) {
                    continue;
                }
                by_county.insert(key, zone.zone);
                entry.insert(county.to_string());
            }
        }

        Self {
            settlement_points,
            counties,
            by_county,
        }
    }

    /// Hub zone for a county name, case-insensitive.
    pub fn zone_for_county(&self, county: &str) -> Option<HubZone> {
        self.by_county.get(&county.trim().to_lowercase()).copied()
    }

    pub fn counties(&self, zone: HubZone) -> Vec<&str> {
        self.counties
            .get(&zone)
            .map(|c| c.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn settlement_point(&self, zone: HubZone) -> Option<&str> {
        self.settlement_points.get(&zone).map(String::as_str)
    }

    /// (zone, settlement point, county) rows in zone then county order.
    pub fn rows(&self) -> Vec<(HubZone, &str, &str)> {
        let mut rows = Vec::new();
        for (zone, counties) in &self.counties {
            let point = self.settlement_point(*zone).unwrap_or_default();
            for county in counties {
                rows.push((*zone, point, county.as_str()));
            }
        }
        rows
    }
}
