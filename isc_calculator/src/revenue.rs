use crate::config::MarketRules;
use crate::models::{HubZone, MonthlySeries, RunParameters, WindowRegime, ZoneTable};
use crate::strike_price::StrikePrice;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monthly dollar revenues for the test year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueProjection {
    /// Arbitrage events per month: calendar days, or a fixed 4.5 weeks.
    pub events_per_month: MonthlySeries,
    pub reference: ZoneTable,
    pub strike: MonthlySeries,
}

/// Annual revenues and Index Storage Credit for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneIsc {
    pub zone: HubZone,
    pub annual_reference_revenue: f64,
    pub annual_strike_revenue: f64,
    /// Strike minus reference revenue. Positive means an incentive is needed.
    pub isc: f64,
}

impl ZoneIsc {
    pub fn needs_incentive(&self) -> bool {
        self.isc >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncentiveOutcome {
    /// Every zone earns enough at the reference price.
    NoIncentivesNeeded,
    /// Some zones are sufficient; the rest need incentives.
    PartialIncentives {
        sufficient: Vec<HubZone>,
        needing: Vec<HubZone>,
    },
    /// No zone is sufficient; ranked by ISC, highest first.
    AllNeedIncentives { ranked: Vec<HubZone> },
}

impl IncentiveOutcome {
    /// Sentence shown alongside the ISC table, with zones rendered by `name`.
    pub fn message(&self, name: impl Fn(HubZone) -> String) -> String {
        let list = |zones: &[HubZone]| {
            zones.iter().map(|z| name(*z)).collect::<Vec<_>>().join(", ")
        };
        match self {
            IncentiveOutcome::NoIncentivesNeeded => {
                "ERCOT generates sufficient revenues across all hub zones. No incentives are needed."
                    .to_string()
            }
            IncentiveOutcome::PartialIncentives { sufficient, .. } => format!(
                "The following hub zones have sufficient reference prices at this strike price. \
                 No Index Storage Credits are needed: [{}]. The rest need incentives.",
                list(sufficient)
            ),
            IncentiveOutcome::AllNeedIncentives { ranked } => format!(
                "All hub zones have Reference Revenues below Strike Price revenues. Incentives may \
                 be needed. Hub zones with estimated ISCs ranked from highest to lowest: [{}]",
                list(ranked)
            ),
        }
    }
}

impl fmt::Display for IncentiveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message(|z| z.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub max_zone: Option<HubZone>,
    pub descending: Vec<HubZone>,
    pub sufficient: Vec<HubZone>,
    pub outcome: IncentiveOutcome,
}

pub struct RevenueComparator<'a> {
    rules: &'a MarketRules,
}

impl<'a> RevenueComparator<'a> {
    pub fn new(rules: &'a MarketRules) -> Self {
        Self { rules }
    }

    pub fn events_per_month(&self, duration_hours: u32) -> MonthlySeries {
        match self.rules.regime(duration_hours) {
            WindowRegime::Daily => MonthlySeries::from_fn(|m| {
                self.rules.days_in_month(m).unwrap_or_default() as f64
            }),
            WindowRegime::Weekly => MonthlySeries::from_fn(|_| self.rules.revenue.weeks_per_month),
        }
    }

    pub fn project(
        &self,
        params: &RunParameters,
        test_year: &ZoneTable,
        strike: &StrikePrice,
    ) -> RevenueProjection {
        let energy = params.energy_mwh();
        let events = self.events_per_month(params.duration_hours);

        let reference = test_year
            .iter()
            .map(|(zone, prices)| (*zone, prices.zip_with(&events, |price, n| price * energy * n)))
            .collect();
        let strike = events.map(|n| strike.value * energy * n);

        RevenueProjection {
            events_per_month: events,
            reference,
            strike,
        }
    }
}

pub fn compute_isc(projection: &RevenueProjection) -> Vec<ZoneIsc> {
    let annual_strike_revenue = projection.strike.total();
    projection
        .reference
        .iter()
        .map(|(zone, monthly)| {
            let annual_reference_revenue = monthly.total();
            ZoneIsc {
                zone: *zone,
                annual_reference_revenue,
                annual_strike_revenue,
                isc: annual_strike_revenue - annual_reference_revenue,
            }
        })
        .collect()
}

/// Rank zones and decide which need incentives. Ties keep zone order.
pub fn classify(results: &[ZoneIsc]) -> Classification {
    let mut max: Option<&ZoneIsc> = None;
    for result in results {
        match max {
            Some(best) if result.annual_reference_revenue <= best.annual_reference_revenue => {}
            _ => max = Some(result),
        }
    }

    let mut ranked: Vec<&ZoneIsc> = results.iter().collect();
    ranked.sort_by(|a, b| b.isc.total_cmp(&a.isc));
    let descending: Vec<HubZone> = ranked.iter().map(|r| r.zone).collect();

    let sufficient: Vec<HubZone> = results
        .iter()
        .filter(|r| !r.needs_incentive())
        .map(|r| r.zone)
        .collect();

    let outcome = if !results.is_empty() && sufficient.len() == results.len() {
        IncentiveOutcome::NoIncentivesNeeded
    } else if sufficient.is_empty() {
        IncentiveOutcome::AllNeedIncentives {
            ranked: descending.clone(),
        }
    } else {
        IncentiveOutcome::PartialIncentives {
            sufficient: sufficient.clone(),
            needing: results
                .iter()
                .filter(|r| r.needs_incentive())
                .map(|r| r.zone)
                .collect(),
        }
    };

    Classification {
        max_zone: max.map(|r| r.zone),
        descending,
        sufficient,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strike_price::calculate_strike_price;
    use float_cmp::assert_approx_eq;

    fn results(iscs: [f64; 5]) -> Vec<ZoneIsc> {
        HubZone::all()
            .into_iter()
            .zip(iscs)
            .map(|(zone, isc)| ZoneIsc {
                zone,
                annual_reference_revenue: 1_000.0 - isc,
                annual_strike_revenue: 1_000.0,
                isc,
            })
            .collect()
    }

    #[test]
    fn test_all_sufficient() {
        let c = classify(&results([-1.0, -2.0, -3.0, -4.0, -5.0]));
        assert_eq!(c.outcome, IncentiveOutcome::NoIncentivesNeeded);
        assert_eq!(c.sufficient.len(), 5);
        assert!(c.outcome.to_string().contains("No incentives are needed"));
    }

    #[test]
    fn test_four_sufficient_one_needing() {
        let c = classify(&results([-10.0, -20.0, 0.0, -5.0, -1.0]));
        match &c.outcome {
            IncentiveOutcome::PartialIncentives { sufficient, needing } => {
                assert_eq!(
                    sufficient,
                    &vec![HubZone::Hou, HubZone::North, HubZone::South, HubZone::West]
                );
                assert_eq!(needing, &vec![HubZone::Pan]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(c.outcome.to_string().contains("[HOU, NORTH, SOUTH, WEST]"));
        assert!(c.outcome.to_string().ends_with("The rest need incentives."));
    }

    #[test]
    fn test_none_sufficient_ranked_descending() {
        let c = classify(&results([5.0, 50.0, 0.0, 500.0, 50.0]));
        assert_eq!(
            c.outcome,
            IncentiveOutcome::AllNeedIncentives {
                ranked: vec![HubZone::South, HubZone::North, HubZone::West, HubZone::Hou, HubZone::Pan]
            }
        );
        assert!(c.sufficient.is_empty());
        // Lowest ISC means highest reference revenue.
        assert_eq!(c.max_zone, Some(HubZone::Pan));
    }

    #[test]
    fn test_max_zone_ties_keep_zone_order() {
        let c = classify(&results([3.0, 3.0, 7.0, 9.0, 3.0]));
        assert_eq!(c.max_zone, Some(HubZone::Hou));
    }

    #[test]
    fn test_projection_daily_and_weekly() {
        let rules = MarketRules::embedded().unwrap();
        let comparator = RevenueComparator::new(&rules);
        let test_year: ZoneTable = HubZone::all()
            .into_iter()
            .map(|z| (z, MonthlySeries::from_fn(|_| 50.0)))
            .collect();

        let daily = RunParameters::new(4, 100.0);
        let strike = calculate_strike_price(&rules, &daily).unwrap();
        let projection = comparator.project(&daily, &test_year, &strike);
        assert_eq!(projection.reference[&HubZone::Hou].get(1).unwrap(), 50.0 * 400.0 * 31.0);
        assert_eq!(projection.reference[&HubZone::Hou].get(2).unwrap(), 50.0 * 400.0 * 28.0);
        assert_approx_eq!(f64, projection.reference[&HubZone::West].total(), 50.0 * 400.0 * 365.0, epsilon = 1e-6);

        let iscs = compute_isc(&projection);
        assert_eq!(iscs.len(), 5);
        let expected_strike = strike.value * 400.0 * 365.0;
        assert_approx_eq!(f64, iscs[0].annual_strike_revenue, expected_strike, epsilon = 1e-6);
        assert_approx_eq!(f64, iscs[0].isc, expected_strike - 50.0 * 400.0 * 365.0, epsilon = 1e-6);

        let weekly = RunParameters::new(8, 10.0);
        let strike = calculate_strike_price(&rules, &weekly).unwrap();
        let projection = comparator.project(&weekly, &test_year, &strike);
        assert_eq!(projection.events_per_month.get(2).unwrap(), 4.5);
        assert_eq!(projection.reference[&HubZone::Pan].get(6).unwrap(), 50.0 * 80.0 * 4.5);
        assert_eq!(projection.strike.get(3).unwrap(), strike.value * 80.0 * 4.5);
    }
}
