use crate::config::MarketRules;
use crate::error::{IscError, IscResult};
use crate::models::{HubZone, MarketInputs, MonthlySeries, RunParameters, WindowRegime, ZoneTable};
use crate::rcp::calculate_rcp;
use crate::reap::{ReapCalculator, ReapSeries};
use crate::reference_price::{
    OutlierAdjustmentRecord, ReferencePriceAggregator, YearReferencePrices,
};
use crate::revenue::{classify, compute_isc, IncentiveOutcome, RevenueComparator, RevenueProjection, ZoneIsc};
use crate::strike_price::{calculate_strike_price, StrikePrice};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Everything produced by one (duration, capacity) run.
#[derive(Debug, Clone, Serialize)]
pub struct IscRun {
    pub rules_version: String,
    pub params: RunParameters,
    pub regime: WindowRegime,
    pub years: Vec<YearReferencePrices>,
    pub adjustment: OutlierAdjustmentRecord,
    pub adjusted_year: ZoneTable,
    pub test_year: ZoneTable,
    pub strike: StrikePrice,
    pub projection: RevenueProjection,
    pub results: Vec<ZoneIsc>,
    pub max_zone: Option<HubZone>,
    pub descending: Vec<HubZone>,
    pub sufficient: Vec<HubZone>,
    pub outcome: IncentiveOutcome,
}

impl IscRun {
    pub fn year(&self, year: i32) -> Option<&YearReferencePrices> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn zone_result(&self, zone: HubZone) -> Option<&ZoneIsc> {
        self.results.iter().find(|r| r.zone == zone)
    }
}

/// Runs the reference price pipeline for one battery configuration. The
/// engine holds no state between runs.
pub struct IscEngine {
    rules: MarketRules,
}

impl IscEngine {
    pub fn new(rules: MarketRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &MarketRules {
        &self.rules
    }

    pub fn run(&self, inputs: &MarketInputs, params: RunParameters) -> IscResult<IscRun> {
        let start = Instant::now();
        self.validate(inputs, &params)?;

        // The strike price fails fast on zero duration before any data is touched.
        let strike = calculate_strike_price(&self.rules, &params)?;
        let regime = self.rules.regime(params.duration_hours);
        info!(
            "Run {}h / {} MW ({} windows), strike price ${:.2}/MWh",
            params.duration_hours, params.capacity_mw, regime, strike.value
        );

        let years = self.reference_prices(inputs, params.duration_hours, regime)?;
        let summary = ReferencePriceAggregator::new(&self.rules).aggregate(years)?;

        let comparator = RevenueComparator::new(&self.rules);
        let projection = comparator.project(&params, &summary.test_year, &strike);
        let results = compute_isc(&projection);
        let classification = classify(&results);

        info!(
            "Run complete in {:.2}s: {}",
            start.elapsed().as_secs_f64(),
            classification.outcome
        );

        Ok(IscRun {
            rules_version: self.rules.version.clone(),
            params,
            regime,
            years: summary.years,
            adjustment: summary.adjustment,
            adjusted_year: summary.adjusted_year,
            test_year: summary.test_year,
            strike,
            projection,
            results,
            max_zone: classification.max_zone,
            descending: classification.descending,
            sufficient: classification.sufficient,
            outcome: classification.outcome,
        })
    }

    fn validate(&self, inputs: &MarketInputs, params: &RunParameters) -> IscResult<()> {
        let limits = &self.rules.limits;
        if params.duration_hours > limits.max_duration_hours {
            return Err(IscError::InvalidParameters(format!(
                "duration {}h exceeds the {}h maximum",
                params.duration_hours, limits.max_duration_hours
            )));
        }
        if !params.capacity_mw.is_finite()
            || params.capacity_mw < 0.0
            || params.capacity_mw > limits.max_capacity_mw
        {
            return Err(IscError::InvalidParameters(format!(
                "capacity {} MW must be between 0 and {} MW",
                params.capacity_mw, limits.max_capacity_mw
            )));
        }

        let available = inputs.years();
        if available != self.rules.market_years {
            return Err(IscError::MarketYears(format!(
                "inputs cover {:?}, rules require {:?}",
                available, self.rules.market_years
            )));
        }
        Ok(())
    }

    /// RCP + REAP for every market year. Each (zone, year) cell is
    /// independent and computed in parallel.
    fn reference_prices(
        &self,
        inputs: &MarketInputs,
        duration_hours: u32,
        regime: WindowRegime,
    ) -> IscResult<Vec<YearReferencePrices>> {
        let calculator = ReapCalculator::new(duration_hours, regime);

        let cells: Vec<(i32, HubZone)> = self
            .rules
            .market_years
            .iter()
            .flat_map(|&year| HubZone::all().into_iter().map(move |zone| (year, zone)))
            .collect();

        let reap: Vec<ReapSeries> = cells
            .par_iter()
            .map(|&(year, zone)| {
                let records = inputs
                    .get(year)
                    .map(|y| y.settlement.zone_records(zone))
                    .unwrap_or(&[]);
                calculator.calculate_year(zone, year, records)
            })
            .collect::<IscResult<_>>()?;

        let rcp: BTreeMap<i32, MonthlySeries> = self
            .rules
            .market_years
            .par_iter()
            .map(|&year| {
                let table = inputs
                    .get(year)
                    .map(|y| &y.capacity)
                    .ok_or_else(|| IscError::MarketYears(format!("no capacity prices for {}", year)))?;
                Ok((year, calculate_rcp(table)?))
            })
            .collect::<IscResult<_>>()?;

        let mut reap_by_year: BTreeMap<i32, ZoneTable> = BTreeMap::new();
        for series in reap {
            debug!(
                "REAP {} {}: annual mean {:.2}",
                series.zone,
                series.year,
                series.values().total() / 12.0
            );
            reap_by_year
                .entry(series.year)
                .or_default()
                .insert(series.zone, series.values());
        }

        Ok(self
            .rules
            .market_years
            .iter()
            .map(|&year| {
                let capacity = rcp.get(&year).copied().unwrap_or_default();
                let zones = reap_by_year.remove(&year).unwrap_or_default();
                YearReferencePrices::combine(year, capacity, zones)
            })
            .collect())
    }
}
