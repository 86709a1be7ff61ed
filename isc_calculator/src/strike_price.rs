use crate::config::MarketRules;
use crate::error::{IscError, IscResult};
use crate::models::{RunParameters, WindowRegime};
use serde::{Deserialize, Serialize};

const KW_PER_MW: f64 = 1000.0;

/// Levelized cost of new entry (CONE) for the battery, with the intermediate
/// terms kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikePrice {
    pub capital_cost_per_kw: f64,
    pub total_capital_cost: f64,
    pub annual_revenue_needed: f64,
    pub annual_revenue_needed_per_mw: f64,
    pub cycles_per_year: f64,
    /// $/MWh
    pub value: f64,
}

pub fn calculate_strike_price(rules: &MarketRules, params: &RunParameters) -> IscResult<StrikePrice> {
    if params.duration_hours == 0 {
        return Err(IscError::ZeroDuration);
    }

    let curve = &rules.cost_curve;
    let duration = params.duration_hours as f64;

    let capital_cost_per_kw = curve.slope_per_hour * duration + curve.intercept;
    let total_capital_cost = capital_cost_per_kw * KW_PER_MW * params.capacity_mw;
    let annual_revenue_needed = total_capital_cost / curve.amortization_years;
    // Per-MW need does not depend on capacity; this form stays defined at 0 MW.
    let annual_revenue_needed_per_mw = capital_cost_per_kw * KW_PER_MW / curve.amortization_years;

    let cycles_per_year = match rules.regime(params.duration_hours) {
        WindowRegime::Daily => curve.daily_cycles_per_year,
        WindowRegime::Weekly => curve.weekly_cycles_per_year,
    };

    Ok(StrikePrice {
        capital_cost_per_kw,
        total_capital_cost,
        annual_revenue_needed,
        annual_revenue_needed_per_mw,
        cycles_per_year,
        value: annual_revenue_needed_per_mw / (cycles_per_year * duration),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_four_hour_hundred_mw() {
        let rules = MarketRules::embedded().unwrap();
        let strike = calculate_strike_price(&rules, &RunParameters::new(4, 100.0)).unwrap();

        assert_approx_eq!(f64, strike.capital_cost_per_kw, 1342.36, epsilon = 1e-9);
        assert_approx_eq!(f64, strike.total_capital_cost, 134_236_000.0, epsilon = 1e-4);
        assert_approx_eq!(f64, strike.annual_revenue_needed_per_mw, 89_490.666_666_7, epsilon = 1e-4);
        assert_approx_eq!(f64, strike.value, 61.30, epsilon = 0.01);
    }

    #[test]
    fn test_weekly_branch_uses_52_cycles() {
        let rules = MarketRules::embedded().unwrap();
        let strike = calculate_strike_price(&rules, &RunParameters::new(10, 250.0)).unwrap();
        let expected = (240.8 * 10.0 + 379.16) * 1000.0 / 15.0 / (52.0 * 10.0);
        assert_approx_eq!(f64, strike.value, expected, epsilon = 1e-9);
        assert_eq!(strike.cycles_per_year, 52.0);
    }

    #[test]
    fn test_seven_hours_stays_daily() {
        let rules = MarketRules::embedded().unwrap();
        let strike = calculate_strike_price(&rules, &RunParameters::new(7, 50.0)).unwrap();
        assert_eq!(strike.cycles_per_year, 365.0);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let rules = MarketRules::embedded().unwrap();
        let err = calculate_strike_price(&rules, &RunParameters::new(0, 100.0)).unwrap_err();
        assert!(matches!(err, IscError::ZeroDuration));
        assert!(err.to_string().contains("zero duration"));
    }

    #[test]
    fn test_zero_capacity_is_defined() {
        let rules = MarketRules::embedded().unwrap();
        let strike = calculate_strike_price(&rules, &RunParameters::new(4, 0.0)).unwrap();
        assert!(strike.value.is_finite());
        assert_eq!(strike.total_capital_cost, 0.0);
    }
}
