use chrono::{Datelike, Duration, NaiveDate};
use isc_calculator::models::SettlementRecord;
use isc_calculator::{calculate_strike_price, HubZone, MarketRules, ReapCalculator, RunParameters};

fn main() -> anyhow::Result<()> {
    let rules = MarketRules::embedded()?;
    let params = RunParameters::new(4, 100.0); // 100 MW / 4 h battery
    let calculator = ReapCalculator::new(params.duration_hours, rules.regime(params.duration_hours));

    // One year of hub prices with a cheap night, a flat day and an evening peak
    let mut records = Vec::new();
    let mut date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    while date.year() == 2024 {
        let summer = (6..=9).contains(&date.month());
        for hour in 1..=24u8 {
            let price = match hour {
                1..=6 | 22..=24 => 20.0,
                18..=21 if summer => 180.0,
                18..=21 => 100.0,
                _ => 50.0,
            };
            records.push(SettlementRecord {
                delivery_date: date,
                hour_ending: hour,
                repeated_hour: false,
                zone: HubZone::North,
                price,
            });
        }
        date += Duration::days(1);
    }

    let reap = calculator.calculate_year(HubZone::North, 2024, &records)?;
    let strike = calculate_strike_price(&rules, &params)?;

    println!("REAP Analysis Results");
    println!("=====================");
    println!("Zone: {} ({})", rules.display_name(HubZone::North), reap.year);
    println!(
        "Configuration: {} MW / {} h, {} windows",
        params.capacity_mw, params.duration_hours, reap.regime
    );
    println!("Strike price: ${:.2}/MWh", strike.value);
    println!();
    for month in &reap.months {
        println!(
            "  Month {:>2}: ${:>7.2}/MWh over {} windows",
            month.month, month.value, month.window_count
        );
    }

    Ok(())
}
