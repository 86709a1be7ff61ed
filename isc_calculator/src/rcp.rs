use crate::error::{IscError, IscResult};
use crate::models::{CapacityTable, MonthlySeries, MONTHS_PER_YEAR};
use log::debug;

/// Monthly Reference Capacity Price for one market year.
///
/// Each row's four service-category prices are averaged, then the row
/// averages are averaged over the month. Duration plays no part.
pub fn calculate_rcp(table: &CapacityTable) -> IscResult<MonthlySeries> {
    let mut values = [0.0; MONTHS_PER_YEAR];

    for month in 1..=MONTHS_PER_YEAR as u32 {
        let (sum, count) = table
            .month_records(month)
            .fold((0.0, 0usize), |(sum, count), r| (sum + r.average(), count + 1));

        if count == 0 {
            return Err(IscError::EmptyMonth {
                table: "capacity prices".to_string(),
                year: table.year,
                month,
            });
        }
        values[month as usize - 1] = sum / count as f64;
    }

    debug!("RCP {}: {:?}", table.year, values);
    Ok(MonthlySeries::new(values))
}
