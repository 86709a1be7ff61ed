use crate::config::MarketRules;
use crate::error::{IscError, IscResult};
use crate::models::{
    CapacityPriceRecord, CapacityTable, MarketInputs, SettlementRecord, SettlementTable, YearInputs,
};
use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use rayon::prelude::*;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const DATE_FORMATS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];

pub fn settlement_file_name(year: i32) -> String {
    format!("DAM_Hub_Prices_{}.csv", year)
}

pub fn capacity_file_name(year: i32) -> String {
    format!("DAM_CapPrices{}.csv", year)
}

/// Reads the annual hub price and capacity price tables into typed records.
pub struct DataLoader {
    rules: MarketRules,
}

impl DataLoader {
    pub fn new(rules: MarketRules) -> Self {
        Self { rules }
    }

    /// Load every configured market year from `data_dir`
    pub fn load_market_inputs(&self, data_dir: &Path) -> IscResult<MarketInputs> {
        let years: Vec<(i32, YearInputs)> = self
            .rules
            .market_years
            .par_iter()
            .map(|&year| {
                let settlement =
                    self.load_settlement_table(&data_dir.join(settlement_file_name(year)), year)?;
                let capacity =
                    self.load_capacity_table(&data_dir.join(capacity_file_name(year)), year)?;
                Ok((year, YearInputs { settlement, capacity }))
            })
            .collect::<IscResult<_>>()?;

        let mut inputs = MarketInputs::new();
        for (year, year_inputs) in years {
            info!(
                "Loaded {}: {} settlement records, {} capacity records",
                year,
                year_inputs.settlement.len(),
                year_inputs.capacity.records.len()
            );
            inputs.insert(year, year_inputs);
        }
        Ok(inputs)
    }

    pub fn load_settlement_table(&self, path: &Path, year: i32) -> IscResult<SettlementTable> {
        let file = open(path)?;
        self.read_settlement_table(file, &path.display().to_string(), year)
    }

    /// Parse hub settlement prices. Rows for settlement points other than the
    /// five hubs are skipped.
    pub fn read_settlement_table<R: Read>(
        &self,
        reader: R,
        table: &str,
        year: i32,
    ) -> IscResult<SettlementTable> {
        let columns = &self.rules.settlement_columns;
        let mut csv = csv_reader(reader);
        let headers = headers(&mut csv, table)?;
        let date_idx = column_index(&headers, &columns.delivery_date, table)?;
        let hour_idx = column_index(&headers, &columns.hour_ending, table)?;
        let point_idx = column_index(&headers, &columns.settlement_point, table)?;
        let price_idx = column_index(&headers, &columns.price, table)?;
        let repeated_idx = headers.iter().position(|h| h == columns.repeated_hour);

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in csv.records() {
            let row = row.map_err(|e| IscError::schema(table, e.to_string()))?;
            let line = line_of(&row);

            let point = field(&row, point_idx);
            let Some(zone) = self.rules.zone_for_settlement_point(point) else {
                skipped += 1;
                continue;
            };

            let delivery_date = parse_row_date(field(&row, date_idx), year, table, line)?;
            let hour_ending = parse_hour_ending(field(&row, hour_idx)).ok_or_else(|| {
                IscError::schema(
                    table,
                    format!("line {}: invalid hour ending '{}'", line, field(&row, hour_idx)),
                )
            })?;
            let price = parse_price(field(&row, price_idx), &columns.price, table, line)?;

            let repeated_hour = repeated_idx
                .map(|idx| field(&row, idx).eq_ignore_ascii_case("Y"))
                .unwrap_or(false);

            records.push(SettlementRecord {
                delivery_date,
                hour_ending,
                repeated_hour,
                zone,
                price,
            });
        }

        if skipped > 0 {
            debug!("{}: skipped {} non-hub rows", table, skipped);
        }
        Ok(SettlementTable::new(year, records))
    }

    pub fn load_capacity_table(&self, path: &Path, year: i32) -> IscResult<CapacityTable> {
        let file = open(path)?;
        self.read_capacity_table(file, &path.display().to_string(), year)
    }

    pub fn read_capacity_table<R: Read>(
        &self,
        reader: R,
        table: &str,
        year: i32,
    ) -> IscResult<CapacityTable> {
        let columns = &self.rules.capacity_columns;
        let mut csv = csv_reader(reader);
        let headers = headers(&mut csv, table)?;
        let date_idx = column_index(&headers, &columns.delivery_date, table)?;
        let hour_idx = headers.iter().position(|h| h == columns.hour_ending);
        let service_idx = [
            (column_index(&headers, &columns.reg_down, table)?, &columns.reg_down),
            (column_index(&headers, &columns.reg_up, table)?, &columns.reg_up),
            (column_index(&headers, &columns.rrs, table)?, &columns.rrs),
            (column_index(&headers, &columns.non_spin, table)?, &columns.non_spin),
        ];

        let mut records = Vec::new();
        for row in csv.records() {
            let row = row.map_err(|e| IscError::schema(table, e.to_string()))?;
            let line = line_of(&row);

            let delivery_date = parse_row_date(field(&row, date_idx), year, table, line)?;
            let hour_ending = match hour_idx {
                Some(idx) => Some(parse_hour_ending(field(&row, idx)).ok_or_else(|| {
                    IscError::schema(
                        table,
                        format!("line {}: invalid hour ending '{}'", line, field(&row, idx)),
                    )
                })?),
                None => None,
            };

            let mut prices = [0.0; 4];
            for (slot, (idx, name)) in prices.iter_mut().zip(&service_idx) {
                *slot = parse_price(field(&row, *idx), name, table, line)?;
            }
            let [reg_down, reg_up, rrs, non_spin] = prices;

            records.push(CapacityPriceRecord {
                delivery_date,
                hour_ending,
                reg_down,
                reg_up,
                rrs,
                non_spin,
            });
        }

        Ok(CapacityTable::new(year, records))
    }
}

fn open(path: &Path) -> IscResult<File> {
    File::open(path).map_err(|source| IscError::Io {
        path: PathBuf::from(path),
        source,
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader)
}

fn headers<R: Read>(csv: &mut csv::Reader<R>, table: &str) -> IscResult<StringRecord> {
    csv.headers()
        .cloned()
        .map_err(|e| IscError::schema(table, e.to_string()))
}

fn column_index(headers: &StringRecord, name: &str, table: &str) -> IscResult<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| IscError::schema(table, format!("missing column '{}'", name)))
}

fn field(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or_default()
}

fn line_of(row: &StringRecord) -> u64 {
    row.position().map(|p| p.line()).unwrap_or_default()
}

fn parse_row_date(raw: &str, year: i32, table: &str, line: u64) -> IscResult<NaiveDate> {
    let date = parse_delivery_date(raw).ok_or_else(|| {
        IscError::schema(table, format!("line {}: invalid delivery date '{}'", line, raw))
    })?;
    if date.year() != year {
        return Err(IscError::schema(
            table,
            format!("line {}: delivery date {} is outside market year {}", line, date, year),
        ));
    }
    Ok(date)
}

fn parse_price(raw: &str, column: &str, table: &str, line: u64) -> IscResult<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .ok_or_else(|| {
            IscError::schema(
                table,
                format!("line {}: non-numeric {} price '{}'", line, column, raw),
            )
        })
}

/// Accepts `MM/DD/YYYY` (ERCOT), `YYYY-MM-DD` and `YYYY/MM/DD`.
pub fn parse_delivery_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Spreadsheet exports sometimes carry a midnight time component.
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Accepts `HH:MM` or a bare hour, 1 through 24.
pub fn parse_hour_ending(raw: &str) -> Option<u8> {
    let hour = raw.trim().split(':').next()?.trim();
    let hour: u8 = hour.parse().ok()?;
    (1..=24).contains(&hour).then_some(hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HubZone;
    use std::io::Write;

    fn loader() -> DataLoader {
        DataLoader::new(MarketRules::embedded().unwrap())
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_hour_ending("01:00"), Some(1));
        assert_eq!(parse_hour_ending("24:00"), Some(24));
        assert_eq!(parse_hour_ending("7"), Some(7));
        assert_eq!(parse_hour_ending("0"), None);
        assert_eq!(parse_hour_ending("25:00"), None);
        assert_eq!(
            parse_delivery_date("08/15/2023"),
            NaiveDate::from_ymd_opt(2023, 8, 15)
        );
        assert_eq!(
            parse_delivery_date("2023-08-15 00:00:00"),
            NaiveDate::from_ymd_opt(2023, 8, 15)
        );
        assert_eq!(parse_delivery_date("15.08.2023"), None);
    }

    #[test]
    fn test_read_settlement_filters_hubs() {
        let data = "\
Delivery Date,Hour Ending,Repeated Hour Flag,Settlement Point,Settlement Point Price
01/01/2022,01:00,N,HB_HOUSTON,25.5
01/01/2022,01:00,N,HB_BUSAVG,24.0
01/01/2022,01:00,N,HB_NORTH,23.25
01/01/2022,02:00,N,LZ_WEST,30.0
01/01/2022,02:00,N,WEST,31.0
";
        let table = loader()
            .read_settlement_table(data.as_bytes(), "test", 2022)
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.zone_records(HubZone::Hou)[0].price, 25.5);
        assert_eq!(table.zone_records(HubZone::North)[0].hour_ending, 1);
        assert_eq!(table.zone_records(HubZone::West)[0].price, 31.0);
    }

    #[test]
    fn test_repeated_hour_flag_is_optional() {
        let flagged = "\
Delivery Date,Hour Ending,Repeated Hour Flag,Settlement Point,Settlement Point Price
11/06/2022,02:00,N,HB_NORTH,30.0
11/06/2022,02:00,Y,HB_NORTH,45.0
";
        let table = loader()
            .read_settlement_table(flagged.as_bytes(), "test", 2022)
            .unwrap();
        let north = table.zone_records(HubZone::North);
        assert_eq!(north.len(), 2);
        assert!(!north[0].repeated_hour);
        assert!(north[1].repeated_hour);

        let plain = "Delivery Date,Hour Ending,Settlement Point,Settlement Point Price\n11/06/2022,02:00,HB_NORTH,30.0\n";
        let table = loader()
            .read_settlement_table(plain.as_bytes(), "test", 2022)
            .unwrap();
        assert!(!table.zone_records(HubZone::North)[0].repeated_hour);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let data = "Delivery Date,Hour Ending,Settlement Point\n01/01/2022,01:00,HB_PAN\n";
        let err = loader()
            .read_settlement_table(data.as_bytes(), "hub prices", 2022)
            .unwrap_err();
        match err {
            IscError::Schema { table, message } => {
                assert_eq!(table, "hub prices");
                assert!(message.contains("Settlement Point Price"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_non_numeric_price_is_schema_error() {
        let data = "\
Delivery Date,Hour Ending,Settlement Point,Settlement Point Price
01/01/2022,01:00,HB_PAN,n/a
";
        let err = loader()
            .read_settlement_table(data.as_bytes(), "hub prices", 2022)
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(matches!(err, IscError::Schema { .. }));
    }

    #[test]
    fn test_row_outside_year_rejected() {
        let data = "\
Delivery Date,Hour Ending,Settlement Point,Settlement Point Price
12/31/2021,24:00,HB_SOUTH,10
";
        assert!(loader()
            .read_settlement_table(data.as_bytes(), "hub prices", 2022)
            .is_err());
    }

    #[test]
    fn test_read_capacity_with_padded_headers() {
        let data = "\
Delivery Date,REGDN,REGUP ,RRS,NSPIN
01/01/2023,1.0,2.0,3.0,4.0
01/02/2023,2.0,4.0,6.0,8.0
";
        let table = loader()
            .read_capacity_table(data.as_bytes(), "caps", 2023)
            .unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].reg_up, 2.0);
        assert_eq!(table.records[1].average(), 5.0);
        assert_eq!(table.records[0].hour_ending, None);
    }

    #[test]
    fn test_missing_service_column() {
        let data = "Delivery Date,REGDN,REGUP,RRS\n01/01/2023,1,2,3\n";
        let err = loader()
            .read_capacity_table(data.as_bytes(), "caps", 2023)
            .unwrap_err();
        assert!(err.to_string().contains("NSPIN"));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(settlement_file_name(2024));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "Delivery Date,Hour Ending,Settlement Point,Settlement Point Price").unwrap();
        writeln!(file, "2024-02-29,13,HB_WEST,-5.5").unwrap();
        drop(file);

        let table = loader().load_settlement_table(&path, 2024).unwrap();
        assert_eq!(table.zone_records(HubZone::West)[0].price, -5.5);

        let missing = loader().load_capacity_table(&dir.path().join("nope.csv"), 2024);
        assert!(matches!(missing, Err(IscError::Io { .. })));
    }
}
