use crate::models::HubZone;
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a reference price run. Any of these aborts the whole
/// (duration, capacity) run; there is no partial result.
#[derive(Error, Debug)]
pub enum IscError {
    #[error(
        "insufficient window data for {zone} {year}-{month:02} (window starting {window_start}): \
         {available} price points, {required} needed for disjoint high/low sets"
    )]
    InsufficientWindowData {
        zone: HubZone,
        year: i32,
        month: u32,
        window_start: NaiveDate,
        available: usize,
        required: usize,
    },

    #[error("strike price is undefined at zero duration: the cost of new entry divides by duration")]
    ZeroDuration,

    #[error("schema error in {table}: {message}")]
    Schema { table: String, message: String },

    #[error("no settlement records for zone {zone} in {year}; all five hub zones are required")]
    EmptyZone { zone: HubZone, year: i32 },

    #[error("{table} has no records for {year}-{month:02}; a full 12-month grid is required")]
    EmptyMonth { table: String, year: i32, month: u32 },

    #[error("month {0} is outside 1-12")]
    InvalidMonth(u32),

    #[error("invalid run parameters: {0}")]
    InvalidParameters(String),

    #[error("market years mismatch: {0}")]
    MarketYears(String),

    #[error("invalid market rules: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IscError {
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        IscError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }
}

pub type IscResult<T> = Result<T, IscError>;
