pub mod config;
pub mod data_loader;
pub mod engine;
pub mod error;
pub mod hub_zone_map;
pub mod models;
pub mod rcp;
pub mod reap;
pub mod reference_price;
pub mod report;
pub mod revenue;
pub mod strike_price;

pub use config::MarketRules;
pub use data_loader::DataLoader;
pub use engine::{IscEngine, IscRun};
pub use error::{IscError, IscResult};
pub use hub_zone_map::HubZoneMap;
pub use models::{HubZone, MarketInputs, MonthlySeries, RunParameters, WindowRegime, ZoneTable};
pub use reap::ReapCalculator;
pub use revenue::{IncentiveOutcome, ZoneIsc};
pub use strike_price::{calculate_strike_price, StrikePrice};
