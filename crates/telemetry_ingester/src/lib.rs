pub mod clickhouse;
pub mod domain;
pub mod mqtt;
mod telemetry_ingester;

pub use clickhouse::*;
pub use domain::*;
pub use telemetry_ingester::*;
