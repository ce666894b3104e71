mod ieq_scorer;
mod in_memory_reading_repository;
pub mod payload_validator;
mod pipeline_worker;
mod raw_message_queue;
mod telemetry_pipeline_service;

pub use ieq_scorer::*;
pub use in_memory_reading_repository::*;
pub use payload_validator::validate;
pub use pipeline_worker::*;
pub use raw_message_queue::*;
pub use telemetry_pipeline_service::*;
