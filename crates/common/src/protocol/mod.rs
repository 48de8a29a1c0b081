pub mod execute;
pub mod ndjson;
pub mod persist;
pub mod plan;
