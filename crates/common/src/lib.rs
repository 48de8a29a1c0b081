// atelier-common: shared data model for the design document engine.

pub mod controls;
pub mod jobs;
pub mod path;
pub mod protocol;
pub mod schema;
pub mod types;
