//! Infrastructure layer: storage, the deferred job queue, the material
//! lifecycle orchestration, background workers, external service clients and
//! configuration.

pub mod config;
pub mod external;
pub mod jobs;
pub mod lifecycle;
pub mod store;
pub mod workers;
