pub mod blender;
pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod geo;
pub mod ingress;
pub mod log_format;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod shutdown;
pub mod sources;
pub mod stats;
pub mod telemetry;
