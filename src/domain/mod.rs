// Domain layer: input records, reporting periods, metric services and ports.
// No I/O here; adapters and pipelines live outside.

pub mod channel;
pub mod model;
pub mod period;
pub mod ports;

pub mod services;
