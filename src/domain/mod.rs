// Port interfaces
pub mod ports;

// Metric data points
pub mod sample;

// Domain-specific error types
pub mod errors;
