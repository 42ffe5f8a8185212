pub mod cancel;
pub mod logging;
pub mod metrics;
