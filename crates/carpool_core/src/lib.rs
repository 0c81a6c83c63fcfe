pub mod clock;
pub mod config;
pub mod error;
pub mod matching;
pub mod model;
pub mod notify;
pub mod routing;
pub mod runner;
pub mod store;
pub mod telemetry;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
