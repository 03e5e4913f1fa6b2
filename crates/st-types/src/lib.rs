pub mod config;
pub mod errors;
pub mod metrics;

pub use config::*;
pub use errors::*;
pub use metrics::*;
