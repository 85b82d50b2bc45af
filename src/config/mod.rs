//! Query settings and their loading

mod errors;
mod settings;

pub use errors::ConfigError;
pub use settings::{OverflowMode, Settings, TotalsMode};
