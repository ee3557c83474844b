pub mod analysis;
pub mod config;
pub mod error;
pub mod table;

pub use config::Config;
pub use error::{AnalysisError, Result};
pub use table::Table;
