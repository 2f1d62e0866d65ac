pub mod config;
pub mod database;
pub mod env;
pub mod logging;
pub mod paths;
pub mod signals;

pub use config::*;
pub use database::*;
pub use logging::*;
pub use signals::*;
