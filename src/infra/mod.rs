mod api;
mod config;
mod logging;

pub use api::*;
pub use config::*;
pub use logging::*;
