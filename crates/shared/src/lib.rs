pub mod auth;
pub mod config;
pub mod logging;

pub use auth::*;
pub use config::*;
pub use logging::*;
