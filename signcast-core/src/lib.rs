pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod origin;
pub mod registry;
pub mod resolver;
pub mod timeline;

pub use config::Config;
pub use error::{Error, Result};
pub use registry::Registry;
