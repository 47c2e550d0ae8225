pub mod events;
pub mod http;
pub mod rate_limit;

pub use http::{create_router, AppState};
