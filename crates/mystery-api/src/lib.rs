pub mod acceptance;
pub mod auth;
pub mod convert;
pub mod email;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod suggest;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use router::build_router;
