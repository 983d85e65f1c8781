pub mod auth;
pub mod blob;
pub mod cleanup;
pub mod convert;
pub mod error;
pub mod identity;
pub mod listings;
pub mod middleware;
pub mod notifications;
pub mod pagination;
pub mod push;
pub mod questionnaire;
pub mod recent_searches;
pub mod reports;
pub mod router;
pub mod search;
pub mod state;
pub mod upload;
pub mod users;

pub use error::ApiError;
pub use router::build_router;
pub use state::{AppState, AppStateInner};
