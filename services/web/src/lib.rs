//! HTTP front end for the membership site
//!
//! Exposes the sign-in flows, the role-guarded member and admin areas and
//! the membership chat over JSON.

pub mod error;
pub mod middleware;
pub mod owner;
pub mod routes;
pub mod state;

pub use error::{WebError, WebResult};
pub use owner::{SessionOwner, SESSION_COOKIE};
pub use routes::create_router;
pub use state::AppState;
