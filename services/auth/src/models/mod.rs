//! Session, profile and role models

pub mod profile;
pub mod role;
pub mod session;

// Re-export for convenience
pub use profile::{NewProfile, UpdateProfile, UserProfile};
pub use role::{Role, has_permission};
pub use session::{Session, UserIdentity, UserMetadata};
