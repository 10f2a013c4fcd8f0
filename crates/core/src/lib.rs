//! Domain model for the opsdesk record store: task trees, leave requests,
//! input validation and the access policy applied at the HTTP boundary.

pub mod access;
pub mod error;
pub mod filter;
pub mod notice;
pub mod tree;
pub mod types;
pub mod validate;

pub use access::{Role, UserContext};
pub use error::AccessError;
