//! Identity types, role sets, and the access-token record held by the session.

pub mod id;
pub mod roles;
pub mod token;

pub use id::*;
pub use roles::*;
pub use token::{claims::*, record::*, secret::*};
