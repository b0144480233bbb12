//! Access-token models: the session record, its redacted secret, and JWT payload claims.

pub mod claims;
pub mod record;
pub mod secret;
