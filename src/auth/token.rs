//! Token secrets and cached token records.

pub mod record;
pub mod secret;
