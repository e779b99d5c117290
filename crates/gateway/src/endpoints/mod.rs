//! # Gatewayエンドポイント

pub mod access;
pub mod consent;
pub mod health;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use access::handle_access;
pub use consent::{handle_grant, handle_revoke, handle_status};
pub use health::handle_health;
pub use upload::handle_upload;
