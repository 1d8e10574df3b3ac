//! Stable log codes.
//!
//! Attached as the `code` field on every warn/error event so that log
//! pipelines can match on something better than message text.

/// Submitting an attack commitment failed.
pub const ATTACK_COMMIT_FAILED: &str = "E_ATTACK_COMMIT_FAILED";
/// Submitting a cell reveal failed.
pub const ATTACK_REVEAL_FAILED: &str = "E_ATTACK_REVEAL_FAILED";
/// Board secrets are not available in this session.
pub const SECRET_LOCKED: &str = "E_SECRET_LOCKED";
/// A stored vault payload did not decrypt under the session key.
pub const SECRET_DECRYPT_FAILED: &str = "E_SECRET_DECRYPT_FAILED";
/// Fetching chain events failed.
pub const EVENT_POLL_FAILED: &str = "E_EVENT_POLL_FAILED";
/// A recognised event did not match its wire layout.
pub const EVENT_PARSE_FAILED: &str = "E_EVENT_PARSE_FAILED";
/// A write action is being submitted.
pub const TX_EXECUTE: &str = "TX_EXECUTE";
/// A write action was accepted.
pub const TX_CONFIRMED: &str = "TX_CONFIRMED";
/// Persisting sync state failed.
pub const STORE_WRITE_FAILED: &str = "E_STORE_WRITE_FAILED";
