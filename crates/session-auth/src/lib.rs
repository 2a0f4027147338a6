//! Credential handling for the session coordinator
//!
//! Provides the bearer credential type with its expiry claim, the durable
//! single-slot token store, and the renewal endpoint call. This crate has no
//! timers and no concurrency policy of its own; `session-core` composes these
//! pieces into the single-flight refresh engine.
//!
//! Credential flow:
//! 1. Login hands a raw credential to `Credential::parse()`
//! 2. The credential is kept via `TokenStore::set()` and mirrored to the slot
//! 3. On expiry or a 401, `renewal::renew()` fetches a replacement
//! 4. The replacement goes back through `TokenStore::set()`
//! 5. Logout or a failed renewal calls `TokenStore::clear()`

pub mod constants;
pub mod credential;
pub mod error;
pub mod renewal;
pub mod store;

pub use constants::*;
pub use credential::Credential;
pub use error::{Error, Result};
pub use renewal::{RenewalResponse, renew};
pub use store::{Slot, TokenStore};
