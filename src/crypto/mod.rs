//! Crypto storage
//!
//! Lifecycle of stored encryption keys. Keys are plain records, not part
//! of the event stream.

mod keys;

pub use keys::{EncryptionKey, EncryptionKeys};
