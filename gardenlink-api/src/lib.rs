pub mod channel;
pub mod envelope;
pub mod models;

pub use channel::Channel;
pub use envelope::{DecryptError, EncryptedEnvelope, SharedSecret};
