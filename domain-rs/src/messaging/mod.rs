//! Message bus boundary: transport trait, test messenger and message signing
//!
//! The concrete broker (MQTT or otherwise) lives outside this crate; it only
//! has to implement the [`Messenger`] trait. [`DummyMessenger`] is an
//! in-process loopback used by tests and demos. [`MessageSigner`] wraps a
//! messenger with ed25519 sign-on-publish and verify-on-receive.

mod dummy;
mod messenger;
mod signer;

pub use dummy::{DummyMessenger, Publication};
pub use messenger::{Messenger, MessengerConfig, OnMessage};
pub use signer::{
    create_asym_keys, decode_public_key, encode_public_key, verify_command_signature,
    verify_sender_signature, MessageSigner, PublicKeyResolver, SignedEnvelope,
};
