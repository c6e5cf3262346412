//! Message signing and verification
//!
//! Publications are ed25519-signed JSON payloads wrapped in a
//! [`SignedEnvelope`]. Verification resolves the claimed sender's public key
//! through a [`PublicKeyResolver`] before the payload is ever decoded; a
//! message whose signer is unknown is dropped, never queued for retry. The
//! signer's identity announcement is expected to arrive on its own.

use super::messenger::{Messenger, OnMessage};
use crate::address::Address;
use crate::errors::{DomainError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Resolves a publisher ID to its current public key, or None when the
/// publisher is unknown. Supplied externally; key material is never owned
/// by the directories that hold a resolver.
pub type PublicKeyResolver = Arc<dyn Fn(&str) -> Option<VerifyingKey> + Send + Sync>;

/// Envelope around a signed publication: the serialized payload plus the
/// hex encoded ed25519 signature over the payload bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: String,
    pub signature: String,
}

/// Generate a new ed25519 keypair for signing publications
pub fn create_asym_keys() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// Hex encode a public key for transport in identity messages
pub fn encode_public_key(key: &VerifyingKey) -> String {
    hex::encode(key.to_bytes())
}

/// Decode a hex encoded public key from an identity message
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(encoded)
        .map_err(|e| DomainError::Identity(format!("invalid public key encoding: {}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| DomainError::Identity("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| DomainError::Identity(format!("invalid public key: {}", e)))
}

fn verify_envelope_signature(
    public_key: &VerifyingKey,
    envelope: &SignedEnvelope,
    address: &str,
) -> Result<()> {
    let sig_bytes = hex::decode(&envelope.signature)
        .map_err(|e| DomainError::Signature(format!("invalid signature encoding: {}", e)))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| DomainError::Signature("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    public_key
        .verify(envelope.payload.as_bytes(), &signature)
        .map_err(|_| {
            DomainError::Signature(format!("message on '{}' failed verification", address))
        })
}

/// Verify a received publication against the claimed sender's public key.
///
/// The sender is the second segment of the publication address; this is the
/// verification for discovery and value publications, which a publisher
/// emits on its own addresses. On success the still-serialized payload is
/// returned for decoding by the caller. Error kinds are distinct per
/// failure step: address parse, unresolved signer, malformed envelope,
/// failed verification.
pub fn verify_sender_signature(
    address: &str,
    message: &str,
    resolver: &PublicKeyResolver,
) -> Result<String> {
    let parsed = Address::parse(address)?;

    let public_key = resolver(&parsed.publisher_id)
        .ok_or_else(|| DomainError::UnknownSigner(parsed.publisher_id.clone()))?;

    let envelope: SignedEnvelope = serde_json::from_str(message).map_err(|e| {
        DomainError::Decode(format!("message on '{}' is not a signed envelope: {}", address, e))
    })?;

    verify_envelope_signature(&public_key, &envelope, address)?;
    Ok(envelope.payload)
}

/// Verify a received command against the key of the publisher named in the
/// payload's `sender` field.
///
/// Commands (`$set`, `$configure`, `$setNodeId`) are published on the
/// *target* publisher's address, so the signer is not the address's second
/// segment. The claimed sender rides in the payload as an address; the
/// signature check is what makes the claim trustworthy. On success the
/// still-serialized payload is returned for decoding by the caller.
pub fn verify_command_signature(
    address: &str,
    message: &str,
    resolver: &PublicKeyResolver,
) -> Result<String> {
    #[derive(Deserialize)]
    struct SenderField {
        sender: String,
    }

    let envelope: SignedEnvelope = serde_json::from_str(message).map_err(|e| {
        DomainError::Decode(format!("command on '{}' is not a signed envelope: {}", address, e))
    })?;
    let claimed: SenderField = serde_json::from_str(&envelope.payload).map_err(|e| {
        DomainError::Decode(format!("command on '{}' carries no sender: {}", address, e))
    })?;
    let sender = Address::parse(&claimed.sender)?;

    let public_key = resolver(&sender.publisher_id)
        .ok_or_else(|| DomainError::UnknownSigner(sender.publisher_id.clone()))?;

    verify_envelope_signature(&public_key, &envelope, address)?;
    Ok(envelope.payload)
}

/// Signs outgoing publications and carries the key resolver for inbound
/// verification. Cheap to clone behind an Arc; shared by the publisher and
/// all of its directories.
pub struct MessageSigner {
    messenger: Arc<dyn Messenger>,
    signing_key: Option<SigningKey>,
    key_resolver: PublicKeyResolver,
}

impl MessageSigner {
    /// Create a signer. Without a signing key, publications go out unsigned
    /// and will be rejected by verifying subscribers.
    pub fn new(
        messenger: Arc<dyn Messenger>,
        signing_key: Option<SigningKey>,
        key_resolver: PublicKeyResolver,
    ) -> Self {
        MessageSigner {
            messenger,
            signing_key,
            key_resolver,
        }
    }

    /// The public key of the given publisher, from the configured resolver
    pub fn get_public_key(&self, publisher_id: &str) -> Option<VerifyingKey> {
        (self.key_resolver)(publisher_id)
    }

    /// A clone of the resolver, for directories doing their own verification
    pub fn resolver(&self) -> PublicKeyResolver {
        self.key_resolver.clone()
    }

    /// This signer's own public key, if it has a signing key
    pub fn public_key(&self) -> Option<VerifyingKey> {
        self.signing_key.as_ref().map(|k| k.verifying_key())
    }

    /// Serialize, sign and publish an object on the given address
    pub fn publish_object<T: Serialize>(
        &self,
        address: &str,
        retained: bool,
        object: &T,
    ) -> Result<()> {
        let payload = serde_json::to_string(object)?;
        self.publish_signed(address, retained, &payload)
    }

    /// Sign and publish an already serialized payload
    pub fn publish_signed(&self, address: &str, retained: bool, payload: &str) -> Result<()> {
        let message = match &self.signing_key {
            Some(key) => {
                let signature = key.sign(payload.as_bytes());
                let envelope = SignedEnvelope {
                    payload: payload.to_string(),
                    signature: hex::encode(signature.to_bytes()),
                };
                serde_json::to_string(&envelope)?
            }
            None => payload.to_string(),
        };
        self.messenger.publish(address, retained, &message)
    }

    /// Verify a received publication; see [`verify_sender_signature`]
    pub fn verify_signed_message(&self, address: &str, message: &str) -> Result<String> {
        verify_sender_signature(address, message, &self.key_resolver)
    }

    /// Verify a received command; see [`verify_command_signature`]
    pub fn verify_signed_command(&self, address: &str, message: &str) -> Result<String> {
        verify_command_signature(address, message, &self.key_resolver)
    }

    /// Subscribe the handler to an address pattern on the underlying bus
    pub fn subscribe(&self, pattern: &str, handler: OnMessage) {
        self.messenger.subscribe(pattern, handler);
    }

    /// Drop the subscription for an address pattern
    pub fn unsubscribe(&self, pattern: &str) {
        self.messenger.unsubscribe(pattern);
    }
}
