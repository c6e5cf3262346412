//! Publisher identities: this publisher's own signing identity and the
//! directory of discovered domain publisher identities
//!
//! The domain identity directory is the source of every
//! [`PublicKeyResolver`] in the crate: verification of any discovery message
//! looks up the claimed sender here. Identity announcements themselves are
//! admitted trust-on-first-use: a previously unknown publisher is verified
//! against the public key embedded in its own announcement, a known
//! publisher must sign with the key already on record.

use crate::address::{make_identity_address, Address, MSG_TYPE_IDENTITY};
use crate::directory::DomainDirectory;
use crate::errors::{DomainError, Result};
use crate::messaging::{
    create_asym_keys, decode_public_key, encode_public_key, MessageSigner, PublicKeyResolver,
    SignedEnvelope,
};
use crate::persist;
use crate::types::{PublisherFullIdentity, PublisherIdentityMessage};
use chrono::{Duration, Utc};
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// This publisher's own identity and signing key, loaded from or saved to
/// the config folder.
pub struct RegisteredIdentity {
    identity_file: PathBuf,
    full: PublisherFullIdentity,
    signing_key: SigningKey,
}

impl RegisteredIdentity {
    /// Load the saved identity, or create and save a new one when the file
    /// is missing, unreadable, or does not match this domain/publisher.
    pub fn load_or_create(domain: &str, publisher_id: &str, identity_file: &Path) -> Result<Self> {
        match Self::load(domain, publisher_id, identity_file) {
            Ok(identity) => Ok(identity),
            Err(err) => {
                info!(domain, publisher_id, %err, "creating new publisher identity");
                let identity = Self::create(domain, publisher_id, identity_file);
                identity.save()?;
                Ok(identity)
            }
        }
    }

    fn load(domain: &str, publisher_id: &str, identity_file: &Path) -> Result<Self> {
        let content = fs::read_to_string(identity_file)?;
        let full: PublisherFullIdentity = serde_json::from_str(&content)?;
        if full.public.domain != domain || full.public.publisher_id != publisher_id {
            return Err(DomainError::Identity(format!(
                "saved identity is for {}/{}, not {}/{}",
                full.public.domain, full.public.publisher_id, domain, publisher_id
            )));
        }
        let seed = hex::decode(&full.private_key)
            .map_err(|e| DomainError::Identity(format!("invalid private key encoding: {}", e)))?;
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| DomainError::Identity("private key must be 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);

        // the stored public key must belong to the stored private key
        if full.public.public_key != encode_public_key(&signing_key.verifying_key()) {
            return Err(DomainError::Identity(
                "saved public key does not match private key".to_string(),
            ));
        }
        Ok(RegisteredIdentity {
            identity_file: identity_file.to_path_buf(),
            full,
            signing_key,
        })
    }

    fn create(domain: &str, publisher_id: &str, identity_file: &Path) -> Self {
        let signing_key = create_asym_keys();
        let now = Utc::now();
        let public = PublisherIdentityMessage {
            address: make_identity_address(domain, publisher_id),
            domain: domain.to_string(),
            publisher_id: publisher_id.to_string(),
            public_key: encode_public_key(&signing_key.verifying_key()),
            issuer_id: publisher_id.to_string(),
            location: String::new(),
            organization: String::new(),
            timestamp: now,
            valid_until: Some(now + Duration::days(365)),
        };
        RegisteredIdentity {
            identity_file: identity_file.to_path_buf(),
            full: PublisherFullIdentity {
                public,
                private_key: hex::encode(signing_key.to_bytes()),
            },
            signing_key,
        }
    }

    /// Save the full identity, private key included, to the identity file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.identity_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.full)?;
        fs::write(&self.identity_file, content)?;
        Ok(())
    }

    /// The public identity message as published on the identity address
    pub fn public_identity(&self) -> PublisherIdentityMessage {
        self.full.public.clone()
    }

    pub fn signing_key(&self) -> SigningKey {
        self.signing_key.clone()
    }
}

/// Directory of discovered domain publisher identities
pub struct DomainPublisherIdentities {
    directory: DomainDirectory<PublisherIdentityMessage>,
}

impl DomainPublisherIdentities {
    /// Create the identity directory. Its own key resolver resolves against
    /// itself: identity re-announcements of known publishers verify against
    /// the key already on record.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<DomainPublisherIdentities>| {
            let weak = weak.clone();
            let resolver: PublicKeyResolver = Arc::new(move |publisher_id: &str| {
                weak.upgrade()
                    .and_then(|identities| identities.get_publisher_key(publisher_id))
            });
            DomainPublisherIdentities {
                directory: DomainDirectory::new(resolver),
            }
        })
    }

    /// A resolver backed by this directory, for the other entity directories
    pub fn resolver(self: &Arc<Self>) -> PublicKeyResolver {
        let weak = Arc::downgrade(self);
        Arc::new(move |publisher_id: &str| {
            weak.upgrade()
                .and_then(|identities| identities.get_publisher_key(publisher_id))
        })
    }

    /// Add or replace a publisher identity
    pub fn add_identity(&self, identity: &PublisherIdentityMessage) {
        self.directory.update(&identity.address, identity.clone());
    }

    /// The identity published on the given identity address, if known
    pub fn get_by_address(&self, address: &str) -> Option<PublisherIdentityMessage> {
        self.directory.get_by_address(address)
    }

    /// The current public key of the given publisher, or None when unknown
    /// or when its published key does not decode
    pub fn get_publisher_key(&self, publisher_id: &str) -> Option<VerifyingKey> {
        let identity = self
            .directory
            .get_all()
            .into_iter()
            .find(|identity| identity.publisher_id == publisher_id)?;
        match decode_public_key(&identity.public_key) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(publisher_id, %err, "stored publisher key does not decode");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.directory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    pub fn update_count(&self) -> usize {
        self.directory.update_count()
    }

    /// Load cached identities from file; resets the update counter
    pub fn load_identities(&self, path: &Path) -> Result<()> {
        let identities: Vec<PublisherIdentityMessage> = persist::load_entities(path)?;
        self.directory.import(identities);
        Ok(())
    }

    /// Save all identities to file and reset the update counter
    pub fn save_identities(&self, path: &Path) -> Result<()> {
        persist::save_entities(path, &self.directory.get_all())?;
        self.directory.reset_update_count();
        Ok(())
    }
}

/// Listener for publisher identity announcements on `{domain}/+/$identity`
pub struct ReceivePublisherIdentities {
    domain: String,
    identities: Arc<DomainPublisherIdentities>,
    signer: Arc<MessageSigner>,
}

impl ReceivePublisherIdentities {
    pub fn new(
        domain: &str,
        identities: Arc<DomainPublisherIdentities>,
        signer: Arc<MessageSigner>,
    ) -> Self {
        ReceivePublisherIdentities {
            domain: domain.to_string(),
            identities,
            signer,
        }
    }

    fn address_pattern(&self) -> String {
        format!("{}/+/{}", self.domain, MSG_TYPE_IDENTITY)
    }

    pub fn start(&self) {
        let identities = self.identities.clone();
        self.signer.subscribe(
            &self.address_pattern(),
            Arc::new(move |address, message| {
                receive_publisher_identity(&identities, address, message)
            }),
        );
    }

    pub fn stop(&self) {
        self.signer.unsubscribe(&self.address_pattern());
    }
}

/// Ingest one identity announcement. Known publishers must sign with the key
/// on record; unknown publishers are verified against the key embedded in
/// the announcement itself and admitted trust-on-first-use.
fn receive_publisher_identity(
    identities: &Arc<DomainPublisherIdentities>,
    address: &str,
    message: &str,
) -> Result<()> {
    let parsed = Address::parse(address)?;

    let envelope: SignedEnvelope = serde_json::from_str(message).map_err(|e| {
        DomainError::Decode(format!("identity on '{}' is not a signed envelope: {}", address, e))
    })?;
    let identity: PublisherIdentityMessage =
        serde_json::from_str(&envelope.payload).map_err(|e| {
            DomainError::Decode(format!("payload on '{}' is not an identity: {}", address, e))
        })?;

    // an announcement may not claim another publisher's address
    if identity.publisher_id != parsed.publisher_id {
        return Err(DomainError::Signature(format!(
            "identity for '{}' announced on address of '{}'",
            identity.publisher_id, parsed.publisher_id
        )));
    }

    let verifying_key = match identities.get_publisher_key(&parsed.publisher_id) {
        Some(known_key) => known_key,
        None => decode_public_key(&identity.public_key)?,
    };

    let sig_bytes = hex::decode(&envelope.signature)
        .map_err(|e| DomainError::Signature(format!("invalid signature encoding: {}", e)))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| DomainError::Signature("signature must be 64 bytes".to_string()))?;
    verifying_key
        .verify(envelope.payload.as_bytes(), &Signature::from_bytes(&sig_bytes))
        .map_err(|_| {
            DomainError::Signature(format!("identity on '{}' failed verification", address))
        })?;

    identities.add_identity(&identity);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{DummyMessenger, MessengerConfig};
    use tempfile::TempDir;

    fn make_identity(domain: &str, publisher_id: &str) -> (RegisteredIdentity, TempDir) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(format!("{}-identity.json", publisher_id));
        let identity = RegisteredIdentity::load_or_create(domain, publisher_id, &file).unwrap();
        (identity, dir)
    }

    #[test]
    fn test_identity_create_and_reload() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pub1-identity.json");

        let created = RegisteredIdentity::load_or_create("local", "pub1", &file).unwrap();
        let reloaded = RegisteredIdentity::load_or_create("local", "pub1", &file).unwrap();
        assert_eq!(
            created.public_identity().public_key,
            reloaded.public_identity().public_key
        );

        // a different publisher does not inherit the saved identity
        let other = RegisteredIdentity::load_or_create("local", "pub2", &file).unwrap();
        assert_ne!(
            created.public_identity().public_key,
            other.public_identity().public_key
        );
    }

    #[test]
    fn test_receive_identity_trust_on_first_use() {
        let (identity, _dir) = make_identity("local", "pub1");
        let identities = DomainPublisherIdentities::new();
        let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
        let signer = Arc::new(MessageSigner::new(
            messenger.clone(),
            Some(identity.signing_key()),
            identities.resolver(),
        ));

        let receiver = ReceivePublisherIdentities::new("local", identities.clone(), signer.clone());
        receiver.start();

        signer
            .publish_object("local/pub1/$identity", true, &identity.public_identity())
            .unwrap();

        assert!(identities.get_publisher_key("pub1").is_some());
        assert_eq!(
            identities.get_publisher_key("pub1").unwrap(),
            identity.signing_key().verifying_key()
        );
    }

    #[test]
    fn test_known_publisher_cannot_be_replaced_by_other_key() {
        let (identity, _dir) = make_identity("local", "pub1");
        let identities = DomainPublisherIdentities::new();
        identities.add_identity(&identity.public_identity());

        // an impersonator with its own keypair announces under pub1's address
        let (impersonator, _dir2) = make_identity("local", "pub1");
        let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
        let rogue_signer = Arc::new(MessageSigner::new(
            messenger.clone(),
            Some(impersonator.signing_key()),
            identities.resolver(),
        ));

        let receiver =
            ReceivePublisherIdentities::new("local", identities.clone(), rogue_signer.clone());
        receiver.start();

        rogue_signer
            .publish_object("local/pub1/$identity", true, &impersonator.public_identity())
            .unwrap();

        // the recorded key is still the original one
        assert_eq!(
            identities.get_publisher_key("pub1").unwrap(),
            identity.signing_key().verifying_key()
        );
    }

    #[test]
    fn test_identity_save_and_load_cache() {
        let (identity, dir) = make_identity("local", "pub1");
        let identities = DomainPublisherIdentities::new();
        identities.add_identity(&identity.public_identity());
        assert_eq!(identities.update_count(), 1);

        let cache = dir.path().join("pub1-domainpublishers.json");
        identities.save_identities(&cache).unwrap();
        assert_eq!(identities.update_count(), 0);

        let restored = DomainPublisherIdentities::new();
        restored.load_identities(&cache).unwrap();
        assert!(restored.get_publisher_key("pub1").is_some());
        assert_eq!(restored.update_count(), 0);
    }
}
