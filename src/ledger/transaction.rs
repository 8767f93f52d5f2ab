//! Transaction structure and signature verification
//!
//! Account-based value transfers: a sender address, an ordered list of
//! outputs, a fee, and a per-sender nonce. The transaction id is a pure
//! function of that content, so two semantically identical transactions
//! collide on id. Signatures authenticate (from, outputs, fee, nonce).

use serde::{Deserialize, Serialize};

use crate::crypto::{hash_bytes, Hash, PrivateKey, PublicKey, SchnorrSignature, SignatureError};

/// A client address, derived from a Schnorr public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    /// Derive the address owned by a public key
    pub fn from_pubkey(pub_key: &PublicKey) -> Self {
        Address(pub_key.to_address())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single payment within a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Recipient address
    pub address: Address,
    /// Amount of gold transferred
    pub amount: u64,
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address
    pub from: Address,
    /// Ordered outputs
    pub outputs: Vec<Output>,
    /// Fee paid to the miner who includes this transaction
    pub fee: u64,
    /// Per-sender sequence number; must match the sender's next nonce
    pub nonce: u64,
    /// Public key of the sender, set when signing
    pub pub_key: Option<PublicKey>,
    /// Signature over the signing hash, set when signing
    pub sig: Option<SchnorrSignature>,
}

impl Transaction {
    /// Create a new, unsigned transaction
    pub fn new(from: Address, outputs: Vec<Output>, fee: u64, nonce: u64) -> Self {
        Self {
            from,
            outputs,
            fee,
            nonce,
            pub_key: None,
            sig: None,
        }
    }

    /// Deterministic transaction id: the hash of the canonical content
    /// serialization. Excludes the signature, like the signing hash.
    pub fn id(&self) -> Hash {
        hash_bytes(&self.signing_bytes())
    }

    /// The hash that gets signed
    pub fn signing_hash(&self) -> Hash {
        hash_bytes(&self.signing_bytes())
    }

    /// Canonical serialization of (from, outputs, fee, nonce).
    /// Field order is fixed; changing it breaks id and signature
    /// compatibility across implementations.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        let from = self.from.as_str().as_bytes();
        bytes.extend_from_slice(&(from.len() as u32).to_le_bytes());
        bytes.extend_from_slice(from);

        bytes.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            let addr = output.address.as_str().as_bytes();
            bytes.extend_from_slice(&(addr.len() as u32).to_le_bytes());
            bytes.extend_from_slice(addr);
            bytes.extend_from_slice(&output.amount.to_le_bytes());
        }

        bytes.extend_from_slice(&self.fee.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());

        bytes
    }

    /// Total gold leaving the sender: all output amounts plus the fee.
    /// `None` when the sum does not fit in a `u64`; such a transaction can
    /// never be solvent and must be rejected, not wrapped.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(self.fee, |acc, o| acc.checked_add(o.amount))
    }

    /// Serialized size used for block size accounting
    pub fn size_bytes(&self) -> usize {
        let mut size = self.signing_bytes().len();
        if self.pub_key.is_some() {
            size += 32;
        }
        if self.sig.is_some() {
            size += 64;
        }
        size
    }

    /// Sign the transaction, embedding the public key and signature
    pub fn sign(&mut self, key: &PrivateKey) -> Result<(), SignatureError> {
        self.pub_key = Some(key.public_key());
        self.sig = Some(key.sign(&self.signing_hash())?);
        Ok(())
    }
}

/// External capability that authenticates a transaction's signature against
/// its (from, outputs, fee, nonce) content.
pub trait SignatureVerifier {
    fn verify(&self, tx: &Transaction) -> bool;
}

/// Default verifier: the embedded public key must derive the sender address,
/// and the Schnorr signature must verify over the signing hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchnorrVerifier;

impl SignatureVerifier for SchnorrVerifier {
    fn verify(&self, tx: &Transaction) -> bool {
        let (Some(pub_key), Some(sig)) = (&tx.pub_key, &tx.sig) else {
            return false;
        };
        if Address::from_pubkey(pub_key) != tx.from {
            return false;
        }
        pub_key.verify(&tx.signing_hash(), sig)
    }
}
