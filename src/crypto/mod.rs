//! Cryptographic primitives: BLAKE3 hashing, the Merkle transaction
//! commitment, and Schnorr signatures.

mod hash;
mod merkle;
mod schnorr;

pub use hash::*;
pub use merkle::*;
pub use schnorr::*;
