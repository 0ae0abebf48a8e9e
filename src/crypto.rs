//! Content hashes, the signable payload and the signature oracle
//!
//! Transaction and block identities are double SHA-256 over a deterministic
//! little-endian encoding. Signatures are DER-encoded secp256k1 ECDSA over the
//! SHA-256 digest of the signable payload of one input.

use crate::types::*;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey, Signing, VerifyOnly};
use sha2::{Digest, Sha256};

/// Signature oracle: `verify(public_key, message, signature) -> bool`.
///
/// Implementations must be deterministic; the validator caches their answers
/// for the duration of one selection search.
pub trait SignatureVerifier {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// secp256k1 ECDSA verifier over SHA-256 message digests
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let pubkey = match PublicKey::from_slice(public_key) {
            Ok(pk) => pk,
            Err(_) => return false,
        };

        let signature = match Signature::from_der(signature) {
            Ok(sig) => sig,
            Err(_) => return false,
        };

        let digest = Sha256::digest(message);
        let message = match Message::from_digest_slice(&digest) {
            Ok(msg) => msg,
            Err(_) => return false,
        };

        self.secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
    }
}

impl<T: SignatureVerifier + ?Sized> SignatureVerifier for &T {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        (**self).verify(public_key, message, signature)
    }
}

/// Sign input `index` of `tx` with `secret_key`, returning the DER signature.
///
/// The signature does not cover any input signature, so inputs may be signed
/// in any order.
pub fn sign_input<C: Signing>(
    secp: &Secp256k1<C>,
    secret_key: &SecretKey,
    tx: &Transaction,
    index: usize,
) -> ByteString {
    let digest = Sha256::digest(signable_payload(tx, index));
    // A SHA-256 digest is always 32 bytes
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    let message = Message::from_digest(bytes);
    secp.sign_ecdsa(&message, secret_key).serialize_der().to_vec()
}

/// Canonical bytes signed by the owner of input `index`.
///
/// Layout: version, input count, every input's outpoint (signatures
/// excluded), output count, every output (value, recipient), lock time and
/// finally the index of the input being signed.
pub fn signable_payload(tx: &Transaction, index: usize) -> ByteString {
    let mut data = Vec::new();
    data.extend_from_slice(&tx.version.to_le_bytes());

    data.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        write_outpoint(&mut data, &input.prevout);
    }

    write_outputs(&mut data, &tx.outputs);
    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data.extend_from_slice(&(index as u64).to_le_bytes());
    data
}

/// Transaction id: SHA256d over the full encoding, signatures included
pub fn calculate_tx_id(tx: &Transaction) -> Hash {
    let mut data = Vec::new();
    data.extend_from_slice(&tx.version.to_le_bytes());

    data.extend_from_slice(&(tx.inputs.len() as u64).to_le_bytes());
    for input in &tx.inputs {
        write_outpoint(&mut data, &input.prevout);
        write_bytes(&mut data, &input.signature);
    }

    write_outputs(&mut data, &tx.outputs);
    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    sha256d_hash(&data)
}

/// Block hash: SHA256d over the parent hash and the ids of every transaction
pub fn calculate_block_hash(block: &Block) -> Hash {
    let mut data = Vec::new();
    match &block.prev_block_hash {
        Some(prev) => {
            data.push(1);
            data.extend_from_slice(prev);
        }
        None => data.push(0),
    }

    data.extend_from_slice(&(block.transactions.len() as u64).to_le_bytes());
    for tx in &block.transactions {
        data.extend_from_slice(&calculate_tx_id(tx));
    }
    data.extend_from_slice(&calculate_tx_id(&block.coinbase));
    sha256d_hash(&data)
}

/// Lowercase hex rendering of a hash, for logs
pub fn to_hex(hash: &Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

fn sha256d_hash(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

fn write_outpoint(data: &mut Vec<u8>, outpoint: &OutPoint) {
    data.extend_from_slice(&outpoint.hash);
    data.extend_from_slice(&outpoint.index.to_le_bytes());
}

fn write_outputs(data: &mut Vec<u8>, outputs: &[TransactionOutput]) {
    data.extend_from_slice(&(outputs.len() as u64).to_le_bytes());
    for output in outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        write_bytes(data, &output.recipient);
    }
}

fn write_bytes(data: &mut Vec<u8>, bytes: &[u8]) {
    data.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    data.extend_from_slice(bytes);
}
