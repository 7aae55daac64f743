//! ECDH-sealed secrets.
//!
//! Wire form: hex of `nonce(12) || ciphertext || tag(16)`. The AES-256-GCM
//! key is SHA-256 of the X25519 shared secret, so the user seals with
//! (user secret, gateway public) and the gateway opens with
//! (gateway secret, user public).

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use x25519_dalek::{PublicKey, StaticSecret};

use gridgate_core::{GatewayError, Result};

fn derive_key(secret: &StaticSecret, peer: &PublicKey) -> Result<LessSafeKey> {
    let shared = secret.diffie_hellman(peer);
    if !shared.was_contributory() {
        return Err(GatewayError::validation("peer public key is a low-order point"));
    }
    let key = digest(&SHA256, shared.as_bytes());
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_ref())
        .map_err(|_| GatewayError::validation("failed to derive secret key"))?;
    Ok(LessSafeKey::new(unbound))
}

/// Decrypt a hex secret sealed for `secret` by the holder of `peer`.
///
/// Any failure (bad hex, short input, wrong key, tampering) is a
/// validation error.
pub fn open_secret(ciphertext: &str, secret: &StaticSecret, peer: &PublicKey) -> Result<String> {
    let raw = hex::decode(ciphertext.trim())
        .map_err(|e| GatewayError::validation(format!("secret is not valid hex: {e}")))?;
    if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(GatewayError::validation("secret is too short"));
    }
    let (nonce, sealed) = raw.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| GatewayError::validation("invalid secret nonce"))?;

    let key = derive_key(secret, peer)?;
    let mut in_out = sealed.to_vec();
    let plain = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| GatewayError::validation("failed to decrypt secret"))?;
    String::from_utf8(plain.to_vec())
        .map_err(|_| GatewayError::validation("decrypted secret is not utf-8"))
}

/// Encrypt `plaintext` for the holder of the secret behind `peer`
pub fn seal_secret(plaintext: &str, secret: &StaticSecret, peer: &PublicKey) -> Result<String> {
    let key = derive_key(secret, peer)?;
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| GatewayError::validation("no randomness available for nonce"))?;

    let mut in_out = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| GatewayError::validation("failed to encrypt secret"))?;

    let mut out = nonce.to_vec();
    out.extend_from_slice(&in_out);
    Ok(hex::encode(out))
}
