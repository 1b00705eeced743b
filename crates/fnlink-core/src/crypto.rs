//! Cryptographic primitives for the appliance control protocol.
//!
//! The login handshake wraps a random per-session AES key with the server's
//! RSA public key, protects the credential payload with AES-256-CBC, and
//! signs post-login traffic with HMAC-SHA256 under the negotiated session
//! secret. The discovery REST lookup uses the MD5/SHA-256 digest helpers.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::{distributions::Alphanumeric, Rng};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{NasError, NasResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Length of the per-session symmetric key, as an alphanumeric string.
pub const SESSION_KEY_LEN: usize = 32;

/// AES-CBC initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// Random alphanumeric (A-Z a-z 0-9) string of length `len` from the
/// process CSPRNG. Generated once per session as the symmetric key.
pub fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh random initialization vector.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill(&mut iv);
    iv
}

/// Random 16-byte hex token, used as entry-token cookie material.
pub fn entry_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// HMAC-SHA256 signature of `payload`, base64-encoded.
///
/// The signing secret normally arrives base64-encoded; when it does not
/// decode (the degraded raw-secret path), its raw bytes key the MAC instead.
pub fn signature(payload: &str, secret: &str) -> String {
    let key = BASE64
        .decode(secret)
        .unwrap_or_else(|_| secret.as_bytes().to_vec());
    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// AES-256-CBC/PKCS7 encryption; returns base64 ciphertext.
pub fn aes_encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> NasResult<String> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| NasError::Crypto(format!("bad key/iv length: {e}")))?;
    Ok(BASE64.encode(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)))
}

/// AES-256-CBC/PKCS7 decryption of base64 ciphertext.
///
/// Returns the recovered plaintext base64-encoded — the session secret is
/// carried in that form on the wire and as the signing key source.
pub fn aes_decrypt(ciphertext: &str, key: &[u8], iv: &[u8]) -> NasResult<String> {
    let data = BASE64
        .decode(ciphertext)
        .map_err(|e| NasError::Crypto(format!("ciphertext is not valid base64: {e}")))?;
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| NasError::Crypto(format!("bad key/iv length: {e}")))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&data)
        .map_err(|_| NasError::Crypto("decryption produced invalid padding".into()))?;
    Ok(BASE64.encode(plaintext))
}

/// PKCS#1 v1.5 encryption of `data` under the server public key; returns
/// base64 ciphertext.
///
/// Appliances hand the key out as bare base64 DER without PEM delimiters;
/// any armor and whitespace is stripped before decoding. A malformed key or
/// an encryption rejection fails the handshake — credentials are never sent
/// unencrypted.
pub fn rsa_encrypt(data: &[u8], public_key: &str) -> NasResult<String> {
    let key = decode_public_key(public_key)?;
    let ciphertext = key
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
        .map_err(|e| NasError::Handshake(format!("asymmetric encryption failed: {e}")))?;
    Ok(BASE64.encode(ciphertext))
}

fn decode_public_key(material: &str) -> NasResult<RsaPublicKey> {
    let body: String = material
        .replace("-----BEGIN PUBLIC KEY-----", "")
        .replace("-----END PUBLIC KEY-----", "")
        .replace("-----BEGIN RSA PUBLIC KEY-----", "")
        .replace("-----END RSA PUBLIC KEY-----", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let der = BASE64
        .decode(body.as_bytes())
        .map_err(|e| NasError::Handshake(format!("server public key is not valid base64: {e}")))?;
    match RsaPublicKey::from_public_key_der(&der) {
        Ok(key) => Ok(key),
        Err(_) => RsaPublicKey::from_pkcs1_der(&der)
            .map_err(|e| NasError::Handshake(format!("server public key rejected: {e}"))),
    }
}

/// Lowercase hex MD5 digest.
pub fn md5_hex(data: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}
