//! Hashid — obfuscates numeric primary/foreign keys on the way out of the
//! gateway and reverses it on the way in. This is deliberately not a
//! secrecy guarantee, only a barrier against trivially scanning the key
//! space through the API.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::domain::error::OinoError;

type HmacSha256 = Hmac<Sha256>;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashidMode {
    /// Deterministic per (domain, cell seed) — repeated reads of the same
    /// row produce the same token.
    Static,
    /// Fresh IV material on every call.
    Random,
}

impl HashidMode {
    pub fn from_static_flag(is_static: bool) -> Self {
        if is_static {
            HashidMode::Static
        } else {
            HashidMode::Random
        }
    }
}

/// A configured Hashid obfuscator. Holds the raw AES-128 key and the
/// domain discriminator; stateless otherwise.
#[derive(Clone)]
pub struct Hashid {
    key: [u8; 16],
    domain: String,
    min_length: usize,
    mode: HashidMode,
}

impl Hashid {
    /// `key_hex` must be exactly 32 hex characters (128 bits).
    /// `min_length` is clamped into the documented `[12, 42]` range.
    pub fn new(key_hex: &str, domain: impl Into<String>, min_length: usize, mode: HashidMode) -> Result<Self, OinoError> {
        let key = parse_key(key_hex)?;
        let min_length = min_length.clamp(12, 42);
        Ok(Hashid { key, domain: domain.into(), min_length, mode })
    }

    fn half_length(&self) -> usize {
        self.min_length.div_ceil(2)
    }

    /// Encode a plaintext numeric id (already stringified) under `cell_seed`
    /// (conventionally `"{field_name} {row_primary_key_seed}"`).
    pub fn encode(&self, id: &str, cell_seed: &str) -> Result<String, OinoError> {
        let half_len = self.half_length();
        let iv_seed = self.iv_seed(cell_seed, half_len)?;
        let iv = self.derive_iv(&iv_seed)?;

        let padded = pad_to(id, half_len);
        let cipher = Aes128Gcm::new_from_slice(&self.key).map_err(|e| OinoError::backend(format!("hashid key error: {e}")))?;
        let nonce = Nonce::from_slice(&iv[..12]);
        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: padded.as_bytes(), aad: &[] })
            .map_err(|e| OinoError::backend(format!("hashid encrypt failure: {e}")))?;

        // `ciphertext` is the AEAD body with its 16-byte tag already
        // appended; encode the whole thing as one base-X blob after the
        // public iv_seed prefix.
        Ok(format!("{iv_seed}{}", base_x_encode(&ciphertext)))
    }

    /// Inverse of `encode`. `cell_seed` must match the seed used to encode.
    pub fn decode(&self, token: &str, cell_seed: &str) -> Result<String, OinoError> {
        let half_len = self.half_length();
        if token.len() < half_len {
            return Err(OinoError::request_shape("hashid token shorter than expected prefix"));
        }
        let (iv_seed, rest) = token.split_at(half_len);
        let iv = self.derive_iv(iv_seed)?;

        let ciphertext = base_x_decode(rest)?;
        let cipher = Aes128Gcm::new_from_slice(&self.key).map_err(|e| OinoError::backend(format!("hashid key error: {e}")))?;
        let nonce = Nonce::from_slice(&iv[..12]);
        let plaintext = cipher
            .decrypt(nonce, Payload { msg: &ciphertext, aad: &[] })
            .map_err(|_| OinoError::request_shape("hashid token does not decrypt under the configured key"))?;
        let text = String::from_utf8(plaintext).map_err(|_| OinoError::request_shape("hashid plaintext is not valid UTF-8"))?;
        Ok(text.trim_end_matches('\0').to_string())
    }

    fn iv_seed(&self, cell_seed: &str, half_len: usize) -> Result<String, OinoError> {
        match self.mode {
            HashidMode::Static => {
                let mac = self.hmac(cell_seed.as_bytes())?;
                Ok(truncate(&base_x_encode(&mac), half_len))
            }
            HashidMode::Random => {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                Ok(truncate(&base_x_encode(&bytes), half_len))
            }
        }
    }

    fn derive_iv(&self, iv_seed: &str) -> Result<[u8; 16], OinoError> {
        let mac = self.hmac(iv_seed.as_bytes())?;
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&mac[..16]);
        Ok(iv)
    }

    fn hmac(&self, material: &[u8]) -> Result<[u8; 32], OinoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key).map_err(|e| OinoError::backend(format!("hmac key error: {e}")))?;
        mac.update(self.domain.as_bytes());
        mac.update(b" ");
        mac.update(material);
        let out = mac.finalize().into_bytes();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&out);
        Ok(buf)
    }
}

fn parse_key(key_hex: &str) -> Result<[u8; 16], OinoError> {
    if key_hex.len() != 32 {
        return Err(OinoError::backend("hashid key must be exactly 32 hex characters"));
    }
    let mut key = [0u8; 16];
    for i in 0..16 {
        let byte = u8::from_str_radix(&key_hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| OinoError::backend("hashid key is not valid hex"))?;
        key[i] = byte;
    }
    Ok(key)
}

fn pad_to(value: &str, half_len: usize) -> String {
    if value.len() >= half_len {
        return value.to_string();
    }
    let mut padded = value.to_string();
    padded.push_str(&"\0".repeat(half_len - value.len()));
    padded
}

fn truncate(s: &str, len: usize) -> String {
    s.chars().take(len).collect()
}

fn base_x_encode(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let mut value: Vec<u8> = bytes.to_vec();
    let mut digits = Vec::new();
    while value.iter().any(|&b| b != 0) {
        let mut remainder: u32 = 0;
        for byte in value.iter_mut() {
            let acc = (remainder << 8) | *byte as u32;
            *byte = (acc / 62) as u8;
            remainder = acc % 62;
        }
        digits.push(ALPHABET[remainder as usize]);
    }
    if digits.is_empty() {
        digits.push(ALPHABET[0]);
    }
    digits.reverse();
    String::from_utf8(digits).expect("alphabet is ASCII")
}

fn base_x_decode(s: &str) -> Result<Vec<u8>, OinoError> {
    let mut value: Vec<u32> = vec![0];
    for c in s.chars() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or_else(|| OinoError::request_shape(format!("hashid token contains invalid character '{c}'")))? as u32;
        let mut carry = digit;
        for v in value.iter_mut() {
            let acc = *v * 62 + carry;
            *v = acc & 0xff;
            carry = acc >> 8;
        }
        while carry > 0 {
            value.push(carry & 0xff);
            carry >>= 8;
        }
    }
    let mut bytes: Vec<u8> = value.iter().map(|&v| v as u8).collect();
    bytes.reverse();
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn static_mode_round_trips() {
        let h = Hashid::new(TEST_KEY, "orders", 12, HashidMode::Static).unwrap();
        let token = h.encode("42", "id 42").unwrap();
        assert_eq!(h.decode(&token, "id 42").unwrap(), "42");
    }

    #[test]
    fn static_mode_is_deterministic() {
        let h = Hashid::new(TEST_KEY, "orders", 12, HashidMode::Static).unwrap();
        let a = h.encode("7", "id 7").unwrap();
        let b = h.encode("7", "id 7").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encoded_length_matches_min_length() {
        let h = Hashid::new(TEST_KEY, "orders", 16, HashidMode::Static).unwrap();
        let token = h.encode("1", "id 1").unwrap();
        assert!(token.len() >= 16);
    }

    #[test]
    fn different_domains_produce_different_tokens() {
        let a = Hashid::new(TEST_KEY, "orders", 12, HashidMode::Static).unwrap();
        let b = Hashid::new(TEST_KEY, "customers", 12, HashidMode::Static).unwrap();
        assert_ne!(a.encode("42", "id 42").unwrap(), b.encode("42", "id 42").unwrap());
    }

    #[test]
    fn decode_rejects_token_from_wrong_key() {
        let a = Hashid::new(TEST_KEY, "orders", 12, HashidMode::Static).unwrap();
        let other_key = "ffeeddccbbaa00112233445566778899";
        let b = Hashid::new(other_key, "orders", 12, HashidMode::Static).unwrap();
        let token = a.encode("42", "id 42").unwrap();
        assert!(b.decode(&token, "id 42").is_err());
    }

    #[test]
    fn invalid_key_length_is_rejected() {
        assert!(Hashid::new("abcd", "orders", 12, HashidMode::Static).is_err());
    }

    #[test]
    fn min_length_is_clamped_into_range() {
        let h = Hashid::new(TEST_KEY, "orders", 4, HashidMode::Static).unwrap();
        assert_eq!(h.min_length, 12);
    }
}
