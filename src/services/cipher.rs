//! Symmetric encryption of credential payloads.
//!
//! Wire format is `v2:<ivHex>:<cipherHex>`: AES-256-CBC with PKCS#7 padding,
//! a fresh 16-byte IV per call and key = SHA-256(secret). Payloads without a
//! version tag predate versioning and are opened by trying each legacy
//! variant in turn, for the current secret first and then each retired one.

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use super::credentials::CredentialError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const VERSION_TAG: &str = "v2";
const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Key derivation and framing variants understood by [`CredentialCipher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherScheme {
    /// `v2:` tagged, SHA-256 derived key.
    Versioned,
    /// Untagged, SHA-256 derived key.
    LegacyHashedKey,
    /// Untagged, secret bytes used directly, zero padded to 32 bytes.
    LegacyRawKey,
}

const LEGACY_SCHEMES: [CipherScheme; 2] = [CipherScheme::LegacyHashedKey, CipherScheme::LegacyRawKey];

#[derive(Clone)]
struct Secret {
    hashed: [u8; KEY_LEN],
    raw: [u8; KEY_LEN],
}

impl Secret {
    fn new(secret: &str) -> Self {
        let mut raw = [0u8; KEY_LEN];
        let bytes = secret.as_bytes();
        let len = bytes.len().min(KEY_LEN);
        raw[..len].copy_from_slice(&bytes[..len]);

        Self {
            hashed: Sha256::digest(bytes).into(),
            raw,
        }
    }

    fn key(&self, scheme: CipherScheme) -> &[u8; KEY_LEN] {
        match scheme {
            CipherScheme::Versioned | CipherScheme::LegacyHashedKey => &self.hashed,
            CipherScheme::LegacyRawKey => &self.raw,
        }
    }
}

/// Process-wide credential cipher. Read-only after construction.
#[derive(Clone)]
pub struct CredentialCipher {
    current: Secret,
    retired: Vec<Secret>,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("retired_keys", &self.retired.len())
            .finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(secret: &str) -> Self {
        Self {
            current: Secret::new(secret),
            retired: Vec::new(),
        }
    }

    /// Secrets that are no longer used for sealing but are still accepted.
    pub fn with_retired_keys<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.retired
            .extend(secrets.into_iter().map(|s| Secret::new(s.as_ref())));
        self
    }

    pub fn seal(&self, plaintext: &[u8]) -> String {
        self.seal_with(CipherScheme::Versioned, plaintext)
    }

    /// Seals under an explicit scheme with the current secret.
    pub fn seal_with(&self, scheme: CipherScheme, plaintext: &[u8]) -> String {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(self.current.key(scheme).into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let body = format!("{}:{}", hex::encode(iv), hex::encode(ciphertext));
        match scheme {
            CipherScheme::Versioned => format!("{VERSION_TAG}:{body}"),
            CipherScheme::LegacyHashedKey | CipherScheme::LegacyRawKey => body,
        }
    }

    /// Decrypts `payload` and hands each successful decryption to `accept`
    /// until it returns `Some`. Decryptions that `accept` rejects count as a
    /// failed attempt, so a wrong key yielding well-padded garbage falls
    /// through to the next variant.
    pub fn open<T>(
        &self,
        payload: &str,
        mut accept: impl FnMut(&[u8]) -> Option<T>,
    ) -> Result<(T, CipherScheme), CredentialError> {
        let payload = payload.trim();
        let (body, schemes): (&str, &[CipherScheme]) =
            match payload.strip_prefix(VERSION_TAG).and_then(|rest| rest.strip_prefix(':')) {
                Some(body) => (body, &[CipherScheme::Versioned]),
                None if payload.starts_with('v') => return Err(CredentialError::MalformedCredential),
                None => (payload, &LEGACY_SCHEMES),
            };

        let (iv, ciphertext) = split_body(body)?;

        for secret in std::iter::once(&self.current).chain(self.retired.iter()) {
            for &scheme in schemes {
                let Ok(plaintext) = Aes256CbcDec::new(secret.key(scheme).into(), &iv.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                else {
                    continue;
                };
                if let Some(value) = accept(&plaintext) {
                    return Ok((value, scheme));
                }
            }
        }

        Err(CredentialError::DecryptionFailed)
    }
}

fn split_body(body: &str) -> Result<([u8; IV_LEN], Vec<u8>), CredentialError> {
    let (iv_hex, cipher_hex) = body
        .split_once(':')
        .ok_or(CredentialError::MalformedCredential)?;

    let iv: [u8; IV_LEN] = hex::decode(iv_hex)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(CredentialError::MalformedCredential)?;

    let ciphertext = hex::decode(cipher_hex).map_err(|_| CredentialError::MalformedCredential)?;
    if ciphertext.is_empty() {
        return Err(CredentialError::MalformedCredential);
    }

    Ok((iv, ciphertext))
}
