// Copyright (c) 2026 Eonhub
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Ed25519 crypto service: hashing, signing, verification.
//!
//! A `CryptoService` is an explicitly constructed value injected into the hub
//! and tree at construction time; there is no process-wide singleton.
//!
//! ## Key at rest
//! The hub key is an Ed25519 PKCS#8 file written atomically. If
//! `EONHUB_KEY_PASSPHRASE` is set the file is encrypted as
//! `MAGIC(8) || SALT(16) || NONCE(12) || CIPHERTEXT+TAG(..)`
//! with AES-256-GCM over a PBKDF2-derived key.

use ring::{
    aead, digest, pbkdf2,
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use std::{
    fs,
    io::Write,
    num::NonZeroU32,
    path::Path,
};
use thiserror::Error;
use zeroize::Zeroize;

use crate::core::types::{Address, H256, Signature};

const KEY_FILE_MAGIC: &[u8] = b"EONHKEY1"; // 8 bytes
const KEY_SALT_LEN: usize = 16;
const KEY_NONCE_LEN: usize = 12;
const PBKDF2_ITERS: u32 = 100_000;

/// Crypto service errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key file could not be read or written.
    #[error("io")]
    Io,
    /// Key material is not valid PKCS#8 / not a usable keypair.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Key file is encrypted but no passphrase was supplied.
    #[error("missing passphrase (set EONHUB_KEY_PASSPHRASE)")]
    MissingPassphrase,
    /// RNG, key derivation or AEAD failure.
    #[error("crypto")]
    Crypto,
    /// Signature does not verify for the claimed signer.
    #[error("bad signature")]
    BadSignature,
}

/// SHA-256 over an opaque byte payload.
pub fn hash(data: &[u8]) -> H256 {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    H256::from_bytes(out)
}

/// Derive a ledger address from an Ed25519 public key (truncated SHA-256).
pub fn address_of(public_key: &[u8; 32]) -> Address {
    let h = hash(public_key);
    let mut out = [0u8; 20];
    out.copy_from_slice(&h.as_bytes()[..20]);
    Address::from_bytes(out)
}

/// Verify a signature over arbitrary bytes against the key it carries.
pub fn verify(msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
    // ring requires signature length 64 for Ed25519
    if sig.bytes.len() != 64 {
        return Err(CryptoError::BadSignature);
    }
    let pk = UnparsedPublicKey::new(&ED25519, &sig.signer);
    pk.verify(msg, &sig.bytes)
        .map_err(|_| CryptoError::BadSignature)
}

/// Verify and additionally pin the signer to an expected public key.
pub fn verify_by(msg: &[u8], sig: &Signature, expected: &[u8; 32]) -> Result<(), CryptoError> {
    if &sig.signer != expected {
        return Err(CryptoError::BadSignature);
    }
    verify(msg, sig)
}

fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| CryptoError::Io)?;
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| CryptoError::Io)?;
        f.write_all(bytes).map_err(|_| CryptoError::Io)?;
        let _ = f.sync_all();
    }

    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| CryptoError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

fn derive_key(passphrase: &[u8], salt: &[u8; KEY_SALT_LEN]) -> [u8; 32] {
    let iters = NonZeroU32::new(PBKDF2_ITERS).expect("nonzero");
    let mut out = [0u8; 32];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iters, salt, passphrase, &mut out);
    out
}

fn seal_pkcs8(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; KEY_SALT_LEN];
    rng.fill(&mut salt).map_err(|_| CryptoError::Crypto)?;
    let mut nonce_bytes = [0u8; KEY_NONCE_LEN];
    rng.fill(&mut nonce_bytes).map_err(|_| CryptoError::Crypto)?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut key = derive_key(passphrase, &salt);
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| CryptoError::Crypto)?;
    let sealing = aead::LessSafeKey::new(unbound);

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Crypto)?;
    key.zeroize();

    let mut out =
        Vec::with_capacity(KEY_FILE_MAGIC.len() + KEY_SALT_LEN + KEY_NONCE_LEN + in_out.len());
    out.extend_from_slice(KEY_FILE_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn open_pkcs8(passphrase: &[u8], bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let header = KEY_FILE_MAGIC.len() + KEY_SALT_LEN + KEY_NONCE_LEN;
    if bytes.len() < header + 16 {
        return Err(CryptoError::InvalidKey);
    }

    let mut salt = [0u8; KEY_SALT_LEN];
    salt.copy_from_slice(&bytes[KEY_FILE_MAGIC.len()..KEY_FILE_MAGIC.len() + KEY_SALT_LEN]);
    let mut nonce_bytes = [0u8; KEY_NONCE_LEN];
    nonce_bytes.copy_from_slice(&bytes[KEY_FILE_MAGIC.len() + KEY_SALT_LEN..header]);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut key = derive_key(passphrase, &salt);
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| CryptoError::Crypto)?;
    let opening = aead::LessSafeKey::new(unbound);

    let mut in_out = bytes[header..].to_vec();
    let plain = opening
        .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Crypto)?;
    key.zeroize();
    Ok(plain.to_vec())
}

/// Explicitly constructed signing service around one Ed25519 keypair.
pub struct CryptoService {
    keypair: Ed25519KeyPair,
}

impl CryptoService {
    /// Generate an ephemeral keypair (tests, in-memory deployments).
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let pkcs8 =
            Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| CryptoError::InvalidKey)?;
        let keypair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { keypair })
    }

    /// Load the key file at `path`, creating it if absent.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        let pass = std::env::var("EONHUB_KEY_PASSPHRASE")
            .ok()
            .filter(|v| !v.trim().is_empty());

        if path.exists() {
            let bytes = fs::read(path).map_err(|_| CryptoError::Io)?;
            let pkcs8 = if bytes.starts_with(KEY_FILE_MAGIC) {
                let Some(p) = pass.as_deref() else {
                    return Err(CryptoError::MissingPassphrase);
                };
                open_pkcs8(p.as_bytes(), &bytes)?
            } else {
                bytes
            };
            let keypair =
                Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|_| CryptoError::InvalidKey)?;
            return Ok(Self { keypair });
        }

        let rng = SystemRandom::new();
        let pkcs8 =
            Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| CryptoError::InvalidKey)?;

        let mut buf = pkcs8.as_ref().to_vec();
        let on_disk = if let Some(p) = pass.as_deref() {
            let enc = seal_pkcs8(p.as_bytes(), &buf)?;
            buf.zeroize();
            enc
        } else {
            buf.clone()
        };
        atomic_write_private(path, &on_disk)?;
        buf.zeroize();

        let keypair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { keypair })
    }

    /// Public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        let pk = self.keypair.public_key().as_ref();
        let mut out = [0u8; 32];
        out.copy_from_slice(pk);
        out
    }

    /// Ledger address of this key.
    pub fn address(&self) -> Address {
        address_of(&self.public_key())
    }

    /// Sign message bytes.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        let sig = self.keypair.sign(msg);
        Signature {
            signer: self.public_key(),
            bytes: sig.as_ref().to_vec(),
        }
    }
}
