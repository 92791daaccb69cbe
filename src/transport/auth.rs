//! Key material for the transport handshake
//!
//! A serving repository with a `.gitc/authorized_keys` file challenges every
//! client with random bytes. The client proves it holds one of the listed
//! ed25519 keys by signing them.

use anyhow::Context;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::path::{Path, PathBuf};

pub const AUTHORIZED_KEYS_FILE: &str = "authorized_keys";
pub const CHALLENGE_SIZE: usize = 32;

const DEFAULT_KEY_FILE: &str = "id_ed25519";

/// Source of the client's identity
pub trait KeyProvider: Send + Sync {
    fn public_key(&self) -> [u8; 32];

    fn sign_challenge(&self, challenge: &[u8]) -> anyhow::Result<Vec<u8>>;
}

pub struct Ed25519KeyProvider {
    signing_key: SigningKey,
}

impl Ed25519KeyProvider {
    pub fn generate() -> Self {
        Ed25519KeyProvider {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// `$HOME/.gitc/id_ed25519`
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".gitc").join(DEFAULT_KEY_FILE))
    }

    /// Read a secret key written by [`Ed25519KeyProvider::save`]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read key {}", path.display()))?;
        let mut secret = [0u8; 32];
        hex::decode_to_slice(content.trim(), &mut secret)
            .with_context(|| format!("{} does not hold an ed25519 secret key", path.display()))?;

        Ok(Ed25519KeyProvider {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Write the secret key to `path` (owner-only) and the public key to
    /// `path.pub`
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}\n", hex::encode(self.signing_key.to_bytes())))
            .with_context(|| format!("unable to write key {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        let mut public_path = path.as_os_str().to_owned();
        public_path.push(".pub");
        std::fs::write(&public_path, format!("{}\n", self.public_key_hex()))?;
        Ok(())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}

impl KeyProvider for Ed25519KeyProvider {
    fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn sign_challenge(&self, challenge: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(self.signing_key.sign(challenge).to_bytes().to_vec())
    }
}

/// Public keys allowed to talk to a serving repository
#[derive(Debug, Default)]
pub struct AuthorizedKeys {
    keys: Vec<VerifyingKey>,
}

impl AuthorizedKeys {
    /// `None` when the repository does not require authentication
    pub fn load(git_dir: &Path) -> anyhow::Result<Option<Self>> {
        let path = git_dir.join(AUTHORIZED_KEYS_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("unable to read {}", path.display())),
        };

        let keys = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let encoded = line.split_whitespace().next().unwrap_or_default();
                let key = Self::decode_key(encoded)
                    .with_context(|| format!("invalid key in {}: {encoded}", path.display()))?;
                Ok(key)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Some(AuthorizedKeys { keys }))
    }

    fn decode_key(encoded: &str) -> anyhow::Result<VerifyingKey> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(encoded, &mut bytes)?;
        Ok(VerifyingKey::from_bytes(&bytes)?)
    }

    /// Is `signature` a signature of `challenge` by a listed `public_key`
    pub fn verify(&self, public_key: &[u8], challenge: &[u8], signature: &[u8]) -> bool {
        let (Ok(public_key), Ok(signature)) = (
            <[u8; 32]>::try_from(public_key),
            <[u8; 64]>::try_from(signature),
        ) else {
            return false;
        };
        let signature = Signature::from_bytes(&signature);

        self.keys
            .iter()
            .filter(|key| key.to_bytes() == public_key)
            .any(|key| key.verify(challenge, &signature).is_ok())
    }
}

pub fn new_challenge() -> [u8; CHALLENGE_SIZE] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;

    fn authorize(dir: &Path, provider: &Ed25519KeyProvider) {
        std::fs::write(
            dir.join(AUTHORIZED_KEYS_FILE),
            format!("# team\n{} laptop\n", provider.public_key_hex()),
        )
        .unwrap();
    }

    #[test]
    fn listed_key_passes_the_challenge() {
        let dir = TempDir::new().unwrap();
        let provider = Ed25519KeyProvider::generate();
        authorize(dir.path(), &provider);

        let keys = AuthorizedKeys::load(dir.path()).unwrap().unwrap();
        let challenge = new_challenge();
        let signature = provider.sign_challenge(&challenge).unwrap();

        assert!(keys.verify(&provider.public_key(), &challenge, &signature));
        assert!(!keys.verify(&provider.public_key(), b"another challenge", &signature));
    }

    #[test]
    fn unlisted_key_is_refused() {
        let dir = TempDir::new().unwrap();
        authorize(dir.path(), &Ed25519KeyProvider::generate());
        let intruder = Ed25519KeyProvider::generate();

        let keys = AuthorizedKeys::load(dir.path()).unwrap().unwrap();
        let challenge = new_challenge();
        let signature = intruder.sign_challenge(&challenge).unwrap();

        assert!(!keys.verify(&intruder.public_key(), &challenge, &signature));
    }

    #[test]
    fn saved_key_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys/id_ed25519");
        let provider = Ed25519KeyProvider::generate();

        provider.save(&path).unwrap();
        let loaded = Ed25519KeyProvider::load(&path).unwrap();

        assert_eq!(loaded.public_key(), provider.public_key());
        assert!(dir.path().join("keys/id_ed25519.pub").exists());
    }

    #[test]
    fn missing_file_means_no_authentication() {
        let dir = TempDir::new().unwrap();
        assert!(AuthorizedKeys::load(dir.path()).unwrap().is_none());
    }
}
