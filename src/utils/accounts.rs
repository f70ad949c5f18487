use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::info;
use rand::Rng;
use serde_json::to_string_pretty;
use soft_aes::aes::{aes_dec_cbc, aes_enc_cbc};
use crate::models::Account;

const IV_LEN: usize = 16;

// Persistence for credential records, keyed by identifier.
pub trait AccountStore: Send + Sync {
    fn find(&self, identifier: &str) -> Result<Option<Account>>;
    fn save(&self, account: Account) -> Result<()>;
}

// Opaque encrypt/decrypt capability for stored secrets.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plain: &str) -> Result<String>;
    fn decrypt(&self, encrypted: &str) -> Result<String>;
}

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
    writes: AtomicUsize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Number of save calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.accounts.lock().map(|accounts| accounts.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AccountStore for MemoryAccountStore {
    fn find(&self, identifier: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().map_err(|_| anyhow!("account store lock poisoned"))?;
        Ok(accounts.get(identifier).cloned())
    }

    fn save(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.lock().map_err(|_| anyhow!("account store lock poisoned"))?;
        accounts.insert(account.identifier.clone(), account);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Keeps every account in one pretty-printed JSON file, rewritten on each save.
pub struct JsonAccountStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonAccountStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonAccountStore { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
    }

    fn load(&self) -> Result<Vec<Account>> {
        let file_exists_and_non_empty =
            self.path.exists() && fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if !file_exists_and_non_empty {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read accounts from {}", self.path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Corrupt accounts file {}", self.path.display()))
    }
}

impl AccountStore for JsonAccountStore {
    fn find(&self, identifier: &str) -> Result<Option<Account>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("account file lock poisoned"))?;
        Ok(self.load()?.into_iter().find(|account| account.identifier == identifier))
    }

    fn save(&self, account: Account) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("account file lock poisoned"))?;
        let mut accounts = self.load()?;
        match accounts.iter().position(|existing| existing.identifier == account.identifier) {
            Some(index) => accounts[index] = account,
            None => accounts.push(account),
        }

        fs::write(&self.path, to_string_pretty(&accounts)?)
            .with_context(|| format!("Failed to write accounts to {}", self.path.display()))
    }
}

// AES-CBC with a random IV per call; the IV is stored in front of the ciphertext.
pub struct AesCipher {
    key: Vec<u8>,
}

impl AesCipher {
    pub fn new(key: &str) -> Result<Self> {
        match key.len() {
            16 | 24 | 32 => Ok(AesCipher { key: key.as_bytes().to_vec() }),
            other => Err(anyhow!("Encryption key must be 16, 24 or 32 bytes long, got {}", other)),
        }
    }
}

impl SecretCipher for AesCipher {
    fn encrypt(&self, plain: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill(&mut iv);

        let encrypted = aes_enc_cbc(plain.as_bytes(), &self.key, &iv, Some("PKCS7"))
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut out = Vec::with_capacity(IV_LEN + encrypted.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&encrypted);
        Ok(STANDARD.encode(out))
    }

    fn decrypt(&self, encrypted: &str) -> Result<String> {
        let bytes = STANDARD.decode(encrypted).context("Stored secret is not valid base64")?;
        if bytes.len() <= IV_LEN {
            return Err(anyhow!("Stored secret is too short"));
        }

        let (iv, ciphertext) = bytes.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv.try_into().context("Stored secret has a malformed IV")?;
        let plain = aes_dec_cbc(ciphertext, &self.key, &iv, Some("PKCS7"))
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plain).context("Decrypted secret is not UTF-8")
    }
}

// Records a successful login. New identifiers get one record; known ones are only rewritten
// when the secret changed. The cipher is randomised, so stored secrets are decrypted and
// compared in clear instead of comparing ciphertexts.
pub fn register_login(
    store: &dyn AccountStore,
    cipher: &dyn SecretCipher,
    identifier: &str,
    display_name: &str,
    secret: &str,
) -> Result<()> {
    match store.find(identifier)? {
        Some(mut account) => {
            let unchanged = cipher.decrypt(&account.encrypted_secret).map(|stored| stored == secret).unwrap_or(false);
            if unchanged {
                return Ok(());
            }

            account.encrypted_secret = cipher.encrypt(secret)?;
            store.save(account)?;
            info!("Updated stored secret for {}", identifier);
        }
        None => {
            store.save(Account {
                identifier: identifier.to_string(),
                display_name: display_name.to_string(),
                encrypted_secret: cipher.encrypt(secret)?,
            })?;
            info!("Created account for {}", identifier);
        }
    }

    Ok(())
}
