//! Accounts and the account store capability
//!
//! An [`Account`] holds the credentials one user obtained from one network.
//! Persisting accounts is the host's concern: the core only talks to an
//! injected [`AccountStore`]. Two stores ship with the library, an in-memory
//! one and a TOML file one used by the command-line tools.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Result, StorageError};

/// Property key holding the OAuth access token
pub const TOKEN_KEY: &str = "oauth_token";

/// Property key holding the OAuth access token secret
pub const TOKEN_SECRET_KEY: &str = "oauth_token_secret";

/// Per-user credentials obtained from a network
///
/// Immutable after creation; the core only ever borrows it for the duration
/// of one operation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    username: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl Account {
    pub fn new(username: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self {
            username: username.into(),
            properties,
        }
    }

    /// Build an account from an access token pair plus any extra properties
    pub fn from_tokens(
        username: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
        extra: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut properties: BTreeMap<String, String> = extra.into_iter().collect();
        properties.insert(TOKEN_KEY.to_string(), token.into());
        properties.insert(TOKEN_SECRET_KEY.to_string(), token_secret.into());
        Self::new(username, properties)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn token(&self) -> Option<&str> {
        self.property(TOKEN_KEY)
    }

    pub fn token_secret(&self) -> Option<&str> {
        self.property(TOKEN_SECRET_KEY)
    }
}

// Secrets stay out of logs
impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Storage for accounts, keyed by service id
///
/// Saving an account whose username already exists for the service replaces
/// the stored one.
pub trait AccountStore: Send + Sync {
    /// Accounts stored for a service, in the order they were first saved
    fn load_accounts(&self, service_id: &str) -> Result<Vec<Account>>;

    fn save_account(&self, service_id: &str, account: &Account) -> Result<()>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such account is stored.
    fn remove_account(&self, service_id: &str, username: &str) -> Result<()>;
}

type AccountMap = HashMap<String, Vec<Account>>;

fn upsert(accounts: &mut AccountMap, service_id: &str, account: &Account) {
    let list = accounts.entry(service_id.to_string()).or_default();
    match list.iter_mut().find(|a| a.username == account.username) {
        Some(existing) => *existing = account.clone(),
        None => list.push(account.clone()),
    }
}

fn remove(accounts: &mut AccountMap, service_id: &str, username: &str) -> Result<()> {
    let list = accounts.get_mut(service_id);
    let position = list
        .as_ref()
        .and_then(|list| list.iter().position(|a| a.username == username));

    match (list, position) {
        (Some(list), Some(index)) => {
            list.remove(index);
            Ok(())
        }
        _ => Err(StorageError::NotFound(username.to_string(), service_id.to_string()).into()),
    }
}

/// In-process account store
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<AccountMap>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn load_accounts(&self, service_id: &str) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        Ok(accounts.get(service_id).cloned().unwrap_or_default())
    }

    fn save_account(&self, service_id: &str, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        upsert(&mut accounts, service_id, account);
        Ok(())
    }

    fn remove_account(&self, service_id: &str, username: &str) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        remove(&mut accounts, service_id, username)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountFile {
    #[serde(default)]
    services: AccountMap,
}

/// Account store backed by a TOML file
///
/// The file is rewritten on every change and created with owner-only
/// permissions on Unix, since it holds token secrets.
pub struct FileAccountStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileAccountStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<AccountFile> {
        if !self.path.exists() {
            return Ok(AccountFile::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(StorageError::Io)?;
        let file = toml::from_str(&content).map_err(StorageError::Parse)?;
        Ok(file)
    }

    fn write(&self, file: &AccountFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
        let content = toml::to_string_pretty(file).map_err(StorageError::Serialize)?;
        std::fs::write(&self.path, content).map_err(StorageError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(StorageError::Io)?;
        }

        tracing::debug!(path = %self.path.display(), "Account store written");
        Ok(())
    }
}

impl AccountStore for FileAccountStore {
    fn load_accounts(&self, service_id: &str) -> Result<Vec<Account>> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        let file = self.read()?;
        Ok(file.services.get(service_id).cloned().unwrap_or_default())
    }

    fn save_account(&self, service_id: &str, account: &Account) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut file = self.read()?;
        upsert(&mut file.services, service_id, account);
        self.write(&file)
    }

    fn remove_account(&self, service_id: &str, username: &str) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut file = self.read()?;
        remove(&mut file.services, service_id, username)?;
        self.write(&file)
    }
}
