use crate::identity::Identity;
use crate::utils::{atomic_write, get_atelier_home};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable slice of the session: token string, cached username, and the
/// last-selected conversation partner, kept under one well-known file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, rename = "partnerId")]
    partner_id: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    /// Set only after token verification; never reconstructed from disk.
    identity: Option<Identity>,
    /// Display-name convenience copy, usable without re-verifying.
    cached_username: Option<String>,
    partner_id: Option<String>,
    partner_name: Option<String>,
}

/// Single owner of the local mutable session state.
///
/// Every flow that used to read or write ad hoc local keys (login, logout,
/// thread selection) goes through this context instead. Created with an
/// explicit `open`/`in_memory` and torn down with `clear`; mutation is
/// serialized behind one lock and the durable slice is written atomically.
pub struct SessionContext {
    path: Option<PathBuf>,
    state: Mutex<SessionState>,
}

impl SessionContext {
    pub fn default_path() -> Result<PathBuf> {
        Ok(get_atelier_home()?.join("session.json"))
    }

    /// Load the session from `path`, starting empty if no file exists.
    pub fn open(path: PathBuf) -> Result<Self> {
        let mut state = SessionState::default();
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session file: {}", path.display()))?;
            let file: SessionFile =
                serde_json::from_str(&content).with_context(|| "Failed to parse session JSON")?;
            state.token = file.token;
            state.cached_username = file.username;
            state.partner_id = file.partner_id;
        }
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Context with no backing file. Used by tests and one-shot commands
    /// that must not disturb the persisted session.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.state.lock().expect("session lock").token.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.lock().expect("session lock").identity.clone()
    }

    pub fn cached_username(&self) -> Option<String> {
        self.state
            .lock()
            .expect("session lock")
            .cached_username
            .clone()
    }

    pub fn partner_id(&self) -> Option<String> {
        self.state.lock().expect("session lock").partner_id.clone()
    }

    pub fn partner_name(&self) -> Option<String> {
        self.state.lock().expect("session lock").partner_name.clone()
    }

    /// Install a verified session: token plus the identity it embeds.
    pub fn login(&self, token: String, identity: Identity) -> Result<()> {
        {
            let mut state = self.state.lock().expect("session lock");
            state.token = Some(token);
            state.cached_username = Some(identity.username.clone());
            state.identity = Some(identity);
        }
        self.persist()
    }

    /// Record the verified identity for an already-stored token.
    pub fn set_identity(&self, identity: Identity) {
        let mut state = self.state.lock().expect("session lock");
        state.cached_username = Some(identity.username.clone());
        state.identity = Some(identity);
    }

    /// Remember the open conversation partner across restarts.
    pub fn select_partner(&self, partner_id: &str) -> Result<()> {
        self.state.lock().expect("session lock").partner_id = Some(partner_id.to_string());
        self.persist()
    }

    /// Cache the partner's display name when the backend provides it.
    /// In-memory only; refreshed on every fetch that carries one.
    pub fn cache_partner_name(&self, name: &str) {
        self.state.lock().expect("session lock").partner_name = Some(name.to_string());
    }

    /// Teardown: forget everything and delete the session file.
    pub fn clear(&self) -> Result<()> {
        *self.state.lock().expect("session lock") = SessionState::default();
        if let Some(path) = &self.path
            && path.exists()
        {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove session file: {}", path.display()))?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = {
            let state = self.state.lock().expect("session lock");
            SessionFile {
                token: state.token.clone(),
                username: state.cached_username.clone(),
                partner_id: state.partner_id.clone(),
            }
        };
        let content = serde_json::to_string_pretty(&file)?;
        atomic_write(path, &content)?;
        restrict_permissions(path);
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
