//! User actions over the sharing API and the local caches
//!
//! The session owns both caches and decides when they change: a file enters
//! the registry after the server accepts the upload and leaves it only after
//! the server confirms the delete.

pub mod inflight;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::api::{ApiError, FileDescriptor, FileOptions, ShareApi};
use crate::download::{Availability, FlowEvent, Outcome, PasswordFlow};
use crate::store::{CredentialCache, FileRecord, KeyValueStore, RegistryCache};
pub use inflight::{Action, InFlight};

/// Session error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("No uploaded file with id {0}")]
    UnknownFile(String),

    #[error("A {0} of {1} is already in progress")]
    ActionBusy(Action, String),

    #[error("{0}")]
    Unavailable(Availability),

    #[error("Password required to download file")]
    PasswordNotProvided,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// One-line message for the user
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

/// Asks the user for a download password
pub trait PasswordPrompt {
    /// `reason` is the event that made the password necessary. None means the user gave up.
    fn ask(&mut self, filename: &str, reason: &FlowEvent) -> Option<String>;
}

pub struct Session {
    api: Arc<dyn ShareApi>,
    registry: Mutex<RegistryCache>,
    credentials: Mutex<CredentialCache>,
    inflight: InFlight,
    /// Public site origin used to build links
    origin: String,
}

impl Session {
    /// Hydrate both caches from `store`
    pub fn new(api: Arc<dyn ShareApi>, store: Arc<dyn KeyValueStore>, origin: &str) -> Self {
        let registry = RegistryCache::load(Arc::clone(&store), origin);
        let credentials = CredentialCache::load(store);
        if !registry.is_empty() || !credentials.is_empty() {
            debug!(
                files = registry.len(),
                passwords = credentials.len(),
                "Local state restored"
            );
        }

        Self {
            api,
            registry: Mutex::new(registry),
            credentials: Mutex::new(credentials),
            inflight: InFlight::new(),
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    fn registry(&self) -> MutexGuard<'_, RegistryCache> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn credentials(&self) -> MutexGuard<'_, CredentialCache> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, action: Action, target: &str) -> Result<inflight::InFlightGuard<'_>, SessionError> {
        self.inflight
            .begin(action, target)
            .ok_or_else(|| SessionError::ActionBusy(action, target.to_string()))
    }

    /// Uploaded files in display order
    pub fn files(&self) -> Vec<FileRecord> {
        self.registry().files().to_vec()
    }

    pub fn record(&self, id: &str) -> Result<FileRecord, SessionError> {
        self.registry()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownFile(id.to_string()))
    }

    /// Shareable download link of an uploaded file
    pub fn link(&self, id: &str) -> Result<String, SessionError> {
        Ok(self.record(id)?.url)
    }

    /// Upload the file at `path` and register it
    pub async fn upload(&self, path: &Path, options: &FileOptions) -> Result<FileRecord, SessionError> {
        let target = path.display().to_string();
        let _guard = self.claim(Action::Upload, &target)?;

        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let uploaded = self.api.upload(&file_name, data, options).await?;
        let record = FileRecord::from_upload(uploaded, &self.origin);
        self.registry().add(record.clone())?;

        info!(id = %record.id, file = %record.filename, "Upload registered");
        Ok(record)
    }

    /// Change password, download limit or expiry of an uploaded file
    pub async fn update(&self, id: &str, options: &FileOptions) -> Result<serde_json::Value, SessionError> {
        let record = self.record(id)?;
        let _guard = self.claim(Action::Update, id)?;

        let updated = self
            .api
            .update_file(id, &record.delete_token, options)
            .await?;
        info!(id = id, "File settings updated");
        Ok(updated)
    }

    /// Delete on the server, then forget the file locally
    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let record = self.record(id)?;
        let _guard = self.claim(Action::Delete, id)?;

        // Local state changes only once the server has confirmed
        self.api.delete_file(id, &record.delete_token).await?;

        self.registry().remove(id)?;
        self.credentials().forget(id)?;
        info!(id = id, "File deleted and removed from registry");
        Ok(())
    }

    /// Public descriptor of any shared file
    pub async fn info(&self, id: &str) -> Result<FileDescriptor, SessionError> {
        Ok(self.api.file_info(id).await?)
    }

    /// Download a shared file into `output_dir`.
    ///
    /// `password` takes precedence over a remembered one. The prompt is asked
    /// whenever the flow needs a password; giving up ends the download.
    pub async fn download(
        &self,
        id: &str,
        output_dir: &Path,
        password: Option<String>,
        prompt: &mut dyn PasswordPrompt,
    ) -> Result<PathBuf, SessionError> {
        let _guard = self.claim(Action::Download, id)?;

        let descriptor = self.api.file_info(id).await?;
        let availability = Availability::of(&descriptor);
        if !availability.is_allowed() {
            return Err(SessionError::Unavailable(availability));
        }
        let filename = descriptor.display_name().to_string();

        let mut flow = PasswordFlow::new();
        if descriptor.meta_data.has_password {
            flow.prompt_upfront();
        }
        let prefill = password.or_else(|| self.credentials().get(id).map(str::to_string));
        if let Some(prefill) = prefill {
            flow.set_password(prefill);
        }

        let mut reason = FlowEvent::PasswordRequired;
        loop {
            if flow.needs_password() {
                match prompt.ask(&filename, &reason) {
                    Some(entered) if !entered.is_empty() => flow.set_password(entered),
                    _ => return Err(SessionError::PasswordNotProvided),
                }
            }

            let attempt = flow
                .begin()
                .ok_or_else(|| SessionError::ActionBusy(Action::Download, id.to_string()))?;

            let result = self.api.download(id, attempt.password.as_deref()).await;
            let outcome = match &result {
                Ok(_) => Outcome::Success,
                Err(e) => Outcome::from(e),
            };
            let event = flow.resolve(outcome);

            match result {
                Ok(bytes) => {
                    if let Some(FlowEvent::Downloaded {
                        remember: Some(password),
                    }) = event
                    {
                        self.credentials().remember(id, &password, &filename)?;
                    }
                    let saved = save_download(output_dir, &filename, &bytes)?;
                    info!(id = id, path = %saved.display(), size = bytes.len(), "Download saved");
                    return Ok(saved);
                }
                Err(e) => match event {
                    Some(
                        event @ (FlowEvent::PasswordRequired
                        | FlowEvent::StillPasswordRequired
                        | FlowEvent::IncorrectPassword),
                    ) => {
                        debug!(id = id, event = ?event, state = ?flow.state(), "Download needs a password");
                        reason = event;
                    }
                    _ => return Err(e.into()),
                },
            }
        }
    }
}

/// Keep only the last path component so a server-supplied name cannot escape `dir`
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => "download".to_string(),
        other => other.to_string(),
    }
}

/// Upper bound on `name (n).ext` candidates tried before giving up
const MAX_NAME_ATTEMPTS: usize = 1000;

/// `name`, or `stem (n).ext` for n > 0
fn numbered_name(name: &str, n: usize) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

/// Write atomically into `dir`. An existing file is never replaced; the
/// first free `name (n).ext` is used instead.
fn save_download(dir: &Path, name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = safe_file_name(name);

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;

    for n in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(numbered_name(&name, n));
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "File exists, trying another name");
                tmp = e.file;
            }
            Err(e) => return Err(e.error),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free file name for {} in {}", name, dir.display()),
    ))
}
