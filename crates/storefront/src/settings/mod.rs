//! Company settings store.
//!
//! Holds the single `company_settings` record for the life of the process.
//! One loop task owns the value: it performs the initial load, schedules
//! automatic reloads after failures according to a [`RetryPolicy`], answers
//! explicit reloads, and merges the partial records pushed by the change feed
//! on `company_settings` updates. Readers see the value through a `watch`
//! channel.
//!
//! ```text
//! Idle -> Loading -> Loaded  --patch--> Loaded
//!                 \-> Failed --retry--> Loading
//! ```

mod retry;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, warn};
use vitrine_core::{CompanySettings, CompanySettingsRecord, SettingsPatch};

use crate::backend::{
    Backend, BackendError, ChangeEvent, ChangeFilter, ChangeKind, ChannelHandle, Query, decode_row,
    tables,
};

pub use retry::{Backoff, RetryPolicy};

/// Name of the change-feed channel the store listens on.
pub const CHANNEL_NAME: &str = "company_settings_changes";

/// Message shown while the settings cannot be loaded.
const LOAD_ERROR_MESSAGE: &str = "Erro ao carregar configurações";

/// Errors from the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load company settings: {0}")]
    Load(#[source] BackendError),

    #[error("settings store is not running")]
    Stopped,
}

impl SettingsError {
    /// Message for the inline error banner.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        LOAD_ERROR_MESSAGE
    }
}

/// Where the store is in its load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Published store value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsState {
    /// Last successfully loaded (and since patched) settings.
    pub settings: Option<CompanySettings>,
    pub status: LoadStatus,
    /// User-facing message while the last load failed.
    pub error: Option<String>,
    /// Consecutive failed loads.
    pub failures: u32,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            settings: None,
            status: LoadStatus::Idle,
            error: None,
            failures: 0,
        }
    }
}

impl SettingsState {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.status, LoadStatus::Idle | LoadStatus::Loading)
    }
}

enum Command {
    Reload(oneshot::Sender<Result<CompanySettings, SettingsError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the settings loop.
///
/// Cheap to clone. The loop stops on [`CompanySettingsStore::shutdown`] or
/// once every handle is dropped.
#[derive(Clone)]
pub struct CompanySettingsStore {
    inner: Arc<Inner>,
}

struct Inner {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SettingsState>,
}

impl CompanySettingsStore {
    /// Subscribe to settings changes and start loading.
    ///
    /// Returns before the first load completes; watch [`Self::watch`] for
    /// the outcome. If the change feed cannot be joined the store still
    /// loads, without live updates.
    #[instrument(skip_all)]
    pub async fn start(backend: Arc<dyn Backend>, policy: RetryPolicy) -> Self {
        let changes = match backend
            .channel(
                CHANNEL_NAME,
                ChangeFilter::table(tables::COMPANY_SETTINGS, ChangeKind::Update),
            )
            .await
        {
            Ok(channel) => Some(channel.into_parts()),
            Err(e) => {
                warn!(error = %e, "Settings change feed unavailable, live updates disabled");
                None
            }
        };

        let (state_tx, state_rx) = watch::channel(SettingsState::default());
        let (commands, command_rx) = mpsc::unbounded_channel();

        let store_loop = StoreLoop {
            backend,
            policy,
            state: state_tx,
            retry_at: None,
        };
        tokio::spawn(store_loop.run(command_rx, changes));

        Self {
            inner: Arc::new(Inner {
                commands,
                state: state_rx,
            }),
        }
    }

    /// Fetch the record now, whatever the retry state.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] if the fetch fails and
    /// [`SettingsError::Stopped`] after shutdown.
    pub async fn reload(&self) -> Result<CompanySettings, SettingsError> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Reload(reply))
            .map_err(|_| SettingsError::Stopped)?;
        response.await.map_err(|_| SettingsError::Stopped)?
    }

    /// Stop the loop and leave the change feed.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.inner.commands.send(Command::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }
    }

    /// Current value.
    #[must_use]
    pub fn snapshot(&self) -> SettingsState {
        self.inner.state.borrow().clone()
    }

    /// Current settings, once loaded.
    #[must_use]
    pub fn settings(&self) -> Option<CompanySettings> {
        self.inner.state.borrow().settings.clone()
    }

    /// Whether prices are shown. False until the settings are loaded.
    #[must_use]
    pub fn prices_visible(&self) -> bool {
        self.inner
            .state
            .borrow()
            .settings
            .as_ref()
            .is_some_and(|settings| settings.show_prices)
    }

    /// User-facing error while the last load failed.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Receiver that observes every published value.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SettingsState> {
        self.inner.state.clone()
    }
}

// =============================================================================
// Loop
// =============================================================================

struct StoreLoop {
    backend: Arc<dyn Backend>,
    policy: RetryPolicy,
    state: watch::Sender<SettingsState>,
    retry_at: Option<Instant>,
}

impl StoreLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        changes: Option<(ChannelHandle, mpsc::UnboundedReceiver<ChangeEvent>)>,
    ) {
        let (handle, mut changes) = changes.unzip();
        let _ = self.load().await;

        let done = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Reload(reply)) => {
                        let _ = reply.send(self.load().await);
                    }
                    Some(Command::Shutdown(done)) => break Some(done),
                    None => break None,
                },
                event = next_change(&mut changes) => match event {
                    Some(event) => self.apply_change(&event),
                    None => {
                        warn!("Settings change feed closed");
                        changes = None;
                    }
                },
                () = wait_until(self.retry_at) => {
                    self.retry_at = None;
                    debug!(failures = self.state.borrow().failures, "Retrying settings load");
                    let _ = self.load().await;
                }
            }
        };

        if let Some(handle) = handle
            && let Err(e) = self.backend.remove_channel(&handle).await
        {
            warn!(error = %e, "Failed to leave settings change feed");
        }
        info!("Settings store stopped");
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn load(&mut self) -> Result<CompanySettings, SettingsError> {
        self.state.send_modify(|state| state.status = LoadStatus::Loading);

        match fetch_settings(self.backend.as_ref()).await {
            Ok(settings) => {
                self.retry_at = None;
                self.state.send_modify(|state| {
                    state.settings = Some(settings.clone());
                    state.status = LoadStatus::Loaded;
                    state.error = None;
                    state.failures = 0;
                });
                debug!(company = %settings.name, "Company settings loaded");
                Ok(settings)
            }
            Err(e) => {
                let mut failures = 0;
                self.state.send_modify(|state| {
                    state.failures += 1;
                    state.status = LoadStatus::Failed;
                    state.error = Some(LOAD_ERROR_MESSAGE.to_owned());
                    failures = state.failures;
                });
                let next = self.policy.next_delay(failures);
                self.retry_at = next.map(|delay| Instant::now() + delay);
                error!(error = %e, failures, retry_in = ?next, "Error loading company settings");
                Err(SettingsError::Load(e))
            }
        }
    }

    /// Merge a pushed partial record onto the loaded settings.
    fn apply_change(&self, event: &ChangeEvent) {
        let patch = match SettingsPatch::from_record(&event.record) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed settings change");
                return;
            }
        };

        self.state.send_if_modified(|state| match state.settings.as_mut() {
            Some(settings) => {
                let before = settings.clone();
                settings.apply_patch(&patch);
                *settings != before
            }
            None => {
                debug!("Settings change before first load ignored");
                false
            }
        });
    }
}

/// Read and normalize the single `company_settings` row.
///
/// # Errors
///
/// Returns [`BackendError::NotFound`] when the row is missing and any other
/// backend or decode failure as-is.
pub async fn fetch_settings(backend: &dyn Backend) -> Result<CompanySettings, BackendError> {
    let row = backend
        .select_single(&Query::table(tables::COMPANY_SETTINGS))
        .await?;
    let record: CompanySettingsRecord = decode_row(row)?;
    Ok(record.into())
}

async fn next_change(
    changes: &mut Option<mpsc::UnboundedReceiver<ChangeEvent>>,
) -> Option<ChangeEvent> {
    match changes {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
