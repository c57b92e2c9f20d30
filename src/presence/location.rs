//! Platform location provider seam

use super::geo::PresenceSample;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Location permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The user has not been asked yet
    Undetermined,
}

/// Platform location services.
///
/// Accuracy and availability are platform-determined; any method may fail
/// with [`SyncError::LocationUnavailable`].
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn permission_status(&self) -> Result<PermissionStatus>;

    /// Prompt the user; returns the resulting status.
    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// One-shot position query.
    async fn current_position(&self) -> Result<PresenceSample>;

    /// Continuous subscription. Dropping the receiver ends it.
    async fn watch_position(&self) -> Result<mpsc::Receiver<PresenceSample>>;
}

/// Scriptable provider for tests.
pub struct MockLocationProvider {
    permission: Mutex<PermissionStatus>,
    /// Status `request_permission` switches to
    prompt_result: Mutex<PermissionStatus>,
    unavailable: AtomicBool,
    position: Mutex<Option<PresenceSample>>,
    watcher: Mutex<Option<mpsc::Sender<PresenceSample>>>,
    watch_calls: AtomicU32,
}

impl MockLocationProvider {
    pub fn new() -> Self {
        Self {
            permission: Mutex::new(PermissionStatus::Granted),
            prompt_result: Mutex::new(PermissionStatus::Granted),
            unavailable: AtomicBool::new(false),
            position: Mutex::new(None),
            watcher: Mutex::new(None),
            watch_calls: AtomicU32::new(0),
        }
    }

    pub fn with_permission(self, status: PermissionStatus) -> Self {
        *lock(&self.permission) = status;
        self
    }

    pub fn with_prompt_result(self, status: PermissionStatus) -> Self {
        *lock(&self.prompt_result) = status;
        self
    }

    pub fn with_unavailable(self, unavailable: bool) -> Self {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        self
    }

    /// Position returned by `current_position`
    pub fn with_position(self, sample: PresenceSample) -> Self {
        *lock(&self.position) = Some(sample);
        self
    }

    pub fn set_position(&self, sample: PresenceSample) {
        *lock(&self.position) = Some(sample);
    }

    /// Deliver a sample to the active subscription. Returns false if there is none.
    pub async fn push(&self, sample: PresenceSample) -> bool {
        let sender = lock(&self.watcher).clone();
        match sender {
            Some(tx) => tx.send(sample).await.is_ok(),
            None => false,
        }
    }

    /// True while a subscriber is still listening
    pub fn is_watched(&self) -> bool {
        lock(&self.watcher)
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    pub fn watch_calls(&self) -> u32 {
        self.watch_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::LocationUnavailable("mock provider disabled".into()));
        }
        Ok(())
    }
}

impl Default for MockLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LocationProvider for MockLocationProvider {
    async fn permission_status(&self) -> Result<PermissionStatus> {
        self.check_available()?;
        Ok(*lock(&self.permission))
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        self.check_available()?;
        let result = *lock(&self.prompt_result);
        *lock(&self.permission) = result;
        Ok(result)
    }

    async fn current_position(&self) -> Result<PresenceSample> {
        self.check_available()?;
        lock(&self.position)
            .clone()
            .ok_or_else(|| SyncError::LocationUnavailable("no position fix".into()))
    }

    async fn watch_position(&self) -> Result<mpsc::Receiver<PresenceSample>> {
        self.check_available()?;
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        *lock(&self.watcher) = Some(tx);
        Ok(rx)
    }
}
