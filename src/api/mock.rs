//! Mock relationship and presence APIs for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::types::*;
use super::{ConnectionApi, PresenceApi};
use crate::error::{Result, SyncError};

/// Mock relationship API.
///
/// Holds a server-side pending list and suggestion list; every endpoint can
/// be switched to fail.
pub struct MockConnectionApi {
    pending: Mutex<Vec<PendingRequest>>,
    suggestions: Mutex<Vec<Suggestion>>,
    fail_send: AtomicBool,
    fail_list: AtomicBool,
    fail_terminal: AtomicBool,
    fail_suggestions: AtomicBool,
    /// Whether a successful send appears in the pending list right away
    send_visible: AtomicBool,
    /// Whether a send response carries a request id
    send_returns_id: AtomicBool,
    next_id: AtomicU32,
    send_calls: AtomicU32,
    list_calls: AtomicU32,
    terminal_calls: AtomicU32,
    suggestion_calls: AtomicU32,
}

impl MockConnectionApi {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            suggestions: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_terminal: AtomicBool::new(false),
            fail_suggestions: AtomicBool::new(false),
            send_visible: AtomicBool::new(false),
            send_returns_id: AtomicBool::new(true),
            next_id: AtomicU32::new(1),
            send_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            terminal_calls: AtomicU32::new(0),
            suggestion_calls: AtomicU32::new(0),
        }
    }

    /// Seed the server-side outgoing pending list.
    pub fn with_pending(self, requests: Vec<PendingRequest>) -> Self {
        self.set_pending(requests);
        self
    }

    pub fn with_suggestions(self, suggestions: Vec<Suggestion>) -> Self {
        *lock(&self.suggestions) = suggestions;
        self
    }

    /// Make sends show up in the pending list immediately.
    pub fn with_send_visible(self, visible: bool) -> Self {
        self.send_visible.store(visible, Ordering::SeqCst);
        self
    }

    pub fn with_send_returns_id(self, returns_id: bool) -> Self {
        self.send_returns_id.store(returns_id, Ordering::SeqCst);
        self
    }

    pub fn set_pending(&self, requests: Vec<PendingRequest>) {
        *lock(&self.pending) = requests;
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_terminal(&self, fail: bool) {
        self.fail_terminal.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_suggestions(&self, fail: bool) {
        self.fail_suggestions.store(fail, Ordering::SeqCst);
    }

    pub fn send_calls(&self) -> u32 {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Accept, decline and cancel calls combined
    pub fn terminal_calls(&self) -> u32 {
        self.terminal_calls.load(Ordering::SeqCst)
    }

    pub fn suggestion_calls(&self) -> u32 {
        self.suggestion_calls.load(Ordering::SeqCst)
    }

    fn terminal(&self, request_id: &str) -> Result<()> {
        self.terminal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_terminal.load(Ordering::SeqCst) {
            return Err(SyncError::Network("mock terminal action failed".into()));
        }
        lock(&self.pending).retain(|r| r.id != request_id);
        Ok(())
    }
}

impl Default for MockConnectionApi {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ConnectionApi for MockConnectionApi {
    async fn send_request(&self, target_id: &str, _message: Option<&str>) -> Result<Option<String>> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(SyncError::Network("mock send failed".into()));
        }

        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        if self.send_visible.load(Ordering::SeqCst) {
            lock(&self.pending).push(PendingRequest {
                id: id.clone(),
                recipient_id: target_id.to_string(),
            });
        }

        if self.send_returns_id.load(Ordering::SeqCst) {
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    async fn list_outgoing_pending(&self) -> Result<Vec<PendingRequest>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SyncError::Network("mock list failed".into()));
        }
        Ok(lock(&self.pending).clone())
    }

    async fn accept_request(&self, request_id: &str) -> Result<()> {
        self.terminal(request_id)
    }

    async fn decline_request(&self, request_id: &str) -> Result<()> {
        self.terminal(request_id)
    }

    async fn cancel_request(&self, request_id: &str) -> Result<()> {
        self.terminal(request_id)
    }

    async fn suggestions(&self, query: &SuggestionQuery) -> Result<Vec<Suggestion>> {
        self.suggestion_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_suggestions.load(Ordering::SeqCst) {
            return Err(SyncError::Network("mock suggestions failed".into()));
        }

        let all = lock(&self.suggestions);
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(all.iter().skip(offset).take(limit).cloned().collect())
    }
}

/// Mock presence API that records every report.
pub struct MockPresenceApi {
    reports: Mutex<Vec<LocationUpdate>>,
    fail: AtomicBool,
}

impl MockPresenceApi {
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Successful and failed attempts alike
    pub fn report_count(&self) -> usize {
        lock(&self.reports).len()
    }

    pub fn reports(&self) -> Vec<LocationUpdate> {
        lock(&self.reports).clone()
    }
}

impl Default for MockPresenceApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceApi for MockPresenceApi {
    async fn update_location(&self, update: &LocationUpdate) -> Result<()> {
        lock(&self.reports).push(update.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Network("mock presence failed".into()));
        }
        Ok(())
    }
}
