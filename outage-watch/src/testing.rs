//! In-memory fakes shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::database::models::ProcessedScheduleInfo;
use crate::database::repositories::{ProcessedScheduleRepository, SqlxProcessedScheduleRepository};
use crate::notification::ScheduleDelivery;
use crate::{Error, Result};

/// Delivery that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingDelivery {
    groups: Mutex<Vec<String>>,
    owner: Mutex<Vec<String>>,
    chats: Mutex<Vec<(i64, String)>>,
    fail_groups: AtomicBool,
}

impl RecordingDelivery {
    pub fn fail_groups(&self, fail: bool) {
        self.fail_groups.store(fail, Ordering::SeqCst);
    }

    pub fn group_messages(&self) -> Vec<String> {
        self.groups.lock().clone()
    }

    pub fn owner_messages(&self) -> Vec<String> {
        self.owner.lock().clone()
    }

    pub fn chat_messages(&self) -> Vec<(i64, String)> {
        self.chats.lock().clone()
    }
}

#[async_trait]
impl ScheduleDelivery for RecordingDelivery {
    async fn send_to_all_enabled_groups(&self, text: &str) -> Result<()> {
        if self.fail_groups.load(Ordering::SeqCst) {
            return Err(Error::delivery("groups unreachable"));
        }
        self.groups.lock().push(text.to_string());
        Ok(())
    }

    async fn send_to_owner(&self, text: &str) -> Result<()> {
        self.owner.lock().push(text.to_string());
        Ok(())
    }

    async fn send_to_chat(&self, chat_id: i64, text: &str) -> Result<()> {
        self.chats.lock().push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Repository whose first `failing_upserts` writes fail.
pub struct FlakyScheduleRepository {
    inner: SqlxProcessedScheduleRepository,
    failing_upserts: AtomicUsize,
}

impl FlakyScheduleRepository {
    pub fn new(inner: SqlxProcessedScheduleRepository, failing_upserts: usize) -> Self {
        Self {
            inner,
            failing_upserts: AtomicUsize::new(failing_upserts),
        }
    }
}

#[async_trait]
impl ProcessedScheduleRepository for FlakyScheduleRepository {
    async fn find_by_date_iso(&self, date_iso: &str) -> Result<Option<ProcessedScheduleInfo>> {
        self.inner.find_by_date_iso(date_iso).await
    }

    async fn upsert(&self, info: &ProcessedScheduleInfo) -> Result<()> {
        let failing = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Other("database is locked".to_string()));
        }
        self.inner.upsert(info).await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ProcessedScheduleInfo>> {
        self.inner.list_recent(limit).await
    }
}
