//! Change records and the bounded history they are kept in.
//!
//! History is an explicit count-bounded undo log, not version control: once a
//! record is evicted its change can no longer be reverted.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentTree;

/// What caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTrigger {
    Classification,
    Manual,
}

/// Whether a snapshot was taken before or after the destination was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangePhase {
    Before,
    After,
}

/// The write a change performed on its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// The destination document was created by the change.
    Created,
    /// Content was appended to an existing destination.
    Updated,
}

/// A snapshot of one destination document around one write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub trigger: ChangeTrigger,
    pub phase: ChangePhase,
    pub action: ChangeAction,
    pub document_id: Uuid,
    pub destination_path: String,
    pub reason: String,
    /// Content tree at snapshot time. `None` for a document that did not exist.
    pub old_content: Option<ContentTree>,
    pub old_content_text: String,
    /// Projection right after the write, used to detect later edits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content_text: Option<String>,
}

impl ChangeRecord {
    /// Snapshot of a document's current state.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot(
        trigger: ChangeTrigger,
        phase: ChangePhase,
        action: ChangeAction,
        document_id: Uuid,
        destination_path: impl Into<String>,
        reason: impl Into<String>,
        content: Option<&ContentTree>,
        content_text: &str,
    ) -> Self {
        Self {
            id: crate::uuid_utils::new_v7(),
            timestamp: Utc::now(),
            trigger,
            phase,
            action,
            document_id,
            destination_path: destination_path.into(),
            reason: reason.into(),
            old_content: content.cloned(),
            old_content_text: content_text.to_string(),
            new_content_text: None,
        }
    }

    pub fn with_new_content_text(mut self, text: impl Into<String>) -> Self {
        self.new_content_text = Some(text.into());
        self
    }
}

/// Most-recent-first, capacity-bounded list of change records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    capacity: usize,
    entries: VecDeque<ChangeRecord>,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new(crate::defaults::HISTORY_CAPACITY)
    }
}

impl ChangeLog {
    /// Create an empty log holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild a log from persisted records, keeping the newest `capacity`.
    pub fn from_records(capacity: usize, records: Vec<ChangeRecord>) -> Self {
        let mut log = Self::new(capacity);
        log.entries = records.into_iter().take(log.capacity).collect();
        log
    }

    /// Apply a different capacity, evicting the oldest records if needed.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<ChangeRecord> {
        self.capacity = capacity.max(1);
        self.evict_overflow()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert the newest record; returns records evicted to stay in bounds.
    pub fn push(&mut self, record: ChangeRecord) -> Vec<ChangeRecord> {
        self.entries.push_front(record);
        self.evict_overflow()
    }

    fn evict_overflow(&mut self) -> Vec<ChangeRecord> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.entries.pop_back() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    pub fn get(&self, id: Uuid) -> Option<&ChangeRecord> {
        self.entries.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: Uuid) -> Option<ChangeRecord> {
        let pos = self.entries.iter().position(|r| r.id == id)?;
        self.entries.remove(pos)
    }

    /// Records newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reason: &str) -> ChangeRecord {
        ChangeRecord::snapshot(
            ChangeTrigger::Classification,
            ChangePhase::Before,
            ChangeAction::Updated,
            Uuid::new_v4(),
            "/Errands",
            reason,
            None,
            "",
        )
    }

    #[test]
    fn test_push_is_most_recent_first() {
        let mut log = ChangeLog::new(3);
        log.push(record("a"));
        log.push(record("b"));
        let reasons: Vec<&str> = log.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons, vec!["b", "a"]);
    }

    #[test]
    fn test_push_evicts_oldest_beyond_capacity() {
        let mut log = ChangeLog::new(2);
        let first = record("first");
        let first_id = first.id;
        log.push(first);
        log.push(record("second"));
        let evicted = log.push(record("third"));

        assert_eq!(log.len(), 2);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, first_id);
        assert!(!log.contains(first_id));
    }

    #[test]
    fn test_remove_by_id() {
        let mut log = ChangeLog::default();
        let r = record("x");
        let id = r.id;
        log.push(r);
        assert!(log.remove(id).is_some());
        assert!(log.remove(id).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_from_records_truncates_to_capacity() {
        let records: Vec<ChangeRecord> = (0..5).map(|i| record(&i.to_string())).collect();
        let log = ChangeLog::from_records(3, records);
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().next().unwrap().reason, "0");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = ChangeLog::new(0);
        assert_eq!(log.capacity(), 1);
        log.push(record("a"));
        log.push(record("b"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let mut log = ChangeLog::new(5);
        for i in 0..4 {
            log.push(record(&i.to_string()));
        }
        let evicted = log.set_capacity(2);
        assert_eq!(evicted.len(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record("r")).unwrap();
        assert_eq!(json["trigger"], "classification");
        assert_eq!(json["phase"], "before");
        assert!(json.get("documentId").is_some());
        assert!(json.get("oldContentText").is_some());
    }
}
