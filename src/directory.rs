// src/directory.rs

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// The profile kept for every user who logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub subject: String,
    pub name: String,
    pub audience: Vec<String>,
    pub email: String,
}

/// Pluggable user directory.
///
/// Implement this trait to back the relying party with your own storage.
/// Implementations synchronise internally; concurrent upserts for the same
/// subject resolve last-write-wins.
pub trait UserDirectory: Send + Sync + 'static {
    /// Creates the record for `record.subject`, or replaces the existing one in place.
    fn upsert(&self, record: UserRecord);
    fn find(&self, subject: &str) -> Option<UserRecord>;
}

/// In-memory directory keyed by subject.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: DashMap<String, UserRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryDirectory {
    fn upsert(&self, record: UserRecord) {
        match self.users.get_mut(&record.subject) {
            Some(mut existing) => {
                let existing = existing.value_mut();
                existing.name = record.name;
                existing.audience = record.audience;
                existing.email = record.email;
            }
            None => {
                self.users.insert(record.subject.clone(), record);
            }
        }
    }

    fn find(&self, subject: &str) -> Option<UserRecord> {
        self.users.get(subject).map(|r| r.value().clone())
    }
}
