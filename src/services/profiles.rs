use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::storage::StorageManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    /// Accepts English and Arabic spellings; anything unknown is `Male`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "female" | "f" | "أنثى" | "انثى" | "ست" => Gender::Female,
            _ => Gender::Male,
        }
    }
}

/// Everything the assistant knows about the person it is talking to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub gender: Gender,
    pub profession: Option<String>,
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
    pub allergies: Vec<String>,
    pub favorite_recipes: Vec<String>,
    pub calendar_connected: bool,
}

/// Read/write access to user profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self, email: &str) -> Result<Option<UserProfile>>;

    /// Fresh calendar-connected flag, bypassing any cached profile
    async fn calendar_connected(&self, user_id: &str) -> Result<bool>;

    async fn add_favorite(&self, user_id: &str, title: &str) -> Result<()>;
}

#[async_trait]
impl ProfileStore for StorageManager {
    async fn load_profile(&self, email: &str) -> Result<Option<UserProfile>> {
        self.find_user_by_email(email).await
    }

    async fn calendar_connected(&self, user_id: &str) -> Result<bool> {
        self.user_calendar_connected(user_id).await
    }

    async fn add_favorite(&self, user_id: &str, title: &str) -> Result<()> {
        self.add_favorite_recipe(user_id, title).await
    }
}

/// One async mutex per user id.
///
/// Serializes turns for the same user across sessions, and guards token
/// refreshes so two requests never refresh the same credential at once.
#[derive(Default, Clone)]
pub struct UserLocks {
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `user_id`, creating it on first use.
    ///
    /// Locks nobody else holds are dropped from the map on the way in.
    pub fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.retain(|id, lock| id == user_id || Arc::strong_count(lock) > 1);
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}
