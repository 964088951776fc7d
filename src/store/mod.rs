// src/store/mod.rs - User profile storage seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{StoreError, UserId, UserProfile};

/// Mutation applied to a stored profile in place
pub type ProfileUpdate = Box<dyn FnOnce(&mut UserProfile) + Send>;

/// Durable profile storage consumed by the core; retry policy belongs to the implementation
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Apply `update` and return the profile as stored afterwards
    async fn update(&self, id: UserId, update: ProfileUpdate) -> Result<UserProfile, StoreError>;

    async fn insert(&self, profile: UserProfile) -> Result<(), StoreError>;

    /// Like `get`, but an unknown user is an error
    async fn fetch(&self, id: UserId) -> Result<UserProfile, StoreError> {
        self.get(id).await?.ok_or(StoreError::UserNotFound(id))
    }
}

/// Read a profile and clear a lapsed premium flag on the way through.
///
/// Returns the fresh profile and whether premium is in effect at `now`.
pub async fn load_with_premium(
    store: &dyn UserStore,
    id: UserId,
    now: DateTime<Utc>,
) -> Result<(UserProfile, bool), StoreError> {
    let profile = store.fetch(id).await?;
    if profile.premium_lapsed(now) {
        info!("Premium for user {} expired, clearing flag", id);
        let cleared = store
            .update(
                id,
                Box::new(|p: &mut UserProfile| {
                    p.is_premium = false;
                    p.premium_expires_at = None;
                }),
            )
            .await?;
        return Ok((cleared, false));
    }
    let premium = profile.premium_active(now);
    Ok((profile, premium))
}

/// Process-local store backing the binary and the test suite
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    profiles: Arc<RwLock<HashMap<UserId, UserProfile>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get(&self, id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn update(&self, id: UserId, update: ProfileUpdate) -> Result<UserProfile, StoreError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.get_mut(&id).ok_or(StoreError::UserNotFound(id))?;
        update(profile);
        Ok(profile.clone())
    }

    async fn insert(&self, profile: UserProfile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&profile.id) {
            return Err(StoreError::AlreadyRegistered(profile.id));
        }
        debug!("Registered user {} ({:?})", profile.id, profile.gender);
        profiles.insert(profile.id, profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;
    use chrono::Duration;

    #[tokio::test]
    async fn test_update_unknown_user_fails() {
        let store = InMemoryUserStore::new();
        let result = store.update(UserId(9), Box::new(|p: &mut UserProfile| p.warning_count += 1)).await;
        assert_eq!(result, Err(StoreError::UserNotFound(UserId(9))));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = InMemoryUserStore::new();
        store.insert(UserProfile::new(UserId(1), "one", Gender::Male)).await.unwrap();
        let again = store.insert(UserProfile::new(UserId(1), "uno", Gender::Female)).await;
        assert_eq!(again, Err(StoreError::AlreadyRegistered(UserId(1))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_lapsed_premium_is_cleared() {
        let store = InMemoryUserStore::new();
        let now = Utc::now();
        store
            .insert(UserProfile::new(UserId(1), "one", Gender::Male).with_premium(now - Duration::hours(1)))
            .await
            .unwrap();

        let (profile, premium) = load_with_premium(&store, UserId(1), now).await.unwrap();
        assert!(!premium);
        assert!(!profile.is_premium);
        assert!(!store.fetch(UserId(1)).await.unwrap().is_premium);
    }
}
