use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;

/// Entity sets already requested, per service path.
///
/// Cloning shares the underlying state, so one cache can be handed to every
/// session that should deduplicate against the others.
#[derive(Debug, Clone, Default)]
pub struct RequestCache {
    inner: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `entity_set` as requested for `service_path`.
    ///
    /// Returns `false` when it was already claimed. Check and mark happen
    /// under one lock.
    pub async fn claim(&self, service_path: &str, entity_set: &str) -> bool {
        let mut guard = self.inner.lock().await;
        let claimed = guard.entry(service_path.to_string()).or_default();
        if claimed.iter().any(|name| name == entity_set) {
            return false;
        }
        claimed.push(entity_set.to_string());
        true
    }

    /// Claim every entity set not yet claimed, returning the newly claimed ones.
    pub async fn claim_all(&self, service_path: &str, entity_sets: &[String]) -> Vec<String> {
        let mut guard = self.inner.lock().await;
        let claimed = guard.entry(service_path.to_string()).or_default();
        let mut seen: HashSet<String> = claimed.iter().cloned().collect();
        let fresh: Vec<String> = entity_sets
            .iter()
            .filter(|name| seen.insert(name.to_string()))
            .cloned()
            .collect();
        claimed.extend(fresh.iter().cloned());
        fresh
    }

    /// Drop a claim, e.g. after the request for it failed.
    pub async fn release(&self, service_path: &str, entity_set: &str) {
        let mut guard = self.inner.lock().await;
        if let Some(claimed) = guard.get_mut(service_path) {
            claimed.retain(|name| name != entity_set);
        }
    }

    pub async fn contains(&self, service_path: &str, entity_set: &str) -> bool {
        self.inner
            .lock()
            .await
            .get(service_path)
            .is_some_and(|claimed| claimed.iter().any(|name| name == entity_set))
    }

    pub async fn entity_sets(&self, service_path: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .get(service_path)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget every service path.
    pub async fn reset(&self) {
        self.inner.lock().await.clear();
    }

    /// Forget one service path, leaving the others untouched.
    pub async fn reset_scoped(&self, service_path: &str) {
        self.inner.lock().await.remove(service_path);
    }
}
