//! Component registries.
//!
//! The core holds four registries (agents, tools, knowledge bases,
//! providers), all instances of the generic [`Registry`].  Registration
//! happens once at config load; a component whose construction fails is
//! recorded as `load_failed` so the rest of the system still boots.
//!
//! Internally the registry is backed by [`DashMap`], which provides
//! lock-free concurrent reads and fine-grained write locking, making it safe
//! to share across request tasks without a global `RwLock`.
//!
//! Registries are read-only at request time; only `enable`/`disable` (and a
//! config reload, which swaps whole registries) mutate them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Load state of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// The component constructed successfully and is available.
    Ready,
    /// Construction failed; the slot records the error only.
    LoadFailed,
}

/// Serializable summary of one registry slot, used by the introspection
/// endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    pub id: String,
    pub description: String,
    pub enabled: bool,
    pub status: SlotStatus,
    pub registered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

struct Slot<T> {
    info: ComponentInfo,
    component: Option<Arc<T>>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Id-keyed collection of components of one kind.
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.  `kind` names the
/// component family ("tool", "agent", ...) for error messages.
#[derive(Clone)]
pub struct Registry<T> {
    kind: &'static str,
    inner: Arc<DashMap<String, Slot<T>>>,
}

impl<T> Registry<T> {
    /// Create an empty registry for the given component kind.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            inner: Arc::new(DashMap::new()),
        }
    }

    /// The component kind this registry holds.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register a ready component.  An existing slot with the same `id` is
    /// overwritten.
    pub fn register(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
        enabled: bool,
        component: T,
    ) {
        let id = id.into();
        tracing::info!(kind = self.kind, id = %id, enabled, "component registered");
        self.inner.insert(
            id.clone(),
            Slot {
                info: ComponentInfo {
                    id,
                    description: description.into(),
                    enabled,
                    status: SlotStatus::Ready,
                    registered_at: Utc::now(),
                    load_error: None,
                },
                component: Some(Arc::new(component)),
            },
        );
    }

    /// Record a component whose construction failed.  The slot is queryable
    /// through [`Registry::list`] but never resolves via [`Registry::get`].
    pub fn register_failed(
        &self,
        id: impl Into<String>,
        description: impl Into<String>,
        error: impl Into<String>,
    ) {
        let id = id.into();
        let error = error.into();
        tracing::warn!(kind = self.kind, id = %id, error = %error, "component failed to load");
        self.inner.insert(
            id.clone(),
            Slot {
                info: ComponentInfo {
                    id,
                    description: description.into(),
                    enabled: false,
                    status: SlotStatus::LoadFailed,
                    registered_at: Utc::now(),
                    load_error: Some(error),
                },
                component: None,
            },
        );
    }

    /// Resolve an enabled, ready component.
    ///
    /// Disabled components are absent from runtime lookups: resolving one is
    /// an error, as is resolving a slot that failed to load.
    pub fn get(&self, id: &str) -> Result<Arc<T>> {
        let slot = self.inner.get(id).ok_or_else(|| KernelError::ComponentNotFound {
            kind: self.kind,
            id: id.to_string(),
        })?;

        if slot.info.status == SlotStatus::LoadFailed {
            return Err(KernelError::ComponentLoadFailed {
                kind: self.kind,
                id: id.to_string(),
                reason: slot.info.load_error.clone().unwrap_or_default(),
            });
        }
        if !slot.info.enabled {
            return Err(KernelError::ComponentDisabled {
                kind: self.kind,
                id: id.to_string(),
            });
        }

        slot.component
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| KernelError::Internal(format!("ready slot without component: {id}")))
    }

    /// Whether `id` resolves to an enabled, ready component.
    pub fn is_available(&self, id: &str) -> bool {
        self.inner
            .get(id)
            .map(|s| s.info.enabled && s.info.status == SlotStatus::Ready)
            .unwrap_or(false)
    }

    /// Snapshot all slots, optionally restricted to enabled ones.
    pub fn list(&self, enabled_only: bool) -> Vec<ComponentInfo> {
        let mut infos: Vec<ComponentInfo> = self
            .inner
            .iter()
            .filter(|e| !enabled_only || e.value().info.enabled)
            .map(|e| e.value().info.clone())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Number of registered slots (including failed and disabled ones).
    pub fn size(&self) -> usize {
        self.inner.len()
    }

    /// Enable a registered component.
    pub fn enable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, true)
    }

    /// Disable a registered component, removing it from runtime lookups.
    pub fn disable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut slot = self.inner.get_mut(id).ok_or_else(|| KernelError::ComponentNotFound {
            kind: self.kind,
            id: id.to_string(),
        })?;
        slot.info.enabled = enabled;
        tracing::debug!(kind = self.kind, id = %id, enabled, "component toggled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get() {
        let registry: Registry<String> = Registry::new("tool");
        registry.register("calculator", "basic math", true, "calc".to_string());

        let tool = registry.get("calculator").expect("tool resolves");
        assert_eq!(*tool, "calc");
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn missing_component_errors() {
        let registry: Registry<String> = Registry::new("tool");
        assert!(matches!(
            registry.get("nope"),
            Err(KernelError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn disabled_component_absent_from_lookups() {
        let registry: Registry<String> = Registry::new("agent");
        registry.register("helper", "test agent", false, "a".to_string());

        assert!(!registry.is_available("helper"));
        assert!(matches!(
            registry.get("helper"),
            Err(KernelError::ComponentDisabled { .. })
        ));

        registry.enable("helper").expect("enable");
        assert!(registry.get("helper").is_ok());
    }

    #[test]
    fn load_failed_slot_does_not_block_boot() {
        let registry: Registry<String> = Registry::new("provider");
        registry.register_failed("broken", "bad provider", "missing api key");
        registry.register("working", "good provider", true, "p".to_string());

        assert_eq!(registry.size(), 2);
        assert!(registry.get("working").is_ok());
        assert!(matches!(
            registry.get("broken"),
            Err(KernelError::ComponentLoadFailed { .. })
        ));

        let failed: Vec<_> = registry
            .list(false)
            .into_iter()
            .filter(|i| i.status == SlotStatus::LoadFailed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].load_error.as_deref(), Some("missing api key"));
    }

    #[test]
    fn list_enabled_only() {
        let registry: Registry<u32> = Registry::new("kb");
        registry.register("a", "", true, 1);
        registry.register("b", "", false, 2);

        assert_eq!(registry.list(true).len(), 1);
        assert_eq!(registry.list(false).len(), 2);
    }
}
