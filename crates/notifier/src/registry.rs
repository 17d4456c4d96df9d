//! In-memory cache of known instances, kept current by live side effects.

use crate::center::NotificationCenter;
use common::types::{
    Event, EventInner, EventKind, InstanceEventInner, InstanceInfo, InstanceState,
    ProgressionEndValue, ProgressionEventInner,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEntry {
    pub uuid: String,
    pub name: String,
    pub game_type: Option<String>,
    pub state: Option<InstanceState>,
    pub port: Option<u32>,
}

impl From<InstanceInfo> for InstanceEntry {
    fn from(info: InstanceInfo) -> Self {
        Self {
            uuid: info.uuid,
            name: info.name,
            game_type: info.game_type,
            state: info.state,
            port: info.port,
        }
    }
}

#[derive(Clone, Default)]
pub struct InstanceRegistry {
    instances: Arc<RwLock<BTreeMap<String, InstanceEntry>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook the registry up to the center's live side effects.
    pub fn register_effects(&self, center: &NotificationCenter) {
        for kind in [
            EventKind::InstanceCreationCompleted,
            EventKind::InstanceDeleteCompleted,
            EventKind::InstanceStateTransition,
        ] {
            let registry = self.clone();
            center.register(kind, "instance-registry", move |event: Event| {
                let registry = registry.clone();
                async move {
                    registry.apply(&event);
                    Ok(())
                }
            });
        }
    }

    /// Fold one event into the cache. Events that do not concern instances are ignored.
    pub fn apply(&self, event: &Event) {
        match &event.event_inner {
            EventInner::ProgressionEvent(progression) => {
                let ProgressionEventInner::ProgressionEnd {
                    success: true,
                    inner: Some(value),
                    ..
                } = &progression.progression_event_inner
                else {
                    return;
                };
                match value {
                    ProgressionEndValue::InstanceCreation(info) => {
                        info!(uuid = %info.uuid, name = %info.name, "instance added to registry");
                        self.write().insert(info.uuid.clone(), info.clone().into());
                    }
                    ProgressionEndValue::InstanceDelete { instance_uuid } => {
                        if self.write().remove(instance_uuid).is_some() {
                            info!(uuid = %instance_uuid, "instance removed from registry");
                        }
                    }
                    _ => {}
                }
            }
            EventInner::InstanceEvent(instance) => {
                let InstanceEventInner::StateTransition { to } = &instance.instance_event_inner
                else {
                    return;
                };
                let mut instances = self.write();
                let entry = instances
                    .entry(instance.instance_uuid.clone())
                    .or_insert_with(|| InstanceEntry {
                        uuid: instance.instance_uuid.clone(),
                        name: instance.instance_name.clone(),
                        game_type: None,
                        state: None,
                        port: None,
                    });
                entry.state = Some(*to);
                debug!(uuid = %instance.instance_uuid, state = %to, "instance state updated");
            }
            _ => {}
        }
    }

    pub fn get(&self, uuid: &str) -> Option<InstanceEntry> {
        self.read().get(uuid).cloned()
    }

    /// Snapshot ordered by uuid.
    pub fn list(&self) -> Vec<InstanceEntry> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, InstanceEntry>> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, InstanceEntry>> {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
