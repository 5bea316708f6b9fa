//! In-memory port implementations shared by the engine tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use wbhub_domain::device::{Control, Device};
use wbhub_domain::error::HubError;
use wbhub_domain::event::{Event, OutboundMessage};
use wbhub_domain::history::HistoryEntry;
use wbhub_domain::id::{ControlKey, MacrosId};
use wbhub_domain::macros::MacrosConfig;

use crate::ports::{EventPublisher, HardwareRepository, HistoryRepository, MacrosRepository};

fn storage_down() -> HubError {
    HubError::storage(std::io::Error::other("storage is down"))
}

// ── Hardware repo ──────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct InMemoryHardwareRepo {
    pub(crate) devices: Mutex<BTreeMap<String, Device>>,
    pub(crate) controls: Mutex<BTreeMap<ControlKey, Control>>,
    pub(crate) upserts: AtomicUsize,
    pub(crate) failing: AtomicBool,
}

impl InMemoryHardwareRepo {
    pub(crate) fn with(devices: Vec<Device>) -> Self {
        let repo = Self::default();
        for device in devices {
            for control in &device.controls {
                repo.controls
                    .lock()
                    .unwrap()
                    .insert(control.key(), control.clone());
            }
            repo.devices
                .lock()
                .unwrap()
                .insert(device.id.clone(), device.clone_fields());
        }
        repo
    }

    pub(crate) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn control(&self, key: &ControlKey) -> Option<Control> {
        self.controls.lock().unwrap().get(key).cloned()
    }
}

impl HardwareRepository for InMemoryHardwareRepo {
    fn upsert_devices(
        &self,
        devices: Vec<Device>,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(storage_down())
        } else {
            let mut store = self.devices.lock().unwrap();
            for device in devices {
                store.insert(device.id.clone(), device.clone_fields());
            }
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        async { result }
    }

    fn upsert_controls(
        &self,
        controls: Vec<Control>,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(storage_down())
        } else {
            let mut store = self.controls.lock().unwrap();
            for control in controls {
                store.insert(control.key(), control);
            }
            Ok(())
        };
        async { result }
    }

    fn get_all_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        let r: Vec<_> = self.devices.lock().unwrap().values().cloned().collect();
        async { Ok(r) }
    }

    fn get_all_controls(&self) -> impl Future<Output = Result<Vec<Control>, HubError>> + Send {
        let r: Vec<_> = self.controls.lock().unwrap().values().cloned().collect();
        async { Ok(r) }
    }
}

// ── History repo ───────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct InMemoryHistoryRepo {
    pub(crate) rows: Mutex<Vec<HistoryEntry>>,
    pub(crate) failing: AtomicBool,
}

impl InMemoryHistoryRepo {
    pub(crate) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn rows(&self) -> Vec<HistoryEntry> {
        self.rows.lock().unwrap().clone()
    }
}

impl HistoryRepository for InMemoryHistoryRepo {
    fn append_many(
        &self,
        entries: Vec<HistoryEntry>,
    ) -> impl Future<Output = Result<usize, HubError>> + Send {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(storage_down())
        } else {
            let count = entries.len();
            self.rows.lock().unwrap().extend(entries);
            Ok(count)
        };
        async { result }
    }
}

// ── Macros repo ────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct InMemoryMacrosRepo {
    pub(crate) store: Mutex<BTreeMap<MacrosId, MacrosConfig>>,
}

impl InMemoryMacrosRepo {
    pub(crate) fn with(configs: Vec<MacrosConfig>) -> Self {
        Self {
            store: Mutex::new(configs.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    pub(crate) fn get(&self, id: MacrosId) -> Option<MacrosConfig> {
        self.store.lock().unwrap().get(&id).cloned()
    }
}

impl MacrosRepository for InMemoryMacrosRepo {
    fn get_all(&self) -> impl Future<Output = Result<Vec<MacrosConfig>, HubError>> + Send {
        let r: Vec<_> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(r) }
    }

    fn upsert(
        &self,
        config: MacrosConfig,
    ) -> impl Future<Output = Result<MacrosConfig, HubError>> + Send {
        self.store.lock().unwrap().insert(config.id, config.clone());
        async { Ok(config) }
    }

    fn delete(&self, id: MacrosId) -> impl Future<Output = Result<(), HubError>> + Send {
        self.store.lock().unwrap().remove(&id);
        async { Ok(()) }
    }
}

// ── Spy publisher ──────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct SpyPublisher {
    pub(crate) events: Mutex<Vec<Event>>,
}

impl SpyPublisher {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<OutboundMessage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::WbPublishMessage(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventPublisher for SpyPublisher {
    fn publish(&self, event: Event) -> Result<(), HubError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
