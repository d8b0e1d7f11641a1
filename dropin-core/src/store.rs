//! Configuration Store contract and the in-process reference store.
//!
//! A store hands out [`ConfigHandle`]s keyed by [`Pid`]. Plain records are
//! addressed directly; factory records are instances of a factory PID and
//! receive a generated PID of the form `<factory>.<n>`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::StoreError;
use crate::types::{Pid, Properties};

pub trait ConfigStore: Send + Sync {
    /// Handle on the plain record `pid`, created empty when absent.
    fn get(&self, pid: &Pid) -> Result<Arc<dyn ConfigHandle>, StoreError>;

    /// Handle on the instance of `factory_pid` created for `qualifier`.
    /// The first call for a qualifier creates the instance; later calls
    /// return it again.
    fn get_or_create_factory(
        &self,
        factory_pid: &Pid,
        qualifier: &str,
    ) -> Result<Arc<dyn ConfigHandle>, StoreError>;
}

pub trait ConfigHandle: Send + Sync + fmt::Debug {
    fn pid(&self) -> Pid;

    fn factory_pid(&self) -> Option<Pid>;

    fn properties(&self) -> Option<Properties>;

    fn update(&self, properties: &Properties) -> Result<(), StoreError>;

    fn delete(&self) -> Result<(), StoreError>;

    /// Module location the record is bound to, if any.
    fn binding_location(&self) -> Option<String>;

    fn clear_binding_location(&self);
}

/// Status view of one stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSnapshot {
    pub pid: Pid,
    pub factory_pid: Option<Pid>,
    pub properties: Option<Properties>,
    pub binding_location: Option<String>,
}

#[derive(Debug, Default)]
struct Record {
    factory_pid: Option<Pid>,
    qualifier: Option<String>,
    properties: Option<Properties>,
    binding_location: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<Pid, Record>,
    updates: Vec<(Pid, Properties)>,
    generated: u64,
}

/// In-process configuration store.
///
/// Every successful `update` is also appended to an update log, which the
/// daemon reports and tests assert on.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RecordSnapshot> {
        self.state
            .lock()
            .records
            .iter()
            .map(|(pid, record)| RecordSnapshot {
                pid: pid.clone(),
                factory_pid: record.factory_pid.clone(),
                properties: record.properties.clone(),
                binding_location: record.binding_location.clone(),
            })
            .collect()
    }

    pub fn record(&self, pid: &Pid) -> Option<RecordSnapshot> {
        self.records().into_iter().find(|record| &record.pid == pid)
    }

    /// Every successful update, oldest first.
    pub fn updates(&self) -> Vec<(Pid, Properties)> {
        self.state.lock().updates.clone()
    }

    /// Bind a record to a module location, creating it if needed.
    pub fn bind_location(&self, pid: &Pid, location: impl Into<String>) {
        let mut state = self.state.lock();
        state.records.entry(pid.clone()).or_default().binding_location = Some(location.into());
    }

    fn handle(&self, pid: Pid, factory_pid: Option<Pid>) -> Arc<dyn ConfigHandle> {
        Arc::new(MemoryConfigHandle {
            pid,
            factory_pid,
            state: Arc::clone(&self.state),
        })
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, pid: &Pid) -> Result<Arc<dyn ConfigHandle>, StoreError> {
        let factory_pid = {
            let mut state = self.state.lock();
            state.records.entry(pid.clone()).or_default().factory_pid.clone()
        };
        Ok(self.handle(pid.clone(), factory_pid))
    }

    fn get_or_create_factory(
        &self,
        factory_pid: &Pid,
        qualifier: &str,
    ) -> Result<Arc<dyn ConfigHandle>, StoreError> {
        let pid = {
            let mut state = self.state.lock();
            let existing = state
                .records
                .iter()
                .find(|(_, record)| {
                    record.factory_pid.as_ref() == Some(factory_pid)
                        && record.qualifier.as_deref() == Some(qualifier)
                })
                .map(|(pid, _)| pid.clone());
            match existing {
                Some(pid) => pid,
                None => {
                    state.generated += 1;
                    let pid = Pid(format!("{factory_pid}.{}", state.generated));
                    state.records.insert(
                        pid.clone(),
                        Record {
                            factory_pid: Some(factory_pid.clone()),
                            qualifier: Some(qualifier.to_string()),
                            ..Record::default()
                        },
                    );
                    pid
                }
            }
        };
        Ok(self.handle(pid, Some(factory_pid.clone())))
    }
}

#[derive(Debug)]
struct MemoryConfigHandle {
    pid: Pid,
    factory_pid: Option<Pid>,
    state: Arc<Mutex<StoreState>>,
}

impl ConfigHandle for MemoryConfigHandle {
    fn pid(&self) -> Pid {
        self.pid.clone()
    }

    fn factory_pid(&self) -> Option<Pid> {
        self.factory_pid.clone()
    }

    fn properties(&self) -> Option<Properties> {
        self.state
            .lock()
            .records
            .get(&self.pid)
            .and_then(|record| record.properties.clone())
    }

    fn update(&self, properties: &Properties) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(&self.pid)
            .ok_or_else(|| StoreError::Deleted(self.pid.clone()))?;
        record.properties = Some(properties.clone());
        state.updates.push((self.pid.clone(), properties.clone()));
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.state
            .lock()
            .records
            .remove(&self.pid)
            .map(|_| ())
            .ok_or_else(|| StoreError::Deleted(self.pid.clone()))
    }

    fn binding_location(&self) -> Option<String> {
        self.state
            .lock()
            .records
            .get(&self.pid)
            .and_then(|record| record.binding_location.clone())
    }

    fn clear_binding_location(&self) {
        if let Some(record) = self.state.lock().records.get_mut(&self.pid) {
            record.binding_location = None;
        }
    }
}
