//! In-memory adapters for exercising the attendance core without MySQL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AttendanceStore, EventGateStore, StoreError, UserDirectory};
use crate::model::attendance::{AttendanceRecord, ScanKind};
use crate::model::event::{EventGate, GatedEvent};
use crate::model::user::UserProfile;

#[derive(Default)]
struct Tables {
    events: HashMap<u64, GatedEvent>,
    users: HashMap<u64, UserProfile>,
    records: Vec<AttendanceRecord>,
    last_record_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_event(&self, id: u64, title: &str) {
        self.lock().events.insert(
            id,
            GatedEvent {
                id,
                title: title.to_owned(),
                gate: EventGate::default(),
            },
        );
    }

    pub fn remove_event(&self, id: u64) {
        let mut tables = self.lock();
        tables.events.remove(&id);
        tables.records.retain(|r| r.event_id != id);
    }

    pub fn add_user(&self, id: u64, email: &str, full_name: Option<&str>) {
        self.lock().users.insert(
            id,
            UserProfile {
                id,
                email: email.to_owned(),
                full_name: full_name.map(str::to_owned),
            },
        );
    }

    pub fn gate(&self, event_id: u64) -> Option<EventGate> {
        self.lock().events.get(&event_id).map(|e| e.gate.clone())
    }
}

#[async_trait]
impl EventGateStore for MemoryStore {
    async fn find_event(&self, event_id: u64) -> Result<Option<GatedEvent>, StoreError> {
        Ok(self.lock().events.get(&event_id).cloned())
    }

    async fn set_gate_open(
        &self,
        event_id: u64,
        kind: ScanKind,
        open: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(event) = tables.events.get_mut(&event_id) else {
            return Ok(false);
        };
        match kind {
            ScanKind::CheckIn => event.gate.check_in_open = open,
            ScanKind::CheckOut => event.gate.check_out_open = open,
        }
        Ok(true)
    }

    async fn ensure_code(
        &self,
        event_id: u64,
        kind: ScanKind,
        candidate: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut tables = self.lock();
        let Some(event) = tables.events.get_mut(&event_id) else {
            return Ok(None);
        };
        let slot = match kind {
            ScanKind::CheckIn => &mut event.gate.check_in_code,
            ScanKind::CheckOut => &mut event.gate.check_out_code,
        };
        Ok(Some(slot.get_or_insert_with(|| candidate.to_owned()).clone()))
    }

    async fn replace_code(
        &self,
        event_id: u64,
        kind: ScanKind,
        code: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(event) = tables.events.get_mut(&event_id) else {
            return Ok(false);
        };
        let slot = match kind {
            ScanKind::CheckIn => &mut event.gate.check_in_code,
            ScanKind::CheckOut => &mut event.gate.check_out_code,
        };
        *slot = Some(code.to_owned());
        Ok(true)
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find(
        &self,
        event_id: u64,
        attendee_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .find(|r| r.event_id == event_id && r.user_id == attendee_id)
            .cloned())
    }

    async fn create_checked_in(
        &self,
        event_id: u64,
        attendee_id: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut tables = self.lock();
        if tables
            .records
            .iter()
            .any(|r| r.event_id == event_id && r.user_id == attendee_id)
        {
            return Err(StoreError::Conflict(format!(
                "attendance for event {event_id} and user {attendee_id} already exists"
            )));
        }

        tables.last_record_id += 1;
        let record = AttendanceRecord {
            id: tables.last_record_id,
            event_id,
            user_id: attendee_id,
            checked_in_at: Some(at),
            checked_out_at: None,
            check_in_confirmed: true,
            check_out_confirmed: false,
            notes: None,
            created_at: at,
        };
        tables.records.push(record.clone());
        Ok(record)
    }

    async fn mark_checked_out(
        &self,
        record: &AttendanceRecord,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let mut tables = self.lock();
        let stored = tables
            .records
            .iter_mut()
            .find(|r| r.id == record.id && !r.check_out_confirmed)
            .ok_or_else(|| {
                StoreError::Conflict(format!("attendance {} is already checked out", record.id))
            })?;
        stored.checked_out_at = Some(at);
        stored.check_out_confirmed = true;
        Ok(stored.clone())
    }

    async fn list_for_event(&self, event_id: u64) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn list_for_attendee(
        &self,
        attendee_id: u64,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|r| r.user_id == attendee_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: u64) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[actix_web::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = MemoryStore::default();
        store.create_checked_in(1, 7, at()).await.unwrap();

        let second = store.create_checked_in(1, 7, at()).await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        assert_eq!(store.list_for_event(1).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn second_check_out_is_a_conflict() {
        let store = MemoryStore::default();
        let record = store.create_checked_in(1, 7, at()).await.unwrap();
        let out = store.mark_checked_out(&record, at()).await.unwrap();
        assert!(out.check_out_confirmed);

        let again = store.mark_checked_out(&record, at()).await;
        assert!(matches!(again, Err(StoreError::Conflict(_))));
    }

    #[actix_web::test]
    async fn ensure_code_keeps_the_first_code() {
        let store = MemoryStore::default();
        store.add_event(3, "Meetup");

        let first = store.ensure_code(3, ScanKind::CheckIn, "aaa").await.unwrap();
        let second = store.ensure_code(3, ScanKind::CheckIn, "bbb").await.unwrap();
        assert_eq!(first.as_deref(), Some("aaa"));
        assert_eq!(second.as_deref(), Some("aaa"));
        assert_eq!(store.ensure_code(99, ScanKind::CheckIn, "ccc").await.unwrap(), None);
    }

    #[actix_web::test]
    async fn record_ids_are_not_reused_after_cascade() {
        let store = MemoryStore::default();
        store.add_event(1, "First");
        store.add_event(2, "Second");

        store.create_checked_in(1, 7, at()).await.unwrap();
        let kept = store.create_checked_in(2, 7, at()).await.unwrap();
        store.remove_event(1);

        let fresh = store.create_checked_in(2, 8, at()).await.unwrap();
        assert_ne!(fresh.id, kept.id);
        assert!(fresh.id > kept.id);
    }
}
