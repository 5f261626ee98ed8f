use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::error::AttendanceError;
use crate::model::attendance::ScanKind;
use crate::model::event::GatedEvent;
use crate::store::EventGateStore;

/// Per-event check-in/check-out switches and their secret codes.
///
/// The two gates are independent: check-out may be opened while check-in is
/// closed. Ordering between the operations is enforced by attendance records.
#[derive(Clone)]
pub struct EventGates {
    store: Arc<dyn EventGateStore>,
}

fn fresh_code() -> String {
    Uuid::new_v4().to_string()
}

impl EventGates {
    pub fn new(store: Arc<dyn EventGateStore>) -> Self {
        Self { store }
    }

    pub async fn event(&self, event_id: u64) -> Result<GatedEvent, AttendanceError> {
        self.store
            .find_event(event_id)
            .await?
            .ok_or(AttendanceError::NotFound("Event"))
    }

    pub async fn set_open(
        &self,
        event_id: u64,
        kind: ScanKind,
        open: bool,
    ) -> Result<(), AttendanceError> {
        if !self.store.set_gate_open(event_id, kind, open).await? {
            return Err(AttendanceError::NotFound("Event"));
        }
        info!(event_id, %kind, open, "Gate toggled");
        Ok(())
    }

    pub async fn open_check_in(&self, event_id: u64) -> Result<(), AttendanceError> {
        self.set_open(event_id, ScanKind::CheckIn, true).await
    }

    pub async fn close_check_in(&self, event_id: u64) -> Result<(), AttendanceError> {
        self.set_open(event_id, ScanKind::CheckIn, false).await
    }

    pub async fn open_check_out(&self, event_id: u64) -> Result<(), AttendanceError> {
        self.set_open(event_id, ScanKind::CheckOut, true).await
    }

    pub async fn close_check_out(&self, event_id: u64) -> Result<(), AttendanceError> {
        self.set_open(event_id, ScanKind::CheckOut, false).await
    }

    /// Current code for `kind`, generated and persisted on first access.
    pub async fn current_code(
        &self,
        event_id: u64,
        kind: ScanKind,
    ) -> Result<String, AttendanceError> {
        self.store
            .ensure_code(event_id, kind, &fresh_code())
            .await?
            .ok_or(AttendanceError::NotFound("Event"))
    }

    pub async fn current_check_in_code(&self, event_id: u64) -> Result<String, AttendanceError> {
        self.current_code(event_id, ScanKind::CheckIn).await
    }

    pub async fn current_check_out_code(&self, event_id: u64) -> Result<String, AttendanceError> {
        self.current_code(event_id, ScanKind::CheckOut).await
    }

    /// Replaces the code for `kind`; every token minted with the old code stops working.
    pub async fn rotate_code(
        &self,
        event_id: u64,
        kind: ScanKind,
    ) -> Result<String, AttendanceError> {
        let code = fresh_code();
        if !self.store.replace_code(event_id, kind, &code).await? {
            return Err(AttendanceError::NotFound("Event"));
        }
        info!(event_id, %kind, "Gate code rotated");
        Ok(code)
    }

    pub async fn rotate_check_in_code(&self, event_id: u64) -> Result<String, AttendanceError> {
        self.rotate_code(event_id, ScanKind::CheckIn).await
    }

    pub async fn rotate_check_out_code(&self, event_id: u64) -> Result<String, AttendanceError> {
        self.rotate_code(event_id, ScanKind::CheckOut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.add_event(1, "Meetup");
        store
    }

    #[rstest]
    #[actix_web::test]
    async fn gates_toggle_independently(store: Arc<MemoryStore>) {
        let gates = EventGates::new(store.clone());

        gates.open_check_out(1).await.unwrap();
        let gate = store.gate(1).unwrap();
        assert!(!gate.check_in_open);
        assert!(gate.check_out_open);

        gates.open_check_in(1).await.unwrap();
        gates.close_check_out(1).await.unwrap();
        let gate = store.gate(1).unwrap();
        assert!(gate.check_in_open);
        assert!(!gate.check_out_open);

        gates.close_check_in(1).await.unwrap();
        assert!(!store.gate(1).unwrap().check_in_open);
    }

    #[rstest]
    #[actix_web::test]
    async fn toggling_a_missing_event_is_not_found(store: Arc<MemoryStore>) {
        let gates = EventGates::new(store);
        let result = gates.open_check_in(404).await;
        assert!(matches!(result, Err(AttendanceError::NotFound("Event"))));
    }

    #[rstest]
    #[actix_web::test]
    async fn code_is_generated_once_and_then_stable(store: Arc<MemoryStore>) {
        let gates = EventGates::new(store.clone());

        let first = gates.current_check_in_code(1).await.unwrap();
        let second = gates.current_check_in_code(1).await.unwrap();
        assert_eq!(first, second);

        let out = gates.current_check_out_code(1).await.unwrap();
        assert_ne!(first, out);
        assert_eq!(store.gate(1).unwrap().check_in_code, Some(first));
    }

    #[rstest]
    #[actix_web::test]
    async fn rotation_replaces_the_code(store: Arc<MemoryStore>) {
        let gates = EventGates::new(store.clone());

        let before = gates.current_check_in_code(1).await.unwrap();
        let after = gates.rotate_check_in_code(1).await.unwrap();
        assert_ne!(before, after);
        assert_eq!(gates.current_check_in_code(1).await.unwrap(), after);
        assert!(gates.rotate_check_out_code(404).await.is_err());
    }
}
