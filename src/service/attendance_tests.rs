//! Tests for the attendance state machine.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use rstest::{fixture, rstest};

use super::*;
use crate::store::memory::MemoryStore;

const EVENT: u64 = 1;
const U1: u64 = 10;
const U2: u64 = 11;

struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    fn at(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    fn advance(&self, delta: TimeDelta) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<MutableClock>,
    service: AttendanceService,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    store.add_event(EVENT, "RustConf Meetup");
    store.add_event(2, "Other Event");
    store.add_user(U1, "u1@example.com", Some("User One"));
    store.add_user(U2, "u2@example.com", None);

    let clock = Arc::new(MutableClock::at(t0()));
    let service = AttendanceService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        QrTokenCodec::new("test-qr-secret", TimeDelta::hours(24)),
        clock.clone(),
    );
    Harness {
        store,
        clock,
        service,
    }
}

#[rstest]
#[actix_web::test]
async fn check_in_succeeds_once_per_attendee(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    let minted = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    harness.clock.advance(TimeDelta::minutes(1));
    let outcome = svc.scan_check_in(&minted.token, U1).await.unwrap();
    assert_eq!(outcome.kind, ScanKind::CheckIn);
    assert_eq!(outcome.user_name, "User One");
    assert_eq!(outcome.event_title, "RustConf Meetup");
    assert_eq!(
        outcome.record.checked_in_at,
        Some(t0() + TimeDelta::minutes(1))
    );
    assert!(outcome.record.check_in_confirmed);

    let again = svc.scan_check_in(&minted.token, U1).await;
    assert!(matches!(again, Err(AttendanceError::AlreadyCheckedIn)));

    // same poster, different attendee
    let other = svc.scan_check_in(&minted.token, U2).await.unwrap();
    assert_eq!(other.user_name, "u2@example.com");
}

#[rstest]
#[actix_web::test]
async fn check_out_without_check_in_is_rejected(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_out(EVENT).await.unwrap();
    let minted = svc.mint(EVENT, ScanKind::CheckOut).await.unwrap();

    let result = svc.scan_check_out(&minted.token, U1).await;
    assert!(matches!(result, Err(AttendanceError::NoCheckInRecord)));
    assert!(svc.event_attendance(EVENT).await.unwrap().is_empty());
}

#[rstest]
#[actix_web::test]
async fn full_flow_reaches_checked_out_once(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    svc.gates().open_check_out(EVENT).await.unwrap();
    let check_in = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    let check_out = svc.mint(EVENT, ScanKind::CheckOut).await.unwrap();

    svc.scan_check_in(&check_in.token, U1).await.unwrap();
    harness.clock.advance(TimeDelta::hours(3));
    let out = svc.scan_check_out(&check_out.token, U1).await.unwrap();

    let record = out.record;
    assert_eq!(record.state(), crate::model::attendance::AttendanceState::CheckedOut);
    assert!(record.checked_out_at >= record.checked_in_at);

    let again = svc.scan_check_out(&check_out.token, U1).await;
    assert!(matches!(again, Err(AttendanceError::AlreadyCheckedOut)));
}

#[rstest]
#[actix_web::test]
async fn rotation_invalidates_outstanding_tokens(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    let old = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    let fresh = svc.rotate_and_mint(EVENT, ScanKind::CheckIn).await.unwrap();

    let result = svc.scan_check_in(&old.token, U1).await;
    assert!(matches!(result, Err(AttendanceError::InvalidToken(_))));
    svc.scan_check_in(&fresh.token, U1).await.unwrap();
}

#[rstest]
#[case(TimeDelta::hours(24), true)]
#[case(TimeDelta::hours(24) + TimeDelta::seconds(1), false)]
#[case(TimeDelta::days(3), false)]
#[actix_web::test]
async fn tokens_expire_after_a_day(
    harness: Harness,
    #[case] elapsed: TimeDelta,
    #[case] accepted: bool,
) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    let minted = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    assert_eq!(minted.expires_at, t0() + TimeDelta::hours(24));

    harness.clock.advance(elapsed);
    let result = svc.scan_check_in(&minted.token, U1).await;
    if accepted {
        assert!(result.is_ok());
    } else {
        assert!(matches!(result, Err(AttendanceError::InvalidToken(_))));
    }
}

#[rstest]
#[actix_web::test]
async fn token_is_accepted_at_its_reported_expiry(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();

    harness.clock.advance(TimeDelta::milliseconds(900));
    let minted = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    assert_eq!(minted.issued_at, t0());
    assert_eq!(minted.expires_at, t0() + TimeDelta::hours(24));

    // clock now sits exactly on expires_at
    harness.clock.advance(TimeDelta::hours(24) - TimeDelta::milliseconds(900));
    svc.scan_check_in(&minted.token, U1).await.unwrap();
}

#[rstest]
#[actix_web::test]
async fn token_minted_mid_second_is_stale_past_its_expiry(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();

    harness.clock.advance(TimeDelta::milliseconds(900));
    let minted = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    harness.clock.advance(TimeDelta::hours(24) + TimeDelta::milliseconds(100));
    let result = svc.scan_check_in(&minted.token, U1).await;
    assert!(matches!(result, Err(AttendanceError::InvalidToken(_))));
}

#[rstest]
#[actix_web::test]
async fn closed_gate_rejects_valid_tokens(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    let minted = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    svc.gates().close_check_in(EVENT).await.unwrap();

    let result = svc.scan_check_in(&minted.token, U1).await;
    assert!(matches!(
        result,
        Err(AttendanceError::GateClosed(ScanKind::CheckIn))
    ));
}

#[rstest]
#[actix_web::test]
async fn rejects_wrong_kind_and_foreign_events(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    svc.gates().open_check_out(EVENT).await.unwrap();
    let check_in = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    let wrong_kind = svc.scan_check_out(&check_in.token, U1).await;
    assert!(matches!(wrong_kind, Err(AttendanceError::InvalidToken(_))));

    let garbage = svc.scan_check_in("{\"type\":\"check_in\"}", U1).await;
    assert!(matches!(garbage, Err(AttendanceError::InvalidToken(_))));

    // a token for event 2 carries event 2's code, which event 2 never opened for
    let other = svc.mint(2, ScanKind::CheckIn).await.unwrap();
    let closed = svc.scan_check_in(&other.token, U1).await;
    assert!(matches!(closed, Err(AttendanceError::GateClosed(_))));
}

#[rstest]
#[actix_web::test]
async fn unknown_event_and_attendee_are_not_found(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    let minted = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    let nobody = svc.scan_check_in(&minted.token, 404).await;
    assert!(matches!(nobody, Err(AttendanceError::NotFound("User"))));

    harness.store.remove_event(EVENT);
    let gone = svc.scan_check_in(&minted.token, U1).await;
    assert!(matches!(gone, Err(AttendanceError::NotFound("Event"))));

    assert!(matches!(
        svc.mint(EVENT, ScanKind::CheckIn).await,
        Err(AttendanceError::NotFound("Event"))
    ));
}

#[rstest]
#[actix_web::test]
async fn rotation_does_not_reset_attendee_state(harness: Harness) {
    let svc = &harness.service;
    let gates = svc.gates();

    gates.open_check_in(EVENT).await.unwrap();
    let abc = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    harness.clock.advance(TimeDelta::minutes(1));
    let first = svc.scan_check_in(&abc.token, U1).await.unwrap();
    assert_eq!(
        first.record.checked_in_at,
        Some(t0() + TimeDelta::minutes(1))
    );
    assert!(matches!(
        svc.scan_check_in(&abc.token, U1).await,
        Err(AttendanceError::AlreadyCheckedIn)
    ));

    gates.close_check_in(EVENT).await.unwrap();
    gates.open_check_in(EVENT).await.unwrap();
    let xyz = svc.rotate_and_mint(EVENT, ScanKind::CheckIn).await.unwrap();

    assert!(matches!(
        svc.scan_check_in(&abc.token, U1).await,
        Err(AttendanceError::InvalidToken(_))
    ));
    assert!(matches!(
        svc.scan_check_in(&xyz.token, U1).await,
        Err(AttendanceError::AlreadyCheckedIn)
    ));
}

#[rstest]
#[actix_web::test]
async fn auto_scan_prefers_the_check_in_gate_closed_error(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    let check_in = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    svc.gates().close_check_in(EVENT).await.unwrap();
    svc.gates().open_check_out(EVENT).await.unwrap();

    let result = svc.scan_auto(&check_in.token, U1).await;
    assert!(matches!(
        result,
        Err(AttendanceError::GateClosed(ScanKind::CheckIn))
    ));
}

#[rstest]
#[actix_web::test]
async fn auto_scan_falls_through_to_check_out(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    svc.gates().open_check_out(EVENT).await.unwrap();
    let check_in = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    let check_out = svc.mint(EVENT, ScanKind::CheckOut).await.unwrap();

    let first = svc.scan_auto(&check_in.token, U1).await.unwrap();
    assert_eq!(first.kind, ScanKind::CheckIn);

    let second = svc.scan_auto(&check_out.token, U1).await.unwrap();
    assert_eq!(second.kind, ScanKind::CheckOut);

    let third = svc.scan_auto(&check_out.token, U1).await;
    match third {
        Err(AttendanceError::InvalidToken(message)) => assert_eq!(message, "Invalid QR code"),
        other => panic!("expected generic invalid token, got {other:?}"),
    }
}

#[rstest]
#[actix_web::test]
async fn auto_scan_reports_check_out_gate_when_check_in_fails_otherwise(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_out(EVENT).await.unwrap();
    let check_out = svc.mint(EVENT, ScanKind::CheckOut).await.unwrap();
    svc.gates().close_check_out(EVENT).await.unwrap();
    svc.gates().open_check_in(EVENT).await.unwrap();

    let result = svc.scan_auto(&check_out.token, U1).await;
    assert!(matches!(
        result,
        Err(AttendanceError::GateClosed(ScanKind::CheckOut))
    ));
}

#[rstest]
#[actix_web::test]
async fn summary_and_history_reflect_records(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    svc.gates().open_check_out(EVENT).await.unwrap();
    let check_in = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    let check_out = svc.mint(EVENT, ScanKind::CheckOut).await.unwrap();

    svc.scan_check_in(&check_in.token, U1).await.unwrap();
    svc.scan_check_in(&check_in.token, U2).await.unwrap();
    svc.scan_check_out(&check_out.token, U1).await.unwrap();

    let summary = svc.summary(EVENT).await.unwrap();
    assert_eq!(
        summary,
        AttendanceSummary {
            event_id: EVENT,
            event_title: "RustConf Meetup".to_owned(),
            total_registered: 2,
            total_checked_in: 2,
            total_checked_out: 1,
            check_in_started: true,
            check_out_started: true,
        }
    );

    let list = svc.event_attendance(EVENT).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].user_email, "u1@example.com");

    let history = svc.attendee_history(U1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_title, "RustConf Meetup");

    assert!(matches!(
        svc.summary(404).await,
        Err(AttendanceError::NotFound("Event"))
    ));
}

/// Serves a fixed `find` result, as a concurrent scan that read before the
/// other one wrote would see it. Writes go to the real store.
struct StaleReads {
    inner: Arc<MemoryStore>,
    seen: Option<AttendanceRecord>,
}

#[async_trait]
impl AttendanceStore for StaleReads {
    async fn find(
        &self,
        _event_id: u64,
        _attendee_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.seen.clone())
    }

    async fn create_checked_in(
        &self,
        event_id: u64,
        attendee_id: u64,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        self.inner.create_checked_in(event_id, attendee_id, at).await
    }

    async fn mark_checked_out(
        &self,
        record: &AttendanceRecord,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        self.inner.mark_checked_out(record, at).await
    }

    async fn list_for_event(&self, event_id: u64) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.inner.list_for_event(event_id).await
    }

    async fn list_for_attendee(
        &self,
        attendee_id: u64,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.inner.list_for_attendee(attendee_id).await
    }
}

fn with_stale_reads(harness: &Harness, seen: Option<AttendanceRecord>) -> AttendanceService {
    let records = Arc::new(StaleReads {
        inner: harness.store.clone(),
        seen,
    });
    AttendanceService::new(
        harness.store.clone(),
        records,
        harness.store.clone(),
        QrTokenCodec::new("test-qr-secret", TimeDelta::hours(24)),
        harness.clock.clone(),
    )
}

#[rstest]
#[actix_web::test]
async fn racing_check_ins_create_a_single_record(harness: Harness) {
    harness.service.gates().open_check_in(EVENT).await.unwrap();
    let racing = with_stale_reads(&harness, None);
    let minted = racing.mint(EVENT, ScanKind::CheckIn).await.unwrap();

    // both scans saw "no record"; the store's unique key decides
    racing.scan_check_in(&minted.token, U1).await.unwrap();
    let loser = racing.scan_check_in(&minted.token, U1).await;
    assert!(matches!(loser, Err(AttendanceError::AlreadyCheckedIn)));

    let records = harness.service.event_attendance(EVENT).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[rstest]
#[actix_web::test]
async fn racing_check_outs_confirm_only_once(harness: Harness) {
    let svc = &harness.service;
    svc.gates().open_check_in(EVENT).await.unwrap();
    svc.gates().open_check_out(EVENT).await.unwrap();
    let check_in = svc.mint(EVENT, ScanKind::CheckIn).await.unwrap();
    let checked_in = svc.scan_check_in(&check_in.token, U1).await.unwrap().record;

    let racing = with_stale_reads(&harness, Some(checked_in.clone()));
    let check_out = racing.mint(EVENT, ScanKind::CheckOut).await.unwrap();

    harness.clock.advance(TimeDelta::hours(1));
    let winner = racing.scan_check_out(&check_out.token, U1).await.unwrap();
    assert_eq!(winner.record.id, checked_in.id);

    harness.clock.advance(TimeDelta::seconds(1));
    let loser = racing.scan_check_out(&check_out.token, U1).await;
    assert!(matches!(loser, Err(AttendanceError::AlreadyCheckedOut)));

    // first writer's timestamp survives
    let history = svc.attendee_history(U1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].record.checked_out_at,
        Some(t0() + TimeDelta::hours(1))
    );
}
