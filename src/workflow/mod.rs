pub mod context;
pub mod error;

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};

use crate::core::preset::{self, Preset};
use crate::core::schedule::{
    format_local_timestamp, truncate_to_minute, PageInfo, ScheduleId, ScheduleRecord,
};
use crate::core::store::ScheduleListStore;
use crate::host::{HostError, HostSurface};
use crate::service::{ScheduleService, ServiceError};

pub use context::{EditingContext, ServiceAvailability, WorkflowEvent};
pub use error::WorkflowError;

#[derive(Debug, Default)]
struct WorkflowState {
    context: EditingContext,
    /// Bumped on every context change.
    generation: u64,
    store: ScheduleListStore,
    host_page: Option<PageInfo>,
    availability: ServiceAvailability,
}

impl WorkflowState {
    fn set_context(&mut self, context: EditingContext) {
        log::debug!(
            "Editing context {} -> {}",
            self.context.label(),
            context.label()
        );
        self.context = context;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Return to Idle, unless someone moved the context since `generation` was captured.
    fn finish_edit(&mut self, generation: u64) {
        if self.generation == generation {
            self.set_context(EditingContext::Idle);
        } else {
            log::debug!(
                "Context changed to {} while the request ran, leaving it",
                self.context.label()
            );
        }
    }
}

/// Owns the editing context and the schedule list, and is the only thing
/// that talks to the scheduling service.
///
/// Methods take `&self`. Network operations are serialized by an in-flight
/// guard; `begin_*` and `cancel_editing` never wait on it.
pub struct ScheduleWorkflowController<S> {
    service: S,
    state: Mutex<WorkflowState>,
    in_flight: tokio::sync::Mutex<()>,
}

impl<S: ScheduleService> ScheduleWorkflowController<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            state: Mutex::new(WorkflowState::default()),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    fn state(&self) -> MutexGuard<'_, WorkflowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Read side --

    pub fn set_host_page(&self, page: Option<PageInfo>) {
        self.state().host_page = page;
    }

    pub fn context(&self) -> EditingContext {
        self.state().context.clone()
    }

    pub fn availability(&self) -> ServiceAvailability {
        self.state().availability
    }

    pub fn records(&self) -> Vec<ScheduleRecord> {
        self.state().store.records().to_vec()
    }

    pub fn record(&self, id: &ScheduleId) -> Option<ScheduleRecord> {
        self.state().store.get(id).cloned()
    }

    /// The page being drafted: the composed link, the record being moved,
    /// or the live host page when idle.
    pub fn current_target(&self) -> Option<PageInfo> {
        let state = self.state();
        match &state.context {
            EditingContext::Idle => state.host_page.clone(),
            EditingContext::ComposingNew {
                target_url,
                target_title,
            } => Some(PageInfo::new(target_url.clone(), target_title.clone())),
            EditingContext::Rescheduling { schedule_id, .. } => state
                .store
                .get(schedule_id)
                .map(|record| PageInfo::new(record.url.clone(), record.title.clone()))
                .or_else(|| state.host_page.clone()),
        }
    }

    /// Time to pre-fill: the record's own time when rescheduling, else an hour from `now`.
    pub fn default_time(&self, now: NaiveDateTime) -> NaiveDateTime {
        match &self.state().context {
            EditingContext::Rescheduling {
                original_timestamp, ..
            } => *original_timestamp,
            _ => preset::default_time(now),
        }
    }

    // -- Local transitions --

    pub fn begin_compose(&self, url: &str, title: Option<String>) -> Result<(), WorkflowError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(WorkflowError::PreconditionFailed(
                "cannot schedule an empty url".into(),
            ));
        }
        let title = title.filter(|t| !t.trim().is_empty());
        self.state().set_context(EditingContext::ComposingNew {
            target_url: url.to_string(),
            target_title: title,
        });
        Ok(())
    }

    /// Compose for whatever page the host is showing.
    pub async fn begin_compose_from_host<H>(&self, host: &H) -> Result<(), WorkflowError>
    where
        H: HostSurface + ?Sized,
    {
        let page = host.active_page().await.ok_or(HostError::NoActivePage)?;
        self.set_host_page(Some(page.clone()));
        self.begin_compose(&page.url, page.title)
    }

    pub fn begin_reschedule(&self, id: &ScheduleId) -> Result<(), WorkflowError> {
        let mut state = self.state();
        let original_timestamp = match state.store.get(id) {
            Some(record) => record.scheduled_at,
            None => {
                log::warn!("Cannot reschedule {}: not in the list", id);
                state.set_context(EditingContext::Idle);
                return Err(WorkflowError::NotFound(id.clone()));
            }
        };
        state.set_context(EditingContext::Rescheduling {
            schedule_id: id.clone(),
            original_timestamp,
        });
        Ok(())
    }

    pub fn cancel_editing(&self) {
        let mut state = self.state();
        if !state.context.is_idle() {
            state.set_context(EditingContext::Idle);
        }
    }

    // -- Network operations --

    /// Commit the current draft at `scheduled_at`, cut to the minute.
    pub async fn confirm(&self, scheduled_at: NaiveDateTime) -> Result<WorkflowEvent, WorkflowError> {
        let scheduled_at = truncate_to_minute(scheduled_at);
        let _guard = self.in_flight.lock().await;
        let (context, generation) = {
            let state = self.state();
            (state.context.clone(), state.generation)
        };

        match context {
            EditingContext::Idle => Err(WorkflowError::PreconditionFailed(
                "nothing is being edited".into(),
            )),
            EditingContext::ComposingNew {
                target_url,
                target_title,
            } => {
                self.create(&target_url, target_title.as_deref(), scheduled_at, generation)
                    .await
            }
            EditingContext::Rescheduling { schedule_id, .. } => {
                self.reschedule(schedule_id, scheduled_at, generation).await
            }
        }
    }

    pub async fn confirm_preset(
        &self,
        preset: Preset,
        now: NaiveDateTime,
    ) -> Result<WorkflowEvent, WorkflowError> {
        self.confirm(preset.resolve(now)).await
    }

    async fn create(
        &self,
        url: &str,
        title: Option<&str>,
        scheduled_at: NaiveDateTime,
        generation: u64,
    ) -> Result<WorkflowEvent, WorkflowError> {
        self.ensure_writable()?;
        log::debug!(
            "Creating schedule for {} at {}",
            url,
            format_local_timestamp(&scheduled_at)
        );
        let result = self.service.create_schedule(url, scheduled_at, title).await;
        let record = match self.settle("create", result) {
            Ok(record) => record,
            Err(e @ WorkflowError::InvalidResponse(_)) => {
                // Accepted with a 2xx but unreadable: the schedule exists, so the draft is done.
                log::warn!("Created schedule for {} but could not read it back; refresh to see it", url);
                self.state().finish_edit(generation);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut state = self.state();
        state.store.append(record.clone());
        state.finish_edit(generation);
        let event = WorkflowEvent::Scheduled(record);
        log::info!("{}", event.describe());
        Ok(event)
    }

    async fn reschedule(
        &self,
        id: ScheduleId,
        scheduled_at: NaiveDateTime,
        generation: u64,
    ) -> Result<WorkflowEvent, WorkflowError> {
        {
            let mut state = self.state();
            if !state.store.contains(&id) {
                log::warn!("Reschedule target {} is no longer listed", id);
                state.finish_edit(generation);
                return Err(WorkflowError::NotFound(id));
            }
        }
        self.ensure_writable()?;
        log::debug!(
            "Moving schedule {} to {}",
            id,
            format_local_timestamp(&scheduled_at)
        );
        let result = self.service.update_schedule(&id, scheduled_at).await;
        let echoed = self.settle("update", result)?;
        if let Some(record) = echoed.filter(|r| r.scheduled_at != scheduled_at) {
            log::debug!(
                "Service echoed {} for {}, keeping the requested time",
                format_local_timestamp(&record.scheduled_at),
                id
            );
        }

        let mut state = self.state();
        state.store.update_time(&id, scheduled_at);
        state.finish_edit(generation);
        let event = WorkflowEvent::Rescheduled { id, scheduled_at };
        log::info!("{}", event.describe());
        Ok(event)
    }

    /// Delete a schedule. Deleting one that is already gone succeeds.
    pub async fn delete_existing(&self, id: &ScheduleId) -> Result<WorkflowEvent, WorkflowError> {
        let _guard = self.in_flight.lock().await;
        self.ensure_writable()?;
        log::debug!("Deleting schedule {}", id);
        let result = self.service.delete_schedule(id).await;
        self.settle("delete", result)?;

        let mut state = self.state();
        state.store.remove(id);
        if state.context.rescheduling_id() == Some(id) {
            state.set_context(EditingContext::Idle);
        }
        let event = WorkflowEvent::Deleted(id.clone());
        log::info!("{}", event.describe());
        Ok(event)
    }

    /// Replace the list with what the service reports as pending.
    pub async fn refresh(&self, date: Option<NaiveDate>) -> Result<WorkflowEvent, WorkflowError> {
        let _guard = self.in_flight.lock().await;
        log::debug!("Refreshing schedules (date: {:?})", date);
        let result = self.service.get_schedules(date).await;
        let list = self.settle("list", result)?;
        let records: Vec<ScheduleRecord> = list
            .schedules
            .into_iter()
            .filter(ScheduleRecord::is_pending)
            .collect();

        let mut state = self.state();
        state.store.replace_all(records);
        let event = WorkflowEvent::Refreshed {
            count: state.store.len(),
        };
        log::debug!("{}", event.describe());
        Ok(event)
    }

    pub async fn refresh_today(&self, today: NaiveDate) -> Result<WorkflowEvent, WorkflowError> {
        self.refresh(Some(today)).await
    }

    /// Ask the service whether it is up. A healthy answer re-enables writes.
    pub async fn check_health(&self) -> bool {
        let _guard = self.in_flight.lock().await;
        let healthy = self.service.check_health().await;
        let availability = if healthy {
            ServiceAvailability::Available
        } else {
            ServiceAvailability::Unavailable
        };
        let mut state = self.state();
        if state.availability != availability {
            log::info!("Service availability: {:?}", availability);
        }
        state.availability = availability;
        healthy
    }

    /// Open a listed record through the host.
    pub async fn open_existing<H>(&self, id: &ScheduleId, host: &H) -> Result<WorkflowEvent, WorkflowError>
    where
        H: HostSurface + ?Sized,
    {
        let record = self
            .record(id)
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))?;
        host.open_url(&record.url).await?;
        Ok(WorkflowEvent::Opened(id.clone()))
    }

    fn ensure_writable(&self) -> Result<(), WorkflowError> {
        if self.state().availability.allows_writes() {
            Ok(())
        } else {
            log::warn!("Service is unavailable, refusing to write");
            Err(WorkflowError::Unavailable)
        }
    }

    /// Record what a service answer says about availability and map its error.
    ///
    /// Only a transport failure marks the service down, and only `check_health`
    /// brings it back.
    fn settle<T>(&self, op: &str, result: Result<T, ServiceError>) -> Result<T, WorkflowError> {
        let result = result.map_err(|e| {
            log::warn!("Schedule {} failed: {}", op, e);
            WorkflowError::from(e)
        });
        let mut state = self.state();
        match &result {
            Err(e) if e.is_transport() => state.availability = ServiceAvailability::Unavailable,
            _ if state.availability == ServiceAvailability::Unknown => {
                state.availability = ServiceAvailability::Available;
            }
            _ => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ScheduleList;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Gate {
        op: Mutex<Option<&'static str>>,
        started: Notify,
        release: Notify,
    }

    /// In-memory service. Failures are scripted per operation and used once.
    struct FakeService {
        records: Mutex<Vec<ScheduleRecord>>,
        failures: Mutex<HashMap<&'static str, ServiceError>>,
        healthy: AtomicBool,
        calls: Mutex<Vec<&'static str>>,
        gate: Gate,
    }

    impl FakeService {
        fn new() -> Self {
            Self::with_records(Vec::new())
        }

        fn with_records(records: Vec<ScheduleRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                failures: Mutex::new(HashMap::new()),
                healthy: AtomicBool::new(true),
                calls: Mutex::new(Vec::new()),
                gate: Gate::default(),
            }
        }

        fn fail(&self, op: &'static str, err: ServiceError) {
            self.failures.lock().unwrap().insert(op, err);
        }

        fn hold(&self, op: &'static str) {
            *self.gate.op.lock().unwrap() = Some(op);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn server_records(&self) -> Vec<ScheduleRecord> {
            self.records.lock().unwrap().clone()
        }

        async fn enter(&self, op: &'static str) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push(op);
            let held = {
                let mut gate_op = self.gate.op.lock().unwrap();
                if *gate_op == Some(op) {
                    gate_op.take();
                    true
                } else {
                    false
                }
            };
            if held {
                self.gate.started.notify_one();
                self.gate.release.notified().await;
            }
            match self.failures.lock().unwrap().remove(op) {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ScheduleService for FakeService {
        async fn create_schedule(
            &self,
            url: &str,
            scheduled_at: NaiveDateTime,
            title: Option<&str>,
        ) -> Result<ScheduleRecord, ServiceError> {
            self.enter("create").await?;
            let record = ScheduleRecord::new(
                uuid::Uuid::new_v4().to_string(),
                url,
                title.map(String::from),
                scheduled_at,
            );
            self.records.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn get_schedules(&self, date: Option<NaiveDate>) -> Result<ScheduleList, ServiceError> {
            self.enter("list").await?;
            let schedules: Vec<ScheduleRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| date.is_none_or(|d| r.scheduled_at.date() == d))
                .cloned()
                .collect();
            Ok(ScheduleList {
                total: Some(schedules.len()),
                schedules,
            })
        }

        async fn update_schedule(
            &self,
            id: &ScheduleId,
            scheduled_at: NaiveDateTime,
        ) -> Result<Option<ScheduleRecord>, ServiceError> {
            self.enter("update").await?;
            let mut records = self.records.lock().unwrap();
            match records.iter_mut().find(|r| r.id == *id) {
                Some(record) => {
                    record.scheduled_at = scheduled_at;
                    Ok(None)
                }
                None => Err(ServiceError::Status {
                    status: 404,
                    message: "Schedule not found".into(),
                }),
            }
        }

        async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), ServiceError> {
            self.enter("delete").await?;
            self.records.lock().unwrap().retain(|r| r.id != *id);
            Ok(())
        }

        async fn check_health(&self) -> bool {
            self.calls.lock().unwrap().push("health");
            self.healthy.load(Ordering::SeqCst)
        }
    }

    struct RecordingHost {
        page: Option<PageInfo>,
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostSurface for RecordingHost {
        async fn active_page(&self) -> Option<PageInfo> {
            self.page.clone()
        }

        async fn open_url(&self, url: &str) -> Result<(), HostError> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn ts(s: &str) -> NaiveDateTime {
        crate::core::schedule::parse_local_timestamp(s).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(id: &str, url: &str, at: &str) -> ScheduleRecord {
        ScheduleRecord::new(id, url, None, ts(at))
    }

    fn server_error() -> ServiceError {
        ServiceError::Status {
            status: 500,
            message: String::new(),
        }
    }

    async fn seeded(records: Vec<ScheduleRecord>) -> ScheduleWorkflowController<FakeService> {
        let controller = ScheduleWorkflowController::new(FakeService::with_records(records));
        controller.refresh(None).await.unwrap();
        controller
    }

    #[tokio::test]
    async fn compose_and_confirm_creates_one_record() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller
            .begin_compose("https://a.example", Some("A".into()))
            .unwrap();

        let event = controller.confirm(ts("2025-01-01T10:00")).await.unwrap();
        assert_eq!(event.status_message(), "Scheduled!");

        let records = controller.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://a.example");
        assert_eq!(records[0].title.as_deref(), Some("A"));
        assert_eq!(records[0].scheduled_at, ts("2025-01-01T10:00"));
        assert_eq!(controller.context(), EditingContext::Idle);
    }

    #[tokio::test]
    async fn failed_reschedule_keeps_original_time_and_context() {
        let controller = seeded(vec![record("5", "https://b.example", "2025-01-01T09:00")]).await;
        let id = ScheduleId::from("5");
        controller.begin_reschedule(&id).unwrap();
        controller.service().fail("update", server_error());

        let err = controller.confirm(ts("2025-01-01T18:00")).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::Service {
                status: 500,
                message: String::new()
            }
        );
        assert_eq!(controller.record(&id).unwrap().scheduled_at, ts("2025-01-01T09:00"));
        assert_eq!(
            controller.context(),
            EditingContext::Rescheduling {
                schedule_id: id.clone(),
                original_timestamp: ts("2025-01-01T09:00"),
            }
        );
        assert!(controller.availability().allows_writes());

        // Retrying from the same context succeeds.
        let event = controller.confirm(ts("2025-01-01T18:00")).await.unwrap();
        assert_eq!(event.status_message(), "Rescheduled!");
        assert_eq!(controller.record(&id).unwrap().scheduled_at, ts("2025-01-01T18:00"));
        assert!(controller.context().is_idle());
    }

    #[tokio::test]
    async fn refresh_replaces_the_list() {
        let controller = seeded(vec![
            record("1", "https://a.example", "2025-01-01T08:00"),
            record("2", "https://b.example", "2025-01-02T08:00"),
        ])
        .await;
        assert_eq!(controller.records().len(), 2);

        controller.service().records.lock().unwrap().push(record(
            "3",
            "https://c.example",
            "2025-01-01T20:00",
        ));
        let event = controller.refresh_today(day("2025-01-01")).await.unwrap();
        assert_eq!(event, WorkflowEvent::Refreshed { count: 2 });

        let ids: Vec<String> = controller
            .records()
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn refresh_drops_non_pending_records() {
        let mut opened = record("9", "https://old.example", "2025-01-01T08:00");
        opened.status = "opened".into();
        let controller = seeded(vec![opened, record("1", "https://a.example", "2025-01-01T09:00")]).await;
        assert_eq!(controller.records().len(), 1);
        assert_eq!(controller.records()[0].id, ScheduleId::from("1"));
    }

    #[tokio::test]
    async fn failed_create_leaves_store_and_draft() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        controller.service().fail("create", server_error());

        let err = controller.confirm(ts("2025-01-01T10:00")).await.unwrap_err();
        assert_eq!(err.user_message(), "Failed: 500");
        assert!(controller.records().is_empty());
        assert_eq!(controller.context().label(), "composing");

        controller.confirm(ts("2025-01-01T10:00")).await.unwrap();
        assert_eq!(controller.records().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_create_response_ends_the_draft() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        controller
            .service()
            .fail("create", ServiceError::Decode("expected value at line 1".into()));

        let err = controller.confirm(ts("2025-01-01T10:00")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidResponse(_)));
        assert!(controller.context().is_idle());
        assert!(controller.records().is_empty());

        let err = controller.confirm(ts("2025-01-01T10:00")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
        assert_eq!(controller.service().calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn reschedule_stores_the_minute_that_was_sent() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let id = ScheduleId::from("1");
        let now = ts("2025-01-01T10:17") + chrono::Duration::milliseconds(33_250);

        controller.begin_reschedule(&id).unwrap();
        let event = controller.confirm_preset(Preset::InOneHour, now).await.unwrap();
        assert_eq!(
            event,
            WorkflowEvent::Rescheduled {
                id: id.clone(),
                scheduled_at: ts("2025-01-01T11:17"),
            }
        );
        let local = controller.record(&id).unwrap().scheduled_at;
        assert_eq!(local, ts("2025-01-01T11:17"));

        controller.refresh(None).await.unwrap();
        assert_eq!(controller.record(&id).unwrap().scheduled_at, local);
    }

    #[tokio::test]
    async fn create_sends_whole_minutes() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        controller
            .confirm(ts("2025-01-01T10:00") + chrono::Duration::seconds(59))
            .await
            .unwrap();

        assert_eq!(controller.records()[0].scheduled_at, ts("2025-01-01T10:00"));
        assert_eq!(controller.records(), controller.service().server_records());
    }

    #[tokio::test]
    async fn confirm_while_idle_does_nothing() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        let err = controller.confirm(ts("2025-01-01T10:00")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
        assert!(controller.service().calls().is_empty());
    }

    #[test]
    fn empty_url_cannot_be_composed() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        let before = controller.context();

        let err = controller.begin_compose("   ", None).unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
        assert_eq!(controller.context(), before);
    }

    #[tokio::test]
    async fn reschedule_of_unknown_id_returns_to_idle() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        controller.begin_compose("https://b.example", None).unwrap();

        let err = controller.begin_reschedule(&ScheduleId::from("42")).unwrap_err();
        assert_eq!(err, WorkflowError::NotFound(ScheduleId::from("42")));
        assert!(controller.context().is_idle());
    }

    #[tokio::test]
    async fn delete_twice_succeeds_both_times() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let id = ScheduleId::from("1");

        controller.delete_existing(&id).await.unwrap();
        controller.delete_existing(&id).await.unwrap();
        assert!(controller.record(&id).is_none());
        assert!(controller.service().server_records().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_the_record() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let id = ScheduleId::from("1");
        controller.service().fail("delete", server_error());

        assert!(controller.delete_existing(&id).await.is_err());
        assert!(controller.record(&id).is_some());
    }

    #[tokio::test]
    async fn deleting_the_reschedule_target_ends_the_edit() {
        let controller = seeded(vec![
            record("1", "https://a.example", "2025-01-01T08:00"),
            record("2", "https://b.example", "2025-01-01T09:00"),
        ])
        .await;
        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();

        controller.delete_existing(&ScheduleId::from("2")).await.unwrap();
        assert_eq!(controller.context().label(), "rescheduling");

        controller.delete_existing(&ScheduleId::from("1")).await.unwrap();
        assert!(controller.context().is_idle());
    }

    #[tokio::test]
    async fn cancel_never_touches_the_network() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let calls_before = controller.service().calls().len();

        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();
        controller.cancel_editing();
        controller.begin_compose("https://b.example", None).unwrap();
        controller.cancel_editing();

        assert!(controller.context().is_idle());
        assert_eq!(controller.records().len(), 1);
        assert_eq!(controller.service().calls().len(), calls_before);
    }

    #[tokio::test]
    async fn mixed_sequence_keeps_ids_unique_and_mirrors_the_service() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let now = ts("2025-01-01T20:30");

        controller.begin_compose("https://b.example", None).unwrap();
        controller.confirm_preset(Preset::Tonight, now).await.unwrap();
        controller.begin_compose("https://c.example", None).unwrap();
        controller.service().fail("create", server_error());
        assert!(controller.confirm_preset(Preset::Tomorrow, now).await.is_err());
        controller.cancel_editing();
        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();
        controller.confirm_preset(Preset::InOneHour, now).await.unwrap();
        controller.delete_existing(&ScheduleId::from("404")).await.unwrap();

        let local = controller.records();
        let mut ids: Vec<&ScheduleId> = local.iter().map(|r| &r.id).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        assert_eq!(ids.len(), local.len());
        assert_eq!(local, controller.service().server_records());
        assert_eq!(local[0].scheduled_at, ts("2025-01-01T21:30"));
        assert_eq!(local[1].scheduled_at, ts("2025-01-01T21:00"));
        assert!(controller.context().is_idle());
    }

    #[tokio::test]
    async fn transport_failure_blocks_writes_until_healthy() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        controller
            .service()
            .fail("create", ServiceError::Transport("connection refused".into()));

        let err = controller.confirm(ts("2025-01-01T10:00")).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(controller.availability(), ServiceAvailability::Unavailable);

        let calls_before = controller.service().calls().len();
        let err = controller.confirm(ts("2025-01-01T10:00")).await.unwrap_err();
        assert_eq!(err, WorkflowError::Unavailable);
        let err = controller.delete_existing(&ScheduleId::from("1")).await.unwrap_err();
        assert_eq!(err, WorkflowError::Unavailable);
        assert_eq!(controller.service().calls().len(), calls_before);

        // Reads are still allowed, but do not re-enable writes.
        controller.refresh(None).await.unwrap();
        assert_eq!(controller.availability(), ServiceAvailability::Unavailable);

        controller.service().healthy.store(false, Ordering::SeqCst);
        assert!(!controller.check_health().await);
        assert_eq!(controller.availability(), ServiceAvailability::Unavailable);

        controller.service().healthy.store(true, Ordering::SeqCst);
        assert!(controller.check_health().await);
        assert_eq!(controller.availability(), ServiceAvailability::Available);
        controller.confirm(ts("2025-01-01T10:00")).await.unwrap();
        assert_eq!(controller.records().len(), 1);
    }

    #[tokio::test]
    async fn stale_create_does_not_clobber_a_newer_draft() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        controller.service().hold("create");

        let confirm = controller.confirm(ts("2025-01-01T10:00"));
        let meanwhile = async {
            controller.service().gate.started.notified().await;
            controller.begin_compose("https://b.example", None).unwrap();
            controller.service().gate.release.notify_one();
        };
        let (result, ()) = tokio::join!(confirm, meanwhile);

        result.unwrap();
        assert_eq!(controller.records().len(), 1);
        assert_eq!(controller.records()[0].url, "https://a.example");
        assert_eq!(
            controller.current_target(),
            Some(PageInfo::new("https://b.example", None))
        );
    }

    #[tokio::test]
    async fn stale_reschedule_applies_to_the_captured_id() {
        let controller = seeded(vec![
            record("1", "https://a.example", "2025-01-01T08:00"),
            record("2", "https://b.example", "2025-01-01T09:00"),
        ])
        .await;
        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();
        controller.service().hold("update");

        let confirm = controller.confirm(ts("2025-01-01T12:00"));
        let meanwhile = async {
            controller.service().gate.started.notified().await;
            controller.begin_reschedule(&ScheduleId::from("2")).unwrap();
            controller.service().gate.release.notify_one();
        };
        let (result, ()) = tokio::join!(confirm, meanwhile);

        result.unwrap();
        assert_eq!(
            controller.record(&ScheduleId::from("1")).unwrap().scheduled_at,
            ts("2025-01-01T12:00")
        );
        assert_eq!(
            controller.record(&ScheduleId::from("2")).unwrap().scheduled_at,
            ts("2025-01-01T09:00")
        );
        assert_eq!(controller.context().rescheduling_id(), Some(&ScheduleId::from("2")));
    }

    #[tokio::test]
    async fn refresh_waits_for_an_in_flight_confirm() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        controller.begin_compose("https://a.example", None).unwrap();
        controller.service().hold("create");

        let confirm = controller.confirm(ts("2025-01-01T10:00"));
        let refresh = async {
            controller.service().gate.started.notified().await;
            let refreshed = controller.refresh(None);
            let release = async {
                tokio::task::yield_now().await;
                controller.service().gate.release.notify_one();
            };
            let (refreshed, ()) = tokio::join!(refreshed, release);
            refreshed
        };
        let (created, refreshed) = tokio::join!(confirm, refresh);

        created.unwrap();
        assert_eq!(refreshed.unwrap(), WorkflowEvent::Refreshed { count: 1 });
        assert_eq!(controller.service().calls(), vec!["create", "list"]);
        assert_eq!(controller.records().len(), 1);
    }

    #[tokio::test]
    async fn vanished_reschedule_target_is_not_found() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();

        controller.service().records.lock().unwrap().clear();
        controller.refresh(None).await.unwrap();
        let calls_before = controller.service().calls().len();

        let err = controller.confirm(ts("2025-01-01T12:00")).await.unwrap_err();
        assert_eq!(err, WorkflowError::NotFound(ScheduleId::from("1")));
        assert!(controller.context().is_idle());
        assert_eq!(controller.service().calls().len(), calls_before);
    }

    #[tokio::test]
    async fn targets_and_default_times_follow_the_context() {
        let controller = seeded(vec![ScheduleRecord::new(
            "1",
            "https://a.example",
            Some("A".into()),
            ts("2025-01-01T08:00"),
        )])
        .await;
        let now = ts("2025-01-01T07:15");
        let live = PageInfo::new("https://live.example", Some("Live".into()));
        controller.set_host_page(Some(live.clone()));

        assert_eq!(controller.current_target(), Some(live.clone()));
        assert_eq!(controller.default_time(now), ts("2025-01-01T08:15"));

        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();
        assert_eq!(
            controller.current_target(),
            Some(PageInfo::new("https://a.example", Some("A".into())))
        );
        assert_eq!(controller.default_time(now), ts("2025-01-01T08:00"));

        controller.cancel_editing();
        assert_eq!(controller.current_target(), Some(live));
    }

    #[tokio::test]
    async fn vanished_reschedule_target_shows_the_live_page() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let live = PageInfo::new("https://live.example", None);
        controller.set_host_page(Some(live.clone()));
        controller.begin_reschedule(&ScheduleId::from("1")).unwrap();

        controller.service().records.lock().unwrap().clear();
        controller.refresh(None).await.unwrap();

        assert_eq!(controller.context().label(), "rescheduling");
        assert_eq!(controller.current_target(), Some(live));
    }

    #[tokio::test]
    async fn compose_from_host_uses_the_active_page() {
        let controller = ScheduleWorkflowController::new(FakeService::new());
        let host = RecordingHost {
            page: Some(PageInfo::new("https://page.example", Some("Page".into()))),
            opened: Mutex::new(Vec::new()),
        };
        controller.begin_compose_from_host(&host).await.unwrap();
        assert_eq!(
            controller.context(),
            EditingContext::ComposingNew {
                target_url: "https://page.example".into(),
                target_title: Some("Page".into()),
            }
        );

        let empty = RecordingHost {
            page: None,
            opened: Mutex::new(Vec::new()),
        };
        let err = controller.begin_compose_from_host(&empty).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Host(_)));
    }

    #[tokio::test]
    async fn open_existing_goes_through_the_host() {
        let controller = seeded(vec![record("1", "https://a.example", "2025-01-01T08:00")]).await;
        let host = RecordingHost {
            page: None,
            opened: Mutex::new(Vec::new()),
        };

        let event = controller.open_existing(&ScheduleId::from("1"), &host).await.unwrap();
        assert_eq!(event, WorkflowEvent::Opened(ScheduleId::from("1")));
        assert_eq!(*host.opened.lock().unwrap(), vec!["https://a.example".to_string()]);

        let err = controller
            .open_existing(&ScheduleId::from("2"), &host)
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::NotFound(ScheduleId::from("2")));
    }
}
