use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::Appointment;

use crate::models::SyncAction;

/// Schedules pre-appointment reminders. Implementations live outside this crate.
#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    async fn schedule(&self, appointment: &Appointment) -> anyhow::Result<()>;

    async fn cancel(&self, appointment_id: Uuid) -> anyhow::Result<()>;
}

/// Mirrors appointment rows into an external spreadsheet.
#[async_trait]
pub trait SpreadsheetMirror: Send + Sync {
    async fn sync(&self, appointment: &Appointment, action: SyncAction) -> anyhow::Result<()>;
}

/// Dispatches best-effort side effects after a committed write. Failures are
/// logged and swallowed.
#[derive(Clone, Default)]
pub struct SideEffects {
    reminders: Option<Arc<dyn ReminderScheduler>>,
    spreadsheet: Option<Arc<dyn SpreadsheetMirror>>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reminders(mut self, reminders: Arc<dyn ReminderScheduler>) -> Self {
        self.reminders = Some(reminders);
        self
    }

    pub fn with_spreadsheet(mut self, spreadsheet: Arc<dyn SpreadsheetMirror>) -> Self {
        self.spreadsheet = Some(spreadsheet);
        self
    }

    pub async fn after_write(&self, appointment: &Appointment, action: SyncAction) {
        if let Some(reminders) = &self.reminders {
            let result = match action {
                SyncAction::Created => reminders.schedule(appointment).await,
                SyncAction::Rescheduled => match reminders.cancel(appointment.id).await {
                    Ok(()) => reminders.schedule(appointment).await,
                    Err(e) => Err(e),
                },
                SyncAction::Cancelled => reminders.cancel(appointment.id).await,
            };
            if let Err(e) = result {
                warn!("Reminder update failed for appointment {} ({}): {}", appointment.id, action, e);
            }
        }

        if let Some(spreadsheet) = &self.spreadsheet {
            if let Err(e) = spreadsheet.sync(appointment, action).await {
                warn!("Spreadsheet mirror failed for appointment {} ({}): {}", appointment.id, action, e);
            }
        }

        debug!("Side effects dispatched for appointment {} ({})", appointment.id, action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use shared_models::AppointmentStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReminderScheduler for Recorder {
        async fn schedule(&self, appointment: &Appointment) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("schedule {}", appointment.id));
            Ok(())
        }

        async fn cancel(&self, appointment_id: Uuid) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("cancel {}", appointment_id));
            Ok(())
        }
    }

    struct BrokenMirror;

    #[async_trait]
    impl SpreadsheetMirror for BrokenMirror {
        async fn sync(&self, _appointment: &Appointment, _action: SyncAction) -> anyhow::Result<()> {
            anyhow::bail!("sheet unavailable")
        }
    }

    fn appointment() -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            professional_id: None,
            service_id: Uuid::new_v4(),
            appointment_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            duration_minutes: 60,
            status: AppointmentStatus::Confirmed,
            version: 1,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reschedule_replaces_reminder_and_mirror_failure_is_swallowed() {
        let recorder = Arc::new(Recorder::default());
        let effects = SideEffects::new()
            .with_reminders(recorder.clone())
            .with_spreadsheet(Arc::new(BrokenMirror));
        let apt = appointment();

        effects.after_write(&apt, SyncAction::Rescheduled).await;

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![format!("cancel {}", apt.id), format!("schedule {}", apt.id)]);
    }
}
