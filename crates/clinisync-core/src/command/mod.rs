// ── Command API ──
//
// Every user action flows through the `Command` enum. The sync engine's
// processor task routes each variant to the data service and owns the
// follow-up (invalidate, re-sync, notice).

pub mod requests;

use std::sync::Arc;

use bytes::Bytes;

use clinisync_api::{ExportFormat, ImportSummary};

use crate::cache::{ALERTS_RESOURCE, NOTIFICATIONS_RESOURCE};
use crate::error::CoreError;
use crate::model::{Alert, AlertFilter, AlertId, AlertStatus};

pub use requests::{CreateAlertRequest, SuppressOptions, TestAlertRequest, UpdateAlertRequest};

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// All write operations against the back end.
#[derive(Debug, Clone)]
pub enum Command {
    // ── Alert lifecycle ──────────────────────────────────────────────
    AcknowledgeAlert {
        id: AlertId,
        note: Option<String>,
    },
    ResolveAlert {
        id: AlertId,
        resolution: Option<String>,
    },
    SuppressAlert {
        id: AlertId,
        options: SuppressOptions,
    },

    // ── Alert CRUD ───────────────────────────────────────────────────
    CreateAlert(CreateAlertRequest),
    UpdateAlert {
        id: AlertId,
        update: UpdateAlertRequest,
    },
    DeleteAlert {
        id: AlertId,
    },
    DuplicateAlert {
        id: AlertId,
    },
    TestAlert(TestAlertRequest),

    // ── Bulk ─────────────────────────────────────────────────────────
    ImportAlerts {
        alerts: Vec<CreateAlertRequest>,
    },
    ExportAlerts {
        filter: AlertFilter,
        format: ExportFormat,
    },

    // ── Notifications ────────────────────────────────────────────────
    MarkNotificationRead {
        id: String,
    },
    MarkAllNotificationsRead,
    DeleteNotification {
        id: String,
    },
}

impl Command {
    /// Cache resource whose entries this command makes stale.
    pub fn resource(&self) -> &'static str {
        match self {
            Self::MarkNotificationRead { .. }
            | Self::MarkAllNotificationsRead
            | Self::DeleteNotification { .. } => NOTIFICATIONS_RESOURCE,
            Self::AcknowledgeAlert { .. }
            | Self::ResolveAlert { .. }
            | Self::SuppressAlert { .. }
            | Self::CreateAlert(_)
            | Self::UpdateAlert { .. }
            | Self::DeleteAlert { .. }
            | Self::DuplicateAlert { .. }
            | Self::TestAlert(_)
            | Self::ImportAlerts { .. }
            // Export only reads, yet it runs through the same mutation path:
            // a successful export still invalidates and re-syncs the list.
            | Self::ExportAlerts { .. } => ALERTS_RESOURCE,
        }
    }

    /// Short human label, used in notices and logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::AcknowledgeAlert { .. } => "acknowledge alert",
            Self::ResolveAlert { .. } => "resolve alert",
            Self::SuppressAlert { .. } => "suppress alert",
            Self::CreateAlert(_) => "create alert",
            Self::UpdateAlert { .. } => "update alert",
            Self::DeleteAlert { .. } => "delete alert",
            Self::DuplicateAlert { .. } => "duplicate alert",
            Self::TestAlert(_) => "send test alert",
            Self::ImportAlerts { .. } => "import alerts",
            Self::ExportAlerts { .. } => "export alerts",
            Self::MarkNotificationRead { .. } => "mark notification read",
            Self::MarkAllNotificationsRead => "mark all notifications read",
            Self::DeleteNotification { .. } => "delete notification",
        }
    }

    /// Notice text shown when the back end confirms the command.
    pub fn success_message(&self) -> &'static str {
        match self {
            Self::AcknowledgeAlert { .. } => "Alert acknowledged",
            Self::ResolveAlert { .. } => "Alert resolved",
            Self::SuppressAlert { .. } => "Alert suppressed",
            Self::CreateAlert(_) => "Alert created",
            Self::UpdateAlert { .. } => "Alert updated",
            Self::DeleteAlert { .. } => "Alert deleted",
            Self::DuplicateAlert { .. } => "Alert duplicated",
            Self::TestAlert(_) => "Test alert sent",
            Self::ImportAlerts { .. } => "Alerts imported",
            Self::ExportAlerts { .. } => "Alerts exported",
            Self::MarkNotificationRead { .. } => "Notification marked as read",
            Self::MarkAllNotificationsRead => "All notifications marked as read",
            Self::DeleteNotification { .. } => "Notification deleted",
        }
    }

    /// Lifecycle target for status-changing commands.
    pub fn target_status(&self) -> Option<(&AlertId, AlertStatus)> {
        match self {
            Self::AcknowledgeAlert { id, .. } => Some((id, AlertStatus::Acknowledged)),
            Self::ResolveAlert { id, .. } => Some((id, AlertStatus::Resolved)),
            Self::SuppressAlert { id, .. } => Some((id, AlertStatus::Suppressed)),
            _ => None,
        }
    }
}

/// Result of a command execution.
#[derive(Debug)]
pub enum CommandResult {
    Ok,
    Alert(Arc<Alert>),
    Imported(ImportSummary),
    Exported(Bytes),
    /// Number of records the back end touched.
    Updated(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_their_resource() {
        let ack = Command::AcknowledgeAlert {
            id: AlertId::from("a1"),
            note: None,
        };
        assert_eq!(ack.resource(), ALERTS_RESOURCE);
        assert_eq!(
            ack.target_status(),
            Some((&AlertId::from("a1"), AlertStatus::Acknowledged))
        );

        let read = Command::MarkNotificationRead { id: "n1".into() };
        assert_eq!(read.resource(), NOTIFICATIONS_RESOURCE);
        assert!(read.target_status().is_none());
        assert_eq!(Command::MarkAllNotificationsRead.action(), "mark all notifications read");

        let export = Command::ExportAlerts {
            filter: AlertFilter::default(),
            format: ExportFormat::Csv,
        };
        assert_eq!(export.resource(), ALERTS_RESOURCE);
        assert!(export.target_status().is_none());
    }
}
