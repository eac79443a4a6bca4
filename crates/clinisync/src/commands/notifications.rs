//! Notification command handlers.

use std::sync::Arc;

use tabled::Tabled;

use clinisync_core::{AlertSync, Command as CoreCommand, CommandResult, Notification, NotificationFilter};

use crate::cli::{GlobalOpts, NotificationsArgs, NotificationsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Title")]
    title: String,
}

impl From<&Arc<Notification>> for NotificationRow {
    fn from(n: &Arc<Notification>) -> Self {
        Self {
            id: n.id.clone(),
            time: n.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            priority: n.priority.to_string(),
            status: n.status.to_string(),
            kind: n.kind.clone().unwrap_or_default(),
            title: n.title.clone(),
        }
    }
}

/// Server-side filter for the initial notification fetch.
pub fn filter_for(command: &NotificationsCommand) -> NotificationFilter {
    match command {
        NotificationsCommand::List {
            unread,
            priority,
            search,
        } => NotificationFilter {
            priorities: priority.iter().copied().map(Into::into).collect(),
            unread_only: *unread,
            search: search.clone(),
            ..NotificationFilter::default()
        },
        _ => NotificationFilter::default(),
    }
}

pub async fn handle(
    sync: &AlertSync,
    args: NotificationsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        NotificationsCommand::List { .. } => {
            let filter = filter_for(&args.command);
            let list: Vec<_> = sync
                .notifications_snapshot()
                .iter()
                .filter(|n| filter.matches(n))
                .cloned()
                .collect();
            let out = output::render_list(global.output, &list, |n| NotificationRow::from(n), |n| {
                n.id.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        NotificationsCommand::Read { id } => {
            sync.execute(CoreCommand::MarkNotificationRead { id })
                .await?;
            output::print_status("Notification marked as read", global.quiet);
            Ok(())
        }

        NotificationsCommand::ReadAll => {
            let result = sync.execute(CoreCommand::MarkAllNotificationsRead).await?;
            let message = match result {
                CommandResult::Updated(n) => format!("Marked {n} notification(s) as read"),
                _ => "All notifications marked as read".into(),
            };
            output::print_status(&message, global.quiet);
            Ok(())
        }

        NotificationsCommand::Delete { id } => {
            if !util::confirm(&format!("Delete notification {id}?"), global.yes)? {
                return Ok(());
            }
            sync.execute(CoreCommand::DeleteNotification { id })
                .await?;
            output::print_status("Notification deleted", global.quiet);
            Ok(())
        }

        NotificationsCommand::Count => {
            let count = sync.unread_notification_count().await?;
            let out = output::render_single(
                global.output,
                &serde_json::json!({ "unread": count }),
                |_| count.to_string(),
                |_| count.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
