//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod alerts;
pub mod config_cmd;
pub mod notifications;
pub mod util;
pub mod watch;

use clinisync_core::{AlertSync, SyncConfig};

use crate::cli::{AlertsArgs, AlertsCommand, Command, GlobalOpts, NotificationsArgs};
use crate::error::CliError;

/// Dispatch a back-end-bound command to the appropriate handler.
///
/// One-shot commands run with realtime and polling off; `watch` keeps
/// them on and owns its own session.
pub async fn dispatch(
    cmd: Command,
    mut config: SyncConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let Command::Watch(args) = cmd {
        return watch::handle(config, args, global).await;
    }

    config.settings.realtime_enabled = false;
    config.settings.auto_refresh = false;
    let sync = AlertSync::new(config);

    // Filters go in before connecting so the initial fetch is already narrowed.
    match cmd {
        Command::Alerts(AlertsArgs {
            command:
                AlertsCommand::List { ref filter, .. } | AlertsCommand::Export { ref filter, .. },
        }) => sync.set_filters(util::alert_filter(filter)?).await?,
        Command::Notifications(NotificationsArgs { ref command }) => {
            sync.set_notification_filter(notifications::filter_for(command))
                .await?;
        }
        _ => {}
    }

    sync.connect().await?;
    let result = match cmd {
        Command::Alerts(args) => alerts::handle(&sync, args, global).await,
        Command::Notifications(args) => notifications::handle(&sync, args, global).await,
        // Watch, Config, and Completions are handled before dispatch
        Command::Watch(_) | Command::Config(_) | Command::Completions(_) => Ok(()),
    };
    sync.disconnect().await;
    result
}
