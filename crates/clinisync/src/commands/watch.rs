//! `watch`: a live view of the merged alert list.
//!
//! Re-renders on every store change and prints sync mode, channel state,
//! and action notices to stderr until Ctrl-C.

use std::io::{IsTerminal, Write};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use clinisync_core::{AlertSync, ChannelState, DataStore, SyncConfig, SyncMode};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::{alerts, util};

fn channel_label(state: &ChannelState) -> String {
    match state {
        ChannelState::Disconnected => "realtime channel disconnected".into(),
        ChannelState::Connecting => "realtime channel connecting".into(),
        ChannelState::Connected => "realtime channel connected".into(),
        ChannelState::Reconnecting { attempt, delay } => format!(
            "realtime channel reconnecting (attempt {attempt} in {})",
            humantime::format_duration(*delay)
        ),
        ChannelState::GaveUp { attempts } => {
            format!("realtime channel gave up after {attempts} attempt(s), polling instead")
        }
    }
}

fn ago(age: chrono::Duration) -> String {
    let secs = u64::try_from(age.num_seconds()).unwrap_or(0);
    format!("{} ago", humantime::format_duration(Duration::from_secs(secs)))
}

/// `3 of 5 alerts, fetched 12s ago, last realtime event 2s ago`
fn freshness_line(store: &DataStore, shown: usize) -> String {
    let mut line = format!("{shown} of {} alerts", store.alert_count());
    if let Some(age) = store.data_age() {
        line.push_str(&format!(", fetched {}", ago(age)));
    }
    if let Some(at) = store.last_realtime_event() {
        line.push_str(&format!(", last realtime event {}", ago(chrono::Utc::now() - at)));
    }
    line
}

fn render(sync: &AlertSync, global: &GlobalOpts) -> Result<(), CliError> {
    let alerts = sync.filtered_alerts();
    let body = alerts::render_alerts(global.output, &alerts)?;

    if global.quiet {
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    if global.output == OutputFormat::Table && std::io::stdout().is_terminal() {
        // Clear and home the cursor so the table redraws in place.
        write!(stdout, "\x1b[2J\x1b[H")?;
    }
    writeln!(stdout, "{body}")?;
    stdout.flush()?;
    output::print_status(&freshness_line(sync.store(), alerts.len()), global.quiet);
    Ok(())
}

pub async fn handle(
    mut config: SyncConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.no_realtime {
        config.settings.realtime_enabled = false;
    }
    if let Some(ref raw) = args.interval {
        config.settings.refresh_interval = util::parse_duration("interval", raw)?;
        config.settings.auto_refresh = true;
    }
    let color = output::should_color(global.color);

    let sync = AlertSync::new(config);
    sync.set_filters(util::alert_filter(&args.filter)?).await?;

    let mut notices = sync.notices();
    let mut mode = sync.sync_mode();
    let mut channel = sync.channel_state();

    sync.connect().await?;
    let mut alerts = sync.alerts();
    render(&sync, global)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            snapshot = alerts.changed() => {
                if snapshot.is_none() {
                    break;
                }
                render(&sync, global)?;
            }

            Ok(()) = mode.changed() => {
                let current: SyncMode = *mode.borrow_and_update();
                output::print_status(&format!("sync mode: {current}"), global.quiet);
            }

            Ok(()) = channel.changed() => {
                let line = channel_label(&channel.borrow_and_update());
                output::print_status(&line, global.quiet);
            }

            notice = notices.recv() => match notice {
                Ok(notice) => output::print_status(&output::notice_line(&notice, color), global.quiet),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    sync.disconnect().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_labels_describe_backoff() {
        let label = channel_label(&ChannelState::Reconnecting {
            attempt: 3,
            delay: Duration::from_secs(4),
        });
        assert_eq!(label, "realtime channel reconnecting (attempt 3 in 4s)");
        assert!(channel_label(&ChannelState::GaveUp { attempts: 10 }).contains("polling"));
    }

    #[test]
    fn freshness_line_reports_counts_before_first_fetch() {
        let store = DataStore::default();
        assert_eq!(freshness_line(&store, 0), "0 of 0 alerts");
    }

    #[test]
    fn ago_clamps_clock_skew() {
        assert_eq!(ago(chrono::Duration::seconds(-3)), "0s ago");
        assert_eq!(ago(chrono::Duration::seconds(75)), "1m 15s ago");
    }
}
