//! Alert command handlers.

use std::sync::Arc;
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use clinisync_core::{
    Alert, AlertId, AlertStatsResponse, AlertSync, Command as CoreCommand, CommandResult,
    CreateAlertRequest, ImportSummary, SuppressOptions, TestAlertRequest, UpdateAlertRequest,
};

use crate::cli::{AlertsArgs, AlertsCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Title")]
    title: String,
}

impl From<&Arc<Alert>> for AlertRow {
    fn from(a: &Arc<Alert>) -> Self {
        Self {
            id: a.id.to_string(),
            time: a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            severity: a.severity.to_string(),
            status: a.status.to_string(),
            category: a.category.to_string(),
            source: a.source.clone().unwrap_or_default(),
            title: a.title.clone(),
        }
    }
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Count")]
    count: u64,
}

pub(crate) fn render_alerts(format: OutputFormat, alerts: &[Arc<Alert>]) -> Result<String, CliError> {
    output::render_list(format, alerts, |a| AlertRow::from(a), |a| a.id.to_string())
}

fn detail(a: &Alert) -> String {
    let mut lines = vec![
        format!("ID:        {}", a.id),
        format!("Title:     {}", a.title),
        format!("Severity:  {}", a.severity),
        format!("Status:    {}", a.status),
        format!("Category:  {}", a.category),
        format!("Source:    {}", a.source.as_deref().unwrap_or("-")),
        format!("Raised:    {}", a.timestamp.to_rfc3339()),
    ];
    if let Some(updated) = a.updated_at {
        lines.push(format!("Updated:   {}", updated.to_rfc3339()));
    }
    if let Some(version) = a.version {
        lines.push(format!("Version:   {version}"));
    }
    lines.push(String::new());
    lines.push(a.message.clone());
    lines.join("\n")
}

fn stats_rows(stats: &AlertStatsResponse) -> Vec<CountRow> {
    let groups = [
        ("status", &stats.by_status),
        ("severity", &stats.by_severity),
        ("category", &stats.by_category),
    ];
    let mut rows = vec![CountRow {
        group: "total".into(),
        value: "-".into(),
        count: stats.total,
    }];
    for (group, counts) in groups {
        rows.extend(counts.iter().map(|(value, count)| CountRow {
            group: group.into(),
            value: value.clone(),
            count: *count,
        }));
    }
    rows
}

fn import_summary(summary: &ImportSummary) -> String {
    let mut text = format!(
        "Imported {} alert(s), skipped {}",
        summary.imported, summary.skipped
    );
    for err in &summary.errors {
        text.push_str("\n  - ");
        text.push_str(err);
    }
    text
}

fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner().with_message(message);
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

// ── Handler ─────────────────────────────────────────────────────────

/// Structured formats get the confirmed alert; tables get a status line.
fn print_alert_result(
    result: &CommandResult,
    success: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if let CommandResult::Alert(alert) = result {
        if global.output != OutputFormat::Table {
            let out = output::render_single(global.output, alert.as_ref(), detail, |a| {
                a.id.to_string()
            })?;
            output::print_output(&out, global.quiet);
            return Ok(());
        }
    }
    output::print_status(success, global.quiet);
    Ok(())
}

#[allow(clippy::too_many_lines)]
pub async fn handle(sync: &AlertSync, args: AlertsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        AlertsCommand::List { filter: _, limit } => {
            let mut alerts = sync.filtered_alerts();
            if let Some(limit) = limit {
                alerts.truncate(limit);
            }
            let out = render_alerts(global.output, &alerts)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AlertsCommand::Get { id } => {
            let alert = sync.get_alert(&AlertId::from(id)).await?;
            let out = output::render_single(global.output, alert.as_ref(), detail, |a| {
                a.id.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AlertsCommand::Ack { id, note } => {
            let result = sync
                .execute(CoreCommand::AcknowledgeAlert {
                    id: AlertId::from(id),
                    note,
                })
                .await?;
            print_alert_result(&result, "Alert acknowledged", global)
        }

        AlertsCommand::Resolve { id, resolution } => {
            let result = sync
                .execute(CoreCommand::ResolveAlert {
                    id: AlertId::from(id),
                    resolution,
                })
                .await?;
            print_alert_result(&result, "Alert resolved", global)
        }

        AlertsCommand::Suppress {
            id,
            duration,
            reason,
        } => {
            let duration = duration
                .as_deref()
                .map(|raw| util::parse_duration("duration", raw))
                .transpose()?;
            let result = sync
                .execute(CoreCommand::SuppressAlert {
                    id: AlertId::from(id),
                    options: SuppressOptions { duration, reason },
                })
                .await?;
            print_alert_result(&result, "Alert suppressed", global)
        }

        AlertsCommand::Delete { id } => {
            if !util::confirm(&format!("Delete alert {id}?"), global.yes)? {
                return Ok(());
            }
            sync.execute(CoreCommand::DeleteAlert {
                id: AlertId::from(id),
            })
            .await?;
            output::print_status("Alert deleted", global.quiet);
            Ok(())
        }

        AlertsCommand::Create {
            title,
            message,
            severity,
            category,
            source,
        } => {
            let result = sync
                .execute(CoreCommand::CreateAlert(CreateAlertRequest {
                    title,
                    message,
                    severity: severity.into(),
                    category: category.into(),
                    source,
                    metadata: None,
                }))
                .await?;
            print_alert_result(&result, "Alert created", global)
        }

        AlertsCommand::Update {
            id,
            title,
            message,
            severity,
            category,
        } => {
            let update = UpdateAlertRequest {
                title,
                message,
                severity: severity.map(Into::into),
                category: category.map(Into::into),
                metadata: None,
            };
            if update.is_empty() {
                return Err(CliError::Validation {
                    field: "update".into(),
                    reason: "pass at least one of --title, --message, --severity, --category"
                        .into(),
                });
            }
            let result = sync
                .execute(CoreCommand::UpdateAlert {
                    id: AlertId::from(id),
                    update,
                })
                .await?;
            print_alert_result(&result, "Alert updated", global)
        }

        AlertsCommand::Test {
            severity,
            category,
            message,
        } => {
            let result = sync
                .execute(CoreCommand::TestAlert(TestAlertRequest {
                    severity: severity.into(),
                    category: category.into(),
                    message,
                }))
                .await?;
            print_alert_result(&result, "Test alert sent", global)
        }

        AlertsCommand::Duplicate { id } => {
            let result = sync
                .execute(CoreCommand::DuplicateAlert {
                    id: AlertId::from(id),
                })
                .await?;
            print_alert_result(&result, "Alert duplicated", global)
        }

        AlertsCommand::Import { file } => {
            let alerts: Vec<CreateAlertRequest> = util::read_json_file(&file)?;
            if alerts.is_empty() {
                return Err(CliError::Validation {
                    field: "file".into(),
                    reason: format!("{} contains no alerts", file.display()),
                });
            }
            let bar = spinner("Importing alerts", global.quiet);
            let result = sync.execute(CoreCommand::ImportAlerts { alerts }).await;
            bar.finish_and_clear();

            if let CommandResult::Imported(summary) = result? {
                let out = output::render_single(global.output, &summary, import_summary, |s| {
                    s.imported.to_string()
                })?;
                output::print_output(&out, global.quiet);
            }
            Ok(())
        }

        AlertsCommand::Export {
            filter,
            format,
            out,
        } => {
            let bar = spinner("Exporting alerts", global.quiet);
            let result = sync
                .execute(CoreCommand::ExportAlerts {
                    filter: util::alert_filter(&filter)?,
                    format: format.into(),
                })
                .await;
            bar.finish_and_clear();

            let CommandResult::Exported(bytes) = result? else {
                return Ok(());
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes)?;
                    output::print_status(
                        &format!(
                            "Wrote {} to {}",
                            ByteSize::b(u64::try_from(bytes.len()).unwrap_or(u64::MAX)),
                            path.display()
                        ),
                        global.quiet,
                    );
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().lock().write_all(&bytes)?;
                }
            }
            Ok(())
        }

        AlertsCommand::Stats => {
            let stats = sync.alert_stats().await?;
            let out = output::render_single(
                global.output,
                &stats,
                |s| output::render_table(&stats_rows(s)),
                |s| s.total.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
