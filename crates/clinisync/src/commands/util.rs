//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use clinisync_core::{
    AlertCategory, AlertFilter, AlertSeverity, AlertStatus, ExportFormat, NotificationPriority,
};

use crate::cli::{AlertFilterArgs, CategoryArg, ExportFormatArg, PriorityArg, SeverityArg, StatusArg};
use crate::error::CliError;

// ── Arg → domain conversions ─────────────────────────────────────────

impl From<SeverityArg> for AlertSeverity {
    fn from(s: SeverityArg) -> Self {
        match s {
            SeverityArg::Info => Self::Info,
            SeverityArg::Low => Self::Low,
            SeverityArg::Medium => Self::Medium,
            SeverityArg::High => Self::High,
            SeverityArg::Critical => Self::Critical,
        }
    }
}

impl From<StatusArg> for AlertStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Active => Self::Active,
            StatusArg::Acknowledged => Self::Acknowledged,
            StatusArg::Resolved => Self::Resolved,
            StatusArg::Suppressed => Self::Suppressed,
        }
    }
}

impl From<CategoryArg> for AlertCategory {
    fn from(c: CategoryArg) -> Self {
        match c {
            CategoryArg::System => Self::System,
            CategoryArg::Security => Self::Security,
            CategoryArg::Performance => Self::Performance,
            CategoryArg::Clinical => Self::Clinical,
            CategoryArg::Billing => Self::Billing,
            CategoryArg::Inventory => Self::Inventory,
            CategoryArg::Compliance => Self::Compliance,
            CategoryArg::Telemedicine => Self::Telemedicine,
            CategoryArg::Other => Self::Other,
        }
    }
}

impl From<PriorityArg> for NotificationPriority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Low => Self::Low,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::High => Self::High,
            PriorityArg::Urgent => Self::Urgent,
        }
    }
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(f: ExportFormatArg) -> Self {
        match f {
            ExportFormatArg::Json => Self::Json,
            ExportFormatArg::Csv => Self::Csv,
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────────

/// Parse a humantime duration ("30s", "2h").
pub fn parse_duration(field: &str, raw: &str) -> Result<Duration, CliError> {
    humantime::parse_duration(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("'{raw}': {e}"),
    })
}

/// An RFC 3339 instant, or a duration meaning "that long before `now`".
pub fn parse_time_bound(field: &str, raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CliError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let ago = parse_duration(field, raw)?;
    let ago = chrono::Duration::from_std(ago).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: e.to_string(),
    })?;
    Ok(now - ago)
}

/// Translate filter flags into the engine's filter state.
pub fn alert_filter(args: &AlertFilterArgs) -> Result<AlertFilter, CliError> {
    let now = Utc::now();
    let from = args
        .since
        .as_deref()
        .map(|raw| parse_time_bound("since", raw, now))
        .transpose()?;
    let to = args
        .until
        .as_deref()
        .map(|raw| parse_time_bound("until", raw, now))
        .transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(CliError::Validation {
                field: "since".into(),
                reason: "must not be later than --until".into(),
            });
        }
    }

    Ok(AlertFilter {
        categories: args.category.iter().copied().map(Into::into).collect(),
        severities: args.severity.iter().copied().map(Into::into).collect(),
        statuses: args.status.iter().copied().map(Into::into).collect(),
        sources: args.source.iter().cloned().collect(),
        from,
        to,
        search: args.search.clone().filter(|s| !s.is_empty()),
    })
}

// ── Interaction ──────────────────────────────────────────────────────

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.trim_end_matches('?').into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read and parse a JSON file.
pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
