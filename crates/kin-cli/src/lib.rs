use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use kin_core::{MediaError, MediaResult, VariantSet};
use serde::Serialize;

/// Output format for ingest results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Parse a capture time given as RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_taken_at(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            format!(
                "invalid date '{}': expected RFC 3339 (2024-03-10T14:00:00Z) or YYYY-MM-DD",
                value
            )
        })
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub recoverable: bool,
}

impl From<&MediaError> for ErrorReport {
    fn from(err: &MediaError) -> Self {
        Self {
            code: err.error_code(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

/// Result of ingesting one file from the command line.
#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<VariantSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl IngestOutcome {
    pub fn new(file: impl Into<String>, result: MediaResult<VariantSet>) -> Self {
        let (variants, error) = match result {
            Ok(set) => (Some(set), None),
            Err(e) => (None, Some(ErrorReport::from(&e))),
        };
        Self {
            file: file.into(),
            variants,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn print_json(outcomes: &[IngestOutcome]) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcomes)?);
    Ok(())
}

pub fn print_table(outcomes: &[IngestOutcome]) {
    println!(
        "\n{:<30} {:<6} {:<9} {:>10} {:<66}",
        "File", "Kind", "Variant", "Size (KB)", "Path / Error"
    );
    println!("{}", "-".repeat(125));

    for outcome in outcomes {
        let file = truncate_string(&outcome.file, 30);

        if let Some(error) = &outcome.error {
            println!(
                "{:<30} {:<6} {:<9} {:>10} {}: {}",
                file,
                "-",
                "error",
                "-",
                error.code,
                truncate_string(&error.message, 80)
            );
            continue;
        }

        let Some(set) = &outcome.variants else {
            continue;
        };
        for (label, variant) in set.variants() {
            println!(
                "{:<30} {:<6} {:<9} {:>10.1} {}",
                file,
                set.kind.to_string(),
                label,
                variant.size_bytes as f64 / 1024.0,
                variant.path
            );
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    println!(
        "\n{} file(s) ingested, {} failed",
        outcomes.len() - failed,
        failed
    );
}
