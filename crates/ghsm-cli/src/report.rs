use std::io::Write;

use color_eyre::Result;
use ghsm_core::{
    batch::Summary,
    model::{RecordOutcome, Scope, UpsertOutcome},
};
use serde::Serialize;

/// Human-readable line for one outcome.
pub fn outcome_line(scope: &Scope, item: &RecordOutcome) -> String {
    match &item.outcome {
        UpsertOutcome::Created => format!("Secret {} for {scope} successfully added.", item.name),
        UpsertOutcome::Updated => {
            format!("Secret {} for {scope} successfully updated.", item.name)
        }
        UpsertOutcome::Failed { reason } => {
            format!("Secret {} for {scope} failed: {reason}", item.name)
        }
    }
}

pub fn summary_line(summary: &Summary) -> String {
    format!(
        "{} created, {} updated, {} failed ({} total)",
        summary.created,
        summary.updated,
        summary.failed,
        summary.total()
    )
}

pub fn write_text(
    out: &mut impl Write,
    scope: &Scope,
    outcomes: &[RecordOutcome],
    error: Option<&str>,
) -> Result<()> {
    for item in outcomes {
        writeln!(out, "{}", outcome_line(scope, item))?;
    }
    if let Some(error) = error {
        writeln!(out, "Batch aborted: {error}")?;
    }
    writeln!(out, "{}", summary_line(&Summary::from_outcomes(outcomes)))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    scope: String,
    outcomes: &'a [RecordOutcome],
    summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub fn write_json(
    out: &mut impl Write,
    scope: &Scope,
    outcomes: &[RecordOutcome],
    error: Option<&str>,
) -> Result<()> {
    let report = JsonReport {
        scope: scope.root_path(),
        outcomes,
        summary: Summary::from_outcomes(outcomes),
        error,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}
