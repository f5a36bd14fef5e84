//! Markdown summary of an import run

use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::Path;

use super::batch::ImportResult;
use super::error::ImportError;
use super::verify::{CheckStatus, VerificationReport};

pub const REPORT_FILE: &str = "knowledge_import_report.md";

pub fn render_markdown(
    results: &[ImportResult],
    verification: Option<&VerificationReport>,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Knowledge Import Report\n");
    let _ = writeln!(out, "Generated: {}\n", generated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    let total_records: usize = results.iter().map(|r| r.total_records).sum();
    let imported: usize = results.iter().map(|r| r.imported).sum();
    let failed: usize = results.iter().map(|r| r.failed).sum();
    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "- Domains: {}", results.len());
    let _ = writeln!(out, "- Records: {}", total_records);
    let _ = writeln!(out, "- Imported: {}", imported);
    let _ = writeln!(out, "- Failed: {}\n", failed);

    let _ = writeln!(out, "## Domains\n");
    let _ = writeln!(
        out,
        "| Domain | ID | Files | Records | Imported | Failed | Success rate | Elapsed |"
    );
    let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
    for result in results {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {:.1}% | {:.1}s |",
            result.name,
            result.character_id,
            result.total_files,
            result.total_records,
            result.imported,
            result.failed,
            result.success_rate(),
            result.elapsed.as_secs_f64()
        );
    }

    if let Some(verification) = verification {
        let _ = writeln!(out, "\n## Verification\n");
        let _ = writeln!(out, "| Check | Domain | Query | Result |");
        let _ = writeln!(out, "|---|---|---|---|");
        let checks = verification
            .presence
            .iter()
            .map(|c| ("presence", c))
            .chain(verification.isolation.iter().map(|c| ("isolation", c)));
        for (kind, check) in checks {
            let result = match &check.status {
                CheckStatus::Passed => "passed".to_string(),
                CheckStatus::Failed(detail) => format!("FAILED: {}", detail),
                CheckStatus::Inconclusive(detail) => format!("inconclusive: {}", detail),
            };
            let _ = writeln!(out, "| {} | {} | {} | {} |", kind, check.domain, check.query, result);
        }
    }
    out
}

/// Write the rendered report to `path`
pub async fn write_report(
    path: &Path,
    results: &[ImportResult],
    verification: Option<&VerificationReport>,
) -> Result<(), ImportError> {
    let markdown = render_markdown(results, verification, Utc::now());
    tokio::fs::write(path, markdown).await?;
    Ok(())
}
