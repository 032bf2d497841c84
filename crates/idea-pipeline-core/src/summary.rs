//! Short human-readable summary of an analysis report.

use crate::models::AnalysisReport;

/// Separator between summary parts.
pub const SUMMARY_DELIMITER: &str = " | ";

/// Build the one-line summary shown next to a score.
///
/// Parts, in order, skipping any that are missing or empty:
/// the one-sentence assessment, the first two market signals,
/// `Top competitor: <name>`, and `Risk: <first moat risk>`.
pub fn build_summary(report: &AnalysisReport) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(5);

    parts.push(report.one_sentence.clone());
    parts.extend(report.market_signals.iter().take(2).cloned());

    if let Some(top) = report.competitors.first().filter(|c| !c.name.is_empty()) {
        parts.push(format!("Top competitor: {}", top.name));
    }
    if let Some(risk) = report.moat_risks.first().filter(|r| !r.is_empty()) {
        parts.push(format!("Risk: {}", risk));
    }

    parts.retain(|p| !p.is_empty());
    parts.join(SUMMARY_DELIMITER)
}
