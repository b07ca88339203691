use crate::sources::adapter::SkippedRecord;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// How much of the field set a source covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Every field matched and nothing was skipped.
    Present,
    /// Some fields matched.
    Partial,
    /// The source failed or matched no field.
    Absent,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SourceStatus::Present => "present",
            SourceStatus::Partial => "partial",
            SourceStatus::Absent => "absent",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub kind: String,
    pub status: SourceStatus,
    pub records_received: usize,
    /// Fields with at least one record.
    pub matched: usize,
    /// Fields with no record, filled with defaults.
    pub unmatched: usize,
    /// Records whose key names no field, null keys included.
    pub orphans: usize,
    /// Later records for an already matched field, discarded.
    pub duplicates_dropped: usize,
    pub skipped: Vec<SkippedRecord>,
    pub failure: Option<String>,
}

impl SourceReport {
    pub(crate) fn status_for(
        matched: usize,
        base_fields: usize,
        skipped: usize,
        failed: bool,
    ) -> SourceStatus {
        if failed || matched == 0 {
            SourceStatus::Absent
        } else if matched < base_fields || skipped > 0 {
            SourceStatus::Partial
        } else {
            SourceStatus::Present
        }
    }
}

/// Outcome of one join, per source in the order the sources were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub base_fields: usize,
    pub sources: Vec<SourceReport>,
}

impl JoinReport {
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human readable summary table followed by every skipped record and
    /// failure.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Join report\n");
        let _ = writeln!(out, "Fields: {}\n", self.base_fields);
        out.push_str(
            "| source | kind | status | records | matched | unmatched | orphans | duplicates | skipped |\n",
        );
        out.push_str("|---|---|---|---|---|---|---|---|---|\n");
        for s in &self.sources {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                s.source,
                s.kind,
                s.status,
                s.records_received,
                s.matched,
                s.unmatched,
                s.orphans,
                s.duplicates_dropped,
                s.skipped.len()
            );
        }

        let failures: Vec<_> = self
            .sources
            .iter()
            .filter_map(|s| s.failure.as_ref().map(|f| (&s.source, f)))
            .collect();
        if !failures.is_empty() {
            out.push_str("\n### Failures\n\n");
            for (source, failure) in failures {
                let _ = writeln!(out, "- **{source}**: {failure}");
            }
        }

        if self.sources.iter().any(|s| !s.skipped.is_empty()) {
            out.push_str("\n### Skipped records\n\n");
            for s in &self.sources {
                for skipped in &s.skipped {
                    let _ = writeln!(
                        out,
                        "- {} / `{}`: {}",
                        s.source, skipped.field_id, skipped.reason
                    );
                }
            }
        }
        out
    }
}
