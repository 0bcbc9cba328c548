//! Report builder

use chrono::{DateTime, SecondsFormat, Utc};

use tuimuppet_common::types::SchemaVersion;
use tuimuppet_common::{Result, RunReport, RunStatus, SequenceResult};

/// RFC 3339 with millisecond precision, `Z` suffix
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Aggregate sequence results. The run fails iff any sequence failed.
pub fn build(
    scenario: &str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    sequences: Vec<SequenceResult>,
) -> Result<RunReport> {
    let status = if sequences.iter().any(|s| s.status == RunStatus::Failed) {
        RunStatus::Failed
    } else {
        RunStatus::Passed
    };

    let report = RunReport {
        schema_version: SchemaVersion::V1,
        scenario: scenario.to_string(),
        started_at: timestamp(started_at),
        finished_at: timestamp(finished_at),
        status,
        sequences,
    };
    report.validate()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tuimuppet_common::Error;

    fn sequence(name: &str, status: RunStatus) -> SequenceResult {
        SequenceResult {
            name: name.to_string(),
            status,
            duration_ms: 0,
            steps: vec![],
            artifacts: vec![],
        }
    }

    #[test]
    fn test_status_fails_iff_a_sequence_failed() {
        let at = Utc::now();
        let passed = build("s", at, at, vec![sequence("a", RunStatus::Passed)]).unwrap();
        assert_eq!(passed.status, RunStatus::Passed);

        let failed = build(
            "s",
            at,
            at,
            vec![sequence("a", RunStatus::Passed), sequence("b", RunStatus::Failed)],
        )
        .unwrap();
        assert_eq!(failed.status, RunStatus::Failed);

        let skipped = build("s", at, at, vec![sequence("a", RunStatus::Skipped)]).unwrap();
        assert_eq!(skipped.status, RunStatus::Passed);
    }

    #[test]
    fn test_timestamps_use_millis() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(timestamp(at), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_invalid_report_is_an_error() {
        let at = Utc::now();
        let err = build("s", at, at, vec![]).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
