//! Resources tracked by the print farm.
//!
//! Field values are trusted verbatim: nothing here checks that a filament's remaining weight fits
//! in its total weight, or that a job points at an existing printer or filament.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A 3D printer, keyed by `id`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Printer {
    pub id: String,
    pub company: String,
    pub model: String,
}

/// A filament spool, keyed by `id`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Filament {
    pub id: String,

    /// Material, e.g. `PLA` or `PETG`.
    #[serde(rename = "type")]
    pub kind: String,

    pub color: String,

    #[serde(alias = "total_weight_in_grams")]
    pub total_weight_grams: i64,

    #[serde(alias = "remaining_weight_in_grams")]
    pub remaining_weight_grams: i64,
}

/// A print job, keyed by `id`.
///
/// `printer_id` and `filament_id` are plain references: they may name resources that do not exist.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PrintJob {
    pub id: String,
    pub printer_id: String,
    pub filament_id: String,

    #[serde(alias = "filepath")]
    pub file_path: String,

    #[serde(alias = "print_weight_in_grams")]
    pub print_weight_grams: i64,

    pub status: JobStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Done,
    Canceled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::Canceled => "Canceled",
        };
        write!(f, "{}", s)
    }
}

/// Sets the status of an existing print job, leaving every other field untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: String,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filament_accepts_legacy_field_names() -> anyhow::Result<()> {
        let body = r#"{"id":"f1","type":"PLA","color":"red","total_weight_in_grams":1000,"remaining_weight_in_grams":750}"#;
        let f: Filament = serde_json::from_str(body)?;

        assert_eq!(
            Filament {
                id: "f1".to_string(),
                kind: "PLA".to_string(),
                color: "red".to_string(),
                total_weight_grams: 1000,
                remaining_weight_grams: 750,
            },
            f
        );

        let out = serde_json::to_value(&f)?;
        assert_eq!(out["type"], "PLA");
        assert_eq!(out["total_weight_grams"], 1000);
        Ok(())
    }

    #[test]
    fn test_print_job_status_defaults_to_queued() -> anyhow::Result<()> {
        let body = r#"{"id":"j1","printer_id":"p1","filament_id":"f1","filepath":"a.gcode","print_weight_in_grams":20}"#;
        let job: PrintJob = serde_json::from_str(body)?;

        assert_eq!(JobStatus::Queued, job.status);
        assert_eq!("a.gcode", job.file_path);
        assert_eq!(20, job.print_weight_grams);
        Ok(())
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let res = serde_json::from_str::<StatusUpdate>(r#"{"id":"j1","status":"Paused"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_remaining_weight_is_not_clamped() -> anyhow::Result<()> {
        let body = r#"{"id":"f1","total_weight_grams":100,"remaining_weight_grams":500}"#;
        let f: Filament = serde_json::from_str(body)?;
        assert_eq!(500, f.remaining_weight_grams);
        Ok(())
    }
}
