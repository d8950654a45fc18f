use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::command::Command;
use crate::command::CommandLogEntry;
use crate::model::Filament;
use crate::model::PrintJob;
use crate::model::Printer;

/// The result of applying one log entry, returned to the client that proposed it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entity was inserted or replaced.
    Upserted { id: String },

    /// The status of an existing print job was changed.
    StatusUpdated { id: String },

    /// A status update named a print job that does not exist; nothing changed.
    JobNotFound { id: String },

    /// The payload could not be decoded; nothing changed.
    DecodeFailed { reason: String },

    /// The action tag is not known to this node; nothing changed.
    UnknownAction { action: String },

    /// A Raft-internal entry (blank or membership) with no effect on resources.
    Noop,
}

impl ApplyOutcome {
    /// Whether the entry changed the resource state.
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Upserted { .. } | ApplyOutcome::StatusUpdated { .. })
    }
}

/// The replicated resource maps.
///
/// The maps are ordered so that equal states serialize to equal bytes on every node.
/// The only way to change them is [`ResourceState::apply`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceState {
    printers: BTreeMap<String, Printer>,
    filaments: BTreeMap<String, Filament>,
    print_jobs: BTreeMap<String, PrintJob>,
}

impl ResourceState {
    pub fn printers(&self) -> &BTreeMap<String, Printer> {
        &self.printers
    }

    pub fn filaments(&self) -> &BTreeMap<String, Filament> {
        &self.filaments
    }

    pub fn print_jobs(&self) -> &BTreeMap<String, PrintJob> {
        &self.print_jobs
    }

    /// The first entity whose map key differs from its `id`, as `(kind, key, id)`.
    ///
    /// `apply` always keys entities by their id; a state from elsewhere, such as a snapshot, has to
    /// be checked.
    pub fn find_mismatched_key(&self) -> Option<(&'static str, &str, &str)> {
        let printers = self.printers.iter().map(|(k, v)| ("printer", k, &v.id));
        let filaments = self.filaments.iter().map(|(k, v)| ("filament", k, &v.id));
        let print_jobs = self.print_jobs.iter().map(|(k, v)| ("print_job", k, &v.id));

        printers
            .chain(filaments)
            .chain(print_jobs)
            .find(|(_, key, id)| key != id)
            .map(|(kind, key, id)| (kind, key.as_str(), id.as_str()))
    }

    /// Apply one committed log entry.
    ///
    /// Must stay a pure function of `(self, entry)`: every node calls it with the same entries in
    /// the same order and has to end up with the same state. An entry that fails to decode is
    /// rejected the same way everywhere and leaves the state untouched.
    pub fn apply(&mut self, entry: &CommandLogEntry) -> ApplyOutcome {
        let cmd = match entry.decode() {
            Ok(Some(cmd)) => cmd,
            Ok(None) => {
                tracing::warn!(action = %entry.action, "skip log entry with unknown action");
                return ApplyOutcome::UnknownAction {
                    action: entry.action.to_string(),
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "reject undecodable log entry");
                return ApplyOutcome::DecodeFailed { reason: e.to_string() };
            }
        };

        match cmd {
            Command::AddPrinter(p) => {
                let id = p.id.clone();
                self.printers.insert(id.clone(), p);
                ApplyOutcome::Upserted { id }
            }
            Command::AddFilament(f) => {
                let id = f.id.clone();
                self.filaments.insert(id.clone(), f);
                ApplyOutcome::Upserted { id }
            }
            Command::AddPrintJob(j) => {
                let id = j.id.clone();
                self.print_jobs.insert(id.clone(), j);
                ApplyOutcome::Upserted { id }
            }
            Command::UpdatePrintJobStatus(u) => match self.print_jobs.get_mut(&u.id) {
                Some(job) => {
                    job.status = u.status;
                    ApplyOutcome::StatusUpdated { id: u.id }
                }
                None => ApplyOutcome::JobNotFound { id: u.id },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Action;
    use crate::model::JobStatus;
    use crate::model::StatusUpdate;

    fn printer(id: &str) -> Printer {
        Printer {
            id: id.to_string(),
            company: "Acme".to_string(),
            model: "X1".to_string(),
        }
    }

    fn filament(id: &str, remaining: i64) -> Filament {
        Filament {
            id: id.to_string(),
            kind: "PLA".to_string(),
            color: "black".to_string(),
            total_weight_grams: 1000,
            remaining_weight_grams: remaining,
        }
    }

    fn job(id: &str, status: JobStatus) -> PrintJob {
        PrintJob {
            id: id.to_string(),
            printer_id: "p1".to_string(),
            filament_id: "f1".to_string(),
            file_path: "/prints/benchy.gcode".to_string(),
            print_weight_grams: 15,
            status,
        }
    }

    fn entries() -> anyhow::Result<Vec<CommandLogEntry>> {
        let cmds = vec![
            Command::AddPrinter(printer("p2")),
            Command::AddPrinter(printer("p1")),
            Command::AddFilament(filament("f1", 1000)),
            Command::AddPrintJob(job("j1", JobStatus::Queued)),
            Command::UpdatePrintJobStatus(StatusUpdate {
                id: "j1".to_string(),
                status: JobStatus::Running,
            }),
            Command::AddFilament(filament("f1", 600)),
        ];
        Ok(cmds.iter().map(Command::encode).collect::<Result<Vec<_>, _>>()?)
    }

    #[test]
    fn test_apply_is_deterministic() -> anyhow::Result<()> {
        let mut a = ResourceState::default();
        let mut b = ResourceState::default();

        for ent in entries()? {
            let x = a.apply(&ent);
            let y = b.apply(&ent);
            assert_eq!(x, y);
        }

        assert_eq!(serde_json::to_vec(&a)?, serde_json::to_vec(&b)?);
        Ok(())
    }

    #[test]
    fn test_apply_twice_equals_apply_once() -> anyhow::Result<()> {
        let mut once = ResourceState::default();
        let mut twice = ResourceState::default();

        for ent in entries()? {
            once.apply(&ent);
            twice.apply(&ent);
            twice.apply(&ent);
        }

        assert_eq!(once, twice);
        Ok(())
    }

    #[test]
    fn test_upsert_overwrites_whole_record() -> anyhow::Result<()> {
        let mut st = ResourceState::default();

        st.apply(&Command::AddFilament(filament("f1", 1000)).encode()?);
        let mut second = filament("f1", 500);
        second.color = "white".to_string();
        let outcome = st.apply(&Command::AddFilament(second.clone()).encode()?);

        assert_eq!(ApplyOutcome::Upserted { id: "f1".to_string() }, outcome);
        assert_eq!(1, st.filaments().len());
        assert_eq!(Some(&second), st.filaments().get("f1"));
        Ok(())
    }

    #[test]
    fn test_keys_match_entity_ids() -> anyhow::Result<()> {
        let mut st = ResourceState::default();
        for ent in entries()? {
            st.apply(&ent);
        }

        assert!(st.printers().iter().all(|(k, v)| k == &v.id));
        assert!(st.filaments().iter().all(|(k, v)| k == &v.id));
        assert!(st.print_jobs().iter().all(|(k, v)| k == &v.id));
        Ok(())
    }

    #[test]
    fn test_status_update_keeps_other_fields() -> anyhow::Result<()> {
        let mut st = ResourceState::default();
        let original = job("j1", JobStatus::Queued);
        st.apply(&Command::AddPrintJob(original.clone()).encode()?);

        let outcome = st.apply(
            &Command::UpdatePrintJobStatus(StatusUpdate {
                id: "j1".to_string(),
                status: JobStatus::Running,
            })
            .encode()?,
        );

        assert_eq!(ApplyOutcome::StatusUpdated { id: "j1".to_string() }, outcome);
        let got = st.print_jobs().get("j1").cloned();
        assert_eq!(
            Some(PrintJob {
                status: JobStatus::Running,
                ..original
            }),
            got
        );
        Ok(())
    }

    #[test]
    fn test_status_update_of_missing_job() -> anyhow::Result<()> {
        let mut st = ResourceState::default();

        let outcome = st.apply(
            &Command::UpdatePrintJobStatus(StatusUpdate {
                id: "nope".to_string(),
                status: JobStatus::Done,
            })
            .encode()?,
        );

        assert_eq!(ApplyOutcome::JobNotFound { id: "nope".to_string() }, outcome);
        assert!(st.print_jobs().is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_action_is_noop() -> anyhow::Result<()> {
        let mut st = ResourceState::default();
        st.apply(&Command::AddPrinter(printer("p1")).encode()?);
        let before = st.clone();

        let outcome = st.apply(&CommandLogEntry::new(
            Action::Unknown("delete_printer".to_string()),
            r#"{"id":"p1"}"#,
        )?);

        assert_eq!(
            ApplyOutcome::UnknownAction {
                action: "delete_printer".to_string()
            },
            outcome
        );
        assert_eq!(before, st);
        Ok(())
    }

    #[test]
    fn test_decode_failure_does_not_mutate() -> anyhow::Result<()> {
        let mut st = ResourceState::default();
        st.apply(&Command::AddPrinter(printer("p1")).encode()?);
        let before = st.clone();

        let outcome = st.apply(&CommandLogEntry::new(Action::AddPrinter, r#"{"id": ["p1"]}"#)?);

        assert!(matches!(outcome, ApplyOutcome::DecodeFailed { .. }));
        assert!(!outcome.is_applied());
        assert_eq!(before, st);
        Ok(())
    }
}
