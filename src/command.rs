//! The replicated log entry format.
//!
//! A [`CommandLogEntry`] is what travels through the Raft log: an action tag and an opaque JSON
//! payload. [`Command`] is the typed view used on both ends.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::model::Filament;
use crate::model::PrintJob;
use crate::model::Printer;
use crate::model::StatusUpdate;

/// The action tag of a log entry.
///
/// Tags not known to this build are kept as [`Action::Unknown`] so that an entry written by a
/// newer node still decodes here and can be skipped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Action {
    AddPrinter,
    AddFilament,
    AddPrintJob,
    UpdatePrintJobStatus,
    Unknown(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::AddPrinter => "add_printer",
            Action::AddFilament => "add_filament",
            Action::AddPrintJob => "add_print_job",
            Action::UpdatePrintJobStatus => "update_print_job_status",
            Action::Unknown(tag) => tag,
        }
    }
}

impl From<String> for Action {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "add_printer" => Action::AddPrinter,
            "add_filament" => Action::AddFilament,
            "add_print_job" => Action::AddPrintJob,
            "update_print_job_status" => Action::UpdatePrintJobStatus,
            _ => Action::Unknown(tag),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state mutation as stored in the replicated log.
///
/// The payload is embedded verbatim as a JSON value, so it is written once when proposed and is
/// neither re-encoded nor inflated inside Raft RPCs and log storage.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommandLogEntry {
    pub action: Action,

    /// JSON encoding of the entity named by `action`.
    pub payload: Box<RawValue>,
}

impl CommandLogEntry {
    /// Build an entry from an action and an already encoded JSON payload.
    pub fn new(action: Action, payload: impl ToString) -> Result<Self, serde_json::Error> {
        Ok(Self {
            action,
            payload: RawValue::from_string(payload.to_string())?,
        })
    }
}

impl PartialEq for CommandLogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.action == other.action && self.payload.get() == other.payload.get()
    }
}

impl Eq for CommandLogEntry {}

impl fmt::Display for CommandLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} bytes)", self.action, self.payload.get().len())
    }
}

/// Typed form of a [`CommandLogEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddPrinter(Printer),
    AddFilament(Filament),
    AddPrintJob(PrintJob),
    UpdatePrintJobStatus(StatusUpdate),
}

#[derive(Debug, thiserror::Error)]
#[error("failed to encode {action} payload: {source}")]
pub struct EncodeError {
    pub action: Action,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to decode {action} payload: {source}")]
pub struct DecodeError {
    pub action: Action,
    #[source]
    pub source: serde_json::Error,
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::AddPrinter(_) => Action::AddPrinter,
            Command::AddFilament(_) => Action::AddFilament,
            Command::AddPrintJob(_) => Action::AddPrintJob,
            Command::UpdatePrintJobStatus(_) => Action::UpdatePrintJobStatus,
        }
    }

    /// Id of the resource this command targets.
    pub fn resource_id(&self) -> &str {
        match self {
            Command::AddPrinter(p) => &p.id,
            Command::AddFilament(f) => &f.id,
            Command::AddPrintJob(j) => &j.id,
            Command::UpdatePrintJobStatus(u) => &u.id,
        }
    }

    pub fn encode(&self) -> Result<CommandLogEntry, EncodeError> {
        let action = self.action();

        let payload = match self {
            Command::AddPrinter(p) => serde_json::value::to_raw_value(p),
            Command::AddFilament(f) => serde_json::value::to_raw_value(f),
            Command::AddPrintJob(j) => serde_json::value::to_raw_value(j),
            Command::UpdatePrintJobStatus(u) => serde_json::value::to_raw_value(u),
        };

        match payload {
            Ok(payload) => Ok(CommandLogEntry { action, payload }),
            Err(source) => Err(EncodeError { action, source }),
        }
    }
}

impl CommandLogEntry {
    /// Decode the payload according to the action tag.
    ///
    /// Returns `Ok(None)` for an [`Action::Unknown`] tag: the payload is not inspected.
    pub fn decode(&self) -> Result<Option<Command>, DecodeError> {
        let payload = self.payload.get();
        let res = match self.action {
            Action::AddPrinter => serde_json::from_str(payload).map(Command::AddPrinter),
            Action::AddFilament => serde_json::from_str(payload).map(Command::AddFilament),
            Action::AddPrintJob => serde_json::from_str(payload).map(Command::AddPrintJob),
            Action::UpdatePrintJobStatus => serde_json::from_str(payload).map(Command::UpdatePrintJobStatus),
            Action::Unknown(_) => return Ok(None),
        };

        res.map(Some).map_err(|source| DecodeError {
            action: self.action.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    #[test]
    fn test_action_tags_on_the_wire() -> anyhow::Result<()> {
        let entry = Command::AddPrinter(Printer {
            id: "p1".to_string(),
            company: "Acme".to_string(),
            model: "X1".to_string(),
        })
        .encode()?;

        let wire = serde_json::to_value(&entry)?;
        assert_eq!(wire["action"], "add_printer");
        assert_eq!(wire["payload"]["company"], "Acme", "payload is embedded as a JSON object");

        let tags = [
            Action::AddPrinter,
            Action::AddFilament,
            Action::AddPrintJob,
            Action::UpdatePrintJobStatus,
        ];
        for action in tags {
            let back: Action = serde_json::from_value(serde_json::to_value(&action)?)?;
            assert_eq!(action, back);
        }
        Ok(())
    }

    #[test]
    fn test_decode_typed_command() -> anyhow::Result<()> {
        let cmd = Command::UpdatePrintJobStatus(StatusUpdate {
            id: "j1".to_string(),
            status: JobStatus::Done,
        });
        let entry = cmd.encode()?;

        assert_eq!(Some(cmd), entry.decode()?);
        Ok(())
    }

    #[test]
    fn test_unknown_action_is_preserved_and_skipped() -> anyhow::Result<()> {
        let entry: CommandLogEntry = serde_json::from_str(r#"{"action":"remove_printer","payload":{"id":"p1"}}"#)?;

        assert_eq!(Action::Unknown("remove_printer".to_string()), entry.action);
        assert!(entry.decode()?.is_none());

        let wire = serde_json::to_value(&entry)?;
        assert_eq!(wire["action"], "remove_printer");
        Ok(())
    }

    #[test]
    fn test_payload_survives_log_entry_encoding() -> anyhow::Result<()> {
        let entry = Command::AddFilament(Filament {
            id: "f1".to_string(),
            kind: "PLA".to_string(),
            color: "orange".to_string(),
            total_weight_grams: 1000,
            remaining_weight_grams: 750,
        })
        .encode()?;

        let bytes = serde_json::to_vec(&entry)?;
        let back: CommandLogEntry = serde_json::from_slice(&bytes)?;

        assert_eq!(entry, back);
        assert!(!String::from_utf8(bytes)?.contains("[123,"), "payload is not a byte array");
        Ok(())
    }

    #[test]
    fn test_malformed_payload() -> anyhow::Result<()> {
        let entry = CommandLogEntry::new(Action::AddFilament, r#"{"id": 7}"#)?;

        let err = entry.decode().unwrap_err();
        assert_eq!(Action::AddFilament, err.action);
        assert!(err.to_string().starts_with("failed to decode add_filament payload"));
        Ok(())
    }
}
