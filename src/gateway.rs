//! Write gateway: the only path by which client mutations reach the replicated log.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::command::EncodeError;
use crate::engine::ConsensusEngine;
use crate::engine::EngineError;
use crate::model::Filament;
use crate::model::JobStatus;
use crate::model::PrintJob;
use crate::model::Printer;
use crate::model::StatusUpdate;
use crate::store::ApplyOutcome;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("only the leader accepts writes; current leader: {}", leader_addr.as_deref().unwrap_or("unknown"))]
    NotLeader { leader_addr: Option<String> },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The entry may or may not have been committed.
    #[error("replication failed: {0}")]
    ReplicationFailed(EngineError),

    #[error("print job {0} not found")]
    JobNotFound(String),

    #[error("entry rejected by the state machine: {0:?}")]
    Rejected(ApplyOutcome),
}

/// Accepts mutations on the leader only and blocks until they are committed.
#[derive(Clone)]
pub struct WriteGateway {
    engine: Arc<dyn ConsensusEngine>,
    timeout: Duration,
}

impl WriteGateway {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(engine: Arc<dyn ConsensusEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Run `op` only if this node is the leader.
    ///
    /// Every mutating operation goes through here, so a follower rejects a write before anything is
    /// encoded or submitted.
    pub async fn requires_leadership<T, F, Fut>(&self, op: F) -> Result<T, WriteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WriteError>>,
    {
        if !self.engine.is_leader() {
            return Err(WriteError::NotLeader {
                leader_addr: self.engine.leader_address(),
            });
        }
        op().await
    }

    pub async fn submit_write(&self, command: Command) -> Result<ApplyOutcome, WriteError> {
        self.requires_leadership(|| self.replicate(command)).await
    }

    pub async fn add_printer(&self, printer: Printer) -> Result<ApplyOutcome, WriteError> {
        self.submit_write(Command::AddPrinter(printer)).await
    }

    pub async fn add_filament(&self, filament: Filament) -> Result<ApplyOutcome, WriteError> {
        self.submit_write(Command::AddFilament(filament)).await
    }

    pub async fn add_print_job(&self, job: PrintJob) -> Result<ApplyOutcome, WriteError> {
        self.submit_write(Command::AddPrintJob(job)).await
    }

    pub async fn update_job_status(&self, id: String, status: JobStatus) -> Result<ApplyOutcome, WriteError> {
        self.submit_write(Command::UpdatePrintJobStatus(StatusUpdate { id, status })).await
    }

    async fn replicate(&self, command: Command) -> Result<ApplyOutcome, WriteError> {
        let entry = command.encode()?;

        tracing::debug!(action = %entry.action, id = command.resource_id(), "submit write");

        let outcome = match self.engine.submit(entry, self.timeout).await {
            Ok(outcome) => outcome,
            Err(EngineError::NotLeader { leader_addr, .. }) => return Err(WriteError::NotLeader { leader_addr }),
            Err(e) => {
                tracing::warn!(error = %e, id = command.resource_id(), "write not confirmed");
                return Err(WriteError::ReplicationFailed(e));
            }
        };

        match outcome {
            ApplyOutcome::Upserted { .. } | ApplyOutcome::StatusUpdated { .. } => Ok(outcome),
            ApplyOutcome::JobNotFound { id } => Err(WriteError::JobNotFound(id)),
            rejected => Err(WriteError::Rejected(rejected)),
        }
    }
}
