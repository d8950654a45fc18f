use std::collections::BTreeMap;
use std::time::Duration;

use openraft::BasicNode;
use openraft::RaftMetrics;
use reqwest::Response;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::ServerInfo;
use crate::model::Filament;
use crate::model::JobStatus;
use crate::model::PrintJob;
use crate::model::Printer;
use crate::network::api::JoinRequest;
use crate::network::api::StatusRequest;
use crate::typ;
use crate::NodeId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The node answered with a non-success status.
    #[error("{status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("remote raft error: {0}")]
    Raft(String),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status(),
            ClientError::Raft(_) => None,
        }
    }
}

/// HTTP client of a single print-farm node.
///
/// It talks to exactly the node it was created for and never follows the leader on its own.
#[derive(Debug, Clone)]
pub struct PrintFarmClient {
    addr: String,
    inner: reqwest::Client,
}

impl PrintFarmClient {
    pub fn new(addr: impl ToString) -> Self {
        Self {
            addr: addr.to_string(),
            inner: reqwest::Client::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    // --- Application API

    pub async fn add_printer(&self, printer: &Printer) -> Result<(), ClientError> {
        self.post("api/v1/printers", printer).await?;
        Ok(())
    }

    pub async fn list_printers(&self) -> Result<BTreeMap<String, Printer>, ClientError> {
        self.get_json("api/v1/printers").await
    }

    pub async fn add_filament(&self, filament: &Filament) -> Result<(), ClientError> {
        self.post("api/v1/filaments", filament).await?;
        Ok(())
    }

    pub async fn list_filaments(&self) -> Result<BTreeMap<String, Filament>, ClientError> {
        self.get_json("api/v1/filaments").await
    }

    pub async fn add_print_job(&self, job: &PrintJob) -> Result<(), ClientError> {
        self.post("api/v1/print_jobs", job).await?;
        Ok(())
    }

    pub async fn list_print_jobs(&self) -> Result<BTreeMap<String, PrintJob>, ClientError> {
        self.get_json("api/v1/print_jobs").await
    }

    /// Returns the confirmation text sent by the node.
    pub async fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<String, ClientError> {
        let uri = format!("api/v1/print_jobs/{}/status", job_id);
        let resp = self.post(&uri, &StatusRequest { status }).await?;
        Ok(resp.text().await?)
    }

    // --- Cluster

    /// Address of the leader as seen by this node, `None` while no leader is known.
    pub async fn leader(&self) -> Result<Option<String>, ClientError> {
        let resp = self.request(self.inner.get(self.url("api/v1/leader"))).await;
        match resp {
            Ok(resp) => Ok(Some(resp.text().await?)),
            Err(e) if e.status() == Some(StatusCode::SERVICE_UNAVAILABLE) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn configuration(&self) -> Result<Vec<ServerInfo>, ClientError> {
        self.get_json("api/v1/config").await
    }

    /// Ask this node to add `node_id` at `addr` as a voter. Only the leader can do it.
    pub async fn join(&self, node_id: NodeId, addr: &str) -> Result<(), ClientError> {
        let req = JoinRequest {
            node_id,
            addr: addr.to_string(),
        };
        self.post("join", &req).await?;
        Ok(())
    }

    // --- Admin

    /// Initialize a single-node cluster made of this node.
    pub async fn init(&self) -> Result<(), ClientError> {
        let resp = self.post("init", &()).await?;
        let res: Result<(), typ::RaftError<typ::InitializeError>> = resp.json().await?;
        res.map_err(|e| ClientError::Raft(e.to_string()))
    }

    pub async fn metrics(&self) -> Result<RaftMetrics<NodeId, BasicNode>, ClientError> {
        self.get_json("metrics").await
    }

    // --- Internal methods

    fn url(&self, uri: &str) -> String {
        format!("http://{}/{}", self.addr, uri)
    }

    async fn post<Req>(&self, uri: &str, req: &Req) -> Result<Response, ClientError>
    where Req: Serialize + ?Sized {
        let url = self.url(uri);
        tracing::debug!(">>> client send request to {}", url);
        self.request(self.inner.post(url).json(req)).await
    }

    async fn get_json<Resp>(&self, uri: &str) -> Result<Resp, ClientError>
    where Resp: DeserializeOwned {
        let url = self.url(uri);
        tracing::debug!(">>> client send request to {}", url);
        let resp = self.request(self.inner.get(url)).await?;
        Ok(resp.json().await?)
    }

    async fn request(&self, builder: reqwest::RequestBuilder) -> Result<Response, ClientError> {
        let resp = builder.timeout(REQUEST_TIMEOUT).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        tracing::debug!("<<< client recv error {}: {}", status, body);
        Err(ClientError::Status { status, body })
    }
}
