use actix_web::get;
use actix_web::http::StatusCode;
use actix_web::post;
use actix_web::web;
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use serde::Deserialize;
use serde::Serialize;

use crate::app::App;
use crate::gateway::WriteError;
use crate::membership::MembershipError;
use crate::model::Filament;
use crate::model::JobStatus;
use crate::model::PrintJob;
use crate::model::Printer;
use crate::NodeId;

/// Body of `POST /join`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub node_id: NodeId,
    pub addr: String,
}

/// Body of `POST /api/v1/print_jobs/{job_id}/status`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub status: JobStatus,
}

/// A request that parsed but cannot be accepted.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("{0} id must not be empty")]
    EmptyId(&'static str),

    #[error("node address must not be empty")]
    EmptyAddr,
}

impl ResponseError for InputError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl ResponseError for WriteError {
    fn status_code(&self) -> StatusCode {
        match self {
            WriteError::NotLeader { .. } => StatusCode::FORBIDDEN,
            WriteError::JobNotFound(_) => StatusCode::NOT_FOUND,
            WriteError::Encode(_) | WriteError::ReplicationFailed(_) | WriteError::Rejected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl ResponseError for MembershipError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn require_id(kind: &'static str, id: &str) -> Result<(), InputError> {
    if id.is_empty() {
        return Err(InputError::EmptyId(kind));
    }
    Ok(())
}

// --- Cluster

/// Add the node in the request body as a voter.
///
/// The receiving node must be the leader; a follower answers with 500 and the caller is expected
/// to retry against `GET /api/v1/leader`.
#[post("/join")]
pub async fn join(app: Data<App>, req: Json<JoinRequest>) -> actix_web::Result<HttpResponse> {
    let JoinRequest { node_id, addr } = req.into_inner();
    if addr.is_empty() {
        return Err(InputError::EmptyAddr.into());
    }

    app.membership.add_node(node_id, addr.clone()).await?;

    tracing::info!(node_id, %addr, "node joined");
    Ok(HttpResponse::Ok().body(format!("node {} at {} joined", node_id, addr)))
}

#[get("/api/v1/leader")]
pub async fn leader(app: Data<App>) -> HttpResponse {
    match app.membership.leader_address() {
        Some(addr) => HttpResponse::Ok().body(addr),
        None => HttpResponse::ServiceUnavailable().body("no leader elected yet"),
    }
}

#[get("/api/v1/config")]
pub async fn cluster_config(app: Data<App>) -> actix_web::Result<HttpResponse> {
    let servers = app.membership.configuration().await?;
    Ok(HttpResponse::Ok().json(servers))
}

// --- Printers

#[post("/api/v1/printers")]
pub async fn add_printer(app: Data<App>, req: Json<Printer>) -> actix_web::Result<HttpResponse> {
    let printer = req.into_inner();
    require_id("printer", &printer.id)?;

    app.gateway.add_printer(printer.clone()).await?;
    Ok(HttpResponse::Created().json(printer))
}

#[get("/api/v1/printers")]
pub async fn list_printers(app: Data<App>) -> HttpResponse {
    HttpResponse::Ok().json(app.state_machine_store.list_printers().await)
}

// --- Filaments

#[post("/api/v1/filaments")]
pub async fn add_filament(app: Data<App>, req: Json<Filament>) -> actix_web::Result<HttpResponse> {
    let filament = req.into_inner();
    require_id("filament", &filament.id)?;

    app.gateway.add_filament(filament.clone()).await?;
    Ok(HttpResponse::Created().json(filament))
}

#[get("/api/v1/filaments")]
pub async fn list_filaments(app: Data<App>) -> HttpResponse {
    HttpResponse::Ok().json(app.state_machine_store.list_filaments().await)
}

// --- Print jobs

#[post("/api/v1/print_jobs")]
pub async fn add_print_job(app: Data<App>, req: Json<PrintJob>) -> actix_web::Result<HttpResponse> {
    let job = req.into_inner();
    require_id("print job", &job.id)?;

    app.gateway.add_print_job(job.clone()).await?;
    Ok(HttpResponse::Created().json(job))
}

#[get("/api/v1/print_jobs")]
pub async fn list_print_jobs(app: Data<App>) -> HttpResponse {
    HttpResponse::Ok().json(app.state_machine_store.list_print_jobs().await)
}

#[post("/api/v1/print_jobs/{job_id}/status")]
pub async fn update_print_job_status(
    app: Data<App>,
    path: web::Path<String>,
    req: Json<StatusRequest>,
) -> actix_web::Result<HttpResponse> {
    let job_id = path.into_inner();
    let status = req.into_inner().status;

    app.gateway.update_job_status(job_id.clone(), status).await?;
    Ok(HttpResponse::Ok().body(format!("Print job {} updated to {}", job_id, status)))
}
