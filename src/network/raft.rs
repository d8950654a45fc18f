use actix_web::post;
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::Responder;
use openraft::raft::AppendEntriesRequest;
use openraft::raft::InstallSnapshotRequest;
use openraft::raft::VoteRequest;

use crate::NodeId;
use crate::Raft;
use crate::TypeConfig;

// --- Raft communication

#[post("/raft-vote")]
pub async fn vote(raft: Data<Raft>, req: Json<VoteRequest<NodeId>>) -> actix_web::Result<impl Responder> {
    let res = raft.vote(req.0).await;
    Ok(Json(res))
}

#[post("/raft-append")]
pub async fn append(raft: Data<Raft>, req: Json<AppendEntriesRequest<TypeConfig>>) -> actix_web::Result<impl Responder> {
    let res = raft.append_entries(req.0).await;
    Ok(Json(res))
}

#[post("/raft-snapshot")]
pub async fn snapshot(
    raft: Data<Raft>,
    req: Json<InstallSnapshotRequest<TypeConfig>>,
) -> actix_web::Result<impl Responder> {
    let res = raft.install_snapshot(req.0).await;
    Ok(Json(res))
}
