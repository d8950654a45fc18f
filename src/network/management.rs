use std::collections::BTreeMap;

use actix_web::get;
use actix_web::post;
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::Responder;
use openraft::BasicNode;

use crate::app::App;
use crate::Raft;

// --- Cluster management

/// Initialize a single-node cluster made of this node.
///
/// The same thing `--bootstrap` does at startup, for a node that was started without it.
#[post("/init")]
pub async fn init(app: Data<App>, raft: Data<Raft>) -> actix_web::Result<impl Responder> {
    let nodes = BTreeMap::from([(app.id, BasicNode::new(&app.addr))]);
    let res = raft.initialize(nodes).await;
    Ok(Json(res))
}

/// Get the latest metrics of the cluster
#[get("/metrics")]
pub async fn metrics(raft: Data<Raft>) -> actix_web::Result<impl Responder> {
    let metrics = raft.metrics().borrow().clone();
    Ok(Json(metrics))
}
