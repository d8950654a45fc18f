use actix_web::error::InternalError;
use actix_web::web;
use actix_web::HttpResponse;

pub mod api;
pub mod management;
pub mod raft;
pub mod raft_network_impl;

pub use raft_network_impl::Network;

/// Raft RPC bodies carry log batches and whole snapshots.
const JSON_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Register the application API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(api::join)
        .service(api::leader)
        .service(api::cluster_config)
        .service(api::add_printer)
        .service(api::list_printers)
        .service(api::add_filament)
        .service(api::list_filaments)
        .service(api::add_print_job)
        .service(api::list_print_jobs)
        .service(api::update_print_job_status);
}

/// Every malformed JSON body is a client error, whatever the reason it failed to parse.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().limit(JSON_BODY_LIMIT).error_handler(|err, _req| {
        let resp = HttpResponse::BadRequest().body(format!("invalid request body: {}", err));
        InternalError::from_response(err, resp).into()
    })
}
