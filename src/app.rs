//! Assembles the `actix_web` service: route table, shared `Gateway` and
//! `AuthApi` state, and the optional local API.

use std::sync::Arc;

use actix_web::web;

use crate::api::{AuthApi, LocalApi};
use crate::gateway::Gateway;
use crate::ws_controller;

/// Route fragments mirroring the site/experiment/node character classes, so
/// malformed path segments 404 at the router rather than reaching a
/// handler.
const SITE_SEGMENT: &str = "{site:[a-z0-9_-]+}";
const EXPERIMENT_SEGMENT: &str = "{experiment:[0-9]+}";
const NODE_SEGMENT: &str = "{node:[a-z0-9]+-?[a-z0-9]*-?[0-9]*}";

pub fn configure(
    cfg: &mut web::ServiceConfig,
    gateway: Arc<Gateway>,
    auth_api: Arc<dyn AuthApi>,
    local_api: Option<LocalApi>,
) {
    cfg.app_data(web::Data::new(gateway))
        .app_data(web::Data::new(auth_api))
        .route(
            &format!("/ws/{SITE_SEGMENT}/{EXPERIMENT_SEGMENT}/{NODE_SEGMENT}/serial/raw"),
            web::get().to(ws_controller::serial_raw),
        )
        .route(
            &format!("/ws/{SITE_SEGMENT}/{EXPERIMENT_SEGMENT}/{NODE_SEGMENT}/serial"),
            web::get().to(ws_controller::serial_text),
        );

    if let Some(local_api) = local_api {
        crate::api::local_api::configure(cfg, local_api);
    }
}
