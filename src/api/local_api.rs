//! In-process `AuthApi` backend used for self-contained operation. Serves a
//! fixed token and a fixed node list so the gateway can run without an
//! external REST API.

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::LocalApiError;

/// Fixed token/node-list backend mounted at `/api/experiments/<id>/...` when
/// `--use-local-api` is passed.
#[derive(Debug, Clone)]
pub struct LocalApi {
    token: Option<String>,
    nodes: Vec<String>,
}

impl LocalApi {
    pub fn new(token: Option<String>, nodes: Vec<String>) -> Self {
        Self { token, nodes }
    }

    /// Default local API: no token configured, single `localhost.local` node
    /// (matches the source's `NODES = {"nodes": ["localhost.local"]}`).
    pub fn with_defaults(token: Option<String>) -> Self {
        Self::new(token, vec!["localhost.local".to_owned()])
    }

    fn token_response(&self) -> Result<HttpResponse, LocalApiError> {
        let token = self
            .token
            .as_deref()
            .ok_or(LocalApiError::NoTokenConfigured)?;
        Ok(HttpResponse::Ok().json(json!({ "token": token })))
    }

    fn nodes_response(&self) -> HttpResponse {
        HttpResponse::Ok().json(json!({ "nodes": self.nodes }))
    }
}

/// `GET /api/experiments/{id}/{resource:.*}`. `id` is constrained to digits
/// by the route pattern itself, so a non-numeric id never reaches here (it
/// 404s at the router).
pub async fn handle(
    path: web::Path<(String, String)>,
    api: web::Data<LocalApi>,
) -> Result<HttpResponse, LocalApiError> {
    let (_experiment_id, resource) = path.into_inner();
    match resource.as_str() {
        "token" => api.token_response(),
        "" => Ok(api.nodes_response()),
        other => Err(LocalApiError::InvalidResource(other.to_owned())),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, api: LocalApi) {
    cfg.app_data(web::Data::new(api)).route(
        "/api/experiments/{id:[0-9]+}/{resource:.*}",
        web::get().to(handle),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn token_endpoint_returns_configured_token() {
        let api = LocalApi::with_defaults(Some("tok".to_owned()));
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, api)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/experiments/123/token")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["token"], "tok");
    }

    #[actix_web::test]
    async fn token_endpoint_without_preset_token_is_400() {
        let api = LocalApi::with_defaults(None);
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, api)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/experiments/123/token")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn nodes_endpoint_returns_fixed_list() {
        let api = LocalApi::with_defaults(None);
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, api)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/experiments/123/")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["nodes"][0], "localhost.local");
    }

    #[actix_web::test]
    async fn unknown_resource_is_404() {
        let api = LocalApi::with_defaults(Some("tok".to_owned()));
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, api)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/experiments/123/bogus")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn non_numeric_experiment_is_404_at_router() {
        let api = LocalApi::with_defaults(Some("tok".to_owned()));
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, api)),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/experiments/abc/token")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
