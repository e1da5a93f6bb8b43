use crate::engine::{DesignEngine, RouteSearchResponse};
use crate::errors::{self, ApiError};
use crate::pricing::PricingResponse;
use crate::types::{PricingLogicConfig, PricingRequest, RouteRequest};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(post_route_search)
        .service(post_pricing_quote)
        .service(post_quote)
        .service(get_pricing_config)
        .service(put_pricing_config)
        .service(post_dataset_reload)
        .service(get_audit_logs)
        .service(delete_audit_logs)
        .service(get_audit_export)
        .service(get_health)
        .service(get_stats);
}

fn request_context(request_id: &str) -> Option<String> {
    if request_id.is_empty() {
        None
    } else {
        Some(request_id.to_string())
    }
}

#[post("/routes/search")]
async fn post_route_search(
    engine: web::Data<DesignEngine>,
    payload: web::Json<RouteRequest>,
) -> Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let request = payload.into_inner();
    let request_id = request_context(&request.request_id);
    let revision = engine.dataset_revision();
    let response = engine
        .find_path(request)
        .await
        .map_err(|err| errors::with_context(err, request_id, Some(revision.clone())))?;

    let mut builder = HttpResponse::Ok();
    builder.append_header((
        "X-Engine-Latency",
        format!("{}ms", started.elapsed().as_millis()),
    ));
    builder.append_header(("X-Dataset-Revision", revision));
    Ok(builder.json(response))
}

#[post("/pricing/quote")]
async fn post_pricing_quote(
    engine: web::Data<DesignEngine>,
    payload: web::Json<PricingRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let request_id = request_context(&request.request_id);
    let revision = engine.dataset_revision();
    let response = engine
        .calculate_pricing(request)
        .map_err(|err| errors::with_context(err, request_id, Some(revision.clone())))?;

    let mut builder = HttpResponse::Ok();
    builder.append_header(("X-Dataset-Revision", revision));
    Ok(builder.json(response))
}

#[derive(Debug, Serialize)]
struct QuoteResponse {
    search: RouteSearchResponse,
    pricing: PricingResponse,
}

/// The design tool's one-shot call: find the path(s), then price them.
#[post("/quotes")]
async fn post_quote(
    engine: web::Data<DesignEngine>,
    payload: web::Json<RouteRequest>,
) -> Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let request = payload.into_inner();
    let request_id = request_context(&request.request_id);
    let revision = engine.dataset_revision();
    let context = |err| errors::with_context(err, request_id.clone(), Some(revision.clone()));

    let search = engine.find_path(request.clone()).await.map_err(context)?;
    let mut paths = vec![search.primary_path.clone()];
    if let Some(protection) = &search.protection_path {
        paths.push(protection.clone());
    }
    let pricing = engine
        .calculate_pricing(PricingRequest {
            request_id: search.request_id.clone(),
            paths,
            bandwidth_mbps: request.bandwidth_mbps,
            contract_term: request.contract_term,
            currency: request.currency.clone(),
            protection_required: request.protection_required,
            include_ull: request.include_ull,
            user: request.user.clone(),
        })
        .map_err(context)?;

    let mut builder = HttpResponse::Ok();
    builder.append_header((
        "X-Engine-Latency",
        format!("{}ms", started.elapsed().as_millis()),
    ));
    builder.append_header(("X-Dataset-Revision", revision));
    Ok(builder.json(QuoteResponse { search, pricing }))
}

#[get("/admin/pricing-config")]
async fn get_pricing_config(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    Ok(HttpResponse::Ok().json(engine.pricing_config()))
}

#[put("/admin/pricing-config")]
async fn put_pricing_config(
    engine: web::Data<DesignEngine>,
    payload: web::Json<PricingLogicConfig>,
) -> Result<impl Responder, ApiError> {
    engine.set_pricing_config(payload.into_inner())?;
    Ok(HttpResponse::NoContent())
}

#[post("/admin/dataset/reload")]
async fn post_dataset_reload(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    let revision = engine.reload_dataset().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "revision": revision })))
}

#[get("/audit/logs")]
async fn get_audit_logs(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    let entries = engine.audit_store().list().await;
    Ok(HttpResponse::Ok().json(entries))
}

#[delete("/audit/logs")]
async fn delete_audit_logs(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    let cleared = engine.audit_store().clear().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "cleared": cleared })))
}

#[get("/audit/logs/export")]
async fn get_audit_export(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    let csv = engine.audit_store().export_csv().await;
    Ok(HttpResponse::Ok().content_type("text/csv").body(csv))
}

#[get("/healthz")]
async fn get_health(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    #[derive(Serialize)]
    struct HealthResponse {
        status: &'static str,
        dataset_revision: String,
        timestamp: String,
    }

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        dataset_revision: engine.dataset_revision(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[get("/stats")]
async fn get_stats(engine: web::Data<DesignEngine>) -> Result<impl Responder, ApiError> {
    Ok(HttpResponse::Ok().json(engine.stats()))
}
