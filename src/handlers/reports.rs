//! HTTP endpoints for the report lifecycle. Actor identity arrives from the
//! platform's auth layer as an `X-Account-Id` header.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::models::{PatternFlags, Report, ReportPriority};
use crate::services::{
    AdminAction, AnalyticsAggregator, LifecycleEngine, OwnerAction, PatternDetector, Reporter,
    SubmissionGateway, SubmitReportInput, VerificationService,
};

pub struct AppState {
    pub gateway: Arc<SubmissionGateway>,
    pub verification: Arc<VerificationService>,
    pub engine: Arc<LifecycleEngine>,
    pub analytics: Arc<AnalyticsAggregator>,
    pub patterns: Arc<PatternDetector>,
}

/// Authenticated account id extracted from the `X-Account-Id` header.
pub struct AccountId(pub Uuid);

impl FromRequest for AccountId {
    type Error = actix_web::Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.headers()
                .get("X-Account-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Uuid::parse_str(v).ok())
                .map(AccountId)
                .ok_or_else(|| ReportError::Forbidden.into()),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub event_id: Uuid,
    pub category: String,
    pub description: String,
    pub reporter_type: String,
    pub reporter_email: Option<String>,
    pub priority: Option<ReportPriority>,
    pub deadline: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest<A> {
    pub action: A,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Serialize)]
struct ReportView {
    #[serde(flatten)]
    report: Report,
    #[serde(flatten)]
    flags: PatternFlags,
}

pub async fn submit_report(
    state: web::Data<AppState>,
    actor: Option<AccountId>,
    req: web::Json<SubmitReportRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();

    let reporter = match req.reporter_type.as_str() {
        "anonymous" => {
            let email = req.reporter_email.ok_or_else(|| {
                ReportError::Validation(
                    "reporter_email is required for anonymous reports".to_string(),
                )
            })?;
            Reporter::Anonymous { email }
        }
        "authenticated" => {
            let AccountId(account_id) = actor.ok_or(ReportError::Forbidden)?;
            Reporter::Authenticated { account_id }
        }
        "admin" => {
            let AccountId(admin_id) = actor.ok_or(ReportError::Forbidden)?;
            Reporter::Admin {
                admin_id,
                priority: req.priority.unwrap_or(ReportPriority::Normal),
                deadline: req.deadline,
                admin_notes: req.admin_notes,
            }
        }
        other => {
            return Err(ReportError::Validation(format!(
                "Unknown reporter type: {}",
                other
            )))
        }
    };

    let report = state
        .gateway
        .submit(SubmitReportInput {
            event_id: req.event_id,
            category: req.category,
            description: req.description,
            reporter,
        })
        .await?;
    Ok(HttpResponse::Created().json(report))
}

pub async fn verify_report(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let report = state.verification.verify(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn get_report(
    state: web::Data<AppState>,
    actor: AccountId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let report = state.engine.get_report(actor.0, path.into_inner()).await?;
    let flags = state.patterns.flags_for(&report).await?;
    Ok(HttpResponse::Ok().json(ReportView { report, flags }))
}

pub async fn get_history(
    state: web::Data<AppState>,
    actor: AccountId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let history = state.engine.history(actor.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

pub async fn owner_action(
    state: web::Data<AppState>,
    actor: AccountId,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<ActionRequest<OwnerAction>>,
) -> Result<HttpResponse> {
    let (calendar_id, report_id) = path.into_inner();
    let report = state
        .engine
        .owner_action(actor.0, calendar_id, report_id, req.action, &req.notes)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn admin_action(
    state: web::Data<AppState>,
    actor: AccountId,
    path: web::Path<Uuid>,
    req: web::Json<ActionRequest<AdminAction>>,
) -> Result<HttpResponse> {
    let report = state
        .engine
        .admin_action(actor.0, path.into_inner(), req.action, &req.notes)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn forward_report(
    state: web::Data<AppState>,
    actor: AccountId,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    state.engine.forward_report(actor.0, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn get_analytics(
    state: web::Data<AppState>,
    actor: AccountId,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse> {
    let start = parse_bound(&query.start, "start")?;
    let end = parse_bound(&query.end, "end")?;
    let metrics = state.analytics.get_analytics(actor.0, start, end).await?;
    Ok(HttpResponse::Ok().json(metrics))
}

fn parse_bound(value: &str, name: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ReportError::Validation(format!("{} must be an RFC 3339 timestamp", name))
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/reports", web::post().to(submit_report))
            .route("/reports/verify/{token}", web::post().to(verify_report))
            .route("/reports/{report_id}", web::get().to(get_report))
            .route("/reports/{report_id}/history", web::get().to(get_history))
            .route(
                "/calendars/{calendar_id}/reports/{report_id}",
                web::put().to(owner_action),
            )
            .route("/admin/reports/{report_id}", web::put().to(admin_action))
            .route(
                "/admin/reports/{report_id}/forward",
                web::post().to(forward_report),
            )
            .route("/admin/analytics", web::get().to(get_analytics)),
    );
}
