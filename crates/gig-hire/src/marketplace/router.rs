use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Path, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::warn;

use super::admission::{Admission, AdmissionGate, AdmissionKey, OriginPolicy};
use super::domain::{BidId, BidSubmission, GigDraft, GigId, UserId};
use super::hire::{Eligibility, HireError, HireErrorKind, HireOutcome};
use super::service::{MarketplaceService, MarketplaceServiceError};
use super::store::EntityStore;

/// Header carrying the caller identity established by the upstream auth layer.
pub const CALLER_HEADER: &str = "x-user-id";

type ServiceState<S> = Arc<MarketplaceService<S>>;

/// Admission control for the write routes: one gate for hire attempts, one for bid
/// submissions, and the policy deciding which address counts as the client origin.
pub struct Admissions<H, B> {
    pub hire: Arc<H>,
    pub bids: Arc<B>,
    pub origin: OriginPolicy,
}

impl<H, B> Admissions<H, B> {
    pub fn new(hire: Arc<H>, bids: Arc<B>, origin: OriginPolicy) -> Self {
        Self { hire, bids, origin }
    }
}

/// Router builder exposing gig, bid and hire endpoints. Hire attempts and bid
/// submissions sit behind their own admission gates.
pub fn marketplace_router<S, H, B>(
    service: Arc<MarketplaceService<S>>,
    admissions: Admissions<H, B>,
) -> Router
where
    S: EntityStore + 'static,
    H: AdmissionGate + 'static,
    B: AdmissionGate + 'static,
{
    let Admissions { hire, bids, origin } = admissions;

    let hire: Router<ServiceState<S>> = Router::new()
        .route("/api/v1/bids/:bid_id/hire", put(hire_handler::<S>))
        .route_layer(from_fn_with_state(
            AdmissionLayer::new(hire, origin, LimitedRoute::Hire),
            admission_layer::<H>,
        ));

    let submit: Router<ServiceState<S>> = Router::new()
        .route("/api/v1/bids", post(submit_bid_handler::<S>))
        .route_layer(from_fn_with_state(
            AdmissionLayer::new(bids, origin, LimitedRoute::BidSubmission),
            admission_layer::<B>,
        ));

    Router::new()
        .route("/api/v1/gigs", post(create_gig_handler::<S>))
        .route("/api/v1/gigs/mine", get(my_gigs_handler::<S>))
        .route("/api/v1/gigs/:gig_id", get(gig_handler::<S>))
        .route("/api/v1/gigs/:gig_id/bids", get(gig_bids_handler::<S>))
        .route("/api/v1/bids/mine", get(my_bids_handler::<S>))
        .route(
            "/api/v1/bids/:bid_id/eligibility",
            get(eligibility_handler::<S>),
        )
        .merge(hire)
        .merge(submit)
        .with_state(service)
}

/// Authenticated caller, read from [`CALLER_HEADER`].
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

fn caller_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| UserId(value.to_string()))
}

#[async_trait]
impl<St> FromRequestParts<St> for Caller
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
            .map(Caller)
            .ok_or_else(unauthenticated)
    }
}

#[derive(Debug, Clone, Copy)]
enum LimitedRoute {
    Hire,
    BidSubmission,
}

impl LimitedRoute {
    fn code(self) -> &'static str {
        match self {
            Self::Hire => "RATE_LIMIT_EXCEEDED",
            Self::BidSubmission => "BID_RATE_LIMIT_EXCEEDED",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Hire => "Too many hire attempts. Please wait before trying again.",
            Self::BidSubmission => {
                "Too many bid submissions. Please wait before submitting more bids."
            }
        }
    }

    /// Successful hires do not count against the window; every bid submission does.
    fn forgives_success(self) -> bool {
        matches!(self, Self::Hire)
    }
}

struct AdmissionLayer<G> {
    gate: Arc<G>,
    origin: OriginPolicy,
    route: LimitedRoute,
}

impl<G> AdmissionLayer<G> {
    fn new(gate: Arc<G>, origin: OriginPolicy, route: LimitedRoute) -> Self {
        Self {
            gate,
            origin,
            route,
        }
    }
}

impl<G> Clone for AdmissionLayer<G> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            origin: self.origin,
            route: self.route,
        }
    }
}

fn admission_key(request: &Request, caller: UserId, policy: OriginPolicy) -> AdmissionKey {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    AdmissionKey {
        caller,
        origin: policy.resolve(request.headers(), peer),
    }
}

async fn admission_layer<G>(
    State(layer): State<AdmissionLayer<G>>,
    request: Request,
    next: Next,
) -> Response
where
    G: AdmissionGate + 'static,
{
    let Some(caller) = caller_from_headers(request.headers()) else {
        return unauthenticated();
    };
    let key = admission_key(&request, caller, layer.origin);

    if let Admission::Rejected { retry_after } = layer.gate.admit(&key) {
        warn!(
            caller = %key.caller,
            origin = ?key.origin,
            route = ?layer.route,
            "request rate limited"
        );
        return rate_limited(layer.route, retry_after);
    }

    let response = next.run(request).await;
    if layer.route.forgives_success() && response.status().is_success() {
        layer.gate.forgive(&key);
    }
    response
}

fn failure(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let payload = json!({
        "success": false,
        "message": message.into(),
        "code": code,
    });
    (status, Json(payload)).into_response()
}

fn unauthenticated() -> Response {
    failure(
        StatusCode::UNAUTHORIZED,
        "AUTH_REQUIRED",
        "Authentication required",
    )
}

fn rate_limited(route: LimitedRoute, retry_after: Duration) -> Response {
    let seconds = retry_after.as_secs().max(1);
    let mut response = failure(StatusCode::TOO_MANY_REQUESTS, route.code(), route.message());
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    response
}

fn hire_error_response(error: HireError) -> Response {
    match error {
        HireError::NotFound(_) => {
            failure(StatusCode::NOT_FOUND, "HIRE_NOT_FOUND", error.to_string())
        }
        HireError::Unauthorized => {
            failure(StatusCode::FORBIDDEN, "HIRE_UNAUTHORIZED", error.to_string())
        }
        HireError::Conflict(ref reason) => {
            let payload = json!({
                "success": false,
                "message": error.to_string(),
                "code": "HIRE_CONFLICT",
                "retryable": reason.is_transient(),
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        HireError::Internal(_) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "HIRE_SERVER_ERROR",
            "Server error during hire process",
        ),
    }
}

fn service_error_response(error: MarketplaceServiceError) -> Response {
    use MarketplaceServiceError as E;

    match error {
        E::Hire(inner) => hire_error_response(inner),
        E::Ineligible(reason) => {
            let (status, code) = match reason.kind() {
                HireErrorKind::NotFound => (StatusCode::NOT_FOUND, "HIRE_NOT_FOUND"),
                HireErrorKind::Unauthorized => (StatusCode::FORBIDDEN, "HIRE_UNAUTHORIZED"),
                HireErrorKind::Conflict => (StatusCode::CONFLICT, "HIRE_CONFLICT"),
                HireErrorKind::Internal => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "HIRE_SERVER_ERROR")
                }
            };
            let payload = json!({
                "success": false,
                "message": reason.to_string(),
                "code": code,
                "stage": "precheck",
                "retryable": false,
            });
            (status, Json(payload)).into_response()
        }
        E::Intake(violation) => failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            violation.to_string(),
        ),
        E::NotFound(_) => failure(StatusCode::NOT_FOUND, "NOT_FOUND", error.to_string()),
        E::Forbidden | E::OwnGig => {
            failure(StatusCode::FORBIDDEN, "FORBIDDEN", error.to_string())
        }
        E::GigClosed => failure(StatusCode::BAD_REQUEST, "GIG_CLOSED", error.to_string()),
        E::DuplicateBid => failure(StatusCode::CONFLICT, "DUPLICATE_BID", error.to_string()),
        E::Contention => {
            let payload = json!({
                "success": false,
                "message": error.to_string(),
                "code": "CONFLICT",
                "retryable": true,
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        E::Internal(_) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "SERVER_ERROR",
            "Internal server error",
        ),
    }
}

fn hire_success(outcome: HireOutcome) -> Value {
    let HireOutcome {
        bid,
        gig,
        rejected_count,
    } = outcome;

    json!({
        "success": true,
        "message": "Freelancer hired successfully",
        "data": {
            "bid": bid,
            "gig": {
                "id": gig.id,
                "title": gig.title,
                "status": gig.status,
                "selected_bid": gig.selected_bid,
                "hired_at": gig.hired_at,
            },
            "rejected_bids_count": rejected_count,
        },
    })
}

pub(crate) async fn hire_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(requester): Caller,
    Path(bid_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.hire(&BidId(bid_id), &requester) {
        Ok(outcome) => (StatusCode::OK, Json(hire_success(outcome))).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn eligibility_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(requester): Caller,
    Path(bid_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.check_eligibility(&BidId(bid_id), &requester) {
        Ok(Eligibility::Eligible(candidate)) => {
            let payload = json!({
                "success": true,
                "eligible": true,
                "bid": candidate.bid,
                "gig": candidate.gig,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(Eligibility::Ineligible(reason)) => {
            let payload = json!({
                "success": true,
                "eligible": false,
                "reason": reason.to_string(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn create_gig_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(client): Caller,
    Json(draft): Json<GigDraft>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.create_gig(&client, draft) {
        Ok(gig) => {
            let payload = json!({
                "success": true,
                "message": "Gig created successfully",
                "gig": gig,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn gig_handler<S>(
    State(service): State<ServiceState<S>>,
    Path(gig_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.get_gig(&GigId(gig_id)) {
        Ok(gig) => (StatusCode::OK, Json(json!({ "success": true, "gig": gig }))).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn gig_bids_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(owner): Caller,
    Path(gig_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.bids_for_gig(&owner, &GigId(gig_id)) {
        Ok(bids) => {
            let payload = json!({ "success": true, "count": bids.len(), "bids": bids });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn submit_bid_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(freelancer): Caller,
    Json(submission): Json<BidSubmission>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.submit_bid(&freelancer, submission) {
        Ok(bid) => {
            let payload = json!({
                "success": true,
                "message": "Bid submitted successfully",
                "bid": bid,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn my_bids_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(freelancer): Caller,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.bids_by_freelancer(&freelancer) {
        Ok(bids) => {
            let payload = json!({ "success": true, "count": bids.len(), "bids": bids });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn my_gigs_handler<S>(
    State(service): State<ServiceState<S>>,
    Caller(client): Caller,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.gigs_by_client(&client) {
        Ok(gigs) => {
            let payload = json!({ "success": true, "count": gigs.len(), "gigs": gigs });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}
