//! HTTP layers shared by every route
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tower_http::cors::CorsLayer;

/// Header a caller may set to choose the workflow id up front
pub const WORKFLOW_ID_HEADER: &str = "x-workflow-id";

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Echo the workflow id header back on the response
pub async fn echo_workflow_id(req: Request<Body>, next: Next) -> Response {
    let workflow_id = req.headers().get(WORKFLOW_ID_HEADER).cloned();
    let mut response = next.run(req).await;
    if let Some(value) = workflow_id {
        response.headers_mut().insert(WORKFLOW_ID_HEADER, value);
    }
    response
}
