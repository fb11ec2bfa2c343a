use crate::errors::ServerError;
use astra::{Body, Response, ResponseBuilder};
use serde_json::json;
use tracing::error;

pub type ResultResp = Result<Response, ServerError>;

/// Convert a ServerError into a JSON error response
pub fn error_to_response(err: ServerError) -> Response {
    let status = match &err {
        ServerError::NotFound => 404,
        ServerError::BadRequest(_) => 400,
        ServerError::Transport(_) => 502,
        ServerError::DbError(_) | ServerError::InternalError => 500,
    };
    if status >= 500 {
        error!(error = %err, status, "request failed");
    }
    json_error_response(status, &err.to_string())
}

/// Build a `{"success": false, "error": ...}` body
pub fn json_error_response(status: u16, message: &str) -> Response {
    let body = json!({ "success": false, "error": message }).to_string();

    ResponseBuilder::new()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")))
}
