use crate::config::Config;
use crate::db::connection::{init_db, Database};
use astra::{Body, Request};
use http::Method;
use std::io::Read;
use tempfile::TempDir;

/// Initialize a fresh test DB in its own temp dir using the production schema.
/// Keep the returned dir alive for as long as the database is used.
pub fn init_test_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let path = dir.path().join("test.sqlite3");
    let db = Database::new(path.to_string_lossy().to_string());

    init_db(&db).unwrap_or_else(|e| panic!("Database initialization failed: {e}"));

    (dir, db)
}

/// Config with test credentials and defaults for everything else.
pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "BAREFOOT_ENDPOINT" => Some("http://localhost/BarefootService.asmx".into()),
        "BAREFOOT_USERNAME" => Some("user".into()),
        "BAREFOOT_PASSWORD" => Some("secret".into()),
        "BAREFOOT_ACCOUNT" => Some("v3cacct".into()),
        _ => None,
    })
    .unwrap_or_else(|e| panic!("test config invalid: {e}"))
}

pub fn request(method: Method, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

pub fn body_json(resp: astra::Response) -> serde_json::Value {
    let mut body = String::new();
    resp.into_body().reader().read_to_string(&mut body).unwrap();
    serde_json::from_str(&body).unwrap_or_else(|e| panic!("body is not JSON ({e}): {body}"))
}
