use crate::barefoot::{NormalizedRecord, RawRemoteResult, RemoteObject, SoapTransport, TransportError};
use crate::config::Config;
use crate::db::SqliteStore;
use crate::router::{handle, AppState, TransportFactory};
use crate::sync::{EntityStatus, PropertyStore};
use crate::tests::fake_transport::ScriptedTransport;
use crate::tests::utils::{body_json, init_test_db, request, test_config};
use http::Method;
use std::sync::Arc;

fn property(id: &str, name: &str) -> RemoteObject {
    RemoteObject::default()
        .with_text("PropertyID", id)
        .with_text("Name", name)
}

fn listing(props: Vec<RemoteObject>) -> RawRemoteResult {
    let mut list = RemoteObject::default();
    for p in props {
        list = list.with_object("PROPERTY", p);
    }
    RawRemoteResult::Object(RemoteObject::default().with_object("PROPERTIES", list))
}

fn record(id: &str) -> NormalizedRecord {
    [("PropertyID", id)].into_iter().collect()
}

fn factory<F>(script: F) -> TransportFactory
where
    F: Fn() -> ScriptedTransport + Send + Sync + 'static,
{
    Arc::new(move |_config: &Config| Ok(Box::new(script()) as Box<dyn SoapTransport>))
}

fn state_with<F>(script: F) -> (tempfile::TempDir, AppState)
where
    F: Fn() -> ScriptedTransport + Send + Sync + 'static,
{
    let (dir, db) = init_test_db();
    (dir, AppState::with_transport(db, test_config(), factory(script)))
}

#[test]
fn health_reports_ok() {
    let (_dir, state) = state_with(ScriptedTransport::new);

    let resp = handle(request(Method::GET, "/health"), &state).unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp)["status"], "ok");
}

#[test]
fn unknown_route_is_not_found() {
    let (_dir, state) = state_with(ScriptedTransport::new);

    let result = handle(request(Method::GET, "/nope"), &state);

    assert!(matches!(result, Err(crate::errors::ServerError::NotFound)));
    let resp = crate::responses::error_to_response(crate::errors::ServerError::NotFound);
    assert_eq!(resp.status(), 404);
    assert_eq!(body_json(resp)["success"], false);
}

#[test]
fn sync_requires_post() {
    let (_dir, state) = state_with(ScriptedTransport::new);

    let result = handle(request(Method::GET, "/sync"), &state);

    match result {
        Err(err @ crate::errors::ServerError::BadRequest(_)) => {
            assert_eq!(crate::responses::error_to_response(err).status(), 400);
        }
        _ => panic!("expected BadRequest"),
    }
}

#[test]
fn sync_route_persists_and_logs_the_run() {
    let (_dir, state) = state_with(|| {
        ScriptedTransport::new().respond(
            "GetAllProperty",
            Ok(listing(vec![property("1", "Dune House"), property("2", "Gull Cottage")])),
        )
    });

    let resp = handle(request(Method::POST, "/sync"), &state).unwrap();

    assert_eq!(resp.status(), 200);
    let body = body_json(resp);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    assert_eq!(body["method_used"], "GetAllProperty");

    let store = SqliteStore::new(state.db.clone());
    assert_eq!(store.list_properties().unwrap().len(), 2);

    let runs = body_json(handle(request(Method::GET, "/sync-runs"), &state).unwrap());
    assert_eq!(runs.as_array().map(Vec::len), Some(1));
    assert_eq!(runs[0]["kind"], "sync");
    assert_eq!(runs[0]["count"], 2);
    assert_eq!(runs[0]["success"], true);
}

#[test]
fn sync_route_reports_unreachable_service() {
    let (_dir, state) = state_with(|| {
        ScriptedTransport::new()
            .respond("GetAllProperty", Err(TransportError::ConnectionFailed("refused".into())))
    });

    let resp = handle(request(Method::POST, "/sync"), &state).unwrap();

    assert_eq!(resp.status(), 200);
    let body = body_json(resp);
    assert_eq!(body["count"], 0);
    let message = body["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("No remote call succeeded"), "{message}");
}

#[test]
fn cleanup_route_retires_missing_properties() {
    let (_dir, state) = state_with(|| {
        ScriptedTransport::new().respond("GetAllProperty", Ok(listing(vec![property("1", "Dune House")])))
    });
    let store = SqliteStore::new(state.db.clone());
    let seed = crate::sync::SyncOrchestrator::new(
        &ScriptedTransport::new(),
        &state.config.credentials,
        &state.config.plan(),
        &store,
    )
    .sync_records(&[record("1"), record("2")]);
    assert_eq!(seed.count, 2);

    let resp = handle(request(Method::POST, "/cleanup"), &state).unwrap();

    assert_eq!(resp.status(), 200);
    let body = body_json(resp);
    assert_eq!(body["count"], 1);
    assert_eq!(body["message"], "Moved 1 orphaned properties to inactive status");
    assert_eq!(
        store.find_by_external_id("2").unwrap().unwrap().status,
        EntityStatus::Inactive
    );
}

#[test]
fn test_connection_route_returns_endpoint() {
    let (_dir, state) = state_with(|| {
        ScriptedTransport::new().respond(
            "GetUrlTest",
            Ok(RawRemoteResult::Text("https://portals.barefoot.com/BarefootWebService".into())),
        )
    });

    let resp = handle(request(Method::GET, "/test-connection"), &state).unwrap();

    assert_eq!(resp.status(), 200);
    let body = body_json(resp);
    assert_eq!(body["success"], true);
    assert_eq!(body["endpoint"], "https://portals.barefoot.com/BarefootWebService");
}

#[test]
fn test_connection_route_surfaces_faults() {
    let (_dir, state) = state_with(ScriptedTransport::new);

    let resp = handle(request(Method::GET, "/test-connection"), &state).unwrap();

    assert_eq!(resp.status(), 502);
    assert_eq!(body_json(resp)["success"], false);
}
