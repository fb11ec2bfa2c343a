use crate::barefoot::{BarefootApi, ConnectionReport, SoapClient, SoapTransport, TransportError};
use crate::config::Config;
use crate::db::sync_runs::{end_sync_run, get_recent_sync_runs, start_sync_run};
use crate::db::{Database, SqliteStore};
use crate::errors::ServerError;
use crate::responses::{json_response, ResultResp};
use crate::sync::{CleanupReport, SyncOrchestrator, SyncReport};
use astra::Request;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Builds the transport for one top-level operation.
pub type TransportFactory =
    Arc<dyn Fn(&Config) -> Result<Box<dyn SoapTransport>, TransportError> + Send + Sync>;

/// Everything a request handler needs. Cheap to clone into worker closures.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    transport: TransportFactory,
}

impl AppState {
    /// State backed by a real SOAP client.
    pub fn new(db: Database, config: Config) -> Self {
        Self::with_transport(
            db,
            config,
            Arc::new(|config: &Config| {
                let client = SoapClient::new(&config.credentials, config.timeout)?;
                Ok(Box::new(client) as Box<dyn SoapTransport>)
            }),
        )
    }

    pub fn with_transport(db: Database, config: Config, transport: TransportFactory) -> Self {
        Self {
            db,
            config,
            transport,
        }
    }

    fn transport(&self) -> Result<Box<dyn SoapTransport>, ServerError> {
        Ok((self.transport)(&self.config)?)
    }
}

pub fn handle(req: Request, state: &AppState) -> ResultResp {
    let method = req.method().as_str();
    let path = req.uri().path();

    match (method, path) {
        ("GET", "/health") => json_response(200, &json!({ "status": "ok" })),
        ("POST", "/sync") => {
            let report = run_sync(state)?;
            json_response(200, &report)
        }
        ("POST", "/cleanup") => {
            let report = run_cleanup(state)?;
            json_response(if report.success { 200 } else { 502 }, &report)
        }
        ("GET", "/test-connection") => {
            let report = test_connection(state)?;
            json_response(if report.success { 200 } else { 502 }, &report)
        }
        ("GET", "/sync-runs") => {
            let runs = state.db.with_conn(|conn| get_recent_sync_runs(conn))?;
            json_response(200, &runs)
        }
        (_, "/sync" | "/cleanup") => Err(ServerError::BadRequest(format!("{path} requires POST"))),
        _ => Err(ServerError::NotFound),
    }
}

/// Full sync pass, recorded in `sync_runs`.
pub fn run_sync(state: &AppState) -> Result<SyncReport, ServerError> {
    let run_id = state
        .db
        .with_conn(|conn| start_sync_run(conn, "sync", Utc::now().timestamp()))?;

    let transport = state.transport()?;
    let store = SqliteStore::new(state.db.clone());
    let plan = state.config.plan();
    let report =
        SyncOrchestrator::new(&*transport, &state.config.credentials, &plan, &store).sync_all();

    state.db.with_conn(|conn| {
        end_sync_run(
            conn,
            run_id,
            Utc::now().timestamp(),
            report.count,
            report.errors.len(),
            report.success,
            &report.message,
        )
    })?;
    info!(run_id, count = report.count, success = report.success, "sync finished");
    Ok(report)
}

/// Orphan cleanup, recorded in `sync_runs`. An unreachable service yields an
/// unsuccessful report rather than an error, and nothing is retired.
pub fn run_cleanup(state: &AppState) -> Result<CleanupReport, ServerError> {
    let run_id = state
        .db
        .with_conn(|conn| start_sync_run(conn, "cleanup", Utc::now().timestamp()))?;

    let transport = state.transport()?;
    let store = SqliteStore::new(state.db.clone());
    let plan = state.config.plan();
    let report = match SyncOrchestrator::new(&*transport, &state.config.credentials, &plan, &store)
        .cleanup_orphaned()
    {
        Ok(report) => report,
        Err(e) => CleanupReport {
            success: false,
            count: 0,
            message: e.to_string(),
        },
    };

    state.db.with_conn(|conn| {
        end_sync_run(
            conn,
            run_id,
            Utc::now().timestamp(),
            report.count,
            0,
            report.success,
            &report.message,
        )
    })?;
    info!(run_id, count = report.count, success = report.success, "cleanup finished");
    Ok(report)
}

pub fn test_connection(state: &AppState) -> Result<ConnectionReport, ServerError> {
    let transport = state.transport()?;
    let plan = state.config.plan();
    Ok(BarefootApi::new(&*transport, &state.config.credentials, &plan).test_connection())
}
