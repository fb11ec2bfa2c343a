// cascade.rs
use crate::barefoot::models::{
    Credentials, NormalizedRecord, Params, RawRemoteResult, RemoteValue,
};
use crate::barefoot::normalize::{dedup_by_identifier, normalize};
use crate::barefoot::transport::SoapTransport;
use crate::xml;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const EMPTY_ACCOUNT_MESSAGE: &str = "API connection successful but no properties found. \
Account may not have properties configured or may require additional permissions.";

/// One remote method to try, with any parameters it needs beyond credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCandidate {
    pub method: String,
    pub extra_params: Vec<(String, String)>,
}

impl MethodCandidate {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            extra_params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }

    fn params(&self, credentials: &Credentials) -> Params {
        self.extra_params
            .iter()
            .fold(credentials.auth_params(), |p, (k, v)| p.with(k, v))
    }
}

/// A per-ID method and the name of its ID parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailCandidate {
    pub method: String,
    pub id_param: String,
}

impl DetailCandidate {
    pub fn new(method: impl Into<String>, id_param: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            id_param: id_param.into(),
        }
    }
}

/// Last-resort enumeration of IDs `1..=max_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdProbe {
    pub lookup: DetailCandidate,
    pub max_id: u32,
    pub max_results: usize,
    /// Substring of the lookup payload meaning "this ID exists".
    pub exists_marker: String,
    pub details: Vec<DetailCandidate>,
}

/// Which remote methods to try and in what order. The method names were found
/// by probing one account; treat them as configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    /// First candidate that yields records wins.
    pub bulk: Vec<MethodCandidate>,
    /// All are called; results are merged and deduplicated.
    pub alternatives: Vec<MethodCandidate>,
    pub probe: IdProbe,
}

impl Default for CascadePlan {
    fn default() -> Self {
        Self {
            bulk: vec![MethodCandidate::new("GetAllProperty")],
            alternatives: vec![
                MethodCandidate::new("GetProperty"),
                MethodCandidate::new("GetPropertyExt"),
                MethodCandidate::new("GetLastUpdatedProperty"),
            ],
            probe: IdProbe {
                lookup: DetailCandidate::new("GetPropertyInfoById", "addressid"),
                max_id: 20,
                max_results: 10,
                exists_marker: "<Success>true</Success>".into(),
                details: vec![
                    DetailCandidate::new("GetPropertyInfoById", "addressid"),
                    DetailCandidate::new("GetPropertyAndOwnerById", "addressid"),
                ],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub records: Vec<NormalizedRecord>,
    pub method_used: String,
    pub message: Option<String>,
    pub calls_attempted: usize,
    pub calls_failed: usize,
    pub last_error: Option<String>,
}

impl FetchOutcome {
    /// At least one remote call came back without a transport error.
    pub fn reachable(&self) -> bool {
        self.calls_failed < self.calls_attempted
    }
}

pub struct CascadeResolver<'a, T: SoapTransport + ?Sized> {
    transport: &'a T,
    credentials: &'a Credentials,
    plan: &'a CascadePlan,
    attempted: usize,
    failed: usize,
    last_error: Option<String>,
}

impl<'a, T: SoapTransport + ?Sized> CascadeResolver<'a, T> {
    pub fn new(transport: &'a T, credentials: &'a Credentials, plan: &'a CascadePlan) -> Self {
        Self {
            transport,
            credentials,
            plan,
            attempted: 0,
            failed: 0,
            last_error: None,
        }
    }

    /// Runs the whole cascade. Always returns; an empty record list is a
    /// valid outcome and `reachable()` tells an empty account from a dead link.
    pub fn fetch_all_properties(mut self) -> FetchOutcome {
        let plan = self.plan;
        info!(account = %self.credentials.account, "fetching all properties");

        for candidate in &plan.bulk {
            let Some(result) = self.call(&candidate.method, &candidate.params(self.credentials))
            else {
                continue;
            };
            let records = normalize(&result);
            if !records.is_empty() {
                info!(method = %candidate.method, count = records.len(), "bulk method returned records");
                return self.finish(records, &candidate.method, None);
            }
            debug!(method = %candidate.method, "bulk method returned no records");
        }

        let mut merged = Vec::new();
        for candidate in &plan.alternatives {
            let Some(result) = self.call(&candidate.method, &candidate.params(self.credentials))
            else {
                continue;
            };
            let records = normalize(&result);
            if !records.is_empty() {
                info!(method = %candidate.method, count = records.len(), "alternative method returned records");
                merged.extend(records);
            }
        }
        if !merged.is_empty() {
            return self.finish(dedup_by_identifier(merged), "Alternative methods", None);
        }

        let probed = self.probe_ids();
        if !probed.is_empty() {
            return self.finish(dedup_by_identifier(probed), "Property ID probe", None);
        }

        let message = if self.attempted > self.failed {
            EMPTY_ACCOUNT_MESSAGE.to_string()
        } else {
            format!(
                "No remote call succeeded. Last error: {}",
                self.last_error.as_deref().unwrap_or("none")
            )
        };
        warn!(%message, "cascade found no properties");
        self.finish(Vec::new(), "Multiple methods attempted", Some(message))
    }

    fn finish(
        self,
        records: Vec<NormalizedRecord>,
        method_used: &str,
        message: Option<String>,
    ) -> FetchOutcome {
        FetchOutcome {
            records,
            method_used: method_used.to_string(),
            message,
            calls_attempted: self.attempted,
            calls_failed: self.failed,
            last_error: self.last_error,
        }
    }

    fn call(&mut self, method: &str, params: &Params) -> Option<RawRemoteResult> {
        self.attempted += 1;
        match self.transport.invoke(method, params) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(method, error = %e, "candidate failed, trying next");
                self.failed += 1;
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    fn probe_ids(&mut self) -> Vec<NormalizedRecord> {
        let plan = self.plan;
        let probe = &plan.probe;
        let mut accepted = Vec::new();

        for id in 1..=probe.max_id {
            if accepted.len() >= probe.max_results {
                break;
            }
            let id = id.to_string();
            let params = self
                .credentials
                .auth_params()
                .with(&probe.lookup.id_param, &id);
            let Some(result) = self.call(&probe.lookup.method, &params) else {
                continue;
            };
            let Some(seed) = probe_hit(&result, &probe.exists_marker) else {
                continue;
            };
            info!(id = %id, "probe found existing property");

            let fields = self.fetch_detail(&id).unwrap_or(seed);
            accepted.push(seeded_record(&id, fields));
        }

        accepted
    }

    fn fetch_detail(&mut self, id: &str) -> Option<NormalizedRecord> {
        let plan = self.plan;
        for detail in &plan.probe.details {
            let params = self.credentials.auth_params().with(&detail.id_param, id);
            let Some(result) = self.call(&detail.method, &params) else {
                continue;
            };
            let Some(record) = raw_payload(&result).and_then(root_fields) else {
                continue;
            };
            if record.iter().any(|(k, _)| !is_status_field(k)) {
                debug!(method = %detail.method, id, "detail record found");
                return Some(record);
            }
        }
        None
    }
}

fn is_status_field(name: &str) -> bool {
    name == "Success" || name == "Msg"
}

/// Markup payload of a lookup or detail result.
fn raw_payload(result: &RawRemoteResult) -> Option<&str> {
    match result {
        RawRemoteResult::Text(text) => Some(text.as_str()),
        RawRemoteResult::Object(obj) => obj.text_field("any"),
    }
}

/// Child element text of the payload's root element, whatever the root is called.
fn root_fields(payload: &str) -> Option<NormalizedRecord> {
    match xml::parse(payload) {
        Ok(root) => Some(
            root.children
                .iter()
                .map(|c| (c.name.clone(), c.text.clone()))
                .collect(),
        ),
        Err(e) => {
            debug!(error = %e, "detail payload is not parseable XML");
            None
        }
    }
}

/// Fields carried by a positive lookup response, or `None` when the ID does not exist.
fn probe_hit(result: &RawRemoteResult, exists_marker: &str) -> Option<NormalizedRecord> {
    if let Some(payload) = raw_payload(result) {
        if !payload.contains(exists_marker) {
            return None;
        }
        return Some(root_fields(payload).unwrap_or_default());
    }

    // Lookup results that arrive as a plain object tree.
    match result {
        RawRemoteResult::Object(obj) if obj.text_field("Success") == Some("true") => Some(
            obj.fields
                .iter()
                .filter_map(|(k, v)| match v {
                    RemoteValue::Text(t) => Some((k.clone(), t.clone())),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Placeholder identity for a probed ID, overlaid with whatever fields the
/// detail call (or, failing that, the lookup payload) returned.
fn seeded_record(id: &str, lookup_fields: NormalizedRecord) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    record.insert("PropertyID", id);
    record.insert("Name", format!("Property {id}"));
    record.insert("Description", format!("Property retrieved by ID {id}"));
    for (k, v) in lookup_fields.iter() {
        if !is_status_field(k) {
            record.insert(k, v);
        }
    }
    record
}
