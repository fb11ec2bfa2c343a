// src/sync.rs
use crate::barefoot::{BarefootApi, CascadePlan, Credentials, NormalizedRecord, SoapTransport};
use crate::domain::{derive_tags, map_record, CanonicalProperty, MappingRejected};
use crate::errors::ServerError;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type EntityId = i64;
pub type MediaId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Inactive,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => EntityStatus::Inactive,
            _ => EntityStatus::Active,
        }
    }
}

/// What the store knows about an already-persisted property.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProperty {
    pub id: EntityId,
    pub external_id: String,
    pub name: String,
    pub status: EntityStatus,
}

/// A property ready to be written. `id` is set when updating an existing row.
#[derive(Debug, Clone)]
pub struct PropertyEntity {
    pub id: Option<EntityId>,
    pub property: CanonicalProperty,
    pub synced_at: NaiveDateTime,
}

/// Persistence port. Upserts are keyed by external id; nothing is ever deleted.
pub trait PropertyStore {
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<StoredProperty>, ServerError>;
    /// Writes every mapped field and marks the entity active.
    fn upsert(&self, entity: &PropertyEntity) -> Result<EntityId, ServerError>;
    /// Replaces all tags of `taxonomy` on the entity.
    fn set_tags(&self, id: EntityId, taxonomy: &str, tags: &[String]) -> Result<(), ServerError>;
    /// Returns `None` when `url` is already attached to the entity.
    fn attach_media(
        &self,
        id: EntityId,
        url: &str,
        caption: &str,
    ) -> Result<Option<MediaId>, ServerError>;
    fn set_featured_media(&self, id: EntityId, media: MediaId) -> Result<(), ServerError>;
    fn set_rates(
        &self,
        id: EntityId,
        rates_json: &str,
        synced_at: NaiveDateTime,
    ) -> Result<(), ServerError>;
    fn list_properties(&self) -> Result<Vec<StoredProperty>, ServerError>;
    fn set_status(&self, id: EntityId, status: EntityStatus) -> Result<(), ServerError>;
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Rejected(#[from] MappingRejected),
    #[error("Failed to save property: {0}")]
    Store(#[from] ServerError),
    #[error("Could not fetch properties from API: {0}")]
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub count: usize,
    pub errors: Vec<String>,
    pub message: String,
    pub method_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub success: bool,
    pub count: usize,
    pub message: String,
}

/// Drives one sync or cleanup pass: cascade fetch, mapping, upsert, tags,
/// then best-effort images and rates. Strictly sequential.
pub struct SyncOrchestrator<'a, T: SoapTransport + ?Sized, S: PropertyStore + ?Sized> {
    api: BarefootApi<'a, T>,
    store: &'a S,
}

impl<'a, T, S> SyncOrchestrator<'a, T, S>
where
    T: SoapTransport + ?Sized,
    S: PropertyStore + ?Sized,
{
    pub fn new(
        transport: &'a T,
        credentials: &'a Credentials,
        plan: &'a CascadePlan,
        store: &'a S,
    ) -> Self {
        Self {
            api: BarefootApi::new(transport, credentials, plan),
            store,
        }
    }

    pub fn sync_all(&self) -> SyncReport {
        let outcome = self.api.fetch_all_properties();

        // An empty result is still a successful sync; the message says whether
        // the account is empty or the service could not be reached.
        if outcome.records.is_empty() {
            let details = outcome.message.clone().unwrap_or_default();
            info!(method = %outcome.method_used, reachable = outcome.reachable(), %details, "no properties returned");
            return SyncReport {
                success: true,
                count: 0,
                errors: Vec::new(),
                message: details,
                method_used: outcome.method_used,
            };
        }

        let mut report = self.sync_records(&outcome.records);
        report.method_used = outcome.method_used;
        report
    }

    /// Syncs every record; one record's failure never stops the batch.
    pub fn sync_records(&self, records: &[NormalizedRecord]) -> SyncReport {
        let mut count = 0;
        let mut errors = Vec::new();

        for record in records {
            match self.sync_one(record) {
                Ok(id) => {
                    debug!(entity_id = id, "property synced");
                    count += 1;
                }
                Err(e) => {
                    warn!(error = %e, "property sync failed");
                    errors.push(format!("Property sync failed: {e}"));
                }
            }
        }

        let mut message = format!("Successfully synced {count} properties");
        if !errors.is_empty() {
            message.push_str(&format!(" ({} errors occurred)", errors.len()));
        }
        info!(count, errors = errors.len(), "sync finished");

        SyncReport {
            success: true,
            count,
            errors,
            message,
            method_used: String::new(),
        }
    }

    pub fn sync_one(&self, record: &NormalizedRecord) -> Result<EntityId, SyncError> {
        let property = map_record(record)?;
        let external_id = property.external_id.clone();

        let existing = self.store.find_by_external_id(&external_id)?;
        let entity = PropertyEntity {
            id: existing.map(|e| e.id),
            property,
            synced_at: Utc::now().naive_utc(),
        };
        let id = self.store.upsert(&entity)?;

        self.sync_tags(id, &entity.property);
        self.sync_images(id, &external_id);
        self.sync_rates(id, &external_id);
        Ok(id)
    }

    /// Best effort, like images and rates: the row is already saved.
    fn sync_tags(&self, id: EntityId, property: &CanonicalProperty) {
        let tags = derive_tags(property);
        for (taxonomy, values) in tags.by_taxonomy() {
            if let Err(e) = self.store.set_tags(id, taxonomy, values) {
                warn!(external_id = %property.external_id, taxonomy, error = %e, "tag update failed");
            }
        }
    }

    /// Best effort: failures are logged and the property still counts as synced.
    fn sync_images(&self, id: EntityId, external_id: &str) {
        let images = match self.api.property_images(external_id) {
            Ok(images) => images,
            Err(e) => {
                warn!(external_id, error = %e, "image fetch failed");
                return;
            }
        };
        if images.is_empty() {
            debug!(external_id, "no images found");
            return;
        }

        let mut featured_set = false;
        let mut attached = 0;
        for image in &images {
            let caption = if image.description.is_empty() {
                "Property Image"
            } else {
                image.description.as_str()
            };
            match self.store.attach_media(id, &image.image_url, caption) {
                Ok(Some(media)) => {
                    attached += 1;
                    if !featured_set {
                        if let Err(e) = self.store.set_featured_media(id, media) {
                            warn!(external_id, error = %e, "could not set featured image");
                        }
                        featured_set = true;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(external_id, url = %image.image_url, error = %e, "image attach failed"),
            }
        }
        info!(external_id, attached, "images synced");
    }

    fn sync_rates(&self, id: EntityId, external_id: &str) {
        let rates = match self.api.property_rates(external_id, None, None) {
            Ok(Some(rates)) => rates,
            Ok(None) => return,
            Err(e) => {
                warn!(external_id, error = %e, "rate fetch failed");
                return;
            }
        };
        let stored = serde_json::to_string(&rates)
            .map_err(ServerError::from)
            .and_then(|json| self.store.set_rates(id, &json, Utc::now().naive_utc()));
        if let Err(e) = stored {
            warn!(external_id, error = %e, "rate store failed");
        }
    }

    /// Marks inactive every active entity whose external id the service no
    /// longer returns. Refuses to run when no remote call succeeded, so a dead
    /// link never retires the whole catalogue.
    pub fn cleanup_orphaned(&self) -> Result<CleanupReport, SyncError> {
        let outcome = self.api.fetch_all_properties();
        if !outcome.reachable() {
            let reason = outcome
                .last_error
                .unwrap_or_else(|| "no remote call succeeded".to_string());
            return Err(SyncError::Unreachable(reason));
        }

        let remote_ids: HashSet<String> = outcome
            .records
            .iter()
            .filter_map(|r| map_record(r).ok())
            .map(|p| p.external_id)
            .collect();

        let mut count = 0;
        for stored in self.store.list_properties()? {
            if stored.status == EntityStatus::Active && !remote_ids.contains(&stored.external_id) {
                info!(external_id = %stored.external_id, "retiring orphaned property");
                self.store.set_status(stored.id, EntityStatus::Inactive)?;
                count += 1;
            }
        }

        Ok(CleanupReport {
            success: true,
            count,
            message: format!("Moved {count} orphaned properties to inactive status"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barefoot::{RawRemoteResult, RemoteObject, TransportError};
    use crate::db::connection::Database;
    use crate::db::store::SqliteStore;
    use crate::tests::fake_transport::ScriptedTransport;
    use crate::tests::utils::init_test_db;

    fn credentials() -> Credentials {
        Credentials {
            endpoint: "http://localhost/svc.asmx".into(),
            username: "u".into(),
            password: "p".into(),
            account: "a".into(),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> NormalizedRecord {
        pairs.iter().copied().collect()
    }

    fn container(records: &[&[(&str, &str)]]) -> RawRemoteResult {
        let mut props = RemoteObject::default();
        for fields in records {
            let mut entry = RemoteObject::default();
            for (k, v) in *fields {
                entry = entry.with_text(*k, *v);
            }
            props = props.with_object("PROPERTY", entry);
        }
        RawRemoteResult::Object(RemoteObject::default().with_object("PROPERTIES", props))
    }

    /// Store wrapper that fails upserts for one external id, and optionally every tag write.
    struct FlakyStore {
        inner: SqliteStore,
        fail_for: &'static str,
        fail_tags: bool,
    }

    impl PropertyStore for FlakyStore {
        fn find_by_external_id(&self, external_id: &str) -> Result<Option<StoredProperty>, ServerError> {
            self.inner.find_by_external_id(external_id)
        }
        fn upsert(&self, entity: &PropertyEntity) -> Result<EntityId, ServerError> {
            if entity.property.external_id == self.fail_for {
                return Err(ServerError::DbError("disk full".into()));
            }
            self.inner.upsert(entity)
        }
        fn set_tags(&self, id: EntityId, taxonomy: &str, tags: &[String]) -> Result<(), ServerError> {
            if self.fail_tags {
                return Err(ServerError::DbError("tags table locked".into()));
            }
            self.inner.set_tags(id, taxonomy, tags)
        }
        fn attach_media(&self, id: EntityId, url: &str, caption: &str) -> Result<Option<MediaId>, ServerError> {
            self.inner.attach_media(id, url, caption)
        }
        fn set_featured_media(&self, id: EntityId, media: MediaId) -> Result<(), ServerError> {
            self.inner.set_featured_media(id, media)
        }
        fn set_rates(&self, id: EntityId, rates_json: &str, at: NaiveDateTime) -> Result<(), ServerError> {
            self.inner.set_rates(id, rates_json, at)
        }
        fn list_properties(&self) -> Result<Vec<StoredProperty>, ServerError> {
            self.inner.list_properties()
        }
        fn set_status(&self, id: EntityId, status: EntityStatus) -> Result<(), ServerError> {
            self.inner.set_status(id, status)
        }
    }

    fn store() -> (tempfile::TempDir, Database, SqliteStore) {
        let (dir, db) = init_test_db();
        let store = SqliteStore::new(db.clone());
        (dir, db, store)
    }

    #[test]
    fn rejected_record_does_not_abort_batch() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new();
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_records(&[
            record(&[("PropertyID", "1"), ("Name", "One")]),
            record(&[("Name", "No id")]),
            record(&[("PropertyID", "3"), ("Name", "Three")]),
        ]);

        assert!(report.success);
        assert_eq!(report.count, 2);
        assert_eq!(report.errors, vec!["Property sync failed: Missing PropertyID field".to_string()]);
        assert!(store.find_by_external_id("1").unwrap().is_some());
        assert!(store.find_by_external_id("3").unwrap().is_some());
        assert_eq!(store.list_properties().unwrap().len(), 2);
    }

    #[test]
    fn upsert_failure_is_recorded_and_skipped() {
        let (_dir, _db, inner) = store();
        let store = FlakyStore {
            inner,
            fail_for: "2",
            fail_tags: false,
        };
        let transport = ScriptedTransport::new();
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_records(&[
            record(&[("PropertyID", "1")]),
            record(&[("PropertyID", "2")]),
            record(&[("PropertyID", "3")]),
        ]);

        assert_eq!(report.count, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("disk full"));
        assert_eq!(report.message, "Successfully synced 2 properties (1 errors occurred)");
    }

    #[test]
    fn second_sync_updates_instead_of_inserting() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new();
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let first = sync.sync_one(&record(&[("PropertyID", "5"), ("Name", "Old")])).unwrap();
        let second = sync.sync_one(&record(&[("PropertyID", "5"), ("Name", "New")])).unwrap();

        assert_eq!(first, second);
        let stored = store.find_by_external_id("5").unwrap().unwrap();
        assert_eq!(stored.name, "New");
        assert_eq!(store.list_properties().unwrap().len(), 1);
    }

    #[test]
    fn sync_all_attaches_tags_images_and_rates() {
        let (_dir, _db, store) = store();
        let images = "<Property>\
            <PropertyImg><propertyId>9068</propertyId><imageNo>2</imageNo><imagepath>http://img/b.jpg</imagepath><imageDesc>Deck</imageDesc></PropertyImg>\
            <PropertyImg><propertyId>9068</propertyId><imageNo>1</imageNo><imagepath>http://img/a.jpg</imagepath><imageDesc/></PropertyImg>\
            </Property>";
        let transport = ScriptedTransport::new()
            .respond(
                "GetAllProperty",
                Ok(container(&[&[
                    ("PropertyID", "9068"),
                    ("Name", "Atlantic Ave 104"),
                    ("City", "Wildwood"),
                    ("State", "NJ"),
                    ("Occupancy", "6"),
                    ("PropertyType", "Condo"),
                    ("PropertyAmenities", "Pool, WiFi"),
                ]])),
            )
            .respond("GetPropertyAllImgs", Ok(RawRemoteResult::Text(images.into())))
            .respond(
                "GetPropertyRates",
                Ok(RawRemoteResult::Object(RemoteObject::default().with_text("Rate", "199"))),
            );
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_all();

        assert!(report.success);
        assert_eq!(report.count, 1);
        assert_eq!(report.method_used, "GetAllProperty");

        let id = store.find_by_external_id("9068").unwrap().unwrap().id;
        assert_eq!(store.tags_for(id, "location").unwrap(), vec!["Wildwood, NJ"]);
        assert_eq!(store.tags_for(id, "property_type").unwrap(), vec!["Condo"]);
        assert_eq!(
            store.tags_for(id, "amenity").unwrap(),
            vec!["Family Friendly", "Pool", "WiFi"]
        );

        let media = store.media_for(id).unwrap();
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].url, "http://img/a.jpg");
        assert!(media[0].is_featured);
        assert_eq!(media[0].caption, "Property Image");
        assert!(!media[1].is_featured);

        assert_eq!(store.rates_for(id).unwrap().as_deref(), Some(r#"{"fields":[["Rate","199"]]}"#));
    }

    #[test]
    fn image_failures_do_not_fail_the_property() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new().respond(
            "GetPropertyAllImgs",
            Err(TransportError::Timeout("30s".into())),
        );
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_records(&[record(&[("PropertyID", "1")])]);

        assert_eq!(report.count, 1);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn tag_failures_keep_the_property_and_its_images() {
        let (_dir, _db, inner) = store();
        let store = FlakyStore {
            inner,
            fail_for: "",
            fail_tags: true,
        };
        let images = "<Property><PropertyImg><imageNo>1</imageNo>\
            <imagepath>http://img/a.jpg</imagepath></PropertyImg></Property>";
        let transport = ScriptedTransport::new()
            .respond("GetPropertyAllImgs", Ok(RawRemoteResult::Text(images.into())))
            .respond(
                "GetPropertyRates",
                Ok(RawRemoteResult::Object(RemoteObject::default().with_text("Rate", "150"))),
            );
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_records(&[record(&[
            ("PropertyID", "7"),
            ("City", "Cape May"),
            ("State", "NJ"),
        ])]);

        assert_eq!(report.count, 1);
        assert!(report.errors.is_empty());
        let id = store.inner.find_by_external_id("7").unwrap().unwrap().id;
        assert!(store.inner.tags_for(id, "location").unwrap().is_empty());
        assert_eq!(store.inner.media_for(id).unwrap().len(), 1);
        assert!(store.inner.rates_for(id).unwrap().is_some());
    }

    #[test]
    fn empty_but_reachable_account_is_success() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new().respond(
            "GetAllProperty",
            Ok(RawRemoteResult::Object(
                RemoteObject::default().with_text("Message", "This is a Custom method"),
            )),
        );
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_all();

        assert!(report.success);
        assert_eq!(report.count, 0);
        assert!(report.message.starts_with("API connection successful but no properties found"));
    }

    #[test]
    fn unreachable_service_reports_transport_failure_in_message() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new();
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);

        let report = sync.sync_all();

        assert!(report.success);
        assert_eq!(report.count, 0);
        assert_eq!(report.method_used, "Multiple methods attempted");
        assert!(report.message.starts_with("No remote call succeeded"));
    }

    #[test]
    fn cleanup_retires_only_missing_properties() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new()
            .respond("GetAllProperty", Ok(container(&[&[("PropertyID", "1")], &[("PropertyID", "3")]])));
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);
        for id in ["1", "2", "3"] {
            sync.sync_one(&record(&[("PropertyID", id)])).unwrap();
        }

        let report = sync.cleanup_orphaned().unwrap();

        assert_eq!(report.count, 1);
        assert_eq!(report.message, "Moved 1 orphaned properties to inactive status");
        let status = |id: &str| store.find_by_external_id(id).unwrap().unwrap().status;
        assert_eq!(status("1"), EntityStatus::Active);
        assert_eq!(status("2"), EntityStatus::Inactive);
        assert_eq!(status("3"), EntityStatus::Active);
    }

    #[test]
    fn cleanup_refuses_when_unreachable() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new();
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);
        sync.sync_one(&record(&[("PropertyID", "1")])).unwrap();

        let err = sync.cleanup_orphaned().unwrap_err();

        assert!(matches!(err, SyncError::Unreachable(_)));
        assert_eq!(
            store.find_by_external_id("1").unwrap().unwrap().status,
            EntityStatus::Active
        );
    }

    #[test]
    fn resync_reactivates_retired_property() {
        let (_dir, _db, store) = store();
        let transport = ScriptedTransport::new();
        let creds = credentials();
        let plan = CascadePlan::default();
        let sync = SyncOrchestrator::new(&transport, &creds, &plan, &store);
        let id = sync.sync_one(&record(&[("PropertyID", "1")])).unwrap();
        store.set_status(id, EntityStatus::Inactive).unwrap();

        sync.sync_one(&record(&[("PropertyID", "1")])).unwrap();

        assert_eq!(
            store.find_by_external_id("1").unwrap().unwrap().status,
            EntityStatus::Active
        );
    }
}
