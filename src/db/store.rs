// src/db/store.rs
use crate::db::connection::Database;
use crate::domain::CanonicalProperty;
use crate::errors::ServerError;
use crate::sync::{
    EntityId, EntityStatus, MediaId, PropertyEntity, PropertyStore, StoredProperty,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A media row as persisted.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub id: MediaId,
    pub url: String,
    pub caption: String,
    pub is_featured: bool,
}

/// SQLite-backed [`PropertyStore`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[cfg(test)]
impl SqliteStore {
    pub fn tags_for(&self, id: EntityId, taxonomy: &str) -> Result<Vec<String>, ServerError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tag FROM property_tags WHERE property_id = ?1 AND taxonomy = ?2 ORDER BY tag",
            )?;
            let rows = stmt.query_map(params![id, taxonomy], |row| row.get(0))?;
            rows.collect::<Result<Vec<String>, _>>()
                .map_err(ServerError::from)
        })
    }

    pub fn media_for(&self, id: EntityId) -> Result<Vec<StoredMedia>, ServerError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, caption, is_featured FROM property_media WHERE property_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok(StoredMedia {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    caption: row.get(2)?,
                    is_featured: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(ServerError::from)
        })
    }

    pub fn rates_for(&self, id: EntityId) -> Result<Option<String>, ServerError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT rates_json FROM properties WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(ServerError::from)
        })
    }
}

fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredProperty> {
    let status: String = row.get(3)?;
    Ok(StoredProperty {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        status: EntityStatus::parse(&status),
    })
}

fn insert_property(
    conn: &Connection,
    prop: &CanonicalProperty,
    now: NaiveDateTime,
) -> Result<EntityId, ServerError> {
    conn.execute(
        r#"
        INSERT INTO properties (
            external_id, name, description, city, state, zip, occupancy, bedrooms,
            bathrooms, min_price, max_price, property_type, latitude, longitude,
            amenities_text, details_json, vendor_fields_json, status,
            first_synced_at, last_synced_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, 'active', ?18, ?18)
        "#,
        params![
            prop.external_id,
            prop.name,
            prop.description,
            prop.city,
            prop.state,
            prop.zip,
            prop.occupancy,
            prop.bedrooms,
            prop.bathrooms,
            prop.min_price,
            prop.max_price,
            prop.property_type,
            prop.latitude,
            prop.longitude,
            prop.amenities_text,
            serde_json::to_string(&prop.details)?,
            serde_json::to_string(&prop.vendor_fields)?,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Full overwrite of every mapped column. Also brings a retired row back to active.
fn update_property(
    conn: &Connection,
    id: EntityId,
    prop: &CanonicalProperty,
    now: NaiveDateTime,
) -> Result<(), ServerError> {
    let changed = conn.execute(
        r#"
        UPDATE properties SET
            external_id = ?2, name = ?3, description = ?4, city = ?5, state = ?6, zip = ?7,
            occupancy = ?8, bedrooms = ?9, bathrooms = ?10, min_price = ?11, max_price = ?12,
            property_type = ?13, latitude = ?14, longitude = ?15, amenities_text = ?16,
            details_json = ?17, vendor_fields_json = ?18, status = 'active', last_synced_at = ?19
        WHERE id = ?1
        "#,
        params![
            id,
            prop.external_id,
            prop.name,
            prop.description,
            prop.city,
            prop.state,
            prop.zip,
            prop.occupancy,
            prop.bedrooms,
            prop.bathrooms,
            prop.min_price,
            prop.max_price,
            prop.property_type,
            prop.latitude,
            prop.longitude,
            prop.amenities_text,
            serde_json::to_string(&prop.details)?,
            serde_json::to_string(&prop.vendor_fields)?,
            now,
        ],
    )?;
    if changed == 0 {
        return Err(ServerError::NotFound);
    }
    Ok(())
}

impl PropertyStore for SqliteStore {
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<StoredProperty>, ServerError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, external_id, name, status FROM properties WHERE external_id = ?1",
                params![external_id],
                stored_from_row,
            )
            .optional()
            .map_err(ServerError::from)
        })
    }

    fn upsert(&self, entity: &PropertyEntity) -> Result<EntityId, ServerError> {
        self.db.with_conn(|conn| match entity.id {
            Some(id) => {
                update_property(conn, id, &entity.property, entity.synced_at)?;
                Ok(id)
            }
            None => insert_property(conn, &entity.property, entity.synced_at),
        })
    }

    fn set_tags(&self, id: EntityId, taxonomy: &str, tags: &[String]) -> Result<(), ServerError> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM property_tags WHERE property_id = ?1 AND taxonomy = ?2",
                params![id, taxonomy],
            )?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO property_tags (property_id, taxonomy, tag) VALUES (?1, ?2, ?3)",
                    params![id, taxonomy, tag],
                )?;
            }
            tx.commit().map_err(ServerError::from)
        })
    }

    fn attach_media(
        &self,
        id: EntityId,
        url: &str,
        caption: &str,
    ) -> Result<Option<MediaId>, ServerError> {
        self.db.with_conn(|conn| {
            let existing: Option<MediaId> = conn
                .query_row(
                    "SELECT id FROM property_media WHERE property_id = ?1 AND url = ?2",
                    params![id, url],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO property_media (property_id, url, caption) VALUES (?1, ?2, ?3)",
                params![id, url, caption],
            )?;
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    fn set_featured_media(&self, id: EntityId, media: MediaId) -> Result<(), ServerError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE property_media SET is_featured = (id = ?2) WHERE property_id = ?1",
                params![id, media],
            )?;
            Ok(())
        })
    }

    fn set_rates(
        &self,
        id: EntityId,
        rates_json: &str,
        synced_at: NaiveDateTime,
    ) -> Result<(), ServerError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE properties SET rates_json = ?2, rates_synced_at = ?3 WHERE id = ?1",
                params![id, rates_json, synced_at],
            )?;
            Ok(())
        })
    }

    fn list_properties(&self) -> Result<Vec<StoredProperty>, ServerError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, external_id, name, status FROM properties ORDER BY id")?;
            let rows = stmt.query_map([], stored_from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(ServerError::from)
        })
    }

    fn set_status(&self, id: EntityId, status: EntityStatus) -> Result<(), ServerError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE properties SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
            Ok(())
        })
    }
}
