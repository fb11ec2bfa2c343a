// src/domain/property.rs

use crate::barefoot::NormalizedRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// Source field aliases per canonical field, highest priority first.
const EXTERNAL_ID: &[&str] = &[
    "PropertyID",
    "PropertyId",
    "propertyid",
    "ID",
    "id",
    "PropertyNumber",
    "addressid",
];
const NAME: &[&str] = &["Name", "name", "PropertyName", "PropertyTitle", "Title"];
const DESCRIPTION: &[&str] = &[
    "Description",
    "description",
    "PropertyDescription",
    "Desc",
    "LongDescription",
];
const CITY: &[&str] = &["City", "city", "PropertyCity", "CityName"];
const STATE: &[&str] = &["State", "state", "PropertyState", "StateCode"];
const ZIP: &[&str] = &["Zip", "zip", "ZipCode", "PostalCode"];
const OCCUPANCY: &[&str] = &["Occupancy", "occupancy", "MaxOccupancy", "Sleeps", "GuestCapacity"];
const BEDROOMS: &[&str] = &["Bedrooms", "bedrooms", "BedroomCount", "Beds", "NumBedrooms"];
const BATHROOMS: &[&str] = &["Bathrooms", "bathrooms", "BathroomCount", "Baths", "NumBathrooms"];
const MIN_PRICE: &[&str] = &["Minprice", "minprice", "MinPrice", "MinimumRate", "LowRate"];
const MAX_PRICE: &[&str] = &["Maxprice", "maxprice", "MaxPrice", "MaximumRate", "HighRate"];
const PROPERTY_TYPE: &[&str] = &["PropertyType", "propertytype", "UnitType", "unittype"];
const LATITUDE: &[&str] = &["Latitude", "latitude", "Lat"];
const LONGITUDE: &[&str] = &["Longitude", "longitude", "Lng", "Lon"];
const AMENITY_TEXT: &[&str] = &["PropertyAmenities", "Amenities", "amenities"];

/// Extra descriptive fields kept verbatim under a stable key.
const DETAIL_FIELDS: &[(&str, &[&str])] = &[
    ("address_id", &["addressid", "AddressID"]),
    ("keyboard_id", &["keyboardid", "KeyboardID"]),
    ("status", &["status", "Status"]),
    ("deadline", &["deadline"]),
    ("prop_address", &["propAddress"]),
    ("prop_address_new", &["propAddressNew"]),
    ("street", &["street", "Street"]),
    ("street2", &["street2", "Street2"]),
    ("country", &["country", "Country"]),
    ("region", &["Region", "region"]),
    ("ext_description", &["extdescription"]),
    ("internet_description", &["InternetDescription"]),
    ("video_link", &["VideoLink"]),
    ("image_path", &["imagepath"]),
    ("property_title", &["PropertyTitle"]),
    ("sleeps_beds", &["SleepsBeds"]),
    ("number_floors", &["NumberFloors"]),
    ("unit_type", &["UnitType"]),
    ("agent1", &["agent1"]),
    ("agent2", &["agent2"]),
    ("agent3", &["agent3"]),
    ("agent_name", &["a246"]),
    ("regist_number", &["Registnumber"]),
    ("regist_expire_date", &["Registexpirdate"]),
];

/// Boolean-ish feature columns some accounts expose.
pub const AMENITY_FLAG_FIELDS: &[&str] =
    &["Pool", "HotTub", "Internet", "Kitchen", "Parking", "PetsAllowed"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingRejected {
    #[error("Missing PropertyID field")]
    MissingExternalId,
}

/// A property projected onto our own schema, independent of which remote
/// method produced it. Built once per sync pass and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalProperty {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub occupancy: Option<u32>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub property_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub amenities_text: Option<String>,
    /// Names from [`AMENITY_FLAG_FIELDS`] whose value was truthy.
    pub amenity_flags: BTreeSet<String>,
    pub details: BTreeMap<String, String>,
    /// Numbered account-specific fields (`a7`, `a28`, ...), passed through as-is.
    pub vendor_fields: BTreeMap<String, String>,
}

fn first_alias<'a>(record: &'a NormalizedRecord, aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|a| record.get_non_empty(a))
}

fn text(record: &NormalizedRecord, aliases: &[&str]) -> Option<String> {
    first_alias(record, aliases).map(str::to_string)
}

/// Lenient number parsing: tolerates currency symbols and thousands separators.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn number(record: &NormalizedRecord, aliases: &[&str]) -> Option<f64> {
    first_alias(record, aliases).and_then(parse_number)
}

fn count(record: &NormalizedRecord, aliases: &[&str]) -> Option<u32> {
    number(record, aliases)
        .filter(|n| *n >= 0.0 && *n <= u32::MAX as f64)
        .map(|n| n.trunc() as u32)
}

/// One ASCII letter followed by at least one digit, e.g. `a246`.
pub fn is_vendor_field(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    let rest = chars.as_str();
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

pub fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    !matches!(v.as_str(), "" | "0" | "false" | "no" | "n" | "f")
}

impl CanonicalProperty {
    /// Projects a vendor record onto the canonical schema.
    ///
    /// A missing identifier rejects the record. A missing name does not: it is
    /// replaced with `"Property <id>"` so the record can still be stored.
    pub fn from_record(record: &NormalizedRecord) -> Result<Self, MappingRejected> {
        let external_id = text(record, EXTERNAL_ID).ok_or(MappingRejected::MissingExternalId)?;

        let name = text(record, NAME).unwrap_or_else(|| format!("Property {external_id}"));

        let amenity_flags = AMENITY_FLAG_FIELDS
            .iter()
            .filter(|f| record.get(f).is_some_and(is_truthy))
            .map(|f| f.to_string())
            .collect();

        let details = DETAIL_FIELDS
            .iter()
            .filter_map(|(key, aliases)| text(record, aliases).map(|v| (key.to_string(), v)))
            .collect();

        let vendor_fields = record
            .iter()
            .filter(|(k, v)| is_vendor_field(k) && !v.trim().is_empty())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(CanonicalProperty {
            external_id,
            name,
            description: text(record, DESCRIPTION),
            city: text(record, CITY),
            state: text(record, STATE),
            zip: text(record, ZIP),
            occupancy: count(record, OCCUPANCY),
            bedrooms: count(record, BEDROOMS),
            bathrooms: number(record, BATHROOMS),
            min_price: number(record, MIN_PRICE),
            max_price: number(record, MAX_PRICE),
            property_type: text(record, PROPERTY_TYPE),
            latitude: number(record, LATITUDE),
            longitude: number(record, LONGITUDE),
            amenities_text: text(record, AMENITY_TEXT),
            amenity_flags,
            details,
            vendor_fields,
        })
    }
}

/// Free-function form used by the sync pipeline.
pub fn map_record(record: &NormalizedRecord) -> Result<CanonicalProperty, MappingRejected> {
    CanonicalProperty::from_record(record)
}
