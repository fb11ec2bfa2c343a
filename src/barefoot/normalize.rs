// normalize.rs
use crate::barefoot::models::{
    NormalizedRecord, PropertyImage, RawRemoteResult, RemoteObject, RemoteValue,
};
use crate::xml::{self, XmlElement};
use std::collections::HashSet;
use tracing::debug;

/// Text the service puts in `Message` when a method is not enabled for the account.
pub const CUSTOM_METHOD_SENTINEL: &str = "Custom method";

/// Identifier fields used for deduplication, in priority order.
const DEDUP_ID_FIELDS: [&str; 3] = ["PropertyID", "PropertyId", "ID"];

/// Element name matchers for property nodes inside an XML payload, in priority order.
const PROPERTY_MATCHERS: [fn(&str) -> bool; 3] =
    [is_property_tag, is_lowercase_property_tag, mentions_property];

fn is_property_tag(name: &str) -> bool {
    name == "Property"
}

fn is_lowercase_property_tag(name: &str) -> bool {
    name == "property"
}

fn mentions_property(name: &str) -> bool {
    name.contains("Property")
}

pub fn is_custom_method_sentinel(message: &str) -> bool {
    message.contains(CUSTOM_METHOD_SENTINEL)
}

/// Turns any result shape into a list of property records.
///
/// Never fails: shapes that cannot be read yield an empty list. Dispatch order
/// is `PROPERTIES/PROPERTY` container, `any` XML payload, `Message` sentinel,
/// then plain text parsed as XML.
pub fn normalize(result: &RawRemoteResult) -> Vec<NormalizedRecord> {
    match result {
        RawRemoteResult::Object(obj) => normalize_object(obj),
        RawRemoteResult::Text(text) => {
            if is_custom_method_sentinel(text) {
                debug!("plain-text result is the custom method sentinel");
                return Vec::new();
            }
            parse_xml_records(text)
        }
    }
}

fn normalize_object(obj: &RemoteObject) -> Vec<NormalizedRecord> {
    if let Some(container) = obj.object_field("PROPERTIES") {
        let entries: Vec<&RemoteObject> = container
            .fields_named("PROPERTY")
            .filter_map(|v| match v {
                RemoteValue::Object(o) => Some(o),
                RemoteValue::Text(_) => None,
            })
            .collect();
        if !entries.is_empty() {
            debug!(count = entries.len(), "records found in PROPERTIES container");
            return entries.into_iter().map(flatten_object).collect();
        }
    }

    if let Some(any) = obj.text_field("any").filter(|s| !s.trim().is_empty()) {
        let records = parse_xml_records(any);
        debug!(count = records.len(), "records found in any payload");
        return records;
    }

    if let Some(message) = obj.text_field("Message") {
        if is_custom_method_sentinel(message) {
            debug!(message, "custom method sentinel, no data via this method");
        } else {
            debug!(message, "result carried a message and no data");
        }
    }

    Vec::new()
}

/// Attributes first, then leaf children. Nested objects carry no scalar value and are skipped.
fn flatten_object(obj: &RemoteObject) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    for (k, v) in &obj.attributes {
        record.insert(k.as_str(), v.as_str());
    }
    for (k, v) in &obj.fields {
        if let RemoteValue::Text(t) = v {
            record.insert(k.as_str(), t.as_str());
        }
    }
    record
}

/// Parses `xml_text` and emits one record per property element, using the
/// first matcher in [`PROPERTY_MATCHERS`] that finds anything.
pub fn parse_xml_records(xml_text: &str) -> Vec<NormalizedRecord> {
    let root = match xml::parse(xml_text) {
        Ok(root) => root,
        Err(e) => {
            debug!(error = %e, "payload is not parseable XML");
            return Vec::new();
        }
    };

    let nodes = root.descendants();
    for matcher in PROPERTY_MATCHERS {
        let found: Vec<NormalizedRecord> = nodes
            .iter()
            .filter(|el| matcher(&el.name))
            .map(|el| element_record(el))
            .collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

/// Attributes and child element text of one element. Later duplicates of a
/// child name overwrite earlier ones.
pub fn element_record(el: &XmlElement) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    for (k, v) in &el.attributes {
        record.insert(k.as_str(), v.as_str());
    }
    for child in &el.children {
        record.insert(child.name.as_str(), child.text.as_str());
    }
    record
}

fn dedup_key(record: &NormalizedRecord) -> Option<&str> {
    DEDUP_ID_FIELDS
        .iter()
        .find_map(|f| record.get_non_empty(f))
}

/// Drops later records whose identifier was already seen. Records with no
/// identifier under any dedup field are kept; the field mapper decides on them.
pub fn dedup_by_identifier(records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        match dedup_key(&record) {
            Some(id) => {
                if seen.insert(id.to_string()) {
                    out.push(record);
                } else {
                    debug!(id, "dropping duplicate record");
                }
            }
            None => out.push(record),
        }
    }
    out
}

// --- images ---

const IMAGE_NODE_NAMES: [&str; 2] = ["PropertyImg", "ImageInfo"];
const IMAGE_PROPERTY_ID: [&str; 3] = ["propertyId", "PropertyId", "PropertyID"];
const IMAGE_NO: [&str; 2] = ["imageNo", "ImageNo"];
const IMAGE_URL: [&str; 4] = ["imagepath", "ImagePath", "ImageUrl", "imageUrl"];
const IMAGE_DESC: [&str; 3] = ["imageDesc", "ImageDesc", "Description"];

/// Images from a `GetPropertyAllImgs` result, sorted by image number.
/// Entries without a URL are dropped.
pub fn normalize_images(result: &RawRemoteResult) -> Vec<PropertyImage> {
    let mut images = match result {
        RawRemoteResult::Text(text) => images_from_xml(text),
        RawRemoteResult::Object(obj) => match obj.text_field("any") {
            Some(any) if !any.trim().is_empty() => images_from_xml(any),
            _ => {
                let mut found = Vec::new();
                collect_image_objects(obj, &mut found);
                found
                    .into_iter()
                    .map(|o| image_from_record(&flatten_object(o)))
                    .collect()
            }
        },
    };

    images.retain(|img| !img.image_url.is_empty());
    images.sort_by_key(|img| img.image_no);
    images
}

fn images_from_xml(xml_text: &str) -> Vec<PropertyImage> {
    let root = match xml::parse(xml_text) {
        Ok(root) => root,
        Err(e) => {
            debug!(error = %e, "image payload is not parseable XML");
            return Vec::new();
        }
    };

    // <string> results sometimes carry the payload escaped a second time.
    if root.is_leaf() && root.text.starts_with('<') {
        return images_from_xml(&root.text);
    }

    root.descendants()
        .into_iter()
        .filter(|el| IMAGE_NODE_NAMES.contains(&el.name.as_str()))
        .map(|el| image_from_record(&element_record(el)))
        .collect()
}

fn collect_image_objects<'a>(obj: &'a RemoteObject, out: &mut Vec<&'a RemoteObject>) {
    for (name, value) in &obj.fields {
        if let RemoteValue::Object(child) = value {
            if IMAGE_NODE_NAMES.contains(&name.as_str()) {
                out.push(child);
            } else {
                collect_image_objects(child, out);
            }
        }
    }
}

fn first_of<'a>(record: &'a NormalizedRecord, names: &[&str]) -> &'a str {
    names
        .iter()
        .find_map(|n| record.get_non_empty(n))
        .unwrap_or("")
}

fn image_from_record(record: &NormalizedRecord) -> PropertyImage {
    PropertyImage {
        property_id: first_of(record, &IMAGE_PROPERTY_ID).to_string(),
        image_no: first_of(record, &IMAGE_NO).parse().unwrap_or(0),
        image_url: first_of(record, &IMAGE_URL).to_string(),
        description: first_of(record, &IMAGE_DESC).to_string(),
    }
}
