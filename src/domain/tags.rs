// src/domain/tags.rs

use crate::domain::property::CanonicalProperty;

pub const TAXONOMY_PROPERTY_TYPE: &str = "property_type";
pub const TAXONOMY_LOCATION: &str = "location";
pub const TAXONOMY_AMENITY: &str = "amenity";

/// Amenity label, the flag field that implies it, and keywords that imply it
/// when found in the free-text amenity description.
const AMENITY_RULES: &[(&str, &str, &[&str])] = &[
    ("Pool", "Pool", &["pool"]),
    ("Hot Tub", "HotTub", &["hot tub"]),
    ("WiFi", "Internet", &["wifi", "internet"]),
    ("Kitchen", "Kitchen", &["kitchen"]),
    ("Parking", "Parking", &["parking"]),
    ("Pet Friendly", "PetsAllowed", &["pet"]),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTags {
    pub property_type: Vec<String>,
    pub location: Vec<String>,
    pub amenities: Vec<String>,
}

impl PropertyTags {
    /// (taxonomy, tags) pairs, every taxonomy included even when empty.
    pub fn by_taxonomy(&self) -> [(&'static str, &[String]); 3] {
        [
            (TAXONOMY_PROPERTY_TYPE, &self.property_type),
            (TAXONOMY_LOCATION, &self.location),
            (TAXONOMY_AMENITY, &self.amenities),
        ]
    }
}

/// Group-size label from occupancy. Precedence matters: the larger band wins.
pub fn group_size_tag(occupancy: u32) -> Option<&'static str> {
    if occupancy >= 8 {
        Some("Large Group")
    } else if occupancy >= 4 {
        Some("Family Friendly")
    } else if occupancy <= 2 {
        Some("Romantic Getaway")
    } else {
        None
    }
}

pub fn derive_tags(prop: &CanonicalProperty) -> PropertyTags {
    let property_type = prop.property_type.iter().cloned().collect();

    let mut parts: Vec<&str> = [prop.city.as_deref(), prop.state.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if parts.is_empty() {
        if let Some(region) = prop.details.get("region") {
            parts.push(region);
        }
    }
    let location = if parts.is_empty() {
        Vec::new()
    } else {
        vec![parts.join(", ")]
    };

    let text = prop
        .amenities_text
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let mut amenities: Vec<String> = AMENITY_RULES
        .iter()
        .filter(|(_, flag, keywords)| {
            prop.amenity_flags.contains(*flag) || keywords.iter().any(|k| text.contains(k))
        })
        .map(|(label, _, _)| label.to_string())
        .collect();

    if let Some(tag) = prop.occupancy.and_then(group_size_tag) {
        amenities.push(tag.to_string());
    }

    PropertyTags {
        property_type,
        location,
        amenities,
    }
}
