use serde::Serialize;
use std::collections::BTreeMap;

// Result shapes seen from the Barefoot service
//  ├── Object
//  │    ├── PROPERTIES
//  │    │    └── PROPERTY (1..n)
//  │    ├── schema + any   (.NET DataSet: schema markup, payload markup)
//  │    └── Message        ("This is a Custom method")
//  └── Text                (escaped XML inside a <string>-typed result)

/// Connection settings for one Barefoot account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub account: String,
}

impl Credentials {
    /// Parameter bag holding only the authentication fields.
    pub fn auth_params(&self) -> Params {
        Params::new()
            .with("username", &self.username)
            .with("password", &self.password)
            .with("barefootAccount", &self.account)
    }
}

/// Ordered parameter bag. SOAP bodies are order-sensitive, so this is a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Untyped result of one remote call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawRemoteResult {
    Object(RemoteObject),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteObject {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    /// Child fields in document order. Names may repeat (`PROPERTY` lists).
    pub fields: Vec<(String, RemoteValue)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RemoteValue {
    Text(String),
    Object(RemoteObject),
}

impl RemoteObject {
    pub fn field(&self, name: &str) -> Option<&RemoteValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RemoteValue> {
        self.fields
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            RemoteValue::Text(s) => Some(s.as_str()),
            RemoteValue::Object(_) => None,
        }
    }

    pub fn object_field(&self, name: &str) -> Option<&RemoteObject> {
        match self.field(name)? {
            RemoteValue::Object(o) => Some(o),
            RemoteValue::Text(_) => None,
        }
    }

    #[cfg(test)]
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .push((name.into(), RemoteValue::Text(value.into())));
        self
    }

    #[cfg(test)]
    pub fn with_object(mut self, name: impl Into<String>, value: RemoteObject) -> Self {
        self.fields.push((name.into(), RemoteValue::Object(value)));
        self
    }
}

impl RawRemoteResult {
    /// True when the call returned nothing at all worth keeping.
    pub fn is_blank(&self) -> bool {
        match self {
            RawRemoteResult::Text(s) => s.trim().is_empty(),
            RawRemoteResult::Object(o) => o.fields.is_empty() && o.attributes.is_empty(),
        }
    }
}

/// One property after normalization: vendor field name to string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord(BTreeMap<String, String>);

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `key` when present and not blank.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NormalizedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut rec = NormalizedRecord::new();
        for (k, v) in iter {
            rec.insert(k, v);
        }
        rec
    }
}

/// One entry of a `GetPropertyAllImgs` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyImage {
    pub property_id: String,
    pub image_no: i64,
    pub image_url: String,
    pub description: String,
}
