// transport.rs
use crate::barefoot::models::{Credentials, Params, RawRemoteResult, RemoteObject, RemoteValue};
use crate::barefoot::TransportError;
use crate::xml::{self, XmlElement};
use quick_xml::escape::escape;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::cell::RefCell;
use std::time::Duration;
use tracing::{debug, trace};

pub const SERVICE_NAMESPACE: &str = "http://www.barefoot.com/Services/";

const USER_AGENT: &str = concat!("barefoot_sync/", env!("CARGO_PKG_VERSION"));

/// A single remote method call. Implementations make exactly one network
/// round trip per call and never retry.
pub trait SoapTransport {
    fn invoke(&self, method: &str, params: &Params) -> Result<RawRemoteResult, TransportError>;
}

impl<T: SoapTransport + ?Sized> SoapTransport for &T {
    fn invoke(&self, method: &str, params: &Params) -> Result<RawRemoteResult, TransportError> {
        (**self).invoke(method, params)
    }
}

/// SOAP 1.2 client over blocking HTTP. Not shared between operations:
/// build one per sync, cleanup, or connection test.
pub struct SoapClient {
    client: Client,
    endpoint: String,
    last_request: RefCell<Option<String>>,
    last_response: RefCell<Option<String>>,
}

impl SoapClient {
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: credentials.endpoint.clone(),
            last_request: RefCell::new(None),
            last_response: RefCell::new(None),
        })
    }

    /// Raw body of the last request sent, for diagnostics.
    pub fn last_request(&self) -> Option<String> {
        self.last_request.borrow().clone()
    }

    /// Raw body of the last response received, for diagnostics.
    pub fn last_response(&self) -> Option<String> {
        self.last_response.borrow().clone()
    }
}

impl SoapTransport for SoapClient {
    fn invoke(&self, method: &str, params: &Params) -> Result<RawRemoteResult, TransportError> {
        let envelope = build_envelope(method, params);
        trace!(method, request = %envelope, "SOAP request");
        *self.last_request.borrow_mut() = Some(envelope.clone());

        let content_type =
            format!("application/soap+xml; charset=utf-8; action=\"{SERVICE_NAMESPACE}{method}\"");
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(envelope)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        trace!(method, %status, response = %text, "SOAP response");
        *self.last_response.borrow_mut() = Some(text.clone());

        match decode_envelope(method, &text) {
            Ok(_) if !status.is_success() => {
                Err(TransportError::ProtocolFault(format!("HTTP {status}")))
            }
            Ok(result) => {
                debug!(method, "SOAP call succeeded");
                Ok(result)
            }
            Err(TransportError::ProtocolFault(reason)) if !status.is_success() => Err(
                TransportError::ProtocolFault(format!("HTTP {status}: {reason}")),
            ),
            Err(e) => Err(e),
        }
    }
}

/// Builds the SOAP 1.2 request body for `method`.
pub fn build_envelope(method: &str, params: &Params) -> String {
    let mut body = String::new();
    for (k, v) in params.iter() {
        body.push_str(&format!("<{k}>{}</{k}>", escape(v)));
    }

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap12:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:soap12="http://www.w3.org/2003/05/soap-envelope">"#,
            r#"<soap12:Body><{method} xmlns="{ns}">{body}</{method}></soap12:Body>"#,
            r#"</soap12:Envelope>"#
        ),
        method = method,
        ns = SERVICE_NAMESPACE,
        body = body
    )
}

/// Extracts the `{method}Result` payload from a response envelope.
///
/// A SOAP fault becomes `ProtocolFault`. A result carrying an inline schema
/// (the .NET DataSet encoding) is split into `schema` and `any` markup fields,
/// the same split a WSDL-driven client produces for `<s:any/>` content. Any
/// other element result without a `PROPERTIES` container or `Message` also
/// gets its markup in `any`, next to the decoded fields.
pub fn decode_envelope(method: &str, xml_text: &str) -> Result<RawRemoteResult, TransportError> {
    let root = xml::parse(xml_text)
        .map_err(|e| TransportError::ProtocolFault(format!("unreadable envelope: {e}")))?;

    let body = root
        .child("Body")
        .ok_or_else(|| TransportError::ProtocolFault("envelope has no Body".into()))?;

    if let Some(fault) = body.child("Fault") {
        return Err(TransportError::ProtocolFault(fault_reason(fault)));
    }

    let response_name = format!("{method}Response");
    let Some(response) = body.child(&response_name).or_else(|| body.children.first()) else {
        return Ok(RawRemoteResult::Object(RemoteObject::default()));
    };

    let result_name = format!("{method}Result");
    match response
        .child(&result_name)
        .or_else(|| response.children.first())
    {
        Some(result) => Ok(result_from_element(result)),
        None => Ok(RawRemoteResult::Text(response.text.clone())),
    }
}

fn fault_reason(fault: &XmlElement) -> String {
    // SOAP 1.2 puts the message in Reason/Text, SOAP 1.1 in faultstring.
    let reason = fault
        .child("Reason")
        .map(|r| r.child_text("Text").to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| Some(fault.child_text("faultstring").to_string()))
        .filter(|s| !s.is_empty());
    reason.unwrap_or_else(|| "unspecified SOAP fault".to_string())
}

fn result_from_element(el: &XmlElement) -> RawRemoteResult {
    if el.is_leaf() && el.attributes.is_empty() {
        return RawRemoteResult::Text(el.text.clone());
    }

    let mut obj = object_from_element(el);
    let structured = obj.text_field("any").is_some()
        || obj.object_field("PROPERTIES").is_some()
        || obj.text_field("Message").is_some();
    if !structured {
        obj.fields
            .push(("any".into(), RemoteValue::Text(raw_payload(el))));
    }
    RawRemoteResult::Object(obj)
}

/// Markup of an untyped result: the single child element as a document, or
/// the result element itself when there is no single root to hand over.
fn raw_payload(el: &XmlElement) -> String {
    match el.children.as_slice() {
        [only] if el.text.is_empty() => only.to_xml(),
        _ => el.to_xml(),
    }
}

fn object_from_element(el: &XmlElement) -> RemoteObject {
    let mut obj = RemoteObject {
        attributes: el.attributes.clone(),
        fields: Vec::new(),
    };

    if let Some(schema) = el.child("schema") {
        let payload: String = el
            .children
            .iter()
            .filter(|c| c.name != "schema")
            .map(XmlElement::to_xml)
            .collect();
        obj.fields
            .push(("schema".into(), RemoteValue::Text(schema.to_xml())));
        obj.fields.push(("any".into(), RemoteValue::Text(payload)));
        return obj;
    }

    for child in &el.children {
        let value = if child.is_leaf() && child.attributes.is_empty() {
            RemoteValue::Text(child.text.clone())
        } else {
            RemoteValue::Object(object_from_element(child))
        };
        obj.fields.push((child.name.clone(), value));
    }
    obj
}
