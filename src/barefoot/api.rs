// api.rs
use crate::barefoot::cascade::{CascadePlan, CascadeResolver, FetchOutcome};
use crate::barefoot::models::{Credentials, Params, PropertyImage, RawRemoteResult};
use crate::barefoot::normalize::normalize_images;
use crate::barefoot::transport::SoapTransport;
use crate::barefoot::TransportError;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    pub endpoint: Option<String>,
}

/// Typed entry points over one transport session.
pub struct BarefootApi<'a, T: SoapTransport + ?Sized> {
    transport: &'a T,
    credentials: &'a Credentials,
    plan: &'a CascadePlan,
}

impl<'a, T: SoapTransport + ?Sized> BarefootApi<'a, T> {
    pub fn new(transport: &'a T, credentials: &'a Credentials, plan: &'a CascadePlan) -> Self {
        Self {
            transport,
            credentials,
            plan,
        }
    }

    /// Calls `GetUrlTest`, which needs no credentials.
    pub fn test_connection(&self) -> ConnectionReport {
        match self.transport.invoke("GetUrlTest", &Params::new()) {
            Ok(result) if !result.is_blank() => {
                let endpoint = match &result {
                    RawRemoteResult::Text(s) => Some(s.trim().to_string()),
                    RawRemoteResult::Object(_) => None,
                };
                info!(?endpoint, "connection test succeeded");
                ConnectionReport {
                    success: true,
                    message: "Successfully connected to Barefoot API.".into(),
                    endpoint,
                }
            }
            Ok(_) => ConnectionReport {
                success: false,
                message: "Connection test failed - no response from GetUrlTest".into(),
                endpoint: None,
            },
            Err(e) => ConnectionReport {
                success: false,
                message: e.to_string(),
                endpoint: None,
            },
        }
    }

    pub fn fetch_all_properties(&self) -> FetchOutcome {
        CascadeResolver::new(self.transport, self.credentials, self.plan).fetch_all_properties()
    }

    pub fn property_images(&self, external_id: &str) -> Result<Vec<PropertyImage>, TransportError> {
        let params = self.credentials.auth_params().with("propertyId", external_id);
        let result = self.transport.invoke("GetPropertyAllImgs", &params)?;
        let images = normalize_images(&result);
        debug!(external_id, count = images.len(), "images fetched");
        Ok(images)
    }

    /// Raw rates payload, or `None` when the service returned nothing.
    pub fn property_rates(
        &self,
        external_id: &str,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Option<RawRemoteResult>, TransportError> {
        let mut params = self.credentials.auth_params().with("propertyId", external_id);
        if let Some(start) = start_date {
            params = params.with("startDate", start);
        }
        if let Some(end) = end_date {
            params = params.with("endDate", end);
        }

        let result = self.transport.invoke("GetPropertyRates", &params)?;
        Ok((!result.is_blank()).then_some(result))
    }
}
