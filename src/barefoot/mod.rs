mod api;
mod cascade;
mod models;
mod normalize;
mod transport;
mod transport_error;

pub use api::{BarefootApi, ConnectionReport};
pub use cascade::{CascadePlan, MethodCandidate};
pub use models::{Credentials, NormalizedRecord, Params, RawRemoteResult, RemoteObject};
pub use transport::{SoapClient, SoapTransport};
pub use transport_error::TransportError;
