pub mod property;
pub mod tags;

pub use property::{map_record, CanonicalProperty, MappingRejected};
pub use tags::derive_tags;
