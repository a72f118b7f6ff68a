pub mod catalog;
pub mod record;

pub use catalog::{BlockLayout, CatalogEntry, CountSite, ParsedCatalog};
pub use record::{Record, RecordField, RecordFields, RecordRef};
