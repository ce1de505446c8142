//! Source harvesting
//!
//! A harvester drives one source end-to-end: fetch the listing through the
//! host client and page cache, detect "nothing changed", extract and filter
//! candidate links, diff against the seen-URL window, fetch only the new
//! articles and emit feed items. The coordinator runs one worker per host
//! so hostile hosts are strictly serialized while unrelated hosts proceed
//! concurrently.

pub mod coordinator;
pub mod extract;
pub mod harvester;

pub use coordinator::run_harvest;
pub use harvester::{harvest_source, HarvestContext};
