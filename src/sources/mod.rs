//! Source adapters.
//!
//! Each adapter owns the request shape and response parsing for one data
//! source, and performs all network access through a shared
//! [`FetchEngine`](crate::fetch_engine::FetchEngine). Adapters return plain
//! `Result` values; the orchestrator converts them into
//! [`PartialResult`](crate::types::PartialResult)s so one source's failure
//! never aborts the fan-out.

pub mod espacenet;
pub mod pubchem;
pub mod registry;
pub mod trials;
pub mod wo_search;

pub use espacenet::EspacenetSource;
pub use pubchem::PubChemSource;
pub use registry::RegistrySource;
pub use trials::TrialsSource;
pub use wo_search::WoSearchSource;
