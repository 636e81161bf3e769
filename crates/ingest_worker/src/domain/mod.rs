mod dedup_window;
mod envelope_decryptor;
mod ingest_service;
mod metric_forwarder;
mod payload_normalizer;
mod profiling_service;
mod record_store_service;

pub use dedup_window::*;
pub use envelope_decryptor::*;
pub use ingest_service::*;
pub use metric_forwarder::*;
pub use payload_normalizer::*;
pub use profiling_service::*;
pub use record_store_service::*;
