mod bucket;
mod envelope;
mod metrics;
mod monitoring;
mod profiling;
mod records;
mod result;

pub use bucket::*;
pub use envelope::*;
pub use metrics::*;
pub use monitoring::*;
pub use profiling::*;
pub use records::*;
pub use result::*;
