pub mod clickhouse;
pub mod domain;
pub mod postgres;
pub mod telemetry;

pub use self::clickhouse::*;
pub use domain::*;
pub use postgres::*;
pub use telemetry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockBucketRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMetricsSink;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockProfilingNotifier;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRecordRepository;
