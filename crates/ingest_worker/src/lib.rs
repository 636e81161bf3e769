pub mod clickhouse;
pub mod control_plane;
pub mod domain;
pub mod falcon;
pub mod ingest_worker;
pub mod transport;

pub use self::clickhouse::*;
pub use control_plane::*;
pub use domain::*;
pub use falcon::*;
pub use ingest_worker::*;
pub use transport::*;
