mod falcon_client;

pub use falcon_client::*;
