mod bucket_repository;
mod client;
mod config;

pub use bucket_repository::*;
pub use client::*;
pub use config::*;
