use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Per-agent registration mapping a public key to its decryption secret
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub public_key: String,
    pub secret_key: String,
    pub name: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Repository input for resolving a bucket by its public key
#[derive(Debug, Clone, PartialEq)]
pub struct GetBucketRepoInput {
    pub public_key: String,
}

/// Read-only key registry
/// Infrastructure layer (e.g., Postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BucketRepository: Send + Sync {
    /// Look up a bucket by exact public key match
    ///
    /// # Returns
    /// Some(Bucket) when registered, None otherwise
    async fn get_bucket(&self, input: GetBucketRepoInput) -> DomainResult<Option<Bucket>>;
}
