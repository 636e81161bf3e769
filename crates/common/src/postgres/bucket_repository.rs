use crate::domain::{Bucket, BucketRepository, DomainError, DomainResult, GetBucketRepoInput};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Bucket row as stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct BucketRow {
    pub public_key: String,
    pub secret_key: String,
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Convert database BucketRow to domain Bucket
impl From<BucketRow> for Bucket {
    fn from(row: BucketRow) -> Self {
        Bucket {
            public_key: row.public_key,
            secret_key: row.secret_key,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL implementation of BucketRepository trait
#[derive(Clone)]
pub struct PostgresBucketRepository {
    client: PostgresClient,
}

impl PostgresBucketRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BucketRepository for PostgresBucketRepository {
    #[instrument(skip(self, input), fields(public_key = %input.public_key))]
    async fn get_bucket(&self, input: GetBucketRepoInput) -> DomainResult<Option<Bucket>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| DomainError::StoreUnavailable(format!("{:#}", e)))?;

        let row = conn
            .query_opt(
                "SELECT public_key, secret_key, name, created_at
                 FROM buckets
                 WHERE public_key = $1",
                &[&input.public_key],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => {
                let bucket_row = BucketRow {
                    public_key: row.get(0),
                    secret_key: row.get(1),
                    name: row.get(2),
                    created_at: row.get(3),
                };
                debug!("resolved bucket for public key");
                Ok(Some(bucket_row.into()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_domain_conversion() {
        let now = Utc::now();
        let row = BucketRow {
            public_key: "pk1".to_string(),
            secret_key: "s3cret".to_string(),
            name: Some("staging".to_string()),
            created_at: Some(now),
        };

        let bucket: Bucket = row.into();

        assert_eq!(bucket.public_key, "pk1");
        assert_eq!(bucket.secret_key, "s3cret");
        assert_eq!(bucket.name.as_deref(), Some("staging"));
        assert_eq!(bucket.created_at, Some(now));
    }
}
