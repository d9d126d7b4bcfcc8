use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// The document store collaborator, as consumed by the realtime core.
///
/// `apply_update` must overwrite the document's current content AND append an
/// immutable version record attributing the change to `user_id`, atomically.
/// The core treats it as a single logical call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn is_member(&self, document_id: &str, user_id: &str) -> Result<bool, StoreError>;
    async fn apply_update(&self, document_id: &str, user_id: &str, content: &Value) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    /// The document id is not a valid key or the document does not exist.
    UnknownDocument(String),
    /// The database rejected the operation or could not be reached.
    Database(SqlxError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::UnknownDocument(id) => write!(f, "Unknown document '{}'", id),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<SqlxError> for StoreError {
    fn from(e: SqlxError) -> Self {
        StoreError::Database(e)
    }
}

/// Postgres-backed document store client
pub struct PgDocStore {
    pool: PgPool,
}

impl PgDocStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - Database connection pool or error
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20) // Increased from 5 to support more concurrent operations
            .min_connections(2) // Keep some connections alive
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn parse_document_id(document_id: &str) -> Result<Uuid, StoreError> {
        Uuid::parse_str(document_id).map_err(|e| {
            error!("Invalid document UUID '{}': {}", document_id, e);
            StoreError::UnknownDocument(document_id.to_string())
        })
    }
}

#[async_trait]
impl DocumentStore for PgDocStore {
    /// Check whether a user has access to a document
    ///
    /// # Arguments
    /// * `document_id` - The ID of the document to check
    /// * `user_id` - The user identifier resolved at the handshake
    ///
    /// # Returns
    /// * `Result<bool, StoreError>` - Whether the user is a member
    async fn is_member(&self, document_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let doc_uuid = Self::parse_document_id(document_id)?;

        // Log pool stats before acquiring connection
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "Checking membership of user {} for doc {}. Pool connections: {} idle, {} in use",
            user_id,
            document_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        let query_sql = r#"
            SELECT EXISTS (
                SELECT 1
                FROM documents d
                LEFT JOIN document_members dm ON d.id = dm.document
                WHERE
                    d.id = $1
                    AND d.deleted = FALSE
                    AND (d.owner = $2 OR dm.user_id = $2)
            ) AS is_member
        "#;

        let row = sqlx::query(query_sql)
            .bind(doc_uuid)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("is_member")?)
    }

    /// Persist a content update: overwrite the current content and append a
    /// version record, in one transaction
    ///
    /// # Arguments
    /// * `document_id` - The ID of the document to update
    /// * `user_id` - The user the change is attributed to
    /// * `content` - The new document content
    ///
    /// # Returns
    /// * `Result<(), StoreError>` - Success once both writes committed
    async fn apply_update(&self, document_id: &str, user_id: &str, content: &Value) -> Result<(), StoreError> {
        let doc_uuid = Self::parse_document_id(document_id)?;

        // Begin a transaction
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool for document {}: {}. Pool state: {} idle, {} total",
                    document_id,
                    e,
                    self.pool.num_idle(),
                    self.pool.size()
                );
                return Err(e.into());
            }
        };

        // Overwrite the current content
        let update_sql = r#"
            UPDATE documents
            SET content = $2, updated_at = NOW(), updated_by = $3
            WHERE id = $1 AND deleted = FALSE
        "#;

        let updated = sqlx::query(update_sql)
            .bind(doc_uuid)
            .bind(sqlx::types::Json(content))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            // Nothing to update: roll the transaction back and report
            tx.rollback().await?;
            return Err(StoreError::UnknownDocument(document_id.to_string()));
        }

        // Append the immutable version record
        let version_sql = r#"
            INSERT INTO document_versions (id, document, version, content, created_at, created_by)
            VALUES (
                $1, $2,
                (SELECT COALESCE(MAX(version), 0) + 1 FROM document_versions WHERE document = $2),
                $3, NOW(), $4
            )
        "#;

        sqlx::query(version_sql)
            .bind(Uuid::new_v4())
            .bind(doc_uuid)
            .bind(sqlx::types::Json(content))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Commit the transaction - both writes land or neither does
        tx.commit().await?;

        info!("Update persisted for document {} by user {}", document_id, user_id);
        Ok(())
    }
}
