//! Metadata store backends.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::error::MetadataError;
use super::model::DocumentRecord;

const RECORD_COLUMNS: &str = "id, title, document_type, collection, sub_collection, \
     acte_uniforme, livre, titre, partie, chapitre, section, sous_section, \
     article, alinea, tags, status, version, date_publication, date_revision, is_latest";

/// Exact hierarchy coordinates for a direct lookup.
#[derive(Debug, Clone, Default)]
pub struct HierarchyQuery {
    pub acte_uniforme: Option<String>,
    pub partie: Option<i32>,
    pub chapitre: Option<i32>,
    pub section: Option<i32>,
    pub article: Option<String>,
    pub limit: usize,
}

/// Read-only access to the authoritative document records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Batched lookup of the latest records for the given passage ids.
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, MetadataError>;

    /// Exact-coordinate hierarchy lookup, ordered by position.
    async fn search_by_hierarchy(
        &self,
        query: &HierarchyQuery,
    ) -> Result<Vec<DocumentRecord>, MetadataError>;
}

/// PostgreSQL-backed metadata store.
pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    /// Connects a small pool to the database.
    pub async fn connect(database_url: &str) -> Result<Self, MetadataError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| MetadataError::Unavailable {
                message: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, MetadataError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM documents WHERE id = ANY($1) AND is_latest"
        );

        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn search_by_hierarchy(
        &self,
        query: &HierarchyQuery,
    ) -> Result<Vec<DocumentRecord>, MetadataError> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
            "SELECT {RECORD_COLUMNS} FROM documents WHERE is_latest AND status = 'published'"
        ));

        if let Some(acte) = &query.acte_uniforme {
            builder.push(" AND acte_uniforme = ").push_bind(acte.clone());
        }
        if let Some(partie) = query.partie {
            builder.push(" AND partie = ").push_bind(partie);
        }
        if let Some(chapitre) = query.chapitre {
            builder.push(" AND chapitre = ").push_bind(chapitre);
        }
        if let Some(section) = query.section {
            builder.push(" AND section = ").push_bind(section);
        }
        if let Some(article) = &query.article {
            builder.push(" AND article = ").push_bind(article.clone());
        }

        let limit = if query.limit == 0 { 10 } else { query.limit };
        builder
            .push(" ORDER BY partie, chapitre, section, article LIMIT ")
            .push_bind(limit as i64);

        let records = builder
            .build_query_as::<DocumentRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }
}

impl std::fmt::Debug for PostgresMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresMetadataStore").finish()
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockMetadataStore;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// In-memory metadata store for tests.
    pub struct MockMetadataStore {
        records: HashMap<Uuid, DocumentRecord>,
        fail: bool,
        pub fetch_calls: AtomicU64,
    }

    impl MockMetadataStore {
        pub fn new(records: Vec<DocumentRecord>) -> Self {
            Self {
                records: records.into_iter().map(|r| (r.id, r)).collect(),
                fail: false,
                fetch_calls: AtomicU64::new(0),
            }
        }

        /// A store whose every query fails.
        pub fn failing() -> Self {
            Self {
                records: HashMap::new(),
                fail: true,
                fetch_calls: AtomicU64::new(0),
            }
        }

        pub fn fetch_call_count(&self) -> u64 {
            self.fetch_calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl MetadataStore for MockMetadataStore {
        async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, MetadataError> {
            self.fetch_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(MetadataError::Unavailable {
                    message: "mock failure".to_string(),
                });
            }

            Ok(ids
                .iter()
                .filter_map(|id| self.records.get(id).cloned())
                .filter(|record| record.is_latest)
                .collect())
        }

        async fn search_by_hierarchy(
            &self,
            query: &HierarchyQuery,
        ) -> Result<Vec<DocumentRecord>, MetadataError> {
            if self.fail {
                return Err(MetadataError::Unavailable {
                    message: "mock failure".to_string(),
                });
            }

            let mut records: Vec<DocumentRecord> = self
                .records
                .values()
                .filter(|r| r.is_latest)
                .filter(|r| {
                    query
                        .acte_uniforme
                        .as_ref()
                        .is_none_or(|acte| r.acte_uniforme.as_ref() == Some(acte))
                        && query.partie.is_none_or(|p| r.partie == Some(p))
                        && query.chapitre.is_none_or(|c| r.chapitre == Some(c))
                        && query.section.is_none_or(|s| r.section == Some(s))
                        && query
                            .article
                            .as_ref()
                            .is_none_or(|a| r.article.as_ref() == Some(a))
                })
                .cloned()
                .collect();

            records.sort_by(|a, b| {
                (a.partie, a.chapitre, a.section, a.article.clone()).cmp(&(
                    b.partie,
                    b.chapitre,
                    b.section,
                    b.article.clone(),
                ))
            });

            let limit = if query.limit == 0 { 10 } else { query.limit };
            records.truncate(limit);
            Ok(records)
        }
    }
}
