use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use opsdesk_core::types::{reference_name_key, Reference, ReferenceKind};

use crate::{like_pattern, to_rfc3339, RecordError};

/// Repository for named lookup rows (people, departments, projects, ...).
#[derive(Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the row of `kind` whose name matches `name`, creating it when absent.
    ///
    /// Names match case-insensitively with whitespace collapsed. Concurrent callers
    /// racing on the same new name end up with the same row.
    pub async fn lookup_or_create(
        &self,
        kind: ReferenceKind,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Reference, RecordError> {
        let key = reference_name_key(name);
        if let Some(existing) = self.find_by_key(kind, &key).await? {
            return Ok(existing);
        }

        sqlx::query(
            "INSERT INTO reference_rows (id, kind, name, name_key, origin, created_at) \
             VALUES (?, ?, ?, ?, 'name', ?) \
             ON CONFLICT DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(kind.as_str())
        .bind(name.trim())
        .bind(&key)
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await?;

        self.find_by_key(kind, &key)
            .await?
            .ok_or_else(|| RecordError::Corrupt(format!("{kind} `{key}` vanished after insert")))
    }

    /// Makes sure a person row exists for an authenticated account, keyed by its user id.
    pub async fn ensure_account(
        &self,
        user_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        sqlx::query(
            "INSERT INTO reference_rows (id, kind, name, name_key, origin, created_at) \
             VALUES (?, 'person', ?, ?, 'account', ?) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, name_key = excluded.name_key \
             WHERE reference_rows.origin = 'account'",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(reference_name_key(display_name))
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch(
        &self,
        kind: ReferenceKind,
        id: &str,
    ) -> Result<Option<Reference>, RecordError> {
        let row = sqlx::query_as::<_, ReferenceRow>(
            "SELECT id, kind, name FROM reference_rows WHERE id = ? AND kind = ?",
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReferenceRow::into_domain).transpose()
    }

    /// Lists rows of `kind` by name, optionally narrowed to names containing `search`.
    pub async fn list(
        &self,
        kind: ReferenceKind,
        search: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Reference>, RecordError> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT id, kind, name FROM reference_rows WHERE kind = ");
        query.push_bind(kind.as_str());
        if let Some(term) = search {
            query
                .push(" AND name_key LIKE ")
                .push_bind(like_pattern(&reference_name_key(term)))
                .push(" ESCAPE '\\'");
        }
        query.push(" ORDER BY name_key ASC, created_at ASC LIMIT ");
        query.push_bind(limit);

        let rows = query
            .build_query_as::<ReferenceRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ReferenceRow::into_domain).collect()
    }

    async fn find_by_key(
        &self,
        kind: ReferenceKind,
        key: &str,
    ) -> Result<Option<Reference>, RecordError> {
        let row = sqlx::query_as::<_, ReferenceRow>(
            "SELECT id, kind, name FROM reference_rows \
             WHERE kind = ? AND name_key = ? \
             ORDER BY CASE origin WHEN 'account' THEN 0 ELSE 1 END, created_at ASC \
             LIMIT 1",
        )
        .bind(kind.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReferenceRow::into_domain).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReferenceRow {
    id: String,
    kind: String,
    name: String,
}

impl ReferenceRow {
    fn into_domain(self) -> Result<Reference, RecordError> {
        let kind = self
            .kind
            .parse::<ReferenceKind>()
            .map_err(|err| RecordError::Corrupt(format!("reference {}: {err}", self.id)))?;
        Ok(Reference {
            id: self.id,
            kind,
            name: self.name,
        })
    }
}
