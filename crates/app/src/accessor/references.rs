use opsdesk_core::types::{Reference, ReferenceKind};
use opsdesk_core::validate::{ReferenceInput, ValidationError, MAX_NAME_LEN};
use opsdesk_core::{AccessError, UserContext};
use opsdesk_storage::Database;

use super::{backend, observed, stamp, Clock};

const ENTITY: &str = "reference";
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Named lookup rows and the foreign-key resolution used by the other accessors.
#[derive(Clone)]
pub struct ReferenceAccessor {
    database: Database,
    clock: Clock,
}

impl ReferenceAccessor {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    pub async fn list(
        &self,
        _ctx: &UserContext,
        kind: ReferenceKind,
        search: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Reference>, AccessError> {
        observed(ENTITY, "list", self.search(kind, search, limit)).await
    }

    pub async fn lookup_or_create(
        &self,
        ctx: &UserContext,
        kind: ReferenceKind,
        name: Option<String>,
    ) -> Result<Reference, AccessError> {
        observed(ENTITY, "create", self.find_or_insert(ctx, kind, name)).await
    }

    async fn search(
        &self,
        kind: ReferenceKind,
        search: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Reference>, AccessError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(ValidationError::new(
                "limit",
                format!("must be between 1 and {MAX_LIST_LIMIT}"),
            )
            .into());
        }
        let search = search.map(str::trim).filter(|term| !term.is_empty());
        self.database
            .references()
            .list(kind, search, limit)
            .await
            .map_err(backend)
    }

    async fn find_or_insert(
        &self,
        ctx: &UserContext,
        kind: ReferenceKind,
        name: Option<String>,
    ) -> Result<Reference, AccessError> {
        let name = name.unwrap_or_default();
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("name", "is required").into());
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::new(
                "name",
                format!("must be at most {MAX_NAME_LEN} characters"),
            )
            .into());
        }
        self.ensure_caller(ctx).await?;
        self.database
            .references()
            .lookup_or_create(kind, name, stamp(&self.clock))
            .await
            .map_err(backend)
    }

    /// Mirrors the caller's account as a person row so it can be referenced by id.
    pub(crate) async fn ensure_caller(&self, ctx: &UserContext) -> Result<(), AccessError> {
        self.database
            .references()
            .ensure_account(&ctx.user_id, &ctx.email, stamp(&self.clock))
            .await
            .map_err(backend)
    }

    /// Turns a reference input into a row id. Unknown ids are rejected; names are
    /// looked up or created.
    pub(crate) async fn resolve(
        &self,
        kind: ReferenceKind,
        field: &'static str,
        input: ReferenceInput,
    ) -> Result<String, AccessError> {
        let refs = self.database.references();
        match input {
            ReferenceInput::Id { id } => match refs.fetch(kind, &id).await.map_err(backend)? {
                Some(row) => Ok(row.id),
                None => Err(ValidationError::new(field, format!("unknown {kind} id `{id}`")).into()),
            },
            ReferenceInput::Name { name } => refs
                .lookup_or_create(kind, &name, stamp(&self.clock))
                .await
                .map(|row| row.id)
                .map_err(backend),
        }
    }

    pub(crate) async fn resolve_optional(
        &self,
        kind: ReferenceKind,
        field: &'static str,
        input: Option<ReferenceInput>,
    ) -> Result<Option<String>, AccessError> {
        match input {
            Some(input) => self.resolve(kind, field, input).await.map(Some),
            None => Ok(None),
        }
    }

    /// Resolves a patch field where `Some(None)` clears the reference.
    pub(crate) async fn resolve_change(
        &self,
        kind: ReferenceKind,
        field: &'static str,
        change: Option<Option<ReferenceInput>>,
    ) -> Result<Option<Option<String>>, AccessError> {
        match change {
            Some(input) => self.resolve_optional(kind, field, input).await.map(Some),
            None => Ok(None),
        }
    }

    /// Returns `id` when a row of `kind` with that id exists.
    pub(crate) async fn existing(
        &self,
        kind: ReferenceKind,
        id: &str,
    ) -> Result<Option<String>, AccessError> {
        self.database
            .references()
            .fetch(kind, id)
            .await
            .map(|row| row.map(|row| row.id))
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::test_support::{setup_db, ticking_clock};
    use crate::session::test_support::user;
    use opsdesk_core::Role;

    async fn accessor() -> ReferenceAccessor {
        ReferenceAccessor::new(setup_db().await, ticking_clock("2024-02-01T00:00:00Z"))
    }

    #[tokio::test]
    async fn resolves_names_idempotently_and_rejects_unknown_ids() {
        let refs = accessor().await;

        let first = refs
            .resolve(
                ReferenceKind::Department,
                "department",
                ReferenceInput::Name { name: "Finance".into() },
            )
            .await
            .expect("create");
        let second = refs
            .resolve(
                ReferenceKind::Department,
                "department",
                ReferenceInput::Name { name: "FINANCE ".into() },
            )
            .await
            .expect("lookup");
        assert_eq!(first, second);

        let by_id = refs
            .resolve(
                ReferenceKind::Department,
                "department",
                ReferenceInput::Id { id: first.clone() },
            )
            .await
            .expect("by id");
        assert_eq!(by_id, first);

        let err = refs
            .resolve(
                ReferenceKind::Person,
                "assignee",
                ReferenceInput::Id { id: first },
            )
            .await
            .unwrap_err();
        match err {
            AccessError::Validation(invalid) => assert_eq!(invalid.field, "assignee"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn callers_become_referenceable_people() {
        let refs = accessor().await;
        let ctx = user("u-77", Role::Employee, None);
        refs.ensure_caller(&ctx).await.expect("ensure");

        let id = refs
            .resolve(
                ReferenceKind::Person,
                "assignee",
                ReferenceInput::Id { id: "u-77".into() },
            )
            .await
            .expect("caller is a person");
        assert_eq!(id, "u-77");
    }

    #[tokio::test]
    async fn list_validates_limit() {
        let refs = accessor().await;
        let ctx = user("u-1", Role::Employee, None);
        refs.lookup_or_create(&ctx, ReferenceKind::Vertical, Some("Retail".into()))
            .await
            .expect("create");

        let rows = refs
            .list(&ctx, ReferenceKind::Vertical, Some("ret"), None)
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);

        let err = refs
            .list(&ctx, ReferenceKind::Vertical, None, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));

        let err = refs
            .lookup_or_create(&ctx, ReferenceKind::Team, Some("   ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }
}
