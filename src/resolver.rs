//! Get-or-create lookups for the reference tables a movie points at.
//!
//! Resolving is not a pure read: a missing key is inserted on the connection that was
//! passed in. On a plain connection the row is committed before the call returns; on a
//! transaction it becomes durable with that transaction, and later lookups on the same
//! transaction already see it.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, NotSet,
    QueryFilter, Set, sea_query::OnConflict,
};
use tracing::debug;

use crate::entities::{actor, country, genre, language};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReferenceKind {
    Country,
    Genre,
    Actor,
    Language,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Country => "country",
            ReferenceKind::Genre => "genre",
            ReferenceKind::Actor => "actor",
            ReferenceKind::Language => "language",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReferenceEntity {
    pub kind: ReferenceKind,
    pub id: i32,
    /// Country code, or the name for every other kind.
    pub key: String,
    /// Display name; only countries carry one.
    pub name: Option<String>,
}

impl From<country::Model> for ReferenceEntity {
    fn from(row: country::Model) -> Self {
        Self { kind: ReferenceKind::Country, id: row.id, key: row.code, name: row.name }
    }
}

impl From<genre::Model> for ReferenceEntity {
    fn from(row: genre::Model) -> Self {
        Self { kind: ReferenceKind::Genre, id: row.id, key: row.name, name: None }
    }
}

impl From<actor::Model> for ReferenceEntity {
    fn from(row: actor::Model) -> Self {
        Self { kind: ReferenceKind::Actor, id: row.id, key: row.name, name: None }
    }
}

impl From<language::Model> for ReferenceEntity {
    fn from(row: language::Model) -> Self {
        Self { kind: ReferenceKind::Language, id: row.id, key: row.name, name: None }
    }
}

pub async fn resolve_or_create<C>(
    conn: &C,
    identifier: &str,
    kind: ReferenceKind,
) -> Result<ReferenceEntity, DbErr>
where
    C: ConnectionTrait,
{
    let key = identifier.to_string();
    let entity: ReferenceEntity = match kind {
        ReferenceKind::Country => {
            let row = country::ActiveModel { id: NotSet, code: Set(key), name: Set(None) };
            let found: country::Model =
                get_or_insert(conn, kind, country::Column::Code, identifier, row).await?;
            found.into()
        },
        ReferenceKind::Genre => {
            let row = genre::ActiveModel { id: NotSet, name: Set(key) };
            let found: genre::Model =
                get_or_insert(conn, kind, genre::Column::Name, identifier, row).await?;
            found.into()
        },
        ReferenceKind::Actor => {
            let row = actor::ActiveModel { id: NotSet, name: Set(key) };
            let found: actor::Model =
                get_or_insert(conn, kind, actor::Column::Name, identifier, row).await?;
            found.into()
        },
        ReferenceKind::Language => {
            let row = language::ActiveModel { id: NotSet, name: Set(key) };
            let found: language::Model =
                get_or_insert(conn, kind, language::Column::Name, identifier, row).await?;
            found.into()
        },
    };
    Ok(entity)
}

/// Resolves each identifier in order. Repeated identifiers map to the same row.
pub async fn resolve_or_create_many<C, S>(
    conn: &C,
    identifiers: &[S],
    kind: ReferenceKind,
) -> Result<Vec<ReferenceEntity>, DbErr>
where
    C: ConnectionTrait,
    S: AsRef<str>,
{
    let mut resolved = Vec::with_capacity(identifiers.len());
    for identifier in identifiers {
        resolved.push(resolve_or_create(conn, identifier.as_ref(), kind).await?);
    }
    Ok(resolved)
}

/// Finds the row whose unique `key` column equals `identifier`, inserting `row` if none
/// exists.
async fn get_or_insert<C, E, A>(
    conn: &C,
    kind: ReferenceKind,
    key: E::Column,
    identifier: &str,
    row: A,
) -> Result<E::Model, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
    A: ActiveModelTrait<Entity = E>,
    E::Model: IntoActiveModel<A>,
{
    if let Some(existing) = E::find().filter(key.eq(identifier)).one(conn).await? {
        return Ok(existing);
    }
    insert_or_fetch(conn, kind, key, identifier, row).await
}

/// Inserts `row` unless its key is already taken, then reads the row back. When another
/// writer got there first, `ON CONFLICT DO NOTHING` skips the insert and the winner's row
/// is returned.
async fn insert_or_fetch<C, E, A>(
    conn: &C,
    kind: ReferenceKind,
    key: E::Column,
    identifier: &str,
    row: A,
) -> Result<E::Model, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
    A: ActiveModelTrait<Entity = E>,
    E::Model: IntoActiveModel<A>,
{
    let inserted = E::insert(row)
        .on_conflict(OnConflict::column(key).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;

    if inserted == 0 {
        debug!(kind = kind.as_str(), key = %identifier, "reference created concurrently");
    } else {
        debug!(kind = kind.as_str(), key = %identifier, "created reference row");
    }

    E::find()
        .filter(key.eq(identifier))
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("{} '{identifier}'", kind.as_str())))
}
