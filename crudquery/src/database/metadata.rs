//! Entity graph the planner checks columns and relations against.
//!
//! Metadata is optional: without it joins, selections and sort fields are only
//! checked against the route configuration and left for the database to
//! reject. With it, unknown columns and relations fail at compile time and
//! joins carry the key columns needed to emit `JOIN ... ON`.

use sea_orm::{EntityTrait, IdenStatic, Iterable};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// A named relation from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    pub kind: RelationKind,
    /// Table of the related entity
    pub target: String,
    /// Key columns on the owning side
    pub from: Vec<String>,
    /// Matching key columns on the target side
    pub to: Vec<String>,
}

impl RelationMeta {
    fn new(kind: RelationKind, target: &str, from: &str, to: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            from: vec![from.to_string()],
            to: vec![to.to_string()],
        }
    }

    /// `self.from` references `target.to`
    #[must_use]
    pub fn belongs_to(target: &str, from: &str, to: &str) -> Self {
        Self::new(RelationKind::BelongsTo, target, from, to)
    }

    #[must_use]
    pub fn has_one(target: &str, from: &str, to: &str) -> Self {
        Self::new(RelationKind::HasOne, target, from, to)
    }

    #[must_use]
    pub fn has_many(target: &str, from: &str, to: &str) -> Self {
        Self::new(RelationKind::HasMany, target, from, to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityMeta {
    pub table: String,
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub relations: BTreeMap<String, RelationMeta>,
}

impl EntityMeta {
    pub fn new<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Table, columns and primary key of a Sea-ORM entity. Relations are
    /// named by the API rather than the entity, so they are added with
    /// [`EntityMeta::relation`].
    #[must_use]
    pub fn from_entity<E: EntityTrait>() -> Self {
        Self {
            table: E::default().table_name().to_string(),
            columns: E::Column::iter().map(|c| c.as_str().to_string()).collect(),
            primary_keys: E::PrimaryKey::iter().map(|k| k.as_str().to_string()).collect(),
            relations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn relation(mut self, name: &str, relation: RelationMeta) -> Self {
        self.relations.insert(name.to_string(), relation);
        self
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// All known entities, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<String, EntityMeta>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, entity: EntityMeta) -> Self {
        self.entities.insert(entity.table.clone(), entity);
        self
    }

    #[must_use]
    pub fn entity(&self, table: &str) -> Option<&EntityMeta> {
        self.entities.get(table)
    }

    /// Target entity of `relation` on `table`
    #[must_use]
    pub fn related(&self, table: &str, relation: &str) -> Option<(&RelationMeta, Option<&EntityMeta>)> {
        let relation = self.entity(table)?.relations.get(relation)?;
        Some((relation, self.entity(&relation.target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod company {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "companies")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub name: String,
            pub domain: Option<String>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    #[test]
    fn test_from_entity() {
        let meta = EntityMeta::from_entity::<company::Entity>();
        assert_eq!(meta.table, "companies");
        assert_eq!(meta.columns, vec!["id", "name", "domain"]);
        assert_eq!(meta.primary_keys, vec!["id"]);
        assert!(meta.has_column("domain"));
        assert!(!meta.has_column("email"));
    }

    #[test]
    fn test_schema_related() {
        let schema = Schema::new()
            .with_entity(
                EntityMeta::new("users", ["id", "company_id"])
                    .primary_key(["id"])
                    .relation("company", RelationMeta::belongs_to("companies", "company_id", "id")),
            )
            .with_entity(EntityMeta::new("companies", ["id", "name"]).primary_key(["id"]));

        let (relation, target) = schema.related("users", "company").unwrap();
        assert_eq!(relation.kind, RelationKind::BelongsTo);
        assert_eq!(target.map(|t| t.table.as_str()), Some("companies"));
        assert!(schema.related("users", "projects").is_none());
        assert!(schema.related("companies", "users").is_none());
    }
}
