//! Bookkeeping entity for applied migrations.

use sea_orm::entity::prelude::*;

use crate::domain::MigrationRecord;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "schema_migrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Convert database model to domain record
impl From<Model> for MigrationRecord {
    fn from(model: Model) -> Self {
        MigrationRecord {
            version: model.version,
            name: model.name,
            checksum: model.checksum,
            applied_at: model.applied_at,
        }
    }
}
