//! SeaORM entity definitions
//!
//! These are database-specific entities separate from domain models.

pub mod schema_migration;

// Re-exports for public API convenience
pub use schema_migration::{Entity as SchemaMigrationEntity, Model as SchemaMigrationModel};
