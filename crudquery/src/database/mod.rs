// Entity metadata and statement emission

pub mod metadata;
pub mod select;

pub use metadata::{EntityMeta, RelationKind, RelationMeta, Schema};
pub use select::{build_count, build_select, select_statement};
