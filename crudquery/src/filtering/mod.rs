//! # Query Grammar
//!
//! Everything between the raw query string and a planned request.
//!
//! ## Main Components
//!
//! - **[`query_parser`]** / **[`query_builder`]**: decode and encode the query
//!   string grammar (`filter=name||$cont||john&sort=id,DESC&limit=10`)
//! - **[`conditions`]**: condition values and the AND/OR tree
//! - **[`search`]**: compiles the JSON search object (`s=...`) and folds every
//!   filter source into one tree
//! - **[`operators`]**: built-in operators plus per-route custom operators
//! - **[`joined`]**, **[`select`]**, **[`sort`]**, **[`pagination`]**: check the
//!   request against the route and resolve field references
//!
//! ## Query Parameter Examples
//! ```text
//! GET /users?filter=age||$gte||18&filter=name||$contL||jo
//! GET /users?filter=role||$eq||admin&or=role||$eq||owner
//! GET /users?s={"$or":[{"age":{"$between":[18,30]}},{"vip":true}]}
//! GET /users?join=company||name&filter=company.name||$starts||Ac
//! GET /users?sort=last_name,ASC&sort=id,DESC&limit=20&page=3
//! ```

pub mod conditions;
pub mod joined;
pub mod operators;
pub mod pagination;
pub mod query_builder;
pub mod query_parser;
pub mod search;
pub mod select;
pub mod sort;

// Re-export commonly used items
pub use conditions::{CombinatorNode, Condition, FilterValue, Scalar};
pub use joined::{FieldResolver, plan_joins};
pub use operators::{BuiltinOperator, CustomOperator, FieldRef, OperatorRegistry};
pub use pagination::{DEFAULT_PAGE_LIMIT, GetManyResponse, PaginationSpec};
pub use query_builder::{RequestQueryBuilder, encode};
pub use query_parser::{ParamNames, ParserOptions, QueryParser, decode};
pub use search::{assemble_search, compile_search};
pub use select::plan_select;
pub use sort::plan_sort;
