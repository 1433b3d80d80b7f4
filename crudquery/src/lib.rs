//! # crudquery
//!
//! Request query compiler for CRUD endpoints. A query string such as
//!
//! ```text
//! ?fields=id,name&filter=age||$gte||18&join=company||name&sort=name,ASC&limit=10&page=2
//! ```
//!
//! is decoded, checked against the route's configuration and planned into a
//! [`ParsedRequestPayload`]: one condition tree plus validated joins,
//! selection, sort and pagination. [`database::build_select`] turns the
//! payload into a sea-query statement.
//!
//! ```rust
//! use crudquery::{CrudAction, RouteOptions, RouteRegistry, parse_request};
//!
//! let mut routes = RouteRegistry::default();
//! let users = routes.register("users", RouteOptions::new("users")).unwrap();
//!
//! let payload = parse_request("filter=age||$gte||18&limit=10", &users, [("", ""); 0], CrudAction::ReadAll).unwrap();
//! assert_eq!(payload.pagination.limit, Some(10));
//! ```

pub mod config;
pub mod core;
pub mod database;
pub mod errors;
pub mod filtering;
pub mod models;
pub mod request;
pub mod routes;
pub mod validation;

pub use config::{CrudConfig, JoinOption, ParamOption, ParamType, QueryOptions, RouteOptions};
pub use errors::{QueryError, QueryResult};
pub use models::{CrudQueryParams, CrudRequestQuery, JoinSpec, ParsedRequestPayload, QueryJoin, QuerySort, SortOrder, SortSpec};
pub use request::{parse_request, plan_request};
pub use routes::{CrudAction, RouteConfig, RouteRegistry};
pub use serde_with;
