//! Route registration.
//!
//! Routes are registered once at startup by name. Registration merges the
//! global defaults, builds the route's operator overlay and compiles its
//! default filter, so every configuration mistake surfaces here rather than
//! on the first request.
//!
//! ```rust
//! use crudquery::config::{RouteOptions, QueryOptions};
//! use crudquery::filtering::operators::CustomOperator;
//! use crudquery::routes::RouteRegistry;
//!
//! let mut registry = RouteRegistry::default();
//! let err = registry
//!     .register(
//!         "users",
//!         RouteOptions::new("users").operator(CustomOperator::template("$eq", false, "{field} = :{param}")),
//!     )
//!     .unwrap_err();
//! assert!(err.to_string().contains("$eq"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{CrudConfig, DefaultFilter, ParamOption, QueryOptions, RouteOptions};
use crate::database::metadata::{EntityMeta, Schema};
use crate::errors::{QueryError, QueryResult};
use crate::filtering::conditions::CombinatorNode;
use crate::filtering::operators::OperatorRegistry;
use crate::filtering::query_parser::ParserOptions;
use crate::filtering::search::compile_search;
use crate::validation::validate_field_path;

/// The operation a request performs; decides which parts of the query apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudAction {
    ReadAll,
    ReadOne,
    CreateOne,
    CreateMany,
    UpdateOne,
    ReplaceOne,
    DeleteOne,
    RecoverOne,
}

impl CrudAction {
    /// Sort and pagination only apply to list requests
    #[must_use]
    pub fn is_many(self) -> bool {
        matches!(self, Self::ReadAll)
    }

    /// Reads may be served from cache
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::ReadAll | Self::ReadOne)
    }
}

/// A registered route with everything resolved.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub name: String,
    pub table: String,
    pub query: QueryOptions,
    pub params: BTreeMap<String, ParamOption>,
    pub parser: ParserOptions,
    pub operators: OperatorRegistry,
    pub default_filter: CombinatorNode,
    pub primary_keys: Vec<String>,
    schema: Option<Arc<Schema>>,
}

impl RouteConfig {
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// Metadata of the base entity, if registered
    #[must_use]
    pub fn entity(&self) -> Option<&EntityMeta> {
        self.schema()?.entity(&self.table)
    }
}

/// Route table keyed by route name.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    config: CrudConfig,
    schema: Option<Arc<Schema>>,
    routes: BTreeMap<String, Arc<RouteConfig>>,
}

impl RouteRegistry {
    #[must_use]
    pub fn new(config: CrudConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Entity metadata used to check columns and relations
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Resolve and store a route.
    ///
    /// # Errors
    ///
    /// - [`QueryError::OperatorCollision`] when a custom operator reuses a
    ///   built-in name
    /// - [`QueryError::UnknownOperator`] when the default filter uses an
    ///   operator the route does not have
    /// - [`QueryError::InvalidConfig`] for a duplicate route name or any other
    ///   invalid option
    pub fn register(&mut self, name: &str, options: RouteOptions) -> QueryResult<Arc<RouteConfig>> {
        if self.routes.contains_key(name) {
            return Err(QueryError::invalid_config(format!("route '{name}' is already registered")));
        }
        let route = Arc::new(self.resolve(name, options)?);
        self.routes.insert(name.to_string(), Arc::clone(&route));
        tracing::debug!(route = %name, table = %route.table, "Registered route");
        Ok(route)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RouteConfig>> {
        self.routes.get(name).cloned()
    }

    /// Names of all registered routes
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    fn resolve(&self, name: &str, options: RouteOptions) -> QueryResult<RouteConfig> {
        let invalid = |message: String| QueryError::invalid_config(format!("route '{name}': {message}"));

        validate_field_path(&options.table).map_err(|err| invalid(err.to_string()))?;
        if options.table.contains('.') {
            return Err(invalid("table must be a single identifier".to_string()));
        }

        let operators = OperatorRegistry::with_custom(options.all_custom_operators())?;
        let query = options.query.merged_with(&self.config.query);

        if let (Some(limit), Some(max)) = (query.limit, query.max_limit) {
            if limit > max {
                tracing::warn!(route = %name, limit, max_limit = max, "Route limit exceeds max_limit and will be capped");
            }
        }
        for (path, join) in &query.join {
            validate_field_path(path).map_err(|err| invalid(err.to_string()))?;
            if let Some(alias) = &join.alias {
                validate_field_path(alias).map_err(|err| invalid(err.to_string()))?;
                if alias.contains('.') {
                    return Err(invalid(format!("join alias '{alias}' must not contain '.'")));
                }
            }
        }
        for sort in &query.sort {
            validate_field_path(&sort.field).map_err(|err| invalid(err.to_string()))?;
        }

        let mut params = self.config.params.clone();
        params.extend(options.params);
        for param in params.values() {
            validate_field_path(&param.field).map_err(|err| invalid(err.to_string()))?;
        }

        let default_filter = match &query.filter {
            None => Ok(CombinatorNode::default()),
            Some(DefaultFilter::Search(search)) => compile_search(search, &operators),
            Some(DefaultFilter::Conditions(conditions)) => conditions
                .iter()
                .map(|condition| operators.validate(condition.clone()).map(CombinatorNode::Leaf))
                .collect::<QueryResult<Vec<_>>>()
                .map(|leaves| CombinatorNode::And(leaves).normalize()),
        }
        .map_err(|err| match err {
            QueryError::Validation(inner) => invalid(format!("default filter: {inner}")),
            other => other,
        })?;

        let schema = self.schema.clone();
        let entity = schema.as_deref().and_then(|schema| schema.entity(&options.table));
        let primary_keys = match entity {
            Some(entity) if !entity.primary_keys.is_empty() => entity.primary_keys.clone(),
            _ => params
                .values()
                .filter(|param| param.primary)
                .map(|param| param.field.clone())
                .collect(),
        };

        Ok(RouteConfig {
            name: name.to_string(),
            table: options.table,
            query,
            params,
            parser: self.config.parser.clone(),
            operators,
            default_filter,
            primary_keys,
            schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamType;
    use crate::filtering::conditions::Condition;
    use crate::filtering::operators::CustomOperator;
    use serde_json::json;

    #[test]
    fn test_collision_fails_at_registration() {
        let mut registry = RouteRegistry::default();
        let err = registry
            .register(
                "users",
                RouteOptions::new("users").operator(CustomOperator::template("eq", false, "{field} = :{param}")),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::OperatorCollision { ref name } if name == "$eq"));
        assert!(registry.get("users").is_none());
    }

    #[test]
    fn test_custom_operators_do_not_leak_between_routes() {
        let mut registry = RouteRegistry::default();
        let users = registry
            .register(
                "users",
                RouteOptions::new("users").operator(CustomOperator::template("$lengthGt", false, "LENGTH({field}) > :{param}")),
            )
            .unwrap();
        let posts = registry.register("posts", RouteOptions::new("posts")).unwrap();

        assert!(users.operators.lookup("$lengthGt").is_ok());
        assert!(posts.operators.lookup("$lengthGt").is_err());
    }

    #[test]
    fn test_no_default_filter_is_unrestricted() {
        let mut registry = RouteRegistry::default();
        let route = registry.register("users", RouteOptions::new("users")).unwrap();
        assert_eq!(route.default_filter, CombinatorNode::default());
        assert!(route.default_filter.is_empty());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["users"]);
    }

    #[test]
    fn test_default_filter_compiled() {
        let mut registry = RouteRegistry::default();
        let options = RouteOptions::new("users").query(QueryOptions {
            filter: Some(DefaultFilter::Search(json!({"active": true}))),
            ..QueryOptions::default()
        });
        let route = registry.register("users", options).unwrap();
        assert_eq!(
            route.default_filter,
            CombinatorNode::Leaf(Condition::new("active", "$eq", true))
        );
    }

    #[test]
    fn test_default_filter_unknown_operator() {
        let mut registry = RouteRegistry::default();
        let options = RouteOptions::new("users").query(QueryOptions {
            filter: Some(DefaultFilter::Conditions(vec![Condition::new("a", "$nope", 1)])),
            ..QueryOptions::default()
        });
        let err = registry.register("users", options).unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator { .. }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_duplicate_route_name() {
        let mut registry = RouteRegistry::default();
        registry.register("users", RouteOptions::new("users")).unwrap();
        let err = registry.register("users", RouteOptions::new("users")).unwrap_err();
        assert!(matches!(err, QueryError::InvalidConfig { .. }));
    }

    #[test]
    fn test_global_defaults_and_params_merged() {
        let mut config = CrudConfig::default();
        config.query.max_limit = Some(50);
        config
            .params
            .insert("tenant".into(), ParamOption::new("tenant_id", ParamType::Number));

        let mut registry = RouteRegistry::new(config);
        let route = registry
            .register(
                "users",
                RouteOptions::new("users").param("id", ParamOption::new("id", ParamType::Number).primary()),
            )
            .unwrap();
        assert_eq!(route.query.max_limit, Some(50));
        assert_eq!(route.params.len(), 2);
        assert_eq!(route.primary_keys, vec!["id"]);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["users"]);
    }

    #[test]
    fn test_invalid_table_rejected() {
        let mut registry = RouteRegistry::default();
        assert!(registry.register("bad", RouteOptions::new("users; drop")).is_err());
        assert!(registry.register("dotted", RouteOptions::new("public.users")).is_err());
    }

    #[test]
    fn test_action_scopes() {
        assert!(CrudAction::ReadAll.is_many());
        assert!(!CrudAction::ReadOne.is_many());
        assert!(CrudAction::ReadOne.is_read());
        assert!(!CrudAction::DeleteOne.is_read());
    }
}
