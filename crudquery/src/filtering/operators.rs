//! Operator catalog and per-route overlays.
//!
//! Built-in operators live in a process-wide table that is never mutated.
//! Custom operators are supplied per route and merged into an
//! [`OperatorRegistry`] overlay when the route is registered, so a custom
//! operator is only visible to the route that declared it.

use sea_orm::{
    DatabaseBackend, Value,
    sea_query::{Alias, Expr, Func, LikeExpr, SimpleExpr},
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::conditions::{Condition, FilterValue, Scalar, normalize_operator_name};
use crate::errors::{QueryError, QueryResult};

/// How many values an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No value (`$isnull`, `$notnull`)
    Unary,
    /// Exactly one scalar
    Scalar,
    /// A non-empty list
    List,
    /// A list of exactly two values
    Pair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Starts,
    Ends,
    Cont,
    Excl,
    In,
    NotIn,
    IsNull,
    NotNull,
    Between,
    EqL,
    NeL,
    StartsL,
    EndsL,
    ContL,
    ExclL,
    InL,
    NotInL,
}

impl BuiltinOperator {
    pub const ALL: [Self; 23] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Lt,
        Self::Gte,
        Self::Lte,
        Self::Starts,
        Self::Ends,
        Self::Cont,
        Self::Excl,
        Self::In,
        Self::NotIn,
        Self::IsNull,
        Self::NotNull,
        Self::Between,
        Self::EqL,
        Self::NeL,
        Self::StartsL,
        Self::EndsL,
        Self::ContL,
        Self::ExclL,
        Self::InL,
        Self::NotInL,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Lt => "$lt",
            Self::Gte => "$gte",
            Self::Lte => "$lte",
            Self::Starts => "$starts",
            Self::Ends => "$ends",
            Self::Cont => "$cont",
            Self::Excl => "$excl",
            Self::In => "$in",
            Self::NotIn => "$notin",
            Self::IsNull => "$isnull",
            Self::NotNull => "$notnull",
            Self::Between => "$between",
            Self::EqL => "$eqL",
            Self::NeL => "$neL",
            Self::StartsL => "$startsL",
            Self::EndsL => "$endsL",
            Self::ContL => "$contL",
            Self::ExclL => "$exclL",
            Self::InL => "$inL",
            Self::NotInL => "$notinL",
        }
    }

    #[must_use]
    pub const fn arity(self) -> Arity {
        match self {
            Self::IsNull | Self::NotNull => Arity::Unary,
            Self::In | Self::NotIn | Self::InL | Self::NotInL => Arity::List,
            Self::Between => Arity::Pair,
            _ => Arity::Scalar,
        }
    }

    /// Look up a built-in by name, with or without the `$` prefix
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        BUILTIN_OPERATORS
            .get(normalize_operator_name(name).as_str())
            .copied()
    }
}

impl fmt::Display for BuiltinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static BUILTIN_OPERATORS: LazyLock<HashMap<&'static str, BuiltinOperator>> = LazyLock::new(|| {
    BuiltinOperator::ALL
        .iter()
        .map(|op| (op.name(), *op))
        .collect()
});

/// Renders the SQL fragment of a custom operator from the quoted column and
/// the parameter name, e.g. `|field, param| format!("{field} = :{param}")`.
pub type QueryTemplateFn = dyn Fn(&str, &str) -> String + Send + Sync;

/// A route-scoped operator with a caller-supplied SQL template.
///
/// Templates reference the value as `:param` (one placeholder) or
/// `:...param` (one placeholder per list element).
#[derive(Clone)]
pub struct CustomOperator {
    name: String,
    is_array: bool,
    query: Arc<QueryTemplateFn>,
}

impl CustomOperator {
    pub fn new<F>(name: &str, is_array: bool, query: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Self {
            name: normalize_operator_name(name),
            is_array,
            query: Arc::new(query),
        }
    }

    /// Build an operator from a string template using `{field}` and `{param}`
    /// markers, e.g. `"{field} IN (:...{param})"`.
    #[must_use]
    pub fn template(name: &str, is_array: bool, template: &str) -> Self {
        let template = template.to_string();
        Self::new(name, is_array, move |field, param| {
            template.replace("{field}", field).replace("{param}", param)
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    #[must_use]
    pub fn render(&self, field: &str, param: &str) -> String {
        (self.query)(field, param)
    }
}

impl fmt::Debug for CustomOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperator")
            .field("name", &self.name)
            .field("is_array", &self.is_array)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum OperatorDefinition {
    Builtin(BuiltinOperator),
    Custom(CustomOperator),
}

impl OperatorDefinition {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(op) => op.name(),
            Self::Custom(op) => op.name(),
        }
    }

    #[must_use]
    pub fn arity(&self) -> Arity {
        match self {
            Self::Builtin(op) => op.arity(),
            Self::Custom(op) if op.is_array() => Arity::List,
            Self::Custom(_) => Arity::Scalar,
        }
    }

    /// Whether the query string splits this operator's value into a list
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.arity(), Arity::List | Arity::Pair)
    }
}

/// A column reference resolved by the planner: the table alias (base entity
/// or join alias) and the column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub table: Option<String>,
    pub column: String,
}

impl FieldRef {
    pub fn new(table: Option<&str>, column: impl Into<String>) -> Self {
        Self {
            table: table.map(str::to_string),
            column: column.into(),
        }
    }

    pub(crate) fn expr(&self) -> Expr {
        match &self.table {
            Some(table) => Expr::col((Alias::new(table), Alias::new(&self.column))),
            None => Expr::col(Alias::new(&self.column)),
        }
    }

    fn lowered(&self) -> Expr {
        Expr::expr(Func::lower(self.expr()))
    }

    /// Quote identifier (double quotes for Postgres/SQLite, backticks for MySQL)
    #[must_use]
    pub fn quoted(&self, backend: DatabaseBackend) -> String {
        let quote = |identifier: &str| match backend {
            DatabaseBackend::MySql => format!("`{}`", identifier.replace('`', "``")),
            DatabaseBackend::Postgres | DatabaseBackend::Sqlite => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
        };
        match &self.table {
            Some(table) => format!("{}.{}", quote(table), quote(&self.column)),
            None => quote(&self.column),
        }
    }
}

/// Escape LIKE wildcards: `\` first, then `%` and `_`
fn escape_like_wildcards(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like(pattern: String) -> LikeExpr {
    LikeExpr::new(pattern).escape('\\')
}

fn never_matches() -> SimpleExpr {
    Expr::cust("1 = 0")
}

/// Built-in table plus the custom operators of one route.
///
/// Cloning is cheap; the overlay is shared behind an `Arc` and never mutated
/// after construction.
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    custom: Arc<BTreeMap<String, CustomOperator>>,
}

impl OperatorRegistry {
    /// Registry with only the built-in operators
    #[must_use]
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Registry overlaying `custom` on the built-ins.
    ///
    /// # Errors
    ///
    /// - [`QueryError::OperatorCollision`] if a custom name shadows a built-in
    /// - [`QueryError::InvalidConfig`] for an empty or duplicated name
    pub fn with_custom<I>(custom: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = CustomOperator>,
    {
        let mut overlay = BTreeMap::new();
        for operator in custom {
            if operator.name().len() < 2 {
                return Err(QueryError::invalid_config("custom operator name must not be empty"));
            }
            if BuiltinOperator::from_name(operator.name()).is_some() {
                return Err(QueryError::operator_collision(operator.name()));
            }
            if overlay.contains_key(operator.name()) {
                return Err(QueryError::invalid_config(format!(
                    "custom operator '{}' is declared twice",
                    operator.name()
                )));
            }
            overlay.insert(operator.name().to_string(), operator);
        }
        Ok(Self {
            custom: Arc::new(overlay),
        })
    }

    /// Names of the route's custom operators
    pub fn custom_names(&self) -> impl Iterator<Item = &str> {
        self.custom.keys().map(String::as_str)
    }

    /// Resolve an operator name (with or without `$`).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownOperator`] when neither the built-ins nor
    /// the overlay define the name.
    pub fn lookup(&self, name: &str) -> QueryResult<OperatorDefinition> {
        let name = normalize_operator_name(name);
        if let Some(op) = BuiltinOperator::from_name(&name) {
            return Ok(OperatorDefinition::Builtin(op));
        }
        self.custom
            .get(&name)
            .cloned()
            .map(OperatorDefinition::Custom)
            .ok_or_else(|| QueryError::unknown_operator(name))
    }

    /// Check a condition's field, operator and value arity, returning it with
    /// its operator name normalised and value-less operators cleared.
    ///
    /// # Errors
    ///
    /// [`QueryError::UnknownOperator`] for an unknown operator, otherwise
    /// [`QueryError::Validation`] for an empty field or a value of the wrong
    /// shape.
    pub fn validate(&self, mut condition: Condition) -> QueryResult<Condition> {
        if condition.field.is_empty() {
            return Err(QueryError::validation(
                "field",
                format!("condition with operator '{}' has no field", condition.operator),
            ));
        }
        let definition = self.lookup(&condition.operator)?;
        condition.operator = definition.name().to_string();
        let field = condition.field.clone();
        let op = definition.name();

        match (definition.arity(), &condition.value) {
            (Arity::Unary, _) => condition.value = FilterValue::Null,
            (Arity::Scalar, FilterValue::List(_)) => {
                return Err(QueryError::validation(
                    field,
                    format!("operator '{op}' expects a single value"),
                ));
            }
            (Arity::Scalar, _) => {}
            (Arity::List, FilterValue::List(values)) if !values.is_empty() => {}
            (Arity::List, _) => {
                return Err(QueryError::validation(
                    field,
                    format!("operator '{op}' expects a non-empty array"),
                ));
            }
            (Arity::Pair, FilterValue::List(values)) if values.len() == 2 => {}
            (Arity::Pair, _) => {
                return Err(QueryError::validation(
                    field,
                    format!("operator '{op}' expects an array of exactly two values"),
                ));
            }
        }
        Ok(condition)
    }

    /// Emit the query fragment for a validated condition.
    ///
    /// `param` names the bound parameter for custom templates; built-ins bind
    /// their values directly.
    ///
    /// # Errors
    ///
    /// Fails if the operator is unknown or the value does not fit its arity.
    pub fn emit(
        &self,
        condition: &Condition,
        target: &FieldRef,
        param: &str,
        backend: DatabaseBackend,
    ) -> QueryResult<SimpleExpr> {
        let condition = self.validate(condition.clone())?;
        match self.lookup(&condition.operator)? {
            OperatorDefinition::Builtin(op) => Ok(emit_builtin(op, &condition.value, target)),
            OperatorDefinition::Custom(op) => Ok(emit_custom(&op, &condition.value, target, param, backend)),
        }
    }
}

fn emit_builtin(op: BuiltinOperator, value: &FilterValue, target: &FieldRef) -> SimpleExpr {
    use BuiltinOperator as B;

    match (op, value) {
        (B::IsNull, _) => target.expr().is_null(),
        (B::NotNull, _) => target.expr().is_not_null(),
        (B::In, FilterValue::List(values)) => target.expr().is_in(values.iter().cloned().map(Value::from)),
        (B::NotIn, FilterValue::List(values)) => {
            target.expr().is_not_in(values.iter().cloned().map(Value::from))
        }
        (B::InL, FilterValue::List(values)) => target
            .lowered()
            .is_in(values.iter().map(|v| Value::from(v.to_lowercase()))),
        (B::NotInL, FilterValue::List(values)) => target
            .lowered()
            .is_not_in(values.iter().map(|v| Value::from(v.to_lowercase()))),
        (B::Between, FilterValue::List(values)) => match values.as_slice() {
            [low, high] => target
                .expr()
                .between(Value::from(low.clone()), Value::from(high.clone())),
            _ => never_matches(),
        },
        (_, FilterValue::Scalar(scalar)) => emit_scalar(op, scalar, target),
        // `= NULL` and friends never match; validated lists cannot reach here
        _ => never_matches(),
    }
}

fn emit_scalar(op: BuiltinOperator, scalar: &Scalar, target: &FieldRef) -> SimpleExpr {
    use BuiltinOperator as B;

    let value = || Value::from(scalar.clone());
    let text = || escape_like_wildcards(&scalar.as_text());
    let lower_text = || escape_like_wildcards(&scalar.as_text().to_lowercase());

    match op {
        B::Eq => target.expr().eq(value()),
        B::Ne => target.expr().ne(value()),
        B::Gt => target.expr().gt(value()),
        B::Lt => target.expr().lt(value()),
        B::Gte => target.expr().gte(value()),
        B::Lte => target.expr().lte(value()),
        B::Starts => target.expr().like(like(format!("{}%", text()))),
        B::Ends => target.expr().like(like(format!("%{}", text()))),
        B::Cont => target.expr().like(like(format!("%{}%", text()))),
        B::Excl => target.expr().not_like(like(format!("%{}%", text()))),
        B::EqL => target.lowered().eq(Value::from(scalar.to_lowercase())),
        B::NeL => target.lowered().ne(Value::from(scalar.to_lowercase())),
        B::StartsL => target.lowered().like(like(format!("{}%", lower_text()))),
        B::EndsL => target.lowered().like(like(format!("%{}", lower_text()))),
        B::ContL => target.lowered().like(like(format!("%{}%", lower_text()))),
        B::ExclL => target.lowered().not_like(like(format!("%{}%", lower_text()))),
        B::In | B::NotIn | B::InL | B::NotInL | B::Between | B::IsNull | B::NotNull => {
            never_matches()
        }
    }
}

fn emit_custom(
    op: &CustomOperator,
    value: &FilterValue,
    target: &FieldRef,
    param: &str,
    backend: DatabaseBackend,
) -> SimpleExpr {
    let template = op.render(&target.quoted(backend), param);
    let values: Vec<Value> = match value {
        FilterValue::Null => return never_matches(),
        FilterValue::Scalar(scalar) => vec![Value::from(scalar.clone())],
        FilterValue::List(items) => items.iter().cloned().map(Value::from).collect(),
    };
    let (sql, bound) = bind_template(&template, param, &values);
    Expr::cust_with_values(sql, bound)
}

/// Replace `:...param` with one `?` per value and `:param` with a single `?`,
/// collecting the bound values in placeholder order.
fn bind_template(template: &str, param: &str, values: &[Value]) -> (String, Vec<Value>) {
    let spread = format!(":...{param}");
    let single = format!(":{param}");
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';

    let mut sql = String::with_capacity(template.len());
    let mut bound = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(':') {
        sql.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let matched = [(&spread, true), (&single, false)].into_iter().find(|(marker, _)| {
            tail.starts_with(marker.as_str())
                && !tail[marker.len()..].chars().next().is_some_and(is_ident)
        });
        match matched {
            Some((marker, true)) => {
                sql.push_str(&vec!["?"; values.len()].join(", "));
                bound.extend(values.iter().cloned());
                rest = &tail[marker.len()..];
            }
            Some((marker, false)) => {
                sql.push('?');
                bound.extend(values.first().cloned());
                rest = &tail[marker.len()..];
            }
            None => {
                sql.push(':');
                rest = &tail[1..];
            }
        }
    }
    sql.push_str(rest);
    (sql, bound)
}
