//! SQL compilation of visibility predicates and filter expressions.
//!
//! Every literal from the caller becomes a bound parameter; the only text
//! interpolated into SQL is column names rendered from the [`Field`]
//! allow-list and operators chosen here. The visibility predicates are
//! OR-joined, the user filter is ANDed on top, and the paginated SELECT and
//! the COUNT share one WHERE clause.

use crate::error::{StoreError, StoreResult};
use alcove_core::filter::{Comparison, Field, Filter, MatchOp, OrderSpec};
use alcove_core::permission::{OwnerConstraint, ScopePredicate};
use uuid::Uuid;

/// Parameter placeholder style of the target dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamStyle {
    /// `$1, $2, ...` (PostgreSQL).
    Dollar,
    /// `?` (SQLite).
    Question,
}

impl ParamStyle {
    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Dollar => format!("${index}"),
            Self::Question => "?".to_string(),
        }
    }
}

/// A value bound into a compiled query.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Text(String),
    Uuid(Uuid),
    Int(i64),
}

/// A compiled listing query: shared WHERE text plus binds, with pagination
/// kept separate so the COUNT statement can reuse the filter unchanged.
#[derive(Clone, Debug)]
pub struct CompiledQuery {
    where_sql: String,
    order_sql: Option<String>,
    binds: Vec<BindValue>,
    limit: i64,
    offset: i64,
    style: ParamStyle,
}

impl CompiledQuery {
    /// The paginated `SELECT *` statement.
    pub fn select_sql(&self, table: &str) -> String {
        let mut sql = format!(
            "SELECT id, scope, key, value, owner FROM {table} WHERE {}",
            self.where_sql
        );
        if let Some(order) = &self.order_sql {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        let limit = self.style.placeholder(self.binds.len() + 1);
        let offset = self.style.placeholder(self.binds.len() + 2);
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        sql
    }

    /// The matching `SELECT COUNT(*)` statement.
    pub fn count_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {table} WHERE {}", self.where_sql)
    }

    /// Binds for the COUNT statement.
    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }

    /// Binds for the SELECT statement: the filter binds plus limit/offset.
    pub fn page_binds(&self) -> Vec<BindValue> {
        let mut binds = self.binds.clone();
        binds.push(BindValue::Int(self.limit));
        binds.push(BindValue::Int(self.offset));
        binds
    }
}

/// Compile visibility predicates and an optional filter into one query.
///
/// `visibility` must be non-empty; an empty predicate set means the caller
/// may list nothing and must be rejected before compilation.
pub fn compile(
    style: ParamStyle,
    visibility: &[ScopePredicate],
    filter: Option<&Filter>,
    order: Option<OrderSpec>,
    limit: i64,
    offset: i64,
) -> StoreResult<CompiledQuery> {
    debug_assert!(!visibility.is_empty());
    let mut builder = SqlBuilder {
        sql: String::new(),
        binds: Vec::new(),
        style,
    };

    builder.push("(");
    for (i, predicate) in visibility.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder.scope_predicate(predicate);
    }
    builder.push(")");

    if let Some(filter) = filter {
        builder.push(" AND (");
        builder.filter(filter)?;
        builder.push(")");
    }

    let order_sql = order.map(|o| {
        format!(
            "{} {}",
            o.field.column(),
            if o.descending { "DESC" } else { "ASC" }
        )
    });

    Ok(CompiledQuery {
        where_sql: builder.sql,
        order_sql,
        binds: builder.binds,
        limit,
        offset,
        style,
    })
}

struct SqlBuilder {
    sql: String,
    binds: Vec<BindValue>,
    style: ParamStyle,
}

impl SqlBuilder {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: BindValue) {
        self.binds.push(value);
        let placeholder = self.style.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
    }

    fn scope_predicate(&mut self, predicate: &ScopePredicate) {
        self.push("(scope = ");
        self.bind(BindValue::Text(predicate.scope.clone()));
        match predicate.owner {
            OwnerConstraint::Any => {}
            OwnerConstraint::GlobalOnly => self.push(" AND owner IS NULL"),
            OwnerConstraint::OwnerOnly(caller) => {
                self.push(" AND owner = ");
                self.bind(BindValue::Uuid(caller));
            }
            OwnerConstraint::GlobalOrOwner(caller) => {
                self.push(" AND (owner IS NULL OR owner = ");
                self.bind(BindValue::Uuid(caller));
                self.push(")");
            }
        }
        self.push(")");
    }

    fn filter(&mut self, filter: &Filter) -> StoreResult<()> {
        match filter {
            Filter::Cmp(cmp) => self.comparison(cmp),
            Filter::And(left, right) => {
                self.push("(");
                self.filter(left)?;
                self.push(" AND ");
                self.filter(right)?;
                self.push(")");
                Ok(())
            }
            Filter::Or(left, right) => {
                self.push("(");
                self.filter(left)?;
                self.push(" OR ");
                self.filter(right)?;
                self.push(")");
                Ok(())
            }
        }
    }

    fn comparison(&mut self, cmp: &Comparison) -> StoreResult<()> {
        match (cmp.field, cmp.op) {
            (Field::Id | Field::Owner, MatchOp::Exact) => {
                let uuid = Uuid::parse_str(&cmp.value).map_err(|_| {
                    StoreError::User(format!(
                        "{} must be a UUID, got '{}'",
                        cmp.field.column(),
                        cmp.value
                    ))
                })?;
                self.push(cmp.field.column());
                self.push(" = ");
                self.bind(BindValue::Uuid(uuid));
            }
            (Field::Scope | Field::Key, MatchOp::Exact) => {
                self.push(cmp.field.column());
                self.push(" = ");
                self.bind(BindValue::Text(cmp.value.clone()));
            }
            (Field::Key, MatchOp::Prefix) => {
                self.push("key LIKE ");
                self.bind(BindValue::Text(format!("{}%", escape_like(&cmp.value))));
                self.push(" ESCAPE '\\'");
            }
            // The filter parser already rejects prefix on non-key fields.
            (field, MatchOp::Prefix) => {
                return Err(StoreError::User(format!(
                    "prefix match is not supported on '{}'",
                    field.column()
                )));
            }
        }
        Ok(())
    }
}

/// Escape LIKE metacharacters so a prefix value matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
