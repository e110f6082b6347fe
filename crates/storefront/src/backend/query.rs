//! Structured table queries.
//!
//! A [`Query`] describes what to read from one table: the columns, embedded
//! related rows, equality filters, an optional case-insensitive search across
//! several columns, ordering and a row limit. The Supabase backend renders it
//! into `PostgREST` query parameters; the in-memory backend evaluates it
//! directly against stored rows.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

/// Table names used by the catalog.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const PERMISSIONS: &str = "permissions";
    pub const USER_PERMISSIONS: &str = "user_permissions";
    pub const PRODUCTS: &str = "products";
    pub const CATEGORIES: &str = "categories";
    pub const CART_ITEMS: &str = "cart_items";
    pub const ORDERS: &str = "orders";
    pub const ORDER_ITEMS: &str = "order_items";
    pub const COMPANY_SETTINGS: &str = "company_settings";
}

// =============================================================================
// Filters
// =============================================================================

/// Equality filter on a column (`column=eq.value`).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: JsonValue,
}

impl Filter {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `PostgREST` parameter pair for this filter.
    #[must_use]
    pub fn to_param(&self) -> (String, String) {
        let rendered = match &self.value {
            JsonValue::Null => "is.null".to_owned(),
            value => format!("eq.{}", scalar_text(value)),
        };
        (self.column.clone(), rendered)
    }

    /// Whether a stored row satisfies the filter.
    #[must_use]
    pub fn matches(&self, row: &JsonValue) -> bool {
        let actual = row.get(&self.column).unwrap_or(&JsonValue::Null);
        match (&self.value, actual) {
            (JsonValue::Null, actual) => actual.is_null(),
            (expected, actual) => same_scalar(expected, actual),
        }
    }
}

/// Case-insensitive substring match on any of several columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub columns: Vec<String>,
    pub term: String,
}

impl Pattern {
    /// `PostgREST` `or=(...)` parameter value.
    #[must_use]
    pub fn to_param(&self) -> String {
        let value = quote_if_reserved(&format!("*{}*", self.term));
        let clauses: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("{column}.ilike.{value}"))
            .collect();
        format!("({})", clauses.join(","))
    }

    /// Whether any of the columns contains the term, ignoring case.
    #[must_use]
    pub fn matches(&self, row: &JsonValue) -> bool {
        let term = self.term.to_lowercase();
        self.columns.iter().any(|column| {
            row.get(column)
                .and_then(JsonValue::as_str)
                .is_some_and(|value| value.to_lowercase().contains(&term))
        })
    }
}

fn quote_if_reserved(value: &str) -> String {
    if value.contains([',', '(', ')', ':', '"', '\\']) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_owned()
    }
}

/// Equality as `PostgREST` sees it: values compared by their text form.
pub(crate) fn same_scalar(a: &JsonValue, b: &JsonValue) -> bool {
    scalar_text(a) == scalar_text(b)
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Embedded relations
// =============================================================================

/// How an embedded relation is joined to the parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Join {
    /// The parent holds the foreign key (`products.category_id`).
    ToOne { local_key: String },
    /// The related rows hold the foreign key (`products.category_id` seen from
    /// `categories`).
    ToMany { foreign_key: String },
}

/// A related table embedded in each result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub relation: String,
    pub alias: Option<String>,
    pub columns: Vec<String>,
    /// Drop parent rows without a related row.
    pub inner: bool,
    pub join: Join,
}

impl Embed {
    /// Embed the single row referenced by `local_key`.
    pub fn to_one(relation: impl Into<String>, local_key: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            alias: None,
            columns: Vec::new(),
            inner: false,
            join: Join::ToOne {
                local_key: local_key.into(),
            },
        }
    }

    /// Embed every row whose `foreign_key` references the parent.
    pub fn to_many(relation: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            alias: None,
            columns: Vec::new(),
            inner: false,
            join: Join::ToMany {
                foreign_key: foreign_key.into(),
            },
        }
    }

    /// Restrict the embedded columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Store the embedded value under `alias` instead of the table name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Inner join: parents without a related row are dropped.
    #[must_use]
    pub const fn inner(mut self) -> Self {
        self.inner = true;
        self
    }

    /// Key under which the embedded value appears in the row.
    #[must_use]
    pub fn key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.relation)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(alias) = &self.alias {
            out.push_str(alias);
            out.push(':');
        }
        out.push_str(&self.relation);
        if self.inner {
            out.push_str("!inner");
        }
        out.push('(');
        out.push_str(&render_columns(&self.columns));
        out.push(')');
        out
    }
}

fn render_columns(columns: &[String]) -> String {
    if columns.is_empty() {
        "*".to_owned()
    } else {
        columns.join(",")
    }
}

// =============================================================================
// Query
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// A read against a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<String>,
    pub embeds: Vec<Embed>,
    pub filters: Vec<Filter>,
    pub pattern: Option<Pattern>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// Select every column of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            embeds: Vec::new(),
            filters: Vec::new(),
            pattern: None,
            order: None,
            limit: None,
        }
    }

    /// Restrict the selected columns (empty means `*`).
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    /// Keep rows where any of `columns` contains `term`, ignoring case.
    #[must_use]
    pub fn search<I, S>(mut self, columns: I, term: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern = Some(Pattern {
            columns: columns.into_iter().map(Into::into).collect(),
            term: term.into(),
        });
        self
    }

    #[must_use]
    pub fn order(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The `select=` parameter value.
    #[must_use]
    pub fn select_clause(&self) -> String {
        let mut parts = vec![render_columns(&self.columns)];
        parts.extend(self.embeds.iter().map(Embed::render));
        parts.join(",")
    }

    /// All `PostgREST` query parameters for this read.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_owned(), self.select_clause())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if let Some(pattern) = &self.pattern {
            params.push(("or".to_owned(), pattern.to_param()));
        }
        if let Some(order) = &self.order {
            let direction = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_owned(), format!("{}.{direction}", order.column)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_owned(), limit.to_string()));
        }
        params
    }
}

/// Compare two column values for ordering: nulls last, numbers numerically,
/// everything else by text.
#[must_use]
pub fn compare_values(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
        (JsonValue::Null, _) => Ordering::Greater,
        (_, JsonValue::Null) => Ordering::Less,
        (JsonValue::Number(x), JsonValue::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (x, y) => scalar_text(x).cmp(&scalar_text(y)),
    }
}
