//! Small SQL fragment builders shared by the analytics managers.
//!
//! `Conditions` is the one place where "first predicate gets `where`, the
//! rest get `and`" is decided, so empty clause stages never leave dangling
//! keywords behind.

use std::fmt::Write as _;

/// Ordered list of predicates joined into a WHERE clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    predicates: Vec<String>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate; blank fragments are ignored.
    pub fn push(&mut self, predicate: impl Into<String>) -> &mut Self {
        let predicate = predicate.into();
        if !predicate.trim().is_empty() {
            self.predicates.push(predicate);
        }
        self
    }

    pub fn extend<I, S>(&mut self, predicates: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for p in predicates {
            self.push(p);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    /// `where a and b ...`, or an empty string.
    pub fn render(&self) -> String {
        let mut sql = String::new();
        for (idx, predicate) in self.predicates.iter().enumerate() {
            let keyword = if idx == 0 { "where" } else { "and" };
            let _ = write!(sql, "{keyword} {predicate} ");
        }
        sql.trim_end().to_string()
    }

    /// Predicates joined with `and`, without a leading keyword.
    pub fn joined(&self) -> String {
        self.predicates.join(" and ")
    }
}

/// Join fragments with `or`, parenthesised when more than one remains.
pub fn or_group(fragments: &[String]) -> String {
    let parts: Vec<&str> = fragments
        .iter()
        .map(String::as_str)
        .filter(|f| !f.trim().is_empty())
        .collect();
    match parts.len() {
        0 => String::new(),
        1 => parts[0].to_string(),
        _ => format!("({})", parts.join(" or ")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub expr: String,
    pub ascending: bool,
    pub nulls: Option<NullsOrder>,
}

impl OrderItem {
    pub fn asc(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            ascending: true,
            nulls: None,
        }
    }

    pub fn desc(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            ascending: false,
            nulls: None,
        }
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    fn render(&self) -> String {
        let dir = if self.ascending { "asc" } else { "desc" };
        match self.nulls {
            Some(NullsOrder::First) => format!("{} {dir} nulls first", self.expr),
            Some(NullsOrder::Last) => format!("{} {dir} nulls last", self.expr),
            None => format!("{} {dir}", self.expr),
        }
    }
}

/// One composed SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectStatement {
    pub columns: Vec<String>,
    pub from: String,
    pub conditions: Conditions,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectStatement {
    pub fn render(&self) -> String {
        let mut sql = format!("select {} from {}", self.columns.join(","), self.from);

        let where_clause = self.conditions.render();
        if !where_clause.is_empty() {
            sql.push(' ');
            sql.push_str(&where_clause);
        }

        if !self.group_by.is_empty() {
            let _ = write!(sql, " group by {}", self.group_by.join(","));
        }

        if !self.order_by.is_empty() {
            let orders: Vec<String> = self.order_by.iter().map(OrderItem::render).collect();
            let _ = write!(sql, " order by {}", orders.join(","));
        }

        if let Some(limit) = self.limit {
            let _ = write!(sql, " limit {limit}");
        }
        if let Some(offset) = self.offset {
            let _ = write!(sql, " offset {offset}");
        }

        sql
    }
}
