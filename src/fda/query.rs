//! openFDA filter-expression renderer.
//!
//! The endpoints take a `search` parameter in a small field-literal
//! language: `field:value`, `field:[lo TO hi]`, clauses joined by `AND`,
//! alternatives grouped with `OR`. Multi-word literals are quoted. URL
//! escaping (including `+` as `%2B`) happens at the request layer; the
//! expression kept for provenance is the readable unescaped form.

use std::fmt::Write;

/// Sentinel for an open lower date bound.
pub const DATE_MIN: &str = "19000101";

/// Sentinel for an open upper date bound.
pub const DATE_MAX: &str = "30001231";

/// Builds a filter expression clause by clause.
///
/// # Examples
///
/// ```
/// use openfda_agent::fda::QueryBuilder;
///
/// let expr = QueryBuilder::new()
///     .field("device_class", "2")
///     .field("device_name", "surgical mask")
///     .build();
/// assert_eq!(expr, r#"device_class:2 AND device_name:"surgical mask""#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    clauses: Vec<String>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `field:value` clause. Values with whitespace are quoted.
    #[must_use]
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.clauses.push(format!("{name}:{}", render_literal(value)));
        self
    }

    /// Adds a `field:value` clause only when `value` is `Some`.
    #[must_use]
    pub fn opt_field(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.field(name, v),
            None => self,
        }
    }

    /// Adds a `(field:a OR field:b ...)` group. No-op for an empty list;
    /// a single value degenerates to a plain clause.
    #[must_use]
    pub fn any_of<S: AsRef<str>>(mut self, name: &str, values: &[S]) -> Self {
        match values {
            [] => self,
            [single] => self.field(name, single.as_ref()),
            many => {
                let mut group = String::from("(");
                for (i, value) in many.iter().enumerate() {
                    if i > 0 {
                        group.push_str(" OR ");
                    }
                    let _ = write!(group, "{name}:{}", render_literal(value.as_ref()));
                }
                group.push(')');
                self.clauses.push(group);
                self
            }
        }
    }

    /// Adds a `field:[lo TO hi]` range clause. Open bounds render with
    /// the [`DATE_MIN`]/[`DATE_MAX`] sentinels; both absent is a no-op.
    #[must_use]
    pub fn date_range(mut self, name: &str, start: Option<&str>, end: Option<&str>) -> Self {
        if start.is_none() && end.is_none() {
            return self;
        }
        let lo = start.unwrap_or(DATE_MIN);
        let hi = end.unwrap_or(DATE_MAX);
        self.clauses.push(format!("{name}:[{lo} TO {hi}]"));
        self
    }

    /// True when no clause has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Renders the expression, clauses joined by `AND`.
    #[must_use]
    pub fn build(self) -> String {
        self.clauses.join(" AND ")
    }
}

/// Quotes a literal when it contains whitespace; strips embedded quotes
/// so user text cannot break out of the expression.
fn render_literal(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| *c != '"').collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().any(char::is_whitespace) {
        format!("\"{cleaned}\"")
    } else {
        cleaned.to_string()
    }
}
