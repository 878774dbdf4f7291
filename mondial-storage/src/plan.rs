//! Query plans: SQL text with positional `?` placeholders plus ordered binds.
//!
//! A [`QueryPlan`] is immutable once built. [`PlanBuilder`] appends each
//! predicate and its bind values in one call, so the i-th placeholder always
//! answers the i-th bind. Both constructors re-count placeholders and reject a
//! plan whose count differs from its bind list.

use std::fmt;

use mondial_core::{MondialResult, QueryError, SqlValue};

/// A compiled statement: SQL template plus ordered bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    sql: String,
    binds: Vec<SqlValue>,
}

impl QueryPlan {
    /// Build a plan from hand-written SQL.
    pub fn new(sql: impl Into<String>, binds: Vec<SqlValue>) -> MondialResult<Self> {
        let sql = sql.into();
        let placeholders = count_placeholders(&sql);
        if placeholders != binds.len() {
            return Err(QueryError::ParamBindingMismatch {
                placeholders,
                binds: binds.len(),
            }
            .into());
        }
        Ok(Self { sql, binds })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[SqlValue] {
        &self.binds
    }

    pub fn placeholder_count(&self) -> usize {
        self.binds.len()
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.binds)
    }

    /// Render with numbered placeholders (`$1..$n`).
    pub fn to_numbered(&self) -> String {
        self.render(|n, _| format!("${}", n))
    }

    /// Render each placeholder through `placeholder(position, bind)`, where
    /// `position` is 1-based. Single-quoted literals are copied untouched.
    pub fn render<F>(&self, mut placeholder: F) -> String
    where
        F: FnMut(usize, &SqlValue) -> String,
    {
        let mut out = String::with_capacity(self.sql.len() + self.binds.len() * 2);
        let mut binds = self.binds.iter();
        let mut position = 0;
        for (c, in_literal) in scan(&self.sql) {
            if c == '?' && !in_literal {
                position += 1;
                match binds.next() {
                    Some(value) => out.push_str(&placeholder(position, value)),
                    None => out.push(c),
                }
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|_, value| value.to_string()))
    }
}

/// Walk `sql`, flagging characters inside single-quoted literals.
///
/// A doubled quote inside a literal closes and reopens it, which leaves the
/// flag correct for every character that could be a placeholder.
fn scan(sql: &str) -> impl Iterator<Item = (char, bool)> + '_ {
    let mut in_literal = false;
    sql.chars().map(move |c| {
        if c == '\'' {
            in_literal = !in_literal;
            (c, true)
        } else {
            (c, in_literal)
        }
    })
}

/// Count `?` placeholders outside single-quoted literals.
pub fn count_placeholders(sql: &str) -> usize {
    scan(sql)
        .filter(|(c, in_literal)| *c == '?' && !in_literal)
        .count()
}

/// Incremental plan construction.
///
/// Predicates are joined with `WHERE` for the first and `AND` after that.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    sql: String,
    binds: Vec<SqlValue>,
    has_where: bool,
}

impl PlanBuilder {
    /// Start from a base statement that has no `WHERE` clause yet.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            sql: base.into(),
            binds: Vec::new(),
            has_where: false,
        }
    }

    /// Append a predicate together with the values for its placeholders.
    pub fn and_where<I>(&mut self, predicate: &str, binds: I) -> &mut Self
    where
        I: IntoIterator<Item = SqlValue>,
    {
        self.sql
            .push_str(if self.has_where { " AND " } else { " WHERE " });
        self.has_where = true;
        self.sql.push_str(predicate);
        self.binds.extend(binds);
        self
    }

    /// Append `column IN (?, ?, ...)` with one placeholder per value.
    pub fn and_where_in<I>(&mut self, column: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = SqlValue>,
    {
        let values: Vec<SqlValue> = values.into_iter().collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        self.and_where(&format!("{} IN ({})", column, placeholders), values)
    }

    pub fn build(self) -> MondialResult<QueryPlan> {
        QueryPlan::new(self.sql, self.binds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mondial_core::MondialError;

    #[test]
    fn test_count_skips_literals() {
        assert_eq!(count_placeholders("SELECT 1"), 0);
        assert_eq!(count_placeholders("a = ? AND b = ?"), 2);
        assert_eq!(count_placeholders("x LIKE ? ESCAPE '\\' AND y = '?'"), 1);
        assert_eq!(count_placeholders("x = 'it''s ?' AND y = ?"), 1);
    }

    #[test]
    fn test_new_rejects_mismatch() {
        let err = QueryPlan::new("SELECT * FROM city WHERE name = ?", vec![]).unwrap_err();
        assert_eq!(
            err,
            MondialError::Query(QueryError::ParamBindingMismatch {
                placeholders: 1,
                binds: 0
            })
        );
    }

    #[test]
    fn test_builder_lockstep() {
        let mut builder = PlanBuilder::new("SELECT name FROM province");
        builder
            .and_where("capital = ?", [SqlValue::from("Bern")])
            .and_where("population >= ?", [SqlValue::from(1000i64)]);
        let plan = builder.build().unwrap();
        assert_eq!(
            plan.sql(),
            "SELECT name FROM province WHERE capital = ? AND population >= ?"
        );
        assert_eq!(
            plan.binds(),
            &[SqlValue::from("Bern"), SqlValue::from(1000i64)]
        );
    }

    #[test]
    fn test_where_in() {
        let mut builder = PlanBuilder::new("SELECT * FROM city");
        builder.and_where_in("name", ["Paris", "Madrid"].map(SqlValue::from));
        let plan = builder.build().unwrap();
        assert_eq!(plan.sql(), "SELECT * FROM city WHERE name IN (?, ?)");
        assert_eq!(plan.placeholder_count(), 2);
    }

    #[test]
    fn test_to_numbered() {
        let plan = QueryPlan::new(
            "SELECT 'a?' AS t FROM place WHERE name LIKE ? ESCAPE '\\' AND population <= ?",
            vec![SqlValue::from("B%"), SqlValue::from(5i64)],
        )
        .unwrap();
        assert_eq!(
            plan.to_numbered(),
            "SELECT 'a?' AS t FROM place WHERE name LIKE $1 ESCAPE '\\' AND population <= $2"
        );
    }

    #[test]
    fn test_display_inlines_binds() {
        let plan = QueryPlan::new(
            "SELECT * FROM city WHERE name = ? AND population > ?",
            vec![SqlValue::from("L'Aquila"), SqlValue::from(10i64)],
        )
        .unwrap();
        assert_eq!(
            plan.to_string(),
            "SELECT * FROM city WHERE name = 'L''Aquila' AND population > 10"
        );
    }
}
