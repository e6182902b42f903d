
use common::{DbError, DbResult, Row};
use std::cmp::Ordering;
#[allow(unused_imports)]
use types::{SqlType, Value};

/// Binary comparison and logical operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators (currently just logical NOT).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
}

/// Expression abstract syntax tree.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Column reference with optional table/alias qualifier.
    ///
    /// Examples:
    /// - `Column { table: None, name: "id" }` - unqualified column
    /// - `Column { table: Some("users"), name: "id" }` - qualified column
    /// - `Column { table: Some("u"), name: "id" }` - alias-qualified column
    Column {
        /// Optional table name or alias qualifier.
        table: Option<String>,
        /// Column name.
        name: String,
    },
    /// Named bind parameter (`@name` in source SQL), resolved to an index
    /// into the prepared statement's bound-value vector at plan time.
    Parameter(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// `expr [NOT] IN (list)`.
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `expr [NOT] LIKE pattern`, with SQL `%`/`_` wildcards.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
}

/// Evaluation context consisting of the row schema (column names in order).
pub struct EvalContext<'a> {
    pub schema: &'a [String],
}

impl<'a> EvalContext<'a> {
    /// Evaluate an expression over a given row.
    pub fn eval(&self, expr: &Expr, row: &Row) -> DbResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column { table, name } => {
                let idx = self.find_column(table.as_deref(), name)?;
                Ok(row.values[idx].clone())
            }
            Expr::Parameter(name) => Err(DbError::Executor(format!(
                "parameter '@{}' cannot be evaluated without a bound value",
                name
            ))),
            Expr::Unary { op, expr } => {
                let v = self.eval(expr, row)?;
                match op {
                    UnaryOp::Not => {
                        let b = v.as_bool().ok_or_else(|| {
                            DbError::Executor(format!("NOT expects bool, got {:?}", v))
                        })?;
                        Ok(Value::Bool(!b))
                    }
                }
            }
            Expr::Binary { left, op, right } => {
                let lv = self.eval(left, row)?;
                let rv = self.eval(right, row)?;
                self.eval_binary(&lv, *op, &rv)
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let needle = self.eval(expr, row)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                let mut saw_null = false;
                for item in list {
                    let candidate = self.eval(item, row)?;
                    if candidate.is_null() {
                        saw_null = true;
                        continue;
                    }
                    if needle.cmp_same_type(&candidate) == Some(Ordering::Equal) {
                        found = true;
                        break;
                    }
                }
                Ok(match (found, saw_null) {
                    (true, _) => Value::Bool(!negated),
                    (false, true) => Value::Null,
                    (false, false) => Value::Bool(negated),
                })
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let value = self.eval(expr, row)?;
                let pattern_value = self.eval(pattern, row)?;
                if value.is_null() || pattern_value.is_null() {
                    return Ok(Value::Null);
                }
                let haystack = value.as_text().ok_or_else(|| {
                    DbError::Executor(format!("LIKE expects text, got {:?}", value))
                })?;
                let needle = pattern_value.as_text().ok_or_else(|| {
                    DbError::Executor(format!("LIKE pattern must be text, got {:?}", pattern_value))
                })?;
                let matched = like_match(haystack, needle);
                Ok(Value::Bool(matched != *negated))
            }
        }
    }

    fn eval_binary(&self, l: &Value, op: BinaryOp, r: &Value) -> DbResult<Value> {
        use BinaryOp::*;

        match op {
            And | Or => {
                let lb = l.as_bool().ok_or_else(|| {
                    DbError::Executor(format!("AND/OR expects bools, got {:?}", l))
                })?;
                let rb = r.as_bool().ok_or_else(|| {
                    DbError::Executor(format!("AND/OR expects bools, got {:?}", r))
                })?;
                return Ok(Value::Bool(match op {
                    And => lb && rb,
                    Or => lb || rb,
                    _ => unreachable!(),
                }));
            }
            _ => {}
        }

        let ord = l.cmp_same_type(r).ok_or_else(|| {
            DbError::Executor(format!("incompatible types for {:?}: {:?}, {:?}", op, l, r))
        })?;

        let result = match op {
            Eq => ord == Ordering::Equal,
            Ne => ord != Ordering::Equal,
            Lt => ord == Ordering::Less,
            Le => ord != Ordering::Greater,
            Gt => ord == Ordering::Greater,
            Ge => ord != Ordering::Less,
            _ => unreachable!(),
        };

        Ok(Value::Bool(result))
    }

    /// Find column index in schema, supporting qualified and unqualified references.
    ///
    /// Schema entries may be:
    /// - Simple names: `"id"`, `"name"`
    /// - Qualified names: `"users.id"`, `"orders.user_id"`
    ///
    /// Matching rules:
    /// - Qualified ref (`table.col`): Match `"table.col"` exactly
    /// - Unqualified ref (`col`): Match simple `"col"` or suffix `".col"`
    fn find_column(&self, table: Option<&str>, name: &str) -> DbResult<usize> {
        if let Some(qualifier) = table {
            // Qualified column reference: look for exact "table.column" match
            let full_name = format!("{}.{}", qualifier, name);
            self.schema
                .iter()
                .position(|c| c.eq_ignore_ascii_case(&full_name))
                .ok_or_else(|| DbError::Executor(format!("unknown column '{}.{}'", qualifier, name)))
        } else {
            // Unqualified: try exact match first, then suffix match
            self.schema
                .iter()
                .position(|c| {
                    c.eq_ignore_ascii_case(name)
                        || c.to_lowercase().ends_with(&format!(".{}", name.to_lowercase()))
                })
                .ok_or_else(|| DbError::Executor(format!("unknown column '{}'", name)))
        }
    }
}

/// SQL `LIKE` matching: `%` matches zero or more characters, `_` matches
/// exactly one, everything else matches case-insensitively.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match_recursive(&text, &pattern, 0, 0)
}

fn like_match_recursive(text: &[char], pattern: &[char], t_idx: usize, p_idx: usize) -> bool {
    if p_idx >= pattern.len() {
        return t_idx >= text.len();
    }

    match pattern[p_idx] {
        '%' => {
            like_match_recursive(text, pattern, t_idx, p_idx + 1)
                || (t_idx < text.len() && like_match_recursive(text, pattern, t_idx + 1, p_idx))
        }
        '_' => t_idx < text.len() && like_match_recursive(text, pattern, t_idx + 1, p_idx + 1),
        c => {
            t_idx < text.len()
                && text[t_idx].eq_ignore_ascii_case(&c)
                && like_match_recursive(text, pattern, t_idx + 1, p_idx + 1)
        }
    }
}
