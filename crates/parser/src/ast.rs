use expr::Expr;

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        primary_key: Option<Vec<String>>,
    },
    DropTable {
        name: String,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex {
        name: String,
    },
    Insert {
        table: String,
        /// One inner `Vec<Expr>` per row; multi-row INSERT supplies more than one.
        values: Vec<Vec<Expr>>,
    },
    Select {
        columns: Vec<SelectItem>,
        from: TableRef,
        joins: Vec<JoinClause>,
        selection: Option<Expr>,
        order_by: Vec<OrderByExpr>,
        limit: Option<u64>,
        offset: Option<u64>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        selection: Option<Expr>,
    },
    Delete {
        table: String,
        selection: Option<Expr>,
    },
    Explain {
        query: Box<Statement>,
        analyze: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column(String),
}

/// A table reference appearing in `FROM` or `JOIN`, with an optional alias.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: String) -> Self {
        Self { name, alias: None }
    }

    pub fn with_alias(name: String, alias: Option<String>) -> Self {
        Self { name, alias }
    }

    /// Name used to qualify this table's columns: its alias if present, else its name.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinClause {
    pub table: TableRef,
    pub join_type: JoinType,
    pub condition: Expr,
}

/// ORDER BY clause entry: a column name plus sort direction.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}
