use anyhow::{Context, Result};
use buffer::{FilePager, Pager};
use catalog::{Catalog, Column, IndexId, IndexKind};
use executor::{build_executor, execute_dml, execute_query, ExecutionContext};
use parser::{parse_sql, Statement};
use planner::{PhysicalPlan, Planner, PlanningContext};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use storage::HeapTable;
use types::Value;
use wal::Wal;

/// Result type for database operations that may include query results.
#[derive(Debug)]
pub enum QueryResult {
    /// Query returned rows
    Rows {
        schema: Vec<String>,
        rows: Vec<common::Row>,
    },
    /// DML operation affected N rows
    Count { affected: u64 },
    /// DDL or other operation with no result
    Empty,
}

/// A compiled, parameter-independent physical plan kept in the statement cache.
///
/// `ResolvedExpr::Parameter` indices make the plan itself independent of any
/// particular bound value, so the same `CompiledStatement` can be replayed
/// with different `execute_prepared` calls as long as the schema hasn't
/// changed underneath it.
#[derive(Debug, Clone)]
struct CompiledStatement {
    plan: PhysicalPlan,
    parameter_names: Vec<String>,
    schema_version: u64,
}

/// Opaque handle returned by [`Database::prepare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatementId(u64);

/// A prepared statement's source text, compiled plan, and currently bound values.
struct PreparedStatement {
    /// SQL with `@name` placeholders already rewritten to `:name`.
    rewritten_sql: String,
    compiled: Arc<CompiledStatement>,
    /// Bound values keyed by lowercased parameter name.
    bound: HashMap<String, Value>,
}

/// Synchronous embedded database handle.
///
/// Owns the catalog, buffer pool, and write-ahead log directly; every method
/// runs to completion on the caller's thread. `prepare`/`bind`/`execute_prepared`
/// give callers a compiled-plan cache keyed by statement text and schema
/// version, so a statement executed repeatedly with different parameters is
/// parsed and planned only once per schema generation.
pub struct Database {
    data_dir: PathBuf,
    catalog_path: PathBuf,
    wal_path: PathBuf,
    buffer_pages: usize,
    catalog: Catalog,
    pager: FilePager,
    wal: Wal,
    plan_cache: HashMap<String, Arc<CompiledStatement>>,
    statements: HashMap<StatementId, PreparedStatement>,
    next_statement_id: u64,
}

impl Database {
    /// Open (or create) a database rooted at `data_dir`.
    ///
    /// Creates the data directory if it doesn't exist, loads the catalog,
    /// initializes the pager, and opens the WAL.
    pub fn new(
        data_dir: &Path,
        catalog_file: &str,
        wal_file: &str,
        buffer_pages: usize,
    ) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let catalog_path = data_dir.join(catalog_file);
        let wal_path = data_dir.join(wal_file);
        let catalog = Catalog::load(&catalog_path).map_err(anyhow::Error::from)?;
        let pager = FilePager::new(data_dir, buffer_pages);
        let wal = Wal::open(&wal_path).map_err(anyhow::Error::from)?;

        tracing::info!(data_dir = %data_dir.display(), "database: opened");

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            catalog_path,
            wal_path,
            buffer_pages,
            catalog,
            pager,
            wal,
            plan_cache: HashMap::new(),
            statements: HashMap::new(),
            next_statement_id: 1,
        })
    }

    /// Parse, plan, and run a single SQL statement with no bind parameters.
    ///
    /// For a statement executed repeatedly with different values, prefer
    /// `prepare`/`bind`/`execute_prepared` so the plan is built once.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        tracing::debug!(sql, "database: executing statement");
        let rewritten = params::rewrite_placeholders(sql).map_err(anyhow::Error::from)?;
        let descriptor = params::extract_parameters(sql).map_err(anyhow::Error::from)?;
        if !descriptor.is_empty() {
            anyhow::bail!(
                "statement references bind parameter(s) {:?}; use prepare/bind/execute_prepared",
                descriptor.parameters
            );
        }

        let statements = parse_sql(&rewritten).map_err(anyhow::Error::from)?;
        if statements.is_empty() {
            return Ok(QueryResult::Empty);
        }
        if statements.len() > 1 {
            anyhow::bail!("multiple statements not supported yet");
        }
        let stmt = statements.into_iter().next().unwrap();
        self.execute_statement(stmt, &rewritten)
    }

    /// Compile `sql` into a cached, reusable plan and return a handle to it.
    ///
    /// Returns an error if `sql` doesn't parse to exactly one DML/query
    /// statement; DDL statements are executed directly by `execute` and
    /// can't be prepared.
    pub fn prepare(&mut self, sql: &str) -> Result<StatementId> {
        let rewritten = params::rewrite_placeholders(sql).map_err(anyhow::Error::from)?;
        let descriptor = params::extract_parameters(sql).map_err(anyhow::Error::from)?;

        let compiled = self.compile(&rewritten, descriptor.parameters.clone())?;

        let id = StatementId(self.next_statement_id);
        self.next_statement_id += 1;
        self.statements.insert(
            id,
            PreparedStatement {
                rewritten_sql: rewritten,
                compiled,
                bound: HashMap::new(),
            },
        );
        Ok(id)
    }

    /// Bind a value to a named parameter (`@name`) of a prepared statement.
    pub fn bind(&mut self, stmt: StatementId, name: &str, value: Value) -> Result<()> {
        let prepared = self
            .statements
            .get_mut(&stmt)
            .ok_or_else(|| anyhow::anyhow!("unknown prepared statement"))?;
        if !prepared
            .compiled
            .parameter_names
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
        {
            anyhow::bail!("statement has no parameter named '@{name}'");
        }
        prepared.bound.insert(name.to_ascii_lowercase(), value);
        Ok(())
    }

    /// Run a prepared statement using its currently bound parameter values.
    ///
    /// Re-plans the statement transparently if the schema changed (a DDL
    /// mutation) since it was last compiled; otherwise reuses the cached plan.
    pub fn execute_prepared(&mut self, stmt: StatementId) -> Result<QueryResult> {
        let (rewritten_sql, parameter_names, bound, schema_version) = {
            let prepared = self
                .statements
                .get(&stmt)
                .ok_or_else(|| anyhow::anyhow!("unknown prepared statement"))?;
            (
                prepared.rewritten_sql.clone(),
                prepared.compiled.parameter_names.clone(),
                prepared.bound.clone(),
                prepared.compiled.schema_version,
            )
        };

        let compiled = if schema_version == self.catalog.schema_version() {
            self.statements.get(&stmt).unwrap().compiled.clone()
        } else {
            self.compile(&rewritten_sql, parameter_names.clone())?
        };

        if let Some(prepared) = self.statements.get_mut(&stmt) {
            prepared.compiled = compiled.clone();
        }

        let mut values = Vec::with_capacity(parameter_names.len());
        for name in &parameter_names {
            let value = bound
                .get(&name.to_ascii_lowercase())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("parameter '@{name}' was never bound"))?;
            values.push(value);
        }

        self.run_plan(&compiled.plan, values)
    }

    /// Drop a prepared statement, freeing its cached bound values.
    pub fn close_prepared(&mut self, stmt: StatementId) {
        self.statements.remove(&stmt);
    }

    /// Flush the WAL, the buffer pool's dirty pages, and the catalog to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.wal.sync().map_err(anyhow::Error::from)?;
        self.pager.flush().map_err(anyhow::Error::from)?;
        self.catalog
            .save(&self.catalog_path)
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    /// Flush outstanding state and consume the handle.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    /// Compile `rewritten_sql` to a physical plan, reusing the cache when the
    /// schema hasn't changed since the cached entry was built.
    fn compile(
        &mut self,
        rewritten_sql: &str,
        parameter_names: Vec<String>,
    ) -> Result<Arc<CompiledStatement>> {
        let version = self.catalog.schema_version();
        if let Some(cached) = self.plan_cache.get(rewritten_sql) {
            if cached.schema_version == version {
                return Ok(cached.clone());
            }
        }

        let statements = parse_sql(rewritten_sql).map_err(anyhow::Error::from)?;
        if statements.len() != 1 {
            anyhow::bail!("prepare requires exactly one statement");
        }
        let stmt = statements.into_iter().next().unwrap();

        let mut planning_ctx =
            PlanningContext::new(&self.catalog).with_parameters(parameter_names.clone());
        let plan = Planner::plan(stmt, &mut planning_ctx).map_err(anyhow::Error::from)?;

        let compiled = Arc::new(CompiledStatement {
            plan,
            parameter_names,
            schema_version: version,
        });
        self.plan_cache
            .insert(rewritten_sql.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Execute a single parsed statement, given its already-rewritten source text.
    fn execute_statement(&mut self, stmt: Statement, rewritten_sql: &str) -> Result<QueryResult> {
        match stmt {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => self.execute_create_table(name, columns, primary_key),

            Statement::DropTable { name } => self.execute_drop_table(name),

            Statement::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => self.execute_create_index(name, table, columns, unique),

            Statement::DropIndex { name } => self.execute_drop_index(name),

            Statement::Explain { query, analyze } => self.execute_explain(*query, analyze),

            Statement::Insert { .. } | Statement::Select { .. } | Statement::Update { .. } | Statement::Delete { .. } => {
                let compiled = self.compile(rewritten_sql, Vec::new())?;
                self.run_plan(&compiled.plan, Vec::new())
            }
        }
    }

    /// Execute CREATE TABLE.
    fn execute_create_table(
        &mut self,
        name: String,
        columns: Vec<parser::ColumnDef>,
        primary_key: Option<Vec<String>>,
    ) -> Result<QueryResult> {
        let catalog_columns: Vec<Column> = columns
            .iter()
            .map(|col| {
                let ty = map_sql_type(&col.ty)?;
                Ok(Column::new(col.name.clone(), ty))
            })
            .collect::<Result<Vec<_>>>()?;

        let primary_key_ordinals = if let Some(pk_names) = primary_key {
            let mut ordinals = Vec::new();
            for pk_name in &pk_names {
                let ordinal = columns
                    .iter()
                    .position(|col| col.name.eq_ignore_ascii_case(pk_name))
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "PRIMARY KEY column '{}' not found in table columns",
                            pk_name
                        )
                    })? as u16;
                ordinals.push(ordinal);
            }
            Some(ordinals)
        } else {
            None
        };

        let table_id = self
            .catalog
            .create_table(&name, catalog_columns, primary_key_ordinals)
            .map_err(anyhow::Error::from)?;
        self.catalog
            .save(&self.catalog_path)
            .map_err(anyhow::Error::from)?;

        self.wal
            .append(&wal::WalRecord::CreateTable {
                name: name.clone(),
                table: table_id,
            })
            .and_then(|_| self.wal.sync())
            .map_err(anyhow::Error::from)?;

        Ok(QueryResult::Empty)
    }

    /// Execute DROP TABLE.
    fn execute_drop_table(&mut self, name: String) -> Result<QueryResult> {
        let table_id = self.catalog.table(&name).map_err(anyhow::Error::from)?.id;
        self.catalog.drop_table(&name).map_err(anyhow::Error::from)?;
        self.catalog
            .save(&self.catalog_path)
            .map_err(anyhow::Error::from)?;

        let path = self.data_dir.join(format!("table_{}.tbl", table_id.0));
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove heap file {}", path.display()))?;
        }

        self.wal
            .append(&wal::WalRecord::DropTable { table: table_id })
            .and_then(|_| self.wal.sync())
            .map_err(anyhow::Error::from)?;

        Ok(QueryResult::Empty)
    }

    /// Execute CREATE INDEX, then backfill the new index from existing rows.
    fn execute_create_index(
        &mut self,
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<QueryResult> {
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();

        let index_id = self
            .catalog
            .create_index()
            .table_name(&table)
            .index_name(&name)
            .columns(&column_refs)
            .kind(IndexKind::BTree)
            .unique(unique)
            .call()
            .map_err(anyhow::Error::from)?;

        self.catalog
            .save(&self.catalog_path)
            .map_err(anyhow::Error::from)?;

        self.backfill_index(&table, index_id)?;

        Ok(QueryResult::Empty)
    }

    /// Create the backing file for a freshly registered index and populate it
    /// by scanning every live row already in the table's heap file.
    fn backfill_index(&mut self, table: &str, index_id: IndexId) -> Result<()> {
        let table_meta = self.catalog.table(table).map_err(anyhow::Error::from)?;
        let table_id = table_meta.id;
        let table_name = table_meta.name.clone();
        let index_meta = table_meta
            .index_by_id(index_id)
            .map_err(anyhow::Error::from)?
            .clone();

        let index_path = executor::secondary_index_file_path(&self.data_dir, index_id);
        let mut handle = executor::SecondaryIndexHandle::create(&index_path, &index_meta)
            .map_err(anyhow::Error::from)?;

        let mut ctx = ExecutionContext::new(
            &self.catalog,
            &mut self.pager,
            &mut self.wal,
            self.data_dir.clone(),
        );
        let rows = ctx
            .heap_table(table_id)
            .and_then(|mut heap_table| heap_table.scan_all())
            .map_err(anyhow::Error::from)?;

        for row in &rows {
            let rid = row
                .rid()
                .ok_or_else(|| anyhow::anyhow!("scanned row has no record id"))?;
            let key = executor::secondary_index_key(&index_meta, row).map_err(anyhow::Error::from)?;
            handle.insert(key, rid).map_err(anyhow::Error::from)?;
        }
        handle.flush().map_err(anyhow::Error::from)?;

        tracing::info!(
            table = table_name,
            index = index_meta.name,
            rows = rows.len(),
            "database: backfilled index"
        );
        Ok(())
    }

    /// Execute DROP INDEX, removing its backing file.
    fn execute_drop_index(&mut self, name: String) -> Result<QueryResult> {
        let (table_name, index_id) = self
            .catalog
            .tables()
            .find_map(|table| table.index(&name).ok().map(|idx| (table.name.clone(), idx.id)))
            .ok_or_else(|| anyhow::anyhow!("index '{}' not found", name))?;

        self.catalog
            .drop_index(&table_name, &name)
            .map_err(anyhow::Error::from)?;
        self.catalog
            .save(&self.catalog_path)
            .map_err(anyhow::Error::from)?;

        let index_path = executor::secondary_index_file_path(&self.data_dir, index_id);
        if index_path.exists() {
            fs::remove_file(&index_path)
                .with_context(|| format!("failed to remove index file {}", index_path.display()))?;
        }

        Ok(QueryResult::Empty)
    }

    /// Execute EXPLAIN or EXPLAIN ANALYZE.
    fn execute_explain(&mut self, query: Statement, analyze: bool) -> Result<QueryResult> {
        let mut planning_ctx = PlanningContext::new(&self.catalog);
        let plan = Planner::plan(query, &mut planning_ctx).map_err(anyhow::Error::from)?;

        if analyze {
            let plan_description = planner::explain_physical(&plan);

            let mut ctx = ExecutionContext::new(
                &self.catalog,
                &mut self.pager,
                &mut self.wal,
                self.data_dir.clone(),
            );

            let mut executor = build_executor(plan, ctx.catalog).map_err(anyhow::Error::from)?;
            let start = std::time::Instant::now();
            executor.open(&mut ctx).map_err(anyhow::Error::from)?;

            let mut row_count = 0u64;
            while executor.next(&mut ctx).map_err(anyhow::Error::from)?.is_some() {
                row_count += 1;
            }
            executor.close(&mut ctx).map_err(anyhow::Error::from)?;
            let elapsed = start.elapsed();

            let mut output = String::new();
            output.push_str("EXPLAIN ANALYZE:\n");
            output.push_str(&plan_description);
            output.push_str("\n\nExecution Statistics:\n");
            output.push_str(&format!("  Elapsed: {:?}\n", elapsed));
            output.push_str(&format!("  Total rows: {row_count}"));

            Ok(QueryResult::Rows {
                schema: vec!["Explain".to_string()],
                rows: vec![common::Row::new(vec![Value::Text(output)])],
            })
        } else {
            let description = planner::explain_physical(&plan);
            Ok(QueryResult::Rows {
                schema: vec!["Explain".to_string()],
                rows: vec![common::Row::new(vec![Value::Text(description)])],
            })
        }
    }

    /// Run a compiled plan against live storage, binding `values` into the
    /// execution context for any `ResolvedExpr::Parameter` it contains.
    fn run_plan(&mut self, plan: &PhysicalPlan, values: Vec<Value>) -> Result<QueryResult> {
        let mut ctx = ExecutionContext::new(
            &self.catalog,
            &mut self.pager,
            &mut self.wal,
            self.data_dir.clone(),
        )
        .with_params(values);

        match plan {
            PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. } => {
                let count = execute_dml(plan.clone(), &mut ctx).map_err(anyhow::Error::from)?;
                Ok(QueryResult::Count { affected: count })
            }
            other => {
                let schema = infer_schema(other);
                let rows = execute_query(plan.clone(), &mut ctx).map_err(anyhow::Error::from)?;
                Ok(QueryResult::Rows { schema, rows })
            }
        }
    }

    /// Remove all table/heap/index data and reinitialize the catalog, pager, and WAL.
    pub fn reset(&mut self) -> Result<()> {
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("failed to read data directory {}", self.data_dir.display()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(ext) = path.extension() {
                if ext == "heap" || ext == "tbl" || ext == "idx" || ext == "pk_idx" {
                    fs::remove_file(&path)
                        .with_context(|| format!("failed to remove file {}", path.display()))?;
                }
            }
        }

        if self.catalog_path.exists() {
            fs::remove_file(&self.catalog_path)
                .with_context(|| format!("failed to remove catalog {}", self.catalog_path.display()))?;
        }
        self.catalog = Catalog::load(&self.catalog_path).map_err(anyhow::Error::from)?;

        if self.wal_path.exists() {
            fs::remove_file(&self.wal_path)
                .with_context(|| format!("failed to remove WAL {}", self.wal_path.display()))?;
        }
        self.wal = Wal::open(&self.wal_path).map_err(anyhow::Error::from)?;

        self.pager = FilePager::new(&self.data_dir, self.buffer_pages);
        self.plan_cache.clear();
        self.statements.clear();

        Ok(())
    }

    /// Get a reference to the catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Map parser SQL type string to internal SqlType.
fn map_sql_type(raw: &str) -> Result<types::SqlType> {
    match raw.trim().to_uppercase().as_str() {
        "INT" | "INTEGER" => Ok(types::SqlType::Int64),
        "TEXT" | "STRING" | "VARCHAR" => Ok(types::SqlType::Text),
        "BOOL" | "BOOLEAN" => Ok(types::SqlType::Bool),
        other => Err(anyhow::anyhow!("unsupported SQL type '{}'", other)),
    }
}

/// Infer the output schema from a physical plan.
fn infer_schema(plan: &PhysicalPlan) -> Vec<String> {
    match plan {
        PhysicalPlan::SeqScan { schema, .. } => schema.clone(),
        PhysicalPlan::IndexScan { schema, .. } => schema.clone(),
        PhysicalPlan::Filter { input, .. } => infer_schema(input),
        PhysicalPlan::Project { columns, .. } => {
            columns.iter().map(|(name, _)| name.clone()).collect()
        }
        PhysicalPlan::Sort { input, .. } => infer_schema(input),
        PhysicalPlan::Limit { input, .. } => infer_schema(input),
        PhysicalPlan::NestedLoopJoin { schema, .. } => schema.clone(),
        PhysicalPlan::Insert { .. } | PhysicalPlan::Update { .. } | PhysicalPlan::Delete { .. } => {
            vec![]
        }
    }
}
