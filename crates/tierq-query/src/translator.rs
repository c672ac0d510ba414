//! SQL rewriting on top of `sqlparser`.
//!
//! The router needs four operations: listing the tables a query reads, qualifying bare
//! table names with the warehouse dataset, stripping that qualifier again for the local
//! engine, and re-rendering a query written in one dialect so that another dialect's
//! parser accepts it.

use sqlparser::ast::{
    Expr, Ident, ObjectName, Query, Statement, TableFactor, Visit, VisitMut, Visitor, VisitorMut,
};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, GenericDialect, PostgreSqlDialect,
};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tierq_core::{CoreError, CoreResult, SqlDialect, SqlTranslator};

const SERVICE: &str = "sql-parser";

fn dialect_for(dialect: SqlDialect) -> Box<dyn Dialect> {
    match dialect {
        SqlDialect::BigQuery => Box::new(BigQueryDialect {}),
        SqlDialect::DuckDb => Box::new(DuckDbDialect {}),
        SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
        SqlDialect::Generic => Box::new(GenericDialect {}),
    }
}

/// Dotted components of a table reference.
///
/// Handles both `dataset.table` and BigQuery's single quoted `` `project.dataset.table` ``.
fn components(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .flat_map(|ident| ident.value.split('.'))
        .map(str::to_string)
        .collect()
}

/// Whether `qualifiers` (everything before the table name) point at `namespace`.
///
/// A project component is checked only when `project` is known.
fn in_namespace(qualifiers: &[String], namespace: &str, project: Option<&str>) -> bool {
    match qualifiers {
        [dataset] => dataset == namespace,
        [owner, dataset] => dataset == namespace && project.map_or(true, |p| p == owner),
        _ => false,
    }
}

/// Registry key of a table reference.
///
/// Bare names and references into `namespace` resolve to the table name. References into
/// any other dataset keep their full dotted name, which never matches a registered table.
fn registry_key(name: &ObjectName, namespace: &str, project: Option<&str>) -> Option<String> {
    let parts = components(name);
    let (table, qualifiers) = parts.split_last()?;
    if qualifiers.is_empty() || in_namespace(qualifiers, namespace, project) {
        Some(table.clone())
    } else {
        Some(parts.join("."))
    }
}

fn is_bare(name: &ObjectName) -> bool {
    name.0.len() == 1 && !name.0[0].value.contains('.')
}

/// Collects table references in order of appearance, plus CTE names.
#[derive(Default)]
struct TableCollector {
    ctes: HashSet<String>,
    tables: Vec<ObjectName>,
}

impl Visitor for TableCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.clone());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        // Table functions such as `UNNEST` or `read_parquet(...)` carry args.
        if let TableFactor::Table {
            name, args: None, ..
        } = table_factor
        {
            self.tables.push(name.clone());
        }
        ControlFlow::Continue(())
    }
}

impl TableCollector {
    fn is_cte(&self, name: &ObjectName) -> bool {
        is_bare(name) && self.ctes.contains(&name.0[0].value)
    }
}

/// Prefixes bare, non-CTE table names with a dataset.
struct Qualifier<'a> {
    namespace: &'a str,
    ctes: &'a HashSet<String>,
}

impl VisitorMut for Qualifier<'_> {
    type Break = ();

    fn pre_visit_table_factor(
        &mut self,
        table_factor: &mut TableFactor,
    ) -> ControlFlow<Self::Break> {
        if let TableFactor::Table {
            name, args: None, ..
        } = table_factor
        {
            if is_bare(name) && !self.ctes.contains(&name.0[0].value) {
                name.0.insert(0, Ident::new(self.namespace));
            }
        }
        ControlFlow::Continue(())
    }
}

/// Drops the `namespace` qualifier from table references and from
/// `namespace.table.column` identifiers.
struct Unqualifier<'a> {
    namespace: &'a str,
    project: Option<&'a str>,
    changed: bool,
}

impl VisitorMut for Unqualifier<'_> {
    type Break = ();

    fn pre_visit_table_factor(
        &mut self,
        table_factor: &mut TableFactor,
    ) -> ControlFlow<Self::Break> {
        if let TableFactor::Table {
            name, args: None, ..
        } = table_factor
        {
            let parts = components(name);
            if let Some((table, qualifiers)) = parts.split_last() {
                if !qualifiers.is_empty() && in_namespace(qualifiers, self.namespace, self.project)
                {
                    let ident = match name.0.last() {
                        Some(last) if last.value == *table => last.clone(),
                        _ => Ident::new(table.as_str()),
                    };
                    name.0 = vec![ident];
                    self.changed = true;
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        if let Expr::CompoundIdentifier(idents) = expr {
            if idents.len() >= 3 {
                let split = idents.len() - 2;
                let qualifiers: Vec<String> =
                    idents[..split].iter().map(|i| i.value.clone()).collect();
                if in_namespace(&qualifiers, self.namespace, self.project) {
                    idents.drain(..split);
                    self.changed = true;
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// [`SqlTranslator`] backed by `sqlparser`.
///
/// Incoming queries are parsed with the source dialect.
#[derive(Debug, Clone)]
pub struct SqlParserTranslator {
    source: SqlDialect,
    project: Option<String>,
}

impl SqlParserTranslator {
    pub fn new(source: SqlDialect) -> Self {
        Self {
            source,
            project: None,
        }
    }

    /// Only treat `project.dataset.table` references as local candidates for `project`.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    fn parse(&self, sql: &str, dialect: SqlDialect) -> CoreResult<Vec<Statement>> {
        let statements = Parser::parse_sql(dialect_for(dialect).as_ref(), sql)
            .map_err(|e| CoreError::external(SERVICE, format!("{} ({} dialect)", e, dialect)))?;
        if statements.is_empty() {
            return Err(CoreError::external(SERVICE, "no SQL statement found"));
        }
        Ok(statements)
    }

    fn collect(statements: &[Statement]) -> TableCollector {
        let mut collector = TableCollector::default();
        for statement in statements {
            let _ = Visit::visit(statement, &mut collector);
        }
        collector
    }
}

fn render(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Default for SqlParserTranslator {
    fn default() -> Self {
        Self::new(SqlDialect::BigQuery)
    }
}

impl SqlTranslator for SqlParserTranslator {
    fn extract_table_names(&self, sql: &str, namespace: &str) -> CoreResult<Vec<String>> {
        let statements = self.parse(sql, self.source)?;
        let collector = Self::collect(&statements);
        let project = self.project.as_deref();

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for reference in &collector.tables {
            if collector.is_cte(reference) {
                continue;
            }
            if let Some(name) = registry_key(reference, namespace, project) {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    fn translate(&self, sql: &str, from: SqlDialect, to: SqlDialect) -> CoreResult<String> {
        let statements = self.parse(sql, from)?;
        let rendered = render(&statements);

        if from != to {
            self.parse(&rendered, to)?;
        }
        Ok(rendered)
    }

    fn qualify_tables(&self, sql: &str, namespace: &str) -> CoreResult<String> {
        let mut statements = self.parse(sql, self.source)?;
        let ctes = Self::collect(&statements).ctes;

        let mut qualifier = Qualifier {
            namespace,
            ctes: &ctes,
        };
        for statement in &mut statements {
            let _ = VisitMut::visit(statement, &mut qualifier);
        }
        Ok(render(&statements))
    }

    fn unqualify_tables(&self, sql: &str, namespace: &str) -> CoreResult<String> {
        let mut statements = self.parse(sql, self.source)?;

        let mut unqualifier = Unqualifier {
            namespace,
            project: self.project.as_deref(),
            changed: false,
        };
        for statement in &mut statements {
            let _ = VisitMut::visit(statement, &mut unqualifier);
        }

        if unqualifier.changed {
            Ok(render(&statements))
        } else {
            Ok(sql.to_string())
        }
    }
}
