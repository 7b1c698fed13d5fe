//! Column name resolution.
//!
//! Every column a query reads must resolve to a catalog column or to a
//! column that a CTE or derived table in the same statement declares.
//! Lookup follows SQLite's scoping: the FROM clause of the innermost query
//! first, then the enclosing queries. Projection aliases only count in
//! ORDER BY, GROUP BY and HAVING.
//!
//! A live table may carry columns the catalog does not list, and SQLite
//! binds a name to such a column before it considers an alias or an outer
//! query. The statement is therefore rewritten wherever SQLite could make
//! that choice:
//! - `*` and `t.*` expand to the declared columns
//! - aliases used in GROUP BY, HAVING or inside ORDER BY expressions are
//!   replaced by the aliased expression
//! - outer references that cross a catalog table are qualified

use crate::error::GatewayError;
use crate::schema::SchemaCatalog;
use sqlparser::ast::{
    Expr, Ident, Query, Select, SelectItem, SetExpr, Statement, TableAlias, TableFactor,
    VisitMut, VisitorMut,
};
use std::collections::HashMap;
use std::ops::ControlFlow;

/// CTE name (lowercased) to the columns it declares
type CteColumns = HashMap<String, Vec<String>>;

/// Projection alias and the expression it names
type Alias = (String, Expr);

/// Resolve every column reference in `statement` and apply the rewrites.
pub(crate) fn resolve_columns(
    statement: &mut Statement,
    catalog: &SchemaCatalog,
    sql: &str,
) -> Result<(), GatewayError> {
    let resolver = Resolver { catalog, sql };
    match statement {
        Statement::Query(query) => resolver
            .check_query(query, &CteColumns::new(), None)
            .map(|_| ()),
        _ => Err(resolver.unsafe_query("non-query statement")),
    }
}

/// One entry of a FROM clause
#[derive(Debug, Clone)]
struct Binding {
    /// Alias or table name as written; empty for an unaliased subquery
    name: String,
    columns: Vec<String>,
    /// Catalog table, whose live definition may have more columns
    base: bool,
}

impl Binding {
    fn is_named(&self, qualifier: &str) -> bool {
        !self.name.is_empty() && self.name.eq_ignore_ascii_case(qualifier)
    }

    fn declares(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    fn projection(&self) -> impl Iterator<Item = SelectItem> + '_ {
        self.columns.iter().map(move |column| {
            let column = Ident::with_quote('"', column.clone());
            let expr = if self.name.is_empty() {
                Expr::Identifier(column)
            } else {
                Expr::CompoundIdentifier(vec![Ident::with_quote('"', self.name.clone()), column])
            };
            SelectItem::UnnamedExpr(expr)
        })
    }
}

struct Scope<'a> {
    bindings: Vec<Binding>,
    outer: Option<&'a Scope<'a>>,
}

impl Scope<'_> {
    fn declares(&self, column: &str) -> bool {
        self.bindings.iter().any(|b| b.declares(column))
    }

    /// Resolve a bare column name, innermost scope first.
    ///
    /// Returns a qualified replacement when the name belongs to an
    /// enclosing query but a nearer catalog table could capture it.
    fn resolve_bare(&self, column: &Ident) -> Result<Option<Expr>, String> {
        let mut crossed: Vec<&Binding> = Vec::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(binding) = scope.bindings.iter().find(|b| b.declares(&column.value)) {
                if !crossed.iter().any(|b| b.base) {
                    return Ok(None);
                }
                if binding.name.is_empty() || crossed.iter().any(|b| b.is_named(&binding.name)) {
                    return Err(format!("ambiguous outer reference '{}'", column.value));
                }
                return Ok(Some(Expr::CompoundIdentifier(vec![
                    Ident::with_quote('"', binding.name.clone()),
                    column.clone(),
                ])));
            }
            crossed.extend(scope.bindings.iter());
            current = scope.outer;
        }
        Err(format!("unknown column '{}'", column.value))
    }

    fn resolve_qualified(&self, qualifier: &str, column: &str) -> Result<(), String> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(binding) = scope.bindings.iter().find(|b| b.is_named(qualifier)) {
                return if binding.declares(column) {
                    Ok(())
                } else {
                    Err(format!("unknown column '{qualifier}.{column}'"))
                };
            }
            current = scope.outer;
        }
        Err(format!("unknown qualifier '{qualifier}'"))
    }
}

struct Resolver<'c> {
    catalog: &'c SchemaCatalog,
    sql: &'c str,
}

impl Resolver<'_> {
    fn unsafe_query(&self, reason: impl Into<String>) -> GatewayError {
        GatewayError::unsafe_query(reason, self.sql)
    }

    /// Check a query and return the names of its result columns.
    fn check_query(
        &self,
        query: &mut Query,
        ctes: &CteColumns,
        outer: Option<&Scope<'_>>,
    ) -> Result<Vec<String>, GatewayError> {
        let mut ctes = ctes.clone();
        if let Some(with) = query.with.as_mut() {
            let recursive = with.recursive;
            for cte in &mut with.cte_tables {
                reject_column_list(&cte.alias)?;
                let name = cte.alias.name.value.to_ascii_lowercase();
                if recursive {
                    ctes.insert(name.clone(), set_expr_names(&cte.query.body));
                }
                let columns = self.check_query(&mut cte.query, &ctes, None)?;
                ctes.insert(name, columns);
            }
        }

        let (columns, bindings, aliases) = match query.body.as_mut() {
            SetExpr::Select(select) => self.check_select(select, &ctes, outer)?,
            body => {
                let columns = self.check_set_expr(body, &ctes, outer)?;
                let aliases = columns
                    .iter()
                    .map(|c| (c.clone(), Expr::Identifier(Ident::new(c.clone()))))
                    .collect();
                (columns, Vec::new(), aliases)
            }
        };

        let scope = Scope { bindings, outer };
        if let Some(order_by) = query.order_by.as_mut() {
            self.walk(order_by, &scope, &ctes, &aliases, Clause::Ordering)?;
        }
        let constant = Scope {
            bindings: Vec::new(),
            outer,
        };
        self.walk(&mut query.limit, &constant, &ctes, &[], Clause::Plain)?;
        self.walk(&mut query.offset, &constant, &ctes, &[], Clause::Plain)?;
        Ok(columns)
    }

    fn check_set_expr(
        &self,
        body: &mut SetExpr,
        ctes: &CteColumns,
        outer: Option<&Scope<'_>>,
    ) -> Result<Vec<String>, GatewayError> {
        match body {
            SetExpr::Select(select) => Ok(self.check_select(select, ctes, outer)?.0),
            SetExpr::Query(query) => self.check_query(query, ctes, outer),
            SetExpr::SetOperation { left, right, .. } => {
                // Result columns take their names from the left-most select
                let columns = self.check_set_expr(left, ctes, outer)?;
                self.check_set_expr(right, ctes, outer)?;
                Ok(columns)
            }
            SetExpr::Values(values) => {
                let constant = Scope {
                    bindings: Vec::new(),
                    outer,
                };
                let width = values.rows.first().map_or(0, Vec::len);
                self.walk(&mut values.rows, &constant, ctes, &[], Clause::Plain)?;
                Ok((1..=width).map(|i| format!("column{i}")).collect())
            }
            _ => Err(self.unsafe_query("unsupported query body")),
        }
    }

    fn check_select(
        &self,
        select: &mut Select,
        ctes: &CteColumns,
        outer: Option<&Scope<'_>>,
    ) -> Result<(Vec<String>, Vec<Binding>, Vec<Alias>), GatewayError> {
        let mut bindings = Vec::new();
        for table in &mut select.from {
            self.bind(&mut table.relation, ctes, outer, &mut bindings)?;
            for join in &mut table.joins {
                self.bind(&mut join.relation, ctes, outer, &mut bindings)?;
            }
        }
        let scope = Scope { bindings, outer };

        expand_wildcards(&mut select.projection, &scope.bindings)
            .map_err(|reason| self.unsafe_query(reason))?;
        self.walk(&mut select.projection, &scope, ctes, &[], Clause::Plain)?;
        for table in &mut select.from {
            for join in &mut table.joins {
                self.walk(&mut join.join_operator, &scope, ctes, &[], Clause::Plain)?;
            }
        }
        self.walk(&mut select.selection, &scope, ctes, &[], Clause::Plain)?;
        self.walk(&mut select.named_window, &scope, ctes, &[], Clause::Plain)?;

        let aliases: Vec<Alias> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::ExprWithAlias { expr, alias } => {
                    Some((alias.value.clone(), expr.clone()))
                }
                _ => None,
            })
            .collect();
        self.walk(&mut select.group_by, &scope, ctes, &aliases, Clause::Grouping)?;
        self.walk(&mut select.having, &scope, ctes, &aliases, Clause::Grouping)?;

        Ok((projection_names(&select.projection), scope.bindings, aliases))
    }

    /// Add the binding a FROM entry introduces.
    fn bind(
        &self,
        factor: &mut TableFactor,
        ctes: &CteColumns,
        outer: Option<&Scope<'_>>,
        bindings: &mut Vec<Binding>,
    ) -> Result<(), GatewayError> {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                if args.is_some() {
                    return Err(self.unsafe_query("table-valued function in FROM"));
                }
                let table = match name.0.as_slice() {
                    [table] => table.value.clone(),
                    _ => return Err(self.unsafe_query(format!("qualified table name '{name}'"))),
                };
                // A CTE shadows a table of the same name
                let (columns, base) = if let Some(columns) = ctes.get(&table.to_ascii_lowercase()) {
                    (columns.clone(), false)
                } else if let Some(descriptor) = self.catalog.table(&table) {
                    let columns = descriptor.columns.iter().map(|c| c.name.clone()).collect();
                    (columns, true)
                } else {
                    return Err(self.unsafe_query(format!("unknown table '{table}'")));
                };
                let name = match alias {
                    Some(alias) => {
                        reject_column_list(alias)?;
                        alias.name.value.clone()
                    }
                    None => table,
                };
                bindings.push(Binding {
                    name,
                    columns,
                    base,
                });
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let columns = self.check_query(subquery, ctes, outer)?;
                let name = match alias {
                    Some(alias) => {
                        reject_column_list(alias)?;
                        alias.name.value.clone()
                    }
                    None => String::new(),
                };
                bindings.push(Binding {
                    name,
                    columns,
                    base: false,
                });
            }
            TableFactor::NestedJoin { .. } => {
                return Err(GatewayError::Translation(
                    "parenthesized joins are not supported".to_string(),
                ));
            }
            _ => return Err(self.unsafe_query("unsupported table source")),
        }
        Ok(())
    }

    fn walk<N: VisitMut>(
        &self,
        node: &mut N,
        scope: &Scope<'_>,
        ctes: &CteColumns,
        aliases: &[Alias],
        clause: Clause,
    ) -> Result<(), GatewayError> {
        let mut walk = ScopeWalk {
            resolver: self,
            scope,
            ctes,
            aliases,
            clause,
            query_depth: 0,
            expr_depth: 0,
            substituted_at: None,
        };
        match VisitMut::visit(node, &mut walk) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(e) => Err(e),
        }
    }
}

/// Where the walked expressions sit, which decides how aliases resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    /// Projection, WHERE, ON, LIMIT: no aliases
    Plain,
    /// GROUP BY and HAVING: aliases are replaced by their expression
    Grouping,
    /// ORDER BY: a bare alias term is kept, nested uses are replaced
    Ordering,
}

/// Resolves the column references of one clause. Subqueries met on the way
/// are checked as queries of their own, with this scope as their outer scope.
struct ScopeWalk<'w, 'c> {
    resolver: &'w Resolver<'c>,
    scope: &'w Scope<'w>,
    ctes: &'w CteColumns,
    aliases: &'w [Alias],
    clause: Clause,
    query_depth: usize,
    expr_depth: usize,
    /// Depth of an alias expression spliced in; its contents are already checked
    substituted_at: Option<usize>,
}

impl ScopeWalk<'_, '_> {
    fn alias(&self, name: &str) -> Option<&Expr> {
        self.aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, expr)| expr)
    }

    /// Replacement for `expr`, if it needs one
    fn resolve(&self, expr: &Expr) -> Result<Option<(Expr, bool)>, GatewayError> {
        match expr {
            Expr::Identifier(ident) => {
                let aliased = match self.clause {
                    Clause::Plain => None,
                    Clause::Ordering if self.expr_depth == 1 => {
                        if self.alias(&ident.value).is_some() {
                            return Ok(None);
                        }
                        None
                    }
                    Clause::Ordering | Clause::Grouping => {
                        if self.scope.declares(&ident.value) {
                            None
                        } else {
                            self.alias(&ident.value)
                        }
                    }
                };
                if let Some(aliased) = aliased {
                    return Ok(Some((Expr::Nested(Box::new(aliased.clone())), true)));
                }
                self.scope
                    .resolve_bare(ident)
                    .map(|qualified| qualified.map(|e| (e, false)))
                    .map_err(|reason| self.resolver.unsafe_query(reason))
            }
            Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [qualifier, column] => self
                    .scope
                    .resolve_qualified(&qualifier.value, &column.value)
                    .map(|()| None)
                    .map_err(|reason| self.resolver.unsafe_query(reason)),
                _ => Err(self
                    .resolver
                    .unsafe_query(format!("multi-part column reference '{expr}'"))),
            },
            _ => Ok(None),
        }
    }
}

impl VisitorMut for ScopeWalk<'_, '_> {
    type Break = GatewayError;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        self.query_depth += 1;
        if self.query_depth == 1 && self.substituted_at.is_none() {
            if let Err(e) = self
                .resolver
                .check_query(query, self.ctes, Some(self.scope))
            {
                return ControlFlow::Break(e);
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &mut Query) -> ControlFlow<Self::Break> {
        self.query_depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<Self::Break> {
        self.expr_depth += 1;
        if self.query_depth > 0 || self.substituted_at.is_some() {
            return ControlFlow::Continue(());
        }
        match self.resolve(expr) {
            Ok(Some((replacement, substituted))) => {
                *expr = replacement;
                if substituted {
                    self.substituted_at = Some(self.expr_depth);
                }
                ControlFlow::Continue(())
            }
            Ok(None) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(e),
        }
    }

    fn post_visit_expr(&mut self, _expr: &mut Expr) -> ControlFlow<Self::Break> {
        if self.substituted_at == Some(self.expr_depth) {
            self.substituted_at = None;
        }
        self.expr_depth -= 1;
        ControlFlow::Continue(())
    }
}

fn reject_column_list(alias: &TableAlias) -> Result<(), GatewayError> {
    if alias.columns.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::Translation(format!(
            "column lists on '{}' are not supported; alias the columns instead",
            alias.name.value
        )))
    }
}

fn expand_wildcards(projection: &mut Vec<SelectItem>, bindings: &[Binding]) -> Result<(), String> {
    for item in std::mem::take(projection) {
        match item {
            SelectItem::Wildcard(_) => {
                if bindings.is_empty() {
                    return Err("wildcard without a FROM clause".to_string());
                }
                for binding in bindings {
                    projection.extend(binding.projection());
                }
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let binding = match name.0.as_slice() {
                    [qualifier] => bindings.iter().find(|b| b.is_named(&qualifier.value)),
                    _ => None,
                }
                .ok_or_else(|| format!("unknown qualifier '{name}'"))?;
                projection.extend(binding.projection());
            }
            other => projection.push(other),
        }
    }
    Ok(())
}

/// Names a query exposes to an enclosing FROM. Unaliased expressions have
/// no usable name and are left out.
fn projection_names(projection: &[SelectItem]) -> Vec<String> {
    projection
        .iter()
        .filter_map(|item| match item {
            SelectItem::ExprWithAlias { alias, .. } => Some(alias.value.clone()),
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => Some(ident.value.clone()),
            SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                parts.last().map(|p| p.value.clone())
            }
            _ => None,
        })
        .collect()
}

/// Result names read straight off the syntax, for a recursive CTE that
/// refers to itself before it has been checked
fn set_expr_names(body: &SetExpr) -> Vec<String> {
    match body {
        SetExpr::Select(select) => projection_names(&select.projection),
        SetExpr::SetOperation { left, .. } => set_expr_names(left),
        SetExpr::Query(query) => set_expr_names(&query.body),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::SQLiteDialect;
    use sqlparser::parser::Parser;

    fn resolve(sql: &str) -> Result<String, GatewayError> {
        let catalog = SchemaCatalog::forensics().unwrap();
        let mut statement = Parser::parse_sql(&SQLiteDialect {}, sql)
            .unwrap()
            .remove(0);
        resolve_columns(&mut statement, &catalog, sql)?;
        Ok(statement.to_string())
    }

    fn assert_unsafe(sql: &str) {
        match resolve(sql) {
            Err(GatewayError::UnsafeQuery { .. }) => {}
            other => panic!("expected UnsafeQuery for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_alias_does_not_license_qualified_column() {
        assert_unsafe(
            "SELECT Location AS Informant, investigation.Informant AS leaked FROM investigation",
        );
    }

    #[test]
    fn test_alias_not_visible_in_where() {
        assert_unsafe("SELECT Location AS Informant FROM investigation WHERE Informant = 'x'");
    }

    #[test]
    fn test_alias_in_order_by_kept() {
        let sql = resolve("SELECT Location AS place FROM investigation ORDER BY place").unwrap();
        assert!(sql.ends_with("ORDER BY place"));
    }

    #[test]
    fn test_alias_in_group_by_replaced_by_expression() {
        let sql = resolve(
            "SELECT \"Drug Type\" AS drug, COUNT(*) AS n FROM investigation \
             GROUP BY drug HAVING n > 3",
        )
        .unwrap();
        assert!(sql.contains("GROUP BY (\"Drug Type\")"), "{sql}");
        assert!(sql.contains("HAVING (COUNT(*)) > 3"), "{sql}");
    }

    #[test]
    fn test_wildcards_expand_to_catalog_columns() {
        let sql = resolve("SELECT * FROM investigation").unwrap();
        assert_eq!(
            sql,
            "SELECT \"investigation\".\"Latitude\", \"investigation\".\"Longitude\", \
             \"investigation\".\"Date\", \"investigation\".\"Location\", \
             \"investigation\".\"Drug Type\" FROM investigation"
        );

        let sql = resolve("SELECT f.* FROM frequency f JOIN timeline t USING (\"Drug Type\")")
            .unwrap();
        assert!(sql.contains("\"f\".\"2024 Q4\""));
        assert!(!sql.contains("\"t\"."));
    }

    #[test]
    fn test_derived_table_columns_are_declared() {
        resolve(
            "SELECT quarter_name, freq FROM (SELECT '2022 Q1' AS quarter_name, \"2022 Q1\" AS freq \
             FROM frequency) ORDER BY freq DESC",
        )
        .unwrap();
        assert_unsafe("SELECT Location FROM (SELECT Location AS place FROM investigation)");
        assert_unsafe("SELECT d.Location FROM (SELECT Location AS place FROM investigation) d");
    }

    #[test]
    fn test_outer_reference_across_catalog_table_is_qualified() {
        let sql = resolve(
            "SELECT drug FROM (SELECT \"Drug Type\" AS drug FROM frequency) d \
             WHERE EXISTS (SELECT 1 FROM investigation WHERE \"Drug Type\" = drug)",
        )
        .unwrap();
        assert!(sql.contains("= \"d\".drug"), "{sql}");
    }

    #[test]
    fn test_recursive_cte_sees_its_own_columns() {
        resolve("WITH RECURSIVE c AS (SELECT 1 AS x UNION ALL SELECT x + 1 FROM c WHERE x < 5) SELECT x FROM c")
            .unwrap();
    }

    #[test]
    fn test_schema_qualified_names_rejected() {
        assert_unsafe("SELECT Location FROM main.investigation");
        assert_unsafe("SELECT main.investigation.Location FROM investigation");
    }
}
