//! Per-user table views: the mutable server-side materialization of one
//! user's exploration of one table.
//!
//! A `TableView` owns the joined and computed columns the current URL
//! references, plus the filter-mask cache. It is created lazily on the
//! first request for a (user, table) pair, mutated in place across
//! requests, and never shared between users. The view version is bumped on
//! every column mutation so derived artifacts (masks) invalidate.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::column::{ColumnRef, PhysicalType};
use crate::error::ValidationError;
use crate::expr::{
    check, ColumnGetter, ColumnTypeGetter, CompiledExpr, EvalError, ExpressionCache, ExprType,
};
use crate::filter::FilterMaskCache;
use crate::join::{ColumnPath, JoinedColumn};
use crate::model::DataModel;
use crate::table::Table;
use crate::value::Value;

/// A computed column: a compiled expression typed at creation time by
/// evaluating row 0. A compile failure leaves a null placeholder so the
/// rest of the pipeline still operates.
#[derive(Debug, Clone)]
pub struct ComputedColumn {
    pub name: String,
    pub source: String,
    expr: Option<Arc<CompiledExpr>>,
    pub inferred: ExprType,
    pub error: Option<String>,
}

impl ComputedColumn {
    pub fn is_degraded(&self) -> bool {
        self.expr.is_none()
    }
}

/// A column reachable from the view, across all three variants.
#[derive(Debug, Clone, Copy)]
pub enum ViewColumn<'v> {
    Base(&'v ColumnRef),
    Joined(&'v JoinedColumn),
    Computed(&'v ComputedColumn, usize),
}

impl<'v> ViewColumn<'v> {
    /// Header text for the column.
    pub fn display_name(&self) -> String {
        match self {
            ViewColumn::Base(col) => col.def().display_name.clone(),
            ViewColumn::Joined(jc) => jc.display_name().to_string(),
            ViewColumn::Computed(cc, _) => cc.name.clone(),
        }
    }

    /// Whether the grouping engine may sum this column.
    pub fn summable(&self) -> bool {
        match self {
            ViewColumn::Base(col) => col.def().summable,
            ViewColumn::Joined(jc) => jc.selected().def().summable,
            ViewColumn::Computed(cc, _) => matches!(cc.inferred, ExprType::Int | ExprType::Float),
        }
    }

    /// Static type, for the checker and sort comparators.
    pub fn static_type(&self) -> ExprType {
        match self {
            ViewColumn::Base(col) => physical_to_expr_type(col.physical()),
            ViewColumn::Joined(jc) => physical_to_expr_type(jc.selected().physical()),
            ViewColumn::Computed(cc, _) => cc.inferred,
        }
    }
}

fn physical_to_expr_type(physical: PhysicalType) -> ExprType {
    match physical {
        PhysicalType::Float32 | PhysicalType::Float64 => ExprType::Float,
        PhysicalType::Bool => ExprType::Bool,
        PhysicalType::Str => ExprType::Str,
        PhysicalType::Datetime => ExprType::Datetime,
        PhysicalType::Duration => ExprType::Duration,
        _ => ExprType::Int,
    }
}

#[derive(Debug)]
pub struct TableView {
    table: Arc<Table>,
    joined: BTreeMap<String, JoinedColumn>,
    computed: Vec<ComputedColumn>,
    pub filter_cache: FilterMaskCache,
    version: u64,
}

impl TableView {
    pub fn new(table: Arc<Table>) -> Self {
        TableView {
            table,
            joined: BTreeMap::new(),
            computed: Vec::new(),
            filter_cache: FilterMaskCache::new(),
            version: 0,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Version of the view's column set; bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self) {
        self.version += 1;
        self.filter_cache.invalidate();
    }

    pub fn computed_columns(&self) -> &[ComputedColumn] {
        &self.computed
    }

    pub fn joined_columns(&self) -> &BTreeMap<String, JoinedColumn> {
        &self.joined
    }

    /// Resolve a canonical column reference against base, joined and
    /// computed columns.
    pub fn resolve(&self, colref: &str) -> Option<ViewColumn<'_>> {
        if let Some(col) = self.table.get_column(colref) {
            return Some(ViewColumn::Base(col));
        }
        if let Some(jc) = self.joined.get(colref) {
            return Some(ViewColumn::Joined(jc));
        }
        self.computed
            .iter()
            .enumerate()
            .find(|(_, cc)| cc.name == colref)
            .map(|(i, cc)| ViewColumn::Computed(cc, i))
    }

    /// Cell value of any view column at a row.
    pub fn value(&self, colref: &str, row: usize) -> Result<Value, EvalError> {
        match self.resolve(colref) {
            Some(ViewColumn::Base(col)) => Ok(col.value(row)),
            Some(ViewColumn::Joined(jc)) => Ok(jc.value(row)),
            Some(ViewColumn::Computed(cc, index)) => self.eval_computed(cc, index, row),
            None => Err(EvalError::UnknownColumn(colref.to_string())),
        }
    }

    fn eval_computed(
        &self,
        cc: &ComputedColumn,
        index: usize,
        row: usize,
    ) -> Result<Value, EvalError> {
        match &cc.expr {
            Some(expr) => expr.eval(&RowGetter { view: self, ceiling: index }, row),
            None => Ok(Value::Nil),
        }
    }

    /// Getter over the full view, for filters and sorts.
    pub fn getter(&self) -> RowGetter<'_> {
        RowGetter { view: self, ceiling: self.computed.len() }
    }

    /// Reconcile joined columns against the URL's column list: add the
    /// joined references that are missing, drop the ones no longer
    /// referenced. Unresolvable references produce validation errors and
    /// are skipped.
    pub fn reconcile_joins(
        &mut self,
        model: &DataModel,
        columns: &[ColumnPath],
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut wanted: Vec<&ColumnPath> = Vec::new();
        for path in columns {
            if path.is_joined() {
                wanted.push(path);
            }
        }

        // drop joined columns that the URL no longer references
        let keep: Vec<String> = wanted.iter().map(|p| p.canonical()).collect();
        let before = self.joined.len();
        self.joined.retain(|key, _| keep.contains(key));
        let mut changed = self.joined.len() != before;

        for path in wanted {
            let key = path.canonical();
            if self.joined.contains_key(&key) {
                continue;
            }
            match self.build_joined(model, path) {
                Ok(jc) => {
                    debug!(column = %key, "joined column added");
                    self.joined.insert(key, jc);
                    changed = true;
                }
                Err(message) => errors.push(ValidationError { column: key, message }),
            }
        }
        if changed {
            self.bump();
        }
        errors
    }

    fn build_joined(&self, model: &DataModel, path: &ColumnPath) -> Result<JoinedColumn, String> {
        let ColumnPath::Joined { from_col, to_table, to_col, selected } = path else {
            return Err("not a joined reference".to_string());
        };
        let source = self
            .table
            .get_column(from_col)
            .ok_or_else(|| format!("unknown column {from_col:?} on table {:?}", self.table.name()))?;
        let join = model
            .find_join(self.table.name(), from_col, to_table, to_col)
            .ok_or_else(|| format!("no join from {:?}.{from_col} to {to_table}.{to_col}", self.table.name()))?;
        let target_table = model
            .get_table(to_table)
            .ok_or_else(|| format!("unknown table {to_table:?}"))?;
        let selected_col = target_table
            .get_column(selected)
            .ok_or_else(|| format!("unknown column {selected:?} on table {to_table:?}"))?;
        Ok(JoinedColumn::new(
            path.clone(),
            Arc::clone(source),
            Arc::clone(join),
            Arc::clone(selected_col),
        ))
    }

    /// Reconcile computed columns against the URL: reuse unchanged ones by
    /// source text, compile new ones, drop removed ones. Compile and type
    /// failures degrade the column to a null placeholder and are reported.
    pub fn reconcile_computed(
        &mut self,
        computed: &[(String, String)],
        cache: &ExpressionCache,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut next: Vec<ComputedColumn> = Vec::with_capacity(computed.len());
        let mut changed = false;

        for (name, source) in computed {
            if let Some(existing) = self
                .computed
                .iter()
                .find(|cc| &cc.name == name && &cc.source == source)
            {
                next.push(existing.clone());
                continue;
            }
            changed = true;
            let column = self.compile_computed(name, source, cache, &next);
            if let Some(message) = &column.error {
                errors.push(ValidationError { column: name.clone(), message: message.clone() });
            }
            next.push(column);
        }
        if next.len() != self.computed.len()
            || next
                .iter()
                .map(|cc| &cc.name)
                .ne(self.computed.iter().map(|cc| &cc.name))
        {
            changed = true;
        }
        if changed {
            self.computed = next;
            self.bump();
        }
        errors
    }

    fn compile_computed(
        &self,
        name: &str,
        source: &str,
        cache: &ExpressionCache,
        earlier: &[ComputedColumn],
    ) -> ComputedColumn {
        let expr = match cache.compile(source) {
            Ok(expr) => expr,
            Err(err) => {
                return ComputedColumn {
                    name: name.to_string(),
                    source: source.to_string(),
                    expr: None,
                    inferred: ExprType::Nil,
                    error: Some(err.to_string()),
                }
            }
        };

        let types = StaticTypes { view: self, earlier };
        let checked = match check(expr.ast(), &types) {
            Ok(t) => t,
            Err(err) => {
                return ComputedColumn {
                    name: name.to_string(),
                    source: source.to_string(),
                    expr: None,
                    inferred: ExprType::Nil,
                    error: Some(err.to_string()),
                }
            }
        };

        // typed at creation by evaluating row 0; fall back to the checker
        // on empty tables or row-0 errors
        let inferred = if self.table.is_empty() {
            checked
        } else {
            let probe = CeilingGetter { view: self, earlier };
            match expr.eval(&probe, 0) {
                Ok(Value::Int(_)) => ExprType::Int,
                Ok(Value::Float(_)) => ExprType::Float,
                Ok(Value::Str(_)) => ExprType::Str,
                Ok(Value::Bool(_)) => ExprType::Bool,
                Ok(Value::Duration(_)) => ExprType::Duration,
                Ok(Value::Datetime(_)) => ExprType::Datetime,
                Ok(Value::Nil) | Err(_) => checked,
            }
        };

        ComputedColumn {
            name: name.to_string(),
            source: source.to_string(),
            expr: Some(expr),
            inferred,
            error: None,
        }
    }
}

/// Column getter over a view: base columns, joined columns, and computed
/// columns below a declaration-order ceiling (so a computed column can
/// reference earlier ones but never itself or later ones).
pub struct RowGetter<'v> {
    view: &'v TableView,
    ceiling: usize,
}

impl ColumnGetter for RowGetter<'_> {
    fn get(&self, name: &str, row: usize) -> Result<Value, EvalError> {
        if let Some(col) = self.view.table.get_column(name) {
            return Ok(col.value(row));
        }
        if let Some(jc) = self.view.joined.get(name) {
            return Ok(jc.value(row));
        }
        for (index, cc) in self.view.computed.iter().enumerate().take(self.ceiling) {
            if cc.name == name {
                return self.view.eval_computed(cc, index, row);
            }
        }
        Err(EvalError::UnknownColumn(name.to_string()))
    }
}

/// Getter used while probing a new computed column: sees the view plus the
/// computed columns reconciled so far.
struct CeilingGetter<'v> {
    view: &'v TableView,
    earlier: &'v [ComputedColumn],
}

impl ColumnGetter for CeilingGetter<'_> {
    fn get(&self, name: &str, row: usize) -> Result<Value, EvalError> {
        if let Some(col) = self.view.table.get_column(name) {
            return Ok(col.value(row));
        }
        if let Some(jc) = self.view.joined.get(name) {
            return Ok(jc.value(row));
        }
        for (index, cc) in self.earlier.iter().enumerate() {
            if cc.name == name {
                return match &cc.expr {
                    Some(expr) => expr.eval(&CeilingGetter { view: self.view, earlier: &self.earlier[..index] }, row),
                    None => Ok(Value::Nil),
                };
            }
        }
        Err(EvalError::UnknownColumn(name.to_string()))
    }
}

struct StaticTypes<'v> {
    view: &'v TableView,
    earlier: &'v [ComputedColumn],
}

impl ColumnTypeGetter for StaticTypes<'_> {
    fn column_type(&self, name: &str) -> ExprType {
        if let Some(col) = self.view.table.get_column(name) {
            return physical_to_expr_type(col.physical());
        }
        if let Some(jc) = self.view.joined.get(name) {
            return physical_to_expr_type(jc.selected().physical());
        }
        if let Some(cc) = self.earlier.iter().find(|cc| cc.name == name) {
            return cc.inferred;
        }
        ExprType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnBuilder, ColumnDef};
    use crate::model::DataModel;

    fn demo_model() -> DataModel {
        let mut orders = Table::new("orders");
        let mut region = ColumnBuilder::new(
            ColumnDef::new("region", PhysicalType::Str).with_entity_type("demo.region"),
        );
        let mut amount = ColumnBuilder::new(ColumnDef::new("amount", PhysicalType::Float64));
        for (r, a) in [("west", 100.0), ("east", 250.0), ("south", 80.0)] {
            region.append(Value::Str(r.to_string())).unwrap();
            amount.append(Value::Float(a)).unwrap();
        }
        orders.add_column(region.finalize()).unwrap();
        orders.add_column(amount.finalize()).unwrap();

        let mut regions = Table::new("regions");
        let mut key = ColumnBuilder::new(
            ColumnDef::new("region", PhysicalType::Str).with_entity_type("demo.region"),
        );
        let mut pop = ColumnBuilder::new(ColumnDef::new("population", PhysicalType::Int64));
        for (r, p) in [("east", 700), ("west", 400)] {
            key.append(Value::Str(r.to_string())).unwrap();
            pop.append(Value::Int(p)).unwrap();
        }
        regions.add_column(key.finalize()).unwrap();
        regions.add_column(pop.finalize()).unwrap();

        let mut model = DataModel::new();
        model.add_table(orders).unwrap();
        model.add_table(regions).unwrap();
        model
    }

    fn view_for(model: &DataModel) -> TableView {
        TableView::new(Arc::clone(model.get_table("orders").unwrap()))
    }

    #[test]
    fn test_joined_reconcile_adds_and_removes() {
        let model = demo_model();
        let mut view = view_for(&model);
        let path = ColumnPath::parse("region.regions.region.population").unwrap();

        let errors = view.reconcile_joins(&model, &[path.clone()]);
        assert!(errors.is_empty());
        assert_eq!(view.joined_columns().len(), 1);
        let v0 = view.version();

        assert_eq!(
            view.value("region.regions.region.population", 0).unwrap(),
            Value::Int(400)
        );
        assert_eq!(
            view.value("region.regions.region.population", 2).unwrap(),
            Value::Nil
        );

        let errors = view.reconcile_joins(&model, &[]);
        assert!(errors.is_empty());
        assert!(view.joined_columns().is_empty());
        assert!(view.version() > v0);
    }

    #[test]
    fn test_bad_join_path_is_validation_error() {
        let model = demo_model();
        let mut view = view_for(&model);
        let path = ColumnPath::parse("region.regions.region.missing").unwrap();
        let errors = view.reconcile_joins(&model, &[path]);
        assert_eq!(errors.len(), 1);
        assert!(view.joined_columns().is_empty());
    }

    #[test]
    fn test_computed_column_typed_from_row_zero() {
        let model = demo_model();
        let mut view = view_for(&model);
        let cache = ExpressionCache::new();
        let errors = view.reconcile_computed(
            &[("tax".to_string(), "amount * 0.1".to_string())],
            &cache,
        );
        assert!(errors.is_empty());
        assert_eq!(view.computed_columns()[0].inferred, ExprType::Float);
        assert_eq!(view.value("tax", 1).unwrap(), Value::Float(25.0));
    }

    #[test]
    fn test_computed_chain_respects_declaration_order() {
        let model = demo_model();
        let mut view = view_for(&model);
        let cache = ExpressionCache::new();
        let errors = view.reconcile_computed(
            &[
                ("tax".to_string(), "amount * 0.1".to_string()),
                ("gross".to_string(), "amount + tax".to_string()),
            ],
            &cache,
        );
        assert!(errors.is_empty());
        assert_eq!(view.value("gross", 0).unwrap(), Value::Float(110.0));

        // a computed column cannot see later ones (or itself)
        let errors = view.reconcile_computed(
            &[("loop".to_string(), "loop + 1".to_string())],
            &cache,
        );
        assert!(errors.is_empty());
        assert!(matches!(view.value("loop", 0), Err(EvalError::UnknownColumn(_))));
    }

    #[test]
    fn test_computed_compile_failure_degrades_to_null() {
        let model = demo_model();
        let mut view = view_for(&model);
        let cache = ExpressionCache::new();
        let errors = view.reconcile_computed(
            &[("broken".to_string(), "amount *".to_string())],
            &cache,
        );
        assert_eq!(errors.len(), 1);
        assert!(view.computed_columns()[0].is_degraded());
        assert_eq!(view.value("broken", 0).unwrap(), Value::Nil);
    }

    #[test]
    fn test_computed_reuse_keeps_version() {
        let model = demo_model();
        let mut view = view_for(&model);
        let cache = ExpressionCache::new();
        let spec = vec![("tax".to_string(), "amount * 0.1".to_string())];
        view.reconcile_computed(&spec, &cache);
        let v = view.version();
        view.reconcile_computed(&spec, &cache);
        assert_eq!(view.version(), v);
    }
}
