//! View pipeline: the per-request orchestration of joins, computed
//! columns, filters, grouping and sorting into a renderer-ready view model.
//!
//! The engine owns the immutable data model, the process-wide expression
//! cache and the per-user table-view cache. Two concurrent requests for
//! the same (user, table) serialize on the view's entry lock; different
//! users never share a view.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cancel::CancelHandle;
use crate::error::{EngineError, ValidationResult};
use crate::expr::ExpressionCache;
use crate::filter::{build_mask, mask_signature, CompiledFilter, RowMask};
use crate::group::{
    build_group_tree, AggregateSpec, GroupOrder, GroupOrderKey, GroupTree, GroupingColumn,
};
use crate::model::DataModel;
use crate::query::Query;
use crate::sort::top_k_rows;
use crate::value::Value;
use crate::view::{TableView, ViewColumn};
use crate::viewmodel::{self, TableViewModel};

/// Per-stage elapsed time in microseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Timings {
    pub parse_us: u64,
    pub cache_lookup_us: u64,
    pub join_reconcile_us: u64,
    pub compute_us: u64,
    pub filter_us: u64,
    pub group_sort_us: u64,
    pub view_model_us: u64,
}

fn elapsed_us(since: Instant) -> u64 {
    since.elapsed().as_micros() as u64
}

/// The result rows of a pipeline run: a group hierarchy or a flat ordered
/// row set.
pub enum ViewOutcome {
    Grouped(GroupTree),
    Linear(Vec<u32>),
}

pub struct Engine {
    model: Arc<DataModel>,
    exprs: ExpressionCache,
    views: DashMap<(String, String), Arc<Mutex<TableView>>>,
}

impl Engine {
    pub fn new(model: DataModel) -> Self {
        Engine { model: Arc::new(model), exprs: ExpressionCache::new(), views: DashMap::new() }
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn expression_cache(&self) -> &ExpressionCache {
        &self.exprs
    }

    /// Number of live (user, table) views.
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Run the full pipeline for a decoded query. `parse_us` carries the
    /// URL-decode time measured by the caller.
    pub fn handle(
        &self,
        query: &Query,
        parse_us: u64,
        cancel: Option<&CancelHandle>,
    ) -> Result<TableViewModel, EngineError> {
        let table = self
            .model
            .get_table(&query.table)
            .ok_or_else(|| EngineError::UnknownTable(query.table.clone()))?;

        let mut timings = Timings { parse_us, ..Timings::default() };
        let mut errors = ValidationResult::default();

        // fetch or create the per-user view; the entry lock serializes
        // concurrent requests for the same (user, table)
        let stage = Instant::now();
        let entry = self
            .views
            .entry(query.view_key())
            .or_insert_with(|| Arc::new(Mutex::new(TableView::new(Arc::clone(table)))))
            .clone();
        let mut view = entry.lock();
        timings.cache_lookup_us = elapsed_us(stage);

        let stage = Instant::now();
        for err in view.reconcile_joins(&self.model, &query.columns) {
            warn!(column = %err.column, message = %err.message, "joined column rejected");
            errors.computed_errors.push(err);
        }
        timings.join_reconcile_us = elapsed_us(stage);

        let stage = Instant::now();
        for err in view.reconcile_computed(&query.computed, &self.exprs) {
            warn!(column = %err.column, message = %err.message, "computed column degraded");
            errors.computed_errors.push(err);
        }
        timings.compute_us = elapsed_us(stage);

        let stage = Instant::now();
        let (mask_filters, bucket_filters) = self.compile_filters(query, &view, &mut errors);
        let mask = self.masked_rows(&view, &mask_filters);
        let filter_cache_signature = mask_signature(&mask_filters, view.version());
        view.filter_cache.store(filter_cache_signature, Arc::clone(&mask));
        timings.filter_us = elapsed_us(stage);

        let total_rows = mask.ones();

        let stage = Instant::now();
        let outcome = match query.is_grouped() {
            true => match self.group(query, &view, &mask, &bucket_filters, &mut errors, cancel)? {
                Some(tree) => ViewOutcome::Grouped(tree),
                // no grouping column survived validation
                None => ViewOutcome::Linear(self.sort_linear(query, &view, &mask)),
            },
            false => ViewOutcome::Linear(self.sort_linear(query, &view, &mask)),
        };
        timings.group_sort_us = elapsed_us(stage);

        let stage = Instant::now();
        let mut model =
            viewmodel::build(&self.model, &view, query, &outcome, total_rows, timings, errors);
        model.timings.view_model_us = elapsed_us(stage);
        debug!(
            table = %query.table,
            user = %query.user,
            total_rows,
            displayed = model.displayed_rows,
            "view rendered"
        );
        Ok(model)
    }

    /// Compile the URL's filters, splitting them into mask filters and
    /// bucket-defining filters (two or more alternatives on a grouped
    /// column). Invalid filters degrade to pass-through and are reported.
    fn compile_filters(
        &self,
        query: &Query,
        view: &TableView,
        errors: &mut ValidationResult,
    ) -> (Vec<CompiledFilter>, Vec<CompiledFilter>) {
        let mut mask_filters = Vec::new();
        let mut bucket_filters = Vec::new();

        for (colref, source) in &query.filters {
            if view.resolve(colref).is_none() {
                errors.filter(colref.clone(), format!("unknown column {colref:?}"));
                continue;
            }
            let filter = match CompiledFilter::compile(colref, source, &self.exprs) {
                Ok(f) => f,
                Err(err) => {
                    errors.filter(colref.clone(), err.to_string());
                    continue;
                }
            };
            let grouped = query
                .grouped_columns
                .iter()
                .any(|p| p.canonical() == *colref);
            if grouped && filter.defines_buckets() {
                bucket_filters.push(filter);
            } else {
                mask_filters.push(filter);
            }
        }
        (mask_filters, bucket_filters)
    }

    /// Filter mask, served from the view's cache when the filter set and
    /// view version are unchanged.
    fn masked_rows(&self, view: &TableView, filters: &[CompiledFilter]) -> Arc<RowMask> {
        let signature = mask_signature(filters, view.version());
        if let Some(cached) = view.filter_cache.get(signature) {
            debug!(signature, "filter mask cache hit");
            return cached;
        }
        Arc::new(build_mask(filters, view.len(), &view.getter()))
    }

    fn group(
        &self,
        query: &Query,
        view: &TableView,
        mask: &RowMask,
        bucket_filters: &[CompiledFilter],
        errors: &mut ValidationResult,
        cancel: Option<&CancelHandle>,
    ) -> Result<Option<GroupTree>, EngineError> {
        let len = view.len();
        let mut columns = Vec::new();
        let mut orders = Vec::new();

        let aggregated = aggregated_refs(query, view);

        for path in &query.grouped_columns {
            let colref = path.canonical();
            if view.resolve(&colref).is_none() {
                errors.computed(colref.clone(), format!("unknown grouping column {colref:?}"));
                continue;
            }
            let asc = query.sort_for(&colref).map(|e| !e.descending).unwrap_or(true);

            let bucket_filter = bucket_filters.iter().find(|f| f.column == colref);
            let grouping = match bucket_filter {
                Some(filter) => {
                    let labels: Vec<String> = filter
                        .alternatives
                        .iter()
                        .map(|alt| alt.source().to_string())
                        .collect();
                    let getter = view.getter();
                    GroupingColumn::from_filter_buckets(
                        path.clone(),
                        len,
                        asc,
                        &labels,
                        |row, alt| {
                            filter.alternatives[alt]
                                .eval(&getter, row as usize)
                                .map(|v| v.truthy())
                                .unwrap_or(false)
                        },
                    )
                }
                None => GroupingColumn::from_values(path.clone(), len, asc, |row| {
                    view.value(&colref, row as usize).unwrap_or(Value::Nil)
                }),
            };
            columns.push(grouping);
            orders.push(level_order(query, &colref, &aggregated, asc));
        }

        if columns.is_empty() {
            return Ok(None);
        }

        // the aggregate accessors borrow the view; keep them alive together
        let accessors: Vec<(String, Box<dyn Fn(u32) -> Option<f64> + '_>)> = aggregated
            .iter()
            .map(|colref| {
                let colref_owned = colref.clone();
                let access: Box<dyn Fn(u32) -> Option<f64> + '_> = Box::new(move |row| {
                    view.value(&colref_owned, row as usize)
                        .ok()
                        .and_then(|v| v.as_f64())
                });
                (colref.clone(), access)
            })
            .collect();
        let specs: Vec<AggregateSpec<'_>> = accessors
            .iter()
            .map(|(colref, access)| AggregateSpec { colref: colref.clone(), value: access.as_ref() })
            .collect();

        let rows: Vec<u32> = mask.iter_ones().collect();
        build_group_tree(&rows, &columns, &specs, &orders, query.limit, cancel).map(Some)
    }

    fn sort_linear(&self, query: &Query, view: &TableView, mask: &RowMask) -> Vec<u32> {
        if query.sort_order.is_empty() {
            // insertion order, clipped
            let limit = if query.limit == 0 { usize::MAX } else { query.limit };
            return mask.iter_ones().take(limit).collect();
        }

        // per-key comparison: base string columns compare by dictionary
        // rank, everything else by value
        enum Key<'v> {
            Rank(&'v crate::column::ColumnRef),
            ByValue(String),
        }
        let mut keys = Vec::new();
        for entry in &query.sort_order {
            let Some(col) = view.resolve(&entry.column) else { continue };
            let key = match col {
                ViewColumn::Base(base) if base.dictionary().is_some() => Key::Rank(base),
                _ => Key::ByValue(entry.column.clone()),
            };
            keys.push((key, entry.descending));
        }

        top_k_rows(mask.iter_ones(), query.limit, |a, b| {
            for (key, descending) in &keys {
                let ord = match key {
                    Key::Rank(col) => {
                        let ra = col.dict_id(a as usize).and_then(|id| col.rank_of_id(id));
                        let rb = col.dict_id(b as usize).and_then(|id| col.rank_of_id(id));
                        ra.cmp(&rb)
                    }
                    Key::ByValue(colref) => {
                        let va = view.value(colref, a as usize).unwrap_or(Value::Nil);
                        let vb = view.value(colref, b as usize).unwrap_or(Value::Nil);
                        va.compare(&vb)
                    }
                };
                let ord = if *descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        })
    }
}

/// Displayed columns the grouping engine should sum.
fn aggregated_refs(query: &Query, view: &TableView) -> Vec<String> {
    let mut refs = Vec::new();
    for path in &query.columns {
        let colref = path.canonical();
        if query.grouped_columns.iter().any(|p| p.canonical() == colref) {
            continue;
        }
        if let Some(col) = view.resolve(&colref) {
            if col.summable() {
                refs.push(colref);
            }
        }
    }
    refs
}

/// Ordering for one grouping level: the column's own value order when the
/// sort refers to it, an aggregate sum when the sort refers to a summed
/// column, value order otherwise.
fn level_order(query: &Query, colref: &str, aggregated: &[String], asc: bool) -> GroupOrder {
    if query.sort_for(colref).is_some() {
        return GroupOrder { key: GroupOrderKey::Value, asc };
    }
    for entry in &query.sort_order {
        if aggregated.iter().any(|a| a == &entry.column) {
            return GroupOrder { key: GroupOrderKey::Sum(entry.column.clone()), asc: !entry.descending };
        }
    }
    GroupOrder { key: GroupOrderKey::Value, asc }
}

/// Paths of the sidebar expansion set that revisit a table are rejected as
/// blocked rather than errored.
pub fn path_is_cyclic(tables: &[&str]) -> bool {
    for (i, t) in tables.iter().enumerate() {
        if tables[..i].contains(t) {
            return true;
        }
    }
    false
}
