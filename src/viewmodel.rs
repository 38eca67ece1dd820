//! View model builder: flattens a pipeline result into renderer-ready
//! rows, headers, sidebar tree and pagination.
//!
//! Grouped views emit one display row per leaf group; ancestor cells carry
//! a rowspan covering their subtree, so the renderer can emit them once.
//! Summed cells use `[subtotal/total]`, group labels carry their count
//! chain `(#groups/…/#rows)`. All control URLs are query strings produced
//! by the URL codec, so clicking one reproduces the exact view state plus
//! the one toggled change.

use serde::Serialize;

use crate::error::ValidationResult;
use crate::group::{Group, GroupTree};
use crate::join::ColumnPath;
use crate::model::DataModel;
use crate::pipeline::{path_is_cyclic, Timings, ViewOutcome};
use crate::query::Query;
use crate::value::format_f64;
use crate::view::TableView;

#[derive(Debug, Clone, Serialize)]
pub struct HeaderModel {
    pub label: String,
    pub colref: String,
    pub grouped: bool,
    /// `asc`, `desc`, or absent when the view does not sort by this column.
    pub sort_state: Option<&'static str>,
    pub sort_url: String,
    pub group_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellModel {
    pub text: String,
    /// Rows this cell spans; 0 marks a cell covered by a rowspan above.
    pub rowspan: u32,
    /// Grouping depth for grouped label cells, 1-based.
    pub group_level: Option<u8>,
}

impl CellModel {
    fn plain(text: String) -> Self {
        CellModel { text, rowspan: 1, group_level: None }
    }

    fn covered() -> Self {
        CellModel { text: String::new(), rowspan: 0, group_level: None }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SidebarNode {
    pub label: String,
    /// Canonical column reference when the node is an addable column.
    pub colref: Option<String>,
    pub add_url: Option<String>,
    /// Expansion key when the node is a join edge.
    pub expand_key: Option<String>,
    pub toggle_url: Option<String>,
    pub expanded: bool,
    /// Join edges whose expansion would revisit a table are blocked.
    pub blocked: bool,
    pub children: Vec<SidebarNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub limit: usize,
    pub total_rows: usize,
    pub displayed_rows: usize,
    pub has_more: bool,
    pub more_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableViewModel {
    pub title: String,
    pub query_string: String,
    pub headers: Vec<HeaderModel>,
    pub rows: Vec<Vec<CellModel>>,
    pub total_rows: usize,
    pub displayed_rows: usize,
    pub has_more_rows: bool,
    pub sidebar: Vec<SidebarNode>,
    pub pagination: Pagination,
    pub timings: Timings,
    pub errors: ValidationResult,
}

/// Column roles in display order.
enum DisplaySlot {
    /// Grouping column at the given 0-based grouping depth.
    Grouped(usize),
    /// Summed column.
    Aggregated(String),
    /// Anything else.
    Plain(String),
}

pub fn build(
    model: &DataModel,
    view: &TableView,
    query: &Query,
    outcome: &ViewOutcome,
    total_rows: usize,
    timings: Timings,
    mut errors: ValidationResult,
) -> TableViewModel {
    let display = display_columns(query, view);
    let headers = headers(&display, query, view);

    let rows = match outcome {
        ViewOutcome::Linear(row_ids) => linear_rows(&display.refs, view, row_ids, &mut errors),
        ViewOutcome::Grouped(tree) => grouped_rows(&display, view, tree, &mut errors),
    };

    let displayed_rows = match outcome {
        ViewOutcome::Linear(row_ids) => row_ids.len(),
        ViewOutcome::Grouped(tree) => tree.total_rows() as usize,
    };
    let has_more_rows = displayed_rows < total_rows;

    let more_url = has_more_rows.then(|| {
        let mut next = query.clone();
        next.limit = if query.limit == 0 { 0 } else { query.limit * 2 };
        format!("?{}", next.to_query_string())
    });

    TableViewModel {
        title: view.table().name().to_string(),
        query_string: query.to_query_string(),
        headers,
        rows,
        total_rows,
        displayed_rows,
        has_more_rows,
        sidebar: sidebar(model, view, query),
        pagination: Pagination {
            limit: query.limit,
            total_rows,
            displayed_rows,
            has_more: has_more_rows,
            more_url,
        },
        timings,
        errors,
    }
}

struct Display {
    refs: Vec<String>,
    slots: Vec<DisplaySlot>,
}

/// Effective display order: grouping columns first (hierarchy order), then
/// the remaining selected columns. An empty selection shows every base
/// column.
fn display_columns(query: &Query, view: &TableView) -> Display {
    let mut refs: Vec<String> = Vec::new();
    let mut slots: Vec<DisplaySlot> = Vec::new();

    // depth counts only the grouping columns that resolved, matching the
    // levels the group tree was actually built from
    let mut depth = 0;
    for path in &query.grouped_columns {
        let colref = path.canonical();
        if view.resolve(&colref).is_some() {
            refs.push(colref);
            slots.push(DisplaySlot::Grouped(depth));
            depth += 1;
        }
    }

    let selected: Vec<String> = if query.columns.is_empty() {
        view.table().column_names().map(str::to_string).collect()
    } else {
        query.columns.iter().map(ColumnPath::canonical).collect()
    };

    for colref in selected {
        if refs.contains(&colref) {
            continue;
        }
        let Some(col) = view.resolve(&colref) else { continue };
        let slot = if query.is_grouped() && col.summable() {
            DisplaySlot::Aggregated(colref.clone())
        } else {
            DisplaySlot::Plain(colref.clone())
        };
        refs.push(colref);
        slots.push(slot);
    }

    Display { refs, slots }
}

fn headers(display: &Display, query: &Query, view: &TableView) -> Vec<HeaderModel> {
    display
        .refs
        .iter()
        .map(|colref| {
            let label = view
                .resolve(colref)
                .map(|c| c.display_name())
                .unwrap_or_else(|| colref.clone());
            let grouped = query
                .grouped_columns
                .iter()
                .any(|p| &p.canonical() == colref);
            let sort_state = query
                .sort_for(colref)
                .map(|e| if e.descending { "desc" } else { "asc" });
            let group_path = ColumnPath::parse(colref)
                .unwrap_or_else(|_| ColumnPath::Base(colref.clone()));
            HeaderModel {
                label,
                colref: colref.clone(),
                grouped,
                sort_state,
                sort_url: format!("?{}", query.with_sort_cycled(colref).to_query_string()),
                group_url: format!("?{}", query.with_group_toggled(&group_path).to_query_string()),
            }
        })
        .collect()
}

/// Render a cell, recording the first evaluation error per column.
fn cell_text(view: &TableView, colref: &str, row: u32, errors: &mut ValidationResult) -> String {
    match view.value(colref, row as usize) {
        Ok(value) => value.render(),
        Err(err) => {
            let already = errors.computed_errors.iter().any(|e| e.column == colref);
            if !already {
                errors.computed(colref.to_string(), err.to_string());
            }
            String::new()
        }
    }
}

fn linear_rows(
    refs: &[String],
    view: &TableView,
    row_ids: &[u32],
    errors: &mut ValidationResult,
) -> Vec<Vec<CellModel>> {
    row_ids
        .iter()
        .map(|&row| {
            refs.iter()
                .map(|colref| CellModel::plain(cell_text(view, colref, row, errors)))
                .collect()
        })
        .collect()
}

/// Leaf-level display groups under a node.
fn leaf_span(group: &Group) -> u32 {
    if group.is_leaf() {
        1
    } else {
        group.counts[group.counts.len() - 2]
    }
}

fn group_label(group: &Group) -> String {
    let counts: Vec<String> = group.counts.iter().map(u32::to_string).collect();
    format!("{} ({})", group.label, counts.join("/"))
}

fn grouped_rows(
    display: &Display,
    view: &TableView,
    tree: &GroupTree,
    errors: &mut ValidationResult,
) -> Vec<Vec<CellModel>> {
    let mut rows = Vec::new();
    let total_sums = &tree.root.sums;
    for top in tree.top_groups() {
        let mut ancestors = Vec::new();
        let mut indices = Vec::new();
        emit_group(top, display, view, total_sums, &mut ancestors, &mut indices, &mut rows, errors);
    }
    rows
}

#[allow(clippy::too_many_arguments)]
fn emit_group<'t>(
    group: &'t Group,
    display: &Display,
    view: &TableView,
    total_sums: &std::collections::BTreeMap<String, f64>,
    ancestors: &mut Vec<&'t Group>,
    indices: &mut Vec<usize>,
    rows: &mut Vec<Vec<CellModel>>,
    errors: &mut ValidationResult,
) {
    ancestors.push(group);
    if group.is_leaf() {
        rows.push(leaf_row(display, view, total_sums, ancestors, indices, errors));
    } else {
        for (i, child) in group.children.iter().enumerate() {
            indices.push(i);
            emit_group(child, display, view, total_sums, ancestors, indices, rows, errors);
            indices.pop();
        }
    }
    ancestors.pop();
}

fn leaf_row(
    display: &Display,
    view: &TableView,
    total_sums: &std::collections::BTreeMap<String, f64>,
    ancestors: &[&Group],
    indices: &[usize],
    errors: &mut ValidationResult,
) -> Vec<CellModel> {
    let leaf = ancestors[ancestors.len() - 1];
    display
        .slots
        .iter()
        .zip(&display.refs)
        .map(|(slot, colref)| match slot {
            DisplaySlot::Grouped(depth) => {
                let Some(ancestor) = ancestors.get(*depth) else {
                    return CellModel::covered();
                };
                // a cell is emitted on the first leaf of its subtree: every
                // path index below this depth is zero
                let first = indices[*depth..].iter().all(|&i| i == 0);
                if first {
                    CellModel {
                        text: group_label(ancestor),
                        rowspan: leaf_span(ancestor),
                        group_level: Some(*depth as u8 + 1),
                    }
                } else {
                    CellModel::covered()
                }
            }
            DisplaySlot::Aggregated(agg_ref) => {
                let sub = leaf.sum(agg_ref).unwrap_or(0.0);
                let total = total_sums.get(agg_ref).copied().unwrap_or(0.0);
                CellModel::plain(format!("[{}/{}]", format_f64(sub), format_f64(total)))
            }
            DisplaySlot::Plain(plain_ref) => {
                CellModel::plain(distinct_summary(view, plain_ref, &leaf.rows, errors))
            }
        })
        .collect()
}

/// Non-aggregated cell in a grouped view: the shared value when every row
/// in the bucket renders the same, otherwise the distinct count.
fn distinct_summary(
    view: &TableView,
    colref: &str,
    rows: &[u32],
    errors: &mut ValidationResult,
) -> String {
    let mut first: Option<String> = None;
    let mut distinct = std::collections::BTreeSet::new();
    for &row in rows {
        let text = cell_text(view, colref, row, errors);
        if first.is_none() {
            first = Some(text.clone());
        }
        distinct.insert(text);
    }
    match (first, distinct.len()) {
        (Some(text), 1) => text,
        (_, n) => format!("({n})"),
    }
}

/// The all-columns sidebar: base columns of the current table, join edges
/// expandable per the `expanded` set, cyclic paths blocked.
fn sidebar(model: &DataModel, view: &TableView, query: &Query) -> Vec<SidebarNode> {
    let table = view.table();
    table
        .columns()
        .iter()
        .map(|col| {
            let colref = col.name().to_string();
            let path = ColumnPath::Base(colref.clone());
            let children = join_edges(
                model,
                table.name(),
                col.name(),
                &[table.name()],
                "",
                query,
                true,
            );
            SidebarNode {
                label: col.def().display_name.clone(),
                colref: Some(colref),
                add_url: Some(format!("?{}", query.with_column_toggled(&path).to_query_string())),
                expand_key: None,
                toggle_url: None,
                expanded: false,
                blocked: false,
                children,
            }
        })
        .collect()
}

fn join_edges(
    model: &DataModel,
    table_name: &str,
    col_name: &str,
    visited: &[&str],
    key_prefix: &str,
    query: &Query,
    first_hop: bool,
) -> Vec<SidebarNode> {
    let mut nodes = Vec::new();
    for join in model.joins_from(table_name) {
        if join.source_column() != col_name {
            continue;
        }
        let target = join.target_table();
        let key = format!(
            "{key_prefix}{}.{}.{}",
            join.source_column(),
            target,
            join.target_column()
        );
        let mut tables: Vec<&str> = visited.to_vec();
        tables.push(target);
        let blocked = path_is_cyclic(&tables);
        let expanded = !blocked && query.expanded.iter().any(|p| p == &key);

        let children = if expanded {
            target_columns(model, join.source_column(), target, join.target_column(), &tables, &key, query, first_hop)
        } else {
            Vec::new()
        };

        nodes.push(SidebarNode {
            label: format!("{}.{}", target, join.target_column()),
            colref: None,
            add_url: None,
            expand_key: Some(key.clone()),
            toggle_url: (!blocked)
                .then(|| format!("?{}", query.with_expanded_toggled(&key).to_query_string())),
            expanded,
            blocked,
            children,
        });
    }
    nodes
}

#[allow(clippy::too_many_arguments)]
fn target_columns(
    model: &DataModel,
    from_col: &str,
    target_table: &str,
    target_col: &str,
    visited: &[&str],
    key_prefix: &str,
    query: &Query,
    first_hop: bool,
) -> Vec<SidebarNode> {
    let Some(table) = model.get_table(target_table) else { return Vec::new() };
    table
        .columns()
        .iter()
        .map(|col| {
            // only single-hop columns have a canonical reference to add
            let (colref, add_url) = if first_hop {
                let path = ColumnPath::Joined {
                    from_col: from_col.to_string(),
                    to_table: target_table.to_string(),
                    to_col: target_col.to_string(),
                    selected: col.name().to_string(),
                };
                (
                    Some(path.canonical()),
                    Some(format!("?{}", query.with_column_toggled(&path).to_query_string())),
                )
            } else {
                (None, None)
            };
            let children = join_edges(
                model,
                target_table,
                col.name(),
                visited,
                &format!("{key_prefix}/"),
                query,
                false,
            );
            SidebarNode {
                label: col.def().display_name.clone(),
                colref,
                add_url,
                expand_key: None,
                toggle_url: None,
                expanded: false,
                blocked: false,
                children,
            }
        })
        .collect()
}
