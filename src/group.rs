//! Grouping and aggregation: the hierarchy of groups behind a grouped view.
//!
//! The build runs in two phases. A pre-pass per grouping column assigns
//! every table row a group key (distinct values, or filter-defined buckets
//! with key 0 as the catch-all) together with the value-sorted rank of each
//! key. The recursive build then partitions the filtered row set level by
//! level, rolls counts and sums up the tree, and clips the top level to the
//! display limit via the sort engine.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::cancel::CancelHandle;
use crate::error::EngineError;
use crate::join::ColumnPath;
use crate::sort::TopK;
use crate::value::Value;

/// Group key reserved for rows matching no filter-defined bucket. Rendered
/// as the "…" bucket; never clipped away.
pub const NO_MATCH_KEY: u32 = 0;

/// Label of the catch-all bucket.
pub const NO_MATCH_LABEL: &str = "\u{2026}";

/// One grouping column after the pre-pass: a group key per table row plus
/// display and ordering metadata per key.
#[derive(Debug, Clone)]
pub struct GroupingColumn {
    pub path: ColumnPath,
    /// Group key for every table row (indexed by row id).
    pub keys: Vec<u32>,
    /// Display label per group key; index 0 is the catch-all.
    pub labels: Vec<String>,
    /// Value-sorted rank per group key; the catch-all ranks last.
    pub order: Vec<u32>,
    pub asc: bool,
    pub filter_defined: bool,
}

impl GroupingColumn {
    /// Pre-pass over distinct cell values: each distinct rendering becomes
    /// its own group key, ranked by the column's comparator.
    pub fn from_values<F>(path: ColumnPath, len: usize, asc: bool, cell: F) -> Self
    where
        F: Fn(u32) -> Value,
    {
        let mut keys = Vec::with_capacity(len);
        let mut by_rendering: HashMap<String, u32> = HashMap::new();
        // index 0 is the reserved catch-all, unused for value groups
        let mut labels = vec![NO_MATCH_LABEL.to_string()];
        let mut samples: Vec<Value> = vec![Value::Nil];

        for row in 0..len as u32 {
            let value = cell(row);
            let rendering = value.render();
            let key = match by_rendering.get(&rendering) {
                Some(&k) => k,
                None => {
                    let k = labels.len() as u32;
                    by_rendering.insert(rendering.clone(), k);
                    labels.push(rendering);
                    samples.push(value);
                    k
                }
            };
            keys.push(key);
        }

        let order = rank_by_value(&samples);
        GroupingColumn { path, keys, labels, order, asc, filter_defined: false }
    }

    /// Pre-pass over filter-defined buckets: each alternative gets its own
    /// key in declaration order; non-matching rows get the catch-all.
    pub fn from_filter_buckets<F>(
        path: ColumnPath,
        len: usize,
        asc: bool,
        alternative_labels: &[String],
        matches: F,
    ) -> Self
    where
        F: Fn(u32, usize) -> bool,
    {
        let mut labels = vec![NO_MATCH_LABEL.to_string()];
        labels.extend(alternative_labels.iter().cloned());

        let mut keys = Vec::with_capacity(len);
        for row in 0..len as u32 {
            let key = (0..alternative_labels.len())
                .find(|&alt| matches(row, alt))
                .map(|alt| alt as u32 + 1)
                .unwrap_or(NO_MATCH_KEY);
            keys.push(key);
        }

        // alternatives keep declaration order; the catch-all ranks last
        let mut order = vec![u32::MAX];
        order.extend(0..alternative_labels.len() as u32);
        GroupingColumn { path, keys, labels, order, asc, filter_defined: true }
    }

    fn label_of(&self, key: u32) -> String {
        self.labels
            .get(key as usize)
            .cloned()
            .unwrap_or_else(|| NO_MATCH_LABEL.to_string())
    }

    fn rank_of(&self, key: u32) -> u32 {
        self.order.get(key as usize).copied().unwrap_or(u32::MAX)
    }
}

/// Rank the sample value of each group key under the value comparator.
/// Index 0 (the catch-all) always ranks last.
fn rank_by_value(samples: &[Value]) -> Vec<u32> {
    let mut ids: Vec<u32> = (1..samples.len() as u32).collect();
    ids.sort_by(|&a, &b| samples[a as usize].compare(&samples[b as usize]));
    let mut order = vec![u32::MAX; samples.len()];
    for (rank, &id) in ids.iter().enumerate() {
        order[id as usize] = rank as u32;
    }
    order
}

/// A numeric column to sum per group, read through an accessor so base,
/// joined and computed columns all aggregate the same way.
pub struct AggregateSpec<'a> {
    pub colref: String,
    pub value: &'a (dyn Fn(u32) -> Option<f64> + 'a),
}

/// What a level's groups are ordered by.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrderKey {
    /// The grouping column's own value order.
    Value,
    /// Subtree row count.
    Count,
    /// An aggregated sum, by column reference.
    Sum(String),
}

#[derive(Debug, Clone)]
pub struct GroupOrder {
    pub key: GroupOrderKey,
    pub asc: bool,
}

impl Default for GroupOrder {
    fn default() -> Self {
        GroupOrder { key: GroupOrderKey::Value, asc: true }
    }
}

/// A node of the group hierarchy. The root is level 0 with group key 0;
/// its descendants carry the keys of their grouping columns. Leaves hold
/// the row ids of their bucket, inner nodes their ordered children.
#[derive(Debug, Clone)]
pub struct Group {
    pub level: u8,
    pub group_key: u32,
    pub label: String,
    /// `[direct children, grandchildren, ..., total rows]`. A leaf holds
    /// just its row count.
    pub counts: Vec<u32>,
    /// Rolled-up sums by aggregated column reference.
    pub sums: BTreeMap<String, f64>,
    pub children: Vec<Group>,
    /// Leaf only: row ids in input order.
    pub rows: Vec<u32>,
}

impl Group {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn total_rows(&self) -> u32 {
        self.counts.last().copied().unwrap_or(0)
    }

    pub fn sum(&self, colref: &str) -> Option<f64> {
        self.sums.get(colref).copied()
    }
}

#[derive(Debug, Clone)]
pub struct GroupTree {
    pub root: Group,
}

impl GroupTree {
    pub fn total_rows(&self) -> u32 {
        self.root.total_rows()
    }

    /// Groups at the top level, in display order.
    pub fn top_groups(&self) -> &[Group] {
        &self.root.children
    }
}

/// Build the hierarchy for the filtered row set `rows`.
///
/// `orders` gives the per-level ordering (missing levels default to value
/// order with the column's `asc` flag). `limit` clips only the top level;
/// deeper levels stay complete so sums inside a visible parent remain
/// exact.
pub fn build_group_tree(
    rows: &[u32],
    columns: &[GroupingColumn],
    aggregates: &[AggregateSpec<'_>],
    orders: &[GroupOrder],
    limit: usize,
    cancel: Option<&CancelHandle>,
) -> Result<GroupTree, EngineError> {
    if columns.is_empty() {
        return Err(EngineError::Internal("group build without grouping columns".to_string()));
    }

    let children = build_level(rows, 0, columns, aggregates, orders, limit, cancel)?;
    let mut root = Group {
        level: 0,
        group_key: 0,
        label: String::new(),
        counts: Vec::new(),
        sums: BTreeMap::new(),
        children,
        rows: Vec::new(),
    };
    roll_up(&mut root);
    Ok(GroupTree { root })
}

fn build_level(
    rows: &[u32],
    level: usize,
    columns: &[GroupingColumn],
    aggregates: &[AggregateSpec<'_>],
    orders: &[GroupOrder],
    limit: usize,
    cancel: Option<&CancelHandle>,
) -> Result<Vec<Group>, EngineError> {
    let column = &columns[level];
    let is_last = level + 1 == columns.len();

    // partition by group key; BTreeMap keeps iteration deterministic
    let mut buckets: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for &row in rows {
        buckets.entry(column.keys[row as usize]).or_default().push(row);
    }

    let mut groups = Vec::with_capacity(buckets.len());
    for (key, bucket_rows) in buckets {
        if let Some(cancel) = cancel {
            cancel.check()?;
        }
        let mut group = Group {
            level: level as u8 + 1,
            group_key: key,
            label: column.label_of(key),
            counts: Vec::new(),
            sums: BTreeMap::new(),
            children: Vec::new(),
            rows: Vec::new(),
        };
        if is_last {
            for agg in aggregates {
                let total: f64 = bucket_rows.iter().filter_map(|&r| (agg.value)(r)).sum();
                group.sums.insert(agg.colref.clone(), total);
            }
            group.counts = vec![bucket_rows.len() as u32];
            group.rows = bucket_rows;
        } else {
            group.children =
                build_level(&bucket_rows, level + 1, columns, aggregates, orders, 0, cancel)?;
            roll_up(&mut group);
        }
        groups.push(group);
    }

    let default_order = GroupOrder { key: GroupOrderKey::Value, asc: column.asc };
    let order = orders.get(level).unwrap_or(&default_order);
    let comparator = group_comparator(column, order);

    // the catch-all bucket is rendered but never clipped away
    let mut catch_all = None;
    let mut topk = TopK::new(limit, comparator);
    for group in groups {
        if group.group_key == NO_MATCH_KEY && column.filter_defined {
            catch_all = Some(group);
        } else {
            topk.push(group);
        }
    }
    let mut sorted = topk.into_sorted();
    if let Some(group) = catch_all {
        sorted.push(group);
    }
    Ok(sorted)
}

/// Aggregate counts and sums from ordered children into their parent.
fn roll_up(group: &mut Group) {
    let depth = group.children.iter().map(|c| c.counts.len()).max().unwrap_or(0);
    let mut counts = vec![0u32; depth + 1];
    counts[0] = group.children.len() as u32;
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    for child in &group.children {
        for (i, &n) in child.counts.iter().enumerate() {
            counts[i + 1] += n;
        }
        for (colref, &s) in &child.sums {
            *sums.entry(colref.clone()).or_insert(0.0) += s;
        }
    }
    group.counts = counts;
    group.sums = sums;
}

fn group_comparator<'a>(
    column: &'a GroupingColumn,
    order: &'a GroupOrder,
) -> impl Fn(&Group, &Group) -> Ordering + 'a {
    move |a, b| {
        // the catch-all bucket renders last regardless of direction
        match (a.group_key == NO_MATCH_KEY, b.group_key == NO_MATCH_KEY) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        let ord = match &order.key {
            GroupOrderKey::Value => column.rank_of(a.group_key).cmp(&column.rank_of(b.group_key)),
            GroupOrderKey::Count => a.total_rows().cmp(&b.total_rows()),
            GroupOrderKey::Sum(colref) => {
                let x = a.sum(colref).unwrap_or(0.0);
                let y = b.sum(colref).unwrap_or(0.0);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        };
        if order.asc {
            ord
        } else {
            ord.reverse()
        }
    }
}
