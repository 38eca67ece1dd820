//! Filter engine: compiles per-column filter expressions into row masks.
//!
//! Each filter body may contain several alternatives separated by `;;`.
//! A row passes a filter when any alternative is truthy; all filters AND
//! together into the final mask. On a grouped column, two or more
//! alternatives switch the filter from masking to bucket definition (see
//! the grouping pre-pass), so the view layer decides which filters feed
//! the mask.
//!
//! Masks are cached per table view, keyed by the canonical filter set and
//! the view version.

use bitvec::prelude::*;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::expr::{ColumnGetter, CompiledExpr, ExpressionCache, ExprError};

/// Separator between filter alternatives.
pub const GROUP_SEPARATOR: &str = ";;";

/// Row evaluation switches to rayon above this many rows.
const PARALLEL_THRESHOLD: usize = 1 << 16;

/// A packed bitset over the table's rows plus its population count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMask {
    bits: BitVec,
    ones: usize,
}

impl RowMask {
    /// The identity mask: every row passes.
    pub fn all(len: usize) -> Self {
        RowMask { bits: bitvec![1; len], ones: len }
    }

    pub fn from_bools(bools: &[bool]) -> Self {
        let mut bits = BitVec::with_capacity(bools.len());
        let mut ones = 0;
        for &b in bools {
            bits.push(b);
            ones += usize::from(b);
        }
        RowMask { bits, ones }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of rows that pass.
    pub fn ones(&self) -> usize {
        self.ones
    }

    pub fn get(&self, row: usize) -> bool {
        self.bits[row]
    }

    pub fn and_assign(&mut self, other: &RowMask) {
        self.bits &= other.bits.as_bitslice();
        self.ones = self.bits.count_ones();
    }

    /// Passing row ids in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter_ones().map(|i| i as u32)
    }
}

/// One compiled filter: the column it belongs to, the exact source text,
/// and the compiled alternatives.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub column: String,
    pub source: String,
    pub alternatives: Vec<Arc<CompiledExpr>>,
}

impl CompiledFilter {
    /// Compile a filter body, splitting alternatives on the group
    /// separator. Compilation goes through the shared expression cache.
    pub fn compile(
        column: &str,
        source: &str,
        cache: &ExpressionCache,
    ) -> Result<CompiledFilter, ExprError> {
        let mut alternatives = Vec::new();
        for part in source.split(GROUP_SEPARATOR) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            alternatives.push(cache.compile(part)?);
        }
        Ok(CompiledFilter {
            column: column.to_string(),
            source: source.to_string(),
            alternatives,
        })
    }

    /// Bucket-defining filters have at least two alternatives.
    pub fn defines_buckets(&self) -> bool {
        self.alternatives.len() >= 2
    }

    /// True when any alternative is truthy at the row. Evaluation errors
    /// exclude the row.
    pub fn matches(&self, getter: &dyn ColumnGetter, row: usize) -> bool {
        self.alternatives
            .iter()
            .any(|alt| alt.eval(getter, row).map(|v| v.truthy()).unwrap_or(false))
    }
}

/// Evaluate the filters over all rows and AND the results into one mask.
///
/// Large tables evaluate in parallel; chunk results are concatenated in row
/// order, so the mask is identical either way.
pub fn build_mask<G>(filters: &[CompiledFilter], len: usize, getter: &G) -> RowMask
where
    G: ColumnGetter + Sync,
{
    if filters.is_empty() {
        return RowMask::all(len);
    }

    let row_passes = |row: usize| filters.iter().all(|f| f.matches(getter, row));

    let bools: Vec<bool> = if len >= PARALLEL_THRESHOLD {
        (0..len).into_par_iter().map(row_passes).collect()
    } else {
        (0..len).map(row_passes).collect()
    };
    RowMask::from_bools(&bools)
}

/// Signature of a filter set: the canonical sort of `(column, source)`
/// pairs hashed together with the view version.
pub fn mask_signature(filters: &[CompiledFilter], version: u64) -> u64 {
    let mut pairs: Vec<(&str, &str)> = filters
        .iter()
        .map(|f| (f.column.as_str(), f.source.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut hasher = DefaultHasher::new();
    for (column, source) in pairs {
        column.hash(&mut hasher);
        source.hash(&mut hasher);
    }
    hasher.finish() ^ version
}

/// Single-entry mask cache owned by one table view. The current request
/// holds the view exclusively, so the cache is single-writer by
/// construction.
#[derive(Debug, Default)]
pub struct FilterMaskCache {
    signature: Option<u64>,
    mask: Option<Arc<RowMask>>,
}

impl FilterMaskCache {
    pub fn new() -> Self {
        FilterMaskCache::default()
    }

    pub fn get(&self, signature: u64) -> Option<Arc<RowMask>> {
        match (self.signature, &self.mask) {
            (Some(stored), Some(mask)) if stored == signature => Some(Arc::clone(mask)),
            _ => None,
        }
    }

    pub fn store(&mut self, signature: u64, mask: Arc<RowMask>) {
        self.signature = Some(signature);
        self.mask = Some(mask);
    }

    pub fn invalidate(&mut self) {
        self.signature = None;
        self.mask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalError;
    use crate::value::Value;

    struct Amounts(Vec<f64>);

    impl ColumnGetter for Amounts {
        fn get(&self, name: &str, row: usize) -> Result<Value, EvalError> {
            match name {
                "amount" => Ok(Value::Float(self.0[row])),
                other => Err(EvalError::UnknownColumn(other.to_string())),
            }
        }
    }

    #[test]
    fn test_mask_basics() {
        let mask = RowMask::from_bools(&[true, false, true, true]);
        assert_eq!(mask.len(), 4);
        assert_eq!(mask.ones(), 3);
        assert_eq!(mask.iter_ones().collect::<Vec<_>>(), vec![0, 2, 3]);

        let mut a = RowMask::from_bools(&[true, true, false, true]);
        a.and_assign(&mask);
        assert_eq!(a.ones(), 2);
        assert!(a.get(0) && !a.get(1) && !a.get(2) && a.get(3));
    }

    #[test]
    fn test_build_mask_ands_filters() {
        let cache = ExpressionCache::new();
        let getter = Amounts(vec![10.0, 150.0, 300.0, 80.0]);
        let filters = vec![
            CompiledFilter::compile("amount", "amount > 50", &cache).unwrap(),
            CompiledFilter::compile("amount", "amount < 200", &cache).unwrap(),
        ];
        let mask = build_mask(&filters, 4, &getter);
        assert_eq!(mask.iter_ones().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_no_filters_is_identity() {
        let getter = Amounts(vec![1.0]);
        let mask = build_mask(&[], 3, &getter);
        assert_eq!(mask.ones(), 3);
    }

    #[test]
    fn test_alternatives_or_together() {
        let cache = ExpressionCache::new();
        let getter = Amounts(vec![10.0, 150.0, 300.0]);
        let filter =
            CompiledFilter::compile("amount", "amount < 50 ;; amount > 200", &cache).unwrap();
        assert!(filter.defines_buckets());
        let mask = build_mask(&[filter], 3, &getter);
        assert_eq!(mask.iter_ones().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_eval_error_excludes_row() {
        let cache = ExpressionCache::new();
        let getter = Amounts(vec![10.0]);
        let filter = CompiledFilter::compile("x", "missing > 1", &cache).unwrap();
        let mask = build_mask(&[filter], 1, &getter);
        assert_eq!(mask.ones(), 0);
    }

    #[test]
    fn test_signature_ignores_filter_order() {
        let cache = ExpressionCache::new();
        let a = CompiledFilter::compile("x", "x > 1", &cache).unwrap();
        let b = CompiledFilter::compile("y", "y < 2", &cache).unwrap();
        let fwd = mask_signature(&[a.clone(), b.clone()], 7);
        let rev = mask_signature(&[b, a], 7);
        assert_eq!(fwd, rev);
    }

    #[test]
    fn test_signature_changes_with_version() {
        let cache = ExpressionCache::new();
        let f = CompiledFilter::compile("x", "x > 1", &cache).unwrap();
        assert_ne!(mask_signature(&[f.clone()], 1), mask_signature(&[f], 2));
    }

    #[test]
    fn test_cache_hit_and_invalidate() {
        let mut cache = FilterMaskCache::new();
        let mask = Arc::new(RowMask::all(4));
        cache.store(42, Arc::clone(&mask));
        assert!(cache.get(42).is_some());
        assert!(cache.get(43).is_none());
        cache.invalidate();
        assert!(cache.get(42).is_none());
    }
}
