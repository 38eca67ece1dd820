//! URL query codec: the URL is the single source of truth for a view.
//!
//! Parsing is strict about names (letters, digits, `_`, `-`, and `.` for
//! joined references) and permissive about expression bodies. Unknown
//! parameters are preserved in order so toggle URLs emitted by the server
//! never lose UI state.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::join::ColumnPath;

pub const DEFAULT_LIMIT: usize = 100;

/// Malformed URL; surfaces to the client as a 400 with the reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("missing required parameter: table")]
    MissingTable,
    #[error("invalid column reference: {0:?}")]
    InvalidColumn(String),
    #[error("invalid limit: {0:?}")]
    InvalidLimit(String),
    #[error("invalid computed column name: {0:?}")]
    InvalidComputedName(String),
}

/// One sort key: a column reference and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortEntry {
    pub column: String,
    pub descending: bool,
}

/// The declarative view state decoded from a URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<ColumnPath>,
    /// Filter source per column reference.
    pub filters: BTreeMap<String, String>,
    pub grouped_columns: Vec<ColumnPath>,
    pub sort_order: Vec<SortEntry>,
    /// Computed columns in declaration order; later ones may reference
    /// earlier ones.
    pub computed: Vec<(String, String)>,
    /// UI expansion paths, kept server-side for toggle URLs.
    pub expanded: Vec<String>,
    pub limit: usize,
    pub user: String,
    pub selected_row: Option<String>,
    pub info_pane: Option<String>,
    pub animated: Option<String>,
    /// Unknown parameters, preserved verbatim on round-trip.
    pub extra: Vec<(String, String)>,
}

fn is_valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn parse_column_list(raw: &str) -> Result<Vec<ColumnPath>, QueryError> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !is_valid_name(part) {
            return Err(QueryError::InvalidColumn(part.to_string()));
        }
        let path =
            ColumnPath::parse(part).map_err(|_| QueryError::InvalidColumn(part.to_string()))?;
        out.push(path);
    }
    Ok(out)
}

impl Query {
    /// Decode a raw query string (the part after `?`).
    pub fn parse(query_string: &str) -> Result<Query, QueryError> {
        let mut query = Query { limit: DEFAULT_LIMIT, ..Query::default() };
        let mut saw_table = false;

        for (key, value) in form_urlencoded::parse(query_string.as_bytes()) {
            let key = key.into_owned();
            let value = value.into_owned();
            match key.as_str() {
                "table" => {
                    saw_table = true;
                    query.table = value;
                }
                "columns" => query.columns = parse_column_list(&value)?,
                "group" => query.grouped_columns = parse_column_list(&value)?,
                "sort" => {
                    for part in value.split(',') {
                        let part = part.trim();
                        if part.is_empty() {
                            continue;
                        }
                        let (column, descending) = match part.strip_prefix('-') {
                            Some(rest) => (rest, true),
                            None => (part, false),
                        };
                        if !is_valid_name(column) {
                            return Err(QueryError::InvalidColumn(column.to_string()));
                        }
                        query
                            .sort_order
                            .push(SortEntry { column: column.to_string(), descending });
                    }
                }
                "expanded" => {
                    query.expanded = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "limit" => {
                    query.limit = value
                        .parse()
                        .map_err(|_| QueryError::InvalidLimit(value.clone()))?;
                }
                "user" => query.user = value,
                "row" => query.selected_row = Some(value),
                "pane" => query.info_pane = Some(value),
                "animated" => query.animated = Some(value),
                _ => {
                    if let Some(column) = key.strip_prefix("filter:") {
                        if !is_valid_name(column) {
                            return Err(QueryError::InvalidColumn(column.to_string()));
                        }
                        query.filters.insert(column.to_string(), value);
                    } else if let Some(name) = key.strip_prefix("compute:") {
                        if !is_valid_name(name) || name.contains('.') {
                            return Err(QueryError::InvalidComputedName(name.to_string()));
                        }
                        query.computed.push((name.to_string(), value));
                    } else {
                        query.extra.push((key, value));
                    }
                }
            }
        }

        if !saw_table || query.table.is_empty() {
            return Err(QueryError::MissingTable);
        }
        Ok(query)
    }

    /// Encode back into a canonical query string. Parsing the result gives
    /// an equal `Query`.
    pub fn to_query_string(&self) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        ser.append_pair("table", &self.table);

        if !self.columns.is_empty() {
            let list: Vec<String> = self.columns.iter().map(ColumnPath::canonical).collect();
            ser.append_pair("columns", &list.join(","));
        }
        for (column, source) in &self.filters {
            ser.append_pair(&format!("filter:{column}"), source);
        }
        if !self.grouped_columns.is_empty() {
            let list: Vec<String> = self.grouped_columns.iter().map(ColumnPath::canonical).collect();
            ser.append_pair("group", &list.join(","));
        }
        if !self.sort_order.is_empty() {
            let list: Vec<String> = self
                .sort_order
                .iter()
                .map(|entry| {
                    if entry.descending {
                        format!("-{}", entry.column)
                    } else {
                        entry.column.clone()
                    }
                })
                .collect();
            ser.append_pair("sort", &list.join(","));
        }
        for (name, source) in &self.computed {
            ser.append_pair(&format!("compute:{name}"), source);
        }
        if !self.expanded.is_empty() {
            ser.append_pair("expanded", &self.expanded.join(","));
        }
        if self.limit != DEFAULT_LIMIT {
            ser.append_pair("limit", &self.limit.to_string());
        }
        if !self.user.is_empty() {
            ser.append_pair("user", &self.user);
        }
        if let Some(row) = &self.selected_row {
            ser.append_pair("row", row);
        }
        if let Some(pane) = &self.info_pane {
            ser.append_pair("pane", pane);
        }
        if let Some(animated) = &self.animated {
            ser.append_pair("animated", animated);
        }
        for (key, value) in &self.extra {
            ser.append_pair(key, value);
        }
        ser.finish()
    }

    /// Cache key selecting the per-user table view.
    pub fn view_key(&self) -> (String, String) {
        (self.user.clone(), self.table.clone())
    }

    pub fn is_grouped(&self) -> bool {
        !self.grouped_columns.is_empty()
    }

    /// Sort direction for a column reference, if the view sorts by it.
    pub fn sort_for(&self, colref: &str) -> Option<&SortEntry> {
        self.sort_order.iter().find(|e| e.column == colref)
    }

    /// Toggle URL helper: flip a sidebar path between expanded and
    /// collapsed.
    pub fn with_expanded_toggled(&self, path: &str) -> Query {
        let mut next = self.clone();
        match next.expanded.iter().position(|p| p == path) {
            Some(i) => {
                next.expanded.remove(i);
            }
            None => next.expanded.push(path.to_string()),
        }
        next
    }

    /// Toggle URL helper: add or remove a displayed column.
    pub fn with_column_toggled(&self, path: &ColumnPath) -> Query {
        let mut next = self.clone();
        match next.columns.iter().position(|p| p == path) {
            Some(i) => {
                next.columns.remove(i);
            }
            None => next.columns.push(path.clone()),
        }
        next
    }

    /// Toggle URL helper: add or remove a grouping column.
    pub fn with_group_toggled(&self, path: &ColumnPath) -> Query {
        let mut next = self.clone();
        match next.grouped_columns.iter().position(|p| p == path) {
            Some(i) => {
                next.grouped_columns.remove(i);
            }
            None => next.grouped_columns.push(path.clone()),
        }
        next
    }

    /// Toggle URL helper: cycle a column's sort through
    /// ascending, descending, off.
    pub fn with_sort_cycled(&self, colref: &str) -> Query {
        let mut next = self.clone();
        match next.sort_order.iter().position(|e| e.column == colref) {
            Some(i) if !next.sort_order[i].descending => next.sort_order[i].descending = true,
            Some(i) => {
                next.sort_order.remove(i);
            }
            None => next
                .sort_order
                .push(SortEntry { column: colref.to_string(), descending: false }),
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_table_is_an_error() {
        assert_eq!(Query::parse("columns=a,b"), Err(QueryError::MissingTable));
        assert_eq!(Query::parse(""), Err(QueryError::MissingTable));
    }

    #[test]
    fn test_parse_full_query() {
        let q = Query::parse(
            "table=orders&columns=status,region,amount&filter:status=status%3D%3D%22Delivered%22\
             &group=status,region&sort=-amount,status&compute:tax=amount+*+0.1&limit=5&user=ada",
        )
        .unwrap();
        assert_eq!(q.table, "orders");
        assert_eq!(q.columns.len(), 3);
        assert_eq!(q.filters.get("status").map(String::as_str), Some("status==\"Delivered\""));
        assert_eq!(q.grouped_columns.len(), 2);
        assert_eq!(
            q.sort_order,
            vec![
                SortEntry { column: "amount".into(), descending: true },
                SortEntry { column: "status".into(), descending: false },
            ]
        );
        assert_eq!(q.computed, vec![("tax".to_string(), "amount * 0.1".to_string())]);
        assert_eq!(q.limit, 5);
        assert_eq!(q.user, "ada");
    }

    #[test]
    fn test_joined_column_refs() {
        let q = Query::parse("table=orders&columns=region,region.regions.region.population").unwrap();
        assert_eq!(q.columns[1].canonical(), "region.regions.region.population");
        assert!(Query::parse("table=orders&columns=a.b").is_err());
    }

    #[test]
    fn test_strict_names_permissive_expressions() {
        assert!(Query::parse("table=t&columns=bad%20name").is_err());
        assert!(Query::parse("table=t&sort=sp%20ace").is_err());
        // expression bodies can contain anything
        let q = Query::parse("table=t&filter:x=x%20%3E%3D%201%20and%20x%20!%3D%203").unwrap();
        assert_eq!(q.filters.get("x").map(String::as_str), Some("x >= 1 and x != 3"));
    }

    #[test]
    fn test_default_limit() {
        let q = Query::parse("table=t").unwrap();
        assert_eq!(q.limit, DEFAULT_LIMIT);
        assert!(Query::parse("table=t&limit=abc").is_err());
    }

    #[test]
    fn test_roundtrip_preserves_unknown_params() {
        let raw = "table=orders&columns=status,amount&filter:status=status%3D%3D%22x%22\
                   &limit=7&theme=dark&debug=1";
        let q = Query::parse(raw).unwrap();
        assert_eq!(q.extra, vec![
            ("theme".to_string(), "dark".to_string()),
            ("debug".to_string(), "1".to_string()),
        ]);
        let reparsed = Query::parse(&q.to_query_string()).unwrap();
        assert_eq!(q, reparsed);
    }

    #[test]
    fn test_roundtrip_canonical() {
        let raw = "table=orders&columns=status,region&group=status&sort=-amount\
                   &compute:tax=amount%20*%200.1&expanded=region.regions&user=ada&row=3&pane=info";
        let q = Query::parse(raw).unwrap();
        let reparsed = Query::parse(&q.to_query_string()).unwrap();
        assert_eq!(q, reparsed);
    }

    #[test]
    fn test_expanded_toggle() {
        let q = Query::parse("table=t").unwrap();
        let opened = q.with_expanded_toggled("region.regions");
        assert_eq!(opened.expanded, vec!["region.regions".to_string()]);
        let closed = opened.with_expanded_toggled("region.regions");
        assert!(closed.expanded.is_empty());
    }

    #[test]
    fn test_sort_cycle() {
        let q = Query::parse("table=t").unwrap();
        let asc = q.with_sort_cycled("amount");
        assert_eq!(asc.sort_order[0], SortEntry { column: "amount".into(), descending: false });
        let desc = asc.with_sort_cycled("amount");
        assert!(desc.sort_order[0].descending);
        let off = desc.with_sort_cycled("amount");
        assert!(off.sort_order.is_empty());
    }

    #[test]
    fn test_group_toggle() {
        let q = Query::parse("table=t&group=status").unwrap();
        let path = ColumnPath::Base("status".to_string());
        assert!(q.with_group_toggled(&path).grouped_columns.is_empty());
        let other = ColumnPath::Base("region".to_string());
        assert_eq!(q.with_group_toggled(&other).grouped_columns.len(), 2);
    }
}
