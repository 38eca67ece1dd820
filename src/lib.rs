//! # Taxinomia
//!
//! An interactive, table-oriented analytics engine. A user explores a
//! tabular dataset by composing a view over it (columns, filters,
//! grouping, sorting, joins, computed columns); the entire view state is
//! encoded in the URL and re-executed deterministically on every request.
//!
//! ## Pipeline
//!
//! ```text
//! URL
//!   ↓
//! [Query codec]        → Query (the declarative view state)
//!   ↓
//! [TableView cache]    → per-(user, table) materialized view
//!   ↓
//! [Join reconcile]     → joined columns added/removed
//!   ↓
//! [Computed reconcile] → expressions compiled, typed, or degraded
//!   ↓
//! [Filter engine]      → cached row mask
//!   ↓
//! [Grouping] or [Top-K sort]
//!   ↓
//! [View model builder] → headers, rows, rowspans, sidebar, timings
//!   ↓
//! Renderer (external)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use taxinomia::{demo, pipeline::Engine, query::Query};
//!
//! let engine = Engine::new(demo::demo_model().unwrap());
//! let query = Query::parse("table=orders&columns=status,region,amount&limit=5").unwrap();
//! let model = engine.handle(&query, 0, None).unwrap();
//! assert_eq!(model.displayed_rows, 5);
//! ```
//!
//! The data model is immutable after startup and shared read-only across
//! request threads; per-user table views serialize on their entry lock.
//! Rendering a view is a pure function of (data model, URL).

pub mod cancel;
pub mod column;
pub mod config;
pub mod demo;
pub mod error;
pub mod expr;
pub mod filter;
pub mod group;
pub mod ingest;
pub mod join;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod render;
pub mod server;
pub mod sort;
pub mod table;
pub mod value;
pub mod view;
pub mod viewmodel;

pub use cancel::CancelHandle;
pub use column::{BaseColumn, ColumnBuilder, ColumnDef, PhysicalType};
pub use config::Config;
pub use error::{EngineError, ValidationError, ValidationResult};
pub use expr::{compile, CompiledExpr, ExpressionCache};
pub use join::{ColumnPath, Join, JoinedColumn};
pub use model::DataModel;
pub use pipeline::Engine;
pub use query::Query;
pub use table::Table;
pub use value::Value;
pub use view::TableView;
pub use viewmodel::TableViewModel;
