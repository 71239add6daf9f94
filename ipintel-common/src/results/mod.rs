//! Result table: canonical list, filters, selection, deletes and export

pub mod csv;
pub mod filter;
pub mod optimistic;
pub mod selection;
pub mod table;

pub use csv::{to_csv, CSV_HEADER};
pub use filter::{Column, ColumnFilters};
pub use optimistic::optimistic_remove;
pub use selection::{SelectAllState, Selection};
pub use table::ResultTable;
