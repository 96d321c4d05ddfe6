pub mod ddl;
pub mod mapper;
pub mod table;

pub use ddl::{build_ddl, join_table_name};
pub use mapper::{MappedRow, RowMapper, TableLayout};
pub use table::{ColumnSpec, ColumnType, SchemaSet, SqlValue, TableSchema, EXTRA_COLUMN};
