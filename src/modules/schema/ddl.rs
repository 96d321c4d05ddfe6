/// DDL generation from a parsed schema.
///
/// Every identifier that reaches this module has passed
/// `Validator::validate_identifier`, so plain interpolation is safe here.
use super::table::{SchemaSet, TableSchema, EXTRA_COLUMN};

/// Build `CREATE TABLE` statements for every table in the schema, join
/// tables included. Statements are ordered tables-first so join tables can
/// reference them; `IF NOT EXISTS` keeps re-provisioning idempotent.
pub fn build_ddl(schema: &SchemaSet) -> Vec<String> {
    let mut statements = Vec::new();
    for table in &schema.tables {
        statements.push(table_ddl(table));
    }
    for table in &schema.tables {
        for many in table.many_on.values() {
            statements.push(join_table_ddl(table, &many.references, &many.references_on));
        }
    }
    statements
}

/// Name of the join table backing a many-to-many reference.
pub fn join_table_name(table: &str, referenced: &str) -> String {
    format!("{}_{}", table, referenced)
}

fn table_ddl(table: &TableSchema) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(table.columns.len() + 4);

    for (name, spec) in &table.columns {
        let mut column = format!("{} {}", name, spec.column_type.sql_type());
        if spec.pk {
            column.push_str(" PRIMARY KEY");
        }
        parts.push(column);
    }
    parts.push(format!("{} TEXT", EXTRA_COLUMN));

    for (column, reference) in &table.references {
        parts.push(format!(
            "CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE SET NULL",
            table.name, column, column, reference.references, reference.references_on
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        parts.join(", ")
    )
}

fn join_table_ddl(table: &TableSchema, referenced: &str, referenced_on: &str) -> String {
    let name = join_table_name(&table.name, referenced);
    let left = format!("{}_id", table.name);
    let right = format!("{}_id", referenced);

    let mut parts = vec![
        format!("{} TEXT", left),
        format!("{} TEXT", right),
        format!("{} TEXT", EXTRA_COLUMN),
        format!(
            "CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE SET NULL",
            name, right, right, referenced, referenced_on
        ),
    ];
    // The owning side can only carry a foreign key when the table declares a
    // primary key to point at.
    if let Some(pk) = table.primary_key() {
        parts.push(format!(
            "CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE SET NULL",
            name, left, left, table.name, pk
        ));
    }

    format!("CREATE TABLE IF NOT EXISTS {} ({})", name, parts.join(", "))
}
