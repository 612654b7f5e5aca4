//! Description of the relational table backing [`MetaStore`](crate::MetaStore)
//! implementations that persist to SQL.

use metable_types::IdStrategy;
use serde::{Deserialize, Serialize};

/// One column of the meta table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

/// One secondary index of the meta table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

/// Table layout for metadata records.
///
/// The two indexes serve the resolver's grouping queries: the first the
/// per-owner publish-time scan, the second the per-key maximum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTableSchema {
    pub table: String,
    pub id_strategy: IdStrategy,
    pub publish_column: String,
}

impl Default for MetaTableSchema {
    fn default() -> Self {
        Self {
            table: "meta".into(),
            id_strategy: IdStrategy::Integer,
            publish_column: "published_at".into(),
        }
    }
}

impl MetaTableSchema {
    pub fn new(
        table: impl Into<String>,
        id_strategy: IdStrategy,
        publish_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            id_strategy,
            publish_column: publish_column.into(),
        }
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        let id_type = self.id_strategy.column_type();
        let column = |name: &str, sql_type: &str, nullable: bool| ColumnDef {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable,
        };
        let primary = match self.id_strategy {
            IdStrategy::Integer => "BIGINT PRIMARY KEY AUTOINCREMENT".to_string(),
            _ => format!("{id_type} PRIMARY KEY"),
        };
        vec![
            column("id", &primary, false),
            column("owner_type", "VARCHAR(255)", false),
            column("owner_id", id_type, false),
            column("key", "VARCHAR(255)", false),
            column("value", "LONGTEXT", true),
            column("type", "VARCHAR(255)", true),
            column(&self.publish_column, "TIMESTAMP WITH TIME ZONE", true),
            column("created_at", "TIMESTAMP", true),
            column("updated_at", "TIMESTAMP", true),
        ]
    }

    pub fn indexes(&self) -> Vec<IndexDef> {
        let base = ["owner_id", "owner_type"];
        let owner_published: Vec<String> = base
            .iter()
            .map(|c| c.to_string())
            .chain([self.publish_column.clone()])
            .collect();
        let owner_key_published: Vec<String> = base
            .iter()
            .map(|c| c.to_string())
            .chain(["key".to_string(), self.publish_column.clone()])
            .collect();
        vec![
            IndexDef {
                name: format!("{}_owner_published_index", self.table),
                columns: owner_published,
            },
            IndexDef {
                name: format!("{}_owner_key_published_index", self.table),
                columns: owner_key_published,
            },
        ]
    }

    /// `CREATE TABLE` followed by the `CREATE INDEX` statements.
    pub fn create_statements(&self) -> Vec<String> {
        let columns = self
            .columns()
            .iter()
            .map(|c| {
                let null = if c.nullable { "NULL" } else { "NOT NULL" };
                format!("    \"{}\" {} {null}", c.name, c.sql_type)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n{columns}\n)",
            self.table
        )];
        for index in self.indexes() {
            let cols = index
                .columns
                .iter()
                .map(|c| format!("\"{c}\""))
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({cols})",
                index.name, self.table
            ));
        }
        statements
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\"", self.table)
    }
}
