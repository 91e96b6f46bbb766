//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::{Dialect, FieldType};

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // PostgreSQL uses double quotes for identifier quoting
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// NAMEDATALEN - 1; longer names are silently truncated by the server.
    fn max_identifier_length(&self) -> usize {
        63
    }

    fn supports_create_if_not_exists(&self) -> bool {
        true
    }

    fn column_type(&self, field_type: FieldType) -> String {
        match field_type {
            FieldType::Int8 | FieldType::Int16 => "smallint",
            FieldType::Int32 => "integer",
            FieldType::Int64 => "bigint",
            FieldType::Float32 => "real",
            FieldType::Float64 => "double precision",
            FieldType::Boolean => "boolean",
            FieldType::String => "text",
            // Bytes arrive base64-encoded in JSON payloads
            FieldType::Bytes => "text",
            FieldType::Array | FieldType::Map | FieldType::Struct => "jsonb",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Binder, TypeMode};
    use crate::core::{SqlValue, Statement, TableId};

    fn orders() -> TableId {
        TableId::parse("APP.ORDERS").unwrap()
    }

    #[test]
    fn test_quote_ident() {
        let d = PostgresDialect::new();
        assert_eq!(d.quote_ident("ORDERS"), "\"ORDERS\"");
        assert_eq!(d.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(d.qualify(&orders()), "\"APP\".\"ORDERS\"");
    }

    #[test]
    fn test_render_create_table() {
        let sql = PostgresDialect
            .render(&Statement::CreateTable {
                table: orders(),
                identity_column: "ROW_ID".into(),
            })
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"APP\".\"ORDERS\" (\"ROW_ID\" INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY)"
        );
    }

    #[test]
    fn test_render_add_column() {
        let sql = PostgresDialect
            .render(&Statement::AddColumn {
                table: orders(),
                column: "AMOUNT".into(),
                sql_type: "VARCHAR(255)".into(),
            })
            .unwrap();
        assert_eq!(sql, "ALTER TABLE \"APP\".\"ORDERS\" ADD \"AMOUNT\" VARCHAR(255)");
    }

    #[test]
    fn test_render_insert_escapes_values() {
        let sql = PostgresDialect
            .render(&Statement::Insert {
                table: orders(),
                columns: vec!["ID".into(), "NOTE".into()],
                values: vec![SqlValue::from("1"), SqlValue::from("'); DROP TABLE x;--")],
            })
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"APP\".\"ORDERS\" (\"ID\", \"NOTE\") VALUES ('1', '''); DROP TABLE x;--')"
        );
    }

    #[test]
    fn test_identifiers_longer_than_63_bytes_are_rejected() {
        let add = |column: String| Statement::AddColumn {
            table: orders(),
            column,
            sql_type: "VARCHAR(255)".into(),
        };
        assert!(PostgresDialect.render(&add("C".repeat(63))).is_ok());

        let err = PostgresDialect.render(&add("C".repeat(64))).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("63 bytes"));

        let long_table = TableId::new("APP", "T".repeat(64)).unwrap();
        let create = Statement::CreateTable {
            table: long_table,
            identity_column: "ROW_ID".into(),
        };
        assert!(PostgresDialect.render(&create).is_err());
    }

    #[test]
    fn test_column_types_by_mode() {
        let d = PostgresDialect;
        let compat = Binder::default();
        let typed = Binder::new(TypeMode::Typed, 255);
        assert_eq!(compat.column_type(&d, FieldType::Int64), "VARCHAR(255)");
        assert_eq!(typed.column_type(&d, FieldType::Int64), "bigint");
        assert_eq!(typed.column_type(&d, FieldType::Struct), "jsonb");
    }
}
