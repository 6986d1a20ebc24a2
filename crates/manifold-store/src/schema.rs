use rusqlite::{Connection, OptionalExtension};

use crate::backend::{CollectionSchema, DataType};
use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 1;

/// Columns every pattern collection must declare. Records are read and
/// written through these names.
pub const REQUIRED_FIELDS: [&str; 5] = ["id", "pattern_vector", "pattern_type", "symbol", "timestamp"];

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Registry of collections created through the store contract. `loaded`
    // state is process-local and lives in the backend, not here.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collections (
            name          TEXT PRIMARY KEY,
            dim           INTEGER NOT NULL,
            schema_json   TEXT NOT NULL,
            metric        TEXT,
            index_field   TEXT,
            index_params  TEXT
        );
        ",
    )?;

    if let Some(found) = get_schema_version(conn)? {
        if found > SCHEMA_VERSION {
            return Err(StoreError::InvalidData(format!(
                "database schema version {found} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
    }
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Version recorded in `metadata`, `None` for a database never initialized.
pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| StoreError::InvalidData(format!("unreadable schema version '{v}'")))
        })
        .transpose()
}

/// Collection names are interpolated into DDL, so only identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidData(format!(
            "invalid collection name '{name}'"
        )))
    }
}

/// Build the CREATE TABLE statement for a collection schema.
pub fn collection_ddl(schema: &CollectionSchema) -> Result<String> {
    validate_identifier(&schema.name)?;
    for required in REQUIRED_FIELDS {
        if schema.field(required).is_none() {
            return Err(StoreError::InvalidData(format!(
                "collection schema '{}' lacks field '{required}'",
                schema.name
            )));
        }
    }

    let mut columns = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        validate_identifier(&field.name)?;
        let column = match field.data_type {
            DataType::Int64 if field.primary_key && field.auto_id => {
                format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", field.name)
            }
            DataType::Int64 if field.primary_key => format!("{} INTEGER PRIMARY KEY", field.name),
            DataType::Int64 => format!("{} INTEGER NOT NULL", field.name),
            DataType::FloatVector => format!("{} BLOB NOT NULL", field.name),
            DataType::VarChar => match field.max_length {
                Some(max) => format!(
                    "{name} TEXT NOT NULL CHECK (length({name}) <= {max})",
                    name = field.name
                ),
                None => format!("{} TEXT NOT NULL", field.name),
            },
        };
        columns.push(column);
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        schema.name,
        columns.join(",\n    ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FieldSchema;

    fn schema(name: &str) -> CollectionSchema {
        CollectionSchema {
            name: name.to_string(),
            fields: vec![
                FieldSchema::primary("id", "ID field"),
                FieldSchema::float_vector("pattern_vector", "vector", 4),
                FieldSchema::varchar("pattern_type", "type", 32),
                FieldSchema::varchar("symbol", "symbol", 8),
                FieldSchema::int64("timestamp", "creation time"),
            ],
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for table in &["metadata", "collections"] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert!(count >= 0, "table {table} should exist");
        }
    }

    #[test]
    fn test_schema_version_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_newer_schema_version_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
            [(SCHEMA_VERSION + 1).to_string()],
        )
        .unwrap();
        assert!(matches!(initialize(&conn), Err(StoreError::InvalidData(_))));
    }

    #[test]
    fn test_unreadable_schema_version_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "UPDATE metadata SET value = 'one' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();
        assert!(matches!(
            get_schema_version(&conn),
            Err(StoreError::InvalidData(_))
        ));
    }

    #[test]
    fn test_idempotent_initialize() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn test_busy_timeout_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000, "busy_timeout should be 5000ms");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("quantum_patterns").is_ok());
        assert!(validate_identifier("_p2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("drop table;").is_err());
    }

    #[test]
    fn test_ddl_enforces_symbol_length() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&collection_ddl(&schema("p")).unwrap())
            .unwrap();

        let ok = conn.execute(
            "INSERT INTO p (pattern_vector, pattern_type, symbol, timestamp) VALUES (x'00', 'quantum', '⦿', 1)",
            [],
        );
        assert!(ok.is_ok());

        let too_long = conn.execute(
            "INSERT INTO p (pattern_vector, pattern_type, symbol, timestamp) VALUES (x'00', 'quantum', '123456789', 1)",
            [],
        );
        assert!(too_long.is_err(), "symbol longer than 8 must be rejected");
    }

    #[test]
    fn test_ddl_requires_pattern_fields() {
        let mut s = schema("p");
        s.fields.retain(|f| f.name != "symbol");
        assert!(matches!(collection_ddl(&s), Err(StoreError::InvalidData(_))));
    }
}
