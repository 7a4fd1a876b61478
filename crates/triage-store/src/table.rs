//! Table layout derived from the feature schema
//!
//! One typed column per declared field, in schema order, followed by the
//! store-owned columns. Field names are validated identifiers, so they are
//! interpolated into SQL directly.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row};

use triage_core::{
    Confidence, Error, FeatureSchema, FeatureValue, FeatureVector, Features, FieldKind, Result,
    TriageLevel, TriageRecord,
};

use crate::to_store_err;

/// Default table name
pub const DEFAULT_TABLE: &str = "patient_records";

/// Column layout for one feature schema
#[derive(Debug, Clone)]
pub struct TableLayout {
    table: String,
    schema: Arc<FeatureSchema>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Categorical => "TEXT",
        FieldKind::Integer | FieldKind::Boolean => "INTEGER",
        FieldKind::Float => "REAL",
    }
}

impl TableLayout {
    pub fn new(table: impl Into<String>, schema: Arc<FeatureSchema>) -> Result<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(Error::config(format!("invalid table name '{table}'")));
        }
        Ok(Self { table, schema })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Expected `(column, declared type)` pairs in table order
    pub fn expected_columns(&self) -> Vec<(String, &'static str)> {
        let mut columns = vec![("id".to_string(), "INTEGER")];
        columns.extend(
            self.schema
                .fields()
                .iter()
                .map(|f| (f.name.clone(), column_type(f.kind))),
        );
        columns.push(("triage_level".to_string(), "INTEGER"));
        columns.push(("confidence_not_urgent".to_string(), "REAL"));
        columns.push(("confidence_urgent".to_string(), "REAL"));
        columns.push(("created_at".to_string(), "TEXT"));
        columns
    }

    pub fn create_sql(&self) -> String {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for field in self.schema.fields() {
            let check = match field.kind {
                FieldKind::Boolean => format!(" CHECK ({} IN (0, 1))", field.name),
                _ => String::new(),
            };
            columns.push(format!(
                "{} {} NOT NULL{}",
                field.name,
                column_type(field.kind),
                check
            ));
        }
        columns.push("triage_level INTEGER NOT NULL CHECK (triage_level IN (0, 1))".to_string());
        columns.push("confidence_not_urgent REAL".to_string());
        columns.push("confidence_urgent REAL".to_string());
        columns.push("created_at TEXT NOT NULL".to_string());

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            columns.join(",\n    ")
        )
    }

    pub fn index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_triage_level ON {table}(triage_level)",
            table = self.table
        )
    }

    fn data_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.schema.names();
        columns.extend([
            "triage_level",
            "confidence_not_urgent",
            "confidence_urgent",
            "created_at",
        ]);
        columns
    }

    pub fn insert_sql(&self) -> String {
        let columns = self.data_columns();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// `SELECT` of every column in [`TableLayout::read_row`] order, without a clause
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT id, {} FROM {}",
            self.data_columns().join(", "),
            self.table
        )
    }

    /// Bind values for [`TableLayout::insert_sql`]
    pub fn insert_values(
        &self,
        vector: &FeatureVector,
        label: TriageLevel,
        confidence: Option<Confidence>,
        created_at: DateTime<Utc>,
    ) -> Vec<Value> {
        let mut values: Vec<Value> = vector
            .values()
            .iter()
            .map(|value| match value {
                FeatureValue::Categorical(s) => Value::Text(s.clone()),
                FeatureValue::Integer(i) => Value::Integer(*i),
                FeatureValue::Float(f) => Value::Real(*f),
                FeatureValue::Boolean(b) => Value::Integer(i64::from(*b)),
            })
            .collect();
        values.push(Value::Integer(i64::from(label.as_u8())));
        match confidence {
            Some(c) => {
                values.push(Value::Real(c.not_urgent));
                values.push(Value::Real(c.urgent));
            }
            None => {
                values.push(Value::Null);
                values.push(Value::Null);
            }
        }
        values.push(Value::Text(
            created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        ));
        values
    }

    /// Decode a row selected with [`TableLayout::select_sql`]
    pub fn read_row(&self, row: &Row<'_>) -> rusqlite::Result<TriageRecord> {
        let id: i64 = row.get(0)?;

        let fields = self.schema.fields();
        let mut features = Features::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            let idx = i + 1;
            let value = match field.kind {
                FieldKind::Categorical => FeatureValue::Categorical(row.get(idx)?),
                FieldKind::Integer => FeatureValue::Integer(row.get(idx)?),
                FieldKind::Float => FeatureValue::Float(row.get(idx)?),
                FieldKind::Boolean => FeatureValue::Boolean(row.get(idx)?),
            };
            features.push(field.name.clone(), value);
        }

        let base = fields.len() + 1;
        let raw_level: i64 = row.get(base)?;
        let triage_level = u8::try_from(raw_level)
            .ok()
            .and_then(|level| TriageLevel::try_from(level).ok())
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(base, raw_level))?;

        let not_urgent: Option<f64> = row.get(base + 1)?;
        let urgent: Option<f64> = row.get(base + 2)?;
        let confidence = match (not_urgent, urgent) {
            (Some(not_urgent), Some(urgent)) => Some(Confidence { not_urgent, urgent }),
            _ => None,
        };

        let raw_created: String = row.get(base + 3)?;
        let created_at = DateTime::parse_from_rfc3339(&raw_created)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(base + 3, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);

        Ok(TriageRecord {
            id,
            features,
            triage_level,
            confidence,
            created_at,
        })
    }

    /// Create the table if absent, then check an existing one matches
    pub fn ensure(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.create_sql())
            .map_err(|e| to_store_err(&format!("create table {}", self.table), e))?;
        self.verify(conn)?;
        conn.execute_batch(&self.index_sql())
            .map_err(|e| to_store_err(&format!("index table {}", self.table), e))
    }

    /// Fail on missing columns or declared types that differ from the schema
    pub fn verify(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", self.table))
            .map_err(|e| to_store_err("table_info", e))?;
        let actual: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
            .map_err(|e| to_store_err("table_info", e))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| to_store_err("table_info", e))?;

        for (column, expected_type) in self.expected_columns() {
            match actual.iter().find(|(name, _)| *name == column) {
                None => {
                    return Err(Error::constraint(format!(
                        "table {} has no column '{}'",
                        self.table, column
                    )))
                }
                Some((_, declared)) if !declared.eq_ignore_ascii_case(expected_type) => {
                    return Err(Error::constraint(format!(
                        "table {} column '{}' is {}, expected {}",
                        self.table, column, declared, expected_type
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::FieldSpec;

    fn layout() -> TableLayout {
        let schema = FeatureSchema::new(vec![
            FieldSpec::categorical("gender"),
            FieldSpec::integer("age"),
            FieldSpec::float("temperature"),
            FieldSpec::boolean("arrived_by_ambulance"),
        ])
        .unwrap();
        TableLayout::new(DEFAULT_TABLE, Arc::new(schema)).unwrap()
    }

    #[test]
    fn test_create_sql_columns() {
        let sql = layout().create_sql();
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("gender TEXT NOT NULL"));
        assert!(sql.contains("temperature REAL NOT NULL"));
        assert!(sql.contains("CHECK (arrived_by_ambulance IN (0, 1))"));
        assert!(sql.contains("CHECK (triage_level IN (0, 1))"));
    }

    #[test]
    fn test_insert_sql_placeholders() {
        let sql = layout().insert_sql();
        assert!(sql.starts_with("INSERT INTO patient_records (gender, age, temperature"));
        assert!(sql.ends_with("?8)"));
    }

    #[test]
    fn test_invalid_table_name() {
        let schema = Arc::new(FeatureSchema::triage_default());
        assert!(TableLayout::new("records; DROP TABLE x", schema.clone()).is_err());
        assert!(TableLayout::new("Records", schema).is_err());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let layout = layout();
        layout.ensure(&conn).unwrap();
        layout.ensure(&conn).unwrap();
    }

    #[test]
    fn test_verify_detects_type_drift() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE patient_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gender TEXT NOT NULL,
                age TEXT NOT NULL,
                temperature REAL NOT NULL,
                arrived_by_ambulance INTEGER NOT NULL,
                triage_level INTEGER NOT NULL,
                confidence_not_urgent REAL,
                confidence_urgent REAL,
                created_at TEXT NOT NULL
            )",
        )
        .unwrap();
        match layout().ensure(&conn) {
            Err(Error::ConstraintViolation(msg)) => assert!(msg.contains("'age'"), "{msg}"),
            other => panic!("expected ConstraintViolation, got {other:?}"),
        }
    }
}
