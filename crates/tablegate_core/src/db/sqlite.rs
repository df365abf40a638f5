//! `Connection` implementation over `rusqlite`.

use super::{DbError, DbResult};
use crate::repo::connection::{
    Assignment, Changes, Connection, FindOptions, InsertInfo, Record, Selector, WriteInfo,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Statement};
use serde_json::{Number, Value};

/// SQLite-backed connection collaborator.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Underlying `rusqlite` handle, e.g. for schema setup.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn where_clause<'s>(&self, selector: &'s Selector) -> (String, Vec<&'s Value>) {
        match selector {
            Selector::All => (" WHERE 1".to_string(), Vec::new()),
            Selector::Match(query) => {
                let mut terms = Vec::with_capacity(query.len());
                let mut binds = Vec::with_capacity(query.len());
                for (field, value) in query {
                    if value.is_null() {
                        terms.push(format!("{} IS NULL", self.escape_id(field)));
                    } else {
                        terms.push(format!("{} = ?", self.escape_id(field)));
                        binds.push(value);
                    }
                }
                (format!(" WHERE {}", terms.join(" AND ")), binds)
            }
        }
    }

    fn select(
        &self,
        table: &str,
        selector: &Selector,
        options: &FindOptions,
        max_rows: Option<usize>,
    ) -> DbResult<Vec<Record>> {
        let fields = options.fields.as_deref().unwrap_or("*");
        let (where_sql, binds) = self.where_clause(selector);
        let mut sql = format!("SELECT {fields} FROM {}{where_sql}", self.escape_id(table));
        if let Some(tail) = options.tail.as_deref() {
            sql.push_str(tail);
        }
        let params = to_sql_values(binds)?;
        let mut stmt = self.conn.prepare(&sql)?;
        collect_rows(&mut stmt, params, max_rows)
    }
}

impl Connection for SqliteConnection {
    type Error = DbError;

    fn escape_id(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn escape(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(flag) => String::from(if *flag { "1" } else { "0" }),
            Value::Number(number) => number.to_string(),
            Value::String(text) => quote_literal(text),
            other => quote_literal(&other.to_string()),
        }
    }

    fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Record>> {
        let params = to_sql_values(params.iter())?;
        let mut stmt = self.conn.prepare(sql)?;
        collect_rows(&mut stmt, params, None)
    }

    fn find_one(
        &self,
        table: &str,
        selector: &Selector,
        options: &FindOptions,
    ) -> DbResult<Option<Record>> {
        let mut options = options.clone();
        if options.tail.is_none() {
            options.tail = Some(" LIMIT 1".to_string());
        }
        Ok(self
            .select(table, selector, &options, Some(1))?
            .into_iter()
            .next())
    }

    fn find(
        &self,
        table: &str,
        selector: &Selector,
        options: &FindOptions,
    ) -> DbResult<Vec<Record>> {
        self.select(table, selector, options, None)
    }

    fn insert(&self, table: &str, record: &Record) -> DbResult<InsertInfo> {
        let sql = if record.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.escape_id(table))
        } else {
            let columns: Vec<String> = record.keys().map(|field| self.escape_id(field)).collect();
            let placeholders = vec!["?"; record.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.escape_id(table),
                columns.join(", ")
            )
        };
        let params = to_sql_values(record.values())?;
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(InsertInfo {
            insert_id: Some(self.conn.last_insert_rowid()),
        })
    }

    fn update(&self, table: &str, selector: &Selector, changes: &Changes) -> DbResult<WriteInfo> {
        if changes.is_empty() {
            return Ok(WriteInfo::default());
        }

        let mut assignments = Vec::with_capacity(changes.len());
        let mut values = Vec::with_capacity(changes.len());
        for (field, assignment) in changes {
            let column = self.escape_id(field);
            match assignment {
                Assignment::Set(value) => {
                    assignments.push(format!("{column} = ?"));
                    values.push(value);
                }
                Assignment::Increment(amount) => {
                    assignments.push(format!("{column} = {column} + ?"));
                    values.push(amount);
                }
            }
        }
        let (where_sql, binds) = self.where_clause(selector);
        values.extend(binds);

        let sql = format!(
            "UPDATE {} SET {}{where_sql}",
            self.escape_id(table),
            assignments.join(", ")
        );
        let params = to_sql_values(values)?;
        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(WriteInfo {
            affected_rows: changed as u64,
        })
    }

    fn delete(&self, table: &str, selector: &Selector) -> DbResult<WriteInfo> {
        let (where_sql, binds) = self.where_clause(selector);
        let sql = format!("DELETE FROM {}{where_sql}", self.escape_id(table));
        let params = to_sql_values(binds)?;
        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(WriteInfo {
            affected_rows: changed as u64,
        })
    }
}

fn collect_rows(
    stmt: &mut Statement<'_>,
    params: Vec<SqlValue>,
    max_rows: Option<usize>,
) -> DbResult<Vec<Record>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut records = Vec::new();

    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (index, column) in columns.iter().enumerate() {
            record.insert(column.clone(), from_sql_value(row.get_ref(index)?));
        }
        records.push(record);
        if max_rows.is_some_and(|max| records.len() >= max) {
            break;
        }
    }

    Ok(records)
}

fn to_sql_values<'v, I>(values: I) -> DbResult<Vec<SqlValue>>
where
    I: IntoIterator<Item = &'v Value>,
{
    values.into_iter().map(to_sql_value).collect()
}

fn to_sql_value(value: &Value) -> DbResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                SqlValue::Integer(integer)
            } else if number.is_u64() {
                return Err(DbError::UnsupportedValue(number.to_string()));
            } else {
                SqlValue::Real(number.as_f64().unwrap_or_default())
            }
        }
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    })
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::{from_sql_value, to_sql_value, SqliteConnection};
    use crate::db::DbError;
    use crate::repo::connection::{Connection, Selector};
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use serde_json::{json, Value};

    fn conn() -> SqliteConnection {
        SqliteConnection::new(rusqlite::Connection::open_in_memory().expect("in-memory db"))
    }

    #[test]
    fn escapes_identifiers_and_literals() {
        let conn = conn();
        assert_eq!(conn.escape_id("user`s"), "`user``s`");
        assert_eq!(conn.escape(&json!("it's")), "'it''s'");
        assert_eq!(conn.escape(&Value::Null), "NULL");
        assert_eq!(conn.escape(&json!(true)), "1");
        assert_eq!(conn.escape(&json!(2.5)), "2.5");
    }

    #[test]
    fn where_clause_binds_values_and_handles_null() {
        let conn = conn();
        let query = json!({"a": 1, "b": null})
            .as_object()
            .cloned()
            .expect("object");
        let selector = Selector::Match(query);
        let (sql, binds) = conn.where_clause(&selector);
        assert_eq!(sql, " WHERE `a` = ? AND `b` IS NULL");
        assert_eq!(binds, vec![&json!(1)]);

        let all = Selector::All;
        let (sql, binds) = conn.where_clause(&all);
        assert_eq!(sql, " WHERE 1");
        assert!(binds.is_empty());
    }

    #[test]
    fn value_conversion_covers_sqlite_types() {
        assert_eq!(to_sql_value(&json!(true)).expect("bool"), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(1.5)).expect("real"), SqlValue::Real(1.5));
        assert_eq!(
            to_sql_value(&json!({"k": 1})).expect("object"),
            SqlValue::Text("{\"k\":1}".to_string())
        );
        assert!(matches!(
            to_sql_value(&json!(u64::MAX)),
            Err(DbError::UnsupportedValue(_))
        ));

        assert_eq!(from_sql_value(ValueRef::Integer(7)), json!(7));
        assert_eq!(from_sql_value(ValueRef::Real(f64::NAN)), Value::Null);
        assert_eq!(from_sql_value(ValueRef::Text(b"hi")), json!("hi"));
        assert_eq!(from_sql_value(ValueRef::Blob(&[1, 2])), json!([1, 2]));
    }
}
