use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, Result};

use crate::seed::SeedRow;

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

#[cfg(test)]
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS films (
            imdb_id    INTEGER,
            url        TEXT,
            title      TEXT,
            score      REAL,
            genres     TEXT,
            poster     TEXT
        );
        ",
    )
}

pub fn count_films(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM films", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Rows `[start, start + count)` in insertion order. Rows with missing or
/// mistyped columns come back as `Err` with the reason, so one bad row never
/// fails the whole read.
pub fn fetch_seed_rows(
    conn: &Connection,
    start: usize,
    count: usize,
) -> Result<Vec<std::result::Result<SeedRow, String>>> {
    let limit = i64::try_from(count).unwrap_or(i64::MAX);
    let offset = i64::try_from(start).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(
        "SELECT imdb_id, url, title, score, genres FROM films ORDER BY rowid LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![limit, offset], |row| {
            // `Value` accepts any storage class; typing happens per row below.
            let id: Value = row.get(0)?;
            let url: Value = row.get(1)?;
            let title: Value = row.get(2)?;
            let score: Value = row.get(3)?;
            let genres: Value = row.get(4)?;
            Ok(to_seed_row(id, url, title, score, genres))
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

fn to_seed_row(
    id: Value,
    url: Value,
    title: Value,
    score: Value,
    genres: Value,
) -> std::result::Result<SeedRow, String> {
    Ok(SeedRow {
        id: integer("imdb_id", id)?,
        url: text("url", url)?,
        title: text("title", title)?,
        score: real("score", score)? as f32,
        genres: text("genres", genres)?,
    })
}

fn integer(column: &str, value: Value) -> std::result::Result<i64, String> {
    match value {
        Value::Integer(v) => Ok(v),
        Value::Null => Err(format!("missing column {}", column)),
        Value::Text(t) => t
            .trim()
            .parse()
            .map_err(|_| format!("column {} is not an integer: '{}'", column, t)),
        other => Err(format!("column {} has type {}", column, other.data_type())),
    }
}

fn real(column: &str, value: Value) -> std::result::Result<f64, String> {
    match value {
        Value::Real(v) => Ok(v),
        Value::Integer(v) => Ok(v as f64),
        Value::Null => Err(format!("missing column {}", column)),
        Value::Text(t) => t
            .trim()
            .parse()
            .map_err(|_| format!("column {} is not a number: '{}'", column, t)),
        other => Err(format!("column {} has type {}", column, other.data_type())),
    }
}

fn text(column: &str, value: Value) -> std::result::Result<String, String> {
    match value {
        Value::Text(t) => Ok(t),
        Value::Null => Err(format!("missing column {}", column)),
        Value::Integer(v) => Ok(v.to_string()),
        Value::Real(v) => Ok(v.to_string()),
        other => Err(format!("column {} has type {}", column, other.data_type())),
    }
}
