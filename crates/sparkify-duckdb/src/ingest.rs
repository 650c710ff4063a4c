//! Local bulk copy of JSON records into a staging table.
//!
//! Files hold JSON objects separated by whitespace, as `COPY … FORMAT AS
//! JSON` reads them. Mirrors the warehouse copy options the loader sets:
//! column mapping through a JSON-paths file or by key name, blank and empty
//! strings loaded as NULL, over-long text truncated, and a bound on how many
//! malformed records are skipped before the whole copy fails.

use std::path::{Path, PathBuf};

use duckdb::types::Value;
use duckdb::Connection;
use serde_json::{Map, Value as Json};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use sparkify_core::tables::{ColumnDef, ColumnType, TableDef};
use sparkify_core::{CopyRequest, JsonFormat, WarehouseError};

use crate::jsonpath::{read_paths_file, JsonPath};

/// Where one target column takes its value from.
#[derive(Debug)]
enum ColumnSource {
    Path(JsonPath),
    /// Top-level key matched ignoring ASCII case.
    Key(&'static str),
}

impl ColumnSource {
    fn select<'a>(&self, object: &'a Map<String, Json>) -> Option<&'a Json> {
        match self {
            ColumnSource::Path(path) => path.select(object),
            ColumnSource::Key(name) => object
                .get(*name)
                .or_else(|| {
                    object
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .map(|(_, v)| v)
                }),
        }
    }
}

/// `.json` files under `source`, or `source` itself when it is a file.
pub fn source_files(source: &str) -> Result<Vec<PathBuf>, WarehouseError> {
    if source.contains("://") {
        return Err(WarehouseError::InvalidCopy(format!(
            "`{source}` is not a local path; the embedded backend only reads local files"
        )));
    }
    let root = Path::new(source);
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        return Err(WarehouseError::Copy(format!("source `{source}` does not exist")));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(WarehouseError::Copy(format!(
            "no .json files found under `{source}`"
        )));
    }
    Ok(files)
}

fn column_sources(request: &CopyRequest) -> Result<Vec<ColumnSource>, WarehouseError> {
    let table = request.table;
    match &request.format {
        JsonFormat::Auto => Ok(table
            .columns
            .iter()
            .map(|c| ColumnSource::Key(c.name))
            .collect()),
        JsonFormat::Paths(file) => {
            let paths = read_paths_file(Path::new(file)).map_err(WarehouseError::InvalidCopy)?;
            if paths.len() != table.columns.len() {
                return Err(WarehouseError::InvalidCopy(format!(
                    "JSON-paths file {file} has {} paths but `{}` has {} columns",
                    paths.len(),
                    table.name,
                    table.columns.len()
                )));
            }
            Ok(paths.into_iter().map(ColumnSource::Path).collect())
        }
    }
}

/// Copy every record under `request.source` into `request.table`.
///
/// With `in_transaction` set the rows are inserted on the caller's open
/// transaction; otherwise the copy commits (or rolls back) on its own.
pub fn copy_into(
    conn: &mut Connection,
    request: &CopyRequest,
    in_transaction: bool,
) -> Result<u64, WarehouseError> {
    let sources = column_sources(request)?;
    let files = source_files(&request.source)?;

    let mut rows = Vec::new();
    let mut errors: u32 = 0;
    for file in &files {
        let content = std::fs::read_to_string(file)
            .map_err(|e| WarehouseError::Copy(format!("cannot read {}: {e}", file.display())))?;
        for record in read_records(&content) {
            match record
                .value
                .and_then(|doc| parse_record(&doc, &sources, request))
            {
                Ok(row) => rows.push(row),
                Err(reason) => {
                    errors += 1;
                    debug!(
                        file = %file.display(),
                        line = record.line,
                        reason = %reason,
                        "Skipping malformed record"
                    );
                    if errors > request.max_errors {
                        return Err(WarehouseError::Copy(format!(
                            "{errors} malformed records in `{}` exceed the limit of {} (last: {}:{}: {reason})",
                            request.source,
                            request.max_errors,
                            file.display(),
                            record.line
                        )));
                    }
                }
            }
        }
    }
    if errors > 0 {
        warn!(
            table = request.table.name,
            errors,
            max_errors = request.max_errors,
            "Skipped malformed records"
        );
    }

    let inserted = if in_transaction {
        insert_rows(conn, request.table, &rows)?
    } else {
        let tx = conn
            .transaction()
            .map_err(|e| WarehouseError::Copy(e.to_string()))?;
        let inserted = insert_rows(&tx, request.table, &rows)?;
        tx.commit().map_err(|e| WarehouseError::Copy(e.to_string()))?;
        inserted
    };
    info!(
        table = request.table.name,
        files = files.len(),
        rows = inserted,
        "Local JSON copy finished"
    );
    Ok(inserted)
}

fn insert_rows(conn: &Connection, table: &TableDef, rows: &[Vec<Value>]) -> Result<u64, WarehouseError> {
    let columns: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        table.ident(),
        columns.join(", ")
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| WarehouseError::Copy(e.to_string()))?;
    let mut inserted = 0u64;
    for row in rows {
        inserted += stmt
            .execute(duckdb::params_from_iter(row.iter()))
            .map_err(|e| WarehouseError::Copy(e.to_string()))? as u64;
    }
    Ok(inserted)
}

/// One JSON value read from a source file, with the line it starts on.
#[derive(Debug)]
struct Record {
    line: usize,
    value: Result<Json, String>,
}

/// Split `content` into whitespace-separated JSON values. One object per
/// line, objects spread over several lines and objects run together on one
/// line all read the same way. A syntax error yields one failed record and
/// reading resumes on the line after the error.
fn read_records(content: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut start_line = 1;
    while start < content.len() {
        let rest = &content[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Json>();
        loop {
            let consumed = stream.byte_offset();
            let tail = &rest[consumed..];
            let begin = consumed + (tail.len() - tail.trim_start().len());
            let line = start_line + rest[..begin].matches('\n').count();
            match stream.next() {
                None => return records,
                Some(Ok(value)) => records.push(Record {
                    line,
                    value: Ok(value),
                }),
                Some(Err(e)) => {
                    let error_line = e.line().max(1);
                    records.push(Record {
                        line: start_line + error_line - 1,
                        value: Err(format!("invalid JSON: {e}")),
                    });
                    match rest.match_indices('\n').nth(error_line - 1) {
                        Some((idx, _)) => {
                            start += idx + 1;
                            start_line += error_line;
                        }
                        None => return records,
                    }
                    break;
                }
            }
        }
    }
    records
}

fn parse_record(
    doc: &Json,
    sources: &[ColumnSource],
    request: &CopyRequest,
) -> Result<Vec<Value>, String> {
    let object = doc
        .as_object()
        .ok_or_else(|| "record is not a JSON object".to_string())?;
    request
        .table
        .columns
        .iter()
        .zip(sources)
        .map(|(column, source)| {
            convert(column, source.select(object), request)
                .map_err(|reason| format!("column `{}`: {reason}", column.name))
        })
        .collect()
}

/// Turn one JSON value into the column's SQL type, applying the request's
/// null handling and truncation.
fn convert(column: &ColumnDef, raw: Option<&Json>, request: &CopyRequest) -> Result<Value, String> {
    let raw = match raw {
        None | Some(Json::Null) => return Ok(Value::Null),
        Some(raw) => raw,
    };
    if let Json::String(s) = raw {
        if (request.empty_as_null && s.is_empty()) || (request.blanks_as_null && s.trim().is_empty())
        {
            return Ok(Value::Null);
        }
    }

    match column.ty {
        ColumnType::Varchar(_) | ColumnType::Text => {
            let text = match raw {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(Value::Text(fit_text(text, column.ty, request.truncate_columns)?))
        }
        ColumnType::Integer => {
            let n = integer(raw)?;
            i32::try_from(n)
                .map(Value::Int)
                .map_err(|_| format!("{n} is out of range for INTEGER"))
        }
        ColumnType::BigInt => integer(raw).map(Value::BigInt),
        ColumnType::Real => float(raw).map(|f| Value::Float(f as f32)),
        ColumnType::Double => float(raw).map(Value::Double),
    }
}

fn fit_text(text: String, ty: ColumnType, truncate: bool) -> Result<String, String> {
    match ty.max_chars() {
        Some(max) if text.chars().count() > max => {
            if truncate {
                Ok(text.chars().take(max).collect())
            } else {
                Err(format!("value longer than {max} characters"))
            }
        }
        _ => Ok(text),
    }
}

fn integer(raw: &Json) -> Result<i64, String> {
    match raw {
        Json::Number(n) => n.as_i64().ok_or_else(|| format!("{n} is not an integer")),
        Json::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("`{s}` is not an integer")),
        other => Err(format!("expected an integer, got {other}")),
    }
}

fn float(raw: &Json) -> Result<f64, String> {
    match raw {
        Json::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Json::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("`{s}` is not a number")),
        other => Err(format!("expected a number, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sparkify_core::tables::{STAGING_EVENTS, STAGING_SONGS};
    use sparkify_core::CopyCredentials;

    fn request(table: &'static TableDef) -> CopyRequest {
        CopyRequest {
            table,
            source: String::new(),
            format: JsonFormat::Auto,
            credentials: CopyCredentials {
                iam_role: None,
                region: "us-west-2".to_string(),
            },
            max_errors: 0,
            blanks_as_null: true,
            empty_as_null: true,
            truncate_columns: true,
        }
    }

    fn column(table: &TableDef, name: &str) -> ColumnDef {
        *table.column(name).expect("column exists")
    }

    #[test]
    fn blank_and_empty_strings_become_null() {
        let req = request(&STAGING_EVENTS);
        let user_id = column(&STAGING_EVENTS, "userId");
        assert_eq!(convert(&user_id, Some(&json!("")), &req), Ok(Value::Null));
        assert_eq!(convert(&user_id, Some(&json!("   ")), &req), Ok(Value::Null));
        assert_eq!(convert(&user_id, None, &req), Ok(Value::Null));
        assert_eq!(
            convert(&user_id, Some(&json!("39")), &req),
            Ok(Value::Text("39".to_string()))
        );
    }

    #[test]
    fn numbers_are_accepted_from_strings() {
        let req = request(&STAGING_EVENTS);
        let ts = column(&STAGING_EVENTS, "ts");
        assert_eq!(
            convert(&ts, Some(&json!("1541903636796")), &req),
            Ok(Value::BigInt(1_541_903_636_796))
        );
        assert!(convert(&ts, Some(&json!("soon")), &req).is_err());
        assert!(convert(&ts, Some(&json!(1.5)), &req).is_err());
    }

    #[test]
    fn long_text_is_truncated_only_when_allowed() {
        let mut req = request(&STAGING_SONGS);
        let title = column(&STAGING_SONGS, "title");
        let long = "a".repeat(2000);
        match convert(&title, Some(&json!(long.as_str())), &req) {
            Ok(Value::Text(text)) => assert_eq!(text.len(), 1024),
            other => panic!("unexpected {other:?}"),
        }
        req.truncate_columns = false;
        assert!(convert(&title, Some(&json!(long.as_str())), &req).is_err());
    }

    #[test]
    fn auto_mapping_ignores_key_case() {
        let doc = json!({"FIRSTNAME": "Kaylee", "userId": "8"});
        let object = doc.as_object().expect("object");
        assert_eq!(
            ColumnSource::Key("firstName").select(object),
            Some(&json!("Kaylee"))
        );
        assert_eq!(ColumnSource::Key("userId").select(object), Some(&json!("8")));
        assert_eq!(ColumnSource::Key("lastName").select(object), None);
    }

    #[test]
    fn pretty_printed_and_concatenated_objects_are_records() {
        let content = "{\n  \"song_id\": \"SOA\",\n  \"title\": \"A\"\n}\n{\"song_id\": \"SOB\"}{\"song_id\": \"SOC\"}\n";
        let records = read_records(content);
        let ids: Vec<&str> = records
            .iter()
            .map(|r| r.value.as_ref().expect("valid record")["song_id"].as_str().expect("id"))
            .collect();
        assert_eq!(ids, vec!["SOA", "SOB", "SOC"]);
        let lines: Vec<usize> = records.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 5, 5]);
    }

    #[test]
    fn syntax_error_skips_to_the_next_line() {
        let content = "{\"song_id\": \"SOA\"}\n{not json\n{\"song_id\": \"SOB\"}";
        let records = read_records(content);
        assert_eq!(records.len(), 3);
        assert!(records[0].value.is_ok());
        assert!(records[1].value.is_err());
        assert_eq!(records[1].line, 2);
        assert_eq!(
            records[2].value.as_ref().expect("after error")["song_id"],
            json!("SOB")
        );
        assert_eq!(records[2].line, 3);
    }

    #[test]
    fn remote_sources_are_rejected() {
        assert!(matches!(
            source_files("s3://udacity-dend/log_data"),
            Err(WarehouseError::InvalidCopy(_))
        ));
    }
}
