//! Staging → star schema inserts.
//!
//! Every statement is an `INSERT … SELECT` over the staging tables only, so
//! the order below is not a correctness requirement, just the historical one.

use tracing::{error, info};

use crate::dialect::Dialect;
use crate::error::TransformError;
use crate::tables::{TableDef, ARTISTS, SONGPLAY, SONGS, TIME, USERS};
use crate::warehouse::Warehouse;

/// The `page` value that marks a song being played.
pub const SONG_PLAY_PAGE: &str = "NextSong";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformOptions {
    /// Also require the event length to be within this many seconds of the
    /// song duration when matching plays to songs.
    pub song_duration_tolerance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and carry on with the next statement.
    BestEffort,
    /// Stop at the first failure.
    StopOnError,
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub table: &'static TableDef,
    pub sql: String,
}

pub fn insert_statements(dialect: Dialect, options: &TransformOptions) -> Vec<InsertStatement> {
    vec![
        InsertStatement {
            table: &SONGPLAY,
            sql: songplay_insert(options),
        },
        InsertStatement {
            table: &USERS,
            sql: users_insert(),
        },
        InsertStatement {
            table: &SONGS,
            sql: songs_insert(),
        },
        InsertStatement {
            table: &ARTISTS,
            sql: artists_insert(),
        },
        InsertStatement {
            table: &TIME,
            sql: time_insert(dialect),
        },
    ]
}

/// One fact row per `NextSong` event. Staging songs are first narrowed to
/// one candidate per (title, artist name), the lowest `song_id`, so a song
/// listed twice in staging does not duplicate plays. The optional duration
/// tolerance is checked against that candidate.
fn songplay_insert(options: &TransformOptions) -> String {
    let duration_match = match options.song_duration_tolerance {
        Some(tolerance) if tolerance.is_finite() && tolerance > 0.0 => {
            format!("\n   AND ABS(e.length - s.duration) < {tolerance}")
        }
        _ => String::new(),
    };
    format!(
        r#"INSERT INTO "songplay" (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT e.ts        AS start_time,
       e.userId    AS user_id,
       e.level     AS level,
       s.song_id   AS song_id,
       s.artist_id AS artist_id,
       e.sessionId AS session_id,
       e.location  AS location,
       e.userAgent AS user_agent
  FROM "staging_events" e
  LEFT JOIN (
        SELECT title,
               artist_name,
               duration,
               song_id,
               artist_id,
               ROW_NUMBER() OVER (PARTITION BY title, artist_name ORDER BY song_id, artist_id) AS row_num
          FROM "staging_songs"
       ) s
    ON e.song = s.title
   AND e.artist = s.artist_name
   AND s.row_num = 1{duration_match}
 WHERE e.page = '{SONG_PLAY_PAGE}'"#
    )
}

/// Latest event per user wins, so `level` reflects the current subscription.
fn users_insert() -> String {
    r#"INSERT INTO "users" (user_id, first_name, last_name, gender, level)
SELECT DISTINCT user_id, first_name, last_name, gender, level
  FROM (
        SELECT ROW_NUMBER() OVER (PARTITION BY userId ORDER BY ts DESC) AS row_num,
               userId    AS user_id,
               firstName AS first_name,
               lastName  AS last_name,
               gender,
               level
          FROM "staging_events"
       ) numbered_levels
 WHERE row_num = 1
   AND user_id IS NOT NULL"#
        .to_string()
}

fn songs_insert() -> String {
    r#"INSERT INTO "songs" (song_id, title, artist_id, year, duration)
SELECT song_id, title, artist_id, year, duration
  FROM (
        SELECT song_id,
               title,
               artist_id,
               CAST(year AS INTEGER) AS year,
               duration,
               ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY title, artist_id) AS row_num
          FROM "staging_songs"
         WHERE song_id IS NOT NULL
       ) ranked_songs
 WHERE row_num = 1"#
        .to_string()
}

fn artists_insert() -> String {
    r#"INSERT INTO "artists" (artist_id, name, location, latitude, longitude)
SELECT artist_id, name, location, latitude, longitude
  FROM (
        SELECT artist_id,
               artist_name      AS name,
               artist_location  AS location,
               artist_latitude  AS latitude,
               artist_longitude AS longitude,
               ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY artist_name, artist_location) AS row_num
          FROM "staging_songs"
         WHERE artist_id IS NOT NULL
       ) ranked_artists
 WHERE row_num = 1
 ORDER BY artist_id"#
        .to_string()
}

/// Weekday is `dow`: 0 = Sunday on both engines.
fn time_insert(dialect: Dialect) -> String {
    let played_at = dialect.epoch_millis_to_timestamp("ts");
    format!(
        r#"INSERT INTO "time" (start_time, hour, day, week, month, year, weekday)
SELECT start_time,
       EXTRACT(hour  FROM played_at),
       EXTRACT(day   FROM played_at),
       EXTRACT(week  FROM played_at),
       EXTRACT(month FROM played_at),
       EXTRACT(year  FROM played_at),
       EXTRACT(dow   FROM played_at)
  FROM (
        SELECT DISTINCT ts AS start_time,
               {played_at} AS played_at
          FROM "staging_events"
         WHERE page = '{SONG_PLAY_PAGE}'
           AND ts IS NOT NULL
       ) plays"#
    )
}

#[derive(Debug)]
pub struct InsertOutcome {
    pub table: &'static str,
    pub result: Result<u64, TransformError>,
}

#[derive(Debug, Default)]
pub struct TransformReport {
    pub outcomes: Vec<InsertOutcome>,
}

impl TransformReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransformError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    /// The report itself when every insert succeeded, else the first failure.
    pub fn into_result(mut self) -> Result<Self, TransformError> {
        if let Some(idx) = self.outcomes.iter().position(|o| o.result.is_err()) {
            if let Err(e) = self.outcomes.remove(idx).result {
                return Err(e);
            }
        }
        Ok(self)
    }
}

/// Populate `songplay`, `users`, `songs`, `artists` and `time` from staging.
///
/// Each insert commits on its own. Under [`FailurePolicy::BestEffort`] a
/// failing insert is logged and the remaining ones still run.
pub async fn populate(
    warehouse: &dyn Warehouse,
    options: &TransformOptions,
    policy: FailurePolicy,
) -> TransformReport {
    let mut report = TransformReport::default();
    for statement in insert_statements(warehouse.dialect(), options) {
        let table = statement.table.name;
        let result = warehouse
            .execute(&statement.sql)
            .await
            .map_err(|source| TransformError {
                table: table.to_string(),
                source,
            });
        let failed = match &result {
            Ok(rows) => {
                info!(table, rows, "Inserted into star schema");
                false
            }
            Err(e) => {
                error!(table, error = %e, "Insert into star schema failed");
                true
            }
        };
        report.outcomes.push(InsertOutcome { table, result });
        if failed && policy == FailurePolicy::StopOnError {
            break;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_run_fact_first_then_dimensions() {
        let order: Vec<&str> = insert_statements(Dialect::DuckDb, &TransformOptions::default())
            .iter()
            .map(|s| s.table.name)
            .collect();
        assert_eq!(order, vec!["songplay", "users", "songs", "artists", "time"]);
    }

    #[test]
    fn duration_match_is_off_by_default() {
        let sql = songplay_insert(&TransformOptions::default());
        assert!(!sql.contains("ABS("));
        assert!(sql.contains("AND s.row_num = 1\n WHERE"));
        assert!(sql.contains("WHERE e.page = 'NextSong'"));
    }

    #[test]
    fn duration_match_uses_configured_tolerance() {
        let sql = songplay_insert(&TransformOptions {
            song_duration_tolerance: Some(12.0),
        });
        assert!(sql.contains("AND ABS(e.length - s.duration) < 12"));
    }

    #[test]
    fn time_insert_is_dialect_specific() {
        assert!(time_insert(Dialect::DuckDb).contains("epoch_ms(ts)"));
        assert!(time_insert(Dialect::Redshift).contains("TIMESTAMP 'epoch' + ts / 1000"));
    }
}
