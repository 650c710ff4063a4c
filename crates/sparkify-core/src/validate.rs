//! Row-count checks, the fixed analytical report and table sampling.
//!
//! Report queries and samples are isolated from each other: one failing
//! query is logged and the rest still run.

use tracing::{info, warn};

use crate::error::{ReportError, WarehouseError};
use crate::tables::ALL_TABLES;
use crate::warehouse::{ResultTable, Warehouse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    pub count: i64,
}

/// `COUNT(*)` for each of the seven tables, in creation order.
pub async fn row_counts(warehouse: &dyn Warehouse) -> Result<Vec<TableCount>, ReportError> {
    let mut counts = Vec::with_capacity(ALL_TABLES.len());
    for table in ALL_TABLES {
        let name = format!("count_{}", table.name);
        let sql = format!("SELECT COUNT(*) FROM {}", table.ident());
        let result = warehouse
            .query(&sql)
            .await
            .map_err(|source| ReportError {
                query: name.clone(),
                source,
            })?;
        let count = result
            .scalar()
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| ReportError {
                query: name,
                source: WarehouseError::Statement(format!(
                    "COUNT(*) on {} returned no integer",
                    table.name
                )),
            })?;
        info!(table = table.name, count, "Row count");
        counts.push(TableCount {
            table: table.name,
            count,
        });
    }
    Ok(counts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuery {
    pub name: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
}

pub const REPORT_QUERIES: [ReportQuery; 9] = [
    ReportQuery {
        name: "top_users",
        title: "Top 15 users by number of plays",
        sql: r#"WITH super_users AS (
    SELECT user_id, COUNT(*) AS cnt
      FROM "songplay"
     GROUP BY user_id
     ORDER BY cnt DESC
     LIMIT 15
)
SELECT u.first_name, u.last_name, su.cnt
  FROM super_users su
  JOIN "users" u ON u.user_id = su.user_id
 ORDER BY su.cnt DESC"#,
    },
    ReportQuery {
        name: "top_locations",
        title: "50 most popular play locations",
        sql: r#"SELECT location, COUNT(*) AS cnt
  FROM "songplay"
 GROUP BY location
 ORDER BY cnt DESC
 LIMIT 50"#,
    },
    ReportQuery {
        name: "top_songs",
        title: "10 most played songs",
        sql: r#"SELECT sp.song_id, s.title, COUNT(*) AS cnt
  FROM "songplay" sp
  JOIN "songs" s ON sp.song_id = s.song_id
 GROUP BY sp.song_id, s.title
 ORDER BY cnt DESC
 LIMIT 10"#,
    },
    ReportQuery {
        name: "play_time_of_day",
        title: "Plays by time of day",
        sql: r#"SELECT CASE
           WHEN t.hour BETWEEN 2 AND 7 THEN '2~7'
           WHEN t.hour BETWEEN 8 AND 12 THEN '8~12'
           WHEN t.hour BETWEEN 13 AND 18 THEN '13~18'
           WHEN t.hour BETWEEN 19 AND 22 THEN '19~22'
           ELSE '23~24, 0~2'
       END AS play_time,
       COUNT(*) AS cnt
  FROM "songplay" sp
  JOIN "time" t ON sp.start_time = t.start_time
 GROUP BY 1
 ORDER BY 2 DESC"#,
    },
    ReportQuery {
        name: "matched_plays",
        title: "Sample of plays matched to a song, by user",
        sql: r#"SELECT DISTINCT sp.songplay_id, u.user_id, u.last_name, u.first_name, sp.start_time, sp.song_id
  FROM "songplay" sp
  JOIN "users" u ON u.user_id = sp.user_id
 WHERE sp.song_id IS NOT NULL
 ORDER BY u.last_name
 LIMIT 10"#,
    },
    ReportQuery {
        name: "song_ids",
        title: "Song ids",
        sql: r#"SELECT song_id FROM "songs""#,
    },
    ReportQuery {
        name: "users_by_last_name",
        title: "Users by last name",
        sql: r#"SELECT DISTINCT * FROM "users" ORDER BY last_name"#,
    },
    ReportQuery {
        name: "busiest_years",
        title: "Songs from the 15 years with the most releases",
        sql: r#"WITH max_song AS (
    SELECT year, COUNT(*) AS cnt
      FROM "songs"
     GROUP BY year
     ORDER BY cnt DESC
     LIMIT 15
)
SELECT s.title, s.year, m.cnt
  FROM max_song m
  JOIN "songs" s ON s.year = m.year
 ORDER BY m.cnt DESC, s.year ASC
 LIMIT 30"#,
    },
    ReportQuery {
        name: "songs_with_artists",
        title: "Songs joined to their artists",
        sql: r#"SELECT *
  FROM "songs" s
  JOIN "artists" a ON s.artist_id = a.artist_id"#,
    },
];

#[derive(Debug)]
pub struct ReportOutcome {
    pub name: String,
    pub title: String,
    pub result: Result<ResultTable, ReportError>,
}

/// Run `queries` in order. Failures are captured per query.
pub async fn run_queries(warehouse: &dyn Warehouse, queries: &[ReportQuery]) -> Vec<ReportOutcome> {
    let mut outcomes = Vec::with_capacity(queries.len());
    for query in queries {
        let result = warehouse
            .query(query.sql)
            .await
            .map_err(|source| ReportError {
                query: query.name.to_string(),
                source,
            });
        match &result {
            Ok(table) => info!(query = query.name, rows = table.len(), "Report query ok"),
            Err(e) => warn!(query = query.name, error = %e, "Report query failed, skipping"),
        }
        outcomes.push(ReportOutcome {
            name: query.name.to_string(),
            title: query.title.to_string(),
            result,
        });
    }
    outcomes
}

pub async fn run_report_queries(warehouse: &dyn Warehouse) -> Vec<ReportOutcome> {
    run_queries(warehouse, &REPORT_QUERIES).await
}

/// `limit` random rows from every table.
pub async fn sample_tables(warehouse: &dyn Warehouse, limit: u32) -> Vec<ReportOutcome> {
    let mut outcomes = Vec::with_capacity(ALL_TABLES.len());
    for table in ALL_TABLES {
        let sql = format!(
            "SELECT * FROM {} ORDER BY random() LIMIT {limit}",
            table.ident()
        );
        let result = warehouse
            .query(&sql)
            .await
            .map_err(|source| ReportError {
                query: format!("sample_{}", table.name),
                source,
            });
        if let Err(e) = &result {
            warn!(table = table.name, error = %e, "Sampling failed, skipping");
        }
        outcomes.push(ReportOutcome {
            name: format!("sample_{}", table.name),
            title: format!("Sample of {}", table.name),
            result,
        });
    }
    outcomes
}

/// Row counts plus the report queries, as run at the end of a pipeline or by
/// the analytics command.
#[derive(Debug)]
pub struct ValidationReport {
    pub counts: Result<Vec<TableCount>, ReportError>,
    pub reports: Vec<ReportOutcome>,
}

pub async fn validate(warehouse: &dyn Warehouse) -> ValidationReport {
    let counts = row_counts(warehouse).await;
    if let Err(e) = &counts {
        warn!(error = %e, "Row counts failed");
    }
    let reports = run_report_queries(warehouse).await;
    ValidationReport { counts, reports }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nine_uniquely_named_report_queries() {
        let mut names: Vec<&str> = REPORT_QUERIES.iter().map(|q| q.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn report_queries_are_read_only() {
        for query in REPORT_QUERIES {
            let head = query.sql.trim_start().to_ascii_uppercase();
            assert!(
                head.starts_with("SELECT") || head.starts_with("WITH"),
                "{} is not a read-only query",
                query.name
            );
        }
    }
}
