//! `COPY … FROM 's3://…' … FORMAT AS JSON` rendering.
//!
//! Every literal placed in the statement is checked against the shape it must
//! have, then quoted with single quotes doubled.

use std::sync::LazyLock;

use regex::Regex;

use sparkify_core::{CopyRequest, JsonFormat, WarehouseError};

type Pattern = LazyLock<Result<Regex, regex::Error>>;

static S3_URI: Pattern =
    LazyLock::new(|| Regex::new(r"^s3://[a-z0-9][a-z0-9.\-]{1,61}[a-z0-9](/[^\x00-\x1f\x7f\\]*)?$"));
static IAM_ROLE_ARN: Pattern =
    LazyLock::new(|| Regex::new(r"^arn:aws[a-z\-]*:iam::\d{12}:role/[\w+=,.@/\-]{1,512}$"));
static AWS_REGION: Pattern = LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d$"));

fn check(pattern: &Pattern, value: &str, what: &str) -> Result<(), WarehouseError> {
    let re = match &**pattern {
        Ok(re) => re,
        Err(e) => return Err(WarehouseError::InvalidCopy(e.to_string())),
    };
    if re.is_match(value) {
        Ok(())
    } else {
        Err(WarehouseError::InvalidCopy(format!("`{value}` is not a valid {what}")))
    }
}

/// `value` as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render the bulk copy for `request`. Fails with
/// [`WarehouseError::InvalidCopy`] before anything is sent when a literal is
/// malformed or the IAM role is missing.
pub fn render_copy(request: &CopyRequest) -> Result<String, WarehouseError> {
    check(&S3_URI, &request.source, "S3 URI")?;

    let role = request.credentials.iam_role.as_deref().ok_or_else(|| {
        WarehouseError::InvalidCopy(format!(
            "copy into `{}` needs an IAM role ARN",
            request.table.name
        ))
    })?;
    check(&IAM_ROLE_ARN, role, "IAM role ARN")?;
    check(&AWS_REGION, &request.credentials.region, "AWS region")?;

    let format = match &request.format {
        JsonFormat::Auto => quote_literal("auto"),
        JsonFormat::Paths(uri) => {
            check(&S3_URI, uri, "JSON-paths S3 URI")?;
            quote_literal(uri)
        }
    };

    let mut sql = format!(
        "COPY {}\nFROM {}\nIAM_ROLE {}\nREGION {}\nFORMAT AS JSON {format}\nMAXERROR {}",
        request.table.ident(),
        quote_literal(&request.source),
        quote_literal(role),
        quote_literal(&request.credentials.region),
        request.max_errors,
    );
    if request.blanks_as_null {
        sql.push_str("\nBLANKSASNULL");
    }
    if request.empty_as_null {
        sql.push_str("\nEMPTYASNULL");
    }
    if request.truncate_columns {
        sql.push_str("\nTRUNCATECOLUMNS");
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkify_core::config::S3Settings;
    use sparkify_core::loader::staging_requests;

    const ARN: &str = "arn:aws:iam::123456789012:role/dwhRole";

    fn settings() -> S3Settings {
        S3Settings {
            log_data: "s3://udacity-dend/log_data".to_string(),
            log_jsonpath: "s3://udacity-dend/log_json_path.json".to_string(),
            song_data: "s3://udacity-dend/song_data".to_string(),
            region: "us-west-2".to_string(),
            log_max_errors: 0,
            song_max_errors: 50,
            iam_role_arn: Some(ARN.to_string()),
        }
    }

    #[test]
    fn literal_patterns_compile() {
        for pattern in [&S3_URI, &IAM_ROLE_ARN, &AWS_REGION] {
            assert!(pattern.is_ok());
        }
    }

    #[test]
    fn renders_event_copy_with_jsonpaths() {
        let requests = staging_requests(&settings());
        let sql = render_copy(&requests[0]).expect("valid copy");
        assert_eq!(
            sql,
            "COPY \"staging_events\"\n\
             FROM 's3://udacity-dend/log_data'\n\
             IAM_ROLE 'arn:aws:iam::123456789012:role/dwhRole'\n\
             REGION 'us-west-2'\n\
             FORMAT AS JSON 's3://udacity-dend/log_json_path.json'\n\
             MAXERROR 0\n\
             BLANKSASNULL\n\
             EMPTYASNULL\n\
             TRUNCATECOLUMNS"
        );
    }

    #[test]
    fn renders_song_copy_with_auto_mapping() {
        let requests = staging_requests(&settings());
        let sql = render_copy(&requests[1]).expect("valid copy");
        assert!(sql.starts_with("COPY \"staging_songs\"\nFROM 's3://udacity-dend/song_data'"));
        assert!(sql.contains("FORMAT AS JSON 'auto'\nMAXERROR 50"));
    }

    #[test]
    fn quotes_are_doubled() {
        let mut s3 = settings();
        s3.song_data = "s3://udacity-dend/it's here".to_string();
        let sql = render_copy(&staging_requests(&s3)[1]).expect("valid copy");
        assert!(sql.contains("FROM 's3://udacity-dend/it''s here'"));
    }

    #[test]
    fn rejects_malformed_literals() {
        let mut s3 = settings();
        s3.log_data = "s3://bucket/x'\nIAM_ROLE 'evil".to_string();
        assert!(matches!(
            render_copy(&staging_requests(&s3)[0]),
            Err(WarehouseError::InvalidCopy(_))
        ));

        let mut s3 = settings();
        s3.log_data = "/local/log_data".to_string();
        assert!(render_copy(&staging_requests(&s3)[0]).is_err());

        let mut s3 = settings();
        s3.iam_role_arn = Some("arn:aws:iam::123:role/short-account".to_string());
        assert!(render_copy(&staging_requests(&s3)[0]).is_err());

        let mut s3 = settings();
        s3.region = "us-west-2'; DROP TABLE users; --".to_string();
        assert!(render_copy(&staging_requests(&s3)[0]).is_err());
    }

    #[test]
    fn missing_role_is_rejected() {
        let mut s3 = settings();
        s3.iam_role_arn = None;
        let err = render_copy(&staging_requests(&s3)[1]).expect_err("no role");
        assert!(err.to_string().contains("IAM role"));
    }
}
