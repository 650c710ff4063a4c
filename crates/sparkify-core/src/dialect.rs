/// SQL flavour a [`crate::warehouse::Warehouse`] speaks.
///
/// Only the handful of constructs that differ between engines are rendered
/// through here; everything else is plain SQL shared by both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Redshift,
    DuckDb,
}

impl Dialect {
    /// Whether DISTKEY / SORTKEY / DISTSTYLE hints are emitted.
    pub fn physical_hints(self) -> bool {
        matches!(self, Dialect::Redshift)
    }

    /// Expression turning an epoch-millisecond column into a timestamp.
    pub fn epoch_millis_to_timestamp(self, column: &str) -> String {
        match self {
            Dialect::Redshift => {
                format!("(TIMESTAMP 'epoch' + {column} / 1000 * INTERVAL '1 second')")
            }
            Dialect::DuckDb => format!("epoch_ms({column})"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Redshift => "redshift",
            Dialect::DuckDb => "duckdb",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
