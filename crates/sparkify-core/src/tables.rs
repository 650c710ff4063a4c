//! Table catalog: the two staging tables and the five star-schema tables,
//! declared once as data and rendered to DDL per [`Dialect`].
//!
//! Creation order is staging first, then dimensions, then the fact table.
//! Distribution and sort keys are Redshift layout hints only; DuckDB ignores
//! them. The songplay surrogate key is `IDENTITY(0, 1)` on Redshift and a
//! sequence-backed default on DuckDB.
//!
//! Primary keys are informational on Redshift: inserting a key twice stores
//! two rows. DuckDB enforces them, so populating the dimensions a second time
//! without recreating the schema fails with a constraint error instead. Only
//! `songplay`, keyed by its generated id, accepts a second load on both.

use crate::dialect::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Varchar(u32),
    Text,
    Integer,
    BigInt,
    Real,
    Double,
}

impl ColumnType {
    pub fn render(self, dialect: Dialect) -> String {
        match (self, dialect) {
            (ColumnType::Varchar(n), _) => format!("VARCHAR({n})"),
            (ColumnType::Text, Dialect::Redshift) => "TEXT".to_string(),
            (ColumnType::Text, Dialect::DuckDb) => "VARCHAR".to_string(),
            (ColumnType::Integer, _) => "INTEGER".to_string(),
            (ColumnType::BigInt, _) => "BIGINT".to_string(),
            (ColumnType::Real, _) => "REAL".to_string(),
            (ColumnType::Double, Dialect::Redshift) => "DOUBLE PRECISION".to_string(),
            (ColumnType::Double, Dialect::DuckDb) => "DOUBLE".to_string(),
        }
    }

    /// Maximum character length for bounded text columns.
    pub fn max_chars(self) -> Option<usize> {
        match self {
            ColumnType::Varchar(n) => Some(n as usize),
            _ => None,
        }
    }

    pub fn is_textual(self) -> bool {
        matches!(self, ColumnType::Varchar(_) | ColumnType::Text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub not_null: bool,
    pub primary_key: bool,
    /// Auto-incrementing surrogate key.
    pub identity: bool,
    pub dist_key: bool,
    pub sort_key: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        ty,
        not_null: false,
        primary_key: false,
        identity: false,
        dist_key: false,
        sort_key: false,
    }
}

impl ColumnDef {
    const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    const fn dist_key(mut self) -> Self {
        self.dist_key = true;
        self
    }

    const fn sort_key(mut self) -> Self {
        self.sort_key = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Staging,
    Dimension,
    Fact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub kind: TableKind,
    pub columns: &'static [ColumnDef],
    /// Replicate the whole table on every node (`DISTSTYLE ALL`).
    pub diststyle_all: bool,
}

impl TableDef {
    /// Table name as it appears in SQL. Always quoted: `time` is a keyword.
    pub fn ident(&self) -> String {
        format!("\"{}\"", self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn identity_sequence(&self, column: &ColumnDef) -> String {
        format!("{}_{}_seq", self.name, column.name)
    }

    pub fn drop_statements(&self, dialect: Dialect) -> Vec<String> {
        let mut statements = vec![format!("DROP TABLE IF EXISTS {}", self.ident())];
        if dialect == Dialect::DuckDb {
            for column in self.columns.iter().filter(|c| c.identity) {
                statements.push(format!(
                    "DROP SEQUENCE IF EXISTS {}",
                    self.identity_sequence(column)
                ));
            }
        }
        statements
    }

    pub fn create_statements(&self, dialect: Dialect) -> Vec<String> {
        let mut statements = Vec::new();
        let mut lines = Vec::with_capacity(self.columns.len());

        for column in self.columns {
            let mut line = format!("    {} {}", column.name, column.ty.render(dialect));
            if column.identity {
                match dialect {
                    Dialect::Redshift => line.push_str(" IDENTITY(0, 1)"),
                    Dialect::DuckDb => {
                        let sequence = self.identity_sequence(column);
                        statements.push(format!("CREATE SEQUENCE {sequence} START 1"));
                        line.push_str(&format!(" DEFAULT nextval('{sequence}')"));
                    }
                }
            }
            if column.not_null {
                line.push_str(" NOT NULL");
            }
            if column.primary_key {
                line.push_str(" PRIMARY KEY");
            }
            if dialect.physical_hints() {
                if column.dist_key {
                    line.push_str(" DISTKEY");
                }
                if column.sort_key {
                    line.push_str(" SORTKEY");
                }
            }
            lines.push(line);
        }

        let mut create = format!("CREATE TABLE {} (\n{}\n)", self.ident(), lines.join(",\n"));
        if self.diststyle_all && dialect.physical_hints() {
            create.push_str("\nDISTSTYLE ALL");
        }
        statements.push(create);
        statements
    }
}

pub const STAGING_EVENTS: TableDef = TableDef {
    name: "staging_events",
    kind: TableKind::Staging,
    columns: &[
        col("artist", ColumnType::Varchar(1024)),
        col("auth", ColumnType::Varchar(1024)),
        col("firstName", ColumnType::Varchar(1024)),
        col("gender", ColumnType::Varchar(1024)),
        col("itemInSession", ColumnType::Integer),
        col("lastName", ColumnType::Varchar(1024)),
        col("length", ColumnType::Real),
        col("level", ColumnType::Varchar(1024)),
        col("location", ColumnType::Varchar(1024)),
        col("method", ColumnType::Varchar(1024)),
        col("page", ColumnType::Varchar(1024)).sort_key(),
        col("registration", ColumnType::Double),
        col("sessionId", ColumnType::Integer),
        col("song", ColumnType::Varchar(1024)).dist_key(),
        col("status", ColumnType::Integer),
        col("ts", ColumnType::BigInt),
        col("userAgent", ColumnType::Varchar(65535)),
        col("userId", ColumnType::Varchar(1024)),
    ],
    diststyle_all: false,
};

pub const STAGING_SONGS: TableDef = TableDef {
    name: "staging_songs",
    kind: TableKind::Staging,
    columns: &[
        col("num_songs", ColumnType::Integer),
        col("artist_id", ColumnType::Varchar(1024)),
        col("artist_latitude", ColumnType::Real),
        col("artist_longitude", ColumnType::Real),
        col("artist_location", ColumnType::Varchar(1024)),
        col("artist_name", ColumnType::Varchar(1024)),
        col("song_id", ColumnType::Varchar(1024)),
        col("title", ColumnType::Varchar(1024)).dist_key(),
        col("duration", ColumnType::Real),
        col("year", ColumnType::Varchar(1024)),
    ],
    diststyle_all: false,
};

pub const USERS: TableDef = TableDef {
    name: "users",
    kind: TableKind::Dimension,
    columns: &[
        col("user_id", ColumnType::Text)
            .not_null()
            .primary_key()
            .dist_key(),
        col("first_name", ColumnType::Text),
        col("last_name", ColumnType::Text),
        col("gender", ColumnType::Text),
        col("level", ColumnType::Text),
    ],
    diststyle_all: false,
};

pub const SONGS: TableDef = TableDef {
    name: "songs",
    kind: TableKind::Dimension,
    columns: &[
        col("song_id", ColumnType::Text)
            .not_null()
            .primary_key()
            .dist_key(),
        col("title", ColumnType::Text),
        col("artist_id", ColumnType::Text),
        col("year", ColumnType::Integer),
        col("duration", ColumnType::Double),
    ],
    diststyle_all: false,
};

pub const ARTISTS: TableDef = TableDef {
    name: "artists",
    kind: TableKind::Dimension,
    columns: &[
        col("artist_id", ColumnType::Text).not_null().primary_key(),
        col("name", ColumnType::Text),
        col("location", ColumnType::Text),
        col("latitude", ColumnType::Double),
        col("longitude", ColumnType::Double),
    ],
    diststyle_all: true,
};

pub const TIME: TableDef = TableDef {
    name: "time",
    kind: TableKind::Dimension,
    columns: &[
        col("start_time", ColumnType::BigInt).primary_key(),
        col("hour", ColumnType::Integer),
        col("day", ColumnType::Integer),
        col("week", ColumnType::Integer),
        col("month", ColumnType::Integer),
        col("year", ColumnType::Integer),
        col("weekday", ColumnType::Integer),
    ],
    diststyle_all: true,
};

pub const SONGPLAY: TableDef = TableDef {
    name: "songplay",
    kind: TableKind::Fact,
    columns: &[
        col("songplay_id", ColumnType::BigInt)
            .identity()
            .not_null()
            .primary_key(),
        col("start_time", ColumnType::BigInt),
        col("user_id", ColumnType::Text).dist_key(),
        col("level", ColumnType::Text),
        col("song_id", ColumnType::Text),
        col("artist_id", ColumnType::Text),
        col("session_id", ColumnType::Integer),
        col("location", ColumnType::Text).sort_key(),
        col("user_agent", ColumnType::Text),
    ],
    diststyle_all: false,
};

/// All tables in creation order.
pub const ALL_TABLES: [&TableDef; 7] = [
    &STAGING_EVENTS,
    &STAGING_SONGS,
    &USERS,
    &SONGS,
    &ARTISTS,
    &TIME,
    &SONGPLAY,
];

pub fn table_names() -> impl Iterator<Item = &'static str> {
    ALL_TABLES.iter().map(|t| t.name)
}
