//! Dialect names, aliases and their canonical forms.
//!
//! The same canonical value picks the native driver and tells the handle which
//! placeholder style to emulate, so both consumers go through [`Dialect::canonicalize`].

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Write as _;

pub const NAME_POSTGRESQL: &str = "postgres";
pub const NAME_COCKROACH: &str = "cockroach";
pub const NAME_MYSQL: &str = "mysql";
pub const NAME_MARIADB: &str = "mariadb";
pub const NAME_SQLITE: &str = "sqlite3";

/// Supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    PostgreSQL,
    Cockroach,
    MySQL,
    MariaDB,
    SQLite,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Self::PostgreSQL,
        Self::Cockroach,
        Self::MySQL,
        Self::MariaDB,
        Self::SQLite,
    ];

    /// Map a dialect or driver name, aliases included, to its canonical dialect.
    ///
    /// Matching is case-insensitive. `None` means the name is not recognized.
    pub fn canonicalize(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" | "pgx" => Some(Self::PostgreSQL),
            "cockroach" | "cockroachdb" | "crdb" => Some(Self::Cockroach),
            "mysql" => Some(Self::MySQL),
            "mariadb" => Some(Self::MariaDB),
            "sqlite3" | "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Canonical name of this dialect.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => NAME_POSTGRESQL,
            Self::Cockroach => NAME_COCKROACH,
            Self::MySQL => NAME_MYSQL,
            Self::MariaDB => NAME_MARIADB,
            Self::SQLite => NAME_SQLITE,
        }
    }

    /// Driver family: Cockroach shares PostgreSQL's, MariaDB shares MySQL's.
    pub fn family(&self) -> DriverFamily {
        match self {
            Self::PostgreSQL | Self::Cockroach => DriverFamily::Postgres,
            Self::MySQL | Self::MariaDB => DriverFamily::MySql,
            Self::SQLite => DriverFamily::Sqlite,
        }
    }

    /// True for dialects that can be served from a native PostgreSQL pool.
    pub fn supports_native_pool(&self) -> bool {
        self.family() == DriverFamily::Postgres
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self.family() {
            DriverFamily::Postgres => PlaceholderStyle::Dollar,
            DriverFamily::MySql | DriverFamily::Sqlite => PlaceholderStyle::Question,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Group of dialects that share one low-level driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFamily {
    Postgres,
    MySql,
    Sqlite,
}

impl DriverFamily {
    /// Name used when deriving registry names for this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => NAME_POSTGRESQL,
            Self::MySql => NAME_MYSQL,
            Self::Sqlite => NAME_SQLITE,
        }
    }
}

impl std::fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bind parameter syntax expected by a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

impl PlaceholderStyle {
    /// Rewrite `?` bind markers into this style.
    ///
    /// Markers inside single-quoted literals and double-quoted identifiers are left alone.
    pub fn rebind<'q>(&self, query: &'q str) -> Cow<'q, str> {
        if *self == Self::Question || !query.contains('?') {
            return Cow::Borrowed(query);
        }

        let mut out = String::with_capacity(query.len() + 8);
        let mut quote: Option<char> = None;
        let mut position = 0usize;

        for c in query.chars() {
            match quote {
                Some(open) => {
                    if c == open {
                        quote = None;
                    }
                    out.push(c);
                }
                None => match c {
                    '\'' | '"' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '?' => {
                        position += 1;
                        let _ = write!(out, "${position}");
                    }
                    _ => out.push(c),
                },
            }
        }

        Cow::Owned(out)
    }
}
