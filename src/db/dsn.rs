//! Connection string handling.
//!
//! Dialect adapters hand over connection strings in the format their users know:
//! libpq key/value or URLs for PostgreSQL, go-sql-driver DSNs or URLs for MySQL, plain
//! paths for SQLite. sqlx only understands URLs, so every string is normalized here
//! before it reaches a driver.

use crate::error::{DbError, DbResult};
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Presence of this key selects the native pool path for PostgreSQL-family dialects.
pub const POOL_MARKER: &str = "pool_min_conns=";

const POOL_PARAM_PREFIX: &str = "pool_";
const POOL_MIN_CONNS: &str = "pool_min_conns";
const POOL_MAX_CONNS: &str = "pool_max_conns";
const POOL_MAX_CONN_LIFETIME: &str = "pool_max_conn_lifetime";
const POOL_MAX_CONN_IDLE_TIME: &str = "pool_max_conn_idle_time";

/// Check whether a connection string asks for native pool semantics.
pub fn has_pool_marker(dsn: &str) -> bool {
    dsn.contains(POOL_MARKER)
}

/// Native pool sizing carried inside a PostgreSQL connection string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativePoolParams {
    pub min_conns: Option<u32>,
    pub max_conns: Option<u32>,
    pub max_conn_lifetime: Option<Duration>,
    pub max_conn_idle_time: Option<Duration>,
}

/// Remove every `pool_*` query parameter from `url` and return the recognized ones.
///
/// Pool parameters configure the client-side pool and must never be forwarded to the
/// server as runtime parameters.
pub fn take_native_pool_params(url: &mut Url) -> DbResult<NativePoolParams> {
    let mut params = NativePoolParams::default();
    let mut remaining: Vec<(String, String)> = Vec::new();

    for (key, value) in url.query_pairs() {
        let key_lower = key.to_ascii_lowercase();
        if !key_lower.starts_with(POOL_PARAM_PREFIX) {
            remaining.push((key.into_owned(), value.into_owned()));
            continue;
        }

        match key_lower.as_str() {
            POOL_MIN_CONNS => params.min_conns = Some(parse_count(&key_lower, &value)?),
            POOL_MAX_CONNS => params.max_conns = Some(parse_count(&key_lower, &value)?),
            POOL_MAX_CONN_LIFETIME => {
                params.max_conn_lifetime = Some(parse_pool_duration(&key_lower, &value)?)
            }
            POOL_MAX_CONN_IDLE_TIME => {
                params.max_conn_idle_time = Some(parse_pool_duration(&key_lower, &value)?)
            }
            _ => debug!(param = %key_lower, "Ignoring unsupported native pool parameter"),
        }
    }

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }

    if let (Some(min), Some(max)) = (params.min_conns, params.max_conns) {
        if min > max {
            return Err(DbError::invalid_connection_string(format!(
                "{POOL_MIN_CONNS} ({min}) cannot exceed {POOL_MAX_CONNS} ({max})"
            )));
        }
    }

    Ok(params)
}

fn parse_count(key: &str, value: &str) -> DbResult<u32> {
    value.trim().parse().map_err(|_| {
        DbError::invalid_connection_string(format!("cannot parse {key}: '{value}'"))
    })
}

fn parse_pool_duration(key: &str, value: &str) -> DbResult<Duration> {
    parse_duration(value).ok_or_else(|| {
        DbError::invalid_connection_string(format!("cannot parse {key}: '{value}'"))
    })
}

/// Normalize a PostgreSQL or CockroachDB connection string into a `postgres://` URL.
///
/// Accepts URLs (`postgres`, `postgresql`, `cockroach`, `cockroachdb` schemes) and
/// libpq key/value strings such as `host=x dbname=y password='a b'`.
pub fn postgres_url(dsn: &str) -> DbResult<Url> {
    let dsn = dsn.trim();

    if dsn.contains("://") {
        let mut url = Url::parse(dsn).map_err(|e| {
            DbError::invalid_connection_string(format!("Invalid PostgreSQL URL: {e}"))
        })?;
        match url.scheme() {
            "postgres" | "postgresql" => {}
            "cockroach" | "cockroachdb" => set_scheme(&mut url, "postgres")?,
            other => {
                return Err(DbError::invalid_connection_string(format!(
                    "Unexpected scheme '{other}' for a PostgreSQL connection"
                )));
            }
        }
        return Ok(url);
    }

    let mut url = base_url("postgres://localhost")?;
    for (key, value) in parse_key_values(dsn)? {
        match key.as_str() {
            // Unix socket directories are passed through as a query parameter
            "host" if !value.starts_with('/') => set_host(&mut url, &value)?,
            "port" => set_port(&mut url, &value)?,
            "user" => url
                .set_username(&value)
                .map_err(|_| DbError::invalid_connection_string("cannot set user"))?,
            "password" => url
                .set_password(Some(&value))
                .map_err(|_| DbError::invalid_connection_string("cannot set password"))?,
            "dbname" => url.set_path(&format!("/{value}")),
            _ => {
                url.query_pairs_mut().append_pair(&key, &value);
            }
        }
    }
    Ok(url)
}

/// Normalize a MySQL or MariaDB connection string into a `mysql://` URL.
///
/// Accepts URLs (`mysql`, `mariadb` schemes) and go-sql-driver DSNs of the form
/// `[user[:password]@][net[(addr)]]/dbname[?param=value&...]`.
pub fn mysql_url(dsn: &str) -> DbResult<Url> {
    let dsn = dsn.trim();

    if dsn.contains("://") {
        let mut url = Url::parse(dsn).map_err(|e| {
            DbError::invalid_connection_string(format!("Invalid MySQL URL: {e}"))
        })?;
        match url.scheme() {
            "mysql" => {}
            "mariadb" => set_scheme(&mut url, "mysql")?,
            other => {
                return Err(DbError::invalid_connection_string(format!(
                    "Unexpected scheme '{other}' for a MySQL connection"
                )));
            }
        }
        return Ok(url);
    }

    let (head, tail) = dsn.rsplit_once('/').ok_or_else(|| {
        DbError::invalid_connection_string("MySQL DSN is missing the '/dbname' part")
    })?;
    let (database, params) = match tail.split_once('?') {
        Some((database, params)) => (database, Some(params)),
        None => (tail, None),
    };
    let (credentials, address) = match head.rsplit_once('@') {
        Some((credentials, address)) => (Some(credentials), address),
        None => (None, head),
    };

    let mut url = base_url("mysql://localhost")?;

    if let Some(credentials) = credentials {
        let (user, password) = match credentials.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (credentials, None),
        };
        url.set_username(user)
            .map_err(|_| DbError::invalid_connection_string("cannot set user"))?;
        url.set_password(password)
            .map_err(|_| DbError::invalid_connection_string("cannot set password"))?;
    }

    let mut socket = None;
    if let Some((network, rest)) = address.split_once('(') {
        let addr = rest.strip_suffix(')').ok_or_else(|| {
            DbError::invalid_connection_string("MySQL DSN address is missing ')'")
        })?;
        match network {
            "tcp" | "tcp4" | "tcp6" => set_host_port(&mut url, addr)?,
            "unix" => socket = Some(addr),
            other => {
                return Err(DbError::invalid_connection_string(format!(
                    "Unsupported MySQL network '{other}'"
                )));
            }
        }
    }

    url.set_path(&format!("/{database}"));
    url.set_query(params.filter(|p| !p.is_empty()));
    if let Some(socket) = socket {
        url.query_pairs_mut().append_pair("socket", socket);
    }
    Ok(url)
}

/// Normalize a SQLite path or URL into a `sqlite:` URL string.
pub fn sqlite_url(dsn: &str) -> String {
    let dsn = dsn.trim();
    if dsn.starts_with("sqlite:") {
        return dsn.to_string();
    }
    if let Some(rest) = dsn.strip_prefix("sqlite3:") {
        return format!("sqlite:{rest}");
    }
    let path = dsn.strip_prefix("file:").unwrap_or(dsn);
    format!("sqlite:{path}")
}

/// Parse a duration such as `1h30m`, `90s` or `250ms`, or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).ok()
}

/// Get a display-safe version of a connection string (password masked).
pub fn mask_connection_string(dsn: &str) -> String {
    if dsn.contains("://") {
        if let Ok(url) = Url::parse(dsn) {
            return mask_url(url);
        }
    } else if let Some(pairs) = key_value_pairs(dsn) {
        return pairs
            .iter()
            .map(|(key, value)| {
                if key.eq_ignore_ascii_case("password") {
                    format!("{key}=****")
                } else {
                    format!("{key}={}", quote_value(value))
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
    }

    // user:password@address
    if let Some(at_pos) = dsn.rfind('@') {
        if let Some(colon_pos) = dsn[..at_pos].find(':') {
            return format!("{}****{}", &dsn[..colon_pos + 1], &dsn[at_pos..]);
        }
    }

    // Anything after a password key that could not be parsed is dropped.
    if let Some(start) = dsn.to_ascii_lowercase().find("password") {
        return format!("{}****", &dsn[..start]);
    }
    dsn.to_string()
}

fn mask_url(mut url: Url) -> String {
    if url.password().is_some() && url.set_password(Some("****")).is_err() {
        return "****".to_string();
    }

    let has_password_param = url
        .query_pairs()
        .any(|(k, _)| k.eq_ignore_ascii_case("password"));
    if has_password_param {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let v = if k.eq_ignore_ascii_case("password") {
                    "****".to_string()
                } else {
                    v.into_owned()
                };
                (k.into_owned(), v)
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

/// Pairs of a libpq key/value string, or `None` if `dsn` is not one.
fn key_value_pairs(dsn: &str) -> Option<Vec<(String, String)>> {
    let pairs = parse_key_values(dsn).ok()?;
    let is_key = |key: &str| key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    (!pairs.is_empty() && pairs.iter().all(|(key, _)| is_key(key))).then_some(pairs)
}

fn quote_value(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && !value.contains(|c: char| c.is_whitespace() || c == '\'' || c == '\\');
    if plain {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!(
            "'{}'",
            value.replace('\\', "\\\\").replace('\'', "\\'")
        ))
    }
}

/// Split a libpq key/value connection string into pairs.
fn parse_key_values(dsn: &str) -> DbResult<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = dsn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(DbError::invalid_connection_string(format!(
                "missing '=' after key '{key}'"
            )));
        }
        if key.is_empty() {
            return Err(DbError::invalid_connection_string("empty key"));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => break,
                    },
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(DbError::invalid_connection_string(format!(
                            "unterminated quoted value for '{key}'"
                        )));
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

fn base_url(base: &str) -> DbResult<Url> {
    Url::parse(base).map_err(|e| DbError::internal(format!("invalid base URL {base}: {e}")))
}

fn set_scheme(url: &mut Url, scheme: &str) -> DbResult<()> {
    url.set_scheme(scheme).map_err(|_| {
        DbError::invalid_connection_string(format!("cannot rewrite scheme to '{scheme}'"))
    })
}

fn set_host(url: &mut Url, host: &str) -> DbResult<()> {
    url.set_host(Some(host)).map_err(|e| {
        DbError::invalid_connection_string(format!("invalid host '{host}': {e}"))
    })
}

fn set_port(url: &mut Url, port: &str) -> DbResult<()> {
    let port: u16 = port
        .parse()
        .map_err(|_| DbError::invalid_connection_string(format!("invalid port '{port}'")))?;
    url.set_port(Some(port))
        .map_err(|_| DbError::invalid_connection_string("cannot set port"))
}

fn set_host_port(url: &mut Url, addr: &str) -> DbResult<()> {
    if addr.is_empty() {
        return Ok(());
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !addr.ends_with(']') => {
            set_host(url, host)?;
            set_port(url, port)
        }
        _ => set_host(url, addr),
    }
}
