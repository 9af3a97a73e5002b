use crate::errors::{AppError, AppResult};
use crate::schema::*;
use diesel::{
    deserialize::{self, FromSql},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
    AsExpression, FromSqlRow,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, Queryable, Identifiable, PartialEq, Clone)]
#[diesel(table_name = proxies)]
pub struct Proxy {
    pub id: i32,
    pub name: String,
    pub kind: ProxyKind,
    /// host:port
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_rss: bool,
    pub default_tg: bool,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Https,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5",
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyKind::Http),
            "https" => Ok(ProxyKind::Https),
            "socks5" => Ok(ProxyKind::Socks5),
            other => Err(AppError::invalid_input(
                "kind",
                &format!("'{other}' is not one of http, https, socks5"),
            )),
        }
    }
}

impl FromSql<Text, Sqlite> for ProxyKind {
    fn from_sql(bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Sqlite>>::from_sql(bytes)?.as_str() {
            "http" => Ok(ProxyKind::Http),
            "https" => Ok(ProxyKind::Https),
            "socks5" => Ok(ProxyKind::Socks5),
            _ => Err("Unrecognized proxy kind".into()),
        }
    }
}

impl ToSql<Text, Sqlite> for ProxyKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

/// Which half of the pipeline a default proxy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyPurpose {
    Rss,
    Telegram,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = proxies)]
pub struct NewProxy<'a> {
    pub name: &'a str,
    pub kind: ProxyKind,
    pub address: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub default_rss: bool,
    pub default_tg: bool,
}

impl<'a> NewProxy<'a> {
    pub fn insert(&self, conn: &mut SqliteConnection) -> AppResult<Proxy> {
        use crate::schema::proxies::dsl::*;
        let proxy = diesel::insert_into(proxies).values(self).get_result(conn)?;
        Ok(proxy)
    }
}

impl Proxy {
    pub fn get_by_id(conn: &mut SqliteConnection, proxy_id: i32) -> AppResult<Option<Proxy>> {
        use crate::schema::proxies::dsl::*;
        let proxy = proxies.find(proxy_id).first::<Proxy>(conn).optional()?;
        Ok(proxy)
    }

    pub fn get_all(conn: &mut SqliteConnection) -> AppResult<Vec<Proxy>> {
        use crate::schema::proxies::dsl::*;
        let found = proxies.order(name.asc()).load::<Proxy>(conn)?;
        Ok(found)
    }

    /// The proxy flagged as the default for the given purpose, if any.
    pub fn default_for(
        conn: &mut SqliteConnection,
        purpose: ProxyPurpose,
    ) -> AppResult<Option<Proxy>> {
        use crate::schema::proxies::dsl::*;
        let query = match purpose {
            ProxyPurpose::Rss => proxies.filter(default_rss.eq(true)).into_boxed(),
            ProxyPurpose::Telegram => proxies.filter(default_tg.eq(true)).into_boxed(),
        };
        let proxy = query.first::<Proxy>(conn).optional()?;
        Ok(proxy)
    }
}
