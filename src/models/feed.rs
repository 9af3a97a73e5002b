use super::formatting_profile::FormattingProfile;
use super::proxy::Proxy;
use crate::db::now_epoch;
use crate::errors::AppResult;
use crate::schema::*;
use diesel::prelude::*;
use serde::Serialize;

#[derive(Debug, Serialize, Queryable, Identifiable, PartialEq, Clone)]
#[diesel(table_name = feeds)]
pub struct Feed {
    pub id: i32,
    pub url: String,
    pub user_title: Option<String>,
    pub frequency_seconds: i32,
    pub bot_id: Option<i32>,
    /// Numeric chat id or @channel handle; parsed at dispatch time.
    pub chat_id: String,
    pub last_processed_item_hash: Option<String>,
    /// Epoch seconds of the last fetch attempt that reached the server.
    pub last_fetched_at: Option<i32>,
    pub proxy_id: Option<i32>,
    pub formatting_profile_id: Option<i32>,
    pub enabled: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub created_at: i32,
    pub updated_at: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = feeds)]
pub struct NewFeed<'a> {
    pub url: &'a str,
    pub user_title: Option<&'a str>,
    pub frequency_seconds: i32,
    pub bot_id: Option<i32>,
    pub chat_id: &'a str,
    pub proxy_id: Option<i32>,
    pub formatting_profile_id: Option<i32>,
    pub enabled: bool,
}

/// A feed row together with its joined proxy and formatting profile, as the
/// worker consumes it. The row is the source of truth; scheduler snapshots
/// older than the run are discarded in favor of this.
#[derive(Debug, Clone)]
pub struct FeedContext {
    pub feed: Feed,
    pub proxy: Option<Proxy>,
    pub profile: Option<FormattingProfile>,
}

impl<'a> NewFeed<'a> {
    pub fn insert(&self, conn: &mut SqliteConnection) -> AppResult<Feed> {
        use crate::schema::feeds::dsl::*;
        let feed = diesel::insert_into(feeds).values(self).get_result(conn)?;
        Ok(feed)
    }
}

impl Feed {
    pub fn get_by_id(conn: &mut SqliteConnection, feed_id: i32) -> AppResult<Option<Feed>> {
        use crate::schema::feeds::dsl::*;
        let feed = feeds.find(feed_id).first::<Feed>(conn).optional()?;
        Ok(feed)
    }

    pub fn get_all(conn: &mut SqliteConnection) -> AppResult<Vec<Feed>> {
        use crate::schema::feeds::dsl::*;
        let found = feeds.order(id.asc()).load::<Feed>(conn)?;
        Ok(found)
    }

    pub fn get_enabled(conn: &mut SqliteConnection) -> AppResult<Vec<Feed>> {
        use crate::schema::feeds::dsl::*;
        let found = feeds.filter(enabled.eq(true)).order(id.asc()).load(conn)?;
        Ok(found)
    }

    /// Reloads the feed with its related rows for one worker run.
    pub fn load_context(conn: &mut SqliteConnection, feed_id: i32) -> AppResult<Option<FeedContext>> {
        let feed = match Feed::get_by_id(conn, feed_id)? {
            Some(feed) => feed,
            None => return Ok(None),
        };
        let proxy = match feed.proxy_id {
            Some(pid) => Proxy::get_by_id(conn, pid)?,
            None => None,
        };
        let profile = match feed.formatting_profile_id {
            Some(fid) => FormattingProfile::get_by_id(conn, fid)?,
            None => None,
        };
        Ok(Some(FeedContext { feed, proxy, profile }))
    }

    /// Records a fetch that produced no new content (304). Cache headers and
    /// `last_fetched_at` move together in one statement;
    /// `last_processed_item_hash` is untouched.
    pub fn mark_fetched(
        conn: &mut SqliteConnection,
        feed_id: i32,
        new_etag: Option<&str>,
        new_last_modified: Option<&str>,
    ) -> AppResult<()> {
        use crate::schema::feeds::dsl::*;
        let now = now_epoch();
        diesel::update(feeds.find(feed_id))
            .set((
                etag.eq(new_etag),
                last_modified.eq(new_last_modified),
                last_fetched_at.eq(Some(now)),
                updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Records delivery progress after a fetch with content: cache headers,
    /// `last_fetched_at`, and the high-water / last-delivered fingerprint.
    pub fn mark_progress(
        conn: &mut SqliteConnection,
        feed_id: i32,
        item_hash: Option<&str>,
        new_etag: Option<&str>,
        new_last_modified: Option<&str>,
    ) -> AppResult<()> {
        use crate::schema::feeds::dsl::*;
        let now = now_epoch();
        diesel::update(feeds.find(feed_id))
            .set((
                last_processed_item_hash.eq(item_hash),
                etag.eq(new_etag),
                last_modified.eq(new_last_modified),
                last_fetched_at.eq(Some(now)),
                updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn display_title(&self) -> &str {
        match self.user_title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => &self.url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{get_test_db_connection, insert_test_feed};

    #[test]
    fn test_mark_fetched_keeps_hash() {
        let mut conn = get_test_db_connection();
        let feed = insert_test_feed(&mut conn, "https://example.com/feed.xml");

        Feed::mark_progress(&mut conn, feed.id, Some("hash-1"), Some("e1"), None).unwrap();
        Feed::mark_fetched(&mut conn, feed.id, Some("e1"), None).unwrap();

        let reloaded = Feed::get_by_id(&mut conn, feed.id).unwrap().unwrap();
        assert_eq!(reloaded.last_processed_item_hash.as_deref(), Some("hash-1"));
        assert_eq!(reloaded.etag.as_deref(), Some("e1"));
        assert!(reloaded.last_fetched_at.is_some());
    }

    #[test]
    fn test_mark_progress_clears_dropped_headers() {
        let mut conn = get_test_db_connection();
        let feed = insert_test_feed(&mut conn, "https://example.com/feed.xml");

        Feed::mark_progress(&mut conn, feed.id, Some("h"), Some("e1"), Some("lm")).unwrap();
        Feed::mark_progress(&mut conn, feed.id, Some("h"), None, None).unwrap();

        let reloaded = Feed::get_by_id(&mut conn, feed.id).unwrap().unwrap();
        assert_eq!(reloaded.etag, None);
        assert_eq!(reloaded.last_modified, None);
    }

    #[test]
    fn test_load_context_missing_feed() {
        let mut conn = get_test_db_connection();
        assert!(Feed::load_context(&mut conn, 999).unwrap().is_none());
    }
}
