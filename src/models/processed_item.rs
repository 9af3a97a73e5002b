use crate::errors::AppResult;
use crate::schema::*;
use diesel::prelude::*;

#[derive(Debug, Queryable, Identifiable, PartialEq)]
#[diesel(table_name = processed_items)]
pub struct ProcessedItem {
    pub id: i32,
    pub feed_id: i32,
    pub item_fingerprint: String,
    pub processed_at: i32,
}

impl ProcessedItem {
    /// Records an item as delivered. `INSERT OR IGNORE` keeps this idempotent
    /// under crash-redelivery, so a duplicate fingerprint is not an error.
    pub fn mark(conn: &mut SqliteConnection, feed: i32, fingerprint: &str) -> AppResult<()> {
        use crate::schema::processed_items::dsl::*;
        diesel::insert_or_ignore_into(processed_items)
            .values((
                feed_id.eq(feed),
                item_fingerprint.eq(fingerprint),
                processed_at.eq(crate::db::now_epoch()),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn is_processed(conn: &mut SqliteConnection, feed: i32, fingerprint: &str) -> AppResult<bool> {
        use crate::schema::processed_items::dsl::*;
        let found = diesel::select(diesel::dsl::exists(
            processed_items
                .filter(feed_id.eq(feed))
                .filter(item_fingerprint.eq(fingerprint)),
        ))
        .get_result::<bool>(conn)?;
        Ok(found)
    }

    pub fn count_for_feed(conn: &mut SqliteConnection, feed: i32) -> AppResult<i64> {
        use crate::schema::processed_items::dsl::*;
        let count = processed_items
            .filter(feed_id.eq(feed))
            .count()
            .get_result(conn)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{get_test_db_connection, insert_test_feed};

    #[test]
    fn test_mark_is_idempotent() {
        let mut conn = get_test_db_connection();
        let feed = insert_test_feed(&mut conn, "https://example.com/feed.xml");

        ProcessedItem::mark(&mut conn, feed.id, "fp-1").unwrap();
        ProcessedItem::mark(&mut conn, feed.id, "fp-1").unwrap();

        assert_eq!(ProcessedItem::count_for_feed(&mut conn, feed.id).unwrap(), 1);
        assert!(ProcessedItem::is_processed(&mut conn, feed.id, "fp-1").unwrap());
        assert!(!ProcessedItem::is_processed(&mut conn, feed.id, "fp-2").unwrap());
    }

    #[test]
    fn test_rows_cascade_with_feed() {
        let mut conn = get_test_db_connection();
        let feed = insert_test_feed(&mut conn, "https://example.com/feed.xml");
        ProcessedItem::mark(&mut conn, feed.id, "fp-1").unwrap();

        {
            use crate::schema::feeds::dsl::*;
            diesel::delete(feeds.find(feed.id)).execute(&mut conn).unwrap();
        }

        assert_eq!(ProcessedItem::count_for_feed(&mut conn, feed.id).unwrap(), 0);
    }
}
