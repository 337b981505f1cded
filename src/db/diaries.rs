use super::{guard_unique, optional, Database, DbError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diary {
    pub id: i64,
    pub photo_id: i64,
    pub content: Option<String>,
}

impl Database {
    pub fn find_diary_by_photo(&self, photo_id: i64) -> Result<Option<Diary>> {
        optional(self.conn.query_row(
            "SELECT id, photo_id, content FROM diaries WHERE photo_id = ?",
            [photo_id],
            |row| {
                Ok(Diary {
                    id: row.get(0)?,
                    photo_id: row.get(1)?,
                    content: row.get(2)?,
                })
            },
        ))
    }

    pub(crate) fn insert_diary(&self, photo_id: i64, content: Option<&str>) -> Result<i64> {
        guard_unique(
            self.conn.execute(
                "INSERT INTO diaries (photo_id, content) VALUES (?, ?)",
                rusqlite::params![photo_id, content],
            ),
            "diary photo",
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Return the photo's diary, creating an empty one if it has none yet.
    ///
    /// Safe against concurrent callers on other connections: the write lock is
    /// taken before the lookup, and a unique-constraint conflict re-reads the
    /// winning row instead of failing.
    pub fn get_or_create_diary(&self, photo_id: i64) -> Result<Diary> {
        let tx = self.immediate_transaction()?;

        if let Some(diary) = self.find_diary_by_photo(photo_id)? {
            tx.commit()?;
            return Ok(diary);
        }

        let diary = self.create_diary(photo_id)?;
        tx.commit()?;
        Ok(diary)
    }

    /// Insert an empty diary the caller did not find. A uniqueness conflict
    /// returns the diary the other writer created.
    pub(crate) fn create_diary(&self, photo_id: i64) -> Result<Diary> {
        match self.insert_diary(photo_id, None) {
            Ok(id) => {
                tracing::debug!(photo_id, diary_id = id, "Created empty diary");
                Ok(Diary {
                    id,
                    photo_id,
                    content: None,
                })
            }
            Err(DbError::ConflictRetry(_)) => self
                .find_diary_by_photo(photo_id)?
                .ok_or(DbError::Vanished("diary")),
            Err(e) => Err(e),
        }
    }
}
