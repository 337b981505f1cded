use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use super::{optional, Database, DbError, Result};

/// A time-limited download URL together with the instant it stops working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl SignedUrl {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct Photo {
    pub id: i64,
    /// Object store key of the original upload.
    pub name: String,
    pub caption: Option<String>,
    pub signed_url: Option<SignedUrl>,
    pub thumbnail_url: Option<SignedUrl>,
    pub snapped_at: Option<NaiveDateTime>,
}

/// Everything the pipeline knows about a photo at its commit point.
#[derive(Debug, Clone)]
pub struct NewPhoto<'a> {
    pub name: &'a str,
    pub caption: &'a str,
    pub signed_url: &'a SignedUrl,
    pub thumbnail_url: &'a SignedUrl,
    pub snapped_at: Option<NaiveDateTime>,
}

const PHOTO_COLUMNS: &str = "id, name, caption, signed_url, signed_url_expire_time, \
     tb_signed_url, tb_signed_url_expire_time, snapped_at";

fn row_to_photo(row: &rusqlite::Row) -> rusqlite::Result<Photo> {
    let signed_url = pair(row.get(3)?, row.get(4)?);
    let thumbnail_url = pair(row.get(5)?, row.get(6)?);
    Ok(Photo {
        id: row.get(0)?,
        name: row.get(1)?,
        caption: row.get(2)?,
        signed_url,
        thumbnail_url,
        snapped_at: row.get(7)?,
    })
}

fn pair(url: Option<String>, expires_at: Option<DateTime<Utc>>) -> Option<SignedUrl> {
    match (url, expires_at) {
        (Some(url), Some(expires_at)) if !url.is_empty() => Some(SignedUrl { url, expires_at }),
        _ => None,
    }
}

impl Database {
    /// Insert the photo and its caption-seeded diary in one transaction.
    /// Returns `(photo_id, diary_id)`.
    pub fn insert_photo_with_diary(
        &self,
        photo: &NewPhoto,
        diary_content: &str,
    ) -> Result<(i64, i64)> {
        let tx = self.immediate_transaction()?;

        self.conn.execute(
            r#"
            INSERT INTO photos (
                name, caption, signed_url, signed_url_expire_time,
                tb_signed_url, tb_signed_url_expire_time, snapped_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                photo.name,
                photo.caption,
                photo.signed_url.url,
                photo.signed_url.expires_at,
                photo.thumbnail_url.url,
                photo.thumbnail_url.expires_at,
                photo.snapped_at,
            ],
        )?;
        let photo_id = self.conn.last_insert_rowid();
        let diary_id = self.insert_diary(photo_id, Some(diary_content))?;

        tx.commit()?;
        Ok((photo_id, diary_id))
    }

    pub fn get_photo(&self, photo_id: i64) -> Result<Option<Photo>> {
        let sql = format!("SELECT {} FROM photos WHERE id = ?", PHOTO_COLUMNS);
        optional(self.conn.query_row(&sql, [photo_id], row_to_photo))
    }

    pub fn update_signed_url(&self, photo_id: i64, signed: &SignedUrl) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE photos SET signed_url = ?, signed_url_expire_time = ? WHERE id = ?",
            rusqlite::params![signed.url, signed.expires_at, photo_id],
        )?;
        if changed == 0 {
            return Err(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(())
    }

    pub fn update_thumbnail_url(&self, photo_id: i64, signed: &SignedUrl) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE photos SET tb_signed_url = ?, tb_signed_url_expire_time = ? WHERE id = ?",
            rusqlite::params![signed.url, signed.expires_at, photo_id],
        )?;
        if changed == 0 {
            return Err(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(())
    }

    /// Newest first.
    pub fn list_photos(&self, limit: usize, offset: usize) -> Result<Vec<Photo>> {
        let sql = format!(
            "SELECT {} FROM photos ORDER BY id DESC LIMIT ? OFFSET ?",
            PHOTO_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let photos = stmt
            .query_map(rusqlite::params![limit as i64, offset as i64], row_to_photo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }

    pub fn count_photos(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Photos associated with a category, newest first.
    pub fn photos_in_category(
        &self,
        category_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Photo>> {
        let columns = PHOTO_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {}
            FROM photos p
            JOIN photo_categories pc ON pc.photo_id = p.id
            WHERE pc.category_id = ?
            ORDER BY p.id DESC
            LIMIT ? OFFSET ?
            "#,
            columns
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let photos = stmt
            .query_map(
                rusqlite::params![category_id, limit as i64, offset as i64],
                row_to_photo,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(photos)
    }

    pub fn count_photos_in_category(&self, category_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM photo_categories WHERE category_id = ?",
            [category_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn signed(url: &str) -> SignedUrl {
        SignedUrl {
            url: url.to_string(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_insert_photo_with_diary_round_trip() {
        let db = test_db();
        let primary = signed("https://signed.test/a");
        let thumb = signed("https://signed.test/thumbnail/a");
        let snapped = NaiveDate::from_ymd_opt(2023, 5, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();

        let (photo_id, diary_id) = db
            .insert_photo_with_diary(
                &NewPhoto {
                    name: "a",
                    caption: "잔디 위의 개",
                    signed_url: &primary,
                    thumbnail_url: &thumb,
                    snapped_at: Some(snapped),
                },
                "잔디 위의 개",
            )
            .unwrap();

        let photo = db.get_photo(photo_id).unwrap().unwrap();
        assert_eq!(photo.name, "a");
        assert_eq!(photo.caption.as_deref(), Some("잔디 위의 개"));
        assert_eq!(photo.signed_url, Some(primary));
        assert_eq!(photo.thumbnail_url, Some(thumb));
        assert_eq!(photo.snapped_at, Some(snapped));

        let diary = db.find_diary_by_photo(photo_id).unwrap().unwrap();
        assert_eq!(diary.id, diary_id);
        assert_eq!(diary.content.as_deref(), Some("잔디 위의 개"));
    }

    #[test]
    fn test_duplicate_name_rolls_back_whole_insert() {
        let db = test_db();
        let url = signed("https://signed.test/a");
        let photo = NewPhoto {
            name: "a",
            caption: "c",
            signed_url: &url,
            thumbnail_url: &url,
            snapped_at: None,
        };

        db.insert_photo_with_diary(&photo, "c").unwrap();
        assert!(db.insert_photo_with_diary(&photo, "c").is_err());

        assert_eq!(db.count_photos().unwrap(), 1);
        let diaries: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM diaries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(diaries, 1);
    }

    #[test]
    fn test_update_signed_url_replaces_both_halves() {
        let db = test_db();
        let url = signed("https://signed.test/old");
        let (photo_id, _) = db
            .insert_photo_with_diary(
                &NewPhoto {
                    name: "a",
                    caption: "c",
                    signed_url: &url,
                    thumbnail_url: &url,
                    snapped_at: None,
                },
                "c",
            )
            .unwrap();

        let fresh = SignedUrl {
            url: "https://signed.test/new".to_string(),
            expires_at: url.expires_at + Duration::minutes(5),
        };
        db.update_signed_url(photo_id, &fresh).unwrap();

        let photo = db.get_photo(photo_id).unwrap().unwrap();
        assert_eq!(photo.signed_url, Some(fresh));
        assert_eq!(photo.thumbnail_url, Some(url));
    }

    #[test]
    fn test_update_missing_photo_fails() {
        let db = test_db();
        assert!(db.update_thumbnail_url(42, &signed("https://x")).is_err());
    }

    #[test]
    fn test_missing_photo_is_none() {
        let db = test_db();
        assert!(db.get_photo(7).unwrap().is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let url = signed("https://x");
        assert!(!url.is_expired_at(url.expires_at - Duration::seconds(1)));
        assert!(url.is_expired_at(url.expires_at));
    }
}
