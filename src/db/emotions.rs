//! Emotion tags. Written by a separate classification process; the upload
//! pipeline only reads them.

use serde::Serialize;

use super::{optional, Database, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Emotion {
    pub id: i64,
    pub name: String,
}

impl Database {
    pub fn get_emotion(&self, emotion_id: i64) -> Result<Option<Emotion>> {
        optional(self.conn.query_row(
            "SELECT id, name FROM emotions WHERE id = ?",
            [emotion_id],
            |row| {
                Ok(Emotion {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        ))
    }

    /// Emotion ids of a photo, in association order.
    pub fn emotion_ids_for_photo(&self, photo_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT emotion_id FROM photo_emotions WHERE photo_id = ? ORDER BY id")?;
        let ids = stmt
            .query_map([photo_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn create_emotion(&self, name: &str) -> Result<i64> {
        self.conn
            .execute("INSERT INTO emotions (name) VALUES (?)", [name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn link_photo_emotion(&self, photo_id: i64, emotion_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO photo_emotions (photo_id, emotion_id) VALUES (?, ?)",
            rusqlite::params![photo_id, emotion_id],
        )?;
        Ok(())
    }
}
