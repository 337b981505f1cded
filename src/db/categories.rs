use serde::Serialize;

use super::{guard_unique, optional, Database, DbError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub thumbnail: Option<String>,
}

/// A category with the number of photos filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category_id: i64,
    pub name: String,
    pub count: i64,
    pub thumbnail: Option<String>,
}

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        thumbnail: row.get(2)?,
    })
}

impl Database {
    pub fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        optional(self.conn.query_row(
            "SELECT id, name, thumbnail FROM categories WHERE name = ?",
            [name],
            row_to_category,
        ))
    }

    pub fn get_category(&self, category_id: i64) -> Result<Option<Category>> {
        optional(self.conn.query_row(
            "SELECT id, name, thumbnail FROM categories WHERE id = ?",
            [category_id],
            row_to_category,
        ))
    }

    fn insert_category(&self, name: &str) -> Result<i64> {
        guard_unique(
            self.conn
                .execute("INSERT INTO categories (name) VALUES (?)", [name]),
            "category name",
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Find the category with this exact name, creating it on first sight.
    ///
    /// The existence check is only a fast path. Creation relies on the UNIQUE
    /// constraint on `name`: if a concurrent writer inserted the same name
    /// between our lookup and our insert, the row it created is returned.
    pub fn resolve_or_create_category(&self, name: &str) -> Result<Category> {
        if let Some(category) = self.find_category_by_name(name)? {
            return Ok(category);
        }
        self.create_category(name)
    }

    /// Insert a category the caller did not find. A uniqueness conflict
    /// returns the row the other writer created.
    pub(crate) fn create_category(&self, name: &str) -> Result<Category> {
        match self.insert_category(name) {
            Ok(id) => {
                tracing::info!(category_id = id, name, "Created category");
                Ok(Category {
                    id,
                    name: name.to_string(),
                    thumbnail: None,
                })
            }
            Err(DbError::ConflictRetry(_)) => {
                tracing::debug!(name, "Category created concurrently, re-fetching");
                self.find_category_by_name(name)?
                    .ok_or(DbError::Vanished("category"))
            }
            Err(e) => Err(e),
        }
    }

    /// Associate a photo with a category. Returns false if the association already existed.
    pub fn link_photo_category(&self, photo_id: i64, category_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO photo_categories (photo_id, category_id) VALUES (?, ?)",
            rusqlite::params![photo_id, category_id],
        )?;
        Ok(changed > 0)
    }

    /// Category ids of a photo, in association order.
    pub fn category_ids_for_photo(&self, photo_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category_id FROM photo_categories WHERE photo_id = ? ORDER BY id")?;
        let ids = stmt
            .query_map([photo_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn category_summaries(&self) -> Result<Vec<CategorySummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.id, c.name, COUNT(pc.id), c.thumbnail
            FROM categories c
            LEFT JOIN photo_categories pc ON pc.category_id = c.id
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(CategorySummary {
                    category_id: row.get(0)?,
                    name: row.get(1)?,
                    count: row.get(2)?,
                    thumbnail: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }
}
