//! Read-side views over photos, diaries, categories and emotions.
//!
//! Reads are allowed to write in two places: an expired signed URL is
//! re-signed and stored before it is returned, and a photo without a diary
//! gets an empty one.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{CategorySummary, Database, Photo};
use crate::error::{AnnotationError, Result};
use crate::storage::{ObjectNamer, SignedUrlIssuer};

const UPLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_PAGE_SIZE: usize = 100;

/// The first associated emotion is the main one; the rest are subs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmotionSummary {
    pub main: Option<String>,
    pub subs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoInformation {
    pub photo_id: i64,
    pub signed_url: String,
    /// Capture time, absent when the upload carried none.
    pub upload_date_time: Option<String>,
    pub diary_id: i64,
    pub diary_content: String,
    pub categories: Vec<String>,
    pub emotions: EmotionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoPreview {
    pub photo_id: i64,
    pub thumbnail_url: String,
    pub emotions: EmotionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryPage {
    pub category_id: i64,
    pub name: String,
    pub total: i64,
    pub page: usize,
    pub size: usize,
    pub photos: Vec<PhotoPreview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoOverview {
    pub photo_id: i64,
    pub thumbnail_url: String,
    pub categories: Vec<String>,
    pub emotions: EmotionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoOverviewPage {
    pub total: i64,
    pub page: usize,
    pub size: usize,
    pub photos: Vec<PhotoOverview>,
}

pub struct PhotoInformationAssembler<'a> {
    db: &'a Database,
    issuer: &'a SignedUrlIssuer,
    namer: &'a ObjectNamer,
}

impl<'a> PhotoInformationAssembler<'a> {
    pub fn new(db: &'a Database, issuer: &'a SignedUrlIssuer, namer: &'a ObjectNamer) -> Self {
        Self { db, issuer, namer }
    }

    pub fn get_photo_information(&self, photo_id: i64) -> Result<PhotoInformation> {
        self.get_photo_information_at(photo_id, Utc::now())
    }

    pub fn get_photo_information_at(
        &self,
        photo_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PhotoInformation> {
        let photo = self.load_photo(photo_id)?;
        let signed_url = self.primary_url(&photo, now)?;
        let diary = self.db.get_or_create_diary(photo_id)?;

        Ok(PhotoInformation {
            photo_id,
            signed_url,
            upload_date_time: photo
                .snapped_at
                .map(|t| t.format(UPLOAD_TIME_FORMAT).to_string()),
            diary_id: diary.id,
            diary_content: diary.content.unwrap_or_default(),
            categories: self.category_names(photo_id)?,
            emotions: self.emotion_summary(photo_id)?,
        })
    }

    pub fn category_summaries(&self) -> Result<Vec<CategorySummary>> {
        Ok(self.db.category_summaries()?)
    }

    /// One page (zero-based) of a category's photos, newest first.
    pub fn photos_in_category(
        &self,
        category_id: i64,
        page: usize,
        size: usize,
    ) -> Result<CategoryPage> {
        let category = self
            .db
            .get_category(category_id)?
            .ok_or(AnnotationError::NotFound {
                kind: "category",
                id: category_id,
            })?;
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let now = Utc::now();

        let photos = self
            .db
            .photos_in_category(category_id, size, page.saturating_mul(size))?
            .iter()
            .map(|photo| {
                Ok(PhotoPreview {
                    photo_id: photo.id,
                    thumbnail_url: self.thumbnail_url(photo, now)?,
                    emotions: self.emotion_summary(photo.id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CategoryPage {
            category_id,
            name: category.name,
            total: self.db.count_photos_in_category(category_id)?,
            page,
            size,
            photos,
        })
    }

    pub fn list_photos(&self, page: usize, size: usize) -> Result<PhotoOverviewPage> {
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let now = Utc::now();

        let photos = self
            .db
            .list_photos(size, page.saturating_mul(size))?
            .iter()
            .map(|photo| {
                Ok(PhotoOverview {
                    photo_id: photo.id,
                    thumbnail_url: self.thumbnail_url(photo, now)?,
                    categories: self.category_names(photo.id)?,
                    emotions: self.emotion_summary(photo.id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PhotoOverviewPage {
            total: self.db.count_photos()?,
            page,
            size,
            photos,
        })
    }

    fn load_photo(&self, photo_id: i64) -> Result<Photo> {
        self.db
            .get_photo(photo_id)?
            .ok_or(AnnotationError::NotFound {
                kind: "photo",
                id: photo_id,
            })
    }

    fn primary_url(&self, photo: &Photo, now: DateTime<Utc>) -> Result<String> {
        if let Some(fresh) = self.issuer.refresh_at(&photo.name, photo.signed_url.as_ref(), now)? {
            self.db.update_signed_url(photo.id, &fresh)?;
            tracing::info!(photo_id = photo.id, "Re-signed expired photo URL");
            return Ok(fresh.url);
        }
        Ok(photo.signed_url.as_ref().map(|s| s.url.clone()).unwrap_or_default())
    }

    fn thumbnail_url(&self, photo: &Photo, now: DateTime<Utc>) -> Result<String> {
        let key = self.namer.thumbnail_key(&photo.name);
        if let Some(fresh) = self.issuer.refresh_at(&key, photo.thumbnail_url.as_ref(), now)? {
            self.db.update_thumbnail_url(photo.id, &fresh)?;
            tracing::info!(photo_id = photo.id, "Re-signed expired thumbnail URL");
            return Ok(fresh.url);
        }
        Ok(photo.thumbnail_url.as_ref().map(|s| s.url.clone()).unwrap_or_default())
    }

    /// Category names in association order. An id without a row is a
    /// data-integrity fault.
    fn category_names(&self, photo_id: i64) -> Result<Vec<String>> {
        self.db
            .category_ids_for_photo(photo_id)?
            .into_iter()
            .map(|id| {
                self.db
                    .get_category(id)?
                    .map(|c| c.name)
                    .ok_or(AnnotationError::NotFound {
                        kind: "category",
                        id,
                    })
            })
            .collect()
    }

    fn emotion_summary(&self, photo_id: i64) -> Result<EmotionSummary> {
        let mut names = self
            .db
            .emotion_ids_for_photo(photo_id)?
            .into_iter()
            .map(|id| {
                self.db
                    .get_emotion(id)?
                    .map(|e| e.name)
                    .ok_or(AnnotationError::NotFound {
                        kind: "emotion",
                        id,
                    })
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter();

        Ok(EmotionSummary {
            main: names.next(),
            subs: names.collect(),
        })
    }
}
