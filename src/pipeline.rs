//! The upload pipeline: store, sign, caption, translate, persist, categorize.
//!
//! Stages run strictly in [`Stage::ORDER`] and are never retried. Everything up
//! to and including [`Stage::Persist`] is fatal: a failure aborts the upload
//! before any row is written. The categorization stages only degrade the
//! result, and each label is isolated from the others.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;

use crate::config::Config;
use crate::db::{Database, NewPhoto, SignedUrl};
use crate::error::{AnnotationError, Result};
use crate::inference::{HttpInferenceGateway, InferenceGateway};
use crate::storage::{FsObjectStore, ObjectNamer, ObjectStore, SignedUrlIssuer};
use crate::translation::{TextKind, TranslationGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Store,
    Sign,
    Caption,
    TranslateCaption,
    Persist,
    Categorize,
    ResolveLabels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the upload; nothing is persisted.
    Fatal,
    /// Record the failure and carry on.
    Degrade,
}

impl Stage {
    pub const ORDER: [Stage; 7] = [
        Stage::Store,
        Stage::Sign,
        Stage::Caption,
        Stage::TranslateCaption,
        Stage::Persist,
        Stage::Categorize,
        Stage::ResolveLabels,
    ];

    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            Stage::Categorize | Stage::ResolveLabels => FailurePolicy::Degrade,
            _ => FailurePolicy::Fatal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Store => "store",
            Stage::Sign => "sign",
            Stage::Caption => "caption",
            Stage::TranslateCaption => "translate_caption",
            Stage::Persist => "persist",
            Stage::Categorize => "categorize",
            Stage::ResolveLabels => "resolve_labels",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A degraded-stage failure that did not stop the upload.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// The raw label, for per-label failures.
    pub label: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoUploadResult {
    pub photo_id: i64,
    pub thumbnail_signed_url: String,
    pub failures: Vec<StageFailure>,
}

pub struct AnnotationPipeline {
    db: Database,
    store: Box<dyn ObjectStore>,
    namer: ObjectNamer,
    issuer: SignedUrlIssuer,
    inference: Box<dyn InferenceGateway>,
    translation: TranslationGateway,
}

impl AnnotationPipeline {
    pub fn new(
        db: Database,
        store: Box<dyn ObjectStore>,
        namer: ObjectNamer,
        issuer: SignedUrlIssuer,
        inference: Box<dyn InferenceGateway>,
        translation: TranslationGateway,
    ) -> Self {
        Self {
            db,
            store,
            namer,
            issuer,
            inference,
            translation,
        }
    }

    /// Wire the filesystem store, local signer and HTTP gateways from `config`.
    pub fn from_config(config: &Config, db: Database) -> Self {
        Self::new(
            db,
            Box::new(FsObjectStore::new(&config.storage)),
            ObjectNamer::new(&config.storage),
            SignedUrlIssuer::from_config(&config.signing),
            Box::new(HttpInferenceGateway::new(&config.inference)),
            TranslationGateway::from_config(&config.translation),
        )
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one upload end to end.
    ///
    /// Each stage in [`Stage::ORDER`] runs once. A failure is handled by the
    /// stage's [`FailurePolicy`]: fatal failures end the upload with `Err`,
    /// degraded ones are collected into the result.
    pub fn upload(&self, bytes: &[u8]) -> Result<PhotoUploadResult> {
        let mut upload = Upload::new(self.namer.next_name(), bytes);
        tracing::info!(name = %upload.name, size = bytes.len(), "Upload started");

        for stage in Stage::ORDER {
            tracing::debug!(stage = %stage, name = %upload.name, "Running stage");
            if let Err(e) = self.run_stage(stage, &mut upload) {
                record_failure(stage, None, e, &mut upload.failures)?;
            }
        }

        let photo_id = *required(&upload.photo_id, Stage::Persist, "photo id")?;
        let thumbnail = required(&upload.thumbnail_url, Stage::Sign, "thumbnail URL")?;
        tracing::info!(photo_id, degraded = upload.failures.len(), "Upload complete");

        Ok(PhotoUploadResult {
            photo_id,
            thumbnail_signed_url: thumbnail.url.clone(),
            failures: upload.failures,
        })
    }

    fn run_stage(&self, stage: Stage, upload: &mut Upload) -> Result<()> {
        match stage {
            Stage::Store => self
                .store
                .put(&upload.name, upload.bytes)
                .map_err(|e| AnnotationError::Storage {
                    key: upload.name.clone(),
                    reason: e.to_string(),
                }),
            Stage::Sign => {
                upload.signed_url = Some(self.issuer.obtain(&upload.name)?);
                let thumbnail_key = self.namer.thumbnail_key(&upload.name);
                upload.thumbnail_url = Some(self.issuer.obtain(&thumbnail_key)?);
                Ok(())
            }
            Stage::Caption => {
                let signed_url = required(&upload.signed_url, stage, "signed URL")?;
                upload.caption = Some(self.inference.request_caption(&signed_url.url)?);
                Ok(())
            }
            Stage::TranslateCaption => {
                let caption = required(&upload.caption, stage, "caption")?;
                upload.translated_caption =
                    Some(self.translation.translate(caption, TextKind::Caption)?);
                Ok(())
            }
            Stage::Persist => {
                let photo = NewPhoto {
                    name: &upload.name,
                    caption: required(&upload.translated_caption, stage, "translated caption")?,
                    signed_url: required(&upload.signed_url, stage, "signed URL")?,
                    thumbnail_url: required(&upload.thumbnail_url, stage, "thumbnail URL")?,
                    snapped_at: capture_time(upload.bytes),
                };
                let (photo_id, _diary_id) = self.db.insert_photo_with_diary(&photo, photo.caption)?;
                tracing::info!(photo_id, name = %upload.name, "Photo persisted");
                upload.photo_id = Some(photo_id);
                Ok(())
            }
            Stage::Categorize => {
                let signed_url = required(&upload.signed_url, stage, "signed URL")?;
                upload.labels = self.inference.request_categories(&signed_url.url)?;
                Ok(())
            }
            Stage::ResolveLabels => {
                let photo_id = *required(&upload.photo_id, stage, "photo id")?;
                self.resolve_labels(photo_id, &upload.labels, &mut upload.failures)
            }
        }
    }

    /// Translate, resolve and associate each distinct label. A label's
    /// failure is handled by the [`Stage::ResolveLabels`] policy.
    fn resolve_labels(
        &self,
        photo_id: i64,
        labels: &[String],
        failures: &mut Vec<StageFailure>,
    ) -> Result<()> {
        let mut linked = HashSet::new();

        for label in distinct_labels(labels) {
            let outcome = self
                .translation
                .translate(label, TextKind::Label)
                .and_then(|translated| {
                    self.db
                        .resolve_or_create_category(&translated)
                        .map_err(AnnotationError::from)
                })
                .and_then(|category| {
                    if !linked.contains(&category.id) {
                        self.db.link_photo_category(photo_id, category.id)?;
                        linked.insert(category.id);
                    }
                    Ok(category)
                });

            match outcome {
                Ok(category) => {
                    tracing::debug!(photo_id, label, category = %category.name, "Label resolved");
                }
                Err(e) => record_failure(Stage::ResolveLabels, Some(label), e, failures)?,
            }
        }
        Ok(())
    }
}

/// Per-upload state handed from stage to stage.
struct Upload<'b> {
    name: String,
    bytes: &'b [u8],
    signed_url: Option<SignedUrl>,
    thumbnail_url: Option<SignedUrl>,
    caption: Option<String>,
    translated_caption: Option<String>,
    photo_id: Option<i64>,
    labels: Vec<String>,
    failures: Vec<StageFailure>,
}

impl<'b> Upload<'b> {
    fn new(name: String, bytes: &'b [u8]) -> Self {
        Self {
            name,
            bytes,
            signed_url: None,
            thumbnail_url: None,
            caption: None,
            translated_caption: None,
            photo_id: None,
            labels: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Output of an earlier stage. Absent only when that stage degraded.
fn required<'u, T>(value: &'u Option<T>, stage: Stage, input: &'static str) -> Result<&'u T> {
    value
        .as_ref()
        .ok_or(AnnotationError::MissingInput {
            stage,
            input,
        })
}

/// Apply the stage's failure policy: fatal failures are returned, degraded
/// ones are logged and recorded.
fn record_failure(
    stage: Stage,
    label: Option<&str>,
    error: AnnotationError,
    failures: &mut Vec<StageFailure>,
) -> Result<()> {
    match stage.failure_policy() {
        FailurePolicy::Fatal => {
            tracing::error!(stage = %stage, label, error = %error, "Upload aborted");
            Err(error)
        }
        FailurePolicy::Degrade => {
            tracing::warn!(stage = %stage, label, error = %error, "Stage degraded");
            failures.push(StageFailure {
                stage,
                label: label.map(str::to_string),
                reason: error.to_string(),
            });
            Ok(())
        }
    }
}

/// Trimmed, non-empty labels in first-seen order without repeats.
fn distinct_labels(labels: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && seen.insert(*l))
        .collect()
}

/// EXIF `DateTimeOriginal` of the uploaded bytes, if present and well formed.
fn capture_time(bytes: &[u8]) -> Option<NaiveDateTime> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Ascii(ref v) => {
            let raw = std::str::from_utf8(v.first()?).ok()?;
            parse_exif_datetime(raw)
        }
        _ => None,
    }
}

fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok()
}
