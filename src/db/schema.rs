pub const SCHEMA: &str = r#"
-- Photos: one row per upload
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,              -- Object store key
    caption TEXT,                           -- Translated caption
    signed_url TEXT,
    signed_url_expire_time TEXT,
    tb_signed_url TEXT,                     -- Thumbnail variant
    tb_signed_url_expire_time TEXT,
    snapped_at TEXT,                        -- Capture time from EXIF, local time
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    -- A URL and its expiry are only ever written together
    CHECK ((signed_url IS NULL) = (signed_url_expire_time IS NULL)),
    CHECK ((tb_signed_url IS NULL) = (tb_signed_url_expire_time IS NULL))
);

-- Diaries: exactly one per photo
CREATE TABLE IF NOT EXISTS diaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL UNIQUE,
    content TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE
);

-- Categories: global, shared across photos
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    thumbnail TEXT
);

CREATE TABLE IF NOT EXISTS photo_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    UNIQUE (photo_id, category_id),
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_photo_categories_category ON photo_categories(category_id);

-- Emotions: populated outside the upload pipeline
CREATE TABLE IF NOT EXISTS emotions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS photo_emotions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL,
    emotion_id INTEGER NOT NULL,
    UNIQUE (photo_id, emotion_id),
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
    FOREIGN KEY (emotion_id) REFERENCES emotions(id)
);
"#;
