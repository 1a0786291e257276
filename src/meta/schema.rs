//! SQLite schema definition

/// SQL schema for the ingestion ledger
pub const SCHEMA_SQL: &str = r#"
-- Videos: one row per successfully indexed upload
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    original_filename TEXT NOT NULL,
    stored_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    mime_type TEXT,
    frame_dir TEXT NOT NULL,
    sampling_interval REAL NOT NULL,
    total_frames INTEGER NOT NULL DEFAULT 0,
    processed_frames INTEGER NOT NULL DEFAULT 0,
    ingested_at TEXT NOT NULL
);

-- Ingestion runs: every attempt, including rejected and failed ones
CREATE TABLE IF NOT EXISTS ingestion_runs (
    id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    total_frames INTEGER DEFAULT 0,
    processed_frames INTEGER DEFAULT 0,
    errors_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_videos_hash ON videos(content_hash);
CREATE INDEX IF NOT EXISTS idx_videos_ingested ON videos(ingested_at);
CREATE INDEX IF NOT EXISTS idx_runs_video ON ingestion_runs(video_id);
"#;
