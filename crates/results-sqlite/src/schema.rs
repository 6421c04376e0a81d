pub const SCHEMA_VERSION: i64 = 1;

pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE jobs (
  job_id          TEXT PRIMARY KEY,
  targets_json    TEXT NOT NULL,
  dataset_locator TEXT,
  dataset_name    TEXT,
  status          TEXT NOT NULL CHECK (status IN ('pending','running','completed','failed')),
  progress        INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
  error           TEXT,
  created_ms      INTEGER NOT NULL,
  updated_ms      INTEGER NOT NULL
);

CREATE TABLE results (
  result_seq      INTEGER PRIMARY KEY AUTOINCREMENT,
  result_id       TEXT NOT NULL UNIQUE,
  job_id          TEXT NOT NULL REFERENCES jobs(job_id) ON DELETE CASCADE,
  kind            TEXT NOT NULL CHECK (kind IN ('record','host')),
  label           TEXT NOT NULL,
  risk_score      REAL NOT NULL CHECK (risk_score BETWEEN 0 AND 100),
  category        TEXT,
  recommendation  TEXT NOT NULL,
  open_ports_json TEXT,
  created_ms      INTEGER NOT NULL
);

CREATE INDEX idx_jobs_status ON jobs(status);
CREATE INDEX idx_results_job ON results(job_id, result_seq);

PRAGMA user_version = 1;

COMMIT;
"#
;
