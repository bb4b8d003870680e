/// Inline SQL migrations for the scrape-hub schema.
///
/// One statement per entry. Timestamps are unix seconds (UTC).

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: runs table
    r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running',
    total_leads INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL,
    completed_at INTEGER
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at DESC);
"#,
    // Migration 3: leads table
    r#"
CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    project_name TEXT NOT NULL,
    date TEXT NOT NULL DEFAULT '',
    sector TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    external_id TEXT,
    status TEXT,
    raw_data TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#,
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_leads_source_external
    ON leads(source, external_id) WHERE external_id IS NOT NULL;
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_leads_source_name ON leads(source, project_name);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_leads_created ON leads(created_at DESC);
"#,
    // Migration 7: status changes detected on re-scrape
    r#"
CREATE TABLE IF NOT EXISTS status_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id INTEGER NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL,
    project_name TEXT NOT NULL,
    previous_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    detected_at INTEGER NOT NULL,
    seen INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_status_changes_detected ON status_changes(detected_at DESC);
"#,
];
