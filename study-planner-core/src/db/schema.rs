pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS study_plans (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content_reference TEXT,
    note_format TEXT NOT NULL DEFAULT 'summary' CHECK (note_format IN ('summary', 'bullet_points', 'q_and_a', 'flashcards')),
    scheduled_time TEXT,
    status TEXT NOT NULL DEFAULT 'not_started' CHECK (status IN ('not_started', 'pending', 'processing', 'completed', 'failed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK (type IN ('study_plan', 'youtube', 'file')),
    content TEXT NOT NULL,
    notes TEXT NOT NULL,
    quiz JSON NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_study_plans_due ON study_plans(status, scheduled_time);
CREATE INDEX IF NOT EXISTS idx_history_created ON history(created_at);
CREATE INDEX IF NOT EXISTS idx_history_content ON history(content);
"#;
