pub const SCHEMA: &str = r#"
-- Companies are the unit of tenant isolation
CREATE TABLE IF NOT EXISTS companies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Users belong to exactly one company
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    username TEXT NOT NULL,
    password_hash TEXT NOT NULL,      -- argon2id hash with embedded salt

    -- Creator tracking: only the creator may delete a user
    created_by TEXT REFERENCES users(id) ON DELETE SET NULL,

    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(company_id, username)
);

-- Projects are named workspaces within a company
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    department TEXT,
    status TEXT NOT NULL DEFAULT 'active',  -- active | paused | archived
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(company_id, name)
);

-- API keys authorize generation calls on behalf of a project
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    key TEXT NOT NULL UNIQUE,          -- raw secret, shown once at creation
    name TEXT NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Per-key request counter, upserted atomically on every recorded call
CREATE TABLE IF NOT EXISTS api_key_stats (
    api_key_id TEXT PRIMARY KEY REFERENCES api_keys(id),
    request_count INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT
);

-- Append-only usage log, one row per completed generation call
CREATE TABLE IF NOT EXISTS usage_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    api_key_id TEXT NOT NULL REFERENCES api_keys(id),
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    latency_ms INTEGER,
    used_at TEXT DEFAULT (datetime('now'))
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_users_company ON users(company_id);
CREATE INDEX IF NOT EXISTS idx_projects_company ON projects(company_id);
-- Key names are unique per project among non-revoked keys only, so a
-- revoked key's name can be reused
CREATE UNIQUE INDEX IF NOT EXISTS idx_api_keys_project_name
    ON api_keys(project_id, name) WHERE revoked = 0;
CREATE INDEX IF NOT EXISTS idx_api_keys_project_revoked ON api_keys(project_id, revoked);
CREATE INDEX IF NOT EXISTS idx_usage_key_used_at ON usage_records(api_key_id, used_at);
"#;
