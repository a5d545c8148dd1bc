use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, Timelike, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::schema::SCHEMA;
use super::{SchemaCapabilities, Store};
use crate::error::{Error, Result};
use crate::types::*;

const LATENCY_BUCKETS_MS: [(&str, i64, Option<i64>); 5] = [
    ("0-50ms", 0, Some(50)),
    ("50-100ms", 50, Some(100)),
    ("100-200ms", 100, Some(200)),
    ("200-500ms", 200, Some(500)),
    ("500ms+", 500, None),
];

pub struct SqliteStore {
    conn: Mutex<Connection>,
    caps: RwLock<SchemaCapabilities>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
            caps: RwLock::new(SchemaCapabilities::default()),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Maps unique-constraint failures to Conflict so callers can surface 409.
fn map_conflict(result: std::result::Result<usize, rusqlite::Error>, what: &str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(Error::Conflict(what.to_string()))
        }
        Err(e) => Err(Error::from(e)),
    }
}

fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        company_id: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        created_by: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn map_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        department: row.get(4)?,
        status: ProjectStatus::parse(&row.get::<_, String>(5)?),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn map_api_key(row: &Row) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        project_id: row.get(1)?,
        key: row.get(2)?,
        name: row.get(3)?,
        revoked: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

const USER_COLS: &str = "id, company_id, username, password_hash, created_by, created_at";
const PROJECT_COLS: &str = "id, company_id, name, description, department, status, created_at";
const KEY_COLS: &str = "id, project_id, key, name, revoked, created_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;

        // Resolve schema capabilities once; consumers never probe per request.
        let caps = SchemaCapabilities {
            has_project_status: column_exists(&conn, "projects", "status")?,
            has_usage_latency: column_exists(&conn, "usage_records", "latency_ms")?,
            has_user_created_by: column_exists(&conn, "users", "created_by")?,
        };
        *self.caps.write().unwrap_or_else(|e| e.into_inner()) = caps;
        Ok(())
    }

    fn capabilities(&self) -> SchemaCapabilities {
        *self.caps.read().unwrap_or_else(|e| e.into_inner())
    }

    fn ping(&self) -> Result<()> {
        self.conn().query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // Company operations

    fn get_or_create_company(&self, name: &str) -> Result<Company> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, name, created_at FROM companies WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Company {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;

        if let Some(company) = existing {
            return Ok(company);
        }

        let company = Company {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO companies (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![company.id, company.name, format_datetime(&company.created_at)],
        )?;
        tx.commit()?;
        Ok(company)
    }

    fn get_company_by_name(&self, name: &str) -> Result<Option<Company>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_at FROM companies WHERE name = ?1",
            params![name],
            |row| {
                Ok(Company {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        map_conflict(
            self.conn().execute(
                "INSERT INTO users (id, company_id, username, password_hash, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.company_id,
                    user.username,
                    user.password_hash,
                    user.created_by,
                    format_datetime(&user.created_at),
                ],
            ),
            "username already exists for this company",
        )
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, company_id: &str, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE company_id = ?1 AND username = ?2"),
            params![company_id, username],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_scoped(&self, company_id: &str, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1 AND company_id = ?2"),
            params![id, company_id],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_company_users(&self, company_id: &str) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLS} FROM users WHERE company_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = stmt.query_map(params![company_id], map_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_user(&self, company_id: &str, user_id: &str, requester_id: &str) -> Result<bool> {
        let rows = if self.capabilities().has_user_created_by {
            // Only the recorded creator may delete; a user without one
            // (self-signup) is deletable by nobody.
            self.conn().execute(
                "DELETE FROM users
                 WHERE id = ?1 AND company_id = ?2 AND created_by = ?3",
                params![user_id, company_id, requester_id],
            )?
        } else {
            self.conn().execute(
                "DELETE FROM users WHERE id = ?1 AND company_id = ?2",
                params![user_id, company_id],
            )?
        };
        Ok(rows > 0)
    }

    // Project operations

    fn create_project(&self, project: &Project) -> Result<()> {
        map_conflict(
            self.conn().execute(
                "INSERT INTO projects (id, company_id, name, description, department, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    project.id,
                    project.company_id,
                    project.name,
                    project.description,
                    project.department,
                    project.status.as_str(),
                    format_datetime(&project.created_at),
                ],
            ),
            "project name already exists",
        )
    }

    fn get_project_by_id(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"),
            params![id],
            map_project,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_project_scoped(&self, company_id: &str, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1 AND company_id = ?2"),
            params![id, company_id],
            map_project,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_projects(&self, company_id: &str) -> Result<Vec<ProjectWithKeyCount>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.company_id, p.name, p.description, p.department, p.status, p.created_at,
                    (SELECT COUNT(*) FROM api_keys k WHERE k.project_id = p.id) AS key_count
             FROM projects p
             WHERE p.company_id = ?1
             ORDER BY p.created_at DESC",
        )?;

        let rows = stmt.query_map(params![company_id], |row| {
            Ok(ProjectWithKeyCount {
                project: map_project(row)?,
                key_count: row.get(7)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_project(&self, company_id: &str, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM projects WHERE id = ?1 AND company_id = ?2",
                params![id, company_id],
                |row| row.get(0),
            )
            .optional()?;

        if exists.is_none() {
            return Ok(false);
        }

        // Dependents first: usage rows, stats rows, keys, then the project.
        tx.execute(
            "DELETE FROM usage_records WHERE api_key_id IN
                (SELECT id FROM api_keys WHERE project_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM api_key_stats WHERE api_key_id IN
                (SELECT id FROM api_keys WHERE project_id = ?1)",
            params![id],
        )?;
        tx.execute("DELETE FROM api_keys WHERE project_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // API key operations

    fn create_api_key(&self, key: &ApiKey) -> Result<()> {
        map_conflict(
            self.conn().execute(
                "INSERT INTO api_keys (id, project_id, key, name, revoked, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.id,
                    key.project_id,
                    key.key,
                    key.name,
                    key.revoked,
                    format_datetime(&key.created_at),
                ],
            ),
            "API key name already exists for this project",
        )
    }

    fn get_active_key_by_secret(&self, raw_key: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {KEY_COLS} FROM api_keys WHERE key = ?1 AND revoked = 0"),
            params![raw_key],
            map_api_key,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_api_key_scoped(&self, company_id: &str, key_id: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT k.id, k.project_id, k.key, k.name, k.revoked, k.created_at
             FROM api_keys k
             JOIN projects p ON k.project_id = p.id
             WHERE k.id = ?1 AND p.company_id = ?2",
            params![key_id, company_id],
            map_api_key,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_project_keys(&self, project_id: &str) -> Result<Vec<ApiKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {KEY_COLS} FROM api_keys WHERE project_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![project_id], map_api_key)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn first_active_key(&self, project_id: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {KEY_COLS} FROM api_keys
                 WHERE project_id = ?1 AND revoked = 0
                 ORDER BY created_at LIMIT 1"
            ),
            params![project_id],
            map_api_key,
        )
        .optional()
        .map_err(Error::from)
    }

    fn set_api_key_revoked(&self, key_id: &str, revoked: bool) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE api_keys SET revoked = ?1 WHERE id = ?2",
            params![revoked, key_id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Metering operations

    fn record_generation(
        &self,
        api_key_id: &str,
        usage: &TokenUsage,
        latency_ms: i64,
    ) -> Result<()> {
        let now = format_datetime(&Utc::now());
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO usage_records (api_key_id, prompt_tokens, completion_tokens, total_tokens, latency_ms, used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                api_key_id,
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens,
                latency_ms,
                now,
            ],
        )?;

        // Single conditional write; a read-then-write here would lose updates
        // under concurrent calls against the same key.
        tx.execute(
            "INSERT INTO api_key_stats (api_key_id, request_count, last_used_at)
             VALUES (?1, 1, ?2)
             ON CONFLICT(api_key_id) DO UPDATE SET
                request_count = request_count + 1,
                last_used_at = excluded.last_used_at",
            params![api_key_id, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_key_stats(&self, api_key_id: &str) -> Result<Option<ApiKeyStats>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT api_key_id, request_count, last_used_at FROM api_key_stats WHERE api_key_id = ?1",
            params![api_key_id],
            |row| {
                Ok(ApiKeyStats {
                    api_key_id: row.get(0)?,
                    request_count: row.get(1)?,
                    last_used_at: row.get::<_, Option<String>>(2)?.map(|s| parse_datetime(&s)),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Analytics operations

    fn usage_summary(&self, company_id: &str) -> Result<UsageSummary> {
        let now = Utc::now();
        let cutoff_7d = format_datetime(&(now - Duration::days(7)));
        let cutoff_30d = format_datetime(&(now - Duration::days(30)));

        let conn = self.conn();

        let projects = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0)
             FROM projects WHERE company_id = ?1",
            params![company_id, cutoff_30d],
            |row| {
                Ok(ProjectTotals {
                    total: row.get(0)?,
                    added_last_30d: row.get(1)?,
                })
            },
        )?;

        let api_keys = conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN k.revoked = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN k.created_at >= ?2 THEN 1 ELSE 0 END), 0),
                    COUNT(k.id)
             FROM api_keys k
             JOIN projects p ON k.project_id = p.id
             WHERE p.company_id = ?1",
            params![company_id, cutoff_7d],
            |row| {
                Ok(KeyTotals {
                    active: row.get(0)?,
                    created_last_7d: row.get(1)?,
                    total: row.get(2)?,
                })
            },
        )?;

        let requests = conn.query_row(
            "SELECT COUNT(u.id),
                    COALESCE(SUM(CASE WHEN u.used_at >= ?2 THEN 1 ELSE 0 END), 0)
             FROM usage_records u
             JOIN api_keys k ON u.api_key_id = k.id
             JOIN projects p ON k.project_id = p.id
             WHERE p.company_id = ?1",
            params![company_id, cutoff_30d],
            |row| {
                Ok(RequestTotals {
                    total: row.get(0)?,
                    last_30d: row.get(1)?,
                })
            },
        )?;

        Ok(UsageSummary {
            projects,
            api_keys,
            requests,
        })
    }

    fn projects_by_status(&self, company_id: &str) -> Result<ProjectStatusCounts> {
        let conn = self.conn();

        if !self.capabilities().has_project_status {
            // Older schema without a status column: report the total as active.
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM projects WHERE company_id = ?1",
                params![company_id],
                |row| row.get(0),
            )?;
            return Ok(ProjectStatusCounts {
                active: total,
                paused: 0,
                archived: 0,
                total,
            });
        }

        conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'paused' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'archived' THEN 1 ELSE 0 END), 0),
                    COUNT(*)
             FROM projects WHERE company_id = ?1",
            params![company_id],
            |row| {
                Ok(ProjectStatusCounts {
                    active: row.get(0)?,
                    paused: row.get(1)?,
                    archived: row.get(2)?,
                    total: row.get(3)?,
                })
            },
        )
        .map_err(Error::from)
    }

    fn keys_by_status(&self, company_id: &str) -> Result<KeyStatusCounts> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COALESCE(SUM(CASE WHEN k.revoked = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN k.revoked = 1 THEN 1 ELSE 0 END), 0),
                    COUNT(k.id)
             FROM api_keys k
             JOIN projects p ON k.project_id = p.id
             WHERE p.company_id = ?1",
            params![company_id],
            |row| {
                Ok(KeyStatusCounts {
                    active: row.get(0)?,
                    revoked: row.get(1)?,
                    total: row.get(2)?,
                })
            },
        )
        .map_err(Error::from)
    }

    fn weekly_request_series(&self, company_id: &str) -> Result<Vec<DailyCount>> {
        let today = Utc::now().date_naive();
        let start = today - Duration::days(6);
        let since = format_datetime(
            &start
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                .and_utc(),
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT date(u.used_at) AS d, COUNT(u.id)
             FROM usage_records u
             JOIN api_keys k ON u.api_key_id = k.id
             JOIN projects p ON k.project_id = p.id
             WHERE p.company_id = ?1 AND u.used_at >= ?2
             GROUP BY d",
        )?;

        let rows = stmt.query_map(params![company_id, since], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let counts: std::collections::HashMap<String, i64> =
            rows.collect::<std::result::Result<_, _>>()?;

        let mut series = Vec::with_capacity(7);
        let mut day = start;
        while day <= today {
            let key = day.format("%Y-%m-%d").to_string();
            let count = counts.get(&key).copied().unwrap_or(0);
            series.push(DailyCount { date: key, count });
            day += Duration::days(1);
        }
        Ok(series)
    }

    fn hourly_request_series(&self, company_id: &str) -> Result<Vec<HourlyCount>> {
        let now_hour = Utc::now()
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or_else(Utc::now);
        let since = format_datetime(&(now_hour - Duration::hours(23)));

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT strftime('%Y-%m-%dT%H', u.used_at) AS h, COUNT(u.id)
             FROM usage_records u
             JOIN api_keys k ON u.api_key_id = k.id
             JOIN projects p ON k.project_id = p.id
             WHERE p.company_id = ?1 AND u.used_at >= ?2
             GROUP BY h",
        )?;

        let rows = stmt.query_map(params![company_id, since], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let by_hour: std::collections::HashMap<String, i64> =
            rows.collect::<std::result::Result<_, _>>()?;

        let mut points = Vec::with_capacity(24);
        for i in (0..24).rev() {
            let t = now_hour - Duration::hours(i);
            let key = t.format("%Y-%m-%dT%H").to_string();
            points.push(HourlyCount {
                time: t.format("%H:00").to_string(),
                requests: by_hour.get(&key).copied().unwrap_or(0),
            });
        }
        Ok(points)
    }

    fn latency_histogram(&self, company_id: &str) -> Result<Vec<LatencyBucket>> {
        if !self.capabilities().has_usage_latency {
            // Legacy data without latency: a full set of empty buckets.
            return Ok(LATENCY_BUCKETS_MS
                .iter()
                .map(|(label, _, _)| LatencyBucket {
                    range: (*label).to_string(),
                    count: 0,
                })
                .collect());
        }

        let since = format_datetime(&(Utc::now() - Duration::hours(24)));

        let cases: Vec<String> = LATENCY_BUCKETS_MS
            .iter()
            .map(|(_, lo, hi)| match hi {
                Some(hi) => format!(
                    "COALESCE(SUM(CASE WHEN u.latency_ms >= {lo} AND u.latency_ms < {hi} THEN 1 ELSE 0 END), 0)"
                ),
                None => format!(
                    "COALESCE(SUM(CASE WHEN u.latency_ms >= {lo} THEN 1 ELSE 0 END), 0)"
                ),
            })
            .collect();

        let sql = format!(
            "SELECT {} FROM usage_records u
             JOIN api_keys k ON u.api_key_id = k.id
             JOIN projects p ON k.project_id = p.id
             WHERE p.company_id = ?1 AND u.used_at >= ?2",
            cases.join(", ")
        );

        let conn = self.conn();
        conn.query_row(&sql, params![company_id, since], |row| {
            let mut buckets = Vec::with_capacity(LATENCY_BUCKETS_MS.len());
            for (i, (label, _, _)) in LATENCY_BUCKETS_MS.iter().enumerate() {
                buckets.push(LatencyBucket {
                    range: (*label).to_string(),
                    count: row.get(i)?,
                });
            }
            Ok(buckets)
        })
        .map_err(Error::from)
    }
}
