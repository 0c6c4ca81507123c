//! SQLite catalog: packages, installations, mount actions and pull
//! metadata.
//!
//! The database opens in WAL mode and applies embedded migrations keyed by
//! filename: every migration whose name is not yet recorded in the
//! `migrations` table runs inside one transaction. Write operations hand out
//! transactional handles whose drop defaults to rollback.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use thiserror::Error;

const MIGRATIONS: &[(&str, &str)] = &[("0001_init.sql", include_str!("migrations/0001_init.sql"))];

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid timestamp in database: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("invalid mount action data: {0}")]
    InvalidMountData(#[from] serde_json::Error),
}

pub struct Db {
    conn: Connection,
}

/// Singleton pull metadata used by the auto-pull gate.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreInfo {
    pub last_pulled_at: DateTime<Utc>,
    pub last_pull_list_mtime: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub name: String,
    pub repo: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountAction {
    pub action: String,
    pub data: BTreeMap<String, String>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Db, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Db { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Applies every embedded migration whose filename is not yet recorded,
    /// inside a single transaction. Re-running is a no-op.
    fn apply_migrations(&self) -> Result<(), DbError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                name TEXT PRIMARY KEY UNIQUE,
                applied_at DATETIME
            )",
            [],
        )?;

        let tx = self.conn.unchecked_transaction()?;

        let applied: Vec<String> = {
            let mut stmt = tx.prepare("SELECT name FROM migrations")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        for (name, sql) in MIGRATIONS {
            if applied.iter().any(|a| a == name) {
                continue;
            }
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO migrations VALUES (?1, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn core_info(&self) -> Result<Option<CoreInfo>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT last_pulled_at, last_pull_list_mtime FROM pull_info WHERE id = 1")?;
        let mut rows = stmt.query([])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let pulled_at: String = row.get(0)?;
        let mtime: String = row.get(1)?;
        Ok(Some(CoreInfo {
            last_pulled_at: DateTime::parse_from_rfc3339(&pulled_at)?.with_timezone(&Utc),
            last_pull_list_mtime: DateTime::parse_from_rfc3339(&mtime)?.with_timezone(&Utc),
        }))
    }

    pub fn update_core_info(&self, info: &CoreInfo) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO pull_info (id, last_pulled_at, last_pull_list_mtime)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                 last_pulled_at = excluded.last_pulled_at,
                 last_pull_list_mtime = excluded.last_pull_list_mtime",
            params![
                info.last_pulled_at.to_rfc3339(),
                info.last_pull_list_mtime.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Opens a transaction that replaces the indexed packages of one repo.
    /// The previous rows are deleted up front; nothing is visible to readers
    /// until commit.
    pub fn begin_package_index(&self, repo: &str) -> Result<PackageIndex<'_>, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM packages WHERE repo = ?1", params![repo])?;
        Ok(PackageIndex {
            tx,
            repo: repo.to_string(),
        })
    }

    pub fn packages_named(&self, name: &str) -> Result<Vec<PackageRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, repo, path FROM packages WHERE name = ?1 ORDER BY repo")?;
        let rows = stmt.query_map(params![name], |row| {
            Ok(PackageRecord {
                name: row.get(0)?,
                repo: row.get(1)?,
                path: row.get(2)?,
            })
        })?;
        rows.collect::<Result<_, _>>().map_err(Into::into)
    }

    pub fn packages_in_repo(&self, repo: &str) -> Result<Vec<PackageRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, repo, path FROM packages WHERE repo = ?1 ORDER BY name")?;
        let rows = stmt.query_map(params![repo], |row| {
            Ok(PackageRecord {
                name: row.get(0)?,
                repo: row.get(1)?,
                path: row.get(2)?,
            })
        })?;
        rows.collect::<Result<_, _>>().map_err(Into::into)
    }

    /// Reserves an installation row inside a new transaction. The row only
    /// becomes durable on [`Installation::commit`].
    pub fn begin_installation(
        &self,
        name: &str,
        repo: &str,
        version: &str,
        active: bool,
    ) -> Result<Installation<'_>, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO installations (name, repo, version, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![name, repo, version, active],
        )?;
        let id = tx.last_insert_rowid();
        Ok(Installation { tx, id })
    }

    pub fn mount_actions(&self, install_id: i64) -> Result<Vec<MountAction>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT action, data FROM install_mount_actions WHERE install_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![install_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut actions = Vec::new();
        for row in rows {
            let (action, data) = row?;
            actions.push(MountAction {
                action,
                data: serde_json::from_str(&data)?,
            });
        }
        Ok(actions)
    }

    /// Looks up an installation's active flag, for status checks and tests.
    pub fn installation_active(
        &self,
        name: &str,
        repo: &str,
        version: &str,
    ) -> Result<Option<bool>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT is_active FROM installations
             WHERE name = ?1 AND repo = ?2 AND version = ?3
             ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![name, repo, version])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

/// Transactional handle for re-indexing one repo's packages.
pub struct PackageIndex<'conn> {
    tx: Transaction<'conn>,
    repo: String,
}

impl PackageIndex<'_> {
    pub fn index_package(&self, name: &str, path: &str) -> Result<(), DbError> {
        self.tx.execute(
            "INSERT INTO packages (name, repo, path) VALUES (?1, ?2, ?3)",
            params![name, self.repo, path],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), DbError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback()?;
        Ok(())
    }
}

/// Transactional handle for one installation. Dropping it without commit
/// rolls everything back, including the reserved row.
pub struct Installation<'conn> {
    tx: Transaction<'conn>,
    pub id: i64,
}

impl Installation<'_> {
    pub fn record_mount_action(
        &self,
        action: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<MountAction, DbError> {
        let encoded = serde_json::to_string(data)?;
        self.tx.execute(
            "INSERT INTO install_mount_actions (install_id, action, data) VALUES (?1, ?2, ?3)",
            params![self.id, action, encoded],
        )?;
        Ok(MountAction {
            action: action.to_string(),
            data: data.clone(),
        })
    }

    pub fn set_active(&self, active: bool) -> Result<(), DbError> {
        self.tx.execute(
            "UPDATE installations SET is_active = ?1 WHERE id = ?2",
            params![active, self.id],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), DbError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn open_db(dir: &tempfile::TempDir) -> Db {
        Db::open(&dir.path().join("kit.sqlite")).unwrap()
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kit.sqlite");
        Db::open(&path).unwrap();
        // Reopening must not reapply the schema.
        Db::open(&path).unwrap();
    }

    #[test]
    fn core_info_round_trips() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        assert!(db.core_info().unwrap().is_none());

        let info = CoreInfo {
            last_pulled_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_pull_list_mtime: Utc.timestamp_opt(1_699_999_000, 0).unwrap(),
        };
        db.update_core_info(&info).unwrap();
        assert_eq!(db.core_info().unwrap(), Some(info.clone()));

        // Upsert replaces the singleton row.
        let newer = CoreInfo {
            last_pulled_at: Utc.timestamp_opt(1_700_000_500, 0).unwrap(),
            ..info
        };
        db.update_core_info(&newer).unwrap();
        assert_eq!(db.core_info().unwrap(), Some(newer));
    }

    #[test]
    fn package_index_commit_replaces_rows() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let idx = db.begin_package_index("core").unwrap();
        idx.index_package("go", "repos/core/packages/go").unwrap();
        idx.index_package("zig", "repos/core/packages/zig").unwrap();
        idx.commit().unwrap();
        assert_eq!(db.packages_in_repo("core").unwrap().len(), 2);

        let idx = db.begin_package_index("core").unwrap();
        idx.index_package("go", "repos/core/packages/go").unwrap();
        idx.commit().unwrap();
        let pkgs = db.packages_in_repo("core").unwrap();
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].name, "go");
    }

    #[test]
    fn package_index_rollback_keeps_prior_rows() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let idx = db.begin_package_index("core").unwrap();
        idx.index_package("go", "repos/core/packages/go").unwrap();
        idx.commit().unwrap();

        let idx = db.begin_package_index("core").unwrap();
        idx.index_package("zig", "repos/core/packages/zig").unwrap();
        idx.rollback().unwrap();

        let pkgs = db.packages_in_repo("core").unwrap();
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].name, "go");
    }

    #[test]
    fn installation_rolls_back_on_drop() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        {
            let install = db.begin_installation("go", "core", "1.22.0", false).unwrap();
            let mut data = BTreeMap::new();
            data.insert("target".to_string(), "bin/go".to_string());
            data.insert("linkName".to_string(), "go".to_string());
            install.record_mount_action("link_bin", &data).unwrap();
            // Dropped without commit.
        }
        assert_eq!(db.installation_active("go", "core", "1.22.0").unwrap(), None);
    }

    #[test]
    fn installation_commit_persists_actions_in_order() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let install = db.begin_installation("go", "core", "1.22.0", false).unwrap();
        let id = install.id;
        for target in ["bin/go", "bin/gofmt"] {
            let mut data = BTreeMap::new();
            data.insert("target".to_string(), target.to_string());
            data.insert(
                "linkName".to_string(),
                target.rsplit('/').next().unwrap().to_string(),
            );
            install.record_mount_action("link_bin", &data).unwrap();
        }
        install.set_active(true).unwrap();
        install.commit().unwrap();

        assert_eq!(
            db.installation_active("go", "core", "1.22.0").unwrap(),
            Some(true)
        );
        let actions = db.mount_actions(id).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].data["target"], "bin/go");
        assert_eq!(actions[1].data["target"], "bin/gofmt");
    }
}
