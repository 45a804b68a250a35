//! Embedded schema migrations.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::store::StoreError;

/// One SQL migration, identified by its file name.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Migrations shipped with the crate.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_initial.sql",
        sql: include_str!("../../migrations/0001_initial.sql"),
    },
    Migration {
        name: "0002_indexes.sql",
        sql: include_str!("../../migrations/0002_indexes.sql"),
    },
];

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Apply every migration not yet recorded in `schema_migrations`.
///
/// Migrations run in lexicographic order of their names, each inside its own
/// transaction. Returns the names applied by this call.
pub fn run_migrations(
    conn: &mut Connection,
    migrations: &[Migration],
) -> Result<Vec<String>, StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .map_err(db)?;

    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by_key(|m| m.name);

    let mut applied = Vec::new();
    for migration in ordered {
        let done: Option<String> = conn
            .query_row(
                "SELECT name FROM schema_migrations WHERE name = ?",
                params![migration.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db)?;
        if done.is_some() {
            continue;
        }

        let tx = conn.transaction().map_err(db)?;
        tx.execute_batch(migration.sql).map_err(|e| {
            StoreError::Database(format!("migration {} failed: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?, ?)",
            params![migration.name, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(db)?;
        tx.commit().map_err(db)?;

        info!(migration = migration.name, "Applied migration");
        applied.push(migration.name.to_string());
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM schema_migrations ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_applies_in_lexicographic_order_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = [
            Migration {
                name: "0002_b.sql",
                sql: "ALTER TABLE t ADD COLUMN b TEXT;",
            },
            Migration {
                name: "0001_a.sql",
                sql: "CREATE TABLE t (a TEXT);",
            },
        ];

        let applied = run_migrations(&mut conn, &migrations).unwrap();
        assert_eq!(applied, vec!["0001_a.sql", "0002_b.sql"]);

        let again = run_migrations(&mut conn, &migrations).unwrap();
        assert!(again.is_empty());
        assert_eq!(applied_names(&conn), vec!["0001_a.sql", "0002_b.sql"]);
    }

    #[test]
    fn test_failed_migration_rolls_back_and_is_not_recorded() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrations = [
            Migration {
                name: "0001_ok.sql",
                sql: "CREATE TABLE ok (a TEXT);",
            },
            Migration {
                name: "0002_bad.sql",
                sql: "CREATE TABLE half (a TEXT); THIS IS NOT SQL;",
            },
        ];

        let err = run_migrations(&mut conn, &migrations).unwrap_err();
        assert!(err.to_string().contains("0002_bad.sql"));
        assert_eq!(applied_names(&conn), vec!["0001_ok.sql"]);

        let half: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE name = 'half'",
                [],
                |row| row.get(0),
            )
            .optional()
            .unwrap();
        assert!(half.is_none());
    }

    #[test]
    fn test_shipped_migrations_apply() {
        let mut conn = Connection::open_in_memory().unwrap();
        let applied = run_migrations(&mut conn, MIGRATIONS).unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
    }
}
