//! SQLite-backed order store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use super::migrations::{run_migrations, MIGRATIONS};
use super::store::{OrderStore, StoreError};
use super::types::{
    Bracket, ListPage, NewBracket, NewStoredFile, Order, OrderStatus, ProviderSnapshot,
    StoredFile,
};
use crate::metrics::ORDER_TRANSITIONS;

const ORDER_COLUMNS: &str = "id, user_id, status, progress, metadata, name, provider_status, \
     is_processing, is_merging, is_deleted, total_images, provider_last_updated_at, \
     error_message, created_at, updated_at";

const BRACKET_COLUMNS: &str =
    "id, order_id, bracket_id, image_id, filename, upload_url, is_uploaded, metadata, created_at";

const FILE_COLUMNS: &str = "id, order_id, user_id, filename, provider_image_id, storage_path, \
     storage_url, file_size, mime_type, is_final, created_at";

/// SQLite-backed order store.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db)?;
        Self::initialize(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db)?;
        Self::initialize(conn)
    }

    fn initialize(mut conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db)?;
        run_migrations(&mut conn, MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn load_order(conn: &Connection, id: Uuid) -> Result<Option<Order>, StoreError> {
        conn.query_row(
            &format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS),
            params![id.to_string()],
            row_to_order,
        )
        .optional()
        .map_err(db)
    }

    fn require_order(conn: &Connection, id: Uuid) -> Result<Order, StoreError> {
        Self::load_order(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("order {}", id)))
    }
}

fn db(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Constraint violations become conflicts; everything else is a database error.
fn write_err(e: rusqlite::Error, what: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(format!("{}: {}", what, e))
        }
        _ => db(e),
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion(idx, e))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion(idx, e))
    })
    .transpose()
}

fn json_at(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion(idx, e))
}

fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let status: String = row.get(2)?;
    Ok(Order {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        status: status.parse().map_err(|e: String| conversion(2, e))?,
        progress: row.get(3)?,
        metadata: json_at(row, 4)?,
        name: row.get(5)?,
        provider_status: row.get(6)?,
        is_processing: row.get(7)?,
        is_merging: row.get(8)?,
        is_deleted: row.get(9)?,
        total_images: row.get(10)?,
        provider_last_updated_at: opt_time_at(row, 11)?,
        error_message: row.get(12)?,
        created_at: time_at(row, 13)?,
        updated_at: time_at(row, 14)?,
    })
}

fn row_to_bracket(row: &Row) -> rusqlite::Result<Bracket> {
    Ok(Bracket {
        id: uuid_at(row, 0)?,
        order_id: uuid_at(row, 1)?,
        bracket_id: row.get(2)?,
        image_id: row.get(3)?,
        filename: row.get(4)?,
        upload_url: row.get(5)?,
        is_uploaded: row.get(6)?,
        metadata: json_at(row, 7)?,
        created_at: time_at(row, 8)?,
    })
}

fn row_to_file(row: &Row) -> rusqlite::Result<StoredFile> {
    Ok(StoredFile {
        id: uuid_at(row, 0)?,
        order_id: uuid_at(row, 1)?,
        user_id: uuid_at(row, 2)?,
        filename: row.get(3)?,
        provider_image_id: row.get(4)?,
        storage_path: row.get(5)?,
        storage_url: row.get(6)?,
        file_size: row.get(7)?,
        mime_type: row.get(8)?,
        is_final: row.get(9)?,
        created_at: time_at(row, 10)?,
    })
}

impl OrderStore for SqliteOrderStore {
    fn create_order(&self, id: Uuid, user_id: Uuid, metadata: Value) -> Result<Order, StoreError> {
        let conn = self.conn()?;
        let now = now();

        conn.execute(
            "INSERT INTO orders (id, user_id, status, progress, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, 0, ?, ?, ?)",
            params![
                id.to_string(),
                user_id.to_string(),
                OrderStatus::Created.as_str(),
                metadata.to_string(),
                ts(&now),
                ts(&now),
            ],
        )
        .map_err(|e| write_err(e, "order already exists"))?;

        ORDER_TRANSITIONS
            .with_label_values(&[OrderStatus::Created.as_str()])
            .inc();
        Self::require_order(&conn, id)
    }

    fn get_order(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM orders WHERE id = ? AND user_id = ?",
                ORDER_COLUMNS
            ),
            params![id.to_string(), user_id.to_string()],
            row_to_order,
        )
        .optional()
        .map_err(db)
    }

    fn get_order_by_id_no_user(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let conn = self.conn()?;
        Self::load_order(&conn, id)
    }

    fn list_orders(&self, user_id: Uuid, page: ListPage) -> Result<Vec<Order>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM orders WHERE user_id = ? \
                 ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                ORDER_COLUMNS
            ))
            .map_err(db)?;

        let orders = stmt
            .query_map(
                params![user_id.to_string(), page.limit, page.offset],
                row_to_order,
            )
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(orders)
    }

    fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        progress: u8,
    ) -> Result<Order, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db)?;

        let current = Self::require_order(&tx, id)?;
        if !current.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                order_id: id,
                from: current.status,
                to: status,
            });
        }

        tx.execute(
            "UPDATE orders SET status = ?, progress = ?, updated_at = ? WHERE id = ?",
            params![
                status.as_str(),
                status.normalize_progress(progress as i64),
                ts(&now()),
                id.to_string(),
            ],
        )
        .map_err(db)?;

        let order = Self::require_order(&tx, id)?;
        tx.commit().map_err(db)?;

        if current.status != status {
            ORDER_TRANSITIONS.with_label_values(&[status.as_str()]).inc();
        }
        Ok(order)
    }

    fn update_order_error(&self, id: Uuid, message: &str) -> Result<Order, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db)?;

        let current = Self::require_order(&tx, id)?;
        if !current.status.can_transition_to(OrderStatus::Failed) {
            return Err(StoreError::InvalidTransition {
                order_id: id,
                from: current.status,
                to: OrderStatus::Failed,
            });
        }

        tx.execute(
            "UPDATE orders SET status = ?, progress = ?, error_message = ?, updated_at = ? \
             WHERE id = ?",
            params![
                OrderStatus::Failed.as_str(),
                OrderStatus::Failed.normalize_progress(current.progress as i64),
                message,
                ts(&now()),
                id.to_string(),
            ],
        )
        .map_err(db)?;

        let order = Self::require_order(&tx, id)?;
        tx.commit().map_err(db)?;

        if current.status != OrderStatus::Failed {
            ORDER_TRANSITIONS
                .with_label_values(&[OrderStatus::Failed.as_str()])
                .inc();
        }
        Ok(order)
    }

    fn sync_provider_fields(
        &self,
        id: Uuid,
        snapshot: &ProviderSnapshot,
    ) -> Result<Order, StoreError> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE orders SET name = COALESCE(?, name), provider_status = ?, \
                 is_processing = ?, is_merging = ?, is_deleted = ?, total_images = ?, \
                 provider_last_updated_at = ?, updated_at = ? WHERE id = ?",
                params![
                    snapshot.name,
                    snapshot.provider_status,
                    snapshot.is_processing,
                    snapshot.is_merging,
                    snapshot.is_deleted,
                    snapshot.total_images,
                    snapshot.updated_at.as_ref().map(ts),
                    ts(&now()),
                    id.to_string(),
                ],
            )
            .map_err(db)?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("order {}", id)));
        }
        Self::require_order(&conn, id)
    }

    fn delete_order(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM orders WHERE id = ? AND user_id = ?",
                params![id.to_string(), user_id.to_string()],
            )
            .map_err(db)?;
        Ok(deleted > 0)
    }

    fn create_bracket(&self, bracket: NewBracket) -> Result<Bracket, StoreError> {
        let conn = self.conn()?;
        let id = Uuid::new_v4();
        let now = now();

        conn.execute(
            &format!(
                "INSERT INTO brackets ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                BRACKET_COLUMNS
            ),
            params![
                id.to_string(),
                bracket.order_id.to_string(),
                bracket.bracket_id,
                bracket.image_id,
                bracket.filename,
                bracket.upload_url,
                bracket.is_uploaded,
                bracket.metadata.to_string(),
                ts(&now),
            ],
        )
        .map_err(|e| write_err(e, &format!("bracket {}", bracket.bracket_id)))?;

        Ok(Bracket {
            id,
            order_id: bracket.order_id,
            bracket_id: bracket.bracket_id,
            image_id: bracket.image_id,
            filename: bracket.filename,
            upload_url: bracket.upload_url,
            is_uploaded: bracket.is_uploaded,
            metadata: bracket.metadata,
            created_at: now,
        })
    }

    fn get_brackets_by_order(&self, order_id: Uuid) -> Result<Vec<Bracket>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM brackets WHERE order_id = ? ORDER BY rowid",
                BRACKET_COLUMNS
            ))
            .map_err(db)?;

        let brackets = stmt
            .query_map(params![order_id.to_string()], row_to_bracket)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(brackets)
    }

    fn update_bracket_image_id(&self, id: Uuid, image_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE brackets SET image_id = ? WHERE id = ?",
                params![image_id, id.to_string()],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("bracket {}", id)));
        }
        Ok(())
    }

    fn delete_bracket(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM brackets WHERE id = ?", params![id.to_string()])
            .map_err(db)?;
        Ok(deleted > 0)
    }

    fn create_stored_file(&self, file: NewStoredFile) -> Result<StoredFile, StoreError> {
        let conn = self.conn()?;

        conn.execute(
            &format!(
                "INSERT INTO stored_files ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (user_id, order_id, storage_path) DO UPDATE SET \
                 filename = excluded.filename, \
                 provider_image_id = excluded.provider_image_id, \
                 storage_url = excluded.storage_url, \
                 file_size = excluded.file_size, \
                 mime_type = excluded.mime_type, \
                 is_final = excluded.is_final",
                FILE_COLUMNS
            ),
            params![
                Uuid::new_v4().to_string(),
                file.order_id.to_string(),
                file.user_id.to_string(),
                file.filename,
                file.provider_image_id,
                file.storage_path,
                file.storage_url,
                file.file_size,
                file.mime_type,
                file.is_final,
                ts(&now()),
            ],
        )
        .map_err(|e| write_err(e, &format!("stored file {}", file.storage_path)))?;

        conn.query_row(
            &format!(
                "SELECT {} FROM stored_files \
                 WHERE user_id = ? AND order_id = ? AND storage_path = ?",
                FILE_COLUMNS
            ),
            params![
                file.user_id.to_string(),
                file.order_id.to_string(),
                file.storage_path
            ],
            row_to_file,
        )
        .map_err(db)
    }

    fn get_stored_files(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<StoredFile>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM stored_files WHERE order_id = ? AND user_id = ? ORDER BY rowid",
                FILE_COLUMNS
            ))
            .map_err(db)?;

        let files = stmt
            .query_map(
                params![order_id.to_string(), user_id.to_string()],
                row_to_file,
            )
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(files)
    }

    fn delete_stored_file(&self, id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM stored_files WHERE id = ?",
                params![id.to_string()],
            )
            .map_err(db)?;
        Ok(deleted > 0)
    }

    fn count_orders_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM orders GROUP BY status")
            .map_err(db)?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let status: OrderStatus = status.parse().map_err(|e: String| conversion(0, e))?;
                Ok((status, count))
            })
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(rows)
    }
}
