//! SQLite 本地存储模块
//!
//! 提供练习数据的本地持久化：
//! - 两个分区（全部单词 / 重点单词）的练习选项
//! - 会话元数据（生成完成标记）
//! - 独立于数据库的游标侧存储

// ============================================================
// 子模块声明
// ============================================================

pub mod cursor;
pub mod migrations;
pub mod models;
pub mod option_entry;

// ============================================================
// 重新导出主要类型
// ============================================================

pub use cursor::CursorStore;
pub use migrations::run_migrations;
pub use models::{sort_entries, OptionEntry, Partition};
pub use option_entry::OptionEntryRepository;

// ============================================================
// 依赖导入
// ============================================================

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

// ============================================================
// 错误类型定义
// ============================================================

/// 存储模块错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("存储不可用: {0}")]
    Unavailable(String),

    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("迁移错误: {0}")]
    Migration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("数据未找到: {0}")]
    NotFound(String),

    #[error("锁获取失败: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// 会话元数据：最近一次成功生成的时间
pub const META_INITIALIZED_AT: &str = "initialized_at";

// ============================================================
// Storage - 统一存储结构体
// ============================================================

/// 统一存储结构体
///
/// 持有一个共享连接，提供对各 Repository 的便捷访问。
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Storage {
    /// 打开数据库文件并运行迁移
    ///
    /// 目录不存在时自动创建；任何打开失败都归为 [`StorageError::Unavailable`]。
    pub fn open<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }

        let connection = Connection::open(path)
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;

        // 启用 WAL 模式以提高并发性能
        connection
            .execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA cache_size=-64000;",
            )
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", path.display(), e)))?;

        let storage = Self::with_connection(connection, path.to_string_lossy().to_string())?;
        info!(path = %storage.db_path, "storage opened");
        Ok(storage)
    }

    /// 创建内存数据库（用于测试）
    pub fn in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::with_connection(connection, ":memory:".to_string())
    }

    fn with_connection(connection: Connection, db_path: String) -> StorageResult<Self> {
        run_migrations(&connection)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(connection)),
            db_path,
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 获取练习选项仓库
    pub fn option_entries(&self) -> OptionEntryRepository {
        OptionEntryRepository::new(Arc::clone(&self.conn))
    }

    /// 执行事务
    pub fn transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }

    // ========== 会话元数据操作 ==========

    pub fn get_meta(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;
        get_meta_internal(&conn, key)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;
        set_meta_internal(&conn, key, value)
    }

    /// 删除元数据，返回是否删除了记录
    pub fn delete_meta(&self, key: &str) -> StorageResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;
        delete_meta_internal(&conn, key)
    }
}

pub fn get_meta_internal(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM session_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_meta_internal(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO session_meta (key, value, updated_at) VALUES (?1, ?2, ?3)",
        params![key, value, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn delete_meta_internal(conn: &Connection, key: &str) -> StorageResult<bool> {
    let affected = conn.execute("DELETE FROM session_meta WHERE key = ?1", [key])?;
    Ok(affected > 0)
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_is_migrated() {
        let storage = Storage::in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
        assert_eq!(storage.option_entries().count(Partition::KeyWords).unwrap(), 0);
    }

    #[test]
    fn test_transaction() {
        let storage = Storage::in_memory().unwrap();
        let result = storage.transaction(|_conn| Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let storage = Storage::in_memory().unwrap();
        let result: StorageResult<()> = storage.transaction(|conn| {
            set_meta_internal(conn, "k", "v")?;
            Err(StorageError::NotFound("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(storage.get_meta("k").unwrap(), None);
    }

    #[test]
    fn test_meta_operations() {
        let storage = Storage::in_memory().unwrap();

        storage.set_meta(META_INITIALIZED_AT, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(
            storage.get_meta(META_INITIALIZED_AT).unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );

        assert!(storage.delete_meta(META_INITIALIZED_AT).unwrap());
        assert!(!storage.delete_meta(META_INITIALIZED_AT).unwrap());
        assert_eq!(storage.get_meta(META_INITIALIZED_AT).unwrap(), None);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("practice.db");
        let storage = Storage::open(&path).unwrap();
        storage.set_meta("k", "v").unwrap();
        drop(storage);

        let reopened = Storage::open(&path).unwrap();
        assert_eq!(reopened.get_meta("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_open_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let result = Storage::open(blocker.join("practice.db"));
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
