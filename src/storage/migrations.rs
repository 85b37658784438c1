//! 数据库迁移
//!
//! 版本号记录在 SQLite 的 `user_version` 中，每个迁移在独立事务里执行，
//! 失败时整体回滚，版本号保持不变。

use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::storage::{StorageError, StorageResult};

/// 当前数据库 schema 版本
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// 按版本号升序排列
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "练习选项与会话元数据",
    sql: include_str!("schema.sql"),
}];

pub fn schema_version(conn: &Connection) -> StorageResult<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// 把数据库升级到 [`CURRENT_SCHEMA_VERSION`]，返回最终版本号
///
/// 数据库版本比程序新时拒绝打开。
pub fn run_migrations(conn: &Connection) -> StorageResult<i32> {
    let mut version = schema_version(conn)?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "数据库版本 v{version} 高于程序支持的 v{CURRENT_SCHEMA_VERSION}"
        )));
    }

    for migration in MIGRATIONS.iter().filter(move |m| m.version > version) {
        info!(version = migration.version, name = migration.name, "applying migration");
        if let Err(e) = apply(conn, migration) {
            error!(version = migration.version, error = %e, "migration failed");
            return Err(e);
        }
        version = migration.version;
    }

    debug!(version, "schema up to date");
    Ok(version)
}

fn apply(conn: &Connection, migration: &Migration) -> StorageResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql).map_err(|e| {
        StorageError::Migration(format!("迁移 v{} 执行失败: {}", migration.version, e))
    })?;
    tx.pragma_update(None, "user_version", migration.version)?;
    tx.commit()?;
    Ok(())
}
