//! OptionEntry 数据库操作
//!
//! 按分区提供整体读取、整体替换、清空与按 key 更新。

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::storage::models::{sort_entries, OptionEntry, Partition};
use crate::storage::{StorageError, StorageResult};

/// 练习选项仓库
///
/// 同一连接上的写操作由互斥锁串行化，整体替换在单个事务内完成，
/// 并发读取只会看到完整的旧数据或完整的新数据。
pub struct OptionEntryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OptionEntryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> StorageResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 读取分区内全部记录，按 key 末尾数字升序
    pub fn get_all(&self, partition: Partition) -> StorageResult<Vec<OptionEntry>> {
        let conn = self.get_conn()?;
        Self::get_all_internal(&conn, partition)
    }

    /// 用新数据整体替换分区
    pub fn replace_all(&self, entries: &[OptionEntry], partition: Partition) -> StorageResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::remove_all_internal(&tx, partition)?;
        Self::insert_batch_internal(&tx, entries, partition)?;
        tx.commit()?;

        debug!(partition = %partition, count = entries.len(), "partition replaced");
        Ok(())
    }

    /// 清空分区
    pub fn remove_all(&self, partition: Partition) -> StorageResult<()> {
        let conn = self.get_conn()?;
        Self::remove_all_internal(&conn, partition)
    }

    /// 按 key 插入或更新若干记录
    pub fn update(&self, entries: &[OptionEntry], partition: Partition) -> StorageResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::insert_batch_internal(&tx, entries, partition)?;
        tx.commit()?;
        Ok(())
    }

    /// 只更新用户选择
    pub fn update_selection(
        &self,
        partition: Partition,
        key: &str,
        select_word: &str,
    ) -> StorageResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE option_entry SET select_word = ?1, updated_at = ?2 WHERE partition = ?3 AND key = ?4",
            params![
                select_word,
                chrono::Utc::now().to_rfc3339(),
                partition.as_str(),
                key
            ],
        )?;

        if affected == 0 {
            return Err(StorageError::NotFound(format!("{partition}/{key}")));
        }
        Ok(())
    }

    pub fn count(&self, partition: Partition) -> StorageResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM option_entry WHERE partition = ?1",
            params![partition.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ============================================================
    // 内部实现方法（接受 &Connection，可在事务内使用）
    // ============================================================

    pub fn get_all_internal(
        conn: &Connection,
        partition: Partition,
    ) -> StorageResult<Vec<OptionEntry>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT key, word, phonetic, key_word, definitions_by_pos, options, select_word
            FROM option_entry
            WHERE partition = ?1
            ORDER BY position ASC
            "#,
        )?;

        let mut entries = stmt
            .query_map(params![partition.as_str()], |row| OptionEntry::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        // position 列与 key 后缀一致，这里再按 key 排一次保证顺序契约
        sort_entries(&mut entries);
        Ok(entries)
    }

    pub fn remove_all_internal(conn: &Connection, partition: Partition) -> StorageResult<()> {
        conn.execute(
            "DELETE FROM option_entry WHERE partition = ?1",
            params![partition.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_batch_internal(
        conn: &Connection,
        entries: &[OptionEntry],
        partition: Partition,
    ) -> StorageResult<()> {
        for entry in entries {
            entry.upsert(conn, partition)?;
        }
        Ok(())
    }
}
