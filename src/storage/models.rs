//! 数据模型定义
//!
//! 练习选项及其分区，以及与数据库行之间的转换。

use chrono::Utc;
use indexmap::IndexMap;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};

use crate::corpus::Word;
use crate::storage::{StorageError, StorageResult};

// ============================================================
// Partition - 分区
// ============================================================

/// 练习数据的两个逻辑分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    /// 全部单词
    #[serde(rename = "allWords")]
    AllWords,
    /// 重点单词
    #[serde(rename = "keyWords")]
    KeyWords,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::AllWords, Partition::KeyWords];

    /// 存储中的分区名
    pub const fn as_str(self) -> &'static str {
        match self {
            Partition::AllWords => "allWords",
            Partition::KeyWords => "keyWords",
        }
    }

    /// 游标存储中的键名
    pub const fn cursor_key(self) -> &'static str {
        match self {
            Partition::AllWords => "allWordsIndex",
            Partition::KeyWords => "keyWordsIndex",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// OptionEntry - 练习选项
// ============================================================

/// 单个单词的练习记录：单词本身、4 个候选项、用户的选择与存储主键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    #[serde(flatten)]
    pub word: Word,
    /// 4 个互不相同的候选单词，包含自身
    pub options: Vec<Word>,
    /// 用户选中的单词，未作答时为空
    #[serde(rename = "selectWord")]
    pub select_word: String,
    /// `"{word}_{index}"`，index 为生成时的洗牌位置
    pub key: String,
}

impl OptionEntry {
    pub fn make_key(word: &str, index: usize) -> String {
        format!("{word}_{index}")
    }

    /// 从 key 末尾解析洗牌位置；解析失败时排在最后
    ///
    /// 单词本身可能包含下划线，所以取最后一个 `_` 之后的部分。
    pub fn position(&self) -> u64 {
        key_position(&self.key)
    }

    pub fn is_answered(&self) -> bool {
        !self.select_word.is_empty()
    }

    /// 已作答且答对
    pub fn is_correct(&self) -> bool {
        self.is_answered() && self.select_word == self.word.word
    }

    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        let definitions: IndexMap<String, String> =
            parse_json_column(row, "definitions_by_pos")?;
        let options: Vec<Word> = parse_json_column(row, "options")?;

        Ok(Self {
            word: Word {
                word: row.get("word")?,
                phonetic: row.get("phonetic")?,
                key_word: row.get::<_, i32>("key_word")? != 0,
                definitions_by_pos: definitions,
            },
            options,
            select_word: row.get("select_word")?,
            key: row.get("key")?,
        })
    }

    /// 插入或覆盖到指定分区
    pub fn upsert(&self, conn: &Connection, partition: Partition) -> StorageResult<()> {
        let definitions = serde_json::to_string(&self.word.definitions_by_pos)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let options = serde_json::to_string(&self.options)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO option_entry (
                partition, key, position, word, phonetic, key_word,
                definitions_by_pos, options, select_word, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(partition, key) DO UPDATE SET
                position = excluded.position,
                word = excluded.word,
                phonetic = excluded.phonetic,
                key_word = excluded.key_word,
                definitions_by_pos = excluded.definitions_by_pos,
                options = excluded.options,
                select_word = excluded.select_word,
                updated_at = excluded.updated_at
            "#,
            params![
                partition.as_str(),
                self.key,
                self.position() as i64,
                self.word.word,
                self.word.phonetic,
                self.word.key_word as i32,
                definitions,
                options,
                self.select_word,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }
}

/// 按 key 末尾的数字升序排序（稳定排序）
pub fn sort_entries(entries: &mut [OptionEntry]) {
    entries.sort_by_key(|entry| entry.position());
}

pub(crate) fn key_position(key: &str) -> u64 {
    key.rsplit_once('_')
        .and_then(|(_, suffix)| suffix.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

fn parse_json_column<T: serde::de::DeserializeOwned>(row: &Row, column: &str) -> SqliteResult<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| {
        let index = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}
