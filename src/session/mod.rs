//! 练习会话缓存
//!
//! 管理两个分区（全部单词 / 重点单词）的练习选项和各自的游标：
//! - 启动时从 SQLite 恢复；数据缺失时交给后台 worker 重新生成
//! - 对选项的修改先写内存再写数据库，数据库不可用时退化为仅内存
//! - 游标每次变化立即写入独立的游标存储
//!
//! 生成是异步完成的，每次生成都带一个令牌，过期的完成消息会被忽略；
//! 已有生成在进行中时，新的重置请求会被直接忽略。

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::storage::{
    delete_meta_internal, set_meta_internal, sort_entries, CursorStore, OptionEntry,
    OptionEntryRepository, Partition, Storage, StorageError, META_INITIALIZED_AT,
};
use crate::worker::{
    GenerationError, GenerationHandle, GenerationRequest, GenerationResponse, OptionWorker,
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("记录不存在: {partition}/{key}")]
    EntryNotFound { partition: Partition, key: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// 冷启动结果
#[derive(Debug)]
pub enum ColdStart {
    /// 已从本地存储恢复
    Restored,
    /// 本地数据缺失，已启动后台生成
    Regenerating(GenerationHandle),
    /// 已有生成在进行中
    InFlight,
}

/// 练习会话缓存
pub struct SessionCache {
    storage: Option<Storage>,
    cursors: CursorStore,
    all_words: Vec<OptionEntry>,
    key_words: Vec<OptionEntry>,
    pending: Option<u64>,
    next_token: u64,
}

impl SessionCache {
    /// 按配置打开数据库与游标存储
    ///
    /// 数据库打不开时不会失败，而是以仅内存模式运行。
    pub fn open(config: &Config) -> Self {
        let storage = match Storage::open(&config.db_path) {
            Ok(storage) => Some(storage),
            Err(e) => {
                warn!(error = %e, "storage unavailable, running in memory only");
                None
            }
        };
        Self::with_stores(storage, CursorStore::open(&config.cursor_path))
    }

    pub fn with_stores(storage: Option<Storage>, cursors: CursorStore) -> Self {
        Self {
            storage,
            cursors,
            all_words: Vec::new(),
            key_words: Vec::new(),
            pending: None,
            next_token: 0,
        }
    }

    /// 是否已退化为仅内存模式
    pub fn is_degraded(&self) -> bool {
        self.storage.is_none()
    }

    /// 是否有生成正在进行
    pub fn is_generating(&self) -> bool {
        self.pending.is_some()
    }

    // ============================================================
    // 冷启动与重置
    // ============================================================

    /// 冷启动：数据完整时直接恢复，否则两个分区一起重新生成
    pub fn start(&mut self, corpus: &Corpus) -> SessionResult<ColdStart> {
        match self.load() {
            Ok(true) => {
                info!(
                    all_words = self.all_words.len(),
                    key_words = self.key_words.len(),
                    "session restored"
                );
                return Ok(ColdStart::Restored);
            }
            Ok(false) => info!("persisted session missing or incomplete, regenerating"),
            Err(e) => {
                warn!(error = %e, "failed to load persisted session, running in memory only");
                self.storage = None;
            }
        }

        Ok(match self.reset(corpus)? {
            Some(handle) => ColdStart::Regenerating(handle),
            None => ColdStart::InFlight,
        })
    }

    /// 冷启动并等待生成完成
    ///
    /// 返回两个分区是否已可用。其他调用方的生成仍在进行时（[`ColdStart::InFlight`]）
    /// 不会等待，返回 `Ok(false)`，此时分区为空，结果由持有句柄的一方写入。
    pub async fn ensure_ready(&mut self, corpus: &Corpus) -> SessionResult<bool> {
        match self.start(corpus)? {
            ColdStart::Restored => Ok(true),
            ColdStart::Regenerating(handle) => {
                let response = handle.wait().await;
                self.apply_generation(response)
            }
            ColdStart::InFlight => Ok(false),
        }
    }

    /// 从存储读取两个分区，返回数据是否完整可用
    ///
    /// 重点单词分区为空时，只有在生成完成标记存在且全部单词中确实没有重点单词时才算完整。
    pub fn load(&mut self) -> SessionResult<bool> {
        let initialized = match &self.storage {
            Some(storage) => {
                let repo = storage.option_entries();
                self.all_words = repo.get_all(Partition::AllWords)?;
                self.key_words = repo.get_all(Partition::KeyWords)?;
                storage.get_meta(META_INITIALIZED_AT)?.is_some()
            }
            None => !self.all_words.is_empty(),
        };

        for partition in Partition::ALL {
            let cursor = self.clamp(partition, self.cursors.get(partition));
            if cursor != self.cursors.get(partition) {
                self.cursors.set(partition, cursor);
            }
        }

        Ok(self.dataset_is_valid(initialized))
    }

    fn dataset_is_valid(&self, initialized: bool) -> bool {
        if self.all_words.is_empty() {
            return false;
        }
        if !self.key_words.is_empty() {
            return true;
        }
        initialized && !self.all_words.iter().any(|e| e.word.key_word)
    }

    /// 清空两个分区并启动后台生成
    ///
    /// 已有生成在进行中时返回 `Ok(None)`；词库为空时直接返回错误，不清空现有数据。
    pub fn reset(&mut self, corpus: &Corpus) -> SessionResult<Option<GenerationHandle>> {
        if let Some(token) = self.pending {
            debug!(token, "generation already in flight, reset suppressed");
            return Ok(None);
        }

        let words = corpus.flatten();
        if words.is_empty() {
            return Err(GenerationError::EmptyCorpus.into());
        }

        self.all_words.clear();
        self.key_words.clear();
        self.write_through("clear partitions", |storage| {
            storage.transaction(|conn| {
                for partition in Partition::ALL {
                    OptionEntryRepository::remove_all_internal(conn, partition)?;
                }
                delete_meta_internal(conn, META_INITIALIZED_AT)?;
                Ok(())
            })
        });

        self.next_token += 1;
        let token = self.next_token;
        self.pending = Some(token);
        info!(token, words = words.len(), "word option generation started");

        Ok(Some(OptionWorker::spawn(GenerationRequest { token, words })))
    }

    /// 处理 worker 的完成消息
    ///
    /// 令牌与当前进行中的生成不符时忽略并返回 `Ok(false)`。
    pub fn apply_generation(&mut self, response: GenerationResponse) -> SessionResult<bool> {
        if self.pending != Some(response.token) {
            warn!(
                token = response.token,
                pending = ?self.pending,
                "ignoring stale generation result"
            );
            return Ok(false);
        }
        self.pending = None;

        let generated = response.result?;
        let initialized_at = chrono::Utc::now().to_rfc3339();
        self.write_through("persist generated options", |storage| {
            storage.transaction(|conn| {
                OptionEntryRepository::remove_all_internal(conn, Partition::AllWords)?;
                OptionEntryRepository::insert_batch_internal(
                    conn,
                    &generated.all_words,
                    Partition::AllWords,
                )?;
                OptionEntryRepository::remove_all_internal(conn, Partition::KeyWords)?;
                OptionEntryRepository::insert_batch_internal(
                    conn,
                    &generated.key_words,
                    Partition::KeyWords,
                )?;
                set_meta_internal(conn, META_INITIALIZED_AT, &initialized_at)?;
                Ok(())
            })
        });

        self.all_words = generated.all_words;
        self.key_words = generated.key_words;
        for partition in Partition::ALL {
            self.cursors.set(partition, 0);
        }

        info!(
            token = response.token,
            all_words = self.all_words.len(),
            key_words = self.key_words.len(),
            "generated options applied"
        );
        Ok(true)
    }

    // ============================================================
    // 分区读写
    // ============================================================

    /// 内存中的分区数据（已排序）
    pub fn entries(&self, partition: Partition) -> &[OptionEntry] {
        match partition {
            Partition::AllWords => &self.all_words,
            Partition::KeyWords => &self.key_words,
        }
    }

    fn entries_mut(&mut self, partition: Partition) -> &mut Vec<OptionEntry> {
        match partition {
            Partition::AllWords => &mut self.all_words,
            Partition::KeyWords => &mut self.key_words,
        }
    }

    /// 从存储重新读取分区；仅内存模式下返回内存数据
    pub fn get_all(&mut self, partition: Partition) -> SessionResult<Vec<OptionEntry>> {
        if let Some(storage) = &self.storage {
            let entries = storage.option_entries().get_all(partition)?;
            *self.entries_mut(partition) = entries.clone();
            return Ok(entries);
        }
        Ok(self.entries(partition).to_vec())
    }

    /// 整体替换分区
    pub fn replace_all(&mut self, mut entries: Vec<OptionEntry>, partition: Partition) {
        sort_entries(&mut entries);
        self.write_through("replace partition", |storage| {
            storage.option_entries().replace_all(&entries, partition)
        });
        *self.entries_mut(partition) = entries;
        self.clamp_cursor(partition);
    }

    /// 清空分区
    pub fn remove_all(&mut self, partition: Partition) {
        self.write_through("remove partition", |storage| {
            storage.option_entries().remove_all(partition)
        });
        self.entries_mut(partition).clear();
        self.clamp_cursor(partition);
    }

    /// 按 key 插入或更新若干记录
    pub fn update(&mut self, entries: &[OptionEntry], partition: Partition) {
        self.write_through("update entries", |storage| {
            storage.option_entries().update(entries, partition)
        });

        let current = self.entries_mut(partition);
        let mut appended = false;
        for entry in entries {
            match current.iter_mut().find(|e| e.key == entry.key) {
                Some(existing) => *existing = entry.clone(),
                None => {
                    current.push(entry.clone());
                    appended = true;
                }
            }
        }
        if appended {
            sort_entries(current);
        }
    }

    /// 记录用户在某个单词上的选择
    pub fn record_selection(
        &mut self,
        partition: Partition,
        key: &str,
        select_word: &str,
    ) -> SessionResult<()> {
        let entry = self
            .entries_mut(partition)
            .iter_mut()
            .find(|e| e.key == key)
            .ok_or_else(|| SessionError::EntryNotFound {
                partition,
                key: key.to_string(),
            })?;
        entry.select_word = select_word.to_string();

        self.write_through("record selection", |storage| {
            storage
                .option_entries()
                .update_selection(partition, key, select_word)
        });
        Ok(())
    }

    /// 已作答数量
    pub fn answered_count(&self, partition: Partition) -> usize {
        self.entries(partition)
            .iter()
            .filter(|e| e.is_answered())
            .count()
    }

    // ============================================================
    // 游标
    // ============================================================

    pub fn cursor(&self, partition: Partition) -> usize {
        self.clamp(partition, self.cursors.get(partition))
    }

    pub fn current(&self, partition: Partition) -> Option<&OptionEntry> {
        self.entries(partition).get(self.cursor(partition))
    }

    /// 跳转到指定位置（超出范围时夹到两端），返回实际位置
    pub fn set_cursor(&mut self, partition: Partition, index: usize) -> usize {
        let index = self.clamp(partition, index);
        self.cursors.set(partition, index);
        index
    }

    /// 下一个；已在最后一个时不动
    pub fn next(&mut self, partition: Partition) -> usize {
        let cursor = self.cursor(partition);
        self.set_cursor(partition, cursor.saturating_add(1))
    }

    /// 上一个；已在第一个时不动
    pub fn previous(&mut self, partition: Partition) -> usize {
        let cursor = self.cursor(partition);
        self.set_cursor(partition, cursor.saturating_sub(1))
    }

    fn clamp(&self, partition: Partition, index: usize) -> usize {
        index.min(self.entries(partition).len().saturating_sub(1))
    }

    fn clamp_cursor(&mut self, partition: Partition) {
        let stored = self.cursors.get(partition);
        let clamped = self.clamp(partition, stored);
        if clamped != stored {
            self.cursors.set(partition, clamped);
        }
    }

    // ============================================================
    // 内部辅助
    // ============================================================

    /// 写入数据库；失败时记录日志并退化为仅内存模式
    fn write_through<F>(&mut self, operation: &str, f: F)
    where
        F: FnOnce(&Storage) -> Result<(), StorageError>,
    {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = f(storage) {
            warn!(operation, error = %e, "storage write failed, running in memory only");
            self.storage = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Word, WordGroup};

    fn corpus(n: usize, key_every: usize) -> Corpus {
        let words = (0..n)
            .map(|i| {
                Word::new(format!("w{i}"), "", key_every > 0 && i % key_every == 0)
                    .with_definition("n.", format!("d{i}"))
            })
            .collect();
        Corpus::new(vec![WordGroup {
            title: "W".to_string(),
            words,
        }])
    }

    fn cache() -> SessionCache {
        SessionCache::with_stores(Some(Storage::in_memory().unwrap()), CursorStore::in_memory())
    }

    #[tokio::test]
    async fn test_cold_start_generates_both_partitions() {
        let mut cache = cache();
        let corpus = corpus(20, 4);

        let handle = match cache.start(&corpus).unwrap() {
            ColdStart::Regenerating(handle) => handle,
            other => panic!("unexpected cold start: {other:?}"),
        };
        assert!(cache.is_generating());

        let response = handle.wait().await;
        assert!(cache.apply_generation(response).unwrap());
        assert!(!cache.is_generating());
        assert_eq!(cache.entries(Partition::AllWords).len(), 20);
        assert_eq!(cache.entries(Partition::KeyWords).len(), 5);

        // 再次启动直接从存储恢复
        assert!(matches!(cache.start(&corpus).unwrap(), ColdStart::Restored));
        assert_eq!(cache.entries(Partition::AllWords).len(), 20);
    }

    #[tokio::test]
    async fn test_reset_is_suppressed_while_in_flight() {
        let mut cache = cache();
        let corpus = corpus(10, 2);

        let first = cache.reset(&corpus).unwrap().expect("first reset starts");
        assert!(cache.reset(&corpus).unwrap().is_none());

        let response = first.wait().await;
        assert!(cache.apply_generation(response).unwrap());
        assert!(cache.reset(&corpus).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let mut cache = cache();
        let corpus = corpus(10, 2);

        let handle = cache.reset(&corpus).unwrap().unwrap();
        let mut response = handle.wait().await;
        response.token += 100;
        assert!(!cache.apply_generation(response).unwrap());
        assert!(cache.entries(Partition::AllWords).is_empty());
        assert!(cache.is_generating());
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let mut cache = cache();
        // 3 个单词不足以生成 4 个选项
        let corpus = corpus(3, 1);

        let handle = cache.reset(&corpus).unwrap().unwrap();
        let response = handle.wait().await;
        let result = cache.apply_generation(response);
        assert!(matches!(
            result,
            Err(SessionError::Generation(GenerationError::InsufficientCorpus { .. }))
        ));
        assert!(!cache.is_generating());
        assert!(cache.get_all(Partition::AllWords).unwrap().is_empty());
        assert!(cache.get_all(Partition::KeyWords).unwrap().is_empty());
    }

    #[test]
    fn test_reset_empty_corpus_is_error() {
        let mut cache = cache();
        let result = cache.reset(&Corpus::default());
        assert!(matches!(
            result,
            Err(SessionError::Generation(GenerationError::EmptyCorpus))
        ));
        assert!(!cache.is_generating());
    }

    #[tokio::test]
    async fn test_corpus_without_key_words_restores() {
        let mut cache = cache();
        let corpus = corpus(8, 0);

        cache.ensure_ready(&corpus).await.unwrap();
        assert!(cache.entries(Partition::KeyWords).is_empty());

        // 重点单词分区为空是生成结果本身，不应触发重新生成
        assert!(matches!(cache.start(&corpus).unwrap(), ColdStart::Restored));
    }

    #[tokio::test]
    async fn test_partial_presence_regenerates() {
        let mut cache = cache();
        let corpus = corpus(12, 3);
        cache.ensure_ready(&corpus).await.unwrap();

        cache.remove_all(Partition::KeyWords);
        assert!(matches!(
            cache.start(&corpus).unwrap(),
            ColdStart::Regenerating(_)
        ));
    }

    #[tokio::test]
    async fn test_cursor_clamping() {
        let mut cache = cache();
        cache.ensure_ready(&corpus(5, 0)).await.unwrap();
        let p = Partition::AllWords;

        assert_eq!(cache.cursor(p), 0);
        assert_eq!(cache.previous(p), 0);
        assert_eq!(cache.set_cursor(p, 4), 4);
        assert_eq!(cache.next(p), 4);
        assert_eq!(cache.set_cursor(p, 99), 4);
        assert_eq!(cache.previous(p), 3);
        assert_eq!(cache.current(p).unwrap().key, cache.entries(p)[3].key);
    }

    #[test]
    fn test_cursor_on_empty_partition() {
        let mut cache = cache();
        assert_eq!(cache.next(Partition::KeyWords), 0);
        assert_eq!(cache.previous(Partition::KeyWords), 0);
        assert!(cache.current(Partition::KeyWords).is_none());
    }

    #[tokio::test]
    async fn test_record_selection_persists() {
        let mut cache = cache();
        cache.ensure_ready(&corpus(6, 2)).await.unwrap();

        let entry = cache.entries(Partition::AllWords)[2].clone();
        let choice = entry.options[0].word.clone();
        cache
            .record_selection(Partition::AllWords, &entry.key, &choice)
            .unwrap();
        assert_eq!(cache.answered_count(Partition::AllWords), 1);

        let reloaded = cache.get_all(Partition::AllWords).unwrap();
        assert_eq!(reloaded[2].select_word, choice);

        let missing = cache.record_selection(Partition::AllWords, "ghost_9", "x");
        assert!(matches!(missing, Err(SessionError::EntryNotFound { .. })));
    }

    #[tokio::test]
    async fn test_in_memory_mode() {
        let mut cache = SessionCache::with_stores(None, CursorStore::in_memory());
        assert!(cache.is_degraded());

        let corpus = corpus(6, 2);
        cache.ensure_ready(&corpus).await.unwrap();
        assert_eq!(cache.get_all(Partition::AllWords).unwrap().len(), 6);

        // 仅内存模式下同一进程内再次启动可直接复用
        assert!(matches!(cache.start(&corpus).unwrap(), ColdStart::Restored));
    }
}
