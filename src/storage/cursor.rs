//! 游标侧存储
//!
//! 每个分区的当前位置单独存放在一个小 JSON 文件中，与选项数据库互不依赖。
//! 这里的任何失败都只记录日志：读不到时游标为 0，写不进时保持内存中的值。

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::storage::Partition;

/// 分区游标的键值存储
#[derive(Debug, Default)]
pub struct CursorStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, usize>,
}

impl CursorStore {
    /// 打开（或延迟创建）指定路径的游标文件
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match read_values(&path) {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cursor store unreadable, starting from 0"
                );
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            values,
        }
    }

    /// 只保存在内存中的游标（不落盘）
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, partition: Partition) -> usize {
        self.values
            .get(partition.cursor_key())
            .copied()
            .unwrap_or(0)
    }

    /// 写入游标并立即落盘
    pub fn set(&mut self, partition: Partition, index: usize) {
        self.values.insert(partition.cursor_key().to_string(), index);

        let Some(path) = self.path.as_deref() else {
            return;
        };
        match write_values(path, &self.values) {
            Ok(()) => debug!(partition = %partition, index, "cursor persisted"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to persist cursor"),
        }
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, usize>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&raw)?)
}

/// 写临时文件后原子替换
fn write_values(path: &Path, values: &BTreeMap<String, usize>) -> std::io::Result<()> {
    let parent_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(&temp_file);
        serde_json::to_writer(&mut writer, values)?;
        writer.flush()?;
    }

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
