use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{StoreError, StoreResult};
use crate::models::{GroupAssignment, NewTaskGroup, TaskGroup, TaskGroupPatch};

/// fallback 分组 id 从这里开始分配，与 SQLite 自增 id 错开
pub const FALLBACK_GROUP_ID_BASE: i64 = 1_000_000;

/// fallback 文件的完整内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackDocument {
    #[serde(default)]
    pub groups: Vec<TaskGroup>,
    /// 进程 id -> 分组 id；值为 null 表示显式取消分组
    #[serde(default)]
    pub assignments: BTreeMap<u32, Option<i64>>,
    #[serde(default = "first_group_id")]
    pub next_group_id: i64,
}

/// 临时文件序号，保证同一进程内每次写入的临时文件互不相同
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn first_group_id() -> i64 {
    FALLBACK_GROUP_ID_BASE
}

impl Default for FallbackDocument {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            assignments: BTreeMap::new(),
            next_group_id: first_group_id(),
        }
    }
}

/// 单文件 JSON 存储，配置库不可用时保存分组数据
///
/// 每次修改都会读取整个文档、修改后整体重写。没有任何锁：
/// 两个并发的修改可能基于同一份旧文档，后写入者覆盖前者的结果。
/// 这里只作为单进程的降级路径使用。
#[derive(Debug, Clone)]
pub struct FallbackStore {
    path: PathBuf,
}

impl FallbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取文档，文件不存在时返回空文档
    pub async fn load(&self) -> StoreResult<FallbackDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(FallbackDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FallbackDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// 本次写入专用的临时文件，与目标文件同目录，rename 才是原子的
    fn tmp_path(&self) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "fallback.json".into());
        name.push(format!(".{}.{}.tmp", std::process::id(), seq));
        self.path.with_file_name(name)
    }

    /// 整体重写文档
    ///
    /// 并发写入各自使用独立的临时文件，文件内容总是某一次完整的写入。
    pub async fn save(&self, doc: &FallbackDocument) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(doc)?;
        let tmp = self.tmp_path();
        let written = match tokio::fs::write(&tmp, body).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                debug!("Failed to remove {}: {}", tmp.display(), cleanup);
            }
            return Err(e.into());
        }
        debug!("Fallback store rewritten: {}", self.path.display());
        Ok(())
    }

    /// read-modify-write
    async fn mutate<T>(&self, f: impl FnOnce(&mut FallbackDocument) -> StoreResult<T>) -> StoreResult<T> {
        let mut doc = self.load().await?;
        let value = f(&mut doc)?;
        self.save(&doc).await?;
        Ok(value)
    }

    pub async fn assignments(&self) -> Vec<GroupAssignment> {
        match self.load().await {
            Ok(doc) => doc
                .assignments
                .into_iter()
                .map(|(process_id, group_id)| GroupAssignment {
                    process_id,
                    group_id,
                })
                .collect(),
            Err(e) => {
                warn!("Failed to read fallback store {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub async fn groups(&self) -> Vec<TaskGroup> {
        match self.load().await {
            Ok(doc) => doc.groups,
            Err(e) => {
                warn!("Failed to read fallback store {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    pub async fn create_group(&self, new: NewTaskGroup) -> StoreResult<TaskGroup> {
        self.mutate(move |doc| {
            let group = TaskGroup {
                id: doc.next_group_id,
                color: new.color_or_default(),
                name: new.name,
                description: new.description,
            };
            doc.next_group_id += 1;
            doc.groups.push(group.clone());
            Ok(group)
        })
        .await
    }

    pub async fn update_group(&self, id: i64, patch: TaskGroupPatch) -> StoreResult<TaskGroup> {
        self.mutate(move |doc| {
            let group = doc
                .groups
                .iter_mut()
                .find(|g| g.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("Group {}", id)))?;
            patch.apply(group);
            Ok(group.clone())
        })
        .await
    }

    /// 删除分组并把指向它的归属置为 null。返回分组是否存在。
    pub async fn delete_group(&self, id: i64) -> StoreResult<bool> {
        self.mutate(move |doc| {
            let before = doc.groups.len();
            doc.groups.retain(|g| g.id != id);
            for group_id in doc.assignments.values_mut() {
                if *group_id == Some(id) {
                    *group_id = None;
                }
            }
            Ok(doc.groups.len() != before)
        })
        .await
    }

    pub async fn assign_group(&self, process_id: u32, group_id: Option<i64>) -> StoreResult<()> {
        self.mutate(move |doc| {
            doc.assignments.insert(process_id, group_id);
            Ok(())
        })
        .await
    }

    /// 移除某个进程的 fallback 归属；没有记录时不重写文件
    pub async fn remove_assignment(&self, process_id: u32) -> StoreResult<bool> {
        let mut doc = self.load().await?;
        if doc.assignments.remove(&process_id).is_none() {
            return Ok(false);
        }
        self.save(&doc).await?;
        Ok(true)
    }
}
