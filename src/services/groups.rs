use log::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{NewTaskGroup, TaskGroup, TaskGroupPatch};
use crate::store::{ConfigStore, FallbackStore};

/// 分组读写路由：优先写配置库，失败时改写 fallback 存储
#[derive(Clone)]
pub struct GroupService {
    config: ConfigStore,
    fallback: FallbackStore,
}

impl GroupService {
    pub fn new(config: ConfigStore, fallback: FallbackStore) -> Self {
        Self { config, fallback }
    }

    /// 两个存储中的全部分组，id 冲突时以配置库为准
    pub async fn list_groups(&self) -> Vec<TaskGroup> {
        let mut groups = self.config.list_groups().await;
        for group in self.fallback.groups().await {
            if !groups.iter().any(|g| g.id == group.id) {
                groups.push(group);
            }
        }
        groups
    }

    pub async fn find_group(&self, id: i64) -> Option<TaskGroup> {
        self.list_groups().await.into_iter().find(|g| g.id == id)
    }

    pub async fn create_group(&self, new: NewTaskGroup) -> StoreResult<TaskGroup> {
        match self.config.create_group(new.clone()).await {
            Ok(group) => {
                info!("✓ Group {} '{}' created", group.id, group.name);
                Ok(group)
            }
            Err(e) => {
                warn!("Config store create_group failed ({}), using fallback store", e);
                self.fallback.create_group(new).await
            }
        }
    }

    pub async fn update_group(&self, id: i64, patch: TaskGroupPatch) -> StoreResult<TaskGroup> {
        match self.config.update_group(id, patch.clone()).await {
            Ok(group) => Ok(group),
            Err(StoreError::NotFound(_)) => self.fallback.update_group(id, patch).await,
            Err(e) => {
                warn!("Config store update_group failed ({}), using fallback store", e);
                self.fallback.update_group(id, patch).await
            }
        }
    }

    /// 在两个存储中都删除，并把指向该分组的归属置空
    pub async fn delete_group(&self, id: i64) -> StoreResult<()> {
        let in_config = match self.config.delete_group(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Config store delete_group failed: {}", e);
                false
            }
        };
        let in_fallback = self.fallback.delete_group(id).await?;

        if in_config || in_fallback {
            info!("✓ Group {} deleted", id);
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("Group {}", id)))
        }
    }

    /// 设置进程分组；配置库写入成功后清除 fallback 中的旧记录
    pub async fn assign_group(&self, process_id: u32, group_id: Option<i64>) -> StoreResult<()> {
        if let Some(group_id) = group_id {
            if self.find_group(group_id).await.is_none() {
                return Err(StoreError::NotFound(format!("Group {}", group_id)));
            }
        }

        match self.config.assign_group(process_id, group_id).await {
            Ok(()) => {
                if let Err(e) = self.fallback.remove_assignment(process_id).await {
                    warn!("Failed to clear fallback assignment for process {}: {}", process_id, e);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Config store assign_group failed ({}), using fallback store", e);
                self.fallback.assign_group(process_id, group_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessStatus;
    use crate::services::merger::merge;
    use crate::services::supervisor::testing::snapshot;
    use crate::store::fallback_store::FALLBACK_GROUP_ID_BASE;

    fn web() -> NewTaskGroup {
        NewTaskGroup {
            name: "web".into(),
            description: None,
            color: Some("#3B82F6".into()),
        }
    }

    fn service(config: ConfigStore, dir: &tempfile::TempDir) -> GroupService {
        GroupService::new(config, FallbackStore::new(dir.path().join("fallback.json")))
    }

    async fn merged_group(service: &GroupService, process_id: u32) -> Option<i64> {
        let snapshots = vec![snapshot(process_id, ProcessStatus::Online)];
        let configs = service.config.list_process_configs().await;
        let fallback = service.fallback.assignments().await;
        merge(&snapshots, &configs, &fallback)[0].group_id
    }

    #[tokio::test]
    async fn test_round_trip_durable() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(ConfigStore::open_in_memory().unwrap(), &dir);

        let group = service.create_group(web()).await.unwrap();
        let groups = service.list_groups().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "web");
        assert_eq!(groups[0].color, "#3B82F6");
        assert_eq!(groups[0].id, group.id);

        service.assign_group(1, Some(group.id)).await.unwrap();
        assert_eq!(merged_group(&service, 1).await, Some(group.id));

        service.delete_group(group.id).await.unwrap();
        assert!(service.list_groups().await.is_empty());
        assert_eq!(merged_group(&service, 1).await, None);
    }

    #[tokio::test]
    async fn test_round_trip_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(ConfigStore::unavailable(), &dir);

        let group = service.create_group(web()).await.unwrap();
        assert_eq!(group.id, FALLBACK_GROUP_ID_BASE);
        assert_eq!(service.list_groups().await, vec![group.clone()]);

        service.assign_group(4, Some(group.id)).await.unwrap();
        assert_eq!(merged_group(&service, 4).await, Some(group.id));

        let renamed = service
            .update_group(
                group.id,
                TaskGroupPatch {
                    name: Some("api".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "api");

        service.delete_group(group.id).await.unwrap();
        assert!(service.list_groups().await.is_empty());
        assert_eq!(merged_group(&service, 4).await, None);
    }

    #[tokio::test]
    async fn test_lists_union_of_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::open_in_memory().unwrap();
        let service = service(config.clone(), &dir);

        let durable = service.create_group(web()).await.unwrap();
        let offline = service.fallback.create_group(web()).await.unwrap();

        let ids: Vec<i64> = service.list_groups().await.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![durable.id, offline.id]);

        // fallback 中的分组也能在配置库里被引用
        service.assign_group(2, Some(offline.id)).await.unwrap();
        assert_eq!(merged_group(&service, 2).await, Some(offline.id));
    }

    #[tokio::test]
    async fn test_durable_assignment_clears_fallback_entry() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(ConfigStore::open_in_memory().unwrap(), &dir);
        let a = service.create_group(web()).await.unwrap();
        let b = service.create_group(web()).await.unwrap();

        service.fallback.assign_group(3, Some(a.id)).await.unwrap();
        assert_eq!(merged_group(&service, 3).await, Some(a.id));

        service.assign_group(3, Some(b.id)).await.unwrap();
        assert!(service.fallback.assignments().await.is_empty());
        assert_eq!(merged_group(&service, 3).await, Some(b.id));
    }

    #[tokio::test]
    async fn test_unknown_group_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(ConfigStore::open_in_memory().unwrap(), &dir);
        assert!(matches!(
            service.assign_group(1, Some(5)).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_group(5).await,
            Err(StoreError::NotFound(_))
        ));
        // 取消分组不需要分组存在
        service.assign_group(1, None).await.unwrap();
    }
}
