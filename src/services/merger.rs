use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{GroupAssignment, MergedProcess, MetricSample, ProcessConfig, ProcessSnapshot};

/// 合并 supervisor 快照、配置库和 fallback 存储
///
/// 分组优先级：fallback 中存在记录（包括显式的 null）时以 fallback 为准，
/// 否则取配置库的值，都没有则为 null。配置库里有但快照中不存在的进程会被丢弃。
/// 重启策略只来自配置库，缺省时使用默认策略。
pub fn merge(
    snapshots: &[ProcessSnapshot],
    configs: &[ProcessConfig],
    fallback: &[GroupAssignment],
) -> Vec<MergedProcess> {
    let configs: HashMap<u32, &ProcessConfig> =
        configs.iter().map(|c| (c.process_id, c)).collect();
    let fallback: HashMap<u32, Option<i64>> = fallback
        .iter()
        .map(|a| (a.process_id, a.group_id))
        .collect();

    snapshots
        .iter()
        .map(|snapshot| {
            let config = configs.get(&snapshot.id);
            let group_id = match fallback.get(&snapshot.id) {
                Some(group_id) => *group_id,
                None => config.and_then(|c| c.group_id),
            };
            MergedProcess {
                snapshot: snapshot.clone(),
                group_id,
                restart_policy: config
                    .map(|c| c.restart_policy)
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// 从快照中抽取需要写入历史的采样（只采样 online 进程）
pub fn sample_online(snapshots: &[ProcessSnapshot], timestamp: DateTime<Utc>) -> Vec<MetricSample> {
    snapshots
        .iter()
        .filter(|s| s.is_online())
        .map(|s| MetricSample {
            process_id: s.id,
            cpu: s.cpu,
            memory: s.memory,
            timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcessStatus, RestartPolicy};
    use crate::services::supervisor::testing::snapshot;

    fn config(process_id: u32, group_id: Option<i64>) -> ProcessConfig {
        ProcessConfig {
            process_id,
            group_id,
            restart_policy: RestartPolicy::default(),
        }
    }

    fn assignment(process_id: u32, group_id: Option<i64>) -> GroupAssignment {
        GroupAssignment {
            process_id,
            group_id,
        }
    }

    fn group_of(merged: &[MergedProcess], id: u32) -> Option<i64> {
        merged.iter().find(|m| m.snapshot.id == id).unwrap().group_id
    }

    #[test]
    fn test_precedence_law() {
        let snapshots: Vec<_> = (1..=6).map(|id| snapshot(id, ProcessStatus::Online)).collect();
        let configs = vec![
            config(1, Some(10)),
            config(2, Some(20)),
            config(3, None),
            config(5, Some(50)),
        ];
        let fallback = vec![
            assignment(1, Some(11)),
            assignment(3, Some(33)),
            assignment(4, Some(44)),
            assignment(5, None),
        ];

        let merged = merge(&snapshots, &configs, &fallback);
        assert_eq!(merged.len(), 6);

        for id in 1..=6u32 {
            let expected = match fallback.iter().find(|a| a.process_id == id) {
                Some(a) => a.group_id,
                None => configs
                    .iter()
                    .find(|c| c.process_id == id)
                    .and_then(|c| c.group_id),
            };
            assert_eq!(group_of(&merged, id), expected, "process {}", id);
        }

        assert_eq!(group_of(&merged, 1), Some(11));
        assert_eq!(group_of(&merged, 2), Some(20));
        assert_eq!(group_of(&merged, 3), Some(33));
        assert_eq!(group_of(&merged, 4), Some(44));
        // fallback 中显式的 null 覆盖配置库
        assert_eq!(group_of(&merged, 5), None);
        assert_eq!(group_of(&merged, 6), None);
    }

    #[test]
    fn test_unknown_processes_are_dropped() {
        let snapshots = vec![snapshot(1, ProcessStatus::Stopped)];
        let configs = vec![config(1, Some(1)), config(99, Some(2))];
        let fallback = vec![assignment(98, Some(3))];

        let merged = merge(&snapshots, &configs, &fallback);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].snapshot.id, 1);
        assert_eq!(merged[0].group_id, Some(1));
    }

    #[test]
    fn test_restart_policy_from_config() {
        let snapshots = vec![
            snapshot(1, ProcessStatus::Online),
            snapshot(2, ProcessStatus::Online),
        ];
        let configs = vec![ProcessConfig {
            process_id: 1,
            group_id: None,
            restart_policy: RestartPolicy {
                auto_restart: false,
                max_restarts: 2,
            },
        }];

        let merged = merge(&snapshots, &configs, &[]);
        assert!(!merged[0].restart_policy.auto_restart);
        assert_eq!(merged[0].restart_policy.max_restarts, 2);
        assert_eq!(merged[1].restart_policy, RestartPolicy::default());
    }

    #[test]
    fn test_preserves_snapshot_order() {
        let snapshots = vec![
            snapshot(3, ProcessStatus::Online),
            snapshot(1, ProcessStatus::Errored),
            snapshot(2, ProcessStatus::Stopped),
        ];
        let ids: Vec<u32> = merge(&snapshots, &[], &[])
            .iter()
            .map(|m| m.snapshot.id)
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_sample_online_only() {
        let snapshots = vec![
            snapshot(1, ProcessStatus::Online),
            snapshot(2, ProcessStatus::Stopped),
            snapshot(3, ProcessStatus::Errored),
            snapshot(4, ProcessStatus::Online),
        ];
        let now = Utc::now();
        let samples = sample_online(&snapshots, now);
        let ids: Vec<u32> = samples.iter().map(|s| s.process_id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert!(samples.iter().all(|s| s.timestamp == now));
    }
}
