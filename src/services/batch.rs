use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::services::supervisor::Supervisor;

/// 批量控制动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Start,
    Stop,
    Restart,
    Delete,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchAction::Start => "start",
            BatchAction::Stop => "stop",
            BatchAction::Restart => "restart",
            BatchAction::Delete => "delete",
        }
    }
}

/// 批量操作结果，失败不会中断其余 id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub async fn run_batch(supervisor: &dyn Supervisor, action: BatchAction, ids: &[u32]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for &id in ids {
        let result = match action {
            BatchAction::Start => supervisor.start(id).await,
            BatchAction::Stop => supervisor.stop(id).await,
            BatchAction::Restart => supervisor.restart(id).await,
            BatchAction::Delete => supervisor.delete(id).await,
        };
        match result {
            Ok(()) => outcome.success += 1,
            Err(e) => {
                warn!("Batch {} failed for process {}: {}", action.as_str(), id, e);
                outcome.failed += 1;
                outcome.errors.push(format!("Process {}: {}", id, e));
            }
        }
    }

    info!(
        "Batch {}: {} succeeded, {} failed",
        action.as_str(),
        outcome.success,
        outcome.failed
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::supervisor::testing::ScriptedSupervisor;

    #[tokio::test]
    async fn test_partial_failure_tally() {
        for ids in [[1, 2, 3], [3, 2, 1], [2, 1, 3]] {
            let supervisor = ScriptedSupervisor::default();
            supervisor.failing_ids.lock().unwrap().insert(2);

            let outcome = run_batch(&supervisor, BatchAction::Stop, &ids).await;
            assert_eq!(
                outcome,
                BatchOutcome {
                    success: 2,
                    failed: 1,
                    errors: vec!["Process 2: stop failed: exit status 1".to_string()],
                }
            );
            // 失败后仍然继续处理后面的 id
            assert_eq!(supervisor.actions.lock().unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn test_dispatches_action() {
        let supervisor = ScriptedSupervisor::default();
        let outcome = run_batch(&supervisor, BatchAction::Restart, &[4, 5]).await;
        assert_eq!(outcome.success, 2);
        assert!(outcome.errors.is_empty());
        assert_eq!(
            *supervisor.actions.lock().unwrap(),
            vec![("restart".to_string(), 4), ("restart".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let supervisor = ScriptedSupervisor::default();
        assert_eq!(
            run_batch(&supervisor, BatchAction::Delete, &[]).await,
            BatchOutcome::default()
        );
    }
}
