use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::{store_error, success, supervisor_error};
use crate::models::RestartPolicy;
use crate::services::{run_batch, BatchAction};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignGroupRequest {
    /// null 表示移出分组
    #[serde(default)]
    pub group_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub action: BatchAction,
    pub ids: Vec<u32>,
}

/// 一次性返回合并后的进程列表
pub async fn list_processes(data: web::Data<AppState>) -> HttpResponse {
    match data.context().merged_view().await {
        Ok((_, merged)) => HttpResponse::Ok().json(merged),
        Err(e) => supervisor_error(e),
    }
}

pub async fn batch(data: web::Data<AppState>, req: web::Json<BatchRequest>) -> HttpResponse {
    let req = req.into_inner();
    let outcome = run_batch(data.supervisor.as_ref(), req.action, &req.ids).await;
    HttpResponse::Ok().json(outcome)
}

pub async fn assign_group(
    data: web::Data<AppState>,
    path: web::Path<u32>,
    req: web::Json<AssignGroupRequest>,
) -> HttpResponse {
    let process_id = path.into_inner();
    match data.groups.assign_group(process_id, req.group_id).await {
        Ok(()) => match req.group_id {
            Some(group_id) => success(format!("Process {} assigned to group {}", process_id, group_id)),
            None => success(format!("Process {} removed from its group", process_id)),
        },
        Err(e) => store_error(e),
    }
}

pub async fn set_restart_policy(
    data: web::Data<AppState>,
    path: web::Path<u32>,
    req: web::Json<RestartPolicy>,
) -> HttpResponse {
    let process_id = path.into_inner();
    let policy = req.into_inner();
    match data.config_store.set_restart_policy(process_id, policy).await {
        Ok(()) => {
            log::info!(
                "✓ Process {} restart policy: auto={} max={}",
                process_id,
                policy.auto_restart,
                policy.max_restarts
            );
            success(format!("Process {} restart policy updated", process_id))
        }
        Err(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure;
    use crate::api::testing::test_state;
    use crate::models::{NewTaskGroup, ProcessStatus};
    use crate::services::supervisor::testing::{snapshot, ScriptedSupervisor};
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn scripted() -> Arc<ScriptedSupervisor> {
        Arc::new(ScriptedSupervisor::with_snapshots(vec![
            snapshot(1, ProcessStatus::Online),
            snapshot(2, ProcessStatus::Stopped),
        ]))
    }

    #[actix_rt::test]
    async fn test_list_reflects_group_and_policy() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(scripted(), &dir);
        let group = state
            .groups
            .create_group(NewTaskGroup {
                name: "web".into(),
                description: None,
                color: None,
            })
            .await
            .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/processes/1/group")
            .set_json(json!({ "groupId": group.id }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::put()
            .uri("/api/processes/2/restart-policy")
            .set_json(json!({ "autoRestart": false, "maxRestarts": 3 }))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get().uri("/api/processes").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], 1);
        assert_eq!(list[0]["groupId"], group.id);
        assert_eq!(list[0]["autoRestart"], true);
        assert_eq!(list[1]["groupId"], Value::Null);
        assert_eq!(list[1]["autoRestart"], false);
        assert_eq!(list[1]["maxRestarts"], 3);
    }

    #[actix_rt::test]
    async fn test_assign_unknown_group_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(scripted(), &dir)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/api/processes/1/group")
            .set_json(json!({ "groupId": 77 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Group 77 not found");
    }

    #[actix_rt::test]
    async fn test_batch_tally() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = scripted();
        supervisor.failing_ids.lock().unwrap().insert(2);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(supervisor.clone(), &dir)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/processes/batch")
            .set_json(json!({ "action": "restart", "ids": [1, 2, 3] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["errors"], json!(["Process 2: restart failed: exit status 1"]));

        let req = test::TestRequest::post()
            .uri("/api/processes/batch")
            .set_json(json!({ "action": "explode", "ids": [1] }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
        assert_eq!(supervisor.actions.lock().unwrap().len(), 3);
    }

    #[actix_rt::test]
    async fn test_list_fetch_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = scripted();
        supervisor.fail_list.store(true, Ordering::SeqCst);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(supervisor, &dir)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/processes").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 500);
    }
}
