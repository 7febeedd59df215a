pub mod groups;
pub mod history;
pub mod metrics;
pub mod processes;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use std::fmt::Display;

use crate::error::{StoreError, SupervisorError};
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/processes", web::get().to(processes::list_processes))
        .route("/api/processes/batch", web::post().to(processes::batch))
        .route("/api/processes/{id}/metrics", web::get().to(history::metric_history))
        .route("/api/processes/{id}/logs", web::get().to(history::log_history))
        .route("/api/processes/{id}/group", web::put().to(processes::assign_group))
        .route(
            "/api/processes/{id}/restart-policy",
            web::put().to(processes::set_restart_policy),
        )
        .route("/api/groups", web::get().to(groups::list_groups))
        .route("/api/groups", web::post().to(groups::create_group))
        .route("/api/groups/{id}", web::put().to(groups::update_group))
        .route("/api/groups/{id}", web::delete().to(groups::delete_group))
        .route("/metrics", web::get().to(metrics::get_metrics))
        .route("/health", web::get().to(health));
}

pub async fn health(data: web::Data<AppState>) -> impl Responder {
    let config_store = if data.config_store.is_available() {
        "available"
    } else {
        "unavailable"
    };
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "sessions": data.sessions.session_count(),
        "config_store": config_store
    }))
}

pub(crate) fn error_response(status: StatusCode, message: impl Display) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "status": "error",
        "message": message.to_string()
    }))
}

pub(crate) fn success(message: impl Display) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": message.to_string()
    }))
}

pub(crate) fn store_error(e: StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound(_) => error_response(StatusCode::NOT_FOUND, e),
        _ => {
            log::error!("Store operation failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub(crate) fn supervisor_error(e: SupervisorError) -> HttpResponse {
    match e {
        SupervisorError::NotFound(_) => error_response(StatusCode::NOT_FOUND, e),
        SupervisorError::Unsupported(_) => error_response(StatusCode::BAD_REQUEST, e),
        _ => {
            log::error!("Supervisor call failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::supervisor::testing::ScriptedSupervisor;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_rt::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = testing::test_state(Arc::new(ScriptedSupervisor::default()), &dir);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"], 0);
        assert_eq!(body["config_store"], "available");
    }

    #[actix_rt::test]
    async fn test_error_status_mapping() {
        assert_eq!(
            supervisor_error(SupervisorError::NotFound(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            supervisor_error(SupervisorError::Unsupported("start")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            store_error(StoreError::Unavailable).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            store_error(StoreError::NotFound("Group 1".into())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
