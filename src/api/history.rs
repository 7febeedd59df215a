use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error_response;
use crate::models::{LogQuery, MetricQuery};
use crate::state::AppState;

const MAX_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct MetricHistoryParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LogHistoryParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

fn check_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: Option<usize>,
) -> Result<(), HttpResponse> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(error_response(StatusCode::BAD_REQUEST, "start must not be after end"));
        }
    }
    match limit {
        Some(0) => Err(error_response(StatusCode::BAD_REQUEST, "limit must be at least 1")),
        Some(n) if n > MAX_LIMIT => Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("limit must not exceed {}", MAX_LIMIT),
        )),
        _ => Ok(()),
    }
}

/// 指标历史，按时间升序返回窗口内最新的 limit 条
pub async fn metric_history(
    data: web::Data<AppState>,
    path: web::Path<u32>,
    params: web::Query<MetricHistoryParams>,
) -> HttpResponse {
    let params = params.into_inner();
    if let Err(resp) = check_window(params.start, params.end, params.limit) {
        return resp;
    }

    let samples = data
        .config_store
        .query_metrics(
            path.into_inner(),
            MetricQuery {
                start: params.start,
                end: params.end,
                limit: params.limit,
            },
        )
        .await;
    HttpResponse::Ok().json(samples)
}

/// 日志历史，keyword 为区分大小写的子串过滤
pub async fn log_history(
    data: web::Data<AppState>,
    path: web::Path<u32>,
    params: web::Query<LogHistoryParams>,
) -> HttpResponse {
    let params = params.into_inner();
    if let Err(resp) = check_window(params.start, params.end, params.limit) {
        return resp;
    }

    let lines = data
        .config_store
        .query_logs(
            path.into_inner(),
            LogQuery {
                start: params.start,
                end: params.end,
                keyword: params.keyword.filter(|k| !k.is_empty()),
                limit: params.limit,
            },
        )
        .await;
    HttpResponse::Ok().json(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure;
    use crate::api::testing::test_state;
    use crate::models::{LogLine, MetricSample, StreamKind};
    use crate::services::supervisor::testing::ScriptedSupervisor;
    use actix_web::{test, App};
    use chrono::TimeZone;
    use serde_json::Value;
    use std::sync::Arc;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    #[actix_rt::test]
    async fn test_metric_history_window_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(Arc::new(ScriptedSupervisor::default()), &dir);
        let samples = (0..10)
            .map(|m| MetricSample {
                process_id: 4,
                cpu: m as f32,
                memory: 1024,
                timestamp: at(m),
            })
            .collect();
        assert_eq!(state.config_store.insert_metric_samples(samples).await, 10);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/processes/4/metrics?start=2024-05-01T10:02:00Z&end=2024-05-01T10:07:00Z&limit=3")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let cpus: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["cpu"].as_f64().unwrap())
            .collect();
        assert_eq!(cpus, vec![5.0, 6.0, 7.0]);

        let req = test::TestRequest::get().uri("/api/processes/5/metrics").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.as_array().unwrap().is_empty());

        let req = test::TestRequest::get()
            .uri("/api/processes/4/metrics?start=2024-05-01T10:07:00Z&end=2024-05-01T10:02:00Z")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::get()
            .uri("/api/processes/4/metrics?limit=0")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_rt::test]
    async fn test_log_history_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(Arc::new(ScriptedSupervisor::default()), &dir);
        for (m, content) in ["GET /health 200", "POST /login 500", "GET /users 200"]
            .iter()
            .enumerate()
        {
            state
                .config_store
                .insert_log_line(LogLine {
                    process_id: 2,
                    kind: StreamKind::Stdout,
                    content: content.to_string(),
                    timestamp: at(m as u32),
                })
                .await;
        }

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/processes/2/logs?keyword=GET")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let contents: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["GET /health 200", "GET /users 200"]);
        assert_eq!(body[0]["kind"], "stdout");
        assert_eq!(body[0]["processId"], 2);

        let req = test::TestRequest::get()
            .uri("/api/processes/2/logs?keyword=get")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.as_array().unwrap().is_empty());
    }
}
