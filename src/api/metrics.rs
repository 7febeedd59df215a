use actix_web::{HttpResponse, Responder};

use crate::metrics::METRICS;

/// 服务自身的运行指标
pub async fn get_metrics() -> impl Responder {
    match METRICS.render() {
        Ok(metrics_text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics_text),
        Err(e) => {
            log::error!("Failed to render metrics: {}", e);
            HttpResponse::InternalServerError().body("Failed to render metrics")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};

    #[actix_rt::test]
    async fn test_exposes_dashboard_counters() {
        METRICS.monitor_cycles.inc();
        let app = test::init_service(App::new().route("/metrics", web::get().to(get_metrics))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("dashboard_monitor_cycles_total"));
    }
}
