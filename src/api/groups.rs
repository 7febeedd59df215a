use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use super::{error_response, store_error, success};
use crate::models::group::is_valid_color;
use crate::models::{NewTaskGroup, TaskGroupPatch};
use crate::state::AppState;

fn validate(name: Option<&str>, color: Option<&str>) -> Result<(), HttpResponse> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(error_response(StatusCode::BAD_REQUEST, "Group name must not be empty"));
    }
    if let Some(color) = color {
        if !is_valid_color(color) {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid color '{}', expected #RRGGBB", color),
            ));
        }
    }
    Ok(())
}

pub async fn list_groups(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.groups.list_groups().await)
}

pub async fn create_group(data: web::Data<AppState>, req: web::Json<NewTaskGroup>) -> HttpResponse {
    let new = req.into_inner();
    if let Err(resp) = validate(Some(new.name.as_str()), new.color.as_deref()) {
        return resp;
    }
    match data.groups.create_group(new).await {
        Ok(group) => HttpResponse::Created().json(group),
        Err(e) => store_error(e),
    }
}

pub async fn update_group(
    data: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<TaskGroupPatch>,
) -> HttpResponse {
    let patch = req.into_inner();
    if let Err(resp) = validate(patch.name.as_deref(), patch.color.as_deref()) {
        return resp;
    }
    match data.groups.update_group(path.into_inner(), patch).await {
        Ok(group) => HttpResponse::Ok().json(group),
        Err(e) => store_error(e),
    }
}

pub async fn delete_group(data: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    match data.groups.delete_group(id).await {
        Ok(()) => success(format!("Group {} deleted", id)),
        Err(e) => store_error(e),
    }
}
