use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{authorize, Caller, Capability};
use crate::engine::users::{NewUser, Registration, UserPage, UserQuery};
use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        // `:id` is the email on GET and the user id on PATCH
        .route("/users/:id/role", get(get_role).patch(update_role))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Serialize)]
pub struct RoleResponse {
    pub role: Role,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewUser>,
) -> Result<Response, AppError> {
    let response = match state.users.register(payload)? {
        Registration::Created(user) => (StatusCode::CREATED, Json(json!(user))).into_response(),
        Registration::Existing(user) => Json(json!({
            "message": "user already exists",
            "user": user,
        }))
        .into_response(),
    };

    Ok(response)
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserPage>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.users.list(&query)))
}

async fn get_role(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(email): Path<String>,
) -> Json<RoleResponse> {
    let role = state.users.role_of(&email).unwrap_or(Role::User);
    Json(RoleResponse { role })
}

async fn update_role(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.users.set_role(id, payload.role)?))
}
