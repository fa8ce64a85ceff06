/// Directory endpoints: departments and employees
use crate::{
    auth::{AdminAuthContext, AuthContext, Role},
    context::AppContext,
    directory::{Department, Employee},
    error::{HubError, HubResult},
};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build directory routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/directory/departments", post(create_department))
        .route("/api/directory/departments", get(list_departments))
        .route("/api/directory/departments/:id", get(get_department))
        .route("/api/directory/departments/:id", delete(delete_department))
        .route("/api/directory/employees", post(create_employee))
        .route("/api/directory/employees", get(list_employees))
        .route("/api/directory/employees/:id", get(get_employee))
        .route("/api/directory/employees/:id", delete(delete_employee))
        .route("/api/directory/employees/:id/role", post(set_role))
        .route("/api/directory/employees/:id/department", post(set_department))
}

// ========== Departments ==========

#[derive(Debug, Deserialize, Validate)]
struct CreateDepartmentRequest {
    #[validate(length(min = 1, max = 16))]
    code: String,
    #[validate(length(min = 1, max = 200))]
    name: String,
    parent_id: Option<i64>,
}

async fn create_department(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Json(req): Json<CreateDepartmentRequest>,
) -> HubResult<Json<Department>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let department = ctx
        .departments
        .create(&req.code, &req.name, req.parent_id)
        .await?;
    Ok(Json(department))
}

async fn list_departments(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
) -> HubResult<Json<Vec<Department>>> {
    Ok(Json(ctx.departments.list().await?))
}

async fn get_department(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<Department>> {
    Ok(Json(ctx.departments.get(id).await?))
}

async fn delete_department(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<i64>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.departments.delete(id).await?;
    Ok(Json(serde_json::json!({})))
}

// ========== Employees ==========

#[derive(Debug, Deserialize, Validate)]
struct CreateEmployeeRequest {
    #[validate(length(min = 1, max = 200))]
    name: String,
    #[validate(email)]
    email: String,
    department_id: Option<i64>,
    role: Option<String>,
}

async fn create_employee(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Json(req): Json<CreateEmployeeRequest>,
) -> HubResult<Json<Employee>> {
    req.validate()
        .map_err(|e| HubError::Validation(e.to_string()))?;

    let role = req
        .role
        .as_deref()
        .map(Role::from_str)
        .transpose()?
        .unwrap_or(Role::Employee);

    let employee = ctx
        .employees
        .create(&req.name, &req.email, req.department_id, role)
        .await?;
    Ok(Json(employee))
}

#[derive(Debug, Deserialize)]
struct ListEmployeesQuery {
    department_id: Option<i64>,
}

async fn list_employees(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Query(query): Query<ListEmployeesQuery>,
) -> HubResult<Json<Vec<Employee>>> {
    Ok(Json(ctx.employees.list(query.department_id).await?))
}

async fn get_employee(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(id): Path<String>,
) -> HubResult<Json<Employee>> {
    Ok(Json(ctx.employees.get(&id).await?))
}

async fn delete_employee(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.employees.delete(&id).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    role: String,
}

async fn set_role(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let role = Role::from_str(&req.role)?;
    ctx.employees.set_role(&id, role).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct SetDepartmentRequest {
    department_id: Option<i64>,
}

async fn set_department(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetDepartmentRequest>,
) -> HubResult<Json<serde_json::Value>> {
    ctx.employees.set_department(&id, req.department_id).await?;
    Ok(Json(serde_json::json!({})))
}
