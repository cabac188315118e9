use actix_identity::Identity;
use actix_web::{get, web::Data, HttpResponse, Responder};
use chrono::{Duration, Local};

use crate::{
    db,
    errors::AppError,
    routes::{base_context, redirect, render, user_id},
    structs::{ServiceFilter, TaskFilter, TaskStatus},
    AppState,
};

const UPCOMING_SERVICE_DAYS: i64 = 14;

#[get("/")]
pub async fn index_handler(identity: Option<Identity>) -> Result<HttpResponse, AppError> {
    if identity.is_some() {
        return Ok(redirect("/dashboard"));
    }
    let mut context = base_context("Welcome", false);
    context.insert("description", "Plan projects, contracts, tasks and services on one timeline.");
    render("home.html", &context)
}

#[get("/dashboard")]
pub async fn dashboard_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let uid = user_id(identity)?;
    let today = Local::now().date_naive();

    let profile = db::get_profile(&state, uid).await?;
    let project_counts = db::project_status_counts(&state, uid).await?;
    let projects = db::list_projects_for_user(&state, uid, &Default::default()).await?;
    let overdue = db::overdue_tasks(&state, uid, today).await?;
    let my_tasks = db::list_tasks_for_user(
        &state,
        uid,
        &TaskFilter {
            assignee_id: Some(uid),
            ..TaskFilter::default()
        },
    )
    .await?
    .into_iter()
    .filter(|t| t.status != TaskStatus::Done)
    .collect::<Vec<_>>();
    let upcoming = db::list_services_for_user(
        &state,
        uid,
        &ServiceFilter {
            status: None,
            from: Some(today),
            to: Some(today + Duration::days(UPCOMING_SERVICE_DAYS)),
        },
    )
    .await?;

    let mut context = base_context("Dashboard", true);
    context.insert("profile", &profile);
    context.insert("project_counts", &project_counts);
    context.insert("projects", &projects);
    context.insert("overdue", &overdue);
    context.insert("my_tasks", &my_tasks);
    context.insert("upcoming", &upcoming);
    context.insert("today", &today);
    render("dashboard.html", &context)
}
