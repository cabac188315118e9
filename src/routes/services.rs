use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data},
    HttpResponse,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::{
    db,
    errors::AppError,
    routes::{base_context, form_error, redirect, render, user_id},
    structs::{
        Service, ServiceFilter, ServiceInput, ServiceStatus, StatusOption, StatusView,
    },
    utils::{optional_text, parse_optional_date, parse_optional_id, require_text},
    AppState,
};

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct ServiceForm {
    title: String,
    notes: String,
    status: String,
    scheduled_date: String,
    end_date: String,
    project_id: String,
    vehicle_id: String,
}

impl ServiceForm {
    fn from_service(s: &Service) -> Self {
        ServiceForm {
            title: s.title.clone(),
            notes: s.notes.clone().unwrap_or_default(),
            status: s.status.as_str().to_owned(),
            scheduled_date: s.scheduled_date.to_string(),
            end_date: s.end_date.map(|d| d.to_string()).unwrap_or_default(),
            project_id: s.project_id.map(|id| id.to_string()).unwrap_or_default(),
            vehicle_id: s.vehicle_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    fn parse(&self) -> Result<ServiceInput, AppError> {
        let title = require_text("Title", &self.title)?;
        let status = ServiceStatus::parse(&self.status)
            .ok_or_else(|| AppError::Validation("Unknown service status".into()))?;
        let scheduled_date = parse_optional_date("Scheduled date", Some(&self.scheduled_date))?
            .ok_or_else(|| AppError::Validation("Scheduled date is required".into()))?;
        let end_date = parse_optional_date("End date", Some(&self.end_date))?;
        if end_date.is_some_and(|end| end < scheduled_date) {
            return Err(AppError::Validation(
                "End date must not be before the scheduled date".into(),
            ));
        }
        Ok(ServiceInput {
            project_id: parse_optional_id("Project", Some(&self.project_id))?,
            vehicle_id: parse_optional_id("Vehicle", Some(&self.vehicle_id))?,
            title,
            notes: optional_text(Some(self.notes.clone())),
            status,
            scheduled_date,
            end_date,
        })
    }
}

/// Linked project and vehicle must both be visible to the user.
async fn check_links(state: &AppState, uid: i64, input: &ServiceInput) -> Result<(), AppError> {
    if let Some(project_id) = input.project_id {
        match db::get_project_for_user(state, project_id, uid).await {
            Ok(_) => {}
            Err(AppError::NotFound) => return Err(AppError::Validation("Unknown project".into())),
            Err(e) => return Err(e),
        }
    }
    if let Some(vehicle_id) = input.vehicle_id {
        match db::get_vehicle_for_user(state, vehicle_id, uid).await {
            Ok(_) => {}
            Err(AppError::NotFound) => return Err(AppError::Validation("Unknown vehicle".into())),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn form_context(
    state: &AppState,
    uid: i64,
    title: &str,
    action: &str,
    form: &ServiceForm,
) -> Result<Context, AppError> {
    let projects = db::list_projects_for_user(state, uid, &Default::default()).await?;
    let vehicles = db::list_vehicles_for_user(state, uid).await?;

    let mut context = base_context(title, true);
    context.insert("action", action);
    context.insert("form", form);
    context.insert("projects", &projects);
    context.insert("vehicles", &vehicles);
    context.insert("statuses", &StatusOption::list::<ServiceStatus>());
    Ok(context)
}

async fn parse_or_render(
    state: &AppState,
    uid: i64,
    title: &str,
    action: &str,
    form: &ServiceForm,
) -> Result<Result<ServiceInput, HttpResponse>, AppError> {
    let parsed = match form.parse() {
        Ok(input) => check_links(state, uid, &input).await.map(|_| input),
        Err(e) => Err(e),
    };
    match parsed {
        Ok(input) => Ok(Ok(input)),
        Err(e) => {
            let context = form_context(state, uid, title, action, form).await?;
            form_error(e, "service_form.html", context).map(Err)
        }
    }
}

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct ListQuery {
    status: String,
    from: String,
    to: String,
}

fn lenient_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

#[get("/services")]
pub async fn list_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let filter = ServiceFilter {
        status: ServiceStatus::parse(&query.status),
        from: lenient_date(&query.from),
        to: lenient_date(&query.to),
    };
    let services = db::list_services_for_user(&state, uid, &filter).await?;

    let mut context = base_context("Services", true);
    context.insert("services", &services);
    context.insert("statuses", &StatusOption::list::<ServiceStatus>());
    context.insert("query", &query.into_inner());
    render("services.html", &context)
}

#[get("/services/new")]
pub async fn new_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let form = ServiceForm {
        status: ServiceStatus::Scheduled.as_str().to_owned(),
        scheduled_date: Local::now().date_naive().to_string(),
        ..ServiceForm::default()
    };
    let context = form_context(&state, uid, "New service", "/services", &form).await?;
    render("service_form.html", &context)
}

#[post("/services")]
pub async fn create_handler(
    web::Form(form): web::Form<ServiceForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let input = match parse_or_render(&state, uid, "New service", "/services", &form).await? {
        Ok(input) => input,
        Err(resp) => return Ok(resp),
    };
    db::create_service(&state, uid, &input).await?;
    Ok(redirect("/services"))
}

#[get("/services/{id}/edit")]
pub async fn edit_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let service = db::get_service_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/services/{}", service.id);
    let context = form_context(
        &state,
        uid,
        "Edit service",
        &action,
        &ServiceForm::from_service(&service),
    )
    .await?;
    render("service_form.html", &context)
}

#[post("/services/{id}")]
pub async fn update_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<ServiceForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let service = db::get_service_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/services/{}", service.id);
    let input = match parse_or_render(&state, uid, "Edit service", &action, &form).await? {
        Ok(input) => input,
        Err(resp) => return Ok(resp),
    };
    db::update_service(&state, service.id, &input).await?;
    Ok(redirect("/services"))
}

#[post("/services/{id}/delete")]
pub async fn delete_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let service = db::get_service_for_user(&state, path.into_inner(), uid).await?;
    db::delete_service(&state, service.id).await?;
    Ok(redirect("/services"))
}
