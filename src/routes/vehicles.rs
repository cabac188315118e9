use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data, Json},
    HttpResponse,
};
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::{
    db,
    errors::{ApiError, AppError},
    routes::{base_context, form_error, redirect, render, render_with_status, user_id},
    structs::{ServiceFilter, Vehicle, VehicleInput},
    utils::{parse_optional_id, require_text},
    vehicle::{self, drag_axle, drag_body, mm_delta, validate_dimensions, DragTarget},
    AppState,
};

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct VehicleForm {
    name: String,
    project_id: String,
    chassis_length_mm: String,
    body_offset_mm: String,
    body_length_mm: String,
}

fn parse_mm(field: &str, value: &str) -> Result<i64, AppError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::Validation(format!("{field} must be a whole number of millimetres")))
}

impl VehicleForm {
    fn from_vehicle(v: &Vehicle) -> Self {
        VehicleForm {
            name: v.name.clone(),
            project_id: v.project_id.map(|id| id.to_string()).unwrap_or_default(),
            chassis_length_mm: v.chassis_length_mm.to_string(),
            body_offset_mm: v.body_offset_mm.to_string(),
            body_length_mm: v.body_length_mm.to_string(),
        }
    }

    fn parse(&self) -> Result<VehicleInput, AppError> {
        let name = require_text("Name", &self.name)?;
        let chassis_length_mm = parse_mm("Chassis length", &self.chassis_length_mm)?;
        let body_offset_mm = parse_mm("Body offset", &self.body_offset_mm)?;
        let body_length_mm = parse_mm("Body length", &self.body_length_mm)?;
        validate_dimensions(chassis_length_mm, body_offset_mm, body_length_mm)
            .map_err(AppError::Validation)?;
        Ok(VehicleInput {
            project_id: parse_optional_id("Project", Some(&self.project_id))?,
            name,
            chassis_length_mm,
            body_offset_mm,
            body_length_mm,
        })
    }
}

async fn form_context(
    state: &AppState,
    uid: i64,
    title: &str,
    action: &str,
    form: &VehicleForm,
) -> Result<Context, AppError> {
    let projects = db::list_projects_for_user(state, uid, &Default::default()).await?;
    let mut context = base_context(title, true);
    context.insert("action", action);
    context.insert("form", form);
    context.insert("projects", &projects);
    Ok(context)
}

async fn parse_or_render(
    state: &AppState,
    uid: i64,
    title: &str,
    action: &str,
    form: &VehicleForm,
) -> Result<Result<VehicleInput, HttpResponse>, AppError> {
    let parsed = match form.parse() {
        Ok(input) => match input.project_id {
            Some(project_id) => match db::get_project_for_user(state, project_id, uid).await {
                Ok(_) => Ok(input),
                Err(AppError::NotFound) => Err(AppError::Validation("Unknown project".into())),
                Err(e) => return Err(e),
            },
            None => Ok(input),
        },
        Err(e) => Err(e),
    };
    match parsed {
        Ok(input) => Ok(Ok(input)),
        Err(e) => {
            let context = form_context(state, uid, title, action, form).await?;
            form_error(e, "vehicle_form.html", context).map(Err)
        }
    }
}

#[get("/vehicles")]
pub async fn list_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let vehicles = db::list_vehicles_for_user(&state, uid).await?;
    let mut context = base_context("Vehicles", true);
    context.insert("vehicles", &vehicles);
    render("vehicles.html", &context)
}

#[get("/vehicles/new")]
pub async fn new_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let form = VehicleForm {
        chassis_length_mm: "8000".into(),
        body_offset_mm: "1500".into(),
        body_length_mm: "6000".into(),
        ..VehicleForm::default()
    };
    let context = form_context(&state, uid, "New vehicle", "/vehicles", &form).await?;
    render("vehicle_form.html", &context)
}

#[post("/vehicles")]
pub async fn create_handler(
    web::Form(form): web::Form<VehicleForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let input = match parse_or_render(&state, uid, "New vehicle", "/vehicles", &form).await? {
        Ok(input) => input,
        Err(resp) => return Ok(resp),
    };
    let vehicle = db::create_vehicle(&state, uid, &input).await?;
    Ok(redirect(&format!("/vehicles/{}", vehicle.id)))
}

/// Builder page context: the vehicle, its axles, the SVG geometry and the
/// services booked for it.
async fn detail_context(state: &AppState, vehicle: &Vehicle, uid: i64) -> Result<Context, AppError> {
    let axles = db::list_axles(state, vehicle.id).await?;
    let services: Vec<_> = db::list_services_for_user(state, uid, &ServiceFilter::default())
        .await?
        .into_iter()
        .filter(|s| s.vehicle_id == Some(vehicle.id))
        .collect();

    let mut context = base_context(&vehicle.name, true);
    context.insert("vehicle", vehicle);
    context.insert("axles", &axles);
    context.insert("diagram", &vehicle::diagram(vehicle, &axles));
    context.insert("services", &services);
    context.insert("is_owner", &(vehicle.owner_id == uid));
    Ok(context)
}

#[get("/vehicles/{id}")]
pub async fn detail_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let vehicle = db::get_vehicle_for_user(&state, path.into_inner(), uid).await?;
    let context = detail_context(&state, &vehicle, uid).await?;
    render("vehicle.html", &context)
}

#[get("/vehicles/{id}/edit")]
pub async fn edit_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let vehicle = db::get_vehicle_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/vehicles/{}", vehicle.id);
    let context = form_context(
        &state,
        uid,
        "Edit vehicle",
        &action,
        &VehicleForm::from_vehicle(&vehicle),
    )
    .await?;
    render("vehicle_form.html", &context)
}

#[post("/vehicles/{id}")]
pub async fn update_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<VehicleForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let vehicle = db::get_vehicle_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/vehicles/{}", vehicle.id);
    let input = match parse_or_render(&state, uid, "Edit vehicle", &action, &form).await? {
        Ok(input) => input,
        Err(resp) => return Ok(resp),
    };
    db::update_vehicle(&state, vehicle.id, &input).await?;
    Ok(redirect(&format!("/vehicles/{}", vehicle.id)))
}

#[post("/vehicles/{id}/delete")]
pub async fn delete_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let vehicle = db::get_vehicle_for_user(&state, path.into_inner(), uid).await?;
    if vehicle.owner_id != uid {
        return Err(AppError::Forbidden);
    }
    db::delete_vehicle(&state, vehicle.id).await?;
    Ok(redirect("/vehicles"))
}

#[derive(Deserialize, Default, Debug)]
#[serde(default)]
pub struct AxleForm {
    position_mm: String,
}

#[post("/vehicles/{id}/axles")]
pub async fn add_axle_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<AxleForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let vehicle = db::get_vehicle_for_user(&state, path.into_inner(), uid).await?;
    let position = parse_mm("Axle position", &form.position_mm).and_then(|mm| {
        if (0..=vehicle.chassis_length_mm).contains(&mm) {
            Ok(mm)
        } else {
            Err(AppError::Validation(format!(
                "Axle position must be between 0 and {} mm",
                vehicle.chassis_length_mm
            )))
        }
    });
    let position = match position {
        Ok(mm) => mm,
        Err(AppError::Validation(message)) => {
            let mut context = detail_context(&state, &vehicle, uid).await?;
            context.insert("error", &message);
            return render_with_status(
                "vehicle.html",
                &context,
                actix_web::http::StatusCode::BAD_REQUEST,
            );
        }
        Err(e) => return Err(e),
    };
    db::add_axle(&state, vehicle.id, position).await?;
    Ok(redirect(&format!("/vehicles/{}", vehicle.id)))
}

#[post("/vehicles/{id}/axles/{axle_id}/delete")]
pub async fn delete_axle_handler(
    path: web::Path<(i64, i64)>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (id, axle_id) = path.into_inner();
    let vehicle = db::get_vehicle_for_user(&state, id, uid).await?;
    db::delete_axle(&state, vehicle.id, axle_id).await?;
    Ok(redirect(&format!("/vehicles/{}", vehicle.id)))
}

/// Finished drag on the builder diagram.
#[derive(Deserialize, Debug)]
pub struct DragRequest {
    #[serde(flatten)]
    target: DragTarget,
    dx_px: f64,
}

#[derive(Serialize, Debug)]
pub struct DragResponse {
    #[serde(flatten)]
    target: DragTarget,
    position_mm: i64,
}

#[post("/api/vehicles/{id}/drag")]
pub async fn drag_handler(
    path: web::Path<i64>,
    Json(drag): Json<DragRequest>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<Json<DragResponse>, ApiError> {
    let uid = user_id(identity).map_err(|_| AppError::Unauthorized)?;
    let vehicle = db::get_vehicle_for_user(&state, path.into_inner(), uid).await?;
    let delta = mm_delta(drag.dx_px);

    let position_mm = match drag.target {
        DragTarget::Axle { axle_id } => {
            let axle = db::get_axle(&state, vehicle.id, axle_id).await?;
            let position = drag_axle(axle.position_mm, delta, vehicle.chassis_length_mm);
            if position != axle.position_mm {
                db::update_axle_position(&state, axle.id, position).await?;
            }
            position
        }
        DragTarget::Body => {
            let offset = drag_body(
                vehicle.body_offset_mm,
                delta,
                vehicle.body_length_mm,
                vehicle.chassis_length_mm,
            );
            if offset != vehicle.body_offset_mm {
                db::update_body_offset(&state, vehicle.id, offset).await?;
            }
            offset
        }
    };
    Ok(Json(DragResponse {
        target: drag.target,
        position_mm,
    }))
}
