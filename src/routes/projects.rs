use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data},
    HttpResponse,
};
use serde::{Deserialize, Serialize};
use tera::Context;

use crate::{
    db,
    errors::AppError,
    routes::{base_context, form_error, redirect, render, user_id},
    structs::{
        ContractStatus, MemberRole, Project, ProjectFilter, ProjectInput, ProjectStatus,
        StatusOption, StatusView, TaskStatus,
    },
    utils::{optional_text, parse_optional_date, require_text},
    AppState,
};

/// `Forbidden` unless `user_id` owns the project.
pub(crate) async fn require_owner(
    state: &AppState,
    project_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    match db::member_role(state, project_id, user_id).await? {
        Some(MemberRole::Owner) => Ok(()),
        Some(MemberRole::Member) => Err(AppError::Forbidden),
        None => Err(AppError::NotFound),
    }
}

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct ProjectForm {
    name: String,
    description: String,
    status: String,
    start_date: String,
    end_date: String,
}

impl ProjectForm {
    fn from_project(p: &Project) -> Self {
        ProjectForm {
            name: p.name.clone(),
            description: p.description.clone().unwrap_or_default(),
            status: p.status.as_str().to_owned(),
            start_date: p.start_date.map(|d| d.to_string()).unwrap_or_default(),
            end_date: p.end_date.map(|d| d.to_string()).unwrap_or_default(),
        }
    }

    fn parse(&self) -> Result<ProjectInput, AppError> {
        let name = require_text("Name", &self.name)?;
        let status = ProjectStatus::parse(&self.status)
            .ok_or_else(|| AppError::Validation("Unknown project status".into()))?;
        let start_date = parse_optional_date("Start date", Some(&self.start_date))?;
        let end_date = parse_optional_date("End date", Some(&self.end_date))?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "End date must not be before the start date".into(),
                ));
            }
        }
        Ok(ProjectInput {
            name,
            description: optional_text(Some(self.description.clone())),
            status,
            start_date,
            end_date,
        })
    }
}

fn form_context(title: &str, action: &str, form: &ProjectForm) -> Context {
    let mut context = base_context(title, true);
    context.insert("action", action);
    context.insert("form", form);
    context.insert("statuses", &StatusOption::list::<ProjectStatus>());
    context
}

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct ListQuery {
    status: String,
    q: String,
}

#[get("/projects")]
pub async fn list_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let filter = ProjectFilter {
        status: ProjectStatus::parse(&query.status),
        q: optional_text(Some(query.q.clone())),
    };
    let projects = db::list_projects_for_user(&state, uid, &filter).await?;

    let mut context = base_context("Projects", true);
    context.insert("projects", &projects);
    context.insert("statuses", &StatusOption::list::<ProjectStatus>());
    context.insert("query", &query.into_inner());
    render("projects.html", &context)
}

#[get("/projects/new")]
pub async fn new_handler(identity: Option<Identity>) -> Result<HttpResponse, AppError> {
    user_id(identity)?;
    let form = ProjectForm {
        status: ProjectStatus::Planning.as_str().to_owned(),
        ..ProjectForm::default()
    };
    render(
        "project_form.html",
        &form_context("New project", "/projects", &form),
    )
}

#[post("/projects")]
pub async fn create_handler(
    web::Form(form): web::Form<ProjectForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let input = match form.parse() {
        Ok(input) => input,
        Err(e) => {
            return form_error(
                e,
                "project_form.html",
                form_context("New project", "/projects", &form),
            )
        }
    };
    let project = db::create_project(&state, uid, &input).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

/// Everything the project page shows.
async fn detail_context(
    state: &AppState,
    project: &Project,
    uid: i64,
) -> Result<Context, AppError> {
    let contracts = db::list_contracts(state, project.id).await?;
    let tasks = db::list_tasks_for_project(state, project.id).await?;
    let members = db::list_members(state, project.id).await?;
    let attachments = db::list_attachments(state, project.id).await?;
    let role = db::member_role(state, project.id, uid).await?;

    let mut context = base_context(&project.name, true);
    context.insert("project", project);
    context.insert("contracts", &contracts);
    context.insert("tasks", &tasks);
    context.insert("members", &members);
    context.insert("attachments", &attachments);
    context.insert("is_owner", &(role == Some(MemberRole::Owner)));
    context.insert("uid", &uid);
    context.insert("contract_statuses", &StatusOption::list::<ContractStatus>());
    context.insert("task_statuses", &StatusOption::list::<TaskStatus>());
    Ok(context)
}

#[get("/projects/{id}")]
pub async fn detail_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let context = detail_context(&state, &project, uid).await?;
    render("project.html", &context)
}

#[get("/projects/{id}/edit")]
pub async fn edit_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/projects/{}", project.id);
    render(
        "project_form.html",
        &form_context("Edit project", &action, &ProjectForm::from_project(&project)),
    )
}

#[post("/projects/{id}")]
pub async fn update_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<ProjectForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/projects/{}", project.id);
    let input = match form.parse() {
        Ok(input) => input,
        Err(e) => {
            return form_error(
                e,
                "project_form.html",
                form_context("Edit project", &action, &form),
            )
        }
    };
    db::update_project(&state, project.id, &input).await?;
    Ok(redirect(&action))
}

#[post("/projects/{id}/delete")]
pub async fn delete_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project_id = path.into_inner();
    require_owner(&state, project_id, uid).await?;

    // rows cascade, files do not
    for attachment in db::list_attachments(&state, project_id).await? {
        state
            .storage
            .remove(&attachment.bucket, &attachment.store_key)
            .await?;
    }
    db::delete_project(&state, project_id).await?;
    Ok(redirect("/projects"))
}

#[derive(Deserialize)]
pub struct MemberForm {
    email: String,
}

#[post("/projects/{id}/members")]
pub async fn add_member_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<MemberForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    require_owner(&state, project.id, uid).await?;

    let Some(user) = db::get_user_by_email(&state, form.email.trim()).await? else {
        let context = detail_context(&state, &project, uid).await?;
        return form_error(
            AppError::Validation(format!("No user with email {}", form.email.trim())),
            "project.html",
            context,
        );
    };
    db::add_member(&state, project.id, user.id, MemberRole::Member).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

#[post("/projects/{id}/members/{user_id}/delete")]
pub async fn remove_member_handler(
    path: web::Path<(i64, i64)>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (project_id, member_id) = path.into_inner();
    let project = db::get_project_for_user(&state, project_id, uid).await?;
    require_owner(&state, project.id, uid).await?;

    if member_id == project.owner_id {
        let context = detail_context(&state, &project, uid).await?;
        return form_error(
            AppError::Validation("The project owner cannot be removed".into()),
            "project.html",
            context,
        );
    }
    db::remove_member(&state, project.id, member_id).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test as actix_test};

    use super::*;
    use crate::{
        db::testing::test_state,
        routes::{register_user, test_app},
    };

    #[test]
    fn form_parsing() {
        let form = ProjectForm {
            name: "  Depot ".into(),
            description: "".into(),
            status: "on_hold".into(),
            start_date: "2025-05-01".into(),
            end_date: "".into(),
        };
        let input = form.parse().unwrap();
        assert_eq!(input.name, "Depot");
        assert_eq!(input.description, None);
        assert_eq!(input.status, ProjectStatus::OnHold);
        assert_eq!(input.end_date, None);

        let bad = ProjectForm {
            name: "Depot".into(),
            status: "active".into(),
            start_date: "2025-05-10".into(),
            end_date: "2025-05-01".into(),
            ..ProjectForm::default()
        };
        assert!(matches!(bad.parse(), Err(AppError::Validation(_))));

        let unnamed = ProjectForm {
            status: "active".into(),
            ..ProjectForm::default()
        };
        assert_eq!(unnamed.parse().unwrap_err().to_string(), "Name is required");
    }

    #[actix_web::test]
    async fn create_view_and_hide_from_others() {
        let app = test_app!(test_state().await);
        let ann = register_user!(&app, "ann@example.com");
        let bob = register_user!(&app, "bob@example.com");

        let req = actix_test::TestRequest::post()
            .uri("/projects")
            .cookie(ann.clone())
            .set_form([
                ("name", "Depot"),
                ("description", "yard"),
                ("status", "active"),
                ("start_date", "2025-05-01"),
                ("end_date", ""),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp
            .headers()
            .get("Location")
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(location.starts_with("/projects/"));

        let req = actix_test::TestRequest::get()
            .uri(&location)
            .cookie(ann.clone())
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("Depot"));

        let req = actix_test::TestRequest::get()
            .uri(&location)
            .cookie(bob.clone())
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // adding bob makes the project visible to him
        let req = actix_test::TestRequest::post()
            .uri(&format!("{location}/members"))
            .cookie(ann)
            .set_form([("email", "bob@example.com")])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let req = actix_test::TestRequest::get()
            .uri(&location)
            .cookie(bob.clone())
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // but he cannot delete it
        let req = actix_test::TestRequest::post()
            .uri(&format!("{location}/delete"))
            .cookie(bob)
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn invalid_form_is_rerendered_with_message() {
        let app = test_app!(test_state().await);
        let ann = register_user!(&app, "ann@example.com");
        let req = actix_test::TestRequest::post()
            .uri("/projects")
            .cookie(ann)
            .set_form([("name", ""), ("status", "active")])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = actix_test::read_body(resp).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("Name is required"));
    }
}
