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
    structs::{Project, StatusOption, StatusView, Task, TaskFilter, TaskInput, TaskStatus},
    utils::{optional_text, parse_optional_date, parse_optional_id, require_text},
    AppState,
};

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct TaskForm {
    title: String,
    description: String,
    status: String,
    contract_id: String,
    assignee_id: String,
    start_date: String,
    end_date: String,
}

impl TaskForm {
    fn from_task(t: &Task) -> Self {
        TaskForm {
            title: t.title.clone(),
            description: t.description.clone().unwrap_or_default(),
            status: t.status.as_str().to_owned(),
            contract_id: t.contract_id.map(|id| id.to_string()).unwrap_or_default(),
            assignee_id: t.assignee_id.map(|id| id.to_string()).unwrap_or_default(),
            start_date: t.start_date.map(|d| d.to_string()).unwrap_or_default(),
            end_date: t.end_date.map(|d| d.to_string()).unwrap_or_default(),
        }
    }

    fn parse(&self, project_id: i64) -> Result<TaskInput, AppError> {
        let title = require_text("Title", &self.title)?;
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| AppError::Validation("Unknown task status".into()))?;
        let start_date = parse_optional_date("Start date", Some(&self.start_date))?;
        let end_date = parse_optional_date("End date", Some(&self.end_date))?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "End date must not be before the start date".into(),
                ));
            }
        }
        Ok(TaskInput {
            project_id,
            contract_id: parse_optional_id("Contract", Some(&self.contract_id))?,
            assignee_id: parse_optional_id("Assignee", Some(&self.assignee_id))?,
            title,
            description: optional_text(Some(self.description.clone())),
            status,
            start_date,
            end_date,
        })
    }
}

/// Rejects a contract from another project or an assignee who is not a
/// member.
async fn check_links(state: &AppState, input: &TaskInput) -> Result<(), AppError> {
    if let Some(contract_id) = input.contract_id {
        let contract = match db::get_contract(state, contract_id).await {
            Ok(contract) => contract,
            Err(sqlx::Error::RowNotFound) => {
                return Err(AppError::Validation("Unknown contract".into()))
            }
            Err(e) => return Err(e.into()),
        };
        if contract.project_id != input.project_id {
            return Err(AppError::Validation(
                "Contract belongs to another project".into(),
            ));
        }
    }
    if let Some(assignee_id) = input.assignee_id {
        if db::member_role(state, input.project_id, assignee_id)
            .await?
            .is_none()
        {
            return Err(AppError::Validation(
                "Assignee is not a member of the project".into(),
            ));
        }
    }
    Ok(())
}

async fn form_context(
    state: &AppState,
    title: &str,
    action: &str,
    project: &Project,
    form: &TaskForm,
) -> Result<Context, AppError> {
    let contracts = db::list_contracts(state, project.id).await?;
    let members = db::list_members(state, project.id).await?;

    let mut context = base_context(title, true);
    context.insert("action", action);
    context.insert("project", project);
    context.insert("form", form);
    context.insert("contracts", &contracts);
    context.insert("members", &members);
    context.insert("statuses", &StatusOption::list::<TaskStatus>());
    Ok(context)
}

/// Validates the form, re-rendering it with the message on failure.
async fn parse_or_render(
    state: &AppState,
    title: &str,
    action: &str,
    project: &Project,
    form: &TaskForm,
) -> Result<Result<TaskInput, HttpResponse>, AppError> {
    let parsed = match form.parse(project.id) {
        Ok(input) => check_links(state, &input).await.map(|_| input),
        Err(e) => Err(e),
    };
    match parsed {
        Ok(input) => Ok(Ok(input)),
        Err(e) => {
            let context = form_context(state, title, action, project, form).await?;
            form_error(e, "task_form.html", context).map(Err)
        }
    }
}

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct ListQuery {
    status: String,
    project_id: String,
    mine: String,
}

#[get("/tasks")]
pub async fn list_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let filter = TaskFilter {
        status: TaskStatus::parse(&query.status),
        project_id: query.project_id.trim().parse().ok(),
        assignee_id: (!query.mine.is_empty()).then_some(uid),
    };
    let tasks = db::list_tasks_for_user(&state, uid, &filter).await?;
    let projects = db::list_projects_for_user(&state, uid, &Default::default()).await?;

    let mut context = base_context("Tasks", true);
    context.insert("tasks", &tasks);
    context.insert("projects", &projects);
    context.insert("statuses", &StatusOption::list::<TaskStatus>());
    context.insert("query", &query.into_inner());
    render("tasks.html", &context)
}

#[get("/projects/{id}/tasks/new")]
pub async fn new_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/projects/{}/tasks", project.id);
    let form = TaskForm {
        status: TaskStatus::Todo.as_str().to_owned(),
        ..TaskForm::default()
    };
    let context = form_context(&state, "New task", &action, &project, &form).await?;
    render("task_form.html", &context)
}

#[post("/projects/{id}/tasks")]
pub async fn create_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<TaskForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/projects/{}/tasks", project.id);
    let input = match parse_or_render(&state, "New task", &action, &project, &form).await? {
        Ok(input) => input,
        Err(resp) => return Ok(resp),
    };
    db::create_task(&state, &input).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

/// Task and its project, if the user is a member.
async fn load(state: &AppState, id: i64, uid: i64) -> Result<(Task, Project), AppError> {
    let task = db::get_task(state, id).await?;
    let project = db::get_project_for_user(state, task.project_id, uid).await?;
    Ok((task, project))
}

#[get("/tasks/{id}/edit")]
pub async fn edit_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (task, project) = load(&state, path.into_inner(), uid).await?;
    let action = format!("/tasks/{}", task.id);
    let context = form_context(
        &state,
        "Edit task",
        &action,
        &project,
        &TaskForm::from_task(&task),
    )
    .await?;
    render("task_form.html", &context)
}

#[post("/tasks/{id}")]
pub async fn update_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<TaskForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (task, project) = load(&state, path.into_inner(), uid).await?;
    let action = format!("/tasks/{}", task.id);
    let input = match parse_or_render(&state, "Edit task", &action, &project, &form).await? {
        Ok(input) => input,
        Err(resp) => return Ok(resp),
    };
    db::update_task(&state, task.id, &input).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

#[post("/tasks/{id}/delete")]
pub async fn delete_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (task, project) = load(&state, path.into_inner(), uid).await?;
    db::delete_task(&state, task.id).await?;
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
    fn parse_reads_selects() {
        let form = TaskForm {
            title: "Pour slab".into(),
            status: "in_progress".into(),
            contract_id: "".into(),
            assignee_id: "4".into(),
            start_date: "2025-05-01".into(),
            end_date: "2025-05-03".into(),
            ..TaskForm::default()
        };
        let input = form.parse(9).unwrap();
        assert_eq!(input.project_id, 9);
        assert_eq!(input.contract_id, None);
        assert_eq!(input.assignee_id, Some(4));
        assert_eq!(input.status, TaskStatus::InProgress);

        let backwards = TaskForm {
            start_date: "2025-05-03".into(),
            end_date: "2025-05-01".into(),
            ..form
        };
        assert!(backwards.parse(9).is_err());
    }

    #[actix_web::test]
    async fn create_and_filter_tasks() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let cookie = register_user!(&app, "ann@example.com");

        let req = actix_test::TestRequest::post()
            .uri("/projects")
            .cookie(cookie.clone())
            .set_form([("name", "Depot"), ("status", "active")])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers().get("Location").unwrap().to_str().unwrap().to_owned();
        let project_id: i64 = location.trim_start_matches("/projects/").parse().unwrap();

        let uid = db::get_user_by_email(&state, "ann@example.com")
            .await
            .unwrap()
            .unwrap()
            .id;
        let assignee = uid.to_string();
        let req = actix_test::TestRequest::post()
            .uri(&format!("/projects/{project_id}/tasks"))
            .cookie(cookie.clone())
            .set_form([
                ("title", "Survey"),
                ("status", "todo"),
                ("assignee_id", assignee.as_str()),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let mine = db::list_tasks_for_user(
            &state,
            uid,
            &TaskFilter {
                assignee_id: Some(uid),
                ..TaskFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Survey");

        let req = actix_test::TestRequest::get()
            .uri("/tasks?mine=1&status=todo")
            .cookie(cookie)
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn assignee_must_be_member() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let cookie = register_user!(&app, "ann@example.com");
        register_user!(&app, "bob@example.com");
        let bob = db::get_user_by_email(&state, "bob@example.com")
            .await
            .unwrap()
            .unwrap();

        let req = actix_test::TestRequest::post()
            .uri("/projects")
            .cookie(cookie.clone())
            .set_form([("name", "Depot"), ("status", "planning")])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        let location = resp.headers().get("Location").unwrap().to_str().unwrap().to_owned();

        let bob_id = bob.id.to_string();
        let req = actix_test::TestRequest::post()
            .uri(&format!("{location}/tasks"))
            .cookie(cookie)
            .set_form([
                ("title", "Survey"),
                ("status", "todo"),
                ("assignee_id", bob_id.as_str()),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
