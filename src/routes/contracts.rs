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
    structs::{Contract, ContractInput, ContractStatus, Project, StatusOption, StatusView},
    utils::{format_cents, optional_text, parse_optional_cents, parse_optional_date, require_text},
    AppState,
};

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct ContractForm {
    title: String,
    client_name: String,
    value: String,
    status: String,
    start_date: String,
    end_date: String,
}

impl ContractForm {
    fn from_contract(c: &Contract) -> Self {
        ContractForm {
            title: c.title.clone(),
            client_name: c.client_name.clone().unwrap_or_default(),
            value: c.value_cents.map(format_cents).unwrap_or_default(),
            status: c.status.as_str().to_owned(),
            start_date: c.start_date.map(|d| d.to_string()).unwrap_or_default(),
            end_date: c.end_date.map(|d| d.to_string()).unwrap_or_default(),
        }
    }

    fn parse(&self) -> Result<ContractInput, AppError> {
        let title = require_text("Title", &self.title)?;
        let status = ContractStatus::parse(&self.status)
            .ok_or_else(|| AppError::Validation("Unknown contract status".into()))?;
        let start_date = parse_optional_date("Start date", Some(&self.start_date))?;
        let end_date = parse_optional_date("End date", Some(&self.end_date))?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "End date must not be before the start date".into(),
                ));
            }
        }
        Ok(ContractInput {
            title,
            client_name: optional_text(Some(self.client_name.clone())),
            value_cents: parse_optional_cents("Value", Some(&self.value))?,
            status,
            start_date,
            end_date,
        })
    }
}

fn form_context(title: &str, action: &str, project: &Project, form: &ContractForm) -> Context {
    let mut context = base_context(title, true);
    context.insert("action", action);
    context.insert("project", project);
    context.insert("form", form);
    context.insert("statuses", &StatusOption::list::<ContractStatus>());
    context
}

/// Contract plus the name of its project, for the cross-project list.
#[derive(Serialize)]
struct ContractRow<'a> {
    #[serde(flatten)]
    contract: &'a Contract,
    project_name: &'a str,
}

#[get("/contracts")]
pub async fn list_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let contracts = db::list_contracts_for_user(&state, uid).await?;
    let projects = db::list_projects_for_user(&state, uid, &Default::default()).await?;
    let rows: Vec<ContractRow> = contracts
        .iter()
        .map(|c| ContractRow {
            contract: c,
            project_name: projects
                .iter()
                .find(|p| p.id == c.project_id)
                .map(|p| p.name.as_str())
                .unwrap_or_default(),
        })
        .collect();

    let mut context = base_context("Contracts", true);
    context.insert("contracts", &rows);
    render("contracts.html", &context)
}

#[get("/projects/{id}/contracts/new")]
pub async fn new_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/projects/{}/contracts", project.id);
    let form = ContractForm {
        status: ContractStatus::Draft.as_str().to_owned(),
        ..ContractForm::default()
    };
    render(
        "contract_form.html",
        &form_context("New contract", &action, &project, &form),
    )
}

#[post("/projects/{id}/contracts")]
pub async fn create_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<ContractForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    let action = format!("/projects/{}/contracts", project.id);
    let input = match form.parse() {
        Ok(input) => input,
        Err(e) => {
            return form_error(
                e,
                "contract_form.html",
                form_context("New contract", &action, &project, &form),
            )
        }
    };
    db::create_contract(&state, project.id, &input).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

/// Contract and its project, if the user is a member.
async fn load(state: &AppState, id: i64, uid: i64) -> Result<(Contract, Project), AppError> {
    let contract = db::get_contract(state, id).await?;
    let project = db::get_project_for_user(state, contract.project_id, uid).await?;
    Ok((contract, project))
}

#[get("/contracts/{id}/edit")]
pub async fn edit_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (contract, project) = load(&state, path.into_inner(), uid).await?;
    let action = format!("/contracts/{}", contract.id);
    render(
        "contract_form.html",
        &form_context(
            "Edit contract",
            &action,
            &project,
            &ContractForm::from_contract(&contract),
        ),
    )
}

#[post("/contracts/{id}")]
pub async fn update_handler(
    path: web::Path<i64>,
    web::Form(form): web::Form<ContractForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (contract, project) = load(&state, path.into_inner(), uid).await?;
    let action = format!("/contracts/{}", contract.id);
    let input = match form.parse() {
        Ok(input) => input,
        Err(e) => {
            return form_error(
                e,
                "contract_form.html",
                form_context("Edit contract", &action, &project, &form),
            )
        }
    };
    db::update_contract(&state, contract.id, &input).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

#[post("/contracts/{id}/delete")]
pub async fn delete_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let (contract, project) = load(&state, path.into_inner(), uid).await?;
    db::delete_contract(&state, contract.id).await?;
    Ok(redirect(&format!("/projects/{}", project.id)))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;

    use super::*;
    use crate::{
        db::testing::{test_state, user},
        structs::{ProjectInput, ProjectStatus},
    };

    #[test]
    fn form_round_trips_money() {
        let form = ContractForm {
            title: "Groundworks".into(),
            client_name: " ACME ".into(),
            value: "12,500.5".into(),
            status: "active".into(),
            ..ContractForm::default()
        };
        let input = form.parse().unwrap();
        assert_eq!(input.value_cents, Some(1_250_050));
        assert_eq!(input.client_name.as_deref(), Some("ACME"));
        assert_eq!(input.status, ContractStatus::Active);

        let bad = ContractForm {
            title: "Groundworks".into(),
            status: "signed".into(),
            ..ContractForm::default()
        };
        assert!(bad.parse().is_err());
    }

    #[actix_web::test]
    async fn load_checks_membership() {
        let state = test_state().await;
        let ann = user(&state, "ann@example.com").await;
        let bob = user(&state, "bob@example.com").await;
        let project = db::create_project(
            &state,
            ann.id,
            &ProjectInput {
                name: "Depot".into(),
                description: None,
                status: ProjectStatus::Active,
                start_date: None,
                end_date: None,
            },
        )
        .await
        .unwrap();
        let contract = db::create_contract(
            &state,
            project.id,
            &ContractForm {
                title: "Fencing".into(),
                status: "draft".into(),
                ..ContractForm::default()
            }
            .parse()
            .unwrap(),
        )
        .await
        .unwrap();

        assert!(load(&state, contract.id, ann.id).await.is_ok());
        let err = load(&state, contract.id, bob.id).await.unwrap_err();
        assert_eq!(actix_web::ResponseError::status_code(&err), StatusCode::NOT_FOUND);
        assert!(matches!(
            load(&state, 999, ann.id).await,
            Err(AppError::NotFound)
        ));
    }
}
