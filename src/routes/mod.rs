use actix_identity::Identity;
use actix_web::{http::StatusCode, web, HttpResponse};
use tera::Context;

use crate::{errors::AppError, TEMPLATES};

pub mod attachments;
pub mod auth;
pub mod contracts;
pub mod dashboard;
pub mod projects;
pub mod services;
pub mod tasks;
pub mod timeline;
pub mod vehicles;

/// Registers every handler. Literal paths (`/x/new`) come before `/x/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard::index_handler)
        .service(dashboard::dashboard_handler)
        .service(auth::register_handler)
        .service(auth::register_form_handler)
        .service(auth::login_handler)
        .service(auth::login_form_handler)
        .service(auth::logout_handler)
        .service(auth::change_pwd_handler)
        .service(auth::change_pwd_form_handler)
        .service(auth::profile_handler)
        .service(auth::profile_form_handler)
        .service(projects::list_handler)
        .service(projects::new_handler)
        .service(projects::create_handler)
        .service(projects::detail_handler)
        .service(projects::edit_handler)
        .service(projects::update_handler)
        .service(projects::delete_handler)
        .service(projects::add_member_handler)
        .service(projects::remove_member_handler)
        .service(contracts::list_handler)
        .service(contracts::new_handler)
        .service(contracts::create_handler)
        .service(contracts::edit_handler)
        .service(contracts::update_handler)
        .service(contracts::delete_handler)
        .service(tasks::list_handler)
        .service(tasks::new_handler)
        .service(tasks::create_handler)
        .service(tasks::edit_handler)
        .service(tasks::update_handler)
        .service(tasks::delete_handler)
        .service(services::list_handler)
        .service(services::new_handler)
        .service(services::create_handler)
        .service(services::edit_handler)
        .service(services::update_handler)
        .service(services::delete_handler)
        .service(attachments::upload_handler)
        .service(attachments::download_handler)
        .service(attachments::delete_handler)
        .service(timeline::page_handler)
        .service(timeline::layout_handler)
        .service(timeline::drag_handler)
        .service(vehicles::list_handler)
        .service(vehicles::new_handler)
        .service(vehicles::create_handler)
        .service(vehicles::detail_handler)
        .service(vehicles::edit_handler)
        .service(vehicles::update_handler)
        .service(vehicles::delete_handler)
        .service(vehicles::add_axle_handler)
        .service(vehicles::delete_axle_handler)
        .service(vehicles::drag_handler);
}

/// Id of the logged-in user; `Unauthorized` (redirect to `/login`) otherwise.
pub fn user_id(identity: Option<Identity>) -> Result<i64, AppError> {
    let identity = identity.ok_or(AppError::Unauthorized)?;
    let id = identity.id()?;
    id.parse::<i64>().map_err(|_| {
        log::warn!("Session carries a non-numeric identity: {}", id);
        AppError::Unauthorized
    })
}

/// Context every page template expects.
pub fn base_context(title: &str, logged_in: bool) -> Context {
    let mut context = Context::new();
    context.insert("title", title);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    context.insert("logged_in", &logged_in);
    context
}

pub fn render(template: &str, context: &Context) -> Result<HttpResponse, AppError> {
    render_with_status(template, context, StatusCode::OK)
}

pub fn render_with_status(
    template: &str,
    context: &Context,
    status: StatusCode,
) -> Result<HttpResponse, AppError> {
    let rendered = TEMPLATES.render(template, context).map_err(|e| {
        log::error!("Failed to render template {}: {}", template, e);
        AppError::TemplateError(e)
    })?;

    Ok(HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(rendered))
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header(("Location", location))
        .finish()
}

/// Re-renders a form with an inline message when `err` is a validation
/// error; any other error is passed through.
pub fn form_error(
    err: AppError,
    template: &str,
    mut context: Context,
) -> Result<HttpResponse, AppError> {
    match err {
        AppError::Validation(message) => {
            context.insert("error", &message);
            render_with_status(template, &context, StatusCode::BAD_REQUEST)
        }
        other => Err(other),
    }
}

/// Builds the test service with session + identity middleware in front of
/// every route.
#[cfg(test)]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_identity::IdentityMiddleware::default())
                .wrap(
                    actix_session::SessionMiddleware::builder(
                        actix_session::storage::CookieSessionStore::default(),
                        actix_web::cookie::Key::generate(),
                    )
                    .cookie_secure(false)
                    .build(),
                )
                .app_data(actix_web::web::Data::new($state))
                .configure(crate::routes::configure),
        )
        .await
    };
}

/// Registers a user through the form and evaluates to the session cookie.
#[cfg(test)]
macro_rules! register_user {
    ($app:expr, $email:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/register")
            .set_form([
                ("email", $email),
                ("full_name", "Test User"),
                ("password", "long-enough-pass-1!"),
                ("password2", "long-enough-pass-1!"),
            ])
            .to_request();
        let resp = actix_web::test::call_service($app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SEE_OTHER);
        resp.response()
            .cookies()
            .find(|c| c.name() == "id")
            .expect("session cookie")
            .into_owned()
    }};
}

#[cfg(test)]
pub(crate) use {register_user, test_app};
