use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data},
    HttpMessage, HttpRequest, HttpResponse, Responder,
};
use serde::{Deserialize, Serialize};

use crate::{
    db,
    errors::AppError,
    routes::{base_context, form_error, redirect, render, user_id},
    utils::{self, optional_text},
    AppState,
};

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;':\",.<>?/";

/// Length and character-class rules for a new password.
fn check_new_password(password: &str, password2: &str) -> Result<(), AppError> {
    if password != password2 {
        return Err(AppError::Validation("Passwords do not match".into()));
    }
    if password.len() < 12 {
        return Err(AppError::Validation(
            "Password must be at least 12 characters long".into(),
        ));
    }
    if password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters long".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit())
        || !password.chars().any(|c| c.is_alphabetic())
        || !password.chars().any(|c| SPECIAL_CHARS.contains(c))
    {
        return Err(AppError::Validation(
            "Password must contain at least one number, one letter and one special character"
                .into(),
        ));
    }
    Ok(())
}

#[derive(Deserialize, Serialize, Default)]
pub struct Login {
    email: String,
    #[serde(skip_serializing)]
    password: String,
}

#[get("/login")]
pub async fn login_handler() -> Result<impl Responder, AppError> {
    let mut context = base_context("Log in", false);
    context.insert("form", &Login::default());
    render("login.html", &context)
}

#[post("/login")]
pub async fn login_form_handler(
    web::Form(form): web::Form<Login>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let mut context = base_context("Log in", false);
    context.insert("form", &form);

    if form.email.trim().is_empty() || form.password.is_empty() {
        return form_error(
            AppError::Validation("All fields are required".into()),
            "login.html",
            context,
        );
    }

    let user = db::get_user_by_email(&state, form.email.trim()).await?;
    let Some(user) = user else {
        log::warn!("Login attempt for unknown email");
        return form_error(
            AppError::Validation("Invalid credentials".into()),
            "login.html",
            context,
        );
    };

    if !utils::verify_password(&form.password, &user.pwd_hash)? {
        log::warn!("Wrong password for user ID: {}", user.id);
        return form_error(
            AppError::Validation("Invalid credentials".into()),
            "login.html",
            context,
        );
    }

    Identity::login(&request.extensions(), user.id.to_string())?;
    log::info!("User {} logged in", user.id);
    Ok(redirect("/dashboard"))
}

#[derive(Deserialize, Serialize, Default)]
pub struct Register {
    email: String,
    full_name: String,
    #[serde(skip_serializing)]
    password: String,
    #[serde(skip_serializing)]
    password2: String,
}

impl Register {
    fn check(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() || self.password.is_empty() || self.password2.is_empty() {
            return Err(AppError::Validation("All fields are required".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::Validation("Invalid email address".into()));
        }
        check_new_password(&self.password, &self.password2)
    }
}

#[get("/register")]
pub async fn register_handler() -> Result<impl Responder, AppError> {
    let mut context = base_context("Register", false);
    context.insert("form", &Register::default());
    render("register.html", &context)
}

/// Creates the account and logs it in.
#[post("/register")]
pub async fn register_form_handler(
    web::Form(form): web::Form<Register>,
    state: Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let mut context = base_context("Register", false);
    context.insert("form", &form);

    if let Err(e) = form.check() {
        return form_error(e, "register.html", context);
    }

    let email = form.email.trim().to_lowercase();
    if db::get_user_by_email(&state, &email).await?.is_some() {
        return form_error(
            AppError::Validation("Email is already registered".into()),
            "register.html",
            context,
        );
    }

    let pwd_hash = utils::hash_password(&form.password)?;
    let full_name = form.full_name.trim();
    let user = db::create_user(&state, &email, &pwd_hash, full_name).await?;

    Identity::login(&request.extensions(), user.id.to_string())?;

    Ok(redirect("/dashboard"))
}

#[post("/logout")]
pub async fn logout_handler(user: Option<Identity>) -> impl Responder {
    if let Some(user) = user {
        user.logout();
    }
    redirect("/login")
}

#[get("/change-pwd")]
pub async fn change_pwd_handler(identity: Option<Identity>) -> Result<impl Responder, AppError> {
    user_id(identity)?;
    let context = base_context("Change password", true);
    render("change-pwd.html", &context)
}

#[derive(Deserialize)]
pub struct ChangePwdForm {
    old_password: String,
    password: String,
    password2: String,
}

#[post("/change-pwd")]
pub async fn change_pwd_form_handler(
    web::Form(form): web::Form<ChangePwdForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let context = base_context("Change password", true);

    if form.old_password.is_empty() || form.password.is_empty() || form.password2.is_empty() {
        return form_error(
            AppError::Validation("All fields are required".into()),
            "change-pwd.html",
            context,
        );
    }
    if let Err(e) = check_new_password(&form.password, &form.password2) {
        return form_error(e, "change-pwd.html", context);
    }

    let user = db::get_user_by_id(&state, uid).await?;
    if !utils::verify_password(&form.old_password, &user.pwd_hash)? {
        log::warn!("Old password verification failed for user ID: {}", user.id);
        return form_error(
            AppError::Validation("Old password is incorrect".into()),
            "change-pwd.html",
            context,
        );
    }

    let new_pwd_hash = utils::hash_password(&form.password)?;
    db::update_user_password(&state, user.id, &new_pwd_hash).await?;
    log::info!("Password changed successfully for user ID: {}", user.id);

    Ok(redirect("/dashboard"))
}

#[derive(Deserialize, Serialize, Default)]
pub struct ProfileForm {
    full_name: String,
    job_title: Option<String>,
    phone: Option<String>,
}

#[get("/profile")]
pub async fn profile_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<impl Responder, AppError> {
    let uid = user_id(identity)?;
    let user = db::get_user_by_id(&state, uid).await?;
    let profile = db::get_profile(&state, uid).await?;

    let mut context = base_context("Profile", true);
    context.insert("email", &user.email);
    context.insert(
        "form",
        &ProfileForm {
            full_name: profile.full_name,
            job_title: profile.job_title,
            phone: profile.phone,
        },
    );
    render("profile.html", &context)
}

#[post("/profile")]
pub async fn profile_form_handler(
    web::Form(form): web::Form<ProfileForm>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let user = db::get_user_by_id(&state, uid).await?;

    let full_name = match utils::require_text("Name", &form.full_name) {
        Ok(name) => name,
        Err(e) => {
            let mut context = base_context("Profile", true);
            context.insert("email", &user.email);
            context.insert("form", &form);
            return form_error(e, "profile.html", context);
        }
    };
    let job_title = optional_text(form.job_title);
    let phone = optional_text(form.phone);
    db::update_profile(&state, uid, &full_name, job_title.as_deref(), phone.as_deref()).await?;

    Ok(redirect("/profile"))
}
