use std::{collections::HashMap, ops::RangeInclusive};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Datelike, NaiveDate};
use tera::Value;

use crate::{errors::AppError, structs::status_option};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map_err(|e| {
            log::error!("Failed to hash password: {}", e);
            AppError::PasswordError(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` for a wrong password, `Err` only when the stored hash is
/// unreadable.
pub fn verify_password(provided: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        log::error!("Stored password hash is malformed: {}", e);
        AppError::PasswordError(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(provided.as_bytes(), &parsed)
        .is_ok())
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_string()
}

/// Date part of a timestamp written by [`now_timestamp`].
pub fn date_of_timestamp(ts: &str) -> Option<NaiveDate> {
    ts.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// Trimmed form text, `None` when blank.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Parses an `<input type="date">` value. Blank means absent.
pub fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => {
            let date = NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|_| AppError::Validation(format!("{field} must be a date (YYYY-MM-DD)")))?;
            check_date_range(field, date).map(Some)
        }
    }
}

/// Years a stored date may fall in.
pub const DATE_YEARS: RangeInclusive<i32> = 1900..=2199;

pub fn check_date_range(field: &str, date: NaiveDate) -> Result<NaiveDate, AppError> {
    if DATE_YEARS.contains(&date.year()) {
        Ok(date)
    } else {
        Err(AppError::Validation(format!(
            "{field} must be between the years {} and {}",
            DATE_YEARS.start(),
            DATE_YEARS.end()
        )))
    }
}

/// Parses an optional id coming from a `<select>`; blank means absent.
pub fn parse_optional_id(field: &str, value: Option<&str>) -> Result<Option<i64>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{field} is not a valid id"))),
    }
}

/// Parses an amount like `1250` or `1250.5` into cents; blank means absent.
pub fn parse_optional_cents(field: &str, value: Option<&str>) -> Result<Option<i64>, AppError> {
    let invalid = || AppError::Validation(format!("{field} must be an amount like 1250.00"));
    let raw = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v.replace(',', ""),
    };
    let (whole, frac) = raw.split_once('.').unwrap_or((raw.as_str(), ""));
    if whole.is_empty()
        || frac.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = format!("{frac:0<2}").parse().map_err(|_| invalid())?;
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .map(Some)
        .ok_or_else(invalid)
}

pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

pub fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

/// Tera filter: `{{ p.status | status_color(kind="project") }}`.
pub fn status_color_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    status_attr(value, args, |o| o.color)
}

/// Tera filter: `{{ t.status | status_label(kind="task") }}`.
pub fn status_label_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    status_attr(value, args, |o| o.label)
}

/// Tera filter: `{{ c.value_cents | money }}`.
pub fn money_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::Null => Ok(Value::String(String::new())),
        v => v
            .as_i64()
            .map(|cents| Value::String(format_cents(cents)))
            .ok_or_else(|| tera::Error::msg("money filter expects an integer")),
    }
}

fn status_attr(
    value: &Value,
    args: &HashMap<String, Value>,
    pick: fn(&crate::structs::StatusOption) -> &'static str,
) -> tera::Result<Value> {
    let status = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("status filter expects a string"))?;
    let kind = args
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("status filter needs a `kind` argument"))?;
    let resolved = status_option(kind, status)
        .map(|o| pick(&o).to_owned())
        .unwrap_or_else(|| status.to_owned());
    Ok(Value::String(resolved))
}
