use std::{str::FromStr, time::Duration};

use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};

use crate::{
    errors::AppError,
    structs::{
        Attachment, Axle, Contract, ContractInput, MemberRole, NewAttachment, Profile, Project,
        ProjectFilter, ProjectInput, ProjectMember, Service, ServiceFilter, ServiceInput,
        StatusCount, Task, TaskFilter, TaskInput, User, Vehicle, VehicleInput,
    },
    timeline::{Interval, ItemKind},
    utils::now_timestamp,
    AppState,
};

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .read_only(false)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// users & profiles

pub async fn get_user_by_id(state: &AppState, id: i64) -> Result<User, sqlx::Error> {
    let pool = &state.db_pool;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(user)
}

pub async fn get_user_by_email(state: &AppState, email: &str) -> Result<Option<User>, sqlx::Error> {
    let pool = &state.db_pool;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Inserts the user and an empty profile in one transaction.
pub async fn create_user(
    state: &AppState,
    email: &str,
    pwd_hash: &str,
    full_name: &str,
) -> Result<User, sqlx::Error> {
    let created_at = now_timestamp();
    let mut tx = state.db_pool.begin().await?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (created_at, updated_at, email, pwd_hash) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&created_at)
    .bind(&created_at)
    .bind(email.to_lowercase())
    .bind(pwd_hash)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO profiles (user_id, full_name, created_at, updated_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(user.id)
    .bind(full_name)
    .bind(&created_at)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    log::info!("User created: {}", user.id);
    Ok(user)
}

pub async fn update_user_password(
    state: &AppState,
    id: i64,
    pwd_hash: &str,
) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("UPDATE users SET pwd_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(pwd_hash)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Password updated for user {}", id);
    Ok(())
}

pub async fn get_profile(state: &AppState, user_id: i64) -> Result<Profile, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn update_profile(
    state: &AppState,
    user_id: i64,
    full_name: &str,
    job_title: Option<&str>,
    phone: Option<&str>,
) -> Result<Profile, sqlx::Error> {
    let pool = &state.db_pool;
    let profile = sqlx::query_as::<_, Profile>(
        "UPDATE profiles SET full_name = $1, job_title = $2, phone = $3, updated_at = $4 WHERE user_id = $5 RETURNING *",
    )
    .bind(full_name)
    .bind(job_title)
    .bind(phone)
    .bind(now_timestamp())
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    log::info!("Profile updated for user {}", user_id);
    Ok(profile)
}

// ---------------------------------------------------------------------------
// projects & members

pub async fn list_projects_for_user(
    state: &AppState,
    user_id: i64,
    filter: &ProjectFilter,
) -> Result<Vec<Project>, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT p.* FROM projects p JOIN project_members m ON m.project_id = p.id WHERE m.user_id = ",
    );
    qb.push_bind(user_id);
    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status);
    }
    if let Some(q) = &filter.q {
        qb.push(" AND (p.name LIKE '%' || ")
            .push_bind(q.clone())
            .push(" || '%' OR p.description LIKE '%' || ")
            .push_bind(q.clone())
            .push(" || '%')");
    }
    qb.push(" ORDER BY p.start_date IS NULL, p.start_date, p.name");
    qb.build_query_as::<Project>()
        .fetch_all(&state.db_pool)
        .await
}

pub async fn member_role(
    state: &AppState,
    project_id: i64,
    user_id: i64,
) -> Result<Option<MemberRole>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_scalar::<_, MemberRole>(
        "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Project visible to `user_id`. Non-members get `NotFound`, so existence
/// does not leak.
pub async fn get_project_for_user(
    state: &AppState,
    project_id: i64,
    user_id: i64,
) -> Result<Project, AppError> {
    let pool = &state.db_pool;
    let project = sqlx::query_as::<_, Project>(
        "SELECT p.* FROM projects p JOIN project_members m ON m.project_id = p.id WHERE p.id = $1 AND m.user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    project.ok_or(AppError::NotFound)
}

/// Inserts the project and the owner's membership in one transaction.
pub async fn create_project(
    state: &AppState,
    owner_id: i64,
    input: &ProjectInput,
) -> Result<Project, sqlx::Error> {
    let created_at = now_timestamp();
    let mut tx = state.db_pool.begin().await?;
    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (owner_id, name, description, status, start_date, end_date, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(owner_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO project_members (project_id, user_id, role, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(project.id)
    .bind(owner_id)
    .bind(MemberRole::Owner)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    log::info!("Project created: {} ({})", project.id, project.name);
    Ok(project)
}

pub async fn update_project(
    state: &AppState,
    id: i64,
    input: &ProjectInput,
) -> Result<Project, sqlx::Error> {
    let pool = &state.db_pool;
    let project = sqlx::query_as::<_, Project>(
        "UPDATE projects SET name = $1, description = $2, status = $3, start_date = $4, end_date = $5, updated_at = $6 \
         WHERE id = $7 RETURNING *",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(now_timestamp())
    .bind(id)
    .fetch_one(pool)
    .await?;
    log::info!("Project updated: {}", id);
    Ok(project)
}

pub async fn delete_project(state: &AppState, id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Project with id {} deleted", id);
    Ok(())
}

pub async fn list_members(state: &AppState, project_id: i64) -> Result<Vec<ProjectMember>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, ProjectMember>(
        "SELECT m.id, m.project_id, m.user_id, m.role, u.email, pr.full_name, m.created_at \
         FROM project_members m \
         JOIN users u ON u.id = m.user_id \
         LEFT JOIN profiles pr ON pr.user_id = m.user_id \
         WHERE m.project_id = $1 ORDER BY m.role DESC, u.email",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

/// Adds a membership; re-adding an existing member is a no-op.
pub async fn add_member(
    state: &AppState,
    project_id: i64,
    user_id: i64,
    role: MemberRole,
) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query(
        "INSERT INTO project_members (project_id, user_id, role, created_at) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (project_id, user_id) DO NOTHING",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role)
    .bind(now_timestamp())
    .execute(pool)
    .await?;
    log::info!("User {} added to project {}", user_id, project_id);
    Ok(())
}

pub async fn remove_member(state: &AppState, project_id: i64, user_id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    log::info!("User {} removed from project {}", user_id, project_id);
    Ok(())
}

pub async fn project_status_counts(state: &AppState, user_id: i64) -> Result<Vec<StatusCount>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, StatusCount>(
        "SELECT p.status AS status, COUNT(*) AS count FROM projects p \
         JOIN project_members m ON m.project_id = p.id WHERE m.user_id = $1 \
         GROUP BY p.status ORDER BY p.status",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// contracts

pub async fn list_contracts(state: &AppState, project_id: i64) -> Result<Vec<Contract>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Contract>(
        "SELECT * FROM contracts WHERE project_id = $1 ORDER BY start_date IS NULL, start_date, title",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn list_contracts_for_user(state: &AppState, user_id: i64) -> Result<Vec<Contract>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Contract>(
        "SELECT c.* FROM contracts c JOIN project_members m ON m.project_id = c.project_id \
         WHERE m.user_id = $1 ORDER BY c.start_date IS NULL, c.start_date, c.title",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn get_contract(state: &AppState, id: i64) -> Result<Contract, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn create_contract(
    state: &AppState,
    project_id: i64,
    input: &ContractInput,
) -> Result<Contract, sqlx::Error> {
    let pool = &state.db_pool;
    let created_at = now_timestamp();
    let contract = sqlx::query_as::<_, Contract>(
        "INSERT INTO contracts (project_id, title, client_name, value_cents, status, start_date, end_date, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(project_id)
    .bind(&input.title)
    .bind(&input.client_name)
    .bind(input.value_cents)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(pool)
    .await?;
    log::info!("Contract created: {} in project {}", contract.id, project_id);
    Ok(contract)
}

pub async fn update_contract(
    state: &AppState,
    id: i64,
    input: &ContractInput,
) -> Result<Contract, sqlx::Error> {
    let pool = &state.db_pool;
    let contract = sqlx::query_as::<_, Contract>(
        "UPDATE contracts SET title = $1, client_name = $2, value_cents = $3, status = $4, start_date = $5, end_date = $6, updated_at = $7 \
         WHERE id = $8 RETURNING *",
    )
    .bind(&input.title)
    .bind(&input.client_name)
    .bind(input.value_cents)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(now_timestamp())
    .bind(id)
    .fetch_one(pool)
    .await?;
    log::info!("Contract updated: {}", id);
    Ok(contract)
}

pub async fn delete_contract(state: &AppState, id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM contracts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Contract with id {} deleted", id);
    Ok(())
}

// ---------------------------------------------------------------------------
// tasks

pub async fn list_tasks_for_user(
    state: &AppState,
    user_id: i64,
    filter: &TaskFilter,
) -> Result<Vec<Task>, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT t.* FROM tasks t JOIN project_members m ON m.project_id = t.project_id WHERE m.user_id = ",
    );
    qb.push_bind(user_id);
    if let Some(status) = filter.status {
        qb.push(" AND t.status = ").push_bind(status);
    }
    if let Some(project_id) = filter.project_id {
        qb.push(" AND t.project_id = ").push_bind(project_id);
    }
    if let Some(assignee_id) = filter.assignee_id {
        qb.push(" AND t.assignee_id = ").push_bind(assignee_id);
    }
    qb.push(" ORDER BY t.start_date IS NULL, t.start_date, t.id");
    qb.build_query_as::<Task>()
        .fetch_all(&state.db_pool)
        .await
}

pub async fn list_tasks_for_project(state: &AppState, project_id: i64) -> Result<Vec<Task>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE project_id = $1 ORDER BY start_date IS NULL, start_date, id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

/// Unfinished tasks of the user's projects whose end date has passed.
pub async fn overdue_tasks(
    state: &AppState,
    user_id: i64,
    today: NaiveDate,
) -> Result<Vec<Task>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Task>(
        "SELECT t.* FROM tasks t JOIN project_members m ON m.project_id = t.project_id \
         WHERE m.user_id = $1 AND t.status != 'done' AND t.end_date IS NOT NULL AND t.end_date < $2 \
         ORDER BY t.end_date",
    )
    .bind(user_id)
    .bind(today)
    .fetch_all(pool)
    .await
}

pub async fn get_task(state: &AppState, id: i64) -> Result<Task, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn create_task(state: &AppState, input: &TaskInput) -> Result<Task, sqlx::Error> {
    let pool = &state.db_pool;
    let created_at = now_timestamp();
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (project_id, contract_id, assignee_id, title, description, status, start_date, end_date, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(input.project_id)
    .bind(input.contract_id)
    .bind(input.assignee_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(pool)
    .await?;
    log::info!("Task created: {} in project {}", task.id, task.project_id);
    Ok(task)
}

pub async fn update_task(state: &AppState, id: i64, input: &TaskInput) -> Result<Task, sqlx::Error> {
    let pool = &state.db_pool;
    let task = sqlx::query_as::<_, Task>(
        "UPDATE tasks SET contract_id = $1, assignee_id = $2, title = $3, description = $4, status = $5, \
         start_date = $6, end_date = $7, updated_at = $8 WHERE id = $9 RETURNING *",
    )
    .bind(input.contract_id)
    .bind(input.assignee_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(now_timestamp())
    .bind(id)
    .fetch_one(pool)
    .await?;
    log::info!("Task updated: {}", id);
    Ok(task)
}

pub async fn delete_task(state: &AppState, id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Task with id {} deleted", id);
    Ok(())
}

// ---------------------------------------------------------------------------
// services

const SERVICE_VISIBLE: &str = "(s.owner_id = $1 OR s.project_id IN \
     (SELECT project_id FROM project_members WHERE user_id = $1))";

pub async fn list_services_for_user(
    state: &AppState,
    user_id: i64,
    filter: &ServiceFilter,
) -> Result<Vec<Service>, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT s.* FROM services s WHERE (s.owner_id = ",
    );
    qb.push_bind(user_id)
        .push(" OR s.project_id IN (SELECT project_id FROM project_members WHERE user_id = ")
        .push_bind(user_id)
        .push("))");
    if let Some(status) = filter.status {
        qb.push(" AND s.status = ").push_bind(status);
    }
    if let Some(from) = filter.from {
        qb.push(" AND s.scheduled_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND s.scheduled_date <= ").push_bind(to);
    }
    qb.push(" ORDER BY s.scheduled_date, s.id");
    qb.build_query_as::<Service>()
        .fetch_all(&state.db_pool)
        .await
}

/// Service visible to `user_id`, or `NotFound`.
pub async fn get_service_for_user(
    state: &AppState,
    id: i64,
    user_id: i64,
) -> Result<Service, AppError> {
    let pool = &state.db_pool;
    let sql = format!("SELECT s.* FROM services s WHERE {SERVICE_VISIBLE} AND s.id = $2");
    let service = sqlx::query_as::<_, Service>(&sql)
        .bind(user_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    service.ok_or(AppError::NotFound)
}

pub async fn create_service(
    state: &AppState,
    owner_id: i64,
    input: &ServiceInput,
) -> Result<Service, sqlx::Error> {
    let pool = &state.db_pool;
    let created_at = now_timestamp();
    let service = sqlx::query_as::<_, Service>(
        "INSERT INTO services (owner_id, project_id, vehicle_id, title, notes, status, scheduled_date, end_date, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(owner_id)
    .bind(input.project_id)
    .bind(input.vehicle_id)
    .bind(&input.title)
    .bind(&input.notes)
    .bind(input.status)
    .bind(input.scheduled_date)
    .bind(input.end_date)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(pool)
    .await?;
    log::info!("Service created: {}", service.id);
    Ok(service)
}

pub async fn update_service(
    state: &AppState,
    id: i64,
    input: &ServiceInput,
) -> Result<Service, sqlx::Error> {
    let pool = &state.db_pool;
    let service = sqlx::query_as::<_, Service>(
        "UPDATE services SET project_id = $1, vehicle_id = $2, title = $3, notes = $4, status = $5, \
         scheduled_date = $6, end_date = $7, updated_at = $8 WHERE id = $9 RETURNING *",
    )
    .bind(input.project_id)
    .bind(input.vehicle_id)
    .bind(&input.title)
    .bind(&input.notes)
    .bind(input.status)
    .bind(input.scheduled_date)
    .bind(input.end_date)
    .bind(now_timestamp())
    .bind(id)
    .fetch_one(pool)
    .await?;
    log::info!("Service updated: {}", id);
    Ok(service)
}

pub async fn delete_service(state: &AppState, id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM services WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Service with id {} deleted", id);
    Ok(())
}

// ---------------------------------------------------------------------------
// attachments

pub async fn list_attachments(state: &AppState, project_id: i64) -> Result<Vec<Attachment>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE project_id = $1 ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn get_attachment(state: &AppState, id: i64) -> Result<Attachment, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn create_attachment(
    state: &AppState,
    new: &NewAttachment,
) -> Result<Attachment, sqlx::Error> {
    let pool = &state.db_pool;
    let attachment = sqlx::query_as::<_, Attachment>(
        "INSERT INTO attachments (project_id, task_id, uploaded_by, bucket, store_key, filename, content_type, size_bytes, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(new.project_id)
    .bind(new.task_id)
    .bind(new.uploaded_by)
    .bind(&new.bucket)
    .bind(&new.store_key)
    .bind(&new.filename)
    .bind(&new.content_type)
    .bind(new.size_bytes)
    .bind(now_timestamp())
    .fetch_one(pool)
    .await?;
    log::info!("Attachment created: {} ({})", attachment.id, attachment.filename);
    Ok(attachment)
}

pub async fn delete_attachment(state: &AppState, id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM attachments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Attachment with id {} deleted", id);
    Ok(())
}

// ---------------------------------------------------------------------------
// vehicles & axles

const VEHICLE_VISIBLE: &str = "(v.owner_id = $1 OR v.project_id IN \
     (SELECT project_id FROM project_members WHERE user_id = $1))";

pub async fn list_vehicles_for_user(state: &AppState, user_id: i64) -> Result<Vec<Vehicle>, sqlx::Error> {
    let pool = &state.db_pool;
    let sql = format!("SELECT v.* FROM vehicles v WHERE {VEHICLE_VISIBLE} ORDER BY v.name");
    sqlx::query_as::<_, Vehicle>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn get_vehicle_for_user(
    state: &AppState,
    id: i64,
    user_id: i64,
) -> Result<Vehicle, AppError> {
    let pool = &state.db_pool;
    let sql = format!("SELECT v.* FROM vehicles v WHERE {VEHICLE_VISIBLE} AND v.id = $2");
    let vehicle = sqlx::query_as::<_, Vehicle>(&sql)
        .bind(user_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    vehicle.ok_or(AppError::NotFound)
}

pub async fn create_vehicle(
    state: &AppState,
    owner_id: i64,
    input: &VehicleInput,
) -> Result<Vehicle, sqlx::Error> {
    let pool = &state.db_pool;
    let created_at = now_timestamp();
    let vehicle = sqlx::query_as::<_, Vehicle>(
        "INSERT INTO vehicles (owner_id, project_id, name, chassis_length_mm, body_offset_mm, body_length_mm, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(owner_id)
    .bind(input.project_id)
    .bind(&input.name)
    .bind(input.chassis_length_mm)
    .bind(input.body_offset_mm)
    .bind(input.body_length_mm)
    .bind(&created_at)
    .bind(&created_at)
    .fetch_one(pool)
    .await?;
    log::info!("Vehicle created: {}", vehicle.id);
    Ok(vehicle)
}

/// Updates the vehicle and pulls any axle that would fall off a shortened
/// chassis back onto its rear end.
pub async fn update_vehicle(
    state: &AppState,
    id: i64,
    input: &VehicleInput,
) -> Result<Vehicle, sqlx::Error> {
    let mut tx = state.db_pool.begin().await?;
    let vehicle = sqlx::query_as::<_, Vehicle>(
        "UPDATE vehicles SET project_id = $1, name = $2, chassis_length_mm = $3, body_offset_mm = $4, \
         body_length_mm = $5, updated_at = $6 WHERE id = $7 RETURNING *",
    )
    .bind(input.project_id)
    .bind(&input.name)
    .bind(input.chassis_length_mm)
    .bind(input.body_offset_mm)
    .bind(input.body_length_mm)
    .bind(now_timestamp())
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE axles SET position_mm = $1 WHERE vehicle_id = $2 AND position_mm > $1")
        .bind(input.chassis_length_mm)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    log::info!("Vehicle updated: {}", id);
    Ok(vehicle)
}

pub async fn update_body_offset(state: &AppState, id: i64, offset_mm: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("UPDATE vehicles SET body_offset_mm = $1, updated_at = $2 WHERE id = $3")
        .bind(offset_mm)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Vehicle {} body moved to {} mm", id, offset_mm);
    Ok(())
}

pub async fn delete_vehicle(state: &AppState, id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM vehicles WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    log::info!("Vehicle with id {} deleted", id);
    Ok(())
}

pub async fn list_axles(state: &AppState, vehicle_id: i64) -> Result<Vec<Axle>, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Axle>("SELECT * FROM axles WHERE vehicle_id = $1 ORDER BY position_mm, id")
        .bind(vehicle_id)
        .fetch_all(pool)
        .await
}

/// Axle belonging to `vehicle_id`, or `RowNotFound`.
pub async fn get_axle(state: &AppState, vehicle_id: i64, axle_id: i64) -> Result<Axle, sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query_as::<_, Axle>("SELECT * FROM axles WHERE id = $1 AND vehicle_id = $2")
        .bind(axle_id)
        .bind(vehicle_id)
        .fetch_one(pool)
        .await
}

pub async fn add_axle(state: &AppState, vehicle_id: i64, position_mm: i64) -> Result<Axle, sqlx::Error> {
    let pool = &state.db_pool;
    let axle = sqlx::query_as::<_, Axle>(
        "INSERT INTO axles (vehicle_id, position_mm, created_at) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(vehicle_id)
    .bind(position_mm)
    .bind(now_timestamp())
    .fetch_one(pool)
    .await?;
    log::info!("Axle {} added to vehicle {}", axle.id, vehicle_id);
    Ok(axle)
}

pub async fn update_axle_position(
    state: &AppState,
    axle_id: i64,
    position_mm: i64,
) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("UPDATE axles SET position_mm = $1 WHERE id = $2")
        .bind(position_mm)
        .bind(axle_id)
        .execute(pool)
        .await?;
    log::info!("Axle {} moved to {} mm", axle_id, position_mm);
    Ok(())
}

pub async fn delete_axle(state: &AppState, vehicle_id: i64, axle_id: i64) -> Result<(), sqlx::Error> {
    let pool = &state.db_pool;
    sqlx::query("DELETE FROM axles WHERE id = $1 AND vehicle_id = $2")
        .bind(axle_id)
        .bind(vehicle_id)
        .execute(pool)
        .await?;
    log::info!("Axle {} removed from vehicle {}", axle_id, vehicle_id);
    Ok(())
}

// ---------------------------------------------------------------------------
// timeline

/// Writes a dragged interval back to the row it came from.
pub async fn update_interval(
    state: &AppState,
    kind: ItemKind,
    id: i64,
    interval: Interval,
) -> Result<(), sqlx::Error> {
    let sql = match kind {
        ItemKind::Project => "UPDATE projects SET start_date = $1, end_date = $2, updated_at = $3 WHERE id = $4",
        ItemKind::Contract => "UPDATE contracts SET start_date = $1, end_date = $2, updated_at = $3 WHERE id = $4",
        ItemKind::Task => "UPDATE tasks SET start_date = $1, end_date = $2, updated_at = $3 WHERE id = $4",
        ItemKind::Service => "UPDATE services SET scheduled_date = $1, end_date = $2, updated_at = $3 WHERE id = $4",
    };
    let result = sqlx::query(sql)
        .bind(interval.start)
        .bind(interval.end)
        .bind(now_timestamp())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    log::info!(
        "{} {} rescheduled to {}..{}",
        kind,
        id,
        interval.start,
        interval.end
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::{config::Config, storage::Storage};

    /// Fresh in-memory database with migrations applied. A single connection
    /// that never expires, since each in-memory connection is its own DB.
    pub async fn test_state() -> AppState {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .unwrap();
        migrate(&pool).await.unwrap();

        let upload_dir: PathBuf = std::env::temp_dir().join(format!(
            "worktrack-test-{}-{}",
            std::process::id(),
            crate::utils::now_timestamp().replace(|c: char| !c.is_ascii_digit(), "")
        ));
        let config = Config {
            database_url: "sqlite::memory:".into(),
            bind_addr: "127.0.0.1".into(),
            port: 0,
            session_key: vec![7u8; 64],
            upload_dir: upload_dir.clone(),
            max_upload_bytes: 1024 * 1024,
            secure_cookies: false,
        };
        AppState {
            db_pool: pool,
            storage: Storage::new(upload_dir),
            config,
        }
    }

    pub async fn user(state: &AppState, email: &str) -> User {
        create_user(state, email, "not-a-real-hash", "Test User")
            .await
            .unwrap()
    }
}
