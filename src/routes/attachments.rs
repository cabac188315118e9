use actix_files::NamedFile;
use actix_identity::Identity;
use actix_web::{
    get,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    post,
    web::{self, Bytes, Data},
    HttpResponse,
};
use serde::Deserialize;

use crate::{
    db,
    errors::{ApiError, AppError},
    routes::{redirect, user_id},
    storage::{content_type_for, sanitize_filename, ATTACHMENTS_BUCKET},
    structs::{Attachment, MemberRole, NewAttachment},
    AppState,
};

#[derive(Deserialize, Debug)]
pub struct UploadQuery {
    filename: String,
    task_id: Option<i64>,
}

/// Raw request body upload: `POST /projects/{id}/attachments?filename=a.pdf`.
#[post("/projects/{id}/attachments")]
pub async fn upload_handler(
    path: web::Path<i64>,
    query: web::Query<UploadQuery>,
    body: Bytes,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, ApiError> {
    let uid = user_id(identity).map_err(|_| AppError::Unauthorized)?;
    let project = db::get_project_for_user(&state, path.into_inner(), uid).await?;
    if body.is_empty() {
        return Err(AppError::Validation("Upload is empty".into()).into());
    }
    if let Some(task_id) = query.task_id {
        let task = db::get_task(&state, task_id).await?;
        if task.project_id != project.id {
            return Err(AppError::Validation("Task belongs to another project".into()).into());
        }
    }

    let filename = sanitize_filename(&query.filename);
    let store_key = state
        .storage
        .put(ATTACHMENTS_BUCKET, &filename, &body)
        .await?;
    let new = NewAttachment {
        project_id: project.id,
        task_id: query.task_id,
        uploaded_by: uid,
        bucket: ATTACHMENTS_BUCKET.to_owned(),
        store_key,
        content_type: content_type_for(&filename),
        filename,
        size_bytes: body.len() as i64,
    };
    let attachment = match db::create_attachment(&state, &new).await {
        Ok(attachment) => attachment,
        Err(e) => {
            log::error!("Failed to record attachment {}: {}", new.store_key, e);
            // don't leave an orphaned file behind
            state.storage.remove(&new.bucket, &new.store_key).await?;
            return Err(e.into());
        }
    };
    Ok(HttpResponse::Created().json(attachment))
}

/// Attachment whose project the user is a member of.
async fn load(state: &AppState, id: i64, uid: i64) -> Result<Attachment, AppError> {
    let attachment = db::get_attachment(state, id).await?;
    db::get_project_for_user(state, attachment.project_id, uid).await?;
    Ok(attachment)
}

#[get("/attachments/{id}")]
pub async fn download_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<NamedFile, AppError> {
    let uid = user_id(identity)?;
    let attachment = load(&state, path.into_inner(), uid).await?;
    let file_path = state
        .storage
        .path_of(&attachment.bucket, &attachment.store_key)?;
    let file = NamedFile::open_async(&file_path).await.map_err(|e| {
        log::error!("Attachment {} missing on disk: {}", attachment.id, e);
        match e.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound,
            _ => AppError::IoError(e),
        }
    })?;
    Ok(file.set_content_disposition(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(attachment.filename)],
    }))
}

/// Uploader or project owner only.
#[post("/attachments/{id}/delete")]
pub async fn delete_handler(
    path: web::Path<i64>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let attachment = load(&state, path.into_inner(), uid).await?;
    let role = db::member_role(&state, attachment.project_id, uid).await?;
    if attachment.uploaded_by != uid && role != Some(MemberRole::Owner) {
        return Err(AppError::Forbidden);
    }
    db::delete_attachment(&state, attachment.id).await?;
    state
        .storage
        .remove(&attachment.bucket, &attachment.store_key)
        .await?;
    Ok(redirect(&format!("/projects/{}", attachment.project_id)))
}
