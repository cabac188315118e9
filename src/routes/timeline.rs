use actix_identity::Identity;
use actix_web::{
    get, post,
    web::{self, Data, Json},
    HttpResponse,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    db,
    errors::{ApiError, AppError},
    routes::{base_context, render, user_id},
    structs::{ServiceFilter, TaskFilter},
    timeline::{layout, DragMode, DragSession, Interval, ItemKind, TimelineItem, TimelineLayout},
    utils::check_date_range,
    AppState,
};

#[derive(Deserialize, Serialize, Default, Debug)]
#[serde(default)]
pub struct TimelineQuery {
    project_id: Option<i64>,
}

/// Every dated row the user can see, optionally narrowed to one project.
async fn collect_items(
    state: &AppState,
    uid: i64,
    project_id: Option<i64>,
    today: NaiveDate,
) -> Result<Vec<TimelineItem>, AppError> {
    let in_scope = |id: Option<i64>| project_id.is_none() || id == project_id;
    let mut items = Vec::new();

    if let Some(id) = project_id {
        // also rejects projects the user is not a member of
        let project = db::get_project_for_user(state, id, uid).await?;
        items.push(TimelineItem::from_project(&project, today));
    } else {
        for project in db::list_projects_for_user(state, uid, &Default::default()).await? {
            items.push(TimelineItem::from_project(&project, today));
        }
    }
    for contract in db::list_contracts_for_user(state, uid).await? {
        if in_scope(Some(contract.project_id)) {
            items.push(TimelineItem::from_contract(&contract, today));
        }
    }
    let task_filter = TaskFilter {
        project_id,
        ..TaskFilter::default()
    };
    for task in db::list_tasks_for_user(state, uid, &task_filter).await? {
        items.push(TimelineItem::from_task(&task, today));
    }
    for service in db::list_services_for_user(state, uid, &ServiceFilter::default()).await? {
        if in_scope(service.project_id) {
            items.push(TimelineItem::from_service(&service));
        }
    }
    Ok(items)
}

async fn build_layout(
    state: &AppState,
    uid: i64,
    project_id: Option<i64>,
) -> Result<TimelineLayout, AppError> {
    let today = Local::now().date_naive();
    let items = collect_items(state, uid, project_id, today).await?;
    Ok(layout(items, today))
}

#[get("/timeline")]
pub async fn page_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    query: web::Query<TimelineQuery>,
) -> Result<HttpResponse, AppError> {
    let uid = user_id(identity)?;
    let timeline = build_layout(&state, uid, query.project_id).await?;
    let projects = db::list_projects_for_user(&state, uid, &Default::default()).await?;

    let mut context = base_context("Timeline", true);
    context.insert("timeline", &timeline);
    context.insert("projects", &projects);
    context.insert("query", &query.into_inner());
    render("timeline.html", &context)
}

#[get("/api/timeline")]
pub async fn layout_handler(
    state: Data<AppState>,
    identity: Option<Identity>,
    query: web::Query<TimelineQuery>,
) -> Result<Json<TimelineLayout>, ApiError> {
    let uid = user_id(identity).map_err(|_| AppError::Unauthorized)?;
    Ok(Json(build_layout(&state, uid, query.project_id).await?))
}

/// Body of a finished bar drag: where the bar started, how it was grabbed
/// and how far the pointer travelled.
#[derive(Deserialize, Debug)]
pub struct DragRequest {
    mode: DragMode,
    start: NaiveDate,
    end: NaiveDate,
    dx_px: f64,
}

#[derive(Serialize, Debug)]
pub struct DragResponse {
    kind: ItemKind,
    id: i64,
    changed: bool,
    interval: Interval,
}

/// `NotFound` unless the row exists and the user may see it.
async fn check_access(state: &AppState, kind: ItemKind, id: i64, uid: i64) -> Result<(), AppError> {
    let project_id = match kind {
        ItemKind::Project => id,
        ItemKind::Contract => db::get_contract(state, id).await?.project_id,
        ItemKind::Task => db::get_task(state, id).await?.project_id,
        ItemKind::Service => {
            db::get_service_for_user(state, id, uid).await?;
            return Ok(());
        }
    };
    db::get_project_for_user(state, project_id, uid).await?;
    Ok(())
}

#[post("/api/timeline/{kind}/{id}")]
pub async fn drag_handler(
    path: web::Path<(String, i64)>,
    Json(drag): Json<DragRequest>,
    state: Data<AppState>,
    identity: Option<Identity>,
) -> Result<Json<DragResponse>, ApiError> {
    let uid = user_id(identity).map_err(|_| AppError::Unauthorized)?;
    let (kind, id) = path.into_inner();
    let kind: ItemKind = kind.parse().map_err(|_| AppError::NotFound)?;
    check_access(&state, kind, id, uid).await?;

    let origin = Interval::new(
        check_date_range("Start", drag.start)?,
        check_date_range("End", drag.end)?,
    );
    let mut session = DragSession::begin(origin, drag.mode, 0.0);
    session.pointer_move(drag.dx_px);
    let (changed, interval) = match session.release() {
        Some(interval) => {
            check_date_range("Start", interval.start)?;
            check_date_range("End", interval.end)?;
            db::update_interval(&state, kind, id, interval).await?;
            (true, interval)
        }
        None => (false, origin),
    };
    Ok(Json(DragResponse {
        kind,
        id,
        changed,
        interval,
    }))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};

    use super::*;
    use crate::{
        db::testing::test_state,
        routes::{register_user, test_app},
        timeline::{MAX_WINDOW_DAYS, PIXELS_PER_DAY},
    };

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Creates a March 2025 project through the form; evaluates to its path.
    macro_rules! create_project {
        ($app:expr, $cookie:expr) => {{
            let req = test::TestRequest::post()
                .uri("/projects")
                .cookie($cookie.clone())
                .set_form([
                    ("name", "Depot"),
                    ("status", "active"),
                    ("start_date", "2025-03-01"),
                    ("end_date", "2025-03-31"),
                ])
                .to_request();
            let resp = test::call_service($app, req).await;
            resp.headers()
                .get("Location")
                .unwrap()
                .to_str()
                .unwrap()
                .to_owned()
        }};
    }

    #[actix_web::test]
    async fn drag_moves_and_persists_a_project() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let ann = register_user!(&app, "ann@example.com");
        let location = create_project!(&app, ann);
        let id: i64 = location.trim_start_matches("/projects/").parse().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/timeline/project/{id}"))
            .cookie(ann.clone())
            .set_json(serde_json::json!({
                "mode": "move",
                "start": "2025-03-01",
                "end": "2025-03-31",
                "dx_px": 2.0 * PIXELS_PER_DAY + 3.0,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["changed"], true);
        assert_eq!(body["interval"]["start"], "2025-03-03");
        assert_eq!(body["interval"]["end"], "2025-04-02");

        let uid = db::get_user_by_email(&state, "ann@example.com")
            .await
            .unwrap()
            .unwrap()
            .id;
        let project = db::get_project_for_user(&state, id, uid).await.unwrap();
        assert_eq!(project.start_date, Some(d(2025, 3, 3)));
        assert_eq!(project.end_date, Some(d(2025, 4, 2)));
    }

    #[actix_web::test]
    async fn small_drag_changes_nothing() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let ann = register_user!(&app, "ann@example.com");
        let location = create_project!(&app, ann);
        let id: i64 = location.trim_start_matches("/projects/").parse().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/timeline/project/{id}"))
            .cookie(ann)
            .set_json(serde_json::json!({
                "mode": "resize_end",
                "start": "2025-03-01",
                "end": "2025-03-31",
                "dx_px": 10.0,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["changed"], false);
        assert_eq!(body["interval"]["end"], "2025-03-31");
    }

    #[actix_web::test]
    async fn drag_requires_membership() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let ann = register_user!(&app, "ann@example.com");
        let bob = register_user!(&app, "bob@example.com");
        let location = create_project!(&app, ann);
        let id: i64 = location.trim_start_matches("/projects/").parse().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/timeline/project/{id}"))
            .cookie(bob)
            .set_json(serde_json::json!({
                "mode": "move",
                "start": "2025-03-01",
                "end": "2025-03-31",
                "dx_px": 64.0,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Not found");

        let req = test::TestRequest::post()
            .uri(&format!("/api/timeline/vehicle/{id}"))
            .cookie(ann)
            .set_json(serde_json::json!({
                "mode": "move",
                "start": "2025-03-01",
                "end": "2025-03-31",
                "dx_px": 64.0,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn out_of_range_drag_is_rejected() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let ann = register_user!(&app, "ann@example.com");
        let location = create_project!(&app, ann);
        let id: i64 = location.trim_start_matches("/projects/").parse().unwrap();

        for (start, end, dx_px) in [
            ("2025-03-01", "2025-03-31", 1e15),
            ("2025-03-01", "2025-03-31", -1e15),
            ("2025-03-01", "2025-03-31", 200.0 * 366.0 * PIXELS_PER_DAY),
            ("2500-01-01", "2500-01-02", 64.0),
        ] {
            let req = test::TestRequest::post()
                .uri(&format!("/api/timeline/project/{id}"))
                .cookie(ann.clone())
                .set_json(serde_json::json!({
                    "mode": "move",
                    "start": start,
                    "end": end,
                    "dx_px": dx_px,
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "dx_px {dx_px}");
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Start must be between the years 1900 and 2199");
        }

        let uid = db::get_user_by_email(&state, "ann@example.com")
            .await
            .unwrap()
            .unwrap()
            .id;
        let project = db::get_project_for_user(&state, id, uid).await.unwrap();
        assert_eq!(project.start_date, Some(d(2025, 3, 1)));
        assert_eq!(project.end_date, Some(d(2025, 3, 31)));
    }

    #[actix_web::test]
    async fn far_future_dates_stay_off_the_timeline() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let ann = register_user!(&app, "ann@example.com");

        let req = test::TestRequest::post()
            .uri("/projects")
            .cookie(ann.clone())
            .set_form([
                ("name", "Forever"),
                ("status", "active"),
                ("start_date", "2025-03-01"),
                ("end_date", "9999-12-31"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/projects")
            .cookie(ann.clone())
            .set_form([
                ("name", "Long haul"),
                ("status", "active"),
                ("start_date", "1900-01-01"),
                ("end_date", "2199-12-31"),
            ])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let req = test::TestRequest::get()
            .uri("/api/timeline")
            .cookie(ann)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["ticks"].as_array().unwrap().len() as i64, MAX_WINDOW_DAYS);
        assert_eq!(body["bars"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn layout_lists_visible_items() {
        let state = test_state().await;
        let app = test_app!(state.clone());
        let ann = register_user!(&app, "ann@example.com");
        create_project!(&app, ann);

        let req = test::TestRequest::get()
            .uri("/api/timeline")
            .cookie(ann.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["bars"].as_array().unwrap().len(), 1);
        assert_eq!(body["bars"][0]["kind"], "project");
        assert_eq!(body["window"]["start"], "2025-02-26");

        let req = test::TestRequest::get()
            .uri("/timeline")
            .cookie(ann)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
