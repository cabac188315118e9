//! Date-interval model behind the Gantt view.
//!
//! Every dated row (project, contract, task, service) becomes a
//! [`TimelineItem`] with a resolved [`Interval`]. Dragging a bar is modelled
//! by [`DragSession`]: the browser runs the same arithmetic for its optimistic
//! preview and posts the pixel delta on release, the server replays it here and
//! persists the result.

use std::{fmt, str::FromStr};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    structs::{Contract, Project, Service, StatusView, Task},
    utils::date_of_timestamp,
};

/// Horizontal scale of the date axis.
pub const PIXELS_PER_DAY: f64 = 32.0;
/// Empty days drawn before the first and after the last bar.
pub const WINDOW_PADDING_DAYS: i64 = 3;
/// Window length when there is nothing to draw.
pub const EMPTY_WINDOW_DAYS: i64 = 30;
/// Intervals never collapse below one day.
pub const MIN_DAYS: i64 = 1;
/// Pointer deltas are clamped to this many days before any date arithmetic.
pub const MAX_DRAG_DAYS: i64 = 1_000_000;
/// Longest window laid out in one response; longer ranges are cut around today.
pub const MAX_WINDOW_DAYS: i64 = 1_096;

/// `date + days`, saturating at the representable date range.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Project,
    Contract,
    Task,
    Service,
}

impl ItemKind {
    /// Length used when a row has a start but no end.
    pub fn default_duration_days(self) -> i64 {
        match self {
            ItemKind::Project => 30,
            ItemKind::Contract => 14,
            ItemKind::Task => 3,
            ItemKind::Service => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Project => "project",
            ItemKind::Contract => "contract",
            ItemKind::Task => "task",
            ItemKind::Service => "service",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(ItemKind::Project),
            // jobs are contracts
            "contract" | "job" => Ok(ItemKind::Contract),
            "task" => Ok(ItemKind::Task),
            "service" => Ok(ItemKind::Service),
            other => Err(format!("unknown timeline item kind: {other}")),
        }
    }
}

/// Day range of a bar. `end` is exclusive, so `end - start` is the drawn
/// width in days and is always at least [`MIN_DAYS`].
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Interval {
    /// Builds an interval, pushing `end` out to honour the one-day floor.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        let floor = add_days(start, MIN_DAYS);
        Interval {
            start,
            end: end.max(floor),
        }
    }

    /// Fills in missing dates: start falls back to `created`, end to
    /// `start + kind.default_duration_days()`.
    pub fn resolve(
        kind: ItemKind,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        created: NaiveDate,
    ) -> Self {
        let start = start.unwrap_or(created);
        let end = end.unwrap_or_else(|| add_days(start, kind.default_duration_days()));
        Interval::new(start, end)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn shifted(&self, days: i64) -> Self {
        Interval {
            start: add_days(self.start, days),
            end: add_days(self.end, days),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    Move,
    ResizeStart,
    ResizeEnd,
}

/// Converts a horizontal pointer delta into whole days, rounding to nearest.
pub fn day_delta(dx_px: f64) -> i64 {
    if !dx_px.is_finite() {
        return 0;
    }
    // half days round away from zero; static/timeline.js does the same
    (dx_px / PIXELS_PER_DAY)
        .round()
        .clamp(-MAX_DRAG_DAYS as f64, MAX_DRAG_DAYS as f64) as i64
}

/// Applies a day delta to `origin` according to `mode`.
pub fn apply_drag(origin: Interval, mode: DragMode, days: i64) -> Interval {
    match mode {
        DragMode::Move => origin.shifted(days),
        DragMode::ResizeStart => {
            let latest = add_days(origin.end, -MIN_DAYS);
            Interval {
                start: add_days(origin.start, days).min(latest),
                end: origin.end,
            }
        }
        DragMode::ResizeEnd => Interval::new(origin.start, add_days(origin.end, days)),
    }
}

/// Pointer-down to pointer-up state of one bar drag.
#[derive(Debug, Clone)]
pub struct DragSession {
    mode: DragMode,
    origin: Interval,
    origin_x: f64,
    current: Interval,
}

impl DragSession {
    pub fn begin(origin: Interval, mode: DragMode, pointer_x: f64) -> Self {
        DragSession {
            mode,
            origin,
            origin_x: pointer_x,
            current: origin,
        }
    }

    /// Recomputes the interval for the pointer's new position. Always relative
    /// to the pointer-down position, so rounding never accumulates.
    pub fn pointer_move(&mut self, pointer_x: f64) -> Interval {
        let days = day_delta(pointer_x - self.origin_x);
        self.current = apply_drag(self.origin, self.mode, days);
        self.current
    }

    pub fn current(&self) -> Interval {
        self.current
    }

    pub fn has_changed(&self) -> bool {
        self.current != self.origin
    }

    /// Ends the drag; `None` when the bar ended where it started and there is
    /// nothing to persist.
    pub fn release(self) -> Option<Interval> {
        self.has_changed().then_some(self.current)
    }
}

/// One dated row, ready to be laid out.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TimelineItem {
    pub kind: ItemKind,
    pub id: i64,
    pub project_id: Option<i64>,
    pub label: String,
    pub status: &'static str,
    pub status_label: &'static str,
    pub color: &'static str,
    pub interval: Interval,
}

fn created_or(created_at: &str, today: NaiveDate) -> NaiveDate {
    date_of_timestamp(created_at).unwrap_or(today)
}

impl TimelineItem {
    pub fn from_project(p: &Project, today: NaiveDate) -> Self {
        TimelineItem {
            kind: ItemKind::Project,
            id: p.id,
            project_id: Some(p.id),
            label: p.name.clone(),
            status: p.status.as_str(),
            status_label: p.status.label(),
            color: p.status.color(),
            interval: Interval::resolve(
                ItemKind::Project,
                p.start_date,
                p.end_date,
                created_or(&p.created_at, today),
            ),
        }
    }

    pub fn from_contract(c: &Contract, today: NaiveDate) -> Self {
        TimelineItem {
            kind: ItemKind::Contract,
            id: c.id,
            project_id: Some(c.project_id),
            label: c.title.clone(),
            status: c.status.as_str(),
            status_label: c.status.label(),
            color: c.status.color(),
            interval: Interval::resolve(
                ItemKind::Contract,
                c.start_date,
                c.end_date,
                created_or(&c.created_at, today),
            ),
        }
    }

    pub fn from_task(t: &Task, today: NaiveDate) -> Self {
        TimelineItem {
            kind: ItemKind::Task,
            id: t.id,
            project_id: Some(t.project_id),
            label: t.title.clone(),
            status: t.status.as_str(),
            status_label: t.status.label(),
            color: t.status.color(),
            interval: Interval::resolve(
                ItemKind::Task,
                t.start_date,
                t.end_date,
                created_or(&t.created_at, today),
            ),
        }
    }

    pub fn from_service(s: &Service) -> Self {
        TimelineItem {
            kind: ItemKind::Service,
            id: s.id,
            project_id: s.project_id,
            label: s.title.clone(),
            status: s.status.as_str(),
            status_label: s.status.label(),
            color: s.status.color(),
            interval: Interval::resolve(
                ItemKind::Service,
                Some(s.scheduled_date),
                s.end_date,
                s.scheduled_date,
            ),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TimelineBar {
    #[serde(flatten)]
    pub item: TimelineItem,
    pub left_px: f64,
    pub width_px: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Tick {
    pub left_px: f64,
    pub day: u32,
    /// Set on the first day of a month and on the window's first day.
    pub month_label: Option<String>,
    pub is_today: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TimelineLayout {
    pub window: Interval,
    pub width_px: f64,
    pub pixels_per_day: f64,
    pub ticks: Vec<Tick>,
    pub bars: Vec<TimelineBar>,
}

/// Cuts a window longer than [`MAX_WINDOW_DAYS`] down to that length,
/// keeping today in view where the range allows it.
fn clamp_window(window: Interval, today: NaiveDate) -> Interval {
    if window.days() <= MAX_WINDOW_DAYS {
        return window;
    }
    let start = window
        .start
        .max(add_days(today, -MAX_WINDOW_DAYS / 2))
        .min(add_days(window.end, -MAX_WINDOW_DAYS));
    Interval::new(start, add_days(start, MAX_WINDOW_DAYS))
}

/// Lays out `items` on a shared date axis. Bars are ordered by kind
/// (project, contract, task, service), then by start date. Bars are clipped
/// to the window and dropped when they fall outside it.
pub fn layout(mut items: Vec<TimelineItem>, today: NaiveDate) -> TimelineLayout {
    items.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then(a.interval.start.cmp(&b.interval.start))
            .then(a.id.cmp(&b.id))
    });

    let window = match (
        items.iter().map(|i| i.interval.start).min(),
        items.iter().map(|i| i.interval.end).max(),
    ) {
        (Some(first), Some(last)) => clamp_window(
            Interval::new(
                add_days(first, -WINDOW_PADDING_DAYS),
                add_days(last, WINDOW_PADDING_DAYS),
            ),
            today,
        ),
        _ => Interval::new(today, add_days(today, EMPTY_WINDOW_DAYS)),
    };

    let offset_px = |date: NaiveDate| (date - window.start).num_days() as f64 * PIXELS_PER_DAY;

    let ticks = (0..window.days())
        .map(|n| {
            let date = add_days(window.start, n);
            let month_label =
                (n == 0 || date.day() == 1).then(|| date.format("%b %Y").to_string());
            Tick {
                left_px: offset_px(date),
                day: date.day(),
                month_label,
                is_today: date == today,
            }
        })
        .collect();

    let bars = items
        .into_iter()
        .filter_map(|item| {
            let start = item.interval.start.max(window.start);
            let end = item.interval.end.min(window.end);
            (start < end).then(|| TimelineBar {
                left_px: offset_px(start),
                width_px: (end - start).num_days() as f64 * PIXELS_PER_DAY,
                item,
            })
        })
        .collect();

    TimelineLayout {
        window,
        width_px: window.days() as f64 * PIXELS_PER_DAY,
        pixels_per_day: PIXELS_PER_DAY,
        ticks,
        bars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::{ProjectStatus, ServiceStatus, TaskStatus};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn task(id: i64, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Task {
        Task {
            id,
            project_id: 1,
            contract_id: None,
            assignee_id: None,
            title: format!("task {id}"),
            description: None,
            status: TaskStatus::Todo,
            start_date: start,
            end_date: end,
            created_at: "2025-04-02 09:00:00 UTC".into(),
            updated_at: "2025-04-02 09:00:00 UTC".into(),
        }
    }

    #[test]
    fn resolve_defaults_missing_end_per_kind() {
        let created = d(2025, 1, 1);
        let start = Some(d(2025, 2, 1));
        assert_eq!(
            Interval::resolve(ItemKind::Project, start, None, created).end,
            d(2025, 3, 3)
        );
        assert_eq!(
            Interval::resolve(ItemKind::Contract, start, None, created).end,
            d(2025, 2, 15)
        );
        assert_eq!(
            Interval::resolve(ItemKind::Task, start, None, created).end,
            d(2025, 2, 4)
        );
        assert_eq!(
            Interval::resolve(ItemKind::Service, start, None, created).end,
            d(2025, 2, 2)
        );
    }

    #[test]
    fn resolve_falls_back_to_creation_date() {
        let i = Interval::resolve(ItemKind::Task, None, None, d(2025, 5, 10));
        assert_eq!(i.start, d(2025, 5, 10));
        assert_eq!(i.days(), 3);
    }

    #[test]
    fn inverted_or_empty_interval_gets_one_day() {
        let i = Interval::new(d(2025, 5, 10), d(2025, 5, 1));
        assert_eq!(i.end, d(2025, 5, 11));
        let i = Interval::new(d(2025, 5, 10), d(2025, 5, 10));
        assert_eq!(i.days(), 1);
    }

    #[test]
    fn pixel_delta_rounds_to_nearest_day() {
        assert_eq!(day_delta(0.0), 0);
        assert_eq!(day_delta(15.9), 0);
        assert_eq!(day_delta(16.0), 1);
        assert_eq!(day_delta(64.0), 2);
        assert_eq!(day_delta(-40.0), -1);
        assert_eq!(day_delta(-48.0), -2);
        assert_eq!(day_delta(f64::NAN), 0);
        assert_eq!(day_delta(1e15), MAX_DRAG_DAYS);
        assert_eq!(day_delta(-1e300), -MAX_DRAG_DAYS);
    }

    #[test]
    fn date_arithmetic_saturates() {
        assert_eq!(add_days(NaiveDate::MAX, 1), NaiveDate::MAX);
        assert_eq!(add_days(NaiveDate::MIN, -MAX_DRAG_DAYS), NaiveDate::MIN);
        assert_eq!(add_days(d(2025, 3, 1), i64::MAX), NaiveDate::MAX);
        let i = Interval::new(NaiveDate::MAX, NaiveDate::MAX);
        assert_eq!(i.start, NaiveDate::MAX);
        let moved = apply_drag(i, DragMode::Move, day_delta(1e15));
        assert_eq!(moved.end, NaiveDate::MAX);
    }

    #[test]
    fn move_shifts_both_endpoints() {
        let origin = Interval::new(d(2025, 3, 1), d(2025, 3, 5));
        let moved = apply_drag(origin, DragMode::Move, -3);
        assert_eq!(moved, Interval::new(d(2025, 2, 26), d(2025, 3, 2)));
        assert_eq!(moved.days(), origin.days());
    }

    #[test]
    fn resize_start_keeps_one_day() {
        let origin = Interval::new(d(2025, 3, 1), d(2025, 3, 5));
        assert_eq!(
            apply_drag(origin, DragMode::ResizeStart, 2).start,
            d(2025, 3, 3)
        );
        let collapsed = apply_drag(origin, DragMode::ResizeStart, 10);
        assert_eq!(collapsed.start, d(2025, 3, 4));
        assert_eq!(collapsed.end, origin.end);
        assert_eq!(
            apply_drag(origin, DragMode::ResizeStart, -4).start,
            d(2025, 2, 25)
        );
    }

    #[test]
    fn resize_end_keeps_one_day() {
        let origin = Interval::new(d(2025, 3, 1), d(2025, 3, 5));
        assert_eq!(apply_drag(origin, DragMode::ResizeEnd, 3).end, d(2025, 3, 8));
        let collapsed = apply_drag(origin, DragMode::ResizeEnd, -20);
        assert_eq!(collapsed.start, origin.start);
        assert_eq!(collapsed.end, d(2025, 3, 2));
    }

    #[test]
    fn drag_session_is_relative_to_pointer_down() {
        let origin = Interval::new(d(2025, 3, 1), d(2025, 3, 5));
        let mut session = DragSession::begin(origin, DragMode::Move, 500.0);
        assert_eq!(session.pointer_move(510.0), origin);
        assert!(!session.has_changed());
        session.pointer_move(600.0);
        assert_eq!(session.current(), origin.shifted(3));
        // moving back past the origin does not accumulate rounding
        session.pointer_move(500.0);
        assert!(session.clone().release().is_none());
        session.pointer_move(436.0);
        assert_eq!(session.release(), Some(origin.shifted(-2)));
    }

    #[test]
    fn item_kind_parses_job_alias() {
        assert_eq!("job".parse::<ItemKind>(), Ok(ItemKind::Contract));
        assert_eq!("service".parse::<ItemKind>(), Ok(ItemKind::Service));
        assert!("vehicle".parse::<ItemKind>().is_err());
    }

    #[test]
    fn layout_offsets_are_relative_to_padded_window() {
        let today = d(2025, 4, 2);
        let items = vec![
            TimelineItem::from_task(&task(2, Some(d(2025, 4, 10)), Some(d(2025, 4, 12))), today),
            TimelineItem::from_task(&task(1, Some(d(2025, 4, 5)), None), today),
        ];
        let layout = layout(items, today);
        assert_eq!(layout.window.start, d(2025, 4, 2));
        assert_eq!(layout.window.end, d(2025, 4, 15));
        assert_eq!(layout.ticks.len(), 13);
        assert_eq!(layout.width_px, 13.0 * PIXELS_PER_DAY);

        assert_eq!(layout.bars[0].item.id, 1);
        assert_eq!(layout.bars[0].left_px, 3.0 * PIXELS_PER_DAY);
        assert_eq!(layout.bars[0].width_px, 3.0 * PIXELS_PER_DAY);
        assert_eq!(layout.bars[1].left_px, 8.0 * PIXELS_PER_DAY);
        assert_eq!(layout.bars[1].width_px, 2.0 * PIXELS_PER_DAY);

        assert!(layout.ticks[0].is_today);
        assert_eq!(layout.ticks[0].month_label.as_deref(), Some("Apr 2025"));
        assert!(layout.ticks[1].month_label.is_none());
    }

    #[test]
    fn layout_groups_by_kind() {
        let today = d(2025, 4, 2);
        let project = Project {
            id: 7,
            owner_id: 1,
            name: "Depot".into(),
            description: None,
            status: ProjectStatus::Active,
            start_date: Some(d(2025, 6, 1)),
            end_date: None,
            created_at: "2025-04-01 08:00:00 UTC".into(),
            updated_at: "2025-04-01 08:00:00 UTC".into(),
        };
        let service = Service {
            id: 3,
            owner_id: 1,
            project_id: None,
            vehicle_id: None,
            title: "Brake check".into(),
            notes: None,
            status: ServiceStatus::Overdue,
            scheduled_date: d(2025, 4, 1),
            end_date: None,
            created_at: "2025-03-01 08:00:00 UTC".into(),
            updated_at: "2025-03-01 08:00:00 UTC".into(),
        };
        let items = vec![
            TimelineItem::from_service(&service),
            TimelineItem::from_task(&task(1, None, None), today),
            TimelineItem::from_project(&project, today),
        ];
        let layout = layout(items, today);
        let kinds: Vec<ItemKind> = layout.bars.iter().map(|b| b.item.kind).collect();
        assert_eq!(kinds, vec![ItemKind::Project, ItemKind::Task, ItemKind::Service]);
        assert_eq!(layout.bars[2].item.color, "red");
        assert_eq!(layout.bars[2].width_px, PIXELS_PER_DAY);
        assert_eq!(layout.window.start, d(2025, 3, 29));
    }

    #[test]
    fn long_window_is_cut_around_today() {
        let today = d(2025, 4, 2);
        let items = vec![
            TimelineItem::from_task(&task(1, Some(d(2025, 4, 5)), Some(NaiveDate::MAX)), today),
            TimelineItem::from_task(&task(2, Some(d(3000, 1, 1)), None), today),
        ];
        let layout = layout(items, today);
        assert_eq!(layout.window.start, d(2025, 4, 2));
        assert_eq!(layout.window.days(), MAX_WINDOW_DAYS);
        assert_eq!(layout.ticks.len() as i64, MAX_WINDOW_DAYS);
        assert_eq!(layout.bars.len(), 1);
        assert_eq!(layout.bars[0].left_px, 3.0 * PIXELS_PER_DAY);
        assert_eq!(
            layout.bars[0].width_px,
            (MAX_WINDOW_DAYS - 3) as f64 * PIXELS_PER_DAY
        );
        // the item keeps its real dates for dragging
        assert_eq!(layout.bars[0].item.interval.end, NaiveDate::MAX);
    }

    #[test]
    fn window_follows_today_inside_a_long_range() {
        let today = d(2025, 4, 2);
        let items = vec![TimelineItem::from_task(
            &task(1, Some(d(2000, 1, 1)), Some(d(2100, 1, 1))),
            today,
        )];
        let layout = layout(items, today);
        assert_eq!(layout.window.start, add_days(today, -MAX_WINDOW_DAYS / 2));
        assert_eq!(layout.window.days(), MAX_WINDOW_DAYS);
        assert_eq!(layout.bars[0].left_px, 0.0);
    }

    #[test]
    fn empty_layout_shows_next_month() {
        let today = d(2025, 4, 2);
        let layout = layout(Vec::new(), today);
        assert!(layout.bars.is_empty());
        assert_eq!(layout.window.start, today);
        assert_eq!(layout.window.days(), EMPTY_WINDOW_DAYS);
    }
}
