//! Side-view vehicle diagram: a chassis rail, a body box sitting on it and
//! the axles underneath. Positions are millimetres from the front of the
//! chassis; the SVG is drawn at one pixel per [`MM_PER_PIXEL`] millimetres.

use serde::{Deserialize, Serialize};

use crate::structs::{Axle, Vehicle};

pub const MM_PER_PIXEL: f64 = 10.0;
/// Left/right margin around the chassis inside the SVG.
pub const DIAGRAM_MARGIN_PX: f64 = 20.0;
pub const WHEEL_RADIUS_PX: f64 = 45.0;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum DragTarget {
    Axle { axle_id: i64 },
    Body,
}

/// Pixel delta to millimetres, rounded to the nearest millimetre.
pub fn mm_delta(dx_px: f64) -> i64 {
    if !dx_px.is_finite() {
        return 0;
    }
    (dx_px * MM_PER_PIXEL).round() as i64
}

/// New axle position after dragging it by `delta_mm`, kept on the chassis.
pub fn drag_axle(position_mm: i64, delta_mm: i64, chassis_length_mm: i64) -> i64 {
    position_mm
        .saturating_add(delta_mm)
        .clamp(0, chassis_length_mm.max(0))
}

/// New body offset after dragging it by `delta_mm`; the body never overhangs
/// either end of the chassis.
pub fn drag_body(offset_mm: i64, delta_mm: i64, body_length_mm: i64, chassis_length_mm: i64) -> i64 {
    let max_offset = (chassis_length_mm - body_length_mm).max(0);
    offset_mm.saturating_add(delta_mm).clamp(0, max_offset)
}

/// Checks the dimensions entered on the vehicle form.
pub fn validate_dimensions(
    chassis_length_mm: i64,
    body_offset_mm: i64,
    body_length_mm: i64,
) -> Result<(), String> {
    if chassis_length_mm <= 0 {
        return Err("Chassis length must be positive".into());
    }
    if body_length_mm <= 0 {
        return Err("Body length must be positive".into());
    }
    if body_length_mm > chassis_length_mm {
        return Err("Body cannot be longer than the chassis".into());
    }
    // both lengths are positive here, so the subtraction cannot overflow
    if body_offset_mm < 0 || body_offset_mm > chassis_length_mm - body_length_mm {
        return Err("Body must sit within the chassis".into());
    }
    Ok(())
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AxleShape {
    pub id: i64,
    pub position_mm: i64,
    pub cx: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Diagram {
    pub width_px: f64,
    pub chassis_x: f64,
    pub chassis_width: f64,
    pub body_x: f64,
    pub body_width: f64,
    pub wheel_radius: f64,
    pub mm_per_pixel: f64,
    pub axles: Vec<AxleShape>,
}

fn to_px(mm: i64) -> f64 {
    DIAGRAM_MARGIN_PX + mm as f64 / MM_PER_PIXEL
}

/// SVG geometry for the builder page. Axles are sorted front to back.
pub fn diagram(vehicle: &Vehicle, axles: &[Axle]) -> Diagram {
    let mut shapes: Vec<AxleShape> = axles
        .iter()
        .map(|a| AxleShape {
            id: a.id,
            position_mm: a.position_mm,
            cx: to_px(a.position_mm),
        })
        .collect();
    shapes.sort_by_key(|a| (a.position_mm, a.id));

    let chassis_width = vehicle.chassis_length_mm as f64 / MM_PER_PIXEL;
    Diagram {
        width_px: chassis_width + 2.0 * DIAGRAM_MARGIN_PX,
        chassis_x: DIAGRAM_MARGIN_PX,
        chassis_width,
        body_x: to_px(vehicle.body_offset_mm),
        body_width: vehicle.body_length_mm as f64 / MM_PER_PIXEL,
        wheel_radius: WHEEL_RADIUS_PX,
        mm_per_pixel: MM_PER_PIXEL,
        axles: shapes,
    }
}
