use ulid::Ulid;

use crate::model::*;

// ── Slot scan ────────────────────────────────────────────────────

/// Candidates start every 15 minutes regardless of service duration.
pub const SLOT_STEP_MINUTES: u32 = 15;
pub const SLOT_STEP_MS: Ms = SLOT_STEP_MINUTES as Ms * MINUTE_MS;

/// One staff member's calendar for a single UTC day.
#[derive(Debug, Clone)]
pub struct StaffDay {
    pub staff_id: Ulid,
    pub staff_label: String,
    /// Windows for the requested weekday, in configuration order.
    pub windows: Vec<AvailabilityWindow>,
    /// Spans of confirmed bookings touching the day.
    pub booked: Vec<Span>,
}

/// Scan availability windows for free slots of exactly `duration_ms`.
///
/// Per window: anchor onto `day_start`, walk a cursor from the window
/// start in fixed 15-minute steps, and emit every candidate that fits
/// inside the window and does not overlap a booked span. A candidate
/// ending exactly at the window edge still fits, and a candidate that
/// merely touches a booking is free. The cursor advances whether or not
/// the candidate was emitted.
///
/// Output order is staff, then window, then chronological within the
/// window. Windows are scanned exactly as configured; overlapping
/// windows can yield the same slot more than once.
pub fn compute_slots(day_start: Ms, duration_ms: Ms, staff_days: &[StaffDay]) -> Vec<Slot> {
    let mut slots = Vec::new();
    for day in staff_days {
        for window in &day.windows {
            let bounds = window.anchor(day_start);
            let mut cursor = bounds.start;
            while cursor + duration_ms <= bounds.end {
                let candidate = Span::new(cursor, cursor + duration_ms);
                if !day.booked.iter().any(|b| b.overlaps(&candidate)) {
                    slots.push(Slot {
                        staff_id: day.staff_id,
                        staff_label: day.staff_label.clone(),
                        span: candidate,
                    });
                }
                cursor += SLOT_STEP_MS;
            }
        }
    }
    slots
}
