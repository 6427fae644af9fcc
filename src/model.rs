use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only absolute time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 24 * 60 * MINUTE_MS;
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Open-interval overlap: spans that merely touch do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Calendar helpers ─────────────────────────────────────────────
//
// All day arithmetic is UTC. A tenant's "Monday 09:00" means 09:00 UTC on
// that Monday; no server-local timezone ever leaks in.

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Midnight UTC for the given date, in unix milliseconds.
pub fn day_start_ms(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Weekday index with Sunday = 0 .. Saturday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// A recurring weekly availability window, stored as minute-of-day offsets.
/// `weekday` uses Sunday = 0 .. Saturday = 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Ulid,
    pub weekday: u8,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl AvailabilityWindow {
    /// Anchor the minute-of-day offsets onto a concrete UTC day start.
    pub fn anchor(&self, day_start: Ms) -> Span {
        Span::new(
            day_start + self.start_minute as Ms * MINUTE_MS,
            day_start + self.end_minute as Ms * MINUTE_MS,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// An appointment on one staff member's calendar. Cancelled bookings stay
/// in place (and in the WAL) until compaction prunes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub service_id: Ulid,
    pub span: Span,
    pub customer: Option<String>,
    pub status: BookingStatus,
}

impl Booking {
    /// Only confirmed bookings block the calendar.
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub duration_minutes: u32,
}

impl Service {
    pub fn duration_ms(&self) -> Ms {
        self.duration_minutes as Ms * MINUTE_MS
    }
}

#[derive(Debug, Clone)]
pub struct StaffState {
    pub id: Ulid,
    pub label: String,
    /// Weekly windows in insertion order. Overlapping windows are kept
    /// as configured, never merged.
    pub windows: Vec<AvailabilityWindow>,
    /// Bookings sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl StaffState {
    pub fn new(id: Ulid, label: String) -> Self {
        Self {
            id,
            label,
            windows: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Windows for one weekday, in configuration order.
    pub fn windows_for(&self, weekday: u8) -> Vec<AvailabilityWindow> {
        self.windows
            .iter()
            .filter(|w| w.weekday == weekday)
            .copied()
            .collect()
    }

    pub fn remove_window(&mut self, id: Ulid) -> Option<AvailabilityWindow> {
        let pos = self.windows.iter().position(|w| w.id == id)?;
        Some(self.windows.remove(pos))
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return bookings whose span overlaps the query window, any status.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn bookings_overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffIdentity {
    pub id: Ulid,
    pub label: String,
}

/// A free bookable slot — computed, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub staff_id: Ulid,
    pub staff_label: String,
    pub span: Span,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ServiceCreated {
        id: Ulid,
        name: String,
        duration_minutes: u32,
    },
    ServiceDeleted {
        id: Ulid,
    },
    StaffCreated {
        id: Ulid,
        label: String,
    },
    WindowAdded {
        id: Ulid,
        staff_id: Ulid,
        weekday: u8,
        start_minute: u32,
        end_minute: u32,
    },
    WindowRemoved {
        id: Ulid,
        staff_id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        staff_id: Ulid,
        service_id: Ulid,
        span: Span,
        customer: Option<String>,
    },
    BookingCancelled {
        id: Ulid,
        staff_id: Ulid,
    },
}
