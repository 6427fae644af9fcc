use std::time::Instant;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{self, *};

use super::slots::{compute_slots, StaffDay};
use super::{Engine, EngineError};

/// Parse a `YYYY-MM-DD` date at the engine boundary.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    model::parse_date(s).ok_or_else(|| EngineError::InvalidDate(s.to_string()))
}

impl Engine {
    pub fn service_duration(&self, service_id: Ulid) -> Result<u32, EngineError> {
        self.services
            .get(&service_id)
            .map(|s| s.duration_minutes)
            .ok_or(EngineError::NotFound(service_id))
    }

    pub fn list_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> =
            self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by_key(|s| s.id);
        services
    }

    /// Roster in id order. ULIDs sort by creation time, so this is the
    /// order staff were added.
    ///
    /// Waits out any in-flight calendar write; mutations hold the staff
    /// write lock across the WAL commit, so a try_read here would fail
    /// under normal load.
    pub async fn list_staff(&self) -> Vec<StaffIdentity> {
        let arcs: Vec<_> = self.staff.iter().map(|e| e.value().clone()).collect();
        let mut staff = Vec::with_capacity(arcs.len());
        for ss in arcs {
            let guard = ss.read().await;
            staff.push(StaffIdentity {
                id: guard.id,
                label: guard.label.clone(),
            });
        }
        staff.sort_by_key(|s| s.id);
        staff
    }

    /// Windows configured for one weekday, in configuration order.
    pub async fn staff_windows(
        &self,
        staff_id: Ulid,
        weekday: u8,
    ) -> Result<Vec<AvailabilityWindow>, EngineError> {
        if weekday > 6 {
            return Err(EngineError::InvalidWeekday(weekday));
        }
        let ss = self
            .get_staff(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let guard = ss.read().await;
        Ok(guard.windows_for(weekday))
    }

    /// The full calendar for one staff member, cancelled records included,
    /// in start order.
    pub async fn staff_bookings(&self, staff_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let ss = self
            .get_staff(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let guard = ss.read().await;
        Ok(guard.bookings.clone())
    }

    /// Confirmed bookings overlapping `range`, in start order.
    pub async fn bookings_in_range(
        &self,
        staff_id: Ulid,
        range: Span,
    ) -> Result<Vec<Booking>, EngineError> {
        let ss = self
            .get_staff(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let guard = ss.read().await;
        Ok(guard
            .bookings_overlapping(&range)
            .filter(|b| b.is_active())
            .cloned()
            .collect())
    }

    /// Free slots for a service on one UTC date, for one staff member or
    /// the whole roster.
    ///
    /// Assembles a per-staff snapshot (windows for the date's weekday plus
    /// confirmed bookings touching the day) under read locks, then runs
    /// the pure slot scan. An empty result is a normal answer, not an
    /// error.
    pub async fn resolve_slots(
        &self,
        service_id: Ulid,
        date: NaiveDate,
        staff_id: Option<Ulid>,
    ) -> Result<Vec<Slot>, EngineError> {
        let duration_minutes = self.service_duration(service_id)?;
        let duration_ms = duration_minutes as Ms * MINUTE_MS;
        let day_start = day_start_ms(date);
        let weekday = weekday_index(date);
        let day = Span::new(day_start, day_start + DAY_MS);

        let candidates: Vec<Ulid> = match staff_id {
            Some(id) => {
                if !self.staff.contains_key(&id) {
                    return Err(EngineError::NotFound(id));
                }
                vec![id]
            }
            None => {
                let mut ids: Vec<Ulid> = self.staff.iter().map(|e| *e.key()).collect();
                ids.sort();
                ids
            }
        };

        let started = Instant::now();
        let mut staff_days = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(ss) = self.get_staff(&id) else {
                continue;
            };
            let guard = ss.read().await;
            let windows = guard.windows_for(weekday);
            if windows.is_empty() {
                continue;
            }
            let booked: Vec<Span> = guard
                .bookings_overlapping(&day)
                .filter(|b| b.is_active())
                .map(|b| b.span)
                .collect();
            staff_days.push(StaffDay {
                staff_id: id,
                staff_label: guard.label.clone(),
                windows,
                booked,
            });
        }

        let slots = compute_slots(day_start, duration_ms, &staff_days);

        metrics::counter!(crate::observability::RESOLUTIONS_TOTAL).increment(1);
        metrics::histogram!(crate::observability::RESOLUTION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::histogram!(crate::observability::SLOTS_RETURNED).record(slots.len() as f64);
        tracing::debug!(
            service = %service_id,
            %date,
            staff = staff_days.len(),
            slots = slots.len(),
            "resolved slots"
        );
        Ok(slots)
    }

    /// `resolve_slots` with the date still in `YYYY-MM-DD` form.
    pub async fn resolve_slots_on(
        &self,
        service_id: Ulid,
        date: &str,
        staff_id: Option<Ulid>,
    ) -> Result<Vec<Slot>, EngineError> {
        let date = parse_date(date)?;
        self.resolve_slots(service_id, date, staff_id).await
    }
}
