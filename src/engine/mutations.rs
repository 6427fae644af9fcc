use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_service(
        &self,
        id: Ulid,
        name: String,
        duration_minutes: u32,
    ) -> Result<(), EngineError> {
        if duration_minutes == 0 {
            return Err(EngineError::InvalidDuration(duration_minutes as i64));
        }
        if duration_minutes > MAX_SERVICE_DURATION_MINUTES {
            return Err(EngineError::LimitExceeded("service duration too long"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("service name too long"));
        }
        // Catalog mutations serialize on this gate, so the existence check
        // and the insert below cannot interleave with a racing create.
        let _gate = self.catalog_lock.lock().await;
        if self.services.len() >= MAX_SERVICES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        if self.services.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ServiceCreated {
            id,
            name: name.clone(),
            duration_minutes,
        };
        self.wal_append(&event).await?;
        self.services.insert(
            id,
            Service {
                id,
                name,
                duration_minutes,
            },
        );
        self.notify.publish(id, &event);
        Ok(())
    }

    pub async fn delete_service(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.catalog_lock.lock().await;
        if !self.services.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::ServiceDeleted { id };
        self.wal_append(&event).await?;
        self.services.remove(&id);
        self.notify.publish(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    pub async fn create_staff(&self, id: Ulid, label: String) -> Result<(), EngineError> {
        if label.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("staff label too long"));
        }
        let _gate = self.catalog_lock.lock().await;
        if self.staff.len() >= MAX_STAFF_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many staff"));
        }
        if self.staff.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::StaffCreated {
            id,
            label: label.clone(),
        };
        self.wal_append(&event).await?;
        self.staff
            .insert(id, Arc::new(RwLock::new(StaffState::new(id, label))));
        self.notify.publish(id, &event);
        Ok(())
    }

    pub async fn add_window(
        &self,
        id: Ulid,
        staff_id: Ulid,
        weekday: u8,
        start_minute: u32,
        end_minute: u32,
    ) -> Result<(), EngineError> {
        if weekday > 6 {
            return Err(EngineError::InvalidWeekday(weekday));
        }
        if start_minute >= end_minute || end_minute > MINUTES_PER_DAY {
            return Err(EngineError::InvalidWindow {
                start_minute,
                end_minute,
            });
        }
        let ss = self
            .get_staff(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let mut guard = ss.write().await;
        if guard.windows.len() >= MAX_WINDOWS_PER_STAFF {
            return Err(EngineError::LimitExceeded("too many windows on staff"));
        }

        let event = Event::WindowAdded {
            id,
            staff_id,
            weekday,
            start_minute,
            end_minute,
        };
        self.persist_and_apply(staff_id, &mut guard, &event).await
    }

    pub async fn remove_window(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (staff_id, mut guard) = self.resolve_entity_write(&id).await?;
        let event = Event::WindowRemoved { id, staff_id };
        self.persist_and_apply(staff_id, &mut guard, &event).await?;
        Ok(staff_id)
    }

    /// Book a slot. The conflict check and the insert happen under the
    /// same staff write lock, so two racing requests for the same slot
    /// cannot both commit.
    pub async fn create_booking(
        &self,
        id: Ulid,
        staff_id: Ulid,
        service_id: Ulid,
        span: Span,
        customer: Option<String>,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        if let Some(ref c) = customer
            && c.len() > MAX_CUSTOMER_LEN {
                return Err(EngineError::LimitExceeded("customer label too long"));
            }
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFound(service_id));
        }
        let ss = self
            .get_staff(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let mut guard = ss.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_STAFF {
            return Err(EngineError::LimitExceeded("too many bookings on staff"));
        }

        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let event = Event::BookingCreated {
            id,
            staff_id,
            service_id,
            span,
            customer,
        };
        self.persist_and_apply(staff_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);
        Ok(())
    }

    /// Mark a booking cancelled. The record stays on the calendar (and in
    /// the WAL) until compaction; it just stops blocking slots.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (staff_id, mut guard) = self.resolve_entity_write(&id).await?;
        if guard.booking_mut(id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::BookingCancelled { id, staff_id };
        self.persist_and_apply(staff_id, &mut guard, &event).await?;
        Ok(staff_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Cancelled bookings are pruned from
    /// memory and dropped from the rewritten log.
    ///
    /// Appends are quiesced for the duration: the catalog gate blocks
    /// service/staff mutations, and every staff write lock is held from
    /// the state snapshot until the rewritten file is swapped in. Any
    /// mutation is therefore either fully applied before the snapshot
    /// (and captured by it) or starts after the swap (and appends to the
    /// new file) — nothing acknowledged can miss the rewritten log.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.catalog_lock.lock().await;

        let mut events = Vec::new();

        for entry in self.services.iter() {
            let service = entry.value();
            events.push(Event::ServiceCreated {
                id: service.id,
                name: service.name.clone(),
                duration_minutes: service.duration_minutes,
            });
        }

        // Sorted acquisition order; calendar mutations take a single staff
        // lock, so this cannot deadlock against them.
        let mut staff_ids: Vec<Ulid> = self.staff.iter().map(|e| *e.key()).collect();
        staff_ids.sort();
        let mut guards = Vec::with_capacity(staff_ids.len());
        for staff_id in &staff_ids {
            let Some(ss) = self.get_staff(staff_id) else {
                continue;
            };
            guards.push(ss.write_owned().await);
        }

        for guard in &mut guards {
            guard.bookings.retain(|b| {
                if b.is_active() {
                    true
                } else {
                    self.entity_to_staff.remove(&b.id);
                    false
                }
            });

            events.push(Event::StaffCreated {
                id: guard.id,
                label: guard.label.clone(),
            });
            for w in &guard.windows {
                events.push(Event::WindowAdded {
                    id: w.id,
                    staff_id: guard.id,
                    weekday: w.weekday,
                    start_minute: w.start_minute,
                    end_minute: w.end_minute,
                });
            }
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    staff_id: guard.id,
                    service_id: b.service_id,
                    span: b.span,
                    customer: b.customer.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
