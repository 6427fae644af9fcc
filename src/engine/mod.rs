mod conflict;
mod error;
mod mutations;
mod queries;
pub mod slots;

pub use error::EngineError;
pub use queries::parse_date;
pub use slots::{compute_slots, StaffDay, SLOT_STEP_MINUTES, SLOT_STEP_MS};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::ChangeFeed;
use crate::wal::Wal;

pub type SharedStaffState = Arc<RwLock<StaffState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One tenant's in-memory scheduling state: the service catalog plus one
/// calendar per staff member, backed by a single WAL.
pub struct Engine {
    pub services: DashMap<Ulid, Service>,
    pub staff: DashMap<Ulid, SharedStaffState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<ChangeFeed>,
    /// Reverse lookup: entity (window/booking) id → staff id
    pub(super) entity_to_staff: DashMap<Ulid, Ulid>,
    /// Serializes catalog mutations (service/staff creation and deletion)
    /// and compaction. Calendar writes take the staff lock instead;
    /// compaction takes this gate plus every staff write lock so no append
    /// can land between the state snapshot and the WAL rewrite.
    pub(super) catalog_lock: tokio::sync::Mutex<()>,
}

/// Apply an event directly to a StaffState (no locking — caller holds the lock).
fn apply_to_staff(ss: &mut StaffState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::WindowAdded {
            id,
            staff_id,
            weekday,
            start_minute,
            end_minute,
        } => {
            ss.windows.push(AvailabilityWindow {
                id: *id,
                weekday: *weekday,
                start_minute: *start_minute,
                end_minute: *end_minute,
            });
            entity_map.insert(*id, *staff_id);
        }
        Event::WindowRemoved { id, .. } => {
            ss.remove_window(*id);
            entity_map.remove(id);
        }
        Event::BookingCreated {
            id,
            staff_id,
            service_id,
            span,
            customer,
        } => {
            ss.insert_booking(Booking {
                id: *id,
                service_id: *service_id,
                span: *span,
                customer: customer.clone(),
                status: BookingStatus::Confirmed,
            });
            entity_map.insert(*id, *staff_id);
        }
        Event::BookingCancelled { id, .. } => {
            // The record (and its entity mapping) stays until compaction
            if let Some(booking) = ss.booking_mut(*id) {
                booking.status = BookingStatus::Cancelled;
            }
        }
        // Service and staff lifecycle are handled at the map level, not here
        Event::ServiceCreated { .. } | Event::ServiceDeleted { .. } | Event::StaffCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<ChangeFeed>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            services: DashMap::new(),
            staff: DashMap::new(),
            wal_tx,
            notify,
            entity_to_staff: DashMap::new(),
            catalog_lock: tokio::sync::Mutex::new(()),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy tenant
        // creation).
        for event in &events {
            match event {
                Event::ServiceCreated {
                    id,
                    name,
                    duration_minutes,
                } => {
                    engine.services.insert(
                        *id,
                        Service {
                            id: *id,
                            name: name.clone(),
                            duration_minutes: *duration_minutes,
                        },
                    );
                }
                Event::ServiceDeleted { id } => {
                    engine.services.remove(id);
                }
                Event::StaffCreated { id, label } => {
                    engine
                        .staff
                        .insert(*id, Arc::new(RwLock::new(StaffState::new(*id, label.clone()))));
                }
                other => {
                    if let Some(staff_id) = event_staff_id(other)
                        && let Some(entry) = engine.staff.get(&staff_id) {
                            let ss_arc = entry.clone();
                            let mut guard = ss_arc.try_write().expect("replay: uncontended write");
                            apply_to_staff(&mut guard, other, &engine.entity_to_staff);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_staff(&self, id: &Ulid) -> Option<SharedStaffState> {
        self.staff.get(id).map(|e| e.value().clone())
    }

    pub fn staff_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_staff.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        staff_id: Ulid,
        ss: &mut StaffState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_staff(ss, event, &self.entity_to_staff);
        self.notify.publish(staff_id, event);
        Ok(())
    }

    /// Lookup entity → staff, get staff, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<StaffState>), EngineError> {
        let staff_id = self
            .staff_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let ss = self
            .get_staff(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let guard = ss.write_owned().await;
        Ok((staff_id, guard))
    }
}

/// Extract the staff_id from a calendar event.
fn event_staff_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::WindowAdded { staff_id, .. }
        | Event::WindowRemoved { staff_id, .. }
        | Event::BookingCreated { staff_id, .. }
        | Event::BookingCancelled { staff_id, .. } => Some(*staff_id),
        Event::ServiceCreated { .. } | Event::ServiceDeleted { .. } | Event::StaffCreated { .. } => {
            None
        }
    }
}
