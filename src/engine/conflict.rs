use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.start >= span.end {
        return Err(EngineError::InvalidDuration(span.duration_ms() / MINUTE_MS));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// A booking may start exactly where another ends; only open-interval
/// overlap with a confirmed booking is a conflict. Cancelled bookings
/// never block.
pub(crate) fn check_no_conflict(ss: &StaffState, span: &Span) -> Result<(), EngineError> {
    for booking in ss.bookings_overlapping(span) {
        if booking.is_active() {
            return Err(EngineError::Conflict(booking.id));
        }
    }
    Ok(())
}
