//! Abuse guards. Every limit is generous for a real shop and exists only to
//! bound memory and disk for a single misbehaving tenant.

use crate::model::Ms;

pub const MAX_TENANTS: usize = 256;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_SERVICES_PER_TENANT: usize = 4_096;
pub const MAX_STAFF_PER_TENANT: usize = 4_096;
pub const MAX_WINDOWS_PER_STAFF: usize = 1_024;
pub const MAX_BOOKINGS_PER_STAFF: usize = 262_144;

pub const MAX_NAME_LEN: usize = 512;
pub const MAX_CUSTOMER_LEN: usize = 512;

/// A service longer than a full day cannot fit any availability window.
pub const MAX_SERVICE_DURATION_MINUTES: u32 = 24 * 60;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// No single booking may span more than a week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;
