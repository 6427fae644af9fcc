use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    Conflict(Ulid),
    InvalidDuration(i64),
    InvalidDate(String),
    InvalidWindow { start_minute: u32, end_minute: u32 },
    InvalidWeekday(u8),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::InvalidDuration(minutes) => {
                write!(f, "invalid service duration: {minutes} minutes")
            }
            EngineError::InvalidDate(s) => write!(f, "invalid date: {s:?}"),
            EngineError::InvalidWindow {
                start_minute,
                end_minute,
            } => {
                write!(f, "invalid window: [{start_minute}, {end_minute}) minutes")
            }
            EngineError::InvalidWeekday(day) => {
                write!(f, "invalid weekday: {day} (expected 0=Sunday..6=Saturday)")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
