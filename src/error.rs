use thiserror::Error;

/// The full error taxonomy for the booking coordination core.
///
/// Every variant carries a stable machine `code()` and an HTTP-equivalent
/// `status_equivalent()` so a surface layer (out of scope for this crate)
/// can translate it without inspecting the message text.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("slot is locked by a concurrent request")]
    SlotLocked,

    #[error("user not found or inactive")]
    UserNotFound,

    #[error("user has reached the maximum number of confirmed bookings")]
    MaxBookingsReached,

    #[error("slot not found")]
    SlotNotFound,

    #[error("slot is blocked by an administrator")]
    SlotBlocked,

    #[error("requested guest count exceeds remaining capacity")]
    InsufficientCapacity,

    #[error("slot has already ended")]
    SlotInPast,

    #[error("slot start is beyond the booking horizon")]
    AdvanceLimitExceeded,

    #[error("user already holds a confirmed booking for this slot")]
    DuplicateBooking,

    #[error("booking not found")]
    BookingNotFound,

    #[error("caller is not the booking owner and not an admin")]
    Unauthorized,

    #[error("booking is in a terminal state or outside the cancellation window")]
    CancellationNotAllowed,

    /// Internal classification of a storage serialization failure. Never
    /// surfaced to a caller directly — the Coordinator catches this,
    /// retries once, and remaps a second failure to `SlotLocked`.
    #[error("storage serialization conflict")]
    SerializationConflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code, as specified in the error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::SlotLocked => "SLOT_LOCKED",
            CoreError::UserNotFound => "USER_NOT_FOUND",
            CoreError::MaxBookingsReached => "MAX_BOOKINGS_REACHED",
            CoreError::SlotNotFound => "SLOT_NOT_FOUND",
            CoreError::SlotBlocked => "SLOT_BLOCKED",
            CoreError::InsufficientCapacity => "INSUFFICIENT_CAPACITY",
            CoreError::SlotInPast => "SLOT_IN_PAST",
            CoreError::AdvanceLimitExceeded => "ADVANCE_LIMIT_EXCEEDED",
            CoreError::DuplicateBooking => "DUPLICATE_BOOKING",
            CoreError::BookingNotFound => "BOOKING_NOT_FOUND",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::CancellationNotAllowed => "CANCELLATION_NOT_ALLOWED",
            CoreError::SerializationConflict => "INTERNAL",
            CoreError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP-equivalent status for a surface layer to translate with.
    pub fn status_equivalent(&self) -> u16 {
        match self {
            CoreError::SlotLocked => 409,
            CoreError::UserNotFound => 404,
            CoreError::MaxBookingsReached => 429,
            CoreError::SlotNotFound => 404,
            CoreError::SlotBlocked => 400,
            CoreError::InsufficientCapacity => 400,
            CoreError::SlotInPast => 400,
            CoreError::AdvanceLimitExceeded => 400,
            CoreError::DuplicateBooking => 409,
            CoreError::BookingNotFound => 404,
            CoreError::Unauthorized => 403,
            CoreError::CancellationNotAllowed => 400,
            CoreError::SerializationConflict => 500,
            CoreError::Internal(_) => 500,
        }
    }
}

impl From<tokio::time::error::Elapsed> for CoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CoreError::Internal("operation deadline exceeded".to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
