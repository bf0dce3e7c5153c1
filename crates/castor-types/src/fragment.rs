use crate::TupleType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ActivationStatus tracks whether a fragment has been agreed across all
/// MPC parties yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activation_status")]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivationStatus {
    Locked,
    Unlocked,
}

/// Fragment represents a half-open tuple range `[start_index, end_index)`
/// within one chunk. It is the unit of availability tracking.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Fragment {
    /// Repository-assigned, monotonic; used only for stable FIFO ordering.
    pub id: i64,
    pub chunk_id: Uuid,
    pub tuple_type: TupleType,
    pub start_index: i64,
    pub end_index: i64,
    pub activation_status: ActivationStatus,
    pub reservation_id: Option<String>,
}

impl Fragment {
    /// A fragment is available iff it's unlocked and not promised to a reservation.
    pub fn is_available(&self) -> bool {
        self.activation_status == ActivationStatus::Unlocked && self.reservation_id.is_none()
    }

    pub fn len(&self) -> i64 {
        self.end_index - self.start_index
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fragment(start: i64, end: i64, status: ActivationStatus, reservation: Option<&str>) -> Fragment {
        Fragment {
            id: 1,
            chunk_id: Uuid::nil(),
            tuple_type: TupleType::BitGfp,
            start_index: start,
            end_index: end,
            activation_status: status,
            reservation_id: reservation.map(str::to_string),
        }
    }

    #[test]
    fn availability_requires_unlocked_and_unreserved() {
        assert!(fragment(0, 10, ActivationStatus::Unlocked, None).is_available());
        assert!(!fragment(0, 10, ActivationStatus::Locked, None).is_available());
        assert!(!fragment(0, 10, ActivationStatus::Unlocked, Some("R1")).is_available());
    }

    #[test]
    fn len_is_range_width() {
        assert_eq!(fragment(10, 25, ActivationStatus::Unlocked, None).len(), 15);
    }
}
