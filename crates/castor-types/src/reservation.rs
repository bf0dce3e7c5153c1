use crate::TupleType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Locked,
    Unlocked,
}

/// ReservationElement describes a contiguous range within one chunk.
/// Ordering within a `Reservation`'s element list defines consumption order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationElement {
    pub chunk_id: Uuid,
    pub start_index: i64,
    pub reserved_tuples: i64,
}

impl ReservationElement {
    pub fn new(chunk_id: Uuid, start_index: i64, reserved_tuples: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(reserved_tuples > 0, "reserved_tuples must be positive");
        start_index
            .checked_add(reserved_tuples)
            .ok_or_else(|| anyhow::anyhow!("start_index + reserved_tuples overflows"))?;
        Ok(Self {
            chunk_id,
            start_index,
            reserved_tuples,
        })
    }

    pub fn end_index(&self) -> i64 {
        self.start_index + self.reserved_tuples
    }
}

/// Reservation is an immutable (except for `status`) record of tuples
/// withheld from the available pool for a specific MPC request.
///
/// By convention `reservation_id` is `"<request_id>_<TupleType>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Schema version of this serialized representation; bump on breaking change.
    pub schema: u32,
    pub reservation_id: String,
    pub tuple_type: TupleType,
    pub status: ReservationStatus,
    pub elements: Vec<ReservationElement>,
}

pub const RESERVATION_SCHEMA: u32 = 1;

impl Reservation {
    pub fn new(
        request_id: &str,
        tuple_type: TupleType,
        elements: Vec<ReservationElement>,
    ) -> Self {
        Self {
            schema: RESERVATION_SCHEMA,
            reservation_id: format!("{request_id}_{tuple_type}"),
            tuple_type,
            status: ReservationStatus::Locked,
            elements,
        }
    }

    pub fn total_reserved_tuples(&self) -> i64 {
        self.elements.iter().map(|e| e.reserved_tuples).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn id_follows_request_and_type_convention() {
        let r = Reservation::new("8f1c", TupleType::BitGfp, vec![]);
        assert_eq!(r.reservation_id, "8f1c_bit_gfp");
    }

    #[test]
    fn zero_reserved_tuples_is_rejected() {
        assert!(ReservationElement::new(Uuid::nil(), 0, 0).is_err());
    }

    #[test]
    fn overflowing_range_is_rejected() {
        assert!(ReservationElement::new(Uuid::nil(), i64::MAX - 1, 10).is_err());
    }

    #[test]
    fn serializes_with_version_tag() {
        let r = Reservation::new(
            "8f1c",
            TupleType::BitGfp,
            vec![ReservationElement::new(Uuid::nil(), 0, 10).unwrap()],
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["schema"], 1);
    }

    #[test]
    fn wire_representation_is_camel_case() {
        let r = Reservation::new(
            "8f1c",
            TupleType::BitGfp,
            vec![ReservationElement::new(Uuid::nil(), 0, 10).unwrap()],
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["reservationId"], "8f1c_bit_gfp");
        assert!(json.get("reservation_id").is_none());
        assert!(json.get("tuple_type").is_none());

        let element = &json["elements"][0];
        assert_eq!(element["chunkId"], Uuid::nil().to_string());
        assert_eq!(element["startIndex"], 0);
        assert_eq!(element["reservedTuples"], 10);

        let round_tripped: Reservation = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, r);
    }
}
