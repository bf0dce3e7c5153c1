use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Field is the algebraic structure a tuple's shares live in: a large prime
/// field, or GF(2^k) for some fixed k.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Prime,
    Binary(u16),
}

/// TupleType is the closed set of preprocessed material kinds Castor can
/// serve. The set is fixed at build time and totally ordered so that
/// `findAnyAvailableOfType`-style queries are deterministic.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    sqlx::Type,
)]
#[sqlx(type_name = "tuple_type")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TupleType {
    MultiplyTripleGfp,
    MultiplyTripleGf2n,
    BitGfp,
    BitGf2n,
    SquarePairGfp,
    InputMaskGfp,
    InputMaskGf2n,
    DabitGfp,
}

impl TupleType {
    /// The field this tuple type's shares live in.
    pub fn field(&self) -> Field {
        match self {
            TupleType::MultiplyTripleGfp
            | TupleType::BitGfp
            | TupleType::SquarePairGfp
            | TupleType::InputMaskGfp
            | TupleType::DabitGfp => Field::Prime,
            TupleType::MultiplyTripleGf2n | TupleType::BitGf2n | TupleType::InputMaskGf2n => {
                Field::Binary(128)
            }
        }
    }

    /// Size in bytes of a single party's share of one tuple of this type.
    pub fn share_size(&self) -> usize {
        match self.field() {
            Field::Prime => 32,
            Field::Binary(_) => 16,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn serializes_as_snake_case_tag() {
        assert_eq!(
            serde_json::to_string(&TupleType::MultiplyTripleGfp).unwrap(),
            "\"multiply_triple_gfp\"",
        );
    }

    #[test]
    fn round_trips_through_string() {
        for t in TupleType::iter() {
            let s = t.to_string();
            let parsed: TupleType = s.parse().unwrap();
            assert_eq!(t, parsed);
        }
    }

    #[test]
    fn share_size_matches_field() {
        assert_eq!(TupleType::MultiplyTripleGfp.share_size(), 32);
        assert_eq!(TupleType::BitGf2n.share_size(), 16);
    }
}
