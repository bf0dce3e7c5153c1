use crate::TupleType;
use uuid::Uuid;

/// TupleChunk is a unit of offline-produced material uploaded as one piece.
/// The core tracks only its identity and size; payload bytes live in an
/// external object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleChunk {
    pub chunk_id: Uuid,
    pub tuple_type: TupleType,
    pub number_of_tuples: i64,
}

impl TupleChunk {
    pub fn new(chunk_id: Uuid, tuple_type: TupleType, number_of_tuples: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(
            number_of_tuples >= 1,
            "chunk {chunk_id} must contain at least one tuple, got {number_of_tuples}"
        );
        Ok(Self {
            chunk_id,
            tuple_type,
            number_of_tuples,
        })
    }
}
