mod chunk;
mod error;
mod fragment;
mod reservation;
mod tuple_type;

pub use chunk::TupleChunk;
pub use error::{Error, Result};
pub use fragment::{ActivationStatus, Fragment};
pub use reservation::{Reservation, ReservationElement, ReservationStatus, RESERVATION_SCHEMA};
pub use tuple_type::{Field, TupleType};
