//! Domain models for mirrored mail

mod clobber;
mod label;
mod message;

pub use clobber::{ClobberSet, ContentField, UnknownFieldError};
pub use label::{LabelMap, SystemLabel};
pub use message::{EmailAddress, MessageId, MessageRecord, MessageRecordBuilder, Recipients};
