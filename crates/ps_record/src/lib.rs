#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

// -----------------------------------------------------------------------------
// no_std support

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod record;
mod reference;
mod sheet;
mod tag;
mod value;

// -----------------------------------------------------------------------------
// Top-level exports

pub use record::{FieldName, Record, RecordFault};
pub use reference::RecordRef;
pub use sheet::{PropertySheet, SheetError};
pub use tag::TypeTag;
pub use value::{Refs, Value, ValueKind};
