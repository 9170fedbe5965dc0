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

mod error;
mod memory;
mod reader;
mod writer;

// -----------------------------------------------------------------------------
// Top-level exports

pub use error::{ReadError, WriteError};
pub use memory::{MemoryReader, MemoryWriter, RecordSet};
pub use reader::{RandomAccess, RecordReader};
pub use writer::{RecordHandle, RecordWriter};
