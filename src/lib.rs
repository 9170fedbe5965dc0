#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use ps_io as io;
pub use ps_pack as pack;
pub use ps_record as record;
