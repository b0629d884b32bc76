//! Storage is split in two:
//!  - [record_storage::RecordStore] keeps finished records (projects, time entries, focus
//!    sessions). Records are written there only when a timer stops.
//!  - [scratch::ScratchStore] keeps a snapshot of each running timer so it can be resumed after
//!    the process restarts.

pub mod entities;
pub mod record_storage;
pub mod scratch;
