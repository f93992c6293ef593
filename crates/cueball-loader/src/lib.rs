//! Cueball Loader: Bulk-Load Adapter
//!
//! Turns a stream of partition-grouped records into a promoted Cueball
//! version. Storage details stay in cueball-core; this crate only decides
//! which partition writer is open and when the build is published.

pub mod generator;
pub mod record_writer;

pub use generator::{generate_domain, partition_and_sort, random_records, SortedPartition};
pub use record_writer::{DomainRecordWriter, LoadSummary};
