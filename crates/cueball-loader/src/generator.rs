//! Sort stage and seeded domain generation
//!
//! Writers require digest-sorted input per partition. `partition_and_sort`
//! is that upstream stage for records held in memory; `generate_domain` uses
//! it to build a complete random version, which is handy for benchmarks and
//! for seeding test deployments.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use cueball_core::{Cueball, CueballResult, DomainConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::record_writer::{DomainRecordWriter, LoadSummary};

/// (digest, value) pairs of one partition, ascending by digest
pub type SortedPartition = Vec<(Vec<u8>, Vec<u8>)>;

/// Route every record to its partition and sort each partition by digest.
///
/// The sort is stable, so records with equal digests keep their input order
/// and the first one is the one readers will return.
pub fn partition_and_sort<I>(engine: &Cueball, records: I) -> BTreeMap<u32, SortedPartition>
where
    I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
{
    let mut partitions: BTreeMap<u32, SortedPartition> = BTreeMap::new();
    for (key, value) in records {
        partitions
            .entry(engine.partition_of(&key))
            .or_default()
            .push((engine.hash(&key), value));
    }
    for entries in partitions.values_mut() {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
    }
    partitions
}

/// `count` random records with `key_length`-byte keys and `value_length`-byte
/// values. Equal seeds give equal records.
pub fn random_records(seed: u64, count: usize, key_length: usize, value_length: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let key: Vec<u8> = (0..key_length).map(|_| rng.gen()).collect();
            let value: Vec<u8> = (0..value_length).map(|_| rng.gen()).collect();
            (key, value)
        })
        .collect()
}

/// Build and promote `version` of a domain filled with random records.
///
/// Every partition is written, including partitions that receive no
/// records, so each one has a readable version afterwards.
pub fn generate_domain(
    config: DomainConfig,
    root: &Path,
    version: u32,
    seed: u64,
    num_records: usize,
    key_length: usize,
) -> CueballResult<LoadSummary> {
    let engine = Arc::new(Cueball::new(config, root)?);
    let records = random_records(seed, num_records, key_length, engine.config().value_length);
    let mut partitions = partition_and_sort(&engine, records);

    let mut writer = DomainRecordWriter::new(engine.clone(), root, version, true)?;
    for partition in 0..engine.config().num_partitions {
        writer.start_partition(partition)?;
        for (digest, value) in partitions.remove(&partition).unwrap_or_default() {
            writer.write_hash(partition, &digest, &value)?;
        }
    }
    let summary = writer.close()?;

    info!(
        version,
        seed,
        records = num_records,
        partitions = summary.partitions.len(),
        path = %summary.version_dir.display(),
        "generated cueball domain"
    );
    Ok(summary)
}
