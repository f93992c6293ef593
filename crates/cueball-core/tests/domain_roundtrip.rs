//! End-to-end tests: stage, write, promote, then read every partition back.

use std::collections::BTreeMap;
use std::path::Path;

use cueball_core::{
    CodecKind, Cueball, CueballError, DomainConfig, HasherKind, ReaderResult, StagingArea,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

type Records = Vec<(Vec<u8>, Vec<u8>)>;

fn random_records(seed: u64, count: usize, value_length: usize) -> Records {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let key_length = rng.gen_range(8..32);
            let key: Vec<u8> = (0..key_length).map(|_| rng.gen()).collect();
            let value: Vec<u8> = (0..value_length).map(|_| rng.gen()).collect();
            (key, value)
        })
        .collect()
}

/// Group records by partition, sort each group by digest and publish `version`.
fn build_version(engine: &Cueball, version: u32, records: &Records) {
    let mut by_partition: BTreeMap<u32, Vec<(Vec<u8>, &[u8])>> = BTreeMap::new();
    for (key, value) in records {
        by_partition
            .entry(engine.partition_of(key))
            .or_default()
            .push((engine.hash(key), value.as_slice()));
    }

    let mut staging = StagingArea::create(engine.root()).unwrap();
    let target = staging.output_target();
    for (partition, mut entries) in by_partition {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut writer = engine.open_writer(&target, partition, version, true).unwrap();
        for (digest, value) in &entries {
            writer.write_hash(digest, value).unwrap();
        }
        writer.close().unwrap();
        staging.mark_written(partition).unwrap();
    }
    staging.promote(version).unwrap();
}

fn scenario_config() -> DomainConfig {
    DomainConfig::new(8, 16, 4, 4)
}

fn engine(root: &Path, config: DomainConfig) -> Cueball {
    Cueball::new(config, root).unwrap()
}

#[test]
fn test_every_written_key_found() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), scenario_config());
    let records = random_records(7, 1000, 16);
    build_version(&engine, 1, &records);

    let readers: Vec<_> = (0..4).map(|p| engine.open_reader(p, 1).unwrap()).collect();
    assert_eq!(readers.iter().map(|r| r.len()).sum::<u64>(), 1000);

    let mut result = ReaderResult::new();
    for (key, value) in &records {
        let reader = &readers[engine.partition_of(key) as usize];
        reader.get(key, &mut result).unwrap();
        assert!(result.is_found(), "missing key {:?}", key);
        assert_eq!(result.value(), value.as_slice());
    }

    let mut false_hits = 0;
    for (key, _) in random_records(8, 1000, 16) {
        readers[engine.partition_of(&key) as usize].get(&key, &mut result).unwrap();
        if result.is_found() {
            false_hits += 1;
        }
    }
    assert!(false_hits <= 1, "{} false hits", false_hits);
}

#[test]
fn test_partitions_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), scenario_config());
    let records = random_records(11, 200, 16);
    build_version(&engine, 1, &records);

    let readers: Vec<_> = (0..4).map(|p| engine.open_reader(p, 1).unwrap()).collect();
    let mut result = ReaderResult::new();
    for (key, _) in &records {
        let owner = engine.partition_of(key);
        for (partition, reader) in readers.iter().enumerate() {
            reader.get(key, &mut result).unwrap();
            assert_eq!(result.is_found(), partition as u32 == owner);
        }
    }
}

#[test]
fn test_zstd_domain_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let config = DomainConfig::new(8, 64, 6, 2).with_codec(CodecKind::Zstd);
    let engine = engine(tmp.path(), config);
    let records: Records = random_records(3, 300, 0)
        .into_iter()
        .enumerate()
        .map(|(i, (key, _))| (key, format!("{:08}", i).repeat(8).into_bytes()))
        .collect();
    build_version(&engine, 4, &records);

    let mut result = ReaderResult::new();
    for (key, value) in &records {
        engine
            .open_reader(engine.partition_of(key), 4)
            .unwrap()
            .get(key, &mut result)
            .unwrap();
        assert_eq!(result.value(), value.as_slice());
    }
}

#[test]
fn test_unsorted_input_loses_keys_without_failing() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), DomainConfig::new(8, 16, 4, 1));
    let records = random_records(21, 500, 16);

    let mut entries: Vec<(Vec<u8>, &[u8])> =
        records.iter().map(|(k, v)| (engine.hash(k), v.as_slice())).collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let mut staging = StagingArea::create(engine.root()).unwrap();
    let mut writer = engine.open_writer(&staging.output_target(), 0, 1, true).unwrap();
    for (digest, value) in &entries {
        writer.write_hash(digest, value).unwrap();
    }
    writer.close().unwrap();
    staging.mark_written(0).unwrap();
    staging.promote(1).unwrap();

    let reader = engine.open_reader(0, 1).unwrap();
    let mut result = ReaderResult::new();
    let mut misses = 0;
    for (key, value) in &records {
        reader.get(key, &mut result).unwrap();
        if result.is_found() {
            assert_eq!(result.value(), value.as_slice());
        } else {
            misses += 1;
        }
    }
    assert!(misses > 0);
}

#[test]
fn test_colliding_digests_return_first_written() {
    let tmp = TempDir::new().unwrap();
    let config = DomainConfig::new(8, 4, 4, 1).with_hasher(HasherKind::Identity);
    let engine = engine(tmp.path(), config);

    let mut staging = StagingArea::create(engine.root()).unwrap();
    let mut writer = engine.open_writer(&staging.output_target(), 0, 1, true).unwrap();
    // Identity digests keep only the first 8 bytes: both keys hash to "collide-".
    writer.write(b"collide-one", b"1111").unwrap();
    writer.write(b"collide-two", b"2222").unwrap();
    writer.close().unwrap();
    staging.mark_written(0).unwrap();
    staging.promote(1).unwrap();

    let reader = engine.open_reader(0, 1).unwrap();
    let mut result = ReaderResult::new();
    reader.get(b"collide-two", &mut result).unwrap();
    assert!(result.is_found());
    assert_eq!(result.value(), b"1111");
}

#[test]
fn test_version_invisible_until_promoted() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), DomainConfig::new(8, 16, 4, 2));
    let records = random_records(5, 50, 16);

    let mut staging = StagingArea::create(engine.root()).unwrap();
    let target = staging.output_target();
    for partition in 0..2 {
        let mut entries: Vec<(Vec<u8>, &[u8])> = records
            .iter()
            .filter(|(k, _)| engine.partition_of(k) == partition)
            .map(|(k, v)| (engine.hash(k), v.as_slice()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut writer = engine.open_writer(&target, partition, 2, true).unwrap();
        for (digest, value) in &entries {
            writer.write_hash(digest, value).unwrap();
        }
        writer.close().unwrap();
        staging.mark_written(partition).unwrap();

        for p in 0..2 {
            assert!(matches!(
                engine.open_reader(p, 2),
                Err(CueballError::VersionNotFound { version: 2, .. })
            ));
        }
    }

    staging.promote(2).unwrap();
    let mut result = ReaderResult::new();
    for (key, value) in &records {
        engine
            .open_reader(engine.partition_of(key), 2)
            .unwrap()
            .get(key, &mut result)
            .unwrap();
        assert_eq!(result.value(), value.as_slice());
    }
}

#[test]
fn test_concurrent_readers() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(tmp.path(), DomainConfig::new(8, 16, 4, 1).with_cache_capacity(64));
    let records = random_records(13, 400, 16);
    build_version(&engine, 1, &records);

    let reader = std::sync::Arc::new(engine.open_reader(0, 1).unwrap());
    let records = std::sync::Arc::new(records);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let reader = std::sync::Arc::clone(&reader);
            let records = std::sync::Arc::clone(&records);
            std::thread::spawn(move || {
                let mut result = ReaderResult::new();
                for (key, value) in records.iter().skip(t).step_by(2) {
                    reader.get(key, &mut result).unwrap();
                    assert_eq!(result.value(), value.as_slice());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(reader.cache().len() <= 64);
}
