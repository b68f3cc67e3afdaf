use std::fs;

use shardvault::{
    Directory, DirectoryStore, Error, JsonDirectoryStore, PendingSwap, ShardHandler, ShardRange,
    StagedRename, StoreConfig,
};
use tempfile::tempdir;

#[test_log::test]
fn test_deleted_files_are_restored() -> shardvault::Result<()> {
    let temp_dir = tempdir()?;
    let config = StoreConfig::new().with_base_dir(temp_dir.path());
    let data = temp_dir.path().join("data");

    let handler = ShardHandler::open(config)?;
    handler.build(5, b"abcdefghij")?;
    handler.add_replication()?;
    handler.add_replication()?;

    fs::remove_file(data.join("3-1.txt"))?;
    fs::remove_file(data.join("1.txt"))?;
    fs::remove_file(data.join("1-1.txt"))?;
    fs::write(data.join("9.txt"), b"stale")?;

    let report = handler.sync_replication()?;
    assert_eq!(report.orphans_removed, vec!["9"]);
    assert_eq!(report.primaries_recovered, vec![1]);
    assert_eq!(report.replicas_repaired, vec!["1-1", "3-1"]);

    assert_eq!(fs::read(data.join("1.txt"))?, b"cd");
    assert_eq!(fs::read(data.join("1-1.txt"))?, b"cd");
    assert_eq!(fs::read(data.join("3-1.txt"))?, b"gh");
    assert!(!data.join("9.txt").exists());
    Ok(())
}

#[test_log::test]
fn test_fatal_loss_is_reported_per_shard() -> shardvault::Result<()> {
    let temp_dir = tempdir()?;
    let config = StoreConfig::new().with_base_dir(temp_dir.path());
    let data = temp_dir.path().join("data");

    let handler = ShardHandler::open(config)?;
    handler.build(3, b"abcdef")?;
    handler.add_replication()?;

    fs::remove_file(data.join("2.txt"))?;
    fs::remove_file(data.join("2-1.txt"))?;
    fs::remove_file(data.join("0-1.txt"))?;

    match handler.sync_replication() {
        Err(Error::IntegrityLoss { shards, report }) => {
            assert_eq!(shards, vec![2]);
            assert_eq!(report.replicas_repaired, vec!["0-1"]);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(fs::read(data.join("0-1.txt"))?, b"ab");

    // Reassembly refuses to paper over the hole
    let err = handler.read_dataset().unwrap_err();
    assert_eq!(err.lost_shards(), &[2]);
    Ok(())
}

#[test_log::test]
fn test_open_finishes_interrupted_rebalance() -> shardvault::Result<()> {
    let temp_dir = tempdir()?;
    let config = StoreConfig::new().with_base_dir(temp_dir.path());
    let data = temp_dir.path().join("data");

    ShardHandler::open(config.clone())?.build(2, b"abcdef")?;

    // A 3-way split that crashed right after its journal was written
    let mut renames = Vec::new();
    for (shard, piece) in ["ab", "cd", "ef"].iter().enumerate() {
        let from = format!("stage-crashed-{}", shard);
        fs::write(data.join(format!("{}.txt", from)), piece)?;
        renames.push(StagedRename {
            from,
            to: shard.to_string(),
        });
    }
    let journal = JsonDirectoryStore::new(temp_dir.path().join("mapping.json"), false);
    journal.save_pending(&PendingSwap {
        directory: Directory::from_ranges(
            &[ShardRange::new(0, 2), ShardRange::new(2, 4), ShardRange::new(4, 6)],
            0,
        ),
        renames,
        retire: vec![],
    })?;

    let handler = ShardHandler::open(config)?;
    assert_eq!(handler.shard_count(), 3);
    assert_eq!(handler.get_shard_info("2")?, ShardRange::new(4, 6));
    assert_eq!(handler.read_dataset()?, b"abcdef");
    assert!(!journal.pending_path().exists());

    let mut files: Vec<_> = fs::read_dir(&data)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    files.sort();
    assert_eq!(files, vec!["0.txt", "1.txt", "2.txt"]);
    Ok(())
}

#[test]
fn test_config_file_drives_layout() -> shardvault::Result<()> {
    let temp_dir = tempdir()?;
    let config = StoreConfig::new()
        .with_base_dir(temp_dir.path())
        .with_data_dir("shards")
        .with_directory_file("layout.json")
        .with_content_extension("bin");
    let config_path = temp_dir.path().join("store.json");
    config.save_to_file(&config_path)?;

    let handler = ShardHandler::open(StoreConfig::from_file(&config_path)?)?;
    handler.build(2, b"wxyz")?;

    assert!(temp_dir.path().join("layout.json").is_file());
    assert_eq!(fs::read(temp_dir.path().join("shards").join("1.bin"))?, b"yz");
    Ok(())
}

#[test]
fn test_corrupt_directory_file_is_reported() -> shardvault::Result<()> {
    let temp_dir = tempdir()?;
    fs::write(temp_dir.path().join("mapping.json"), b"{\"0\": {\"start\": \"x\"}}")?;

    let err = ShardHandler::open(StoreConfig::new().with_base_dir(temp_dir.path())).unwrap_err();
    assert!(err.is_corruption_error());
    Ok(())
}
