//! Ingestion Workflow Tests
//!
//! Checkpointed resumption across crashes, from memory and from disk.

use crate::*;
use bazaar::CheckpointLedger;
use proptest::prelude::*;
use std::cell::Cell;

/// Fixed-width log: `lines` lines of exactly 10 bytes each
fn fixed_width_file(file: u32, lines: u32) -> String {
    (0..lines).map(|i| format!("f{}-l{:05}\n", file, i)).collect()
}

/// Handler that counts every line under `count:<line>`
fn count_line(batch: &mut WriteBatch, line: &str) -> anyhow::Result<()> {
    batch.incr_by(format!("count:{}", line), 1);
    Ok(())
}

fn count_of(store: &MemoryStore, line: &str) -> u64 {
    store
        .get(&format!("count:{}", line))
        .unwrap()
        .map_or(0, |v| v.parse().unwrap())
}

fn position(checkpoint: &Checkpoint) -> (Option<FileId>, u64) {
    (checkpoint.file.clone(), checkpoint.offset)
}

// =============================================================================
// RESUMPTION
// =============================================================================

#[test]
fn test_resume_from_mid_file_checkpoint() {
    let (store, bazaar) = create_bazaar();
    let source = MemorySource::new()
        .with_file("1", fixed_width_file(1, 100))
        .with_file("2", fixed_width_file(2, 100))
        .with_file("3", fixed_width_file(3, 100));
    CheckpointLedger::new(store.clone())
        .write_progress(&FileId::from("2"), 500)
        .unwrap();

    let pipeline = bazaar.pipeline(source);
    let mut delivered = Vec::new();
    let report = pipeline
        .run(|batch, line| {
            delivered.push(line.to_string());
            count_line(batch, line)
        })
        .unwrap();

    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_processed, 2);
    assert_eq!(delivered.len(), 150);
    assert_eq!(delivered.first().map(String::as_str), Some("f2-l00050"));
    assert_eq!(delivered.last().map(String::as_str), Some("f3-l00099"));
    assert_eq!(count_of(&store, "f1-l00099"), 0);
    assert_eq!(count_of(&store, "f2-l00049"), 0);
    assert_eq!(bazaar.checkpoint().unwrap(), Checkpoint::new(FileId::from("3"), 1000));

    // Nothing left to do
    let mut again = 0;
    let report = pipeline
        .run(|batch, line| {
            again += 1;
            count_line(batch, line)
        })
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(report.lines_processed, 0);
    assert_eq!(count_of(&store, "f3-l00000"), 1);
}

#[test]
fn test_crash_and_resume_from_directory() {
    let (store, _) = create_bazaar();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("1"), fixed_width_file(1, 7)).unwrap();
    std::fs::write(dir.path().join("2"), fixed_width_file(2, 7)).unwrap();
    std::fs::write(dir.path().join("10"), fixed_width_file(9, 7)).unwrap();

    let bazaar = Bazaar::builder()
        .store(store.clone())
        .log_dir(dir.path())
        .flush_every(3)
        .open()
        .unwrap();
    let pipeline = bazaar.log_pipeline().unwrap();

    let crashed = Cell::new(false);
    let err: bazaar::Error = pipeline
        .run(|batch, line| {
            if line == "f2-l00004" && !crashed.replace(true) {
                anyhow::bail!("disk full");
            }
            count_line(batch, line)
        })
        .unwrap_err()
        .into();

    // Lines 0..3 of file 2 were flushed; line 3 was only staged
    let durable = Checkpoint::new(FileId::from("2"), 30);
    assert_eq!(err.checkpoint(), Some(&durable));
    assert_eq!(bazaar.checkpoint().unwrap(), durable);
    assert_eq!(count_of(&store, "f2-l00002"), 1);
    assert_eq!(count_of(&store, "f2-l00003"), 0);

    let mut delivered = Vec::new();
    pipeline
        .run(|batch, line| {
            delivered.push(line.to_string());
            count_line(batch, line)
        })
        .unwrap();

    assert_eq!(delivered.first().map(String::as_str), Some("f2-l00003"));
    // "10" sorts after "2"
    assert_eq!(delivered.last().map(String::as_str), Some("f9-l00006"));
    for file in [1, 2, 9] {
        for i in 0..7 {
            assert_eq!(count_of(&store, &format!("f{}-l{:05}", file, i)), 1);
        }
    }
    assert_eq!(bazaar.checkpoint().unwrap(), Checkpoint::new(FileId::from("10"), 70));
}

#[test]
fn test_appended_lines_picked_up_next_run() {
    let (store, bazaar) = create_bazaar();
    let mut source = MemorySource::new().with_file("1", "a\nb\n");
    bazaar.pipeline(source.clone()).run(count_line).unwrap();

    source.insert("1", "a\nb\nc\r\n");
    let report = bazaar.pipeline(source).run(count_line).unwrap();
    assert_eq!(report.lines_processed, 1);
    assert_eq!(count_of(&store, "c"), 1);
    assert_eq!(count_of(&store, "a"), 1);
    assert_eq!(bazaar.checkpoint().unwrap().offset, 7);
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A crash at any line followed by a clean run applies every line's
    /// writes exactly once, in order, with a non-decreasing checkpoint.
    #[test]
    fn prop_crash_anywhere_applies_each_line_once(
        sizes in prop::collection::vec(0u32..12, 1..4),
        flush_every in 1usize..5,
        crash_at in 0usize..40,
    ) {
        let store = Arc::new(MemoryStore::new());
        let bazaar = Bazaar::builder()
            .store(store.clone())
            .flush_every(flush_every)
            .open()
            .unwrap();

        // Ids 1, 6, 11, 16 order differently as text
        let mut source = MemorySource::new();
        let mut all_lines = Vec::new();
        for (n, size) in sizes.iter().enumerate() {
            let id = (n * 5 + 1) as u32;
            let lines: Vec<String> = (0..*size).map(|i| format!("f{}:{}", id, i)).collect();
            source.insert(id.to_string(), lines.iter().map(|l| format!("{}\n", l)).collect::<String>());
            all_lines.extend(lines);
        }
        let pipeline = bazaar.pipeline(source);

        let mut seen = 0usize;
        let first = pipeline.run(|batch, line| {
            if seen == crash_at {
                anyhow::bail!("crash");
            }
            seen += 1;
            count_line(batch, line)
        });
        let after_crash = bazaar.checkpoint().unwrap();
        if let Err(e) = &first {
            prop_assert_eq!(e.checkpoint(), Some(&after_crash));
        }

        // Applied lines form a prefix
        let applied = all_lines.iter().take_while(|l| count_of(&store, l) == 1).count();
        for line in &all_lines[applied..] {
            prop_assert_eq!(count_of(&store, line), 0);
        }

        let mut delivered = Vec::new();
        pipeline
            .run(|batch, line| {
                delivered.push(line.to_string());
                count_line(batch, line)
            })
            .unwrap();
        let after_resume = bazaar.checkpoint().unwrap();

        prop_assert_eq!(&delivered[..], &all_lines[applied..]);
        for line in &all_lines {
            prop_assert_eq!(count_of(&store, line), 1);
        }
        prop_assert!(position(&after_crash) <= position(&after_resume));
    }
}
