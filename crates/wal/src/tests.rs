use super::*;
use common::{PageId, RecordId, TableId};
use tempfile::tempdir;
use types::Value::*;

#[test]
fn append_and_replay_records() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();
    let rec1 = WalRecord::Insert {
        table: TableId(1),
        row: vec![Int64(1), Text("Will".into())],
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
    };
    wal.append(&rec1).unwrap();
    wal.sync().unwrap();

    let rec2 = WalRecord::Delete {
        table: TableId(1),
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
        before: vec![Int64(1), Text("Will".into())],
    };
    wal.append(&rec2).unwrap();
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 2);

    match &replayed[0] {
        WalRecord::Insert { row, .. } => assert_eq!(row[0], Int64(1)),
        _ => panic!("wrong record type"),
    }
}

#[test]
fn all_record_types_roundtrip() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    let records = vec![
        WalRecord::BeginTxn { tid: 7 },
        WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(42), Text("test".into()), Bool(true)],
            rid: RecordId {
                page_id: PageId(0),
                slot: 1,
            },
        },
        WalRecord::Update {
            table: TableId(2),
            rid: RecordId {
                page_id: PageId(1),
                slot: 5,
            },
            before: vec![Int64(1), Null],
            after: vec![Int64(100), Null],
        },
        WalRecord::Delete {
            table: TableId(3),
            rid: RecordId {
                page_id: PageId(2),
                slot: 10,
            },
            before: vec![Int64(5)],
        },
        WalRecord::CreateTable {
            name: "users".to_string(),
            table: TableId(4),
        },
        WalRecord::DropTable { table: TableId(5) },
        WalRecord::Commit {
            tid: 7,
            outcome: TxnOutcome::Committed,
        },
        WalRecord::Checkpoint {
            oldest_dirty_lsn: 3,
        },
    ];

    for rec in &records {
        wal.append(rec).unwrap();
    }
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed, records);
}

#[test]
fn lsns_are_monotonic_across_appends() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");
    let mut wal = Wal::open(&file).unwrap();

    let mut last = None;
    for i in 0..20 {
        let lsn = wal
            .append(&WalRecord::Insert {
                table: TableId(1),
                row: vec![Int64(i)],
                rid: RecordId {
                    page_id: PageId(0),
                    slot: i as u16,
                },
            })
            .unwrap();
        if let Some(prev) = last {
            assert!(lsn > prev, "LSN must strictly increase");
        }
        last = Some(lsn);
    }
}

#[test]
fn lsn_counter_resumes_after_reopen() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let last_lsn = {
        let mut wal = Wal::open(&file).unwrap();
        let mut lsn = 0;
        for i in 0..5 {
            lsn = wal
                .append(&WalRecord::Insert {
                    table: TableId(1),
                    row: vec![Int64(i)],
                    rid: RecordId {
                        page_id: PageId(0),
                        slot: i as u16,
                    },
                })
                .unwrap();
        }
        wal.sync().unwrap();
        lsn
    };

    let mut wal = Wal::open(&file).unwrap();
    let next_lsn = wal
        .append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(99)],
            rid: RecordId {
                page_id: PageId(0),
                slot: 0,
            },
        })
        .unwrap();
    assert_eq!(next_lsn, last_lsn + 1);
}

#[test]
fn begin_commit_cycle_is_replayable() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");
    let mut wal = Wal::open(&file).unwrap();

    let tid = wal.begin_txn().unwrap();
    wal.append(&WalRecord::Insert {
        table: TableId(1),
        row: vec![Int64(1)],
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
    })
    .unwrap();
    wal.commit(tid).unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 3);
    assert!(matches!(replayed[0], WalRecord::BeginTxn { tid: 0 }));
    assert!(matches!(
        replayed[2],
        WalRecord::Commit {
            tid: 0,
            outcome: TxnOutcome::Committed
        }
    ));
}

#[test]
fn abort_writes_undo_records_and_aborted_marker() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");
    let mut wal = Wal::open(&file).unwrap();

    let tid = wal.begin_txn().unwrap();
    let rid = RecordId {
        page_id: PageId(0),
        slot: 0,
    };
    let insert = WalRecord::Insert {
        table: TableId(1),
        row: vec![Int64(1)],
        rid,
    };
    wal.append(&insert).unwrap();
    let update = WalRecord::Update {
        table: TableId(1),
        rid,
        before: vec![Int64(1)],
        after: vec![Int64(2)],
    };
    wal.append(&update).unwrap();

    wal.abort(tid, &[insert, update]).unwrap();

    let replayed = Wal::replay(&file).unwrap();
    // begin, insert, update, undo(update->before), undo(insert->delete), commit(aborted)
    assert_eq!(replayed.len(), 6);
    match &replayed[3] {
        WalRecord::Update { after, .. } => assert_eq!(after[0], Int64(1)),
        other => panic!("expected undo update, got {other:?}"),
    }
    match &replayed[4] {
        WalRecord::Delete { rid: undone_rid, .. } => assert_eq!(*undone_rid, rid),
        other => panic!("expected undo delete, got {other:?}"),
    }
    match &replayed[5] {
        WalRecord::Commit { outcome, .. } => assert_eq!(*outcome, TxnOutcome::Aborted),
        other => panic!("expected abort marker, got {other:?}"),
    }
}

#[test]
fn checkpoint_record_roundtrips() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");
    let mut wal = Wal::open(&file).unwrap();

    wal.append(&WalRecord::Insert {
        table: TableId(1),
        row: vec![Int64(1)],
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
    })
    .unwrap();
    wal.checkpoint(1).unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 2);
    assert!(matches!(
        replayed[1],
        WalRecord::Checkpoint {
            oldest_dirty_lsn: 1
        }
    ));
}

#[test]
fn truncate_before_drops_only_older_records() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");
    let mut wal = Wal::open(&file).unwrap();

    let mut lsns = Vec::new();
    for i in 0..5 {
        let lsn = wal
            .append(&WalRecord::Insert {
                table: TableId(1),
                row: vec![Int64(i)],
                rid: RecordId {
                    page_id: PageId(0),
                    slot: i as u16,
                },
            })
            .unwrap();
        lsns.push(lsn);
    }
    wal.sync().unwrap();

    wal.truncate_before(lsns[2]).unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 3);
    match &replayed[0] {
        WalRecord::Insert { row, .. } => assert_eq!(row[0], Int64(2)),
        _ => panic!("wrong record type"),
    }
}

#[test]
fn torn_tail_is_truncated_on_replay() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    {
        let mut wal = Wal::open(&file).unwrap();
        wal.append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(1)],
            rid: RecordId {
                page_id: PageId(0),
                slot: 0,
            },
        })
        .unwrap();
        wal.sync().unwrap();
    }

    // Simulate a crash mid-write by corrupting the last few bytes.
    {
        use std::io::{Seek, SeekFrom};
        let mut f = OpenOptions::new().write(true).open(&file).unwrap();
        let len = f.metadata().unwrap().len();
        f.seek(SeekFrom::Start(len - 2)).unwrap();
        f.write_all(&[0xDE, 0xAD]).unwrap();
    }

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 0, "corrupted record must not surface");
}

#[test]
fn truncate_clears_wal() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    for i in 0..10 {
        let rec = WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(i)],
            rid: RecordId {
                page_id: PageId(0),
                slot: i as u16,
            },
        };
        wal.append(&rec).unwrap();
    }
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 10);

    wal.truncate().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 0);

    let rec = WalRecord::Insert {
        table: TableId(1),
        row: vec![Int64(999)],
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
    };
    wal.append(&rec).unwrap();
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 1);
}

#[test]
fn replay_empty_wal() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("empty.wal");

    let _wal = Wal::open(&file).unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 0);
}

#[test]
fn replay_nonexistent_file_returns_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("nonexistent.wal");

    let result = Wal::replay(&file);
    assert!(matches!(result, Err(DbError::Wal(_))));
}

#[test]
fn large_batch_operations() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    let count = 1000;
    for i in 0..count {
        let rec = WalRecord::Insert {
            table: TableId(i / 100),
            row: vec![Int64(i as i64), Text(format!("row_{}", i))],
            rid: RecordId {
                page_id: PageId(i / 10),
                slot: (i % 10) as u16,
            },
        };
        wal.append(&rec).unwrap();
    }
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), count as usize);

    match &replayed[0] {
        WalRecord::Insert { row, .. } => {
            assert_eq!(row[0], Int64(0));
            assert_eq!(row[1], Text("row_0".to_string()));
        }
        _ => panic!("wrong record type"),
    }

    match &replayed[count as usize - 1] {
        WalRecord::Insert { row, .. } => {
            assert_eq!(row[0], Int64((count - 1) as i64));
            assert_eq!(row[1], Text(format!("row_{}", count - 1)));
        }
        _ => panic!("wrong record type"),
    }
}

#[test]
fn multiple_append_sync_cycles() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    for i in 0..5 {
        wal.append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(i)],
            rid: RecordId {
                page_id: PageId(0),
                slot: i as u16,
            },
        })
        .unwrap();
    }
    wal.sync().unwrap();

    for i in 5..10 {
        wal.append(&WalRecord::Update {
            table: TableId(1),
            rid: RecordId {
                page_id: PageId(0),
                slot: (i - 5) as u16,
            },
            before: vec![Int64(i - 5)],
            after: vec![Int64(i)],
        })
        .unwrap();
    }
    wal.sync().unwrap();

    for i in 0..5 {
        wal.append(&WalRecord::Delete {
            table: TableId(1),
            rid: RecordId {
                page_id: PageId(0),
                slot: i as u16,
            },
            before: vec![Int64(i)],
        })
        .unwrap();
    }
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 15);
}

#[test]
fn persist_across_wal_instances() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    {
        let mut wal = Wal::open(&file).unwrap();
        wal.append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(1)],
            rid: RecordId {
                page_id: PageId(0),
                slot: 0,
            },
        })
        .unwrap();
        wal.sync().unwrap();
    }

    {
        let mut wal = Wal::open(&file).unwrap();
        wal.append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(2)],
            rid: RecordId {
                page_id: PageId(0),
                slot: 1,
            },
        })
        .unwrap();
        wal.sync().unwrap();
    }

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 2);
}

#[test]
fn append_without_sync_then_replay() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    {
        let mut wal = Wal::open(&file).unwrap();
        wal.append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(1)],
            rid: RecordId {
                page_id: PageId(0),
                slot: 0,
            },
        })
        .unwrap();
        // No sync - but append() calls flush()
    }

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 1);
}

#[test]
fn create_table_and_drop_table_records() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    wal.append(&WalRecord::CreateTable {
        name: "users".to_string(),
        table: TableId(1),
    })
    .unwrap();

    wal.append(&WalRecord::CreateTable {
        name: "posts".to_string(),
        table: TableId(2),
    })
    .unwrap();

    wal.append(&WalRecord::DropTable { table: TableId(1) })
        .unwrap();

    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 3);

    match &replayed[0] {
        WalRecord::CreateTable { name, table } => {
            assert_eq!(name, "users");
            assert_eq!(*table, TableId(1));
        }
        _ => panic!("wrong record type"),
    }

    match &replayed[2] {
        WalRecord::DropTable { table } => {
            assert_eq!(*table, TableId(1));
        }
        _ => panic!("wrong record type"),
    }
}

#[test]
fn null_values_in_records() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    wal.append(&WalRecord::Insert {
        table: TableId(1),
        row: vec![Int64(1), Null, Text("test".into()), Null],
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
    })
    .unwrap();
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    match &replayed[0] {
        WalRecord::Insert { row, .. } => {
            assert_eq!(row[0], Int64(1));
            assert_eq!(row[1], Null);
            assert_eq!(row[2], Text("test".into()));
            assert_eq!(row[3], Null);
        }
        _ => panic!("wrong record type"),
    }
}

#[test]
fn empty_row_in_insert() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    wal.append(&WalRecord::Insert {
        table: TableId(1),
        row: vec![],
        rid: RecordId {
            page_id: PageId(0),
            slot: 0,
        },
    })
    .unwrap();
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    match &replayed[0] {
        WalRecord::Insert { row, .. } => {
            assert!(row.is_empty());
        }
        _ => panic!("wrong record type"),
    }
}

#[test]
fn truncate_then_append_sequence() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("toydb.wal");

    let mut wal = Wal::open(&file).unwrap();

    for i in 0..5 {
        wal.append(&WalRecord::Insert {
            table: TableId(1),
            row: vec![Int64(i)],
            rid: RecordId {
                page_id: PageId(0),
                slot: i as u16,
            },
        })
        .unwrap();
    }
    wal.sync().unwrap();

    wal.truncate().unwrap();

    for i in 10..15 {
        wal.append(&WalRecord::Insert {
            table: TableId(2),
            row: vec![Int64(i)],
            rid: RecordId {
                page_id: PageId(1),
                slot: (i - 10) as u16,
            },
        })
        .unwrap();
    }
    wal.sync().unwrap();

    let replayed = Wal::replay(&file).unwrap();
    assert_eq!(replayed.len(), 5);
    match &replayed[0] {
        WalRecord::Insert { table, row, .. } => {
            assert_eq!(*table, TableId(2));
            assert_eq!(row[0], Int64(10));
        }
        _ => panic!("wrong record type"),
    }
}
