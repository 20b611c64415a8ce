use std::collections::HashSet;
use std::sync::Arc;

use cairn::heap_file::HeapFile;
use cairn::page::slots_per_page;
use cairn::tuple::CmpOp;
use cairn::{Field, Transaction, TupleDesc};
use cairn_exec::{Filter, Insert, OpIterator, Predicate, SeqScan, TupleIterator};
use serial_test::serial;

mod common;
use common::{int_of, int_tuple, setup};

#[test]
#[serial]
fn insert_operator_feeds_scan_and_commit_persists_one_page() {
    let t = setup("scan_basic");
    let file = t.create_int_table("pairs", &["a", "b"]);
    let bp = t.db.buffer_pool().clone();

    let writer = Transaction::new();
    let rows: Vec<_> = [(1, 10), (2, 20), (3, 30)]
        .iter()
        .map(|&(a, b)| int_tuple(&file, &[a, b]))
        .collect();
    let child = TupleIterator::new(file.tuple_desc().clone(), rows);
    let mut insert = Insert::new(bp.clone(), writer.id(), Box::new(child), file.table_id()).unwrap();
    insert.open().unwrap();

    let summary = insert.next().unwrap().unwrap();
    assert_eq!(int_of(summary.field(0)), 3);
    // The count tuple is emitted exactly once.
    assert!(insert.next().unwrap().is_none());
    insert.close();

    let mut scan = SeqScan::new(bp.clone(), writer.id(), file.table_id(), "p").unwrap();
    assert_eq!(scan.tuple_desc().field_name(0), Some("p.a"));
    assert_eq!(scan.tuple_desc().field_name(1), Some("p.b"));
    assert_eq!(scan.table_name().unwrap(), "pairs");

    scan.open().unwrap();
    let mut seen = HashSet::new();
    while let Some(tuple) = scan.next().unwrap() {
        seen.insert((int_of(tuple.field(0)), int_of(tuple.field(1))));
    }
    assert_eq!(seen, HashSet::from([(1, 10), (2, 20), (3, 30)]));
    scan.close();

    writer.commit(&bp).unwrap();
    assert_eq!(file.num_pages().unwrap(), 1);
}

#[test]
#[serial]
fn bulk_insert_grows_the_file_and_survives_reopen() {
    let t = setup("scan_bulk");
    let file = t.create_int_table("numbers", &["n"]);
    let bp = t.db.buffer_pool().clone();

    let writer = Transaction::new();
    for n in 0..1000 {
        bp.insert_tuple(writer.id(), file.table_id(), int_tuple(&file, &[n]))
            .unwrap();
    }
    writer.commit(&bp).unwrap();

    let per_page = slots_per_page(file.tuple_desc());
    assert_eq!(file.num_pages().unwrap(), 1000_usize.div_ceil(per_page));

    // A fresh engine over the same file sees every tuple.
    let reopened = setup("scan_bulk_reopen");
    let desc: TupleDesc = file.tuple_desc().as_ref().clone();
    let id = reopened.db.catalog().next_table_id();
    let refile = Arc::new(HeapFile::open(file.path(), id, Arc::new(desc)).unwrap());
    reopened.db.catalog().add_table(refile.clone(), "numbers");

    let reader = Transaction::new();
    let mut scan = SeqScan::new(
        reopened.db.buffer_pool().clone(),
        reader.id(),
        refile.table_id(),
        "n",
    )
    .unwrap();
    scan.open().unwrap();
    let mut count = 0;
    while scan.next().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 1000);
    reader.commit(reopened.db.buffer_pool()).unwrap();
}

#[test]
#[serial]
fn filter_selects_matching_tuples_from_a_scan() {
    let t = setup("scan_filter");
    let file = t.create_int_table("pairs", &["a", "b"]);
    let bp = t.db.buffer_pool().clone();

    let writer = Transaction::new();
    for (a, b) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        bp.insert_tuple(writer.id(), file.table_id(), int_tuple(&file, &[a, b]))
            .unwrap();
    }
    writer.commit(&bp).unwrap();

    let reader = Transaction::new();
    let scan = SeqScan::new(bp.clone(), reader.id(), file.table_id(), "p").unwrap();
    let mut filter = Filter::new(
        Predicate::new(0, CmpOp::GreaterThanOrEq, Field::Int(3)),
        Box::new(scan),
    );
    filter.open().unwrap();

    let mut seen = Vec::new();
    while let Some(tuple) = filter.next().unwrap() {
        seen.push(int_of(tuple.field(0)));
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![3, 4]);

    filter.rewind().unwrap();
    assert!(filter.has_next().unwrap());
    filter.close();
    reader.commit(&bp).unwrap();
}
