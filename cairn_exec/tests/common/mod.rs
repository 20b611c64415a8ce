#![allow(dead_code)]

use std::sync::Arc;

use cairn::db::Database;
use cairn::heap_file::HeapFile;
use cairn::{Field, FieldType, Tuple, TupleDesc};
use tempfile::{tempdir, TempDir};

pub struct TestDb {
    pub dir: TempDir,
    pub db: Database,
}

pub fn setup(name: &str) -> TestDb {
    setup_with_capacity(name, cairn::buffer_pool::DEFAULT_PAGES)
}

pub fn setup_with_capacity(name: &str, capacity: usize) -> TestDb {
    let dir = tempdir().unwrap();
    let db = Database::with_pool_capacity(capacity, dir.path().join(format!("{name}.wal"))).unwrap();
    TestDb { dir, db }
}

impl TestDb {
    /// Creates and registers a table whose columns are all integers.
    pub fn create_int_table(&self, name: &str, columns: &[&str]) -> Arc<HeapFile> {
        let types: Vec<FieldType> = columns.iter().map(|_| FieldType::Int).collect();
        let desc = TupleDesc::with_names(&types, columns);
        self.db
            .create_table(self.dir.path().join(format!("{name}.dat")), name, desc)
            .unwrap()
    }

    /// Creates a table with the given schema.
    pub fn create_table(&self, name: &str, desc: TupleDesc) -> Arc<HeapFile> {
        self.db
            .create_table(self.dir.path().join(format!("{name}.dat")), name, desc)
            .unwrap()
    }
}

pub fn int_tuple(file: &HeapFile, values: &[i32]) -> Tuple {
    Tuple::new(
        file.tuple_desc().clone(),
        values.iter().map(|&v| Field::Int(v)).collect(),
    )
    .unwrap()
}

pub fn int_of(field: &Field) -> i32 {
    match field {
        Field::Int(v) => *v,
        other => panic!("expected an integer field, got {other:?}"),
    }
}
