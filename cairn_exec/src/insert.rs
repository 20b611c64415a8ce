//! Insert: routes the child's tuples into a table through the buffer pool
//! and reports how many went in.

use std::sync::Arc;

use cairn::buffer_pool::BufferPool;
use cairn::{DbError, Field, FieldType, TableId, TransactionId, Tuple, TupleDesc};

use crate::errors::{ExecResult, ExecutionError};
use crate::executor::OpIterator;

pub struct Insert {
    bp: Arc<BufferPool>,
    tid: TransactionId,
    child: Box<dyn OpIterator>,
    table_id: TableId,
    desc: TupleDesc,
    inserted: bool,
    opened: bool,
}

impl Insert {
    /// Fails up front when the child's schema differs from the table's.
    pub fn new(
        bp: Arc<BufferPool>,
        tid: TransactionId,
        child: Box<dyn OpIterator>,
        table_id: TableId,
    ) -> ExecResult<Self> {
        let table_desc = bp.catalog().tuple_desc(table_id)?;
        if child.tuple_desc() != table_desc.as_ref() {
            return Err(ExecutionError::Storage(DbError::Db(format!(
                "child schema does not match table {table_id}"
            ))));
        }
        Ok(Self {
            bp,
            tid,
            child,
            table_id,
            desc: TupleDesc::with_names(&[FieldType::Int], &["inserted"]),
            inserted: false,
            opened: false,
        })
    }

    fn fetch_next(&mut self) -> ExecResult<Option<Tuple>> {
        if self.inserted {
            return Ok(None);
        }
        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.bp.insert_tuple(self.tid, self.table_id, tuple)?;
            count += 1;
        }
        self.inserted = true;
        let summary = Tuple::new(Arc::new(self.desc.clone()), vec![Field::Int(count)])
            .expect("summary tuple matches its descriptor");
        Ok(Some(summary))
    }
}

impl OpIterator for Insert {
    fn open(&mut self) -> ExecResult<()> {
        self.child.open()?;
        self.inserted = false;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> ExecResult<bool> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        Ok(!self.inserted)
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        self.fetch_next()
    }

    fn rewind(&mut self) -> ExecResult<()> {
        self.child.rewind()?;
        self.inserted = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
