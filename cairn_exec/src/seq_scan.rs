//! Sequential scan: reads every tuple of a table in page order.

use std::sync::Arc;

use cairn::buffer_pool::BufferPool;
use cairn::heap_file::HeapFileIterator;
use cairn::tuple::TdItem;
use cairn::{TableId, TransactionId, Tuple, TupleDesc};

use crate::errors::{ExecResult, ExecutionError};
use crate::executor::OpIterator;

/// Scans a table under a transaction. The exposed schema prefixes each field
/// name with the table alias ("alias.field") so downstream operators can
/// resolve names after joins; the tuples themselves are yielded as stored.
pub struct SeqScan {
    bp: Arc<BufferPool>,
    table_id: TableId,
    alias: String,
    desc: TupleDesc,
    iter: HeapFileIterator,
    opened: bool,
}

impl SeqScan {
    pub fn new(
        bp: Arc<BufferPool>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> ExecResult<Self> {
        let file = bp.catalog().heap_file(table_id)?;
        let base = file.tuple_desc();
        let desc = TupleDesc::new(
            base.items()
                .iter()
                .map(|item| TdItem {
                    field_type: item.field_type,
                    name: Some(format!(
                        "{}.{}",
                        alias,
                        item.name.as_deref().unwrap_or("null")
                    )),
                })
                .collect(),
        );
        let iter = file.iterator(bp.clone(), tid);
        Ok(Self {
            bp,
            table_id,
            alias: alias.to_string(),
            desc,
            iter,
            opened: false,
        })
    }

    /// The table's name in the catalog, as opposed to its alias in the plan.
    pub fn table_name(&self) -> ExecResult<String> {
        Ok(self.bp.catalog().table_name(self.table_id)?)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> ExecResult<()> {
        self.iter.open()?;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> ExecResult<bool> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        Ok(self.iter.has_next()?)
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        Ok(self.iter.next()?)
    }

    fn rewind(&mut self) -> ExecResult<()> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        self.iter.rewind()?;
        Ok(())
    }

    fn close(&mut self) {
        self.iter.close();
        self.opened = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
