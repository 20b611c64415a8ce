//! The operator trait all plan nodes share, and the in-memory tuple iterator
//! used for materialized results.

use std::sync::Arc;

use cairn::{Tuple, TupleDesc};

use crate::errors::{ExecResult, ExecutionError};

/// A single-producer stream of tuples. Operators are not thread-safe; one
/// transaction drives one plan. `rewind` replays the stream from the start.
pub trait OpIterator {
    fn open(&mut self) -> ExecResult<()>;

    fn has_next(&mut self) -> ExecResult<bool>;

    /// The next tuple, or `None` at end of stream.
    fn next(&mut self) -> ExecResult<Option<Tuple>>;

    fn rewind(&mut self) -> ExecResult<()>;

    fn close(&mut self);

    fn tuple_desc(&self) -> &TupleDesc;
}

/// An operator over an already-materialized vector of tuples. Backs the
/// aggregate's result stage and serves as a plain child in tests.
pub struct TupleIterator {
    desc: Arc<TupleDesc>,
    tuples: Vec<Tuple>,
    position: usize,
    opened: bool,
}

impl TupleIterator {
    pub fn new(desc: Arc<TupleDesc>, tuples: Vec<Tuple>) -> Self {
        Self {
            desc,
            tuples,
            position: 0,
            opened: false,
        }
    }
}

impl OpIterator for TupleIterator {
    fn open(&mut self) -> ExecResult<()> {
        self.opened = true;
        self.position = 0;
        Ok(())
    }

    fn has_next(&mut self) -> ExecResult<bool> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        Ok(self.position < self.tuples.len())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        let tuple = self.tuples.get(self.position).cloned();
        if tuple.is_some() {
            self.position += 1;
        }
        Ok(tuple)
    }

    fn rewind(&mut self) -> ExecResult<()> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
        self.position = 0;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn::{Field, FieldType};

    fn ints(values: &[i32]) -> (Arc<TupleDesc>, Vec<Tuple>) {
        let desc = Arc::new(TupleDesc::of(&[FieldType::Int]));
        let tuples = values
            .iter()
            .map(|&v| Tuple::new(desc.clone(), vec![Field::Int(v)]).unwrap())
            .collect();
        (desc, tuples)
    }

    #[test]
    fn yields_all_tuples_then_none() {
        let (desc, tuples) = ints(&[1, 2, 3]);
        let mut it = TupleIterator::new(desc, tuples);
        it.open().unwrap();

        let mut seen = 0;
        while it.next().unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert!(!it.has_next().unwrap());
    }

    #[test]
    fn rewind_replays_from_the_start() {
        let (desc, tuples) = ints(&[7, 8]);
        let mut it = TupleIterator::new(desc, tuples);
        it.open().unwrap();
        it.next().unwrap();
        it.rewind().unwrap();
        assert_eq!(
            it.next().unwrap().unwrap().field(0),
            &Field::Int(7)
        );
    }

    #[test]
    fn driving_a_closed_iterator_fails() {
        let (desc, tuples) = ints(&[1]);
        let mut it = TupleIterator::new(desc, tuples);
        assert!(matches!(it.has_next(), Err(ExecutionError::NotOpen)));
        it.open().unwrap();
        it.close();
        assert!(matches!(it.next(), Err(ExecutionError::NotOpen)));
    }
}
