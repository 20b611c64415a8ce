//! Relational select: forwards the child's tuples that satisfy a predicate.

use cairn::tuple::CmpOp;
use cairn::{Field, Tuple, TupleDesc};

use crate::errors::{ExecResult, ExecutionError};
use crate::executor::OpIterator;

/// Compares one field of a tuple against a constant.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: CmpOp,
    operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: CmpOp, operand: Field) -> Self {
        Self { field, op, operand }
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }

    pub fn operand(&self) -> &Field {
        &self.operand
    }

    pub fn filter(&self, tuple: &Tuple) -> bool {
        tuple.field(self.field).compare(self.op, &self.operand)
    }
}

pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,
    peeked: Option<Tuple>,
    opened: bool,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Self {
            predicate,
            child,
            peeked: None,
            opened: false,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    fn fetch_next(&mut self) -> ExecResult<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            if self.predicate.filter(&tuple) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> ExecResult<()> {
        self.child.open()?;
        self.opened = true;
        self.peeked = None;
        Ok(())
    }

    fn has_next(&mut self) -> ExecResult<bool> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        if self.peeked.is_none() {
            self.peeked = self.fetch_next()?;
        }
        Ok(self.peeked.is_some())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        if self.peeked.is_none() {
            self.peeked = self.fetch_next()?;
        }
        Ok(self.peeked.take())
    }

    fn rewind(&mut self) -> ExecResult<()> {
        self.child.rewind()?;
        self.peeked = None;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.peeked = None;
        self.opened = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.child.tuple_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TupleIterator;
    use cairn::FieldType;
    use std::sync::Arc;

    fn int_pairs(pairs: &[(i32, i32)]) -> TupleIterator {
        let desc = Arc::new(TupleDesc::with_names(
            &[FieldType::Int, FieldType::Int],
            &["a", "b"],
        ));
        let tuples = pairs
            .iter()
            .map(|&(a, b)| Tuple::new(desc.clone(), vec![Field::Int(a), Field::Int(b)]).unwrap())
            .collect();
        TupleIterator::new(desc, tuples)
    }

    #[test]
    fn forwards_only_matching_tuples() {
        let child = int_pairs(&[(1, 10), (2, 20), (3, 30), (4, 40)]);
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::GreaterThan, Field::Int(2)),
            Box::new(child),
        );
        filter.open().unwrap();

        let mut seen = Vec::new();
        while let Some(tuple) = filter.next().unwrap() {
            match tuple.field(0) {
                Field::Int(v) => seen.push(*v),
                _ => unreachable!(),
            }
        }
        assert_eq!(seen, vec![3, 4]);
    }

    #[test]
    fn has_next_does_not_consume() {
        let child = int_pairs(&[(5, 50)]);
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::Equals, Field::Int(5)),
            Box::new(child),
        );
        filter.open().unwrap();

        assert!(filter.has_next().unwrap());
        assert!(filter.has_next().unwrap());
        assert!(filter.next().unwrap().is_some());
        assert!(!filter.has_next().unwrap());
    }

    #[test]
    fn rewind_replays_the_filtered_stream() {
        let child = int_pairs(&[(1, 1), (2, 2)]);
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::LessThanOrEq, Field::Int(1)),
            Box::new(child),
        );
        filter.open().unwrap();
        assert!(filter.next().unwrap().is_some());
        assert!(filter.next().unwrap().is_none());

        filter.rewind().unwrap();
        assert!(filter.next().unwrap().is_some());
    }

    #[test]
    fn unopened_filter_fails() {
        let child = int_pairs(&[]);
        let mut filter = Filter::new(
            Predicate::new(0, CmpOp::Equals, Field::Int(0)),
            Box::new(child),
        );
        assert!(matches!(filter.next(), Err(ExecutionError::NotOpen)));
    }
}
