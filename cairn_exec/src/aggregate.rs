//! Grouped aggregation. The operator drains its child at `open` and
//! materializes one result row per group, so memory is proportional to the
//! number of groups rather than the input size.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cairn::{DbError, Field, FieldType, Tuple, TupleDesc};

use crate::errors::{ExecResult, ExecutionError};
use crate::executor::{OpIterator, TupleIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        write!(f, "{name}")
    }
}

/// Accumulates tuples group by group and emits the finished result as a
/// materialized iterator. The group key is the whole value of one field;
/// `None` when there is no grouping.
trait Aggregator {
    fn merge(&mut self, tuple: &Tuple) -> ExecResult<()>;
    fn iterator(&self) -> TupleIterator;
}

fn result_desc(gfield_type: Option<FieldType>) -> Arc<TupleDesc> {
    Arc::new(match gfield_type {
        None => TupleDesc::with_names(&[FieldType::Int], &["aggregateValue"]),
        Some(gtype) => TupleDesc::with_names(
            &[gtype, FieldType::Int],
            &["groupValue", "aggregateValue"],
        ),
    })
}

fn result_rows(
    desc: &Arc<TupleDesc>,
    values: impl Iterator<Item = (Option<Field>, i32)>,
) -> Vec<Tuple> {
    values
        .map(|(group, value)| {
            let fields = match group {
                None => vec![Field::Int(value)],
                Some(key) => vec![key, Field::Int(value)],
            };
            Tuple::new(desc.clone(), fields).expect("aggregate rows match their descriptor")
        })
        .collect()
}

/// MIN/MAX/SUM/COUNT/AVG over an integer field. AVG keeps the running sum and
/// a per-group count and divides (integer division) at emission.
struct IntegerAggregator {
    gfield: Option<usize>,
    gfield_type: Option<FieldType>,
    afield: usize,
    op: AggregateOp,
    values: HashMap<Option<Field>, i32>,
    counts: HashMap<Option<Field>, i32>,
}

impl IntegerAggregator {
    fn new(
        gfield: Option<usize>,
        gfield_type: Option<FieldType>,
        afield: usize,
        op: AggregateOp,
    ) -> Self {
        Self {
            gfield,
            gfield_type,
            afield,
            op,
            values: HashMap::new(),
            counts: HashMap::new(),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge(&mut self, tuple: &Tuple) -> ExecResult<()> {
        let group = self.gfield.map(|g| tuple.field(g).clone());
        let value = match tuple.field(self.afield) {
            Field::Int(v) => *v,
            other => {
                return Err(ExecutionError::Storage(DbError::InvalidArgument(format!(
                    "integer aggregate over a {:?} field",
                    other.field_type()
                ))))
            }
        };

        let initial = match self.op {
            AggregateOp::Min => i32::MAX,
            AggregateOp::Max => i32::MIN,
            AggregateOp::Sum | AggregateOp::Avg | AggregateOp::Count => 0,
        };
        let current = self.values.entry(group.clone()).or_insert(initial);
        let count = self.counts.entry(group).or_insert(0);

        match self.op {
            AggregateOp::Min => *current = (*current).min(value),
            AggregateOp::Max => *current = (*current).max(value),
            AggregateOp::Sum | AggregateOp::Avg => {
                *current += value;
                *count += 1;
            }
            AggregateOp::Count => *current += 1,
        }
        Ok(())
    }

    fn iterator(&self) -> TupleIterator {
        let desc = result_desc(self.gfield_type);
        let rows = result_rows(
            &desc,
            self.values.iter().map(|(group, &value)| {
                let result = if self.op == AggregateOp::Avg {
                    value / self.counts[group]
                } else {
                    value
                };
                (group.clone(), result)
            }),
        );
        TupleIterator::new(desc, rows)
    }
}

/// COUNT over a string field; every other operator is rejected.
struct StringAggregator {
    gfield: Option<usize>,
    gfield_type: Option<FieldType>,
    counts: HashMap<Option<Field>, i32>,
}

impl StringAggregator {
    fn new(
        gfield: Option<usize>,
        gfield_type: Option<FieldType>,
        op: AggregateOp,
    ) -> ExecResult<Self> {
        if op != AggregateOp::Count {
            return Err(ExecutionError::Storage(DbError::InvalidArgument(format!(
                "string fields only support count, not {op}"
            ))));
        }
        Ok(Self {
            gfield,
            gfield_type,
            counts: HashMap::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, tuple: &Tuple) -> ExecResult<()> {
        let group = self.gfield.map(|g| tuple.field(g).clone());
        *self.counts.entry(group).or_insert(0) += 1;
        Ok(())
    }

    fn iterator(&self) -> TupleIterator {
        let desc = result_desc(self.gfield_type);
        let rows = result_rows(
            &desc,
            self.counts
                .iter()
                .map(|(group, &count)| (group.clone(), count)),
        );
        TupleIterator::new(desc, rows)
    }
}

/// The aggregation operator: one aggregate over one column, optionally
/// grouped by one column.
impl std::fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregate")
            .field("afield", &self.afield)
            .field("gfield", &self.gfield)
            .field("op", &self.op)
            .finish()
    }
}

pub struct Aggregate {
    child: Box<dyn OpIterator>,
    afield: usize,
    gfield: Option<usize>,
    op: AggregateOp,
    desc: TupleDesc,
    result: Option<TupleIterator>,
    opened: bool,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        afield: usize,
        gfield: Option<usize>,
        op: AggregateOp,
    ) -> ExecResult<Self> {
        let desc = Self::output_desc(child.as_ref(), afield, gfield)?;
        let agg = Self {
            child,
            afield,
            gfield,
            op,
            desc,
            result: None,
            opened: false,
        };
        // Reject unsupported combinations up front rather than at open.
        agg.build_aggregator()?;
        Ok(agg)
    }

    /// Output schema: `(group?, aggregate)`, keeping the child's field names.
    /// The aggregate column is always integer-typed.
    fn output_desc(
        child: &dyn OpIterator,
        afield: usize,
        gfield: Option<usize>,
    ) -> ExecResult<TupleDesc> {
        let child_desc = child.tuple_desc();
        child_desc
            .field_type(afield)
            .ok_or_else(|| no_such_field(afield))?;
        let aname = child_desc.field_name(afield).unwrap_or("aggregateValue");

        Ok(match gfield {
            None => TupleDesc::with_names(&[FieldType::Int], &[aname]),
            Some(g) => {
                let gtype = child_desc.field_type(g).ok_or_else(|| no_such_field(g))?;
                let gname = child_desc.field_name(g).unwrap_or("groupValue");
                TupleDesc::with_names(&[gtype, FieldType::Int], &[gname, aname])
            }
        })
    }

    fn build_aggregator(&self) -> ExecResult<Box<dyn Aggregator>> {
        let child_desc = self.child.tuple_desc();
        let gfield_type = match self.gfield {
            None => None,
            Some(g) => Some(child_desc.field_type(g).ok_or_else(|| no_such_field(g))?),
        };
        match child_desc
            .field_type(self.afield)
            .ok_or_else(|| no_such_field(self.afield))?
        {
            FieldType::Int => Ok(Box::new(IntegerAggregator::new(
                self.gfield,
                gfield_type,
                self.afield,
                self.op,
            ))),
            FieldType::Str => Ok(Box::new(StringAggregator::new(
                self.gfield,
                gfield_type,
                self.op,
            )?)),
        }
    }

    pub fn group_field(&self) -> Option<usize> {
        self.gfield
    }

    pub fn aggregate_field(&self) -> usize {
        self.afield
    }

    pub fn aggregate_op(&self) -> AggregateOp {
        self.op
    }

    /// Replaces the input child and discards any materialized result; the
    /// next `open` recomputes the aggregate over the new input.
    pub fn set_child(&mut self, child: Box<dyn OpIterator>) -> ExecResult<()> {
        self.desc = Self::output_desc(child.as_ref(), self.afield, self.gfield)?;
        self.child = child;
        self.result = None;
        self.opened = false;
        Ok(())
    }
}

fn no_such_field(index: usize) -> ExecutionError {
    ExecutionError::Storage(DbError::InvalidArgument(format!(
        "no field at index {index}"
    )))
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> ExecResult<()> {
        self.child.open()?;
        let mut aggregator = self.build_aggregator()?;
        while let Some(tuple) = self.child.next()? {
            aggregator.merge(&tuple)?;
        }
        let mut result = aggregator.iterator();
        result.open()?;
        self.result = Some(result);
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> ExecResult<bool> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        self.result
            .as_mut()
            .ok_or(ExecutionError::NotOpen)?
            .has_next()
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        if !self.opened {
            return Err(ExecutionError::NotOpen);
        }
        self.result.as_mut().ok_or(ExecutionError::NotOpen)?.next()
    }

    fn rewind(&mut self) -> ExecResult<()> {
        self.result
            .as_mut()
            .ok_or(ExecutionError::NotOpen)?
            .rewind()
    }

    fn close(&mut self) {
        self.child.close();
        self.result = None;
        self.opened = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
