//! Grouping of decoded instructions into fixed-size spans.

use crate::error::FixtureError;
use crate::fixture::InstructionRecord;

/// A contiguous run of instructions from one fixture, measured as one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Extension the instructions belong to, e.g. `avx512f`.
    pub extension: String,
    /// 0-based position of this span within its extension.
    pub ordinal: usize,
    /// Instructions in fixture order. Never empty.
    pub records: Vec<InstructionRecord>,
}

impl Span {
    /// Number of instructions in the span.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false for spans produced by [`SpanBuilder`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Iterator adapter that chunks a record stream into [`Span`]s.
///
/// Scanner errors are passed through unchanged and end the stream; records
/// buffered before the error are dropped with it.
pub struct SpanBuilder<I> {
    records: I,
    extension: String,
    span_size: usize,
    ordinal: usize,
    done: bool,
}

impl<I> SpanBuilder<I>
where
    I: Iterator<Item = Result<InstructionRecord, FixtureError>>,
{
    /// Wraps `records`, producing spans of at most `span_size` instructions.
    /// A `span_size` of zero is treated as one.
    pub fn new(records: I, extension: impl Into<String>, span_size: usize) -> Self {
        Self {
            records,
            extension: extension.into(),
            span_size: span_size.max(1),
            ordinal: 0,
            done: false,
        }
    }
}

impl<I> Iterator for SpanBuilder<I>
where
    I: Iterator<Item = Result<InstructionRecord, FixtureError>>,
{
    type Item = Result<Span, FixtureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut records = Vec::with_capacity(self.span_size);
        while records.len() < self.span_size {
            match self.records.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if records.is_empty() {
            return None;
        }
        let span = Span {
            extension: self.extension.clone(),
            ordinal: self.ordinal,
            records,
        };
        self.ordinal += 1;
        Some(Ok(span))
    }
}
