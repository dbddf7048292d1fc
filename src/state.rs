use crate::types::SequenceNumber;

/// The state of an aggregate instance, rebuilt from its history.
///
/// Alongside the aggregate itself it carries the instance id and the sequence number of the last
/// event applied, i.e. the length of the history it was rebuilt from.
#[derive(Debug, Clone)]
pub struct AggregateState<S> {
    id: String,
    sequence_number: SequenceNumber,
    inner: S,
}

impl<S: Default> AggregateState<S> {
    /// Creates the state of an instance with no history: a default inner value and sequence
    /// number 0.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence_number: 0,
            inner: Default::default(),
        }
    }
}

impl<S> AggregateState<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Returns the sequence number the next persisted event is going to get.
    pub fn next_sequence_number(&self) -> SequenceNumber {
        self.sequence_number + 1
    }

    pub(crate) fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub(crate) fn set_sequence_number(&mut self, sequence_number: SequenceNumber) -> &mut Self {
        self.sequence_number = sequence_number;
        self
    }
}
