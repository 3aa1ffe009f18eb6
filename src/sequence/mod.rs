pub mod source;

pub use source::{
    ParseErrorPolicy, RegexSequenceSource, SequenceError, SequenceResolver, SequenceSource,
    DEFAULT_SEQUENCE_PATTERN,
};
