use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_SEQUENCE_PATTERN: &str = r"^(?P<seq>\d+)$";

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("regex compilation failed: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("pattern missing 'seq' capture group")]
    MissingSeqGroup,

    #[error("transaction id '{tx_id}' does not match the sequence pattern")]
    NoMatch { tx_id: String },

    #[error("failed to parse sequence '{value}' from transaction id '{tx_id}': {source}")]
    ParseError {
        tx_id: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Maps an external transaction identifier to its sequence number.
pub trait SequenceSource: Send + Sync {
    fn sequence_of(&self, tx_id: &str) -> Result<u64, SequenceError>;
}

/// Extracts the sequence from a transaction id with a regex.
///
/// The pattern must contain a named capture group `seq` holding a decimal
/// integer, e.g. `^tx-(?P<seq>\d+)$`.
#[derive(Debug, Clone)]
pub struct RegexSequenceSource {
    pattern: Regex,
}

impl RegexSequenceSource {
    pub fn new(pattern: &str) -> Result<Self, SequenceError> {
        let regex = Regex::new(pattern)?;

        if regex.capture_names().all(|name| name != Some("seq")) {
            return Err(SequenceError::MissingSeqGroup);
        }

        Ok(Self { pattern: regex })
    }
}

impl Default for RegexSequenceSource {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_SEQUENCE_PATTERN).expect("default pattern is valid"),
        }
    }
}

impl SequenceSource for RegexSequenceSource {
    fn sequence_of(&self, tx_id: &str) -> Result<u64, SequenceError> {
        let Some(captures) = self.pattern.captures(tx_id) else {
            return Err(SequenceError::NoMatch {
                tx_id: tx_id.to_string(),
            });
        };

        // The group may sit in an alternation branch that did not match
        let Some(value) = captures.name("seq").map(|m| m.as_str()) else {
            return Err(SequenceError::NoMatch {
                tx_id: tx_id.to_string(),
            });
        };

        value.parse().map_err(|source| SequenceError::ParseError {
            tx_id: tx_id.to_string(),
            value: value.to_string(),
            source,
        })
    }
}

/// What to do with an item whose transaction id yields no sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Fail the push with the parse error.
    #[default]
    Reject,
    /// Discard the item and keep going.
    Drop,
    /// Treat the item as sequence 0.
    Zero,
}

/// A sequence source paired with the policy applied to its failures.
pub struct SequenceResolver {
    source: Box<dyn SequenceSource>,
    on_error: ParseErrorPolicy,
}

impl SequenceResolver {
    pub fn new(source: Box<dyn SequenceSource>, on_error: ParseErrorPolicy) -> Self {
        Self { source, on_error }
    }

    /// Resolve a transaction id.
    ///
    /// Returns `Ok(None)` when the id is malformed and the policy is `Drop`.
    pub fn resolve(&self, tx_id: &str) -> Result<Option<u64>, SequenceError> {
        match self.source.sequence_of(tx_id) {
            Ok(sequence) => Ok(Some(sequence)),
            Err(e) => match self.on_error {
                ParseErrorPolicy::Reject => Err(e),
                ParseErrorPolicy::Drop => {
                    warn!(tx_id = %tx_id, error = %e, "Dropping item with malformed transaction id");
                    Ok(None)
                }
                ParseErrorPolicy::Zero => {
                    warn!(tx_id = %tx_id, error = %e, "Treating malformed transaction id as sequence 0");
                    Ok(Some(0))
                }
            },
        }
    }

    pub fn policy(&self) -> ParseErrorPolicy {
        self.on_error
    }
}

impl Default for SequenceResolver {
    fn default() -> Self {
        Self::new(
            Box::new(RegexSequenceSource::default()),
            ParseErrorPolicy::default(),
        )
    }
}

impl std::fmt::Debug for SequenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceResolver")
            .field("on_error", &self.on_error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_parses_plain_integers() {
        let source = RegexSequenceSource::default();
        assert_eq!(source.sequence_of("0").unwrap(), 0);
        assert_eq!(source.sequence_of("4217").unwrap(), 4217);
        assert!(matches!(
            source.sequence_of("abc"),
            Err(SequenceError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_custom_pattern() {
        let source = RegexSequenceSource::new(r"^[0-9a-f]{8}-(?P<seq>\d+)$").unwrap();
        assert_eq!(source.sequence_of("deadbeef-12").unwrap(), 12);
        assert!(source.sequence_of("deadbeef-").is_err());
    }

    #[test]
    fn test_pattern_requires_seq_group() {
        assert!(matches!(
            RegexSequenceSource::new(r"^(\d+)$"),
            Err(SequenceError::MissingSeqGroup)
        ));
        assert!(matches!(
            RegexSequenceSource::new(r"^(?P<seq>\d+"),
            Err(SequenceError::InvalidRegex(_))
        ));
    }

    #[test]
    fn test_unmatched_optional_group_is_no_match() {
        let source = RegexSequenceSource::new(r"^(?:tx-(?P<seq>\d+)|genesis)$").unwrap();
        assert_eq!(source.sequence_of("tx-41").unwrap(), 41);
        assert!(matches!(
            source.sequence_of("genesis"),
            Err(SequenceError::NoMatch { .. })
        ));

        let drop = SequenceResolver::new(Box::new(source), ParseErrorPolicy::Drop);
        assert_eq!(drop.resolve("genesis").unwrap(), None);
    }

    #[test]
    fn test_overflowing_sequence_is_parse_error() {
        let source = RegexSequenceSource::default();
        let err = source.sequence_of("99999999999999999999999").unwrap_err();
        assert!(matches!(err, SequenceError::ParseError { .. }));
    }

    #[test]
    fn test_resolver_policies() {
        let reject = SequenceResolver::new(
            Box::new(RegexSequenceSource::default()),
            ParseErrorPolicy::Reject,
        );
        assert_eq!(reject.resolve("7").unwrap(), Some(7));
        assert!(reject.resolve("bogus").is_err());

        let drop = SequenceResolver::new(
            Box::new(RegexSequenceSource::default()),
            ParseErrorPolicy::Drop,
        );
        assert_eq!(drop.resolve("bogus").unwrap(), None);
        assert_eq!(drop.resolve("3").unwrap(), Some(3));

        let zero = SequenceResolver::new(
            Box::new(RegexSequenceSource::default()),
            ParseErrorPolicy::Zero,
        );
        assert_eq!(zero.resolve("bogus").unwrap(), Some(0));
        assert_eq!(zero.policy(), ParseErrorPolicy::Zero);
    }
}
