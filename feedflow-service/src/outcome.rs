// Outcome
// Proceed-or-skip result that still carries a usable value when there is nothing to do

/// Result of a step that may decide there is no data to process.
///
/// `Skip` is not an error: it carries a fallback value (for actions, well-formed
/// empty output feeds) so the DAG can keep going.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Proceed(T),
    Skip { reason: String, fallback: T },
}

impl<T> Outcome<T> {
    pub fn skip(reason: impl Into<String>, fallback: T) -> Self {
        Self::Skip {
            reason: reason.into(),
            fallback,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Proceed(value) => value,
            Self::Skip { fallback, .. } => fallback,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Proceed(value) => value,
            Self::Skip { fallback, .. } => fallback,
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Proceed(_) => None,
            Self::Skip { reason, .. } => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Proceed(value) => Outcome::Proceed(f(value)),
            Self::Skip { reason, fallback } => Outcome::Skip {
                reason,
                fallback: f(fallback),
            },
        }
    }
}
