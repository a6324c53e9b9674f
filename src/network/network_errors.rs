//! Error types relating to the creation and running of [`Network`](crate::network::Network)s

use std::fmt::{self, Formatter};

#[allow(missing_docs)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum BuildError {
    /// the shape vector passed to [`Network::new`](crate::network::Network::new) was empty
    EmptyShape,
    /// a network needs at least an input layer and an output layer
    TooFewLayers { actual: usize },
    /// the first shape entry and the number of provided input identifiers disagree
    MismatchedInputIds { shape_entry: usize, ids_given: usize },
    /// the last layer must hold exactly one output node
    BadOutputLayer { actual: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::EmptyShape => {
                write!(f, "network shape is empty")
            }
            BuildError::TooFewLayers { actual } => {
                write!(
                    f,
                    "network shape has {} layer(s), but at least 2 are required",
                    actual
                )
            }
            BuildError::MismatchedInputIds {
                shape_entry,
                ids_given,
            } => {
                write!(
                    f,
                    "shape declares {} input nodes but {} input ids were provided",
                    shape_entry, ids_given
                )
            }
            BuildError::BadOutputLayer { actual } => {
                write!(
                    f,
                    "output layer has {} nodes, but exactly 1 is required",
                    actual
                )
            }
        }
    }
}

impl std::error::Error for BuildError {}

#[allow(missing_docs)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ForwardNetworkError {
    /// the length of the input vector passed to [`Network::forward`](crate::network::Network::forward)
    /// was not equal to the size of the input layer. The call fails rather than
    /// truncating or padding; the caller must supply a conforming input vector
    MissizedInputs { actual: usize, expected: usize },
}

impl fmt::Display for ForwardNetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ForwardNetworkError::MissizedInputs { actual, expected } => {
                write!(
                    f,
                    "bad input vector length. Expected {}, got {}",
                    expected, actual
                )
            }
        }
    }
}

impl std::error::Error for ForwardNetworkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<BuildError>();
    }

    #[test]
    fn test_build_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<BuildError>();
    }

    #[test]
    fn test_forward_error_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ForwardNetworkError>();
    }

    #[test]
    fn test_forward_error_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<ForwardNetworkError>();
    }
}
