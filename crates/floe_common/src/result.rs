//! Fatal error and result types shared by every pipeline stage.

/// The standard result type for fallible operations in the toolchain.
pub type Result<T> = std::result::Result<T, FatalError>;

/// An unrecoverable error: malformed input, an unsatisfiable constraint,
/// exhausted device capacity, or a routing failure.
///
/// There is no intra-stage recovery; the driver reports the message as
/// `fatal error: ...` and exits. Parser errors carry a `file:line` prefix
/// in `position`.
#[derive(Debug, thiserror::Error)]
pub struct FatalError {
    /// Human-readable description.
    pub message: String,
    /// `file:line` provenance, when the error came out of a parser.
    pub position: Option<String>,
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{}: {}", pos, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl FatalError {
    /// Creates an error with no source position.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    /// Creates an error anchored at a source position.
    pub fn at(position: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: Some(position.into()),
        }
    }
}

/// Shorthand for `Err(FatalError::new(format!(...)))`.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        return Err($crate::FatalError::new(format!($($arg)*)).into())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_position() {
        let e = FatalError::new("failed to route");
        assert_eq!(format!("{e}"), "failed to route");
    }

    #[test]
    fn display_with_position() {
        let e = FatalError::at("top.blif:12", "unknown model `SB_FOO'");
        assert_eq!(format!("{e}"), "top.blif:12: unknown model `SB_FOO'");
    }

    #[test]
    fn fatal_macro_returns_err() {
        fn f(x: i32) -> Result<i32> {
            if x < 0 {
                fatal!("negative input {x}");
            }
            Ok(x)
        }
        assert_eq!(f(3).unwrap(), 3);
        assert_eq!(f(-1).unwrap_err().message, "negative input -1");
    }
}
