use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location as PanicLocation;

/// Source position attached to every error variant in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl ErrorLocation {
    pub const fn from(location: &'static PanicLocation<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Capture the position of the nearest caller not marked `#[track_caller]`.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(PanicLocation::caller())
    }
}

impl Display for ErrorLocation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "[{}:{}:{}]", self.file, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorLocation;

    #[test]
    fn given_tracked_caller_when_capturing_then_points_at_call_site() {
        let expected_line = line!() + 1;
        let location = ErrorLocation::caller();

        assert_eq!(location.file, file!());
        assert_eq!(location.line, expected_line);
    }

    #[test]
    fn given_location_when_displayed_then_uses_bracketed_triple() {
        let location = ErrorLocation {
            file: "src/hub/server.rs",
            line: 42,
            column: 7,
        };

        assert_eq!(location.to_string(), "[src/hub/server.rs:42:7]");
    }
}
