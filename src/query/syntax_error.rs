use super::scanner::Location;
use std::error::Error;

/// A parse or type error anchored to a byte span of the query source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    /// Span of the offending source bytes.
    pub location: Location,
    /// Human-readable description.
    pub message: String,
}

impl SyntaxError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    /// Renders the error with a caret line under the offending bytes:
    ///
    /// ```text
    /// all in /foo snce ~now
    ///             ^^^^
    /// expected a time predicate or a pipeline
    /// ```
    #[must_use]
    pub fn render(&self, source: &str) -> String {
        let start = self.location.start.min(source.len());
        let end = self.location.end.clamp(start, source.len());
        let width = (end - start).max(1);
        format!(
            "{source}\n{}{}\n{}",
            " ".repeat(start),
            "^".repeat(width),
            self.message
        )
    }
}

impl Error for SyntaxError {}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} (bytes {}..{})",
            self.message, self.location.start, self.location.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_line_underlines_the_span() {
        let error = SyntaxError::new(Location::new(4, 8), "expected a topic");
        let rendered = error.render("in  what now");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "in  what now");
        assert_eq!(lines[1], "    ^^^^");
        assert_eq!(lines[2], "expected a topic");
    }
}
