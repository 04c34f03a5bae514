//! Exit code constants for uxpal.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `MISSING_DEPENDENCY` | Requested stage has no upstream output |
//! | 4 | `VALIDATION_FAILED` | Final artifact is not parseable JSON |
//! | 10 | `STAGE_TIMEOUT` | A stage exceeded its timeout |
//! | 70 | `PROVIDER_FAILURE` | LLM provider invocation failed |
//! | 130 | `CANCELLED` | Run cancelled (Ctrl-C) |

/// Process exit code.
///
/// ```rust
/// use uxpal_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::MISSING_DEPENDENCY);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid or missing command-line arguments
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A single stage was requested without the previous stage's output
    pub const MISSING_DEPENDENCY: ExitCode = ExitCode(3);

    /// The final artifact could not be parsed as JSON
    pub const VALIDATION_FAILED: ExitCode = ExitCode(4);

    /// Stage timeout - an LLM call exceeded the configured timeout
    pub const STAGE_TIMEOUT: ExitCode = ExitCode(10);

    /// Provider failure - the LLM provider rejected or failed the call
    pub const PROVIDER_FAILURE: ExitCode = ExitCode(70);

    /// Cancelled by the user
    pub const CANCELLED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::MISSING_DEPENDENCY.as_i32(), 3);
        assert_eq!(ExitCode::VALIDATION_FAILED.as_i32(), 4);
        assert_eq!(ExitCode::STAGE_TIMEOUT.as_i32(), 10);
        assert_eq!(ExitCode::PROVIDER_FAILURE.as_i32(), 70);
        assert_eq!(ExitCode::CANCELLED.as_i32(), 130);
    }

    #[test]
    fn test_round_trip_through_i32() {
        let raw: i32 = ExitCode::VALIDATION_FAILED.into();
        assert_eq!(ExitCode::from(raw), ExitCode::VALIDATION_FAILED);
    }
}
