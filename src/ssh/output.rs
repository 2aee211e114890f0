//! Output formatting
//!
//! Folds a [`CommandResult`] into the single text returned to callers.
//! Non-empty stderr is reported as advisory text, not as a failure.

use super::command::CommandResult;

/// Header placed before stderr when a command wrote to it
pub const STDERR_HEADER: &str = "Command executed with errors:";

/// Label placed before stdout when stderr is present
pub const STDOUT_LABEL: &str = "Output:";

/// Format captured output for the caller
pub fn format_output(result: &CommandResult) -> String {
    let stdout = result.stdout().trim();
    let stderr = result.stderr().trim();

    if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n{}\n{}\n{}", STDERR_HEADER, stderr, STDOUT_LABEL, stdout)
    }
}
