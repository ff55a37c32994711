//! Exit codes and structured error output.

use serde::Serialize;

use crate::actions::ExecuteError;
use crate::batch::BatchError;
use crate::index::IndexError;

/// Process exit codes.
///
/// - 0: Success
/// - 1: General error (fatal: corrupt index, plan conflict, backup failure)
/// - 3: Partial success (some files unreadable, or some actions failed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    PartialSuccess = 3,
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "VC000",
            Self::GeneralError => "VC001",
            Self::PartialSuccess => "VC003",
            Self::Interrupted => "VC130",
        }
    }

    /// Exit code for an error that reached `main`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let interrupted = err.chain().any(|cause| {
            cause
                .downcast_ref::<BatchError>()
                .is_some_and(|e| matches!(e, BatchError::Interrupted))
                || cause
                    .downcast_ref::<IndexError>()
                    .is_some_and(|e| matches!(e, IndexError::Interrupted))
        });
        if interrupted {
            Self::Interrupted
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    pub code: String,
    pub exit_code: i32,
    pub message: String,
    /// Set when the failure was the backup gate; nothing was changed.
    pub nothing_changed: bool,
    pub interrupted: bool,
}

impl StructuredError {
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            nothing_changed: err
                .chain()
                .any(|c| matches!(c.downcast_ref::<ExecuteError>(), Some(ExecuteError::Backup(_)))),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
