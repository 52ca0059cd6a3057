use thiserror::Error;

/// Everything that can stop a clone, from operator mistakes to tool failures.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("{0} is not an existing block device")]
    DeviceNotFound(String),

    #[error("{0} is a partition; give the whole disk instead (for example /dev/sdb, not /dev/sdb1)")]
    NotAWholeDisk(String),

    #[error("source and destination are the same device ({0})")]
    SameDevice(String),

    #[error("{device} is in use ({}); unmount it first", .mounted.join(", "))]
    DeviceBusy {
        device: String,
        mounted: Vec<String>,
    },

    #[error("invalid root size '{value}': {reason}")]
    InvalidSize { value: String, reason: String },

    #[error(
        "{device} holds {available_mib} MiB but the layout needs at least {required_mib} MiB"
    )]
    InsufficientCapacity {
        device: String,
        required_mib: u64,
        available_mib: u64,
    },

    #[error("`{command}` failed with exit status {status}")]
    ExternalCommand { command: String, status: i32 },

    #[error("required tool `{0}` was not found in PATH")]
    MissingTool(String),

    #[error("operation aborted by user")]
    UserAborted,

    #[error("interrupted by signal")]
    Interrupted,

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloneError {
    /// Validation errors leave the system untouched and return the operator to the menu.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CloneError::DeviceNotFound(_)
                | CloneError::NotAWholeDisk(_)
                | CloneError::SameDevice(_)
                | CloneError::DeviceBusy { .. }
                | CloneError::InvalidSize { .. }
                | CloneError::InsufficientCapacity { .. }
                | CloneError::MissingTool(_)
                | CloneError::UserAborted
                | CloneError::Prompt(_)
        )
    }

    /// Exit status of the failing external command, if that is what failed.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            CloneError::ExternalCommand { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        CloneError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}
