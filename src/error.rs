use thiserror::Error;

pub const ERR_INVALID_ARG_TYPE: &str = "ERR_INVALID_ARG_TYPE";
pub const ERR_INVALID_ARG_VALUE: &str = "ERR_INVALID_ARG_VALUE";
pub const ERR_INVALID_OPT_VALUE: &str = "ERR_INVALID_OPT_VALUE";
pub const ERR_INDEX_OUT_OF_RANGE: &str = "ERR_INDEX_OUT_OF_RANGE";
pub const ERR_METHOD_NOT_IMPLEMENTED: &str = "ERR_METHOD_NOT_IMPLEMENTED";
pub const ERR_FILE_ACCESS_FORBIDDEN: &str = "ERR_FILE_ACCESS_FORBIDDEN";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("argument '{arg}' has the wrong type, expected {expected}")]
    InvalidArgType { arg: &'static str, expected: &'static str },

    #[error("argument '{arg}' has an invalid value: {value}")]
    InvalidArgValue { arg: &'static str, value: String },

    #[error("option '{option}' has an invalid value: {value}")]
    InvalidOptionValue { option: &'static str, value: String },

    #[error("index out of range")]
    IndexOutOfRange,

    #[error("frame id '{0}' does not match the top of the controller stack")]
    InvalidFrameId(String),

    #[error("context '{0}' is not known to the registry")]
    UnknownContext(String),

    #[error("task {0} is already bound to a lineage")]
    AlreadyStarted(u32),

    #[error("Access to the file \"{0}\" is forbidden by the current security context")]
    FileAccessForbidden(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl ContextError {
    pub fn code(&self) -> &'static str {
        match self {
            ContextError::InvalidArgType { .. } => ERR_INVALID_ARG_TYPE,
            ContextError::InvalidArgValue { .. } => ERR_INVALID_ARG_VALUE,
            ContextError::InvalidOptionValue { .. } => ERR_INVALID_OPT_VALUE,
            ContextError::IndexOutOfRange => ERR_INDEX_OUT_OF_RANGE,
            ContextError::InvalidFrameId(_) => ERR_INVALID_ARG_VALUE,
            ContextError::UnknownContext(_) => ERR_INVALID_ARG_VALUE,
            ContextError::AlreadyStarted(_) => ERR_INVALID_ARG_VALUE,
            ContextError::FileAccessForbidden(_) => ERR_FILE_ACCESS_FORBIDDEN,
            ContextError::NotImplemented(_) => ERR_METHOD_NOT_IMPLEMENTED,
        }
    }

    pub fn forbidden_path(&self) -> Option<&str> {
        match self {
            ContextError::FileAccessForbidden(path) => Some(path),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
