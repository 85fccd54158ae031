use std::path::PathBuf;

/// Errors surfaced to callers of the engine's public API.
///
/// Internal-fatal conditions (pipe creation failure, fork failure, fstat
/// failure, read failure on a child pipe) are not represented here: per
/// spec they abort the process with a diagnostic rather than propagate.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("failed to open input script {path}: {os_error}")]
    Open { path: PathBuf, os_error: String },

    #[error("invalid mode or option selection: {0}")]
    Cmdline(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_open() {
        let err = EngineError::Open {
            path: PathBuf::from("/no/such/file"),
            os_error: "No such file or directory (os error 2)".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to open input script /no/such/file: No such file or directory (os error 2)"
        );
    }

    #[test]
    fn test_display_cmdline() {
        let err = EngineError::Cmdline("bad mode foo: try --list-modes".into());
        assert_eq!(
            err.to_string(),
            "invalid mode or option selection: bad mode foo: try --list-modes"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }
}
