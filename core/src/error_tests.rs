#[cfg(test)]
mod tests {
    use crate::error::*;
    use schema::ExitOutcome;
    use std::error::Error;
    use std::io;
    use std::time::Duration;

    #[test]
    fn test_core_error_display() {
        let err = CoreError::ValidationError("test validation".to_string());
        assert_eq!(err.to_string(), "Validation error: test validation");

        let err = CoreError::ConfigurationError("bad config".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad config");

        let err = CoreError::ProcessSpawn("Failed to spawn 'nope'".to_string());
        assert_eq!(err.to_string(), "Process spawn error: Failed to spawn 'nope'");

        let err = CoreError::HandshakeTimeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "No handshake from server within 3s");
    }

    #[test]
    fn test_startup_failure_is_verbatim() {
        let err = CoreError::StartupFailure {
            message: "port already in use".to_string(),
        };
        assert_eq!(err.to_string(), "port already in use");

        let err = CoreError::StartupFailure {
            message: "exit status 1\n".to_string(),
        };
        assert_eq!(err.to_string(), "exit status 1\n");
    }

    #[test]
    fn test_abnormal_exit_carries_outcome() {
        let outcome = ExitOutcome { pid: 77, code: Some(1), signal: None };
        let err = CoreError::AbnormalExit { outcome };
        assert_eq!(err.to_string(), "Server exited with exit code 1");
        assert_eq!(err.exit_outcome(), Some(&outcome));

        let err = CoreError::ValidationError("x".to_string());
        assert!(err.exit_outcome().is_none());
    }

    #[test]
    fn test_core_error_from_std_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();

        if let CoreError::IoError(_) = core_err {
            // Expected variant
        } else {
            panic!("Expected CoreError::IoError variant");
        }
    }

    #[test]
    fn test_core_error_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let core_err: CoreError = serde_err.into();
        assert_eq!(core_err.code(), "CORE013");
    }

    #[test]
    fn test_error_trait_implementation() {
        let err = CoreError::InvalidHandshake("not base64".to_string());
        let _: &dyn Error = &err;
        assert!(err.source().is_none());
    }

    #[test]
    fn test_error_codes() {
        let outcome = ExitOutcome { pid: 1, code: Some(2), signal: None };
        assert_eq!(CoreError::ConfigurationError("t".to_string()).code(), "CORE001");
        assert_eq!(CoreError::ValidationError("t".to_string()).code(), "CORE002");
        assert_eq!(CoreError::InitializationError("t".to_string()).code(), "CORE003");
        assert_eq!(CoreError::ProcessSpawn("t".to_string()).code(), "CORE004");
        assert_eq!(CoreError::ProcessWait("t".to_string()).code(), "CORE005");
        assert_eq!(CoreError::ProcessSignal("t".to_string()).code(), "CORE006");
        assert_eq!(
            CoreError::StartupFailure { message: "t".to_string() }.code(),
            "CORE007"
        );
        assert_eq!(CoreError::InvalidHandshake("t".to_string()).code(), "CORE008");
        assert_eq!(CoreError::AbnormalExit { outcome }.code(), "CORE009");
        assert_eq!(CoreError::ExitedBeforeReady { outcome }.code(), "CORE010");
        assert_eq!(
            CoreError::HandshakeTimeout(Duration::from_secs(1)).code(),
            "CORE011"
        );
    }
}
