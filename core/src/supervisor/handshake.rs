//! Readiness handshake state machine
//!
//! The server announces readiness by writing its base64 certificate hash to
//! stdout as its very first output. Anything it writes to stderr first is a
//! startup failure. Whichever stream speaks first decides the outcome, and
//! from then on output is only informational.
//!
//! ```text
//!            stdout chunk (valid base64)
//!   Pending ─────────────────────────────► Resolved ──► Output / Diagnostic
//!      │
//!      │ stderr chunk, bad base64,
//!      │ exit, timeout
//!      ▼
//!   Rejected ──────────────────────────────────────────► Output / Diagnostic
//! ```
//!
//! The handshake value is assumed to arrive in a single chunk. When the first
//! chunk carries more than one line, only the first line is the handshake and
//! the rest is kept as ordinary output. A value split across reads is decoded
//! from the first piece only.

use crate::{CoreError, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use schema::{CertificateHash, ConnectionDescriptor, LogStream};

/// Single-assignment readiness state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Nothing received yet
    Pending,
    /// Handshake received and decoded
    Resolved,
    /// Server failed before becoming ready
    Rejected,
}

impl ReadinessState {
    /// Resolved or Rejected
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadinessState::Pending)
    }
}

/// What a chunk of output meant
#[derive(Debug)]
pub enum HandshakeStep {
    /// The handshake completed
    Ready(ConnectionDescriptor),
    /// The handshake failed
    Failed(CoreError),
    /// Stdout after the handshake was decided
    Output(String),
    /// Stderr after the handshake was decided
    Diagnostic(String),
}

/// Drives [`ReadinessState`] from output chunks
#[derive(Debug)]
pub struct Handshake {
    address: String,
    state: ReadinessState,
    leftover: Option<String>,
}

impl Handshake {
    /// New pending handshake that will describe `address` once resolved
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: ReadinessState::Pending,
            leftover: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ReadinessState {
        self.state
    }

    /// Feed one chunk read from `stream`
    pub fn on_chunk(&mut self, stream: LogStream, bytes: &[u8]) -> HandshakeStep {
        let text = String::from_utf8_lossy(bytes).into_owned();

        if self.state.is_terminal() {
            return match stream {
                LogStream::Stdout => HandshakeStep::Output(text),
                LogStream::Stderr => HandshakeStep::Diagnostic(text),
            };
        }

        match stream {
            LogStream::Stderr => {
                self.state = ReadinessState::Rejected;
                HandshakeStep::Failed(CoreError::StartupFailure { message: text })
            }
            LogStream::Stdout => {
                let (token, rest) = text.split_once('\n').unwrap_or((text.as_str(), ""));
                match decode_certificate_hash(token) {
                    Ok(hash) => {
                        if !rest.trim().is_empty() {
                            self.leftover = Some(rest.to_string());
                        }
                        self.state = ReadinessState::Resolved;
                        HandshakeStep::Ready(ConnectionDescriptor::new(
                            self.address.clone(),
                            CertificateHash::sha256(hash),
                        ))
                    }
                    Err(e) => {
                        self.state = ReadinessState::Rejected;
                        HandshakeStep::Failed(e)
                    }
                }
            }
        }
    }

    /// Output that arrived in the same chunk as the handshake line
    pub fn take_leftover(&mut self) -> Option<String> {
        self.leftover.take()
    }

    /// Give up on a pending handshake. Returns false if it was already decided.
    pub fn abandon(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = ReadinessState::Rejected;
        true
    }
}

/// Standard alphabet, padding optional on decode
const HASH_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the base64 certificate hash the server printed
///
/// Surrounding whitespace (the trailing newline of a `Println`) is ignored,
/// and so is missing `=` padding.
pub fn decode_certificate_hash(text: &str) -> Result<Vec<u8>> {
    HASH_ENGINE
        .decode(text.trim())
        .map_err(|e| CoreError::InvalidHandshake(format!("{:?} is not base64: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use schema::HashAlgorithm;

    const ADDRESS: &str = "https://127.0.0.1:12345/say-hello";

    #[test]
    fn test_stdout_first_resolves() {
        let mut hs = Handshake::new(ADDRESS);
        assert_eq!(hs.state(), ReadinessState::Pending);

        match hs.on_chunk(LogStream::Stdout, b"aGVsbG8=") {
            HandshakeStep::Ready(descriptor) => {
                assert_eq!(descriptor.address, ADDRESS);
                assert_eq!(descriptor.server_certificate_hashes.len(), 1);
                let hash = &descriptor.server_certificate_hashes[0];
                assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
                assert_eq!(hash.value, vec![0x68, 0x65, 0x6c, 0x6c, 0x6f]);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(hs.state(), ReadinessState::Resolved);
    }

    #[test]
    fn test_trailing_newline_is_tolerated() {
        let digest = [7u8; 32];
        let line = format!("{}\n", STANDARD.encode(digest));
        let mut hs = Handshake::new(ADDRESS);
        match hs.on_chunk(LogStream::Stdout, line.as_bytes()) {
            HandshakeStep::Ready(descriptor) => assert_eq!(descriptor.sha256(), Some(&digest[..])),
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_merged_chunk_keeps_rest_as_output() {
        let mut hs = Handshake::new(ADDRESS);
        match hs.on_chunk(LogStream::Stdout, b"aGVsbG8=\nSERVER listening\n") {
            HandshakeStep::Ready(descriptor) => assert_eq!(descriptor.sha256(), Some(&b"hello"[..])),
            other => panic!("expected Ready, got {:?}", other),
        }
        assert_eq!(hs.take_leftover().as_deref(), Some("SERVER listening\n"));
        assert_eq!(hs.take_leftover(), None);

        let mut hs = Handshake::new(ADDRESS);
        let _ = hs.on_chunk(LogStream::Stdout, b"aGVsbG8=\n");
        assert_eq!(hs.take_leftover(), None);
    }

    #[test]
    fn test_stderr_first_rejects_verbatim() {
        let mut hs = Handshake::new(ADDRESS);
        match hs.on_chunk(LogStream::Stderr, b"port already in use") {
            HandshakeStep::Failed(err) => {
                assert_eq!(err.to_string(), "port already in use");
                assert_eq!(err.code(), "CORE007");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(hs.state(), ReadinessState::Rejected);
    }

    #[test]
    fn test_unpadded_base64_resolves() {
        let mut hs = Handshake::new(ADDRESS);
        match hs.on_chunk(LogStream::Stdout, b"aGVsbG8") {
            HandshakeStep::Ready(descriptor) => {
                assert_eq!(descriptor.sha256(), Some(&[0x68, 0x65, 0x6c, 0x6c, 0x6f][..]))
            }
            other => panic!("expected Ready, got {:?}", other),
        }

        let digest = [0xabu8; 32];
        let unpadded = STANDARD.encode(digest).trim_end_matches('=').to_string();
        assert_eq!(decode_certificate_hash(&unpadded).unwrap(), digest);
    }

    #[test]
    fn test_invalid_base64_rejects() {
        let mut hs = Handshake::new(ADDRESS);
        match hs.on_chunk(LogStream::Stdout, b"listening on :12345") {
            HandshakeStep::Failed(CoreError::InvalidHandshake(msg)) => {
                assert!(msg.contains("listening on :12345"));
            }
            other => panic!("expected InvalidHandshake, got {:?}", other),
        }
        assert_eq!(hs.state(), ReadinessState::Rejected);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut hs = Handshake::new(ADDRESS);
        assert!(matches!(
            hs.on_chunk(LogStream::Stdout, b"aGVsbG8="),
            HandshakeStep::Ready(_)
        ));

        // stderr after readiness is a diagnostic, not a rejection
        match hs.on_chunk(LogStream::Stderr, b"SERVER incoming session") {
            HandshakeStep::Diagnostic(text) => assert_eq!(text, "SERVER incoming session"),
            other => panic!("expected Diagnostic, got {:?}", other),
        }
        // a second base64 value is plain output, not a second descriptor
        match hs.on_chunk(LogStream::Stdout, b"d29ybGQ=") {
            HandshakeStep::Output(text) => assert_eq!(text, "d29ybGQ="),
            other => panic!("expected Output, got {:?}", other),
        }
        assert_eq!(hs.state(), ReadinessState::Resolved);
    }

    #[test]
    fn test_rejected_never_resolves() {
        let mut hs = Handshake::new(ADDRESS);
        assert!(matches!(
            hs.on_chunk(LogStream::Stderr, b"boom"),
            HandshakeStep::Failed(_)
        ));
        assert!(matches!(
            hs.on_chunk(LogStream::Stdout, b"aGVsbG8="),
            HandshakeStep::Output(_)
        ));
        assert_eq!(hs.state(), ReadinessState::Rejected);
    }

    #[test]
    fn test_abandon_only_affects_pending() {
        let mut hs = Handshake::new(ADDRESS);
        assert!(hs.abandon());
        assert_eq!(hs.state(), ReadinessState::Rejected);
        assert!(!hs.abandon());

        let mut hs = Handshake::new(ADDRESS);
        let _ = hs.on_chunk(LogStream::Stdout, b"aGVsbG8=");
        assert!(!hs.abandon());
        assert_eq!(hs.state(), ReadinessState::Resolved);
    }

    #[test]
    fn test_decode_roundtrips_arbitrary_digests() {
        for len in [0usize, 1, 2, 3, 20, 32, 48, 64] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 37 % 256) as u8).collect();
            let encoded = STANDARD.encode(&bytes);
            assert_eq!(decode_certificate_hash(&encoded).unwrap(), bytes);
        }
    }
}
