//! PC/SC transport - reader context and single-tap card sessions

use std::time::Duration;

use pcsc::{Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};
use tracing::debug;

use crate::apdu::ApduResponse;
use crate::error::{CardError, CardResult};

/// Default session timeout applied to a fresh tap.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Card reader wrapper for managing PC/SC connections
pub struct CardReader {
    context: Context,
}

impl CardReader {
    /// Create a new CardReader by establishing a PC/SC context
    pub fn new() -> CardResult<Self> {
        let context = Context::establish(Scope::User).map_err(map_pcsc_error)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> CardResult<Vec<String>> {
        let mut readers_buf = [0; 2048];
        let readers = self.context.list_readers(&mut readers_buf).map_err(map_pcsc_error)?;

        Ok(readers
            .map(|r| r.to_str().unwrap_or("Unknown").to_string())
            .collect())
    }

    /// Connect to the first available reader, returning a fresh session
    pub fn connect_first(&self) -> CardResult<(CardSession, String)> {
        let mut readers_buf = [0; 2048];
        let mut readers = self.context.list_readers(&mut readers_buf).map_err(map_pcsc_error)?;

        if let Some(reader) = readers.next() {
            let reader_name = reader.to_str().unwrap_or("Unknown").to_string();
            let card = self
                .context
                .connect(reader, ShareMode::Shared, Protocols::ANY)
                .map_err(map_pcsc_error)?;
            Ok((CardSession::new(card), reader_name))
        } else {
            Err(CardError::TransportUnavailable(
                "no card readers available".to_string(),
            ))
        }
    }

    /// Connect to a specific reader by name (CStr)
    pub fn connect(&self, reader_name: &std::ffi::CStr) -> CardResult<CardSession> {
        let card = self
            .context
            .connect(reader_name, ShareMode::Shared, Protocols::ANY)
            .map_err(map_pcsc_error)?;
        Ok(CardSession::new(card))
    }
}

/// One physical tap.
///
/// Sessions are single-use: closed unconditionally at the end of an attempt
/// (success or failure) and never reused across retries; each retry
/// re-acquires a new session from a new tap.
pub struct CardSession {
    card: Option<pcsc::Card>,
    timeout: Duration,
}

impl CardSession {
    fn new(card: pcsc::Card) -> Self {
        Self {
            card: Some(card),
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Advisory exchange timeout for this session.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_open(&self) -> bool {
        self.card.is_some()
    }

    /// Exchange one APDU with the card.
    pub fn transmit(&mut self, apdu: &[u8]) -> CardResult<ApduResponse> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| CardError::LinkLost("session already closed".to_string()))?;

        let mut rapdu_buf = [0; MAX_BUFFER_SIZE];
        let rapdu = card.transmit(apdu, &mut rapdu_buf).map_err(map_pcsc_error)?;

        ApduResponse::from_raw(rapdu)
            .ok_or_else(|| CardError::LinkLost("response shorter than a status word".to_string()))
    }

    /// Close the session. Idempotent; close-time errors are swallowed -
    /// closing must never propagate.
    pub fn close(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, err)) = card.disconnect(pcsc::Disposition::LeaveCard) {
                debug!(error = %err, "error closing card session (ignored)");
            }
        }
    }
}

impl Drop for CardSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert a PC/SC error into the crate taxonomy. Anything that is not a
/// missing-capability condition is treated as link loss, which the retry
/// policy may absorb.
fn map_pcsc_error(err: pcsc::Error) -> CardError {
    use pcsc::Error;
    match err {
        Error::NoService
        | Error::ServiceStopped
        | Error::NoReadersAvailable
        | Error::ReaderUnavailable
        | Error::UnknownReader
        | Error::UnsupportedCard => CardError::TransportUnavailable(err.to_string()),
        other => CardError::LinkLost(other.to_string()),
    }
}
