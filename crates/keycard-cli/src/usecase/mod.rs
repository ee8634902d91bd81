//! Use-case controllers and their observable state.
//!
//! Each controller owns the observable state for one user intent (status
//! line, running log, terminal outputs), arms the discovery worker with the
//! pending operation, and folds worker events back into that state. Attempt
//! results carrying a generation other than the controller's current one
//! belong to a dismissed operation and are dropped without being applied.

pub mod read_vc;
pub mod verify_pin;
pub mod write_url;
pub mod write_vc;

/// Observable state for one use case.
#[derive(Debug, Default)]
pub struct UseCaseState {
    pub status: String,
    pub logs: Vec<String>,
}

impl UseCaseState {
    /// Update the status line; repeated identical statuses are not
    /// re-printed.
    pub fn set_status(&mut self, status: impl Into<String>) {
        let status = status.into();
        if status != self.status {
            println!("{status}");
            self.status = status;
        }
    }

    /// Append to the running log.
    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.logs.push(line);
    }
}

/// Extract an `0x…` or `SW=…` error-code token from a rendered card error,
/// for compact display in status lines.
pub fn extract_error_code(message: &str) -> Option<String> {
    if let Some(idx) = message.find("0x") {
        let code: String = message[idx..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if code.len() > 2 {
            return Some(code);
        }
    }
    if let Some(idx) = message.find("SW=") {
        let code: String = message[idx..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '=')
            .collect();
        if code.len() > 3 {
            return Some(code);
        }
    }
    None
}
