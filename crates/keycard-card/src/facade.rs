//! Card command facade
//!
//! Presents one stable command surface to the handshake and orchestrator.
//! At construction the facade probes the vendor capability descriptor and
//! resolves a single binding per operation; it never re-probes. Every vendor
//! error is converted into the crate taxonomy here, tagged with the protocol
//! stage it belongs to. The chunked payload transfer loops also live here.

use tracing::{debug, trace};

use crate::error::{CardError, CardResult, Stage};
use crate::vendor::{status, Capabilities, CmdError, CommandSet, StorageSlot};

/// Most payload bytes a single STORE DATA command carries. The record-size
/// ceiling in the codec keeps the chunk count inside the card's reassembly
/// window.
pub const MAX_CHUNK_BYTES: usize = 247;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpairBinding {
    Unpair,
    UnpairAll,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairBinding {
    Password,
    Key,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBinding {
    StoreData,
    SetData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBinding {
    GetData,
    GetNdef,
}

/// Operation bindings resolved by the one-time capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOps {
    pub unpair: UnpairBinding,
    pub pair: Option<PairBinding>,
    pub store: Option<StoreBinding>,
    pub read: Option<ReadBinding>,
    pub can_select: bool,
    pub can_open_channel: bool,
    pub can_verify_pin: bool,
}

impl ResolvedOps {
    /// Resolve one binding per operation. Preference order is fixed, so
    /// resolution is deterministic for any given command set.
    pub fn probe(caps: &Capabilities) -> Self {
        let unpair = if caps.unpair {
            UnpairBinding::Unpair
        } else if caps.unpair_all {
            UnpairBinding::UnpairAll
        } else {
            UnpairBinding::None
        };
        let pair = if caps.pair_with_password {
            Some(PairBinding::Password)
        } else if caps.pair_with_key {
            Some(PairBinding::Key)
        } else {
            None
        };
        let store = if caps.store_data {
            Some(StoreBinding::StoreData)
        } else if caps.set_data {
            Some(StoreBinding::SetData)
        } else {
            None
        };
        let read = if caps.get_data {
            Some(ReadBinding::GetData)
        } else if caps.get_ndef {
            Some(ReadBinding::GetNdef)
        } else {
            None
        };
        Self {
            unpair,
            pair,
            store,
            read,
            can_select: caps.select,
            can_open_channel: caps.open_secure_channel,
            can_verify_pin: caps.verify_pin,
        }
    }
}

/// Facade over a vendor command set for one session.
pub struct CardFacade<C: CommandSet> {
    cmd: C,
    ops: ResolvedOps,
}

impl<C: CommandSet> CardFacade<C> {
    pub fn new(cmd: C) -> Self {
        let ops = ResolvedOps::probe(&cmd.capabilities());
        debug!(?ops, "resolved command bindings");
        Self { cmd, ops }
    }

    pub fn ops(&self) -> &ResolvedOps {
        &self.ops
    }

    pub fn into_inner(self) -> C {
        self.cmd
    }

    pub fn select(&mut self) -> CardResult<()> {
        if !self.ops.can_select {
            return Err(CardError::VendorCapabilityMissing("select"));
        }
        self.cmd.select().map_err(|e| convert(e, Stage::Select))
    }

    /// Best-effort slot cleanup: tries the resolved unpair shape if one
    /// exists. The card may hold no pairing, or the shape may be absent;
    /// either way the failure is logged and discarded, never propagated.
    pub fn unpair_best_effort(&mut self) -> bool {
        let result = match self.ops.unpair {
            UnpairBinding::Unpair => self.cmd.unpair(),
            UnpairBinding::UnpairAll => self.cmd.unpair_all(),
            UnpairBinding::None => {
                debug!("no unpair shape offered, skipping");
                return false;
            }
        };
        match result {
            Ok(()) => {
                debug!("unpair succeeded");
                true
            }
            Err(err) => {
                debug!(error = %err, "unpair failed (non-fatal)");
                false
            }
        }
    }

    pub fn pair(&mut self, password: &str) -> CardResult<()> {
        let binding = self
            .ops
            .pair
            .ok_or(CardError::VendorCapabilityMissing("pair"))?;
        let result = match binding {
            PairBinding::Password => self.cmd.pair_with_password(password),
            PairBinding::Key => self.cmd.pair_with_key(password.as_bytes()),
        };
        result.map_err(|e| convert(e, Stage::Pair))
    }

    pub fn open_secure_channel(&mut self) -> CardResult<()> {
        if !self.ops.can_open_channel {
            return Err(CardError::VendorCapabilityMissing("open_secure_channel"));
        }
        self.cmd
            .open_secure_channel()
            .map_err(|e| convert(e, Stage::OpenChannel))
    }

    /// `Ok(false)` means the card rejected the PIN; wrong-PIN status words
    /// from the command set are folded into that.
    pub fn verify_pin(&mut self, pin: &str) -> CardResult<bool> {
        if !self.ops.can_verify_pin {
            return Err(CardError::VendorCapabilityMissing("verify_pin"));
        }
        match self.cmd.verify_pin(pin) {
            Ok(accepted) => Ok(accepted),
            Err(CmdError::Rejected(sw)) if sw & 0xFFF0 == status::WRONG_PIN_BASE => Ok(false),
            Err(err) => Err(convert(err, Stage::VerifyPin)),
        }
    }

    /// Write a framed payload, splitting it into command-sized chunks.
    pub fn write_payload(&mut self, slot: StorageSlot, frame: &[u8]) -> CardResult<()> {
        let binding = self
            .ops
            .store
            .ok_or(CardError::VendorCapabilityMissing("store_data"))?;
        for chunk in frame.chunks(MAX_CHUNK_BYTES) {
            trace!(len = chunk.len(), "storing chunk");
            let result = match binding {
                StoreBinding::StoreData => self.cmd.store_data(slot, chunk),
                StoreBinding::SetData => self.cmd.set_data(chunk),
            };
            result.map_err(|e| convert(e, Stage::Transfer))?;
        }
        Ok(())
    }

    /// Read a framed payload, issuing continuation reads until the frame's
    /// declared length is satisfied. The result is trimmed to the frame.
    pub fn read_payload(&mut self, slot: StorageSlot) -> CardResult<Vec<u8>> {
        let binding = self
            .ops
            .read
            .ok_or(CardError::VendorCapabilityMissing("get_data"))?;

        let mut buf = self.read_once(binding, slot)?;
        if buf.len() < 2 {
            return Err(CardError::MalformedRecord(format!(
                "frame too short: {} bytes",
                buf.len()
            )));
        }
        let total = 2 + u16::from_be_bytes([buf[0], buf[1]]) as usize;
        while buf.len() < total {
            let more = self.read_once(binding, slot)?;
            if more.is_empty() {
                return Err(CardError::MalformedRecord(format!(
                    "card returned {} of {} framed bytes",
                    buf.len(),
                    total
                )));
            }
            buf.extend_from_slice(&more);
        }
        buf.truncate(total);
        Ok(buf)
    }

    fn read_once(&mut self, binding: ReadBinding, slot: StorageSlot) -> CardResult<Vec<u8>> {
        let result = match binding {
            ReadBinding::GetData => self.cmd.get_data(slot),
            ReadBinding::GetNdef => self.cmd.get_ndef(),
        };
        result.map_err(|e| convert(e, Stage::Transfer))
    }
}

fn convert(err: CmdError, stage: Stage) -> CardError {
    match err {
        CmdError::Unsupported => CardError::VendorCapabilityMissing(stage.op_name()),
        CmdError::Rejected(code) => CardError::HandshakeRejected { stage, code },
        CmdError::Link(detail) => CardError::LinkLost(detail),
        CmdError::Transport(detail) => CardError::TransportUnavailable(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_prefers_first_shape() {
        let caps = Capabilities {
            unpair: true,
            unpair_all: true,
            pair_with_password: true,
            pair_with_key: true,
            store_data: true,
            set_data: true,
            get_data: true,
            get_ndef: true,
            ..Capabilities::default()
        };
        let ops = ResolvedOps::probe(&caps);
        assert_eq!(ops.unpair, UnpairBinding::Unpair);
        assert_eq!(ops.pair, Some(PairBinding::Password));
        assert_eq!(ops.store, Some(StoreBinding::StoreData));
        assert_eq!(ops.read, Some(ReadBinding::GetData));
    }

    #[test]
    fn test_probe_falls_back_to_alternate_shape() {
        let caps = Capabilities {
            unpair_all: true,
            pair_with_key: true,
            set_data: true,
            get_ndef: true,
            ..Capabilities::default()
        };
        let ops = ResolvedOps::probe(&caps);
        assert_eq!(ops.unpair, UnpairBinding::UnpairAll);
        assert_eq!(ops.pair, Some(PairBinding::Key));
        assert_eq!(ops.store, Some(StoreBinding::SetData));
        assert_eq!(ops.read, Some(ReadBinding::GetNdef));
    }

    #[test]
    fn test_probe_records_missing_operations() {
        let ops = ResolvedOps::probe(&Capabilities::default());
        assert_eq!(ops.unpair, UnpairBinding::None);
        assert_eq!(ops.pair, None);
        assert_eq!(ops.store, None);
        assert_eq!(ops.read, None);
        assert!(!ops.can_select);
    }
}
