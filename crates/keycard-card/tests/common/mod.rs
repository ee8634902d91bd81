//! Scripted command set shared by the protocol tests.
//!
//! Unscripted calls succeed; tests push responses onto the per-operation
//! queues to simulate card rejections and link loss. Every call is recorded
//! so ordering properties can be asserted.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use keycard_card::{Capabilities, CmdError, CommandSet, StorageSlot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Select,
    Unpair,
    UnpairAll,
    PairPassword(String),
    PairKey(Vec<u8>),
    OpenChannel,
    VerifyPin(String),
    StoreData(u8, Vec<u8>),
    SetData(Vec<u8>),
    GetData(u8),
    GetNdef,
}

pub struct ScriptedCommandSet {
    pub caps: Capabilities,
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub written: Rc<RefCell<Vec<u8>>>,
    pub select_responses: VecDeque<Result<(), CmdError>>,
    pub unpair_responses: VecDeque<Result<(), CmdError>>,
    pub pair_responses: VecDeque<Result<(), CmdError>>,
    pub open_responses: VecDeque<Result<(), CmdError>>,
    pub verify_responses: VecDeque<Result<bool, CmdError>>,
    pub store_responses: VecDeque<Result<(), CmdError>>,
    pub stored: Vec<u8>,
    pub read_chunk: usize,
    read_cursor: usize,
}

impl ScriptedCommandSet {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            calls: Rc::new(RefCell::new(Vec::new())),
            written: Rc::new(RefCell::new(Vec::new())),
            select_responses: VecDeque::new(),
            unpair_responses: VecDeque::new(),
            pair_responses: VecDeque::new(),
            open_responses: VecDeque::new(),
            verify_responses: VecDeque::new(),
            store_responses: VecDeque::new(),
            stored: Vec::new(),
            read_chunk: usize::MAX,
            read_cursor: 0,
        }
    }

    /// The usual vendor surface: one shape per operation.
    pub fn full() -> Self {
        Self::new(Capabilities {
            select: true,
            unpair: true,
            pair_with_password: true,
            open_secure_channel: true,
            verify_pin: true,
            store_data: true,
            get_data: true,
            ..Capabilities::default()
        })
    }

    pub fn call_log(&self) -> Rc<RefCell<Vec<Call>>> {
        Rc::clone(&self.calls)
    }

    pub fn written_log(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.written)
    }

    fn log(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn serve_read(&mut self) -> Vec<u8> {
        let end = (self.read_cursor + self.read_chunk).min(self.stored.len());
        let chunk = self.stored[self.read_cursor..end].to_vec();
        self.read_cursor = end;
        chunk
    }
}

impl CommandSet for ScriptedCommandSet {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn select(&mut self) -> Result<(), CmdError> {
        self.log(Call::Select);
        self.select_responses.pop_front().unwrap_or(Ok(()))
    }

    fn unpair(&mut self) -> Result<(), CmdError> {
        self.log(Call::Unpair);
        self.unpair_responses.pop_front().unwrap_or(Ok(()))
    }

    fn unpair_all(&mut self) -> Result<(), CmdError> {
        self.log(Call::UnpairAll);
        self.unpair_responses.pop_front().unwrap_or(Ok(()))
    }

    fn pair_with_password(&mut self, password: &str) -> Result<(), CmdError> {
        self.log(Call::PairPassword(password.to_string()));
        self.pair_responses.pop_front().unwrap_or(Ok(()))
    }

    fn pair_with_key(&mut self, key: &[u8]) -> Result<(), CmdError> {
        self.log(Call::PairKey(key.to_vec()));
        self.pair_responses.pop_front().unwrap_or(Ok(()))
    }

    fn open_secure_channel(&mut self) -> Result<(), CmdError> {
        self.log(Call::OpenChannel);
        self.open_responses.pop_front().unwrap_or(Ok(()))
    }

    fn verify_pin(&mut self, pin: &str) -> Result<bool, CmdError> {
        self.log(Call::VerifyPin(pin.to_string()));
        self.verify_responses.pop_front().unwrap_or(Ok(true))
    }

    fn store_data(&mut self, slot: StorageSlot, chunk: &[u8]) -> Result<(), CmdError> {
        self.log(Call::StoreData(slot.id(), chunk.to_vec()));
        let result = self.store_responses.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.written.borrow_mut().extend_from_slice(chunk);
        }
        result
    }

    fn set_data(&mut self, chunk: &[u8]) -> Result<(), CmdError> {
        self.log(Call::SetData(chunk.to_vec()));
        let result = self.store_responses.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.written.borrow_mut().extend_from_slice(chunk);
        }
        result
    }

    fn get_data(&mut self, slot: StorageSlot) -> Result<Vec<u8>, CmdError> {
        self.log(Call::GetData(slot.id()));
        Ok(self.serve_read())
    }

    fn get_ndef(&mut self) -> Result<Vec<u8>, CmdError> {
        self.log(Call::GetNdef);
        Ok(self.serve_read())
    }
}
