//! Orchestrator retry-policy properties, driven against the scripted
//! command set. Each attempt gets a fresh command set, the way each retry
//! gets a fresh tap.

mod common;

use common::{Call, ScriptedCommandSet};
use keycard_card::{
    perform_pin_check, perform_read, perform_write, Capabilities, CmdError, Outcome,
    PairingSecret, Pin, ReadOperation, ReadOutcome, WriteOperation,
};
use keycard_ndef::{encode_uri, Limits, Record};

fn secret() -> PairingSecret {
    PairingSecret::new("KeycardDefaultPairing")
}

fn pin() -> Pin {
    Pin::new("123456")
}

fn url_frame() -> Vec<u8> {
    encode_uri("https://example.com", &Limits::default()).unwrap()
}

fn link_lost() -> ScriptedCommandSet {
    let mut cmd = ScriptedCommandSet::full();
    cmd.pair_responses
        .push_back(Err(CmdError::Link("tag was lost".to_string())));
    cmd
}

#[test]
fn test_write_succeeds_first_tap() {
    let frame = url_frame();
    let mut op = WriteOperation::new(frame.clone(), secret(), pin());

    let cmd = ScriptedCommandSet::full();
    let written = cmd.written_log();

    match perform_write(cmd, &mut op) {
        Outcome::Success { confirmation_hex } => {
            assert!(confirmation_hex.starts_with("0010d1010c5504"));
            assert_eq!(confirmation_hex, hex::encode(&frame));
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(*written.borrow(), frame);
    assert_eq!(op.attempt(), 0);
}

#[test]
fn test_link_lost_twice_then_success() {
    let mut op = WriteOperation::new(url_frame(), secret(), pin());

    let first = perform_write(link_lost(), &mut op);
    assert!(matches!(first, Outcome::RetryableFailure { .. }));
    assert!(first.keep_polling());
    assert_eq!(op.attempt(), 1);

    let second = perform_write(link_lost(), &mut op);
    assert!(second.keep_polling());
    assert_eq!(op.attempt(), 2);

    let third = perform_write(ScriptedCommandSet::full(), &mut op);
    assert!(matches!(third, Outcome::Success { .. }));
    assert!(!third.keep_polling());
    assert_eq!(op.attempt(), 0, "attempt counter resets after success");
}

#[test]
fn test_link_lost_exhausts_retry_budget() {
    let mut op = WriteOperation::new(url_frame(), secret(), pin());

    assert!(perform_write(link_lost(), &mut op).keep_polling());
    assert!(perform_write(link_lost(), &mut op).keep_polling());

    let third = perform_write(link_lost(), &mut op);
    match &third {
        Outcome::TerminalFailure { reason } => {
            assert!(reason.contains("3 attempts"), "reason: {reason}");
        }
        other => panic!("expected terminal failure, got {other:?}"),
    }
    assert!(!third.keep_polling());

    // A fourth call must not touch the card.
    let cmd = ScriptedCommandSet::full();
    let calls = cmd.call_log();
    let fourth = perform_write(cmd, &mut op);
    assert!(matches!(fourth, Outcome::TerminalFailure { .. }));
    assert!(calls.borrow().is_empty(), "no card I/O after budget spent");
}

#[test]
fn test_wrong_pin_is_terminal_with_budget_remaining() {
    let mut op = WriteOperation::new(url_frame(), secret(), pin());

    let mut cmd = ScriptedCommandSet::full();
    cmd.verify_responses.push_back(Ok(false));

    let outcome = perform_write(cmd, &mut op);
    match &outcome {
        Outcome::TerminalFailure { reason } => assert!(reason.contains("wrong PIN")),
        other => panic!("expected terminal failure, got {other:?}"),
    }
    assert!(!outcome.keep_polling());
    assert_eq!(op.attempt(), 1, "only one attempt was made");
}

#[test]
fn test_card_rejection_is_terminal() {
    let mut op = WriteOperation::new(url_frame(), secret(), pin());

    let mut cmd = ScriptedCommandSet::full();
    cmd.open_responses.push_back(Err(CmdError::Rejected(0x6982)));

    let outcome = perform_write(cmd, &mut op);
    assert!(matches!(outcome, Outcome::TerminalFailure { .. }));
}

#[test]
fn test_missing_store_capability_is_terminal() {
    let mut op = WriteOperation::new(url_frame(), secret(), pin());

    let cmd = ScriptedCommandSet::new(Capabilities {
        select: true,
        unpair: true,
        pair_with_password: true,
        open_secure_channel: true,
        verify_pin: true,
        get_data: true,
        ..Capabilities::default()
    });

    match perform_write(cmd, &mut op) {
        Outcome::TerminalFailure { reason } => {
            assert!(reason.contains("store_data"), "reason: {reason}");
        }
        other => panic!("expected terminal failure, got {other:?}"),
    }
}

#[test]
fn test_large_frame_is_chunked() {
    let limits = Limits {
        max_record_bytes: 600,
        ..Limits::default()
    };
    let token = "a".repeat(520);
    let frame = keycard_ndef::encode_credential(&token, &limits).unwrap();
    assert!(frame.len() > keycard_card::MAX_CHUNK_BYTES);

    let mut op = WriteOperation::new(frame.clone(), secret(), pin());
    let cmd = ScriptedCommandSet::full();
    let calls = cmd.call_log();
    let written = cmd.written_log();

    assert!(matches!(
        perform_write(cmd, &mut op),
        Outcome::Success { .. }
    ));

    let store_calls = calls
        .borrow()
        .iter()
        .filter(|c| matches!(c, Call::StoreData(..)))
        .count();
    assert_eq!(
        store_calls,
        frame.len().div_ceil(keycard_card::MAX_CHUNK_BYTES)
    );
    assert_eq!(*written.borrow(), frame, "chunks reassemble to the frame");
}

#[test]
fn test_public_read_skips_handshake() {
    let frame = url_frame();
    let mut cmd = ScriptedCommandSet::full();
    cmd.stored = frame.clone();
    let calls = cmd.call_log();

    let mut op = ReadOperation::public();
    match perform_read(cmd, &mut op) {
        ReadOutcome::Success { frame_hex, records } => {
            assert_eq!(frame_hex, hex::encode(&frame));
            assert_eq!(records, vec![Record::Uri("https://example.com".to_string())]);
        }
        other => panic!("expected success, got {other:?}"),
    }

    let log = calls.borrow();
    assert!(log.iter().any(|c| matches!(c, Call::GetData(_))));
    assert!(!log.iter().any(|c| matches!(c, Call::PairPassword(_))));
    assert!(!log.iter().any(|c| matches!(c, Call::VerifyPin(_))));
}

#[test]
fn test_pin_gated_read_runs_full_handshake() {
    let frame = url_frame();
    let mut cmd = ScriptedCommandSet::full();
    cmd.stored = frame;
    let calls = cmd.call_log();

    let mut op = ReadOperation::pin_gated(secret(), pin());
    assert!(matches!(
        perform_read(cmd, &mut op),
        ReadOutcome::Success { .. }
    ));

    let log = calls.borrow();
    assert!(log.iter().any(|c| matches!(c, Call::PairPassword(_))));
    assert!(log.iter().any(|c| matches!(c, Call::VerifyPin(_))));
}

#[test]
fn test_chunked_read_reassembles_frame() {
    let frame = url_frame();
    let mut cmd = ScriptedCommandSet::full();
    cmd.stored = frame.clone();
    cmd.read_chunk = 5;
    let calls = cmd.call_log();

    let mut op = ReadOperation::public();
    match perform_read(cmd, &mut op) {
        ReadOutcome::Success { frame_hex, .. } => assert_eq!(frame_hex, hex::encode(&frame)),
        other => panic!("expected success, got {other:?}"),
    }

    let reads = calls
        .borrow()
        .iter()
        .filter(|c| matches!(c, Call::GetData(_)))
        .count();
    assert!(reads > 1, "multiple reads expected, got {reads}");
}

#[test]
fn test_read_of_garbage_is_terminal() {
    let mut cmd = ScriptedCommandSet::full();
    // Frame declares 4 message bytes of nonsense.
    cmd.stored = vec![0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF];

    let mut op = ReadOperation::public();
    match perform_read(cmd, &mut op) {
        ReadOutcome::TerminalFailure { reason } => {
            assert!(reason.contains("malformed"), "reason: {reason}");
        }
        other => panic!("expected terminal failure, got {other:?}"),
    }
}

#[test]
fn test_read_link_loss_is_retryable() {
    let mut cmd = ScriptedCommandSet::full();
    cmd.select_responses
        .push_back(Err(CmdError::Link("tag was lost".to_string())));

    let mut op = ReadOperation::public();
    let outcome = perform_read(cmd, &mut op);
    assert!(outcome.keep_polling());
    assert_eq!(op.attempt(), 1);
}

#[test]
fn test_pin_check_success_frees_pairing_slot() {
    let cmd = ScriptedCommandSet::full();
    let calls = cmd.call_log();

    let outcome = perform_pin_check(cmd, &secret(), &pin());
    assert!(matches!(outcome, Outcome::Success { .. }));

    // Final unpair after the verified handshake.
    assert_eq!(calls.borrow().last(), Some(&Call::Unpair));
}

#[test]
fn test_pin_check_wrong_pin_is_terminal() {
    let mut cmd = ScriptedCommandSet::full();
    cmd.verify_responses.push_back(Ok(false));

    let outcome = perform_pin_check(cmd, &secret(), &pin());
    assert!(matches!(outcome, Outcome::TerminalFailure { .. }));
    assert!(!outcome.keep_polling());
}

#[test]
fn test_pin_check_link_loss_is_retryable() {
    let outcome = perform_pin_check(link_lost(), &secret(), &pin());
    assert!(matches!(outcome, Outcome::RetryableFailure { .. }));
}

#[test]
fn test_successful_write_unpairs_afterwards() {
    let mut op = WriteOperation::new(url_frame(), secret(), pin());
    let cmd = ScriptedCommandSet::full();
    let calls = cmd.call_log();

    assert!(matches!(
        perform_write(cmd, &mut op),
        Outcome::Success { .. }
    ));
    assert_eq!(calls.borrow().last(), Some(&Call::Unpair));
}
