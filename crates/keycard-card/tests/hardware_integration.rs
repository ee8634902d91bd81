//! Hardware-dependent integration tests
//!
//! These tests require a physical Keycard on a PC/SC reader.
//! They are ignored by default and must be explicitly run with:
//!
//!     cargo test --package keycard-card --test hardware_integration -- --ignored
//!
//! Or to run all tests including hardware tests:
//!
//!     cargo test --package keycard-card --test hardware_integration -- --include-ignored

use keycard_card::{
    perform_read, CardReader, CommandSet, PlainCommandSet, ReadOperation, ReadOutcome,
};

/// Test that we can connect to a card reader
///
/// **Requires**: Card reader connected (card not required)
#[test]
#[ignore = "requires hardware: card reader"]
fn test_connect_to_reader() {
    let result = CardReader::new();
    assert!(
        result.is_ok(),
        "Failed to connect to card reader. Is a reader connected?"
    );
}

/// Test that we can detect a tapped card
///
/// **Requires**: Card reader with card present
#[test]
#[ignore = "requires hardware: card present on reader"]
fn test_card_present() {
    let reader = CardReader::new().expect("Failed to connect to reader");
    let (session, reader_name) = reader.connect_first().expect("Failed to connect to card");

    println!("Connected to reader: {}", reader_name);
    assert!(session.is_open());
}

/// Test selecting the Keycard applet
///
/// **Requires**: Keycard present on reader
#[test]
#[ignore = "requires hardware: Keycard"]
fn test_select_applet() {
    let reader = CardReader::new().expect("Failed to connect to reader");
    let (session, _reader_name) = reader.connect_first().expect("Failed to connect to card");

    let mut cmd = PlainCommandSet::new(session);
    cmd.select().expect("Applet selection failed");
}

/// Public read of the card's data slot, end to end
///
/// **Requires**: Keycard with a stored payload
#[test]
#[ignore = "requires hardware: Keycard with stored data"]
fn test_public_read() {
    let reader = CardReader::new().expect("Failed to connect to reader");
    let (session, _reader_name) = reader.connect_first().expect("Failed to connect to card");

    let mut op = ReadOperation::public();
    match perform_read(PlainCommandSet::new(session), &mut op) {
        ReadOutcome::Success { frame_hex, records } => {
            println!("Frame: {}", frame_hex);
            println!("Records: {:?}", records);
            assert!(!records.is_empty());
        }
        other => panic!("read failed: {other:?}"),
    }
}
