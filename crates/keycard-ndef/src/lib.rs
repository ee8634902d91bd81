//! NDEF codec - record encoding and length-framed storage format
//!
//! This crate builds and parses the byte payload stored in a Keycard data
//! slot: a single NDEF message (URI record or MIME-typed credential record)
//! wrapped in a 2-byte big-endian length frame. Size ceilings are enforced
//! here, before any card I/O happens; oversized payloads are rejected, never
//! truncated.

use thiserror::Error;

/// MIME type used for credential records.
pub const VC_MIME_TYPE: &str = "application/vc+jwt";

/// Default ceiling on the raw credential token, in bytes.
pub const DEFAULT_MAX_CREDENTIAL_BYTES: usize = 1000;

/// Default ceiling on the framed record, in bytes. Matches the card's
/// chunked storage window.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 500;

/// Size ceilings for encoded payloads.
///
/// The credential ceiling applies to the raw token text; the record ceiling
/// applies to the full framed message. Both are checked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_credential_bytes: usize,
    pub max_record_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_credential_bytes: DEFAULT_MAX_CREDENTIAL_BYTES,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

/// Codec errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("credential too large: {actual} bytes exceeds the {limit}-byte credential limit")]
    CredentialTooLarge { actual: usize, limit: usize },

    #[error("record too large: framed message is {actual} bytes, the storage limit is {limit} bytes")]
    RecordTooLarge { actual: usize, limit: usize },

    #[error("malformed record: {0}")]
    Malformed(String),
}

// Record header flags.
const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const TNF_WELL_KNOWN: u8 = 0x01;
const TNF_MIME_MEDIA: u8 = 0x02;

/// RTD-URI abbreviation table, indexed by the identifier code byte.
/// Code 0x00 means "no abbreviation".
pub const URI_PREFIXES: &[&str] = &[
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

/// A single NDEF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Well-known URI record ("U"), stored with RTD-URI prefix compression.
    Uri(String),
    /// MIME-typed record; credentials use [`VC_MIME_TYPE`].
    Mime { mime_type: String, payload: Vec<u8> },
    /// Well-known Text record ("T").
    Text { lang: String, text: String },
    /// Any other record, carried through opaquely.
    Other {
        tnf: u8,
        record_type: Vec<u8>,
        payload: Vec<u8>,
    },
}

impl Record {
    /// Build a credential record from a raw signed token.
    pub fn credential(token: &str) -> Self {
        Record::Mime {
            mime_type: VC_MIME_TYPE.to_string(),
            payload: token.as_bytes().to_vec(),
        }
    }
}

/// Pick the longest matching RTD-URI prefix for `url`.
///
/// Returns the identifier code and the remainder of the URL; code 0 with the
/// full URL if nothing matches.
fn split_uri_prefix(url: &str) -> (u8, &str) {
    let mut best: (u8, &str) = (0, url);
    for (code, prefix) in URI_PREFIXES.iter().enumerate().skip(1) {
        if url.starts_with(prefix) && prefix.len() > (url.len() - best.1.len()) {
            best = (code as u8, &url[prefix.len()..]);
        }
    }
    best
}

fn record_parts(record: &Record) -> (u8, Vec<u8>, Vec<u8>) {
    match record {
        Record::Uri(url) => {
            let (code, rest) = split_uri_prefix(url);
            let mut payload = Vec::with_capacity(1 + rest.len());
            payload.push(code);
            payload.extend_from_slice(rest.as_bytes());
            (TNF_WELL_KNOWN, b"U".to_vec(), payload)
        }
        Record::Mime { mime_type, payload } => {
            (TNF_MIME_MEDIA, mime_type.as_bytes().to_vec(), payload.clone())
        }
        Record::Text { lang, text } => {
            let mut payload = Vec::with_capacity(1 + lang.len() + text.len());
            payload.push(lang.len() as u8);
            payload.extend_from_slice(lang.as_bytes());
            payload.extend_from_slice(text.as_bytes());
            (TNF_WELL_KNOWN, b"T".to_vec(), payload)
        }
        Record::Other {
            tnf,
            record_type,
            payload,
        } => (*tnf & TNF_MASK, record_type.clone(), payload.clone()),
    }
}

/// Serialize a single-record NDEF message.
///
/// Short-record form is used when the payload fits in one length byte;
/// larger payloads get the 4-byte length form.
pub fn encode_message(record: &Record) -> Vec<u8> {
    let (tnf, record_type, payload) = record_parts(record);
    let short = payload.len() <= 0xFF;

    let mut out = Vec::with_capacity(6 + record_type.len() + payload.len());
    let mut header = FLAG_MB | FLAG_ME | tnf;
    if short {
        header |= FLAG_SR;
    }
    out.push(header);
    out.push(record_type.len() as u8);
    if short {
        out.push(payload.len() as u8);
    } else {
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(&record_type);
    out.extend_from_slice(&payload);
    out
}

/// Wrap a message in the storage frame: 2-byte big-endian length, then the
/// message bytes. This framing is the wire contract for the card's data slot
/// and must round-trip exactly.
pub fn frame_message(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + message.len());
    out.extend_from_slice(&(message.len() as u16).to_be_bytes());
    out.extend_from_slice(message);
    out
}

/// Encode a URI record and frame it for storage.
pub fn encode_uri(url: &str, limits: &Limits) -> Result<Vec<u8>, CodecError> {
    encode(&Record::Uri(url.to_string()), limits)
}

/// Encode a credential record and frame it for storage.
///
/// The raw token is checked against the credential ceiling and the framed
/// result against the record ceiling; both checks run, in that order.
pub fn encode_credential(token: &str, limits: &Limits) -> Result<Vec<u8>, CodecError> {
    let size = token.len();
    if size > limits.max_credential_bytes {
        return Err(CodecError::CredentialTooLarge {
            actual: size,
            limit: limits.max_credential_bytes,
        });
    }
    encode(&Record::credential(token), limits)
}

/// Encode any record and frame it, enforcing the record ceiling.
pub fn encode(record: &Record, limits: &Limits) -> Result<Vec<u8>, CodecError> {
    let framed = frame_message(&encode_message(record));
    if framed.len() > limits.max_record_bytes {
        return Err(CodecError::RecordTooLarge {
            actual: framed.len(),
            limit: limits.max_record_bytes,
        });
    }
    Ok(framed)
}

/// Parse a framed payload read back from the card into its records.
///
/// Trailing bytes beyond the declared frame length are ignored (cards may
/// pad the slot); a frame declaring more bytes than are present is an error.
pub fn decode_records(framed: &[u8]) -> Result<Vec<Record>, CodecError> {
    if framed.len() < 2 {
        return Err(CodecError::Malformed(format!(
            "frame too short: {} bytes",
            framed.len()
        )));
    }
    let declared = u16::from_be_bytes([framed[0], framed[1]]) as usize;
    if framed.len() < 2 + declared {
        return Err(CodecError::Malformed(format!(
            "frame declares {} message bytes but only {} are present",
            declared,
            framed.len() - 2
        )));
    }
    decode_message(&framed[2..2 + declared])
}

/// Parse a framed payload and return its first record.
pub fn decode(framed: &[u8]) -> Result<Record, CodecError> {
    decode_records(framed)?
        .into_iter()
        .next()
        .ok_or_else(|| CodecError::Malformed("empty message".to_string()))
}

fn decode_message(bytes: &[u8]) -> Result<Vec<Record>, CodecError> {
    let mut records = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let header = bytes[i];
        i += 1;
        if header & FLAG_CF != 0 {
            return Err(CodecError::Malformed(
                "chunked record flag is not supported".to_string(),
            ));
        }
        let tnf = header & TNF_MASK;
        let short = header & FLAG_SR != 0;
        let has_id = header & FLAG_IL != 0;

        let need = 1 + if short { 1 } else { 4 } + if has_id { 1 } else { 0 };
        if i + need > bytes.len() {
            return Err(CodecError::Malformed("truncated record header".to_string()));
        }

        let type_len = bytes[i] as usize;
        i += 1;
        let payload_len = if short {
            let len = bytes[i] as usize;
            i += 1;
            len
        } else {
            let len = u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
            i += 4;
            len as usize
        };
        let id_len = if has_id {
            let len = bytes[i] as usize;
            i += 1;
            len
        } else {
            0
        };

        if i + type_len + id_len + payload_len > bytes.len() {
            return Err(CodecError::Malformed(format!(
                "record declares {} payload bytes past the end of the message",
                payload_len
            )));
        }

        let record_type = &bytes[i..i + type_len];
        i += type_len + id_len;
        let payload = &bytes[i..i + payload_len];
        i += payload_len;

        records.push(parse_record(tnf, record_type, payload)?);

        if header & FLAG_ME != 0 {
            break;
        }
    }

    if records.is_empty() {
        return Err(CodecError::Malformed("empty message".to_string()));
    }
    Ok(records)
}

fn parse_record(tnf: u8, record_type: &[u8], payload: &[u8]) -> Result<Record, CodecError> {
    match tnf {
        TNF_WELL_KNOWN if record_type == b"U" => {
            if payload.is_empty() {
                return Err(CodecError::Malformed("empty URI payload".to_string()));
            }
            let code = payload[0] as usize;
            let prefix = URI_PREFIXES.get(code).ok_or_else(|| {
                CodecError::Malformed(format!("unknown URI prefix code 0x{:02X}", code))
            })?;
            let rest = std::str::from_utf8(&payload[1..])
                .map_err(|_| CodecError::Malformed("URI is not valid UTF-8".to_string()))?;
            Ok(Record::Uri(format!("{prefix}{rest}")))
        }
        TNF_WELL_KNOWN if record_type == b"T" => {
            if payload.is_empty() {
                return Err(CodecError::Malformed("empty text payload".to_string()));
            }
            let lang_len = (payload[0] & 0x3F) as usize;
            if 1 + lang_len > payload.len() {
                return Err(CodecError::Malformed(
                    "text language code past end of payload".to_string(),
                ));
            }
            let lang = std::str::from_utf8(&payload[1..1 + lang_len])
                .map_err(|_| CodecError::Malformed("invalid language code".to_string()))?;
            let text = std::str::from_utf8(&payload[1 + lang_len..])
                .map_err(|_| CodecError::Malformed("text is not valid UTF-8".to_string()))?;
            Ok(Record::Text {
                lang: lang.to_string(),
                text: text.to_string(),
            })
        }
        TNF_MIME_MEDIA => {
            let mime_type = std::str::from_utf8(record_type)
                .map_err(|_| CodecError::Malformed("MIME type is not valid UTF-8".to_string()))?;
            Ok(Record::Mime {
                mime_type: mime_type.to_string(),
                payload: payload.to_vec(),
            })
        }
        _ => Ok(Record::Other {
            tnf,
            record_type: record_type.to_vec(),
            payload: payload.to_vec(),
        }),
    }
}

/// Pull a credential token out of a decoded message.
///
/// Prefers a MIME record whose type mentions `vc` or `jwt`; falls back to a
/// Text record whose body looks like a signed token (starts with `eyJ`).
pub fn extract_credential(records: &[Record]) -> Option<String> {
    for record in records {
        if let Record::Mime { mime_type, payload } = record {
            if mime_type == VC_MIME_TYPE || mime_type.contains("vc") || mime_type.contains("jwt") {
                if let Ok(token) = std::str::from_utf8(payload) {
                    let token = token.trim();
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }
    for record in records {
        if let Record::Text { text, .. } = record {
            let trimmed = text.trim();
            if trimmed.starts_with("eyJ") {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}
