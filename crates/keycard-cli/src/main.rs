use clap::{Parser, Subcommand};
use keycard_card::{PairingSecret, Pin};
use keycard_ndef::Limits;
use tracing_subscriber::EnvFilter;

mod discovery;
mod usecase;

#[derive(Parser)]
#[command(name = "keycard")]
#[command(about = "Write and read verifiable data on a Keycard data slot")]
#[command(version)]
struct Args {
    /// Pairing password shared with the card
    #[arg(
        long,
        global = true,
        env = "KEYCARD_PAIRING_PASSWORD",
        default_value = "KeycardDefaultPairing",
        hide_default_value = true
    )]
    pairing_password: String,

    /// Ceiling on the raw credential token, in bytes
    #[arg(long, global = true, default_value_t = keycard_ndef::DEFAULT_MAX_CREDENTIAL_BYTES)]
    max_credential_bytes: usize,

    /// Ceiling on the framed record, in bytes
    #[arg(long, global = true, default_value_t = keycard_ndef::DEFAULT_MAX_RECORD_BYTES)]
    max_record_bytes: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a URL record to the card's data slot
    WriteUrl {
        url: String,
        /// Card PIN, verified over the secure session before writing
        #[arg(long)]
        pin: String,
    },
    /// Validate a credential token and write it to the card's data slot
    WriteVc {
        token: String,
        /// Card PIN, verified over the secure session before writing
        #[arg(long)]
        pin: String,
    },
    /// Read the card's data slot and verify a stored credential
    ReadVc {
        /// Run the full PIN-verified handshake before reading
        #[arg(long)]
        pin_gated: bool,
        /// Card PIN, required with --pin-gated
        #[arg(long)]
        pin: Option<String>,
    },
    /// Verify the card PIN over a secure session
    VerifyPin {
        /// Card PIN
        #[arg(long)]
        pin: String,
    },
}

fn main() {
    // Initialize tracing subscriber with environment-based filtering
    // Set RUST_LOG=debug for detailed logs, RUST_LOG=trace for very verbose
    // Default: info level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let limits = Limits {
        max_credential_bytes: args.max_credential_bytes,
        max_record_bytes: args.max_record_bytes,
    };
    let pairing = PairingSecret::new(args.pairing_password);

    let ok = match args.command {
        Command::WriteUrl { url, pin } => {
            usecase::write_url::run(&url, pairing, Pin::new(pin), &limits)
        }
        Command::WriteVc { token, pin } => {
            usecase::write_vc::run(&token, pairing, Pin::new(pin), &limits)
        }
        Command::ReadVc { pin_gated, pin } => {
            let gate = if pin_gated {
                match pin {
                    Some(pin) => Some((pairing, Pin::new(pin))),
                    None => {
                        eprintln!("--pin is required with --pin-gated");
                        std::process::exit(2);
                    }
                }
            } else {
                None
            };
            usecase::read_vc::run(gate)
        }
        Command::VerifyPin { pin } => usecase::verify_pin::run(pairing, Pin::new(pin)),
    };

    if !ok {
        std::process::exit(1);
    }
}
