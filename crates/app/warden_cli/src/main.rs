// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::io::Read;

use clap::Parser;
use cli::{Cli, Commands};
use secrecy::SecretString;
use warden_core::auth::validate_signing_secret;
use warden_core::crypto::SecretCodec;

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Stdin without the trailing line break.
fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn codec(key: String) -> Result<SecretCodec> {
    if key.trim().is_empty() {
        return Err(Error::Custom("WARDEN_ENCRYPTION_KEY must be set".into()));
    }
    Ok(SecretCodec::new(&SecretString::from(key)))
}

fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::EncryptSecret { key } => {
            let codec = codec(key)?;
            let plaintext = read_stdin()?;
            if plaintext.is_empty() {
                return Err(Error::Custom("nothing to encrypt on stdin".into()));
            }
            println!("{}", codec.encrypt(&plaintext)?);
        }
        Commands::DecryptSecret { key } => {
            let codec = codec(key)?;
            let encrypted = read_stdin()?;
            println!("{}", codec.decrypt(encrypted.trim())?);
        }
        Commands::CheckSigningSecret {
            secret,
            min_len,
            allow_insecure,
        } => {
            let secret = SecretString::from(secret.unwrap_or_default());
            validate_signing_secret(&secret, min_len, allow_insecure)?;
            log::info!("signing secret accepted");
            println!("ok");
        }
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
