use clap::{Parser, Subcommand};
use warden_core::auth::token::DEFAULT_MIN_SECRET_LEN;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Warden operator tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt a secret read from stdin for storage in directory settings.
    EncryptSecret {
        #[arg(long, env = "WARDEN_ENCRYPTION_KEY", hide_env_values = true)]
        key: String,
    },

    /// Decrypt a stored value read from stdin.
    DecryptSecret {
        #[arg(long, env = "WARDEN_ENCRYPTION_KEY", hide_env_values = true)]
        key: String,
    },

    /// Validate the token signing secret with the server's startup rule.
    CheckSigningSecret {
        #[arg(long, env = "WARDEN_JWT_SECRET", hide_env_values = true)]
        secret: Option<String>,

        #[arg(long, env = "WARDEN_JWT_MIN_SECRET_LEN", default_value_t = DEFAULT_MIN_SECRET_LEN)]
        min_len: usize,

        /// Accept weak secrets with a warning.
        #[arg(long, env = "WARDEN_ALLOW_INSECURE_SECRET")]
        allow_insecure: bool,
    },

    Version,
}
