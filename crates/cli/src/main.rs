use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use otpgen::{GenerationInput, OneTimePassword, OtpConfig, OtpError, OtpKind, PatternRegistry};
use tracing_subscriber::EnvFilter;

/// Generate and check HOTP/TOTP one-time passcodes
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// print the otpauth:// provisioning URI
    Key(OtpArgs),
    /// print the acceptable codes, current time step first
    Code {
        #[command(flatten)]
        otp: OtpArgs,
        #[command(flatten)]
        input: InputArgs,
    },
    /// check a code, exiting with status 1 if it is rejected
    Validate {
        code: String,
        #[command(flatten)]
        otp: OtpArgs,
        #[command(flatten)]
        input: InputArgs,
    },
}

/// Flags override the values read from `--config`.
#[derive(Debug, Args)]
struct OtpArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// hotp or totp
    #[arg(long)]
    kind: Option<OtpKind>,
    #[arg(long)]
    issuer: Option<String>,
    #[arg(long)]
    account_name: Option<String>,
    /// raw secret
    #[arg(long)]
    secret: Option<String>,
    /// base32 secret, preferred over --secret
    #[arg(long)]
    encoded_secret: Option<String>,
    /// size in bytes of a generated secret
    #[arg(long)]
    secret_size: Option<usize>,
    /// time step in seconds
    #[arg(long)]
    period: Option<u64>,
    /// adjacent time steps accepted on each side
    #[arg(long)]
    skew: Option<u64>,
    #[arg(long)]
    digits: Option<u8>,
    /// SHA1, SHA256, SHA512 or MD5
    #[arg(long)]
    algorithm: Option<String>,
    /// standard, steam or mobile
    #[arg(long)]
    pattern: Option<String>,
    /// host segment of the provisioning URI
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Args)]
struct InputArgs {
    /// counter (HOTP) or time step (TOTP)
    #[arg(long)]
    counter: Option<u64>,
    /// salt (PIN) for the mobile pattern
    #[arg(long)]
    salt: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration file")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Otp(#[from] OtpError),
}

impl OtpArgs {
    fn into_config(self) -> Result<OtpConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|source| CliError::Io {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&json)?
            }
            None => OtpConfig::default(),
        };

        if let Some(kind) = self.kind {
            config.kind = kind;
        }
        if let Some(issuer) = self.issuer {
            config.issuer = issuer;
        }
        if let Some(account_name) = self.account_name {
            config.account_name = account_name;
        }
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm.parse()?;
        }
        if let Some(pattern) = self.pattern {
            config.pattern = pattern.into();
        }
        if let Some(skew) = self.skew {
            config.skew = skew;
        }
        config.secret = self.secret.or(config.secret);
        config.encoded_secret = self.encoded_secret.or(config.encoded_secret);
        config.secret_size = self.secret_size.or(config.secret_size);
        config.period = self.period.or(config.period);
        config.digits = self.digits.or(config.digits);
        config.host = self.host.or(config.host);
        Ok(config)
    }
}

impl InputArgs {
    fn into_input(self) -> GenerationInput {
        let mut input = GenerationInput::new();
        if let Some(counter) = self.counter {
            input = input.with_counter(counter);
        }
        if let Some(salt) = self.salt {
            input = input.with_salt(salt);
        }
        input
    }
}

fn engine(args: OtpArgs) -> Result<Box<dyn OneTimePassword>, CliError> {
    let config = args.into_config()?;
    tracing::debug!(kind = %config.kind, pattern = %config.pattern, "building engine");
    Ok(otpgen::new_instance(&config, PatternRegistry::builtin())?)
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Key(otp) => {
            println!("{}", engine(otp)?.key_uri()?);
        }
        Commands::Code { otp, input } => {
            for code in engine(otp)?.generate_code(&input.into_input())? {
                println!("{code}");
            }
        }
        Commands::Validate { code, otp, input } => {
            match engine(otp)?.validate(&code, &input.into_input()) {
                Ok(true) => println!("valid"),
                Ok(false) | Err(OtpError::NoMatch) => {
                    println!("invalid");
                    return Ok(ExitCode::from(1));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
