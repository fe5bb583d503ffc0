use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use qrseal::{
    EnvelopeCodec, ProvisioningUri, detect_format, estimate_envelope_size, normalize,
    normalize_uri, parse_provisioning_uri,
};
use secrecy::SecretString;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Build and open payloads for scannable codes")]
struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the detected encoding of a TOTP secret.
    Detect { secret: String },
    /// Rewrite a TOTP secret into the canonical alphabet.
    Normalize(NormalizeArgs),
    /// Build an otpauth://totp provisioning link.
    Uri(UriArgs),
    /// Print the fields of a provisioning link as JSON.
    ParseUri { uri: String },
    /// Seal text under a password. Reads stdin when TEXT is omitted.
    Seal(SealArgs),
    /// Open a sealed envelope. Reads stdin when neither ENVELOPE nor --input is given.
    Open(OpenArgs),
    /// Estimate the envelope length for a plaintext of BYTES bytes.
    Estimate { bytes: usize },
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    #[arg(required_unless_present = "uri")]
    secret: Option<String>,
    /// Take the secret from a provisioning link instead.
    #[arg(long, conflicts_with = "secret")]
    uri: Option<String>,
}

#[derive(Args, Debug)]
struct UriArgs {
    #[arg(long)]
    secret: String,
    #[arg(long)]
    label: String,
    #[arg(long, default_value = "")]
    issuer: String,
    #[arg(long)]
    algorithm: Option<String>,
    #[arg(long)]
    digits: Option<u32>,
    #[arg(long)]
    period: Option<u64>,
}

#[derive(Args, Debug)]
struct PasswordArgs {
    #[arg(long, env = "QRSEAL_PASSWORD", hide_env_values = true)]
    password: String,
}

impl PasswordArgs {
    fn secret(self) -> SecretString {
        SecretString::from(self.password)
    }
}

#[derive(Args, Debug)]
struct SealArgs {
    text: Option<String>,
    #[command(flatten)]
    password: PasswordArgs,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(conflicts_with = "input")]
    envelope: Option<String>,
    /// Read the envelope from a file.
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,
    #[command(flatten)]
    password: PasswordArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    run(cli, &mut stdin, &mut stdout).await
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run<R, W>(cli: Cli, input: &mut R, out: &mut W) -> Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    match cli.command {
        Command::Detect { secret } => {
            writeln!(out, "{}", detect_format(&secret))?;
        }
        Command::Normalize(args) => {
            let normalized = match (args.uri, args.secret) {
                (Some(uri), _) => normalize_uri(&uri)?,
                (None, Some(secret)) if looks_like_link(&secret) => normalize_uri(&secret)?,
                (None, Some(secret)) => normalize(&secret)?,
                (None, None) => bail!("a secret or --uri is required"),
            };
            writeln!(out, "{normalized}")?;
        }
        Command::Uri(args) => {
            let secret = normalize(&args.secret)?;
            let mut uri = ProvisioningUri::new(secret, args.label, args.issuer);
            uri.algorithm = args.algorithm;
            uri.digits = args.digits;
            uri.period = args.period;
            writeln!(out, "{uri}")?;
        }
        Command::ParseUri { uri } => {
            let parsed = parse_provisioning_uri(&uri)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&parsed)?)?;
        }
        Command::Seal(args) => {
            let text = match args.text {
                Some(text) => text,
                None => read_stdin(input)?,
            };
            debug!(
                estimate = estimate_envelope_size(text.len()),
                "sealing text"
            );
            let envelope = EnvelopeCodec::new()
                .encrypt(&text, &args.password.secret())
                .await?;
            writeln!(out, "{envelope}")?;
        }
        Command::Open(args) => {
            let envelope = match (args.envelope, &args.input) {
                (Some(envelope), _) => envelope,
                (None, Some(path)) => fs::read_to_string(path)
                    .with_context(|| format!("failed to read envelope from '{}'", path.display()))?,
                (None, None) => read_stdin(input)?,
            };
            let plaintext = EnvelopeCodec::new()
                .decrypt(&envelope, &args.password.secret())
                .await?;
            writeln!(out, "{plaintext}")?;
        }
        Command::Estimate { bytes } => {
            writeln!(out, "{}", estimate_envelope_size(bytes))?;
        }
    }
    Ok(())
}

fn looks_like_link(value: &str) -> bool {
    value
        .trim_start()
        .get(..8)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("otpauth:"))
}

// Drops one trailing line ending so `echo text | qrseal seal` seals "text".
fn read_stdin<R: Read + ?Sized>(input: &mut R) -> Result<String> {
    let mut buf = String::new();
    input
        .read_to_string(&mut buf)
        .context("failed to read standard input")?;
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const PASSWORD: &str = "correct horse battery staple";

    async fn run_args(args: &[&str], stdin: &str) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("qrseal").chain(args.iter().copied()))?;
        let mut input = Cursor::new(stdin.as_bytes().to_vec());
        let mut out = Vec::new();
        run(cli, &mut input, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    #[tokio::test]
    async fn detects_and_normalizes() {
        assert_eq!(run_args(&["detect", "48656c6c6f"], "").await.unwrap(), "hexadecimal\n");
        assert_eq!(
            run_args(&["normalize", "jbsw y3dp ehpk 3pxp"], "").await.unwrap(),
            "JBSWY3DPEHPK3PXP\n"
        );
    }

    #[tokio::test]
    async fn normalizes_secret_inside_link() {
        let link = "otpauth://totp/Example:alice?secret=jbswy3dpehpk3pxp";
        assert_eq!(
            run_args(&["normalize", "--uri", link], "").await.unwrap(),
            "JBSWY3DPEHPK3PXP\n"
        );
        assert_eq!(
            run_args(&["normalize", link], "").await.unwrap(),
            "JBSWY3DPEHPK3PXP\n"
        );
    }

    #[tokio::test]
    async fn builds_and_parses_links() {
        let uri = run_args(
            &[
                "uri",
                "--secret",
                "48656c6c6f20576f726c64",
                "--label",
                "Example:alice",
                "--issuer",
                "Example",
                "--digits",
                "8",
            ],
            "",
        )
        .await
        .unwrap();
        assert_eq!(
            uri.trim_end(),
            "otpauth://totp/Example:alice?secret=JBSWY3DPEBLW64TMMQ&issuer=Example&digits=8"
        );

        let json = run_args(&["parse-uri", uri.trim_end()], "").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["secret"], "JBSWY3DPEBLW64TMMQ");
        assert_eq!(value["digits"], 8);
    }

    #[tokio::test]
    async fn seals_stdin_and_opens_from_file() {
        let envelope = run_args(&["seal", "--password", PASSWORD], "attack at dawn\n")
            .await
            .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(envelope.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let opened = run_args(&["open", "--input", &path, "--password", PASSWORD], "")
            .await
            .unwrap();
        assert_eq!(opened, "attack at dawn\n");
    }

    #[tokio::test]
    async fn wrong_password_reports_authentication_failure() {
        let envelope = run_args(&["seal", "attack at dawn", "--password", PASSWORD], "")
            .await
            .unwrap();
        let err = run_args(&["open", envelope.trim_end(), "--password", "wrong password"], "")
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<qrseal::CodecError>(),
            Some(&qrseal::CodecError::AuthenticationFailed)
        );
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = run_args(&["open", "--input", path.to_str().unwrap(), "--password", PASSWORD], "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read envelope"));
    }

    #[tokio::test]
    async fn estimates_size() {
        assert_eq!(run_args(&["estimate", "14"], "").await.unwrap(), "78\n");
    }

    #[test]
    fn read_stdin_drops_one_line_ending() {
        let mut input = Cursor::new(b"text\r\n".to_vec());
        assert_eq!(read_stdin(&mut input).unwrap(), "text");
        let mut input = Cursor::new(b"text\n\n".to_vec());
        assert_eq!(read_stdin(&mut input).unwrap(), "text\n");
    }
}
