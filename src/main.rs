//! Command line front end: file encryption under attribute policies.
//!
//! ```text
//! abe-envelope cpabe setup   --mpk master.pub --msk master.key
//! abe-envelope cpabe keygen  --mpk master.pub --msk master.key --dkey alice.key doctor age=42
//! abe-envelope cpabe encrypt --mpk master.pub --ptxt notes.txt "doctor and (a:1xxx or admin)"
//! abe-envelope cpabe decrypt --mpk master.pub --dkey alice.key --ctxt notes.txt.cpabe
//! abe-envelope policy compare age '>' 17
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use abe_envelope::policy::DEFAULT_BIT_WIDTH;
use abe_envelope::util::{read_key, write_key};
use abe_envelope::{
    compile, compile_assignment, Comparison, CpAbe, EncapsulationScheme, Envelope, KpAbe,
};
use anyhow::{bail, Context};
use ark_std::rand::SeedableRng;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{CryptoRng, Rng};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "abe-envelope", about = "Attribute-based file encryption", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ciphertext-policy scheme: policies on files, attributes in keys
    Cpabe {
        #[command(subcommand)]
        action: Action,
    },
    /// Key-policy scheme: attributes on files, policies in keys
    Kpabe {
        #[command(subcommand)]
        action: Action,
    },
    /// Compile numeric comparisons and assignments
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Subcommand)]
enum Action {
    /// Generate a master key pair
    Setup {
        #[arg(long)]
        mpk: PathBuf,
        #[arg(long)]
        msk: PathBuf,
    },
    /// Generate a decryption key
    Keygen {
        #[arg(long)]
        mpk: PathBuf,
        #[arg(long)]
        msk: PathBuf,
        #[arg(long)]
        dkey: PathBuf,
        /// Word size for `name=value` attributes
        #[arg(long, default_value_t = DEFAULT_BIT_WIDTH)]
        bits: u32,
        /// Attributes (cpabe) or policy (kpabe)
        #[arg(required = true)]
        predicate: Vec<String>,
    },
    /// Encrypt a file, writing `<ptxt>.<scheme>`
    Encrypt {
        #[arg(long)]
        mpk: PathBuf,
        #[arg(long)]
        ptxt: PathBuf,
        /// Word size for `name=value` attributes
        #[arg(long, default_value_t = DEFAULT_BIT_WIDTH)]
        bits: u32,
        /// Policy (cpabe) or attributes (kpabe)
        #[arg(required = true)]
        predicate: Vec<String>,
    },
    /// Decrypt a `.<scheme>` file next to it
    Decrypt {
        #[arg(long)]
        mpk: PathBuf,
        #[arg(long)]
        dkey: PathBuf,
        #[arg(long)]
        ctxt: PathBuf,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Print the formula for `NAME OP CONSTANT` (OP is one of < > <= >= ==)
    Compare {
        name: String,
        op: String,
        constant: u64,
        #[arg(long, default_value_t = DEFAULT_BIT_WIDTH)]
        bits: u32,
    },
    /// Print the bit-marker attributes for `NAME = VALUE`
    Assign {
        name: String,
        value: u64,
        #[arg(long, default_value_t = DEFAULT_BIT_WIDTH)]
        bits: u32,
    },
}

/// Maps positional arguments onto a scheme's key and encryption inputs.
trait CliScheme: EncapsulationScheme + Copy {
    fn keygen_args<R: Rng + CryptoRng>(
        self,
        msk: &Self::MasterSecretKey,
        mpk: &Self::PublicKey,
        args: &[String],
        bits: u32,
        rng: &mut R,
    ) -> anyhow::Result<Self::DecapsulationKey>;

    fn encrypt_args<P: Read, W: Write, R: Rng + CryptoRng>(
        self,
        mpk: &Self::PublicKey,
        plaintext: P,
        args: &[String],
        bits: u32,
        out: W,
        rng: &mut R,
    ) -> anyhow::Result<u64>;
}

impl CliScheme for CpAbe {
    fn keygen_args<R: Rng + CryptoRng>(
        self,
        msk: &Self::MasterSecretKey,
        mpk: &Self::PublicKey,
        args: &[String],
        bits: u32,
        rng: &mut R,
    ) -> anyhow::Result<Self::DecapsulationKey> {
        let attributes = expand_attributes(args, bits)?;
        Ok(self.keygen(msk, mpk, attributes.as_slice(), rng)?)
    }

    fn encrypt_args<P: Read, W: Write, R: Rng + CryptoRng>(
        self,
        mpk: &Self::PublicKey,
        plaintext: P,
        args: &[String],
        _bits: u32,
        out: W,
        rng: &mut R,
    ) -> anyhow::Result<u64> {
        let policy = policy_text(args);
        Ok(Envelope::new(self).encrypt_to(mpk, plaintext, policy.as_str(), out, rng)?)
    }
}

impl CliScheme for KpAbe {
    fn keygen_args<R: Rng + CryptoRng>(
        self,
        msk: &Self::MasterSecretKey,
        mpk: &Self::PublicKey,
        args: &[String],
        _bits: u32,
        rng: &mut R,
    ) -> anyhow::Result<Self::DecapsulationKey> {
        let policy = policy_text(args);
        Ok(self.keygen(msk, mpk, policy.as_str(), rng)?)
    }

    fn encrypt_args<P: Read, W: Write, R: Rng + CryptoRng>(
        self,
        mpk: &Self::PublicKey,
        plaintext: P,
        args: &[String],
        bits: u32,
        out: W,
        rng: &mut R,
    ) -> anyhow::Result<u64> {
        let attributes = expand_attributes(args, bits)?;
        Ok(Envelope::new(self).encrypt_to(mpk, plaintext, attributes.as_slice(), out, rng)?)
    }
}

/// `name=value` becomes the bit markers of `value`; other tokens pass through.
/// Attributes are upper-cased so keys and ciphertexts agree regardless of how
/// they were typed.
fn expand_attributes(args: &[String], bits: u32) -> anyhow::Result<Vec<String>> {
    let mut attributes = Vec::with_capacity(args.len());
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                let value: u64 = value
                    .parse()
                    .with_context(|| format!("`{arg}`: value is not an unsigned integer"))?;
                attributes.extend(
                    compile_assignment(name, value, bits)?
                        .iter()
                        .map(|literal| literal.to_uppercase()),
                );
            }
            None => attributes.push(arg.to_uppercase()),
        }
    }
    Ok(attributes)
}

/// Positional arguments joined into one policy, upper-cased like attributes.
fn policy_text(args: &[String]) -> String {
    args.join(" ").to_uppercase()
}

fn run<S: CliScheme>(scheme: S, action: Action) -> anyhow::Result<()> {
    let mut rng = StdRng::from_entropy();

    match action {
        Action::Setup { mpk, msk } => {
            let (public, secret) = scheme.setup(&mut rng);
            write_key(&mpk, &public)
                .with_context(|| format!("failed to write '{}'", mpk.display()))?;
            write_key(&msk, &secret)
                .with_context(|| format!("failed to write '{}'", msk.display()))?;
            tracing::info!(scheme = S::NAME, mpk = %mpk.display(), msk = %msk.display(), "master keys written");
        }
        Action::Keygen {
            mpk,
            msk,
            dkey,
            bits,
            predicate,
        } => {
            let public: S::PublicKey = load(&mpk)?;
            let secret: S::MasterSecretKey = load(&msk)?;
            let key = scheme.keygen_args(&secret, &public, &predicate, bits, &mut rng)?;
            write_key(&dkey, &key)
                .with_context(|| format!("failed to write '{}'", dkey.display()))?;
            tracing::info!(scheme = S::NAME, dkey = %dkey.display(), "decryption key written");
        }
        Action::Encrypt {
            mpk,
            ptxt,
            bits,
            predicate,
        } => {
            let public: S::PublicKey = load(&mpk)?;
            let input = File::open(&ptxt)
                .with_context(|| format!("failed to open '{}'", ptxt.display()))?;
            let mut target = ptxt.clone().into_os_string();
            target.push(".");
            target.push(S::NAME);
            let target = PathBuf::from(target);
            let output = File::create(&target)
                .with_context(|| format!("failed to create '{}'", target.display()))?;

            let written = scheme.encrypt_args(
                &public,
                BufReader::new(input),
                &predicate,
                bits,
                BufWriter::new(output),
                &mut rng,
            );
            if written.is_err() {
                let _ = fs::remove_file(&target);
            }
            let written = written?;
            tracing::info!(bytes = written, ctxt = %target.display(), "encrypted");
        }
        Action::Decrypt { mpk, dkey, ctxt } => {
            if ctxt.extension().and_then(|e| e.to_str()) != Some(S::NAME) {
                bail!(
                    "ciphertext file '{}' must end in .{}",
                    ctxt.display(),
                    S::NAME
                );
            }
            let target = ctxt.with_extension("");

            let public: S::PublicKey = load(&mpk)?;
            let key: S::DecapsulationKey = load(&dkey)?;
            let input = File::open(&ctxt)
                .with_context(|| format!("failed to open '{}'", ctxt.display()))?;

            // Denial surfaces here, before the output file exists.
            let chunks = Envelope::new(scheme).open(&public, &key, BufReader::new(input))?;

            let output = File::create(&target)
                .with_context(|| format!("failed to create '{}'", target.display()))?;
            let written = write_chunks(chunks, BufWriter::new(output));
            if written.is_err() {
                let _ = fs::remove_file(&target);
            }
            let written = written?;
            tracing::info!(bytes = written, ptxt = %target.display(), "decrypted");
        }
    }
    Ok(())
}

/// Drain decrypted chunks into `out`. The writer is dropped before returning.
fn write_chunks<I, W>(chunks: I, mut out: W) -> anyhow::Result<u64>
where
    I: Iterator<Item = abe_envelope::Result<Vec<u8>>>,
    W: Write,
{
    let mut written = 0u64;
    for chunk in chunks {
        let chunk = chunk?;
        out.write_all(&chunk)?;
        written += chunk.len() as u64;
    }
    out.flush()?;
    Ok(written)
}

fn load<T: ark_serialize::CanonicalDeserialize>(path: &Path) -> anyhow::Result<T> {
    read_key(path).with_context(|| format!("failed to read key '{}'", path.display()))
}

fn run_policy(action: PolicyAction) -> anyhow::Result<()> {
    match action {
        PolicyAction::Compare {
            name,
            op,
            constant,
            bits,
        } => {
            let comparison: Comparison = op.parse()?;
            println!("{}", compile(&name, comparison, constant, bits)?);
        }
        PolicyAction::Assign { name, value, bits } => {
            for literal in compile_assignment(&name, value, bits)? {
                println!("{literal}");
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "abe_envelope=debug"
    } else {
        "abe_envelope=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Cpabe { action } => run(CpAbe, action),
        Command::Kpabe { action } => run(KpAbe, action),
        Command::Policy { action } => run_policy(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn attributes_are_expanded_and_upper_cased() {
        let expanded = expand_attributes(&args(&["Doctor", "age=5"]), 4).unwrap();
        let mut expected = vec!["DOCTOR".to_string()];
        expected.extend(
            compile_assignment("age", 5, 4)
                .unwrap()
                .iter()
                .map(|literal| literal.to_uppercase()),
        );
        assert_eq!(expanded, expected);
    }

    #[test]
    fn bad_assignment_value_is_rejected() {
        assert!(expand_attributes(&args(&["age=old"]), 8).is_err());
        assert!(expand_attributes(&args(&["age=16"]), 4).is_err());
    }

    #[test]
    fn policy_case_matches_attribute_case() {
        let mut rng = StdRng::seed_from_u64(21);
        let (mpk, msk) = CpAbe.setup(&mut rng);
        let dk = CpAbe
            .keygen_args(&msk, &mpk, &args(&["doctor", "age=30"]), 8, &mut rng)
            .unwrap();

        let age = compile("Age", Comparison::Ge, 18, 8).unwrap();
        let policy = args(&["Doctor", "and", age.as_str()]);
        let mut ciphertext = Vec::new();
        CpAbe
            .encrypt_args(&mpk, &b"chart"[..], &policy, 8, &mut ciphertext, &mut rng)
            .unwrap();

        let recovered = Envelope::new(CpAbe)
            .decrypt(&mpk, &dk, ciphertext.as_slice())
            .unwrap();
        assert_eq!(recovered, b"chart");
    }
}
