//! storeproof CLI - operational inspection for the purchase pipeline.
//!
//! Decodes signed transactions, queries live Play purchase status, verifies
//! transaction journal chains, and lists file-backed ledger contents.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use storeproof_core::receipt::{PlayClient, PlayCredentials, SignedTransaction};
use storeproof_ledger::{read_journal, verify_chain, EntitlementStore, FileStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// storeproof - purchase verification and entitlement inspection.
///
/// The server-side pipeline records an entitlement only after a claim's
/// proof-of-purchase verifies against its originating platform. This tool
/// exposes the pieces for operators: proof decoding, live status queries,
/// journal chain verification, and ledger listings.
#[derive(Parser)]
#[command(name = "storeproof")]
#[command(version = VERSION)]
#[command(about = "Purchase verification and entitlement inspection")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a signed App Store transaction without verifying it
    Decode {
        /// The raw JWS proof
        proof: String,
    },

    /// Query the live Play purchase status for a token
    PlayStatus {
        /// Package name the purchase belongs to
        #[arg(long, default_value = "com.storeproof.reader")]
        package: String,

        /// Product id the token was issued for
        #[arg(long)]
        product: String,

        /// The purchase token
        #[arg(long)]
        token: String,

        /// Publisher API endpoint
        #[arg(long, default_value = "https://androidpublisher.googleapis.com")]
        endpoint: String,

        /// Service-account bearer token
        #[arg(long, env = "STOREPROOF_PLAY_TOKEN")]
        bearer_token: String,

        /// Request timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Verify the hash chain of a transaction journal
    VerifyJournal {
        /// Path to the JSONL journal file
        path: PathBuf,
    },

    /// List the contents of a file-backed entitlement ledger
    Ledger {
        /// Ledger directory
        dir: PathBuf,

        /// Only show purchases for this user
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Decode { proof } => {
            let signed = SignedTransaction::parse(&proof)?;
            println!("alg:        {}", signed.header.alg);
            if let Some(kid) = &signed.header.kid {
                println!("kid:        {kid}");
            }
            println!("claims:     {}", serde_json::to_string_pretty(&signed.claims)?);
            println!();
            println!("NOTE: decoded only — the signature was NOT verified.");
        }

        Commands::PlayStatus {
            package,
            product,
            token,
            endpoint,
            bearer_token,
            timeout,
        } => {
            let client = PlayClient::new(
                &endpoint,
                &package,
                PlayCredentials { bearer_token },
                Duration::from_secs(timeout),
            )?;
            let purchase = client.fetch_status(&product, &token).await?;
            println!("state:      {}", purchase.state_name());
            println!("{}", serde_json::to_string_pretty(&purchase)?);
        }

        Commands::VerifyJournal { path } => {
            let entries = read_journal(&path)?;
            let report = verify_chain(&entries);
            println!("entries:    {}", report.total_entries);
            println!("valid:      {}", report.valid);
            if let Some(seq) = report.first_tampered_sequence {
                println!("tampered:   first at sequence {seq}");
            }
            for error in &report.errors {
                println!("  - {error}");
            }
            if !report.valid {
                std::process::exit(1);
            }
        }

        Commands::Ledger { dir, user } => {
            let store = FileStore::open(&dir)?;
            let rows = match user {
                Some(user_id) => store.list_for_user(&user_id).await?,
                None => store.list_all().await?,
            };
            println!("rows: {}", store.count().await?);
            for row in rows {
                println!(
                    "{}  {:12}  {}  {} {}  user={}",
                    row.purchase_id,
                    row.transaction_id,
                    row.product_id,
                    row.price,
                    row.currency,
                    row.user_id
                );
            }
        }
    }

    Ok(())
}
