//! genopool: command-line front end for the aggregation protocol.
//!
//! Each subcommand is one protocol step; files carry data between roles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use genopool::adapters::files::{self, Sensitivity};
use genopool::adapters::sanitize::SanitizingMakeWriter;
use genopool::adapters::{BfvAdapter, VcfReader};
use genopool::application::{
    analyze, AggregationReference, AggregationService, ContextManager, ContributorService,
    InterpretationService, SecretExport,
};
use genopool::config::{LogMode, RuntimeConfig};
use genopool::domain::{
    CiphertextVector, ContextParameters, DisclosurePolicy, Panel, PanelCatalogue, Passphrase,
};

#[derive(Parser)]
#[command(name = "genopool", version, about = "Encrypted allele-frequency aggregation")]
struct Cli {
    /// Additional panel definition files (JSON).
    #[arg(long = "panel-file", global = true)]
    panel_files: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available variant panels.
    Panels,
    /// Generate a context pair (key holder).
    Keygen(KeygenArgs),
    /// Encode a VCF into a dosage vector without encrypting it (contributor).
    Encode(GenomeArgs),
    /// Encode and encrypt a VCF under a public context (contributor).
    Encrypt(EncryptArgs),
    /// Sum encrypted contributions (aggregator).
    Aggregate(AggregateArgs),
    /// Decrypt an aggregate and report allele frequencies (key holder).
    Decrypt(DecryptArgs),
    /// Analyze one VCF locally, without encryption.
    Local(LocalArgs),
}

#[derive(Args)]
struct KeygenArgs {
    /// Output path for the public context.
    #[arg(long)]
    public: PathBuf,
    /// Output path for the private context.
    #[arg(long)]
    private: PathBuf,
    #[arg(long, default_value_t = ContextParameters::default().degree)]
    degree: usize,
    #[arg(long, default_value_t = ContextParameters::default().plaintext_modulus)]
    plaintext_modulus: u64,
}

#[derive(Args)]
struct GenomeArgs {
    /// VCF file (plain or .gz).
    #[arg(long)]
    vcf: PathBuf,
    /// Panel name.
    #[arg(long)]
    panel: String,
    /// Output path (JSON).
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args)]
struct EncryptArgs {
    #[command(flatten)]
    genome: GenomeArgs,
    /// Public context file.
    #[arg(long)]
    public: PathBuf,
}

#[derive(Args)]
struct AggregateArgs {
    /// Public context file.
    #[arg(long)]
    public: PathBuf,
    /// Panel name.
    #[arg(long)]
    panel: String,
    /// Output path for the aggregate ciphertext.
    #[arg(long)]
    out: PathBuf,
    /// Use parallel tree reduction.
    #[arg(long)]
    parallel: bool,
    /// Skip contributions that fail validation instead of aborting.
    #[arg(long)]
    skip_invalid: bool,
    /// Contribution files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Args)]
struct DecryptArgs {
    /// Private context file.
    #[arg(long)]
    private: PathBuf,
    /// Panel name.
    #[arg(long)]
    panel: String,
    /// Aggregate ciphertext file.
    #[arg(long)]
    input: PathBuf,
    /// Write the report as JSON here instead of printing a table.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Refuse to release aggregates over fewer contributors.
    #[arg(long)]
    min_contributors: Option<u64>,
}

#[derive(Args)]
struct LocalArgs {
    #[arg(long)]
    vcf: PathBuf,
    #[arg(long)]
    panel: String,
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env()?;

    // Logs go to stderr or a file; stdout carries command output.
    let (writer, _guard) = match &config.log_mode {
        LogMode::File(path) => {
            if let Some(parent) = path.parent() {
                // Best-effort: a missing directory surfaces on open below.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let mut panel_files = config.panel_files.clone();
    panel_files.extend(cli.panel_files.iter().cloned());
    let catalogue = load_catalogue(&panel_files)?;
    let engine = Arc::new(BfvAdapter::new());

    match cli.command {
        Command::Panels => list_panels(&catalogue),
        Command::Keygen(args) => keygen(&engine, &args, config.key_password.as_ref()),
        Command::Encode(args) => encode(&engine, &catalogue, &args),
        Command::Encrypt(args) => encrypt(&engine, &catalogue, &args),
        Command::Aggregate(args) => aggregate(&engine, &catalogue, &args),
        Command::Decrypt(args) => {
            let policy = args
                .min_contributors
                .map_or(config.disclosure, |min_contributors| DisclosurePolicy {
                    min_contributors,
                });
            decrypt(&engine, &catalogue, &args, policy, config.key_password.as_ref())
        }
        Command::Local(args) => local(&engine, &catalogue, &args),
    }
}

fn load_catalogue(extra: &[PathBuf]) -> Result<PanelCatalogue> {
    let mut catalogue = PanelCatalogue::builtin()?;
    for path in extra {
        catalogue
            .load_file(path)
            .with_context(|| format!("loading panels from {}", path.display()))?;
    }
    Ok(catalogue)
}

fn panel<'a>(catalogue: &'a PanelCatalogue, name: &str) -> Result<&'a Panel> {
    match catalogue.get(name) {
        Some(panel) => Ok(panel),
        None => {
            let known: Vec<&str> = catalogue.iter().map(|(n, _)| n).collect();
            bail!("unknown panel '{name}' (available: {})", known.join(", "))
        }
    }
}

fn read_public(engine: &Arc<BfvAdapter>, path: &Path) -> Result<genopool::PublicContext> {
    let bytes = files::read_blob(path)?;
    let ctx = ContextManager::new(Arc::clone(engine))
        .deserialize_public(&bytes)
        .with_context(|| format!("loading public context {}", path.display()))?;
    Ok(ctx)
}

fn list_panels(catalogue: &PanelCatalogue) -> Result<()> {
    println!("{:<26} {:>8}  {:<40} VERSION", "PANEL", "VARIANTS", "TITLE");
    for (name, panel) in catalogue.iter() {
        println!(
            "{:<26} {:>8}  {:<40} {}",
            name,
            panel.schema.len(),
            panel.title,
            panel.schema.version()
        );
    }
    Ok(())
}

fn keygen(
    engine: &Arc<BfvAdapter>,
    args: &KeygenArgs,
    passphrase: Option<&Passphrase>,
) -> Result<()> {
    let manager = ContextManager::new(Arc::clone(engine));
    let parameters = ContextParameters {
        degree: args.degree,
        plaintext_modulus: args.plaintext_modulus,
        ..ContextParameters::default()
    };
    let (public, private) = manager.generate(&parameters)?;

    files::write_blob(&args.public, &manager.serialize_public(&public)?, Sensitivity::Public)?;
    files::write_private_context(
        &args.private,
        &manager.serialize_private(&private, SecretExport::IncludeSecret)?,
        passphrase,
    )?;

    println!("context {}", public.fingerprint());
    println!("  public:  {}", args.public.display());
    let sealing = if passphrase.is_some() { "sealed" } else { "unsealed, keep this file secret" };
    println!("  private: {} ({sealing})", args.private.display());
    Ok(())
}

fn encode(
    engine: &Arc<BfvAdapter>,
    catalogue: &PanelCatalogue,
    args: &GenomeArgs,
) -> Result<()> {
    let panel = panel(catalogue, &args.panel)?;
    let service = ContributorService::new(Arc::clone(engine));
    let mut source = VcfReader::open(&args.vcf)?;
    let vector = service.encode(&mut source, &panel.schema)?;

    files::write_json(&args.out, &vector)?;
    println!("encoded {} variants for {}", vector.len(), vector.schema_version());
    Ok(())
}

fn encrypt(
    engine: &Arc<BfvAdapter>,
    catalogue: &PanelCatalogue,
    args: &EncryptArgs,
) -> Result<()> {
    let panel = panel(catalogue, &args.genome.panel)?;
    let public = read_public(engine, &args.public)?;
    let service = ContributorService::new(Arc::clone(engine));

    let mut source = VcfReader::open(&args.genome.vcf)?;
    let ct = service.contribute(&mut source, &panel.schema, &public)?;

    files::write_ciphertext(&args.genome.out, &ct)?;
    println!(
        "encrypted contribution for {} ({} bytes) -> {}",
        ct.schema_version(),
        ct.size_bytes(),
        args.genome.out.display()
    );
    Ok(())
}

fn aggregate(
    engine: &Arc<BfvAdapter>,
    catalogue: &PanelCatalogue,
    args: &AggregateArgs,
) -> Result<()> {
    let panel = panel(catalogue, &args.panel)?;
    let public = read_public(engine, &args.public)?;
    let reference = AggregationReference::new(&panel.schema, &public);
    let service = AggregationService::new(Arc::clone(engine), &public)?;

    let mut inputs: Vec<CiphertextVector> = args
        .inputs
        .iter()
        .map(|path| files::read_ciphertext(path))
        .collect::<std::result::Result<_, _>>()?;

    if args.skip_invalid {
        let rejected = service.validate_each(&inputs, &reference);
        for (index, err) in &rejected {
            eprintln!("skipping {}: {err}", args.inputs[*index].display());
        }
        let mut index = 0;
        inputs.retain(|_| {
            let keep = !rejected.iter().any(|(i, _)| *i == index);
            index += 1;
            keep
        });
    }

    let sum = if args.parallel {
        service.aggregate_parallel(&inputs, &reference)?
    } else {
        service.aggregate(&inputs, &reference)?
    };

    files::write_ciphertext(&args.out, &sum)?;
    println!(
        "aggregated {} contributions for {} -> {}",
        inputs.len(),
        sum.schema_version(),
        args.out.display()
    );
    Ok(())
}

fn decrypt(
    engine: &Arc<BfvAdapter>,
    catalogue: &PanelCatalogue,
    args: &DecryptArgs,
    policy: DisclosurePolicy,
    passphrase: Option<&Passphrase>,
) -> Result<()> {
    let panel = panel(catalogue, &args.panel)?;
    let bytes = files::read_private_context(&args.private, passphrase)?;
    let private = ContextManager::new(Arc::clone(engine))
        .deserialize_private(&bytes)
        .with_context(|| format!("loading private context {}", args.private.display()))?;
    let aggregate = files::read_ciphertext(&args.input)?;

    let service = InterpretationService::new(Arc::clone(engine), policy);
    let report = service.release(&aggregate, &private, &panel.schema)?;

    if let Some(out) = &args.out {
        files::write_json(out, &report)?;
        println!("report written to {}", out.display());
        return Ok(());
    }

    println!(
        "{}: {} contributors",
        report.schema_version, report.contributor_count
    );
    println!("{:<16} {:<10} {:>8} {:>10}", "VARIANT", "GENE", "COUNT", "FREQUENCY");
    for v in &report.variants {
        println!(
            "{:<16} {:<10} {:>8} {:>10}",
            v.spec.id.to_string(),
            v.spec.gene(),
            v.alt_allele_count,
            v.allele_frequency.to_string()
        );
    }
    Ok(())
}

fn local(engine: &Arc<BfvAdapter>, catalogue: &PanelCatalogue, args: &LocalArgs) -> Result<()> {
    let panel = panel(catalogue, &args.panel)?;
    let service = ContributorService::new(Arc::clone(engine));
    let mut source = VcfReader::open(&args.vcf)?;
    let vector = service.encode(&mut source, &panel.schema)?;
    let report = analyze(&vector, &panel.schema)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} (local, unencrypted)", panel.title);
    println!(
        "{:<16} {:<10} {:>5} {:>6}  {:>9}  RISK",
        "VARIANT", "GENE", "COUNT", "FREQ", "LOG-ODDS"
    );
    for v in &report.variants {
        let log_odds = v.log_odds.map_or_else(|| "-".to_string(), |x| format!("{x:.3}"));
        println!(
            "{:<16} {:<10} {:>5} {:>6.3}  {:>9}  {}",
            v.spec.id.to_string(),
            v.spec.gene(),
            v.genotype_count,
            v.allele_frequency,
            log_odds,
            v.risk_level.description()
        );
    }
    if let Some(or) = report.combined_odds_ratio() {
        println!("combined odds ratio: {or:.3}");
    }
    Ok(())
}
