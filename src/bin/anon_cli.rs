//! Anonymization CLI Tool
//!
//! Run the anonymization engines over a JSON table (an array of
//! field -> value objects).
//!
//! Usage:
//!   anon-cli k-anonymize <records.json> --rules <rules.json> --quasi age,region --k 5
//!   anon-cli check <records.json> --quasi age,region --k 5
//!   anon-cli privatize <records.json> --fields age --bounds age=0:120 --epsilon 1.0
//!   anon-cli query <records.json> --query-type avg --field age --bounds age=0:120 --epsilon 0.5

use anon_core::{
    dp_query, k_anonymize, privatize_records, validate_k_anonymity, AggregateQuery, Bounds,
    GeneralizationRules, Mechanism, NoiseParams, NoiseRng, SensitivityBound,
};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "anon-cli")]
#[command(version = "0.1.0")]
#[command(about = "K-anonymity and differential privacy for JSON tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: json or compact
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Anonymize a table to k-anonymity via generalization
    KAnonymize {
        /// Input records (JSON array of objects)
        input: PathBuf,

        /// Generalization rules file (JSON map: field -> rule)
        #[arg(short, long)]
        rules: PathBuf,

        /// Quasi-identifier fields, in priority order
        #[arg(short, long, value_delimiter = ',')]
        quasi: Vec<String>,

        /// Sensitive attributes for disclosure-risk reporting
        #[arg(short, long, value_delimiter = ',')]
        sensitive: Vec<String>,

        /// Minimum equivalence class size
        #[arg(short, long)]
        k: usize,

        /// Per-field level cap, as field=level (repeatable)
        #[arg(long = "max-level")]
        max_levels: Vec<String>,
    },

    /// Check whether a table already satisfies k-anonymity
    Check {
        /// Input records (JSON array of objects)
        input: PathBuf,

        /// Quasi-identifier fields
        #[arg(short, long, value_delimiter = ',')]
        quasi: Vec<String>,

        /// Minimum equivalence class size
        #[arg(short, long)]
        k: usize,
    },

    /// Add calibrated noise to numeric fields of every record
    Privatize {
        /// Input records (JSON array of objects)
        input: PathBuf,

        /// Numeric fields to privatize
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Declared bounds, as field=lower:upper (repeatable)
        #[arg(short, long)]
        bounds: Vec<String>,

        /// Privacy parameter epsilon
        #[arg(short, long)]
        epsilon: f64,

        /// Failure probability delta (required for gaussian)
        #[arg(short, long)]
        delta: Option<f64>,

        /// Noise mechanism: laplace or gaussian
        #[arg(short, long, default_value = "laplace")]
        mechanism: String,

        /// RNG seed for reproducible output (omit for OS entropy)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Release one noisy aggregate over the table
    Query {
        /// Input records (JSON array of objects)
        input: PathBuf,

        /// Aggregate: count, sum, avg, histogram or percentile
        #[arg(short = 't', long)]
        query_type: String,

        /// Field the aggregate runs over (not needed for count)
        #[arg(long)]
        field: Option<String>,

        /// Percentile in [0, 100] (percentile queries only)
        #[arg(short, long)]
        percentile: Option<f64>,

        /// Declared bounds, as field=lower:upper (repeatable)
        #[arg(short, long)]
        bounds: Vec<String>,

        /// Privacy parameter epsilon
        #[arg(short, long)]
        epsilon: f64,

        /// Failure probability delta (required for gaussian)
        #[arg(short, long)]
        delta: Option<f64>,

        /// Noise mechanism: laplace or gaussian
        #[arg(short, long, default_value = "laplace")]
        mechanism: String,

        /// RNG seed for reproducible output (omit for OS entropy)
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let result: serde_json::Value = match cli.command {
        Commands::KAnonymize { input, rules, quasi, sensitive, k, max_levels } => {
            let records = load_records(&input)?;
            let rules: GeneralizationRules = serde_json::from_str(&fs::read_to_string(&rules)?)?;
            let max_levels = parse_max_levels(&max_levels)?;
            let result = k_anonymize(&records, &quasi, &sensitive, k, &max_levels, &rules)?;
            serde_json::to_value(result)?
        }
        Commands::Check { input, quasi, k } => {
            let records = load_records(&input)?;
            serde_json::to_value(validate_k_anonymity(&records, &quasi, k))?
        }
        Commands::Privatize { input, fields, bounds, epsilon, delta, mechanism, seed } => {
            let records = load_records(&input)?;
            let bounds = parse_bounds(&bounds)?;
            let params = noise_params(&mechanism, epsilon, delta)?;
            let mut rng = make_rng(seed);
            let table = privatize_records(&records, &fields, &bounds, &params, &mut rng)?;
            serde_json::to_value(table)?
        }
        Commands::Query {
            input,
            query_type,
            field,
            percentile,
            bounds,
            epsilon,
            delta,
            mechanism,
            seed,
        } => {
            let records = load_records(&input)?;
            let query = AggregateQuery::parse(&query_type, field.as_deref(), percentile)?;
            let bounds = parse_bounds(&bounds)?;
            let params = noise_params(&mechanism, epsilon, delta)?;
            let mut rng = make_rng(seed);
            let release = dp_query(&records, &query, &params, &bounds, &mut rng)?;
            serde_json::to_value(release)?
        }
    };

    let output_str = match cli.format.as_str() {
        "compact" => serde_json::to_string(&result)?,
        _ => serde_json::to_string_pretty(&result)?,
    };

    if let Some(output_path) = cli.output {
        fs::write(&output_path, &output_str)?;
        eprintln!("Output written to: {}", output_path.display());
    } else {
        println!("{}", output_str);
    }

    Ok(())
}

fn load_records(path: &PathBuf) -> Result<Vec<anon_core::Record>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let records: Vec<anon_core::Record> = serde_json::from_str(&content)?;
    Ok(records)
}

fn make_rng(seed: Option<u64>) -> NoiseRng {
    match seed {
        Some(seed) => NoiseRng::seeded(seed),
        None => NoiseRng::from_entropy(),
    }
}

fn noise_params(
    mechanism: &str,
    epsilon: f64,
    delta: Option<f64>,
) -> Result<NoiseParams, Box<dyn std::error::Error>> {
    let mechanism = Mechanism::from_name(mechanism)
        .ok_or_else(|| format!("Unknown mechanism: {}. Valid: laplace, gaussian", mechanism))?;
    Ok(NoiseParams { epsilon, delta, mechanism })
}

/// Parse repeated `field=lower:upper` bound declarations.
fn parse_bounds(entries: &[String]) -> Result<Bounds, Box<dyn std::error::Error>> {
    let mut bounds = Bounds::new();
    for entry in entries {
        let (field, range) = entry
            .split_once('=')
            .ok_or_else(|| format!("Invalid bound '{}': expected field=lower:upper", entry))?;
        let (lower, upper) = range
            .split_once(':')
            .ok_or_else(|| format!("Invalid bound '{}': expected field=lower:upper", entry))?;
        let bound = SensitivityBound::new(lower.trim().parse()?, upper.trim().parse()?)?;
        bounds.insert(field.trim().to_string(), bound);
    }
    Ok(bounds)
}

/// Parse repeated `field=level` level caps.
fn parse_max_levels(entries: &[String]) -> Result<BTreeMap<String, usize>, Box<dyn std::error::Error>> {
    let mut levels = BTreeMap::new();
    for entry in entries {
        let (field, level) = entry
            .split_once('=')
            .ok_or_else(|| format!("Invalid level cap '{}': expected field=level", entry))?;
        levels.insert(field.trim().to_string(), level.trim().parse()?);
    }
    Ok(levels)
}
