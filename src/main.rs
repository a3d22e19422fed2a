//! hlo-arith CLI
//!
//! Lowers `mhlo.rng_get_and_update_state` in a textual IR module to
//! arithmetic, memref and tensor ops.
//!
//! # Usage
//!
//! ```bash
//! # Print the lowered module
//! hlo-arith input.mlir -o lowered.mlir
//!
//! # Lower, then evaluate @main three times with argument 5
//! hlo-arith input.mlir --emit run --entry main --arg 5 --calls 3
//!
//! # Custom counter and partial conversion
//! hlo-arith input.mlir --state-symbol my_state --seed 0x1234 --partial
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hlo_arith::{ConversionMode, LowerConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitType {
    /// Emit the lowered module as text (default)
    Ir,
    /// Evaluate a function of the lowered module
    Run,
}

#[derive(Parser, Debug)]
#[command(
    name = "hlo-arith",
    version,
    about = "Legalizes HLO RNG state updates into arithmetic primitives",
    long_about = r#"
hlo-arith

Rewrites every mhlo.rng_get_and_update_state in a module into a load/add/store
on a module-scoped counter cell (memref.global @rng_state : memref<i128>)
followed by shifts and truncations that pack the previous counter value into
the declared result tensor.

CONVERSION MODES:
  (default)   Full: every op outside arith/memref/tensor/builtin/func must be
              converted, otherwise the run fails
  --partial   Partial: unknown ops are left in place

NOTE:
  The generated load/add/store sequence is not atomic. Code sharing one
  counter across threads must be synchronized by the caller.
"#
)]
struct Args {
    /// Input module in textual IR form
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (stdout if omitted)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Output type
    #[arg(long, value_enum, default_value = "ir")]
    emit: EmitType,

    /// Function to evaluate with --emit run
    #[arg(long, default_value = "main")]
    entry: String,

    /// Integer argument for the entry function (repeatable, decimal or 0x hex)
    #[arg(long = "arg", value_name = "INT")]
    args: Vec<String>,

    /// Number of times to call the entry function
    #[arg(long, default_value = "1")]
    calls: usize,

    /// Initial counter value (decimal or 0x hex)
    #[arg(long, value_name = "INT")]
    seed: Option<String>,

    /// Symbol of the counter cell
    #[arg(long, value_name = "NAME")]
    state_symbol: Option<String>,

    /// Leave ops of unknown legality in place
    #[arg(long)]
    partial: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_int(text: &str) -> Result<u128> {
    let digits = text.replace('_', "");
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => digits.parse::<u128>(),
    };
    value.with_context(|| format!("Invalid integer '{}'", text))
}

fn write_output(output: Option<&PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let mut config = LowerConfig::default();
    if let Some(seed) = &args.seed {
        config.seed = parse_int(seed).context("Invalid --seed")?;
    }
    if let Some(symbol) = &args.state_symbol {
        config.state_symbol = symbol.clone();
    }
    if args.partial {
        config.mode = ConversionMode::Partial;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    if args.verbose {
        eprintln!("Configuration:");
        eprintln!("  state_symbol: {}", config.state_symbol);
        eprintln!("  counter_bits: {}", config.counter_bits);
        eprintln!("  seed:         {:#x}", config.seed);
        eprintln!("  mode:         {}", config.mode);
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let (module, stats) = hlo_arith::lower_file(&args.input, &config)?;
    if args.verbose {
        stats.display();
    }

    match args.emit {
        EmitType::Ir => write_output(args.output.as_ref(), &module.to_string())?,
        EmitType::Run => {
            let call_args = args
                .args
                .iter()
                .map(|a| parse_int(a))
                .collect::<Result<Vec<u128>>>()
                .context("Invalid --arg")?;

            let (outputs, state) =
                hlo_arith::run_function(&module, &config, &args.entry, &call_args, args.calls)?;

            let mut text = String::new();
            for (i, results) in outputs.iter().enumerate() {
                let results: Vec<String> = results.iter().map(|r| r.to_string()).collect();
                text.push_str(&format!("call {}: {}\n", i + 1, results.join(", ")));
            }
            match state {
                Some(value) => text.push_str(&format!("@{} = {:#x}\n", config.state_symbol, value)),
                None => text.push_str(&format!("@{} was never created\n", config.state_symbol)),
            }
            write_output(args.output.as_ref(), &text)?;
        }
    }

    Ok(())
}
