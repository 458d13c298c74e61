use anyhow::{Context, Result};
use clap::Parser;
use pvh_note::{Objdump, PatchOptions, Patcher, parse_address, symbol::DEFAULT_ENTRY_SYMBOL};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pvh-note", version)]
/// Add a PVH entry note to an ELF64 kernel so it can be booted directly by a
/// hypervisor.
struct Args {
    /// Kernel image to patch
    input: PathBuf,
    /// Where to write the patched image (default: patch INPUT in place).
    /// A value starting with `0x` is taken as ADDRESS instead.
    output: Option<String>,
    /// Entry address in hex (default: look up the entry symbol)
    address: Option<String>,
    /// Symbol naming the entry point
    #[arg(short, long, default_value = DEFAULT_ENTRY_SYMBOL)]
    symbol: String,
    /// objdump executable used when the symbol table cannot resolve the symbol
    #[arg(long, default_value = "objdump")]
    objdump: PathBuf,
    /// Never fall back to objdump for symbol lookup
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_fallback: bool,
}

impl Args {
    /// Splits the trailing positionals into an output path and an address.
    fn target(&self) -> Result<(PathBuf, Option<u64>)> {
        let (output, address) = match (&self.output, &self.address) {
            (Some(output), None) if is_hex_literal(output) => (None, Some(output)),
            (output, address) => (output.as_ref(), address.as_ref()),
        };
        let output = output
            .map(PathBuf::from)
            .unwrap_or_else(|| self.input.clone());
        let address = address
            .map(|text| parse_address(text))
            .transpose()
            .context("invalid entry address")?;
        Ok((output, address))
    }
}

fn is_hex_literal(text: &str) -> bool {
    text.starts_with("0x") || text.starts_with("0X")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let (output, address) = args.target()?;

    let options = PatchOptions::default()
        .with_symbol(args.symbol.as_str())
        .with_fallback(!args.no_fallback);
    let patcher = Patcher::with_source(options, Objdump::new(args.objdump.clone()));
    let report = patcher
        .patch(&args.input, &output, address)
        .with_context(|| format!("failed to patch {}", args.input.display()))?;

    log::info!(
        "Injected PT_NOTE ({:?}): entry={:#x}, note at file offset {:#x}",
        report.injection.strategy,
        report.entry,
        report.injection.note_offset
    );
    Ok(())
}
