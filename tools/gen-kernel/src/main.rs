use anyhow::{Context, Result};
use clap::Parser;
use gen_kernel::{KernelConfig, KernelWriter, SymbolDesc};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gen-kernel")]
struct Args {
    /// Output file for the generated kernel image
    #[arg(short, long, default_value = "out/kernel.elf")]
    output: PathBuf,
    /// Bytes of padding after the program header table
    #[arg(short, long, default_value_t = 64)]
    padding: usize,
    /// Fill byte of the padding
    #[arg(short, long, default_value_t = 0)]
    fill: u8,
    /// Symbols as NAME=HEXADDR, e.g. pvh_start=0x102000
    #[arg(short, long)]
    symbol: Vec<String>,
    /// Leave out .symtab and .strtab
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_symtab: bool,
}

fn parse_symbol(text: &str) -> Result<SymbolDesc> {
    let (name, value) = text
        .split_once('=')
        .with_context(|| format!("expected NAME=HEXADDR, got {text:?}"))?;
    let value = value.trim_start_matches("0x");
    let value = u64::from_str_radix(value, 16)
        .with_context(|| format!("invalid address for symbol {name}"))?;
    Ok(SymbolDesc::func(name, value))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = KernelConfig::default().with_padding(args.padding, args.fill);
    for symbol in &args.symbol {
        config = config.with_symbol(parse_symbol(symbol)?);
    }
    if args.no_symtab {
        config = config.without_symtab();
    }

    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let image = KernelWriter::new(config).write_file(&args.output)?;
    println!(
        "Wrote {} ({} bytes, phnum: {}, shnum: {}, text at {:#x})",
        args.output.display(),
        image.data.len(),
        image.phnum,
        image.shnum,
        image.text_offset
    );
    Ok(())
}
