mod common;

use common::{PVH_START, r#gen, kernel};
use gen_kernel::{KernelConfig, SymbolDesc};
use pvh_note::{
    ElfImage, Error, NoSymbolSource, Objdump, SymbolResolver, SymbolSource,
    symbol::{find_symbol, parse_objdump_symbols, resolve},
};
use rstest::rstest;
use std::path::Path;

fn image_with(symbols: &[(&str, u64)]) -> ElfImage {
    let config = symbols
        .iter()
        .fold(KernelConfig::default(), |config, &(name, value)| {
            config.with_symbol(SymbolDesc::func(name, value))
        });
    ElfImage::load(r#gen(config).data).unwrap()
}

#[rstest]
fn find_symbol_in_symtab() {
    let image = image_with(&[
        ("_start", 0x100000),
        ("pvh_start32", 0x101000),
        ("pvh_start", PVH_START),
        ("pvh", 0x103000),
    ]);
    assert_eq!(find_symbol(&image, "pvh_start"), Some(PVH_START));
    assert_eq!(find_symbol(&image, "_start"), Some(0x100000));
    assert_eq!(find_symbol(&image, "pvh"), Some(0x103000));
    assert_eq!(find_symbol(&image, "pvh_"), None);
    assert_eq!(find_symbol(&image, ""), None);
}

#[rstest]
fn first_match_wins() {
    let image = image_with(&[("pvh_start", 0x1000), ("pvh_start", 0x2000)]);
    assert_eq!(find_symbol(&image, "pvh_start"), Some(0x1000));
}

#[rstest]
fn missing_symbol_is_an_error() {
    let image = image_with(&[("_start", 0x100000)]);
    match resolve(&image, "pvh_start") {
        Err(Error::SymbolNotFound { name }) => assert_eq!(name, "pvh_start"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[rstest]
fn stripped_image_has_no_symbols() {
    let config = KernelConfig::default()
        .with_symbol(SymbolDesc::func("pvh_start", PVH_START))
        .without_symtab();
    let image = ElfImage::load(r#gen(config).data).unwrap();
    assert_eq!(find_symbol(&image, "pvh_start"), None);

    let resolver = SymbolResolver::embedded("pvh_start");
    let err = resolver
        .resolve(&image, Path::new("kernel"), None)
        .err()
        .unwrap();
    assert!(matches!(err, Error::SymbolNotFound { .. }));
}

#[rstest]
fn explicit_address_takes_precedence() {
    let image = ElfImage::load(kernel().data).unwrap();
    let source = |_: &Path, _: &str| -> Option<u64> { panic!("external source must not be used") };
    let resolver = SymbolResolver::with_source("pvh_start", source);
    assert_eq!(
        resolver
            .resolve(&image, Path::new("kernel"), Some(0x100000))
            .unwrap(),
        0x100000
    );
    assert_eq!(
        resolver.resolve(&image, Path::new("kernel"), None).unwrap(),
        PVH_START
    );
}

#[rstest]
fn external_source_is_the_fallback() {
    let config = KernelConfig::default().without_symtab();
    let image = ElfImage::load(r#gen(config).data).unwrap();

    let source = |path: &Path, name: &str| -> Option<u64> {
        (path == Path::new("build/kernel") && name == "pvh_start").then_some(0x0020_0000)
    };
    let resolver = SymbolResolver::with_source("pvh_start", source);
    assert_eq!(resolver.name(), "pvh_start");
    assert_eq!(
        resolver
            .resolve(&image, Path::new("build/kernel"), None)
            .unwrap(),
        0x0020_0000
    );

    let resolver = SymbolResolver::with_source("entry32", source);
    let err = resolver
        .resolve(&image, Path::new("build/kernel"), None)
        .err()
        .unwrap();
    assert!(matches!(err, Error::SymbolNotFound { ref name } if name == "entry32"));
}

#[rstest]
fn no_symbol_source_finds_nothing() {
    assert_eq!(NoSymbolSource.lookup(Path::new("kernel"), "pvh_start"), None);
}

const OBJDUMP_OUTPUT: &str = "
build/kernel:     file format elf64-x86-64

SYMBOL TABLE:
0000000000000000 l    df *ABS*\t0000000000000000 boot.S
0000000000101000 l       .text\t0000000000000000 pvh_start32
0000000000102000 g       .text\t0000000000000000 pvh_start
0000000000100000 g       .text\t0000000000000000 _start
";

#[rstest]
#[case("pvh_start", Some(0x102000))]
#[case("pvh_start32", Some(0x101000))]
#[case("_start", Some(0x100000))]
#[case("pvh", None)]
fn parse_objdump_output(#[case] name: &str, #[case] expected: Option<u64>) {
    assert_eq!(parse_objdump_symbols(OBJDUMP_OUTPUT, name), expected);
}

#[rstest]
fn objdump_that_cannot_run_finds_nothing() {
    let objdump = Objdump::new("/nonexistent/pvh-note/objdump");
    assert_eq!(objdump.lookup(Path::new("kernel"), "pvh_start"), None);
}
