#![allow(dead_code)]

use byteorder::{ByteOrder, LittleEndian};
use elf::{ElfBytes, endian::LittleEndian as ElfLittleEndian, segment::ProgramHeader};
use gen_kernel::{KernelConfig, KernelImage, KernelWriter, SymbolDesc};

pub const PVH_START: u64 = 0x0010_2000;

/// Kernel with two program headers and 64 zero bytes after the table.
pub fn kernel() -> KernelImage {
    r#gen(KernelConfig::default().with_symbol(SymbolDesc::func("pvh_start", PVH_START)))
}

pub fn r#gen(config: KernelConfig) -> KernelImage {
    KernelWriter::new(config).write().unwrap()
}

pub fn e_shoff(data: &[u8]) -> u64 {
    LittleEndian::read_u64(&data[40..48])
}

pub fn e_phnum(data: &[u8]) -> u16 {
    LittleEndian::read_u16(&data[56..58])
}

/// Parses `data` with the `elf` crate and returns its segments.
pub fn segments(data: &[u8]) -> Vec<ProgramHeader> {
    let file = ElfBytes::<ElfLittleEndian>::minimal_parse(data).expect("output must parse");
    file.segments().expect("segments").iter().collect()
}

/// Section offsets as seen by the `elf` crate.
pub fn section_offsets(data: &[u8]) -> Vec<u64> {
    let file = ElfBytes::<ElfLittleEndian>::minimal_parse(data).expect("output must parse");
    file.section_headers()
        .expect("section headers")
        .iter()
        .map(|shdr| shdr.sh_offset)
        .collect()
}

/// Decodes the note at the start of `data` into (namesz, descsz, type, name, desc).
pub fn decode_note(data: &[u8]) -> (u32, u32, u32, [u8; 4], u32) {
    let mut name = [0u8; 4];
    name.copy_from_slice(&data[12..16]);
    (
        LittleEndian::read_u32(&data[0..4]),
        LittleEndian::read_u32(&data[4..8]),
        LittleEndian::read_u32(&data[8..12]),
        name,
        LittleEndian::read_u32(&data[16..20]),
    )
}
