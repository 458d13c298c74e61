mod common;

use common::kernel;
use pvh_note::{
    ElfImage, Error,
    elf::{PT_LOAD, SHT_NULL, SHT_SYMTAB},
};
use rstest::rstest;

#[rstest]
fn load_generated_kernel() {
    let kernel = kernel();
    let image = ElfImage::load(kernel.data.clone()).unwrap();

    let ehdr = image.header();
    assert_eq!(ehdr.e_phnum(), 2);
    assert_eq!(ehdr.e_phentsize(), 56);
    assert_eq!(ehdr.e_shoff() as u64, kernel.shoff);
    assert_eq!(ehdr.phdr_range(), (64, kernel.phdr_end as usize));

    let phdrs = image.program_headers();
    assert_eq!(phdrs.len(), 2);
    assert!(phdrs.iter().all(|phdr| phdr.p_type == PT_LOAD));
    assert_eq!(phdrs[0].p_offset() as u64, kernel.text_offset);

    let shdrs = image.section_headers();
    assert_eq!(shdrs.len(), kernel.shnum as usize);
    assert_eq!(shdrs[0].sh_type, SHT_NULL);
    assert!(shdrs.iter().any(|shdr| shdr.sh_type == SHT_SYMTAB));
    assert_eq!(image.bytes(), &kernel.data[..]);
}

#[rstest]
#[case::empty(vec![])]
#[case::short(b"\x7fEL".to_vec())]
#[case::wrong_magic(b"\x7fELG\x02\x01\x01".to_vec())]
#[case::script(b"#!/bin/sh\necho hi\n".to_vec())]
fn reject_bad_magic(#[case] data: Vec<u8>) {
    let err = ElfImage::load(data).err().unwrap();
    assert!(matches!(err, Error::Format { .. }), "{err}");
    assert!(err.to_string().contains("magic"));
}

#[rstest]
#[case::elf32(4, 1, "class")]
#[case::big_endian(5, 2, "little-endian")]
fn reject_unsupported_ident(#[case] index: usize, #[case] value: u8, #[case] reason: &str) {
    let mut data = kernel().data;
    data[index] = value;
    let err = ElfImage::load(data).err().unwrap();
    assert!(matches!(err, Error::Format { .. }));
    assert!(err.to_string().contains(reason), "{err}");
}

#[rstest]
fn reject_truncated_header() {
    let data = kernel().data[..40].to_vec();
    let err = ElfImage::load(data).err().unwrap();
    assert!(matches!(err, Error::Format { .. }));
}

#[rstest]
fn reject_tables_outside_file() {
    let mut data = kernel().data;
    // e_phnum = 0x400
    data[56..58].copy_from_slice(&0x400u16.to_le_bytes());
    assert!(matches!(
        ElfImage::load(data).err().unwrap(),
        Error::Format { .. }
    ));

    let mut data = kernel().data;
    let len = data.len() as u64;
    // e_shoff just before the end of the file
    data[40..48].copy_from_slice(&(len - 8).to_le_bytes());
    assert!(matches!(
        ElfImage::load(data).err().unwrap(),
        Error::Format { .. }
    ));
}

#[rstest]
fn reject_unexpected_phentsize() {
    let mut data = kernel().data;
    data[54..56].copy_from_slice(&32u16.to_le_bytes());
    let err = ElfImage::load(data).err().unwrap();
    assert!(err.to_string().contains("program header entry size"), "{err}");
}

#[rstest]
fn insert_and_overwrite() {
    let kernel = kernel();
    let mut image = ElfImage::load(kernel.data.clone()).unwrap();
    let at = kernel.text_offset as usize;

    image.insert_at(at, &[1, 2, 3]).unwrap();
    assert_eq!(image.len(), kernel.data.len() + 3);
    assert_eq!(image.slice(at, 3).unwrap(), &[1, 2, 3]);
    assert_eq!(image.slice(at + 3, 16).unwrap(), &kernel.data[at..at + 16]);

    image.overwrite_at(at, &[9, 9]).unwrap();
    assert_eq!(image.slice(at, 3).unwrap(), &[9, 9, 3]);
    assert_eq!(image.len(), kernel.data.len() + 3);

    let end = image.len();
    assert!(image.overwrite_at(end - 1, &[0, 0]).is_err());
    assert!(image.insert_at(end + 1, &[0]).is_err());
}

#[rstest]
fn append_aligned_pads_with_zeros() {
    let mut image = ElfImage::load(kernel().data).unwrap();
    image.insert_at(image.len(), &[0xff]).unwrap();
    let len = image.len();

    let offset = image.append_aligned(&[7; 4], 4);
    assert_eq!(offset % 4, 0);
    assert!(offset >= len && offset < len + 4);
    assert!(image.is_zeroed(len, offset - len));
    assert_eq!(image.slice(offset, 4).unwrap(), &[7; 4]);
    assert_eq!(image.len(), offset + 4);
}

#[rstest]
fn is_zeroed_requires_bytes_in_bounds() {
    let image = ElfImage::load(kernel().data).unwrap();
    let len = image.len();
    assert!(!image.is_zeroed(len - 4, 8));
    // padding after the program header table
    assert!(image.is_zeroed(64 + 2 * 56, 64));
}

#[rstest]
fn reject_extended_section_numbering() {
    let mut data = kernel().data;
    // e_shnum = 0 while e_shoff still points at a table
    data[60..62].copy_from_slice(&0u16.to_le_bytes());
    let err = ElfImage::load(data).err().unwrap();
    assert!(matches!(err, Error::Format { .. }));
    assert!(err.to_string().contains("extended section numbering"), "{err}");
}

#[rstest]
fn accept_image_without_sections() {
    let mut data = kernel().data;
    data[40..48].copy_from_slice(&0u64.to_le_bytes());
    data[60..62].copy_from_slice(&0u16.to_le_bytes());
    let image = ElfImage::load(data).unwrap();
    assert!(image.section_headers().is_empty());
}
