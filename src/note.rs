//! PVH boot note
//!
//! The note advertises the 32-bit physical entry point of a kernel under the
//! Xen `XEN_ELFNOTE_PHYS32_ENTRY` type. Hypervisors that implement the PVH boot
//! protocol (Firecracker, QEMU, Cloud Hypervisor) scan `PT_NOTE` segments for
//! it and jump straight to the address it carries.

use crate::{elf::PT_NOTE, image::ElfImage};
use byteorder::{ByteOrder, LittleEndian};

/// Note type carrying the 32-bit physical entry address.
pub const XEN_ELFNOTE_PHYS32_ENTRY: u32 = 18;
/// Note owner name, already padded to a 4-byte boundary.
pub const PVH_NOTE_NAME: [u8; 4] = *b"PVH\0";
/// Size of the encoded note: three header words, the name and the address.
pub const PVH_NOTE_SIZE: usize = 20;

/// A PVH entry-point note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvhNote {
    entry: u32,
}

impl PvhNote {
    /// Creates a note for `entry_address`, keeping only its low 32 bits.
    pub fn new(entry_address: u64) -> Self {
        #[cfg(feature = "log")]
        if entry_address > u64::from(u32::MAX) {
            log::warn!(
                "entry address {entry_address:#x} does not fit in 32 bits, truncating to {:#x}",
                entry_address as u32
            );
        }
        Self {
            entry: entry_address as u32,
        }
    }

    /// Returns the entry address carried by the note.
    #[inline]
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// Encodes the note.
    ///
    /// Layout: `namesz`, `descsz`, `type`, name, little-endian entry address.
    /// Name and descriptor are both exactly four bytes, so no padding is needed.
    pub fn to_bytes(&self) -> [u8; PVH_NOTE_SIZE] {
        let mut buf = [0u8; PVH_NOTE_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], PVH_NOTE_NAME.len() as u32);
        LittleEndian::write_u32(&mut buf[4..8], 4);
        LittleEndian::write_u32(&mut buf[8..12], XEN_ELFNOTE_PHYS32_ENTRY);
        buf[12..16].copy_from_slice(&PVH_NOTE_NAME);
        LittleEndian::write_u32(&mut buf[16..20], self.entry);
        buf
    }

    /// Decodes a note previously produced by [`PvhNote::to_bytes`].
    ///
    /// Returns `None` unless `data` starts with a PVH entry note.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = data.get(..PVH_NOTE_SIZE)?;
        let namesz = LittleEndian::read_u32(&data[0..4]);
        let descsz = LittleEndian::read_u32(&data[4..8]);
        let n_type = LittleEndian::read_u32(&data[8..12]);
        if namesz != 4
            || descsz != 4
            || n_type != XEN_ELFNOTE_PHYS32_ENTRY
            || data[12..16] != PVH_NOTE_NAME
        {
            return None;
        }
        Some(Self {
            entry: LittleEndian::read_u32(&data[16..20]),
        })
    }
}

/// Builds the encoded note for `entry_address`.
#[inline]
pub fn build(entry_address: u64) -> [u8; PVH_NOTE_SIZE] {
    PvhNote::new(entry_address).to_bytes()
}

/// Size of a note record header: `namesz`, `descsz` and `type`.
const NOTE_HEADER_SIZE: usize = 12;

/// Returns every PVH entry note among the records of a note segment.
///
/// Name and descriptor are each padded to 4 bytes; the last record may omit
/// the padding of its descriptor. Walking stops at the first truncated record.
pub fn parse_notes(mut data: &[u8]) -> Vec<PvhNote> {
    let mut notes = Vec::new();
    while data.len() >= NOTE_HEADER_SIZE {
        let namesz = LittleEndian::read_u32(&data[0..4]) as usize;
        let descsz = LittleEndian::read_u32(&data[4..8]) as usize;
        let Some(end) = namesz
            .checked_next_multiple_of(4)
            .and_then(|name| name.checked_add(descsz))
            .and_then(|len| len.checked_add(NOTE_HEADER_SIZE))
            .filter(|&end| end <= data.len())
        else {
            break;
        };
        if let Some(note) = PvhNote::parse(&data[..end]) {
            notes.push(note);
        }
        data = data.get(end.next_multiple_of(4)..).unwrap_or_default();
    }
    notes
}

/// Returns every PVH entry note carried by the image's `PT_NOTE` segments.
pub fn find_pvh_notes(image: &ElfImage) -> Vec<PvhNote> {
    image
        .program_headers()
        .iter()
        .filter(|phdr| phdr.p_type == PT_NOTE)
        .filter_map(|phdr| image.slice(phdr.p_offset(), phdr.p_filesz()).ok())
        .flat_map(parse_notes)
        .collect()
}
