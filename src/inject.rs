//! Program header injection
//!
//! Adds one `PT_NOTE` entry to the program header table and appends the note
//! it describes at the end of the file. The table must stay contiguous, so the
//! new entry goes directly after the last existing one:
//!
//! * If the gap between the end of the table and the first content after it
//!   can hold an entry, the file is split at the end of the table and grown by
//!   one entry. Every absolute offset at or after the split is relocated.
//! * Otherwise, if the entry-sized region after the table is all zeros and
//!   not part of the section header table, the entry overwrites it in place
//!   and nothing moves.
//! * Otherwise the image is rejected with [`Error::Space`](crate::Error::Space)
//!   before anything has been modified.

use crate::{
    Result,
    elf::{ElfHeader, ElfPhdr, ElfShdr, PF_R},
    format_error,
    image::ElfImage,
    note::{PVH_NOTE_SIZE, PvhNote},
    space_error,
};

/// Alignment of the appended note, matching the 4-byte alignment of the
/// note's own fields.
pub const NOTE_ALIGN: usize = 4;

/// How room was made for the new program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectStrategy {
    /// The file was split after the table and everything behind it shifted.
    Shifted,
    /// Zero padding after the table was overwritten in place.
    ReusedPadding,
}

/// The result of a successful injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Injection {
    /// How room was made for the entry.
    pub strategy: InjectStrategy,
    /// Free bytes found after the table before the injection.
    pub available: usize,
    /// File offset of the new program header.
    pub phdr_offset: usize,
    /// File offset of the appended note.
    pub note_offset: usize,
    /// Index of the new entry in the program header table.
    pub index: usize,
}

/// Returns the offset of the first content at or after `from`.
///
/// Content is the section header table, the data of every section and the
/// data of every segment with a non-empty file image. The end of the image
/// bounds the result when nothing follows `from`.
pub fn min_content_offset(image: &ElfImage, from: usize) -> usize {
    let ehdr = image.header();
    let shoff = (ehdr.e_shnum() != 0).then(|| ehdr.e_shoff());
    let sections = image
        .section_headers()
        .into_iter()
        .filter(|shdr| !shdr.is_null())
        .map(|shdr| shdr.sh_offset());
    let segments = image
        .program_headers()
        .into_iter()
        .filter(|phdr| phdr.p_filesz() != 0)
        .map(|phdr| phdr.p_offset());

    shoff
        .into_iter()
        .chain(sections)
        .chain(segments)
        .filter(|&offset| offset >= from)
        .fold(image.len(), usize::min)
}

/// Grows the image by `len` zero bytes at `at` and relocates every offset that
/// pointed at or past `at`: `e_shoff`, section offsets and segment offsets.
///
/// The program header table itself must end at or before `at`. All offsets are
/// relocated before the image is touched, so on error it is left unmodified.
pub fn make_room(image: &mut ElfImage, at: usize, len: usize) -> Result<()> {
    let mut ehdr = image.header().clone();
    let (_, phdr_end) = ehdr.phdr_range();
    debug_assert!(phdr_end <= at);

    let relocate = |offset: usize| -> Result<usize> {
        if offset < at {
            return Ok(offset);
        }
        offset.checked_add(len).ok_or_else(|| {
            format_error(format!(
                "offset {offset:#x} overflows when shifted by {len:#x}"
            ))
        })
    };

    let mut shdrs = image.section_headers();
    let mut phdrs = image.program_headers();
    if ehdr.e_shnum() != 0 {
        let shoff = relocate(ehdr.e_shoff())?;
        #[cfg(feature = "log")]
        if shoff != ehdr.e_shoff() {
            log::debug!("[Inject] shoff: {:#x} -> {shoff:#x}", ehdr.e_shoff());
        }
        ehdr.set_e_shoff(shoff);
    }
    for shdr in shdrs.iter_mut() {
        relocate_section(shdr, relocate)?;
    }
    for phdr in phdrs.iter_mut() {
        phdr.p_offset = relocate(phdr.p_offset())? as u64;
    }

    image.insert_at(at, &vec![0u8; len])?;
    image.write_header(ehdr);
    for (index, shdr) in shdrs.iter().enumerate() {
        image.write_section_header(index, shdr)?;
    }
    for (index, phdr) in phdrs.iter().enumerate() {
        image.write_program_header(index, phdr)?;
    }
    Ok(())
}

fn relocate_section(
    shdr: &mut ElfShdr,
    relocate: impl Fn(usize) -> Result<usize>,
) -> Result<()> {
    if !shdr.is_null() {
        shdr.sh_offset = relocate(shdr.sh_offset())? as u64;
    }
    Ok(())
}

/// Whether `[start, end)` intersects the section header table.
fn overlaps_shdr_table(ehdr: &ElfHeader, start: usize, end: usize) -> bool {
    if ehdr.e_shnum() == 0 {
        return false;
    }
    let (shdr_start, shdr_end) = ehdr.shdr_range();
    start < shdr_end && shdr_start < end
}

/// Adds a `PT_NOTE` program header describing `note` and appends the note to
/// the image.
///
/// On error the image is left unmodified.
pub fn inject(image: &mut ElfImage, note: &PvhNote) -> Result<Injection> {
    let ehdr: &ElfHeader = image.header();
    let entsize = ehdr.e_phentsize();
    let index = ehdr.e_phnum();
    let phnum = u16::try_from(index + 1)
        .ok()
        .filter(|&phnum| phnum < u16::MAX)
        .ok_or_else(|| format_error("program header count overflow"))?;
    let (_, phdr_end) = ehdr.phdr_range();
    let on_shdr_table = overlaps_shdr_table(ehdr, phdr_end, phdr_end.saturating_add(entsize));

    let available = min_content_offset(image, phdr_end) - phdr_end;
    let strategy = if available >= entsize {
        InjectStrategy::Shifted
    } else if !on_shdr_table && image.is_zeroed(phdr_end, entsize) {
        InjectStrategy::ReusedPadding
    } else {
        return Err(space_error(entsize, available));
    };
    #[cfg(feature = "log")]
    log::debug!(
        "[Inject] table end: {phdr_end:#x}, available: {available}, strategy: {strategy:?}"
    );

    if strategy == InjectStrategy::Shifted {
        make_room(image, phdr_end, entsize)?;
    }

    let note_offset = image.append_aligned(&note.to_bytes(), NOTE_ALIGN);
    let phdr = ElfPhdr::note(PF_R, note_offset, PVH_NOTE_SIZE, NOTE_ALIGN);
    image.write_program_header(index, &phdr)?;

    let mut ehdr = image.header().clone();
    ehdr.set_e_phnum(phnum);
    image.write_header(ehdr);

    #[cfg(feature = "log")]
    log::debug!(
        "[Inject] PT_NOTE at {phdr_end:#x}, note at {note_offset:#x}, phnum: {index} -> {phnum}"
    );
    Ok(Injection {
        strategy,
        available,
        phdr_offset: phdr_end,
        note_offset,
        index,
    })
}
