use pvh_note::{
    PvhNote,
    note::{PVH_NOTE_SIZE, XEN_ELFNOTE_PHYS32_ENTRY, build, parse_notes},
};
use rstest::rstest;

#[rstest]
fn note_layout() {
    let bytes = build(0x0010_0000);
    assert_eq!(bytes.len(), PVH_NOTE_SIZE);
    assert_eq!(
        bytes,
        [
            4, 0, 0, 0, // namesz
            4, 0, 0, 0, // descsz
            18, 0, 0, 0, // type
            b'P', b'V', b'H', 0, // name
            0x00, 0x00, 0x10, 0x00, // desc
        ]
    );
}

#[rstest]
#[case(0x0010_2000, 0x0010_2000)]
#[case(0xffff_ffff, 0xffff_ffff)]
#[case(0xffff_ffff_8010_0000, 0x8010_0000)]
fn entry_is_truncated_to_32_bits(#[case] address: u64, #[case] entry: u32) {
    let note = PvhNote::new(address);
    assert_eq!(note.entry(), entry);
    assert_eq!(note.to_bytes()[16..], entry.to_le_bytes());
}

#[rstest]
fn parse_accepts_only_pvh_entry_notes() {
    let bytes = build(0x0010_2000);
    assert_eq!(PvhNote::parse(&bytes), Some(PvhNote::new(0x0010_2000)));
    assert_eq!(PvhNote::parse(&bytes[..19]), None);

    let mut other_type = bytes;
    other_type[8] = 1;
    assert_ne!(u32::from(other_type[8]), XEN_ELFNOTE_PHYS32_ENTRY);
    assert_eq!(PvhNote::parse(&other_type), None);

    let mut other_name = bytes;
    other_name[12..16].copy_from_slice(b"Xen\0");
    assert_eq!(PvhNote::parse(&other_name), None);
}

/// A `XEN_ELFNOTE_GUEST_OS` record with a 6-byte descriptor padded to 8.
fn guest_os_note() -> Vec<u8> {
    let mut record = Vec::new();
    record.extend_from_slice(&4u32.to_le_bytes());
    record.extend_from_slice(&6u32.to_le_bytes());
    record.extend_from_slice(&6u32.to_le_bytes());
    record.extend_from_slice(b"Xen\0");
    record.extend_from_slice(b"linux\0\0\0");
    record
}

#[rstest]
fn parse_notes_finds_entry_note_after_others() {
    let mut segment = guest_os_note();
    segment.extend_from_slice(&guest_os_note());
    segment.extend_from_slice(&build(0x0100_0000));
    assert_eq!(parse_notes(&segment), vec![PvhNote::new(0x0100_0000)]);

    segment.extend_from_slice(&build(0x0200_0000));
    assert_eq!(
        parse_notes(&segment),
        vec![PvhNote::new(0x0100_0000), PvhNote::new(0x0200_0000)]
    );
}

#[rstest]
fn parse_notes_stops_at_truncated_record() {
    let mut segment = guest_os_note();
    // descsz runs past the end of the segment
    segment[4..8].copy_from_slice(&0x100u32.to_le_bytes());
    segment.extend_from_slice(&build(0x0100_0000));
    assert!(parse_notes(&segment).is_empty());
    assert!(parse_notes(&segment[..11]).is_empty());
}
