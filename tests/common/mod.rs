//! Builders for synthetic fixture files used by the end-to-end tests.

use std::io::{Cursor, Write};

// ── BIFF8 record helpers ────────────────────────────────────────────────

pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const DIMENSIONS: u16 = 0x0200;
pub const NUMBER: u16 = 0x0203;
pub const BOOLERR: u16 = 0x0205;
pub const RK: u16 = 0x027E;
pub const LABELSST: u16 = 0x00FD;
pub const MERGECELLS: u16 = 0x00E5;
pub const BOUNDSHEET8: u16 = 0x0085;
pub const SST: u16 = 0x00FC;
pub const XF: u16 = 0x00E0;
pub const FORMAT: u16 = 0x041E;
pub const DATE1904: u16 = 0x0022;

pub fn push_record(stream: &mut Vec<u8>, typ: u16, data: &[u8]) {
    stream.extend_from_slice(&typ.to_le_bytes());
    stream.extend_from_slice(&(data.len() as u16).to_le_bytes());
    stream.extend_from_slice(data);
}

pub fn bof_payload(doctype: u16) -> Vec<u8> {
    let mut d = vec![0u8; 16];
    d[0..2].copy_from_slice(&0x0600u16.to_le_bytes());
    d[2..4].copy_from_slice(&doctype.to_le_bytes());
    d[6..8].copy_from_slice(&0x07CCu16.to_le_bytes());
    d
}

pub fn boundsheet_payload(position: u32, hidden: u8, name: &str) -> Vec<u8> {
    let mut d = Vec::new();
    d.extend_from_slice(&position.to_le_bytes());
    d.push(hidden);
    d.push(0x00);
    d.push(name.len() as u8);
    d.push(0x00);
    d.extend_from_slice(name.as_bytes());
    d
}

pub fn sst_payload(strings: &[&str]) -> Vec<u8> {
    let mut d = Vec::new();
    d.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    d.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    for s in strings {
        d.extend_from_slice(&(s.len() as u16).to_le_bytes());
        d.push(0x00);
        d.extend_from_slice(s.as_bytes());
    }
    d
}

pub fn dimensions_payload(rows: u32, cols: u16) -> Vec<u8> {
    let mut d = Vec::new();
    d.extend_from_slice(&0u32.to_le_bytes());
    d.extend_from_slice(&rows.to_le_bytes());
    d.extend_from_slice(&0u16.to_le_bytes());
    d.extend_from_slice(&cols.to_le_bytes());
    d.extend_from_slice(&0u16.to_le_bytes());
    d
}

pub fn cell_header(row: u16, col: u16, ixfe: u16) -> Vec<u8> {
    let mut d = Vec::new();
    d.extend_from_slice(&row.to_le_bytes());
    d.extend_from_slice(&col.to_le_bytes());
    d.extend_from_slice(&ixfe.to_le_bytes());
    d
}

pub fn number_record(row: u16, col: u16, ixfe: u16, v: f64) -> (u16, Vec<u8>) {
    let mut d = cell_header(row, col, ixfe);
    d.extend_from_slice(&v.to_le_bytes());
    (NUMBER, d)
}

pub fn rk_int_record(row: u16, col: u16, ixfe: u16, v: i32) -> (u16, Vec<u8>) {
    let mut d = cell_header(row, col, ixfe);
    d.extend_from_slice(&(((v << 2) as u32) | 0x02).to_le_bytes());
    (RK, d)
}

pub fn label_sst_record(row: u16, col: u16, ixfe: u16, index: u32) -> (u16, Vec<u8>) {
    let mut d = cell_header(row, col, ixfe);
    d.extend_from_slice(&index.to_le_bytes());
    (LABELSST, d)
}

pub fn bool_record(row: u16, col: u16, ixfe: u16, v: bool) -> (u16, Vec<u8>) {
    let mut d = cell_header(row, col, ixfe);
    d.extend_from_slice(&[v as u8, 0x00]);
    (BOOLERR, d)
}

pub fn merge_record(regions: &[(u16, u16, u16, u16)]) -> (u16, Vec<u8>) {
    let mut d = Vec::new();
    d.extend_from_slice(&(regions.len() as u16).to_le_bytes());
    for (r0, r1, c0, c1) in regions {
        d.extend_from_slice(&r0.to_le_bytes());
        d.extend_from_slice(&r1.to_le_bytes());
        d.extend_from_slice(&c0.to_le_bytes());
        d.extend_from_slice(&c1.to_le_bytes());
    }
    (MERGECELLS, d)
}

/// Assembles a workbook stream: the globals records, then each sheet's
/// records, patching every `BoundSheet8` with its substream position.
pub fn workbook_stream(globals: &[(u16, Vec<u8>)], sheets: &[Vec<(u16, Vec<u8>)>]) -> Vec<u8> {
    let globals_len: usize = globals.iter().map(|(_, d)| 4 + d.len()).sum();

    let mut sheet_positions = Vec::new();
    let mut sheet_bytes = Vec::new();
    for records in sheets {
        sheet_positions.push((globals_len + sheet_bytes.len()) as u32);
        for (typ, data) in records {
            push_record(&mut sheet_bytes, *typ, data);
        }
    }

    let mut stream = Vec::new();
    let mut bound_seen = 0;
    for (typ, data) in globals {
        if *typ == BOUNDSHEET8 {
            let mut patched = data.clone();
            patched[0..4].copy_from_slice(&sheet_positions[bound_seen].to_le_bytes());
            bound_seen += 1;
            push_record(&mut stream, *typ, &patched);
        } else {
            push_record(&mut stream, *typ, data);
        }
    }
    stream.extend_from_slice(&sheet_bytes);
    stream
}

// ── CFB container builder ───────────────────────────────────────────────

const FREESECT: u32 = 0xFFFF_FFFF;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FATSECT: u32 = 0xFFFF_FFFD;

fn put_u32(file: &mut [u8], at: usize, v: u32) {
    file[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// Wraps a workbook stream into a v3 CFB container, storing the stream
/// in the root mini stream.
pub fn wrap_in_cfb(workbook: &[u8]) -> Vec<u8> {
    assert!(workbook.len() < 0x1000, "builder only handles small streams");
    let mini_sectors = workbook.len().div_ceil(64);
    let mini_bytes = mini_sectors * 64;
    let ministream_sectors = mini_bytes.div_ceil(512).max(1);
    let total_sectors = 3 + ministream_sectors;
    assert!(total_sectors <= 128);

    let mut file = vec![0u8; 512 * (1 + total_sectors)];

    file[..8].copy_from_slice(&0xE11A_B1A1_E011_CFD0u64.to_le_bytes());
    file[26..28].copy_from_slice(&3u16.to_le_bytes());
    file[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    file[30..32].copy_from_slice(&9u16.to_le_bytes());
    file[32..34].copy_from_slice(&6u16.to_le_bytes());
    put_u32(&mut file, 44, 1);
    put_u32(&mut file, 48, 1);
    put_u32(&mut file, 56, 0x1000);
    put_u32(&mut file, 60, 2);
    put_u32(&mut file, 64, 1);
    put_u32(&mut file, 68, ENDOFCHAIN);
    put_u32(&mut file, 76, 0);
    for i in 1..109 {
        put_u32(&mut file, 76 + 4 * i, FREESECT);
    }

    let sector = |id: usize| 512 * (1 + id);

    put_u32(&mut file, sector(0), FATSECT);
    put_u32(&mut file, sector(0) + 4, ENDOFCHAIN); // directory
    put_u32(&mut file, sector(0) + 8, ENDOFCHAIN); // mini FAT
    for i in 0..ministream_sectors {
        let next = if i + 1 == ministream_sectors {
            ENDOFCHAIN
        } else {
            (4 + i) as u32
        };
        put_u32(&mut file, sector(0) + 4 * (3 + i), next);
    }
    for i in 3 + ministream_sectors..128 {
        put_u32(&mut file, sector(0) + 4 * i, FREESECT);
    }

    let mut dir = Vec::new();
    for (name, typ, start, size) in [
        ("Root Entry", 0x05u8, 3u32, mini_bytes as u32),
        ("Workbook", 0x02, 0, workbook.len() as u32),
    ] {
        let mut e = [0u8; 128];
        let units: Vec<u16> = name.encode_utf16().collect();
        for (i, u) in units.iter().enumerate() {
            e[2 * i..2 * i + 2].copy_from_slice(&u.to_le_bytes());
        }
        e[64..66].copy_from_slice(&((units.len() as u16 + 1) * 2).to_le_bytes());
        e[66] = typ;
        e[68..72].copy_from_slice(&FREESECT.to_le_bytes());
        e[72..76].copy_from_slice(&FREESECT.to_le_bytes());
        e[76..80].copy_from_slice(&FREESECT.to_le_bytes());
        e[116..120].copy_from_slice(&start.to_le_bytes());
        e[120..124].copy_from_slice(&size.to_le_bytes());
        dir.extend_from_slice(&e);
    }
    dir.resize(512, 0);
    let at = sector(1);
    file[at..at + 512].copy_from_slice(&dir);

    for i in 0..mini_sectors {
        let next = if i + 1 == mini_sectors {
            ENDOFCHAIN
        } else {
            (i + 1) as u32
        };
        put_u32(&mut file, sector(2) + 4 * i, next);
    }
    for i in mini_sectors..128 {
        put_u32(&mut file, sector(2) + 4 * i, FREESECT);
    }

    let at = sector(3);
    file[at..at + workbook.len()].copy_from_slice(workbook);
    file
}

// ── xlsx zip builder ────────────────────────────────────────────────────

/// Builds an in-memory xlsx archive from (path, xml) parts.
pub fn build_xlsx(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (path, content) in parts {
        zip.start_file(*path, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Writes fixture bytes under a unique name in the system temp dir.
pub fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("rasp-fixture-{}-{name}", std::process::id()));
    std::fs::write(&path, bytes).unwrap();
    path
}
