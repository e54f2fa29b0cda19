//! Compound File Binary format MS-CFB.
//!
//! The container is a FAT-based virtual filesystem: sectors of 512 or
//! 4096 bytes linked into chains, a mini-FAT of 64-byte sectors for
//! streams below 4096 bytes, and a directory of named entries. Streams
//! are exposed as [`SliceReader`]s over the already-loaded file bytes so
//! assembling a stream never copies sector data.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use encoding_rs::UTF_16LE;
use log::debug;

use crate::errors::from_err;
use crate::utils::{read_u16, read_u32, read_u64, read_u32_table};

const FREESECT: u32 = 0xFFFF_FFFF;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
#[allow(dead_code)]
const FATSECT: u32 = 0xFFFF_FFFD;
#[allow(dead_code)]
const DIFSECT: u32 = 0xFFFF_FFFC;
const MAXREGSECT: u32 = 0xFFFF_FFFA;

const HEADER_LEN: usize = 512;
const DIR_ENTRY_LEN: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: u64 = 0x1000;

/// A CFB specific error enum
#[derive(Debug)]
pub enum CfbError {
    /// IO error
    Io(io::Error),
    /// signature or structural invariants say this is not a CFB file
    NotCfb,
    /// header field holds an unsupported value
    Invalid {
        /// field name
        name: &'static str,
        /// expected value description
        expected: &'static str,
        /// value found
        found: u32,
    },
    /// sector index points past the end of the file
    SectorOutOfBounds(u32),
    /// sector chain ended before the advertised stream size
    IncompleteStream {
        /// stream name
        name: String,
        /// advertised size
        expected: u64,
        /// bytes covered by the chain
        actual: u64,
    },
    /// no stream entry with this name
    StreamNotFound(String),
    /// directory has no root storage entry
    EmptyRootDir,
}

from_err!(io::Error, CfbError, Io);

impl CfbError {
    pub(crate) fn is_not_in_format(&self) -> bool {
        matches!(self, CfbError::NotCfb)
    }
}

impl fmt::Display for CfbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfbError::Io(e) => write!(f, "{e}"),
            CfbError::NotCfb => write!(f, "not a compound file (no OLE signature)"),
            CfbError::Invalid {
                name,
                expected,
                found,
            } => write!(f, "invalid {name}, expecting {expected} found {found:#X}"),
            CfbError::SectorOutOfBounds(s) => write!(f, "sector {s} is out of bounds"),
            CfbError::IncompleteStream {
                name,
                expected,
                actual,
            } => write!(
                f,
                "incomplete read of stream '{name}': {actual} of {expected} bytes"
            ),
            CfbError::StreamNotFound(name) => write!(f, "stream '{name}' not found"),
            CfbError::EmptyRootDir => write!(f, "empty root directory"),
        }
    }
}

impl std::error::Error for CfbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CfbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectType {
    Unknown,
    Storage,
    Stream,
    RootStorage,
}

impl From<u8> for ObjectType {
    fn from(b: u8) -> ObjectType {
        match b {
            0x01 => ObjectType::Storage,
            0x02 => ObjectType::Stream,
            0x05 => ObjectType::RootStorage,
            _ => ObjectType::Unknown,
        }
    }
}

/// One directory entry: a node of the red-black sibling tree.
#[derive(Debug, Clone)]
struct DirEntry {
    name: String,
    typ: ObjectType,
    #[allow(dead_code)]
    left: u32,
    #[allow(dead_code)]
    right: u32,
    #[allow(dead_code)]
    child: u32,
    start: u32,
    size: u64,
}

impl DirEntry {
    fn from_slice(buf: &[u8], major_version: u16) -> DirEntry {
        let name_len = read_u16(&buf[64..66]) as usize;
        let name = if name_len >= 2 && name_len <= 64 && name_len % 2 == 0 {
            // drop the UTF-16 null terminator
            UTF_16LE.decode(&buf[..name_len - 2]).0.into_owned()
        } else {
            String::new()
        };
        let mut size = read_u64(&buf[120..128]);
        if major_version == 3 {
            // the upper half is unspecified for version 3
            size &= 0xFFFF_FFFF;
        }
        DirEntry {
            name,
            typ: ObjectType::from(buf[66]),
            left: read_u32(&buf[68..72]),
            right: read_u32(&buf[72..76]),
            child: read_u32(&buf[76..80]),
            start: read_u32(&buf[116..120]),
            size,
        }
    }
}

/// A parsed CFB container over an in-memory file.
pub struct Cfb {
    data: Arc<[u8]>,
    sector_size: usize,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    dir: Vec<DirEntry>,
    // sector-sized windows backing the root mini stream
    mini_stream: Vec<(usize, usize)>,
}

impl Cfb {
    /// Validates the container and loads the allocation tables and the
    /// directory.
    pub fn new(data: Arc<[u8]>) -> Result<Cfb, CfbError> {
        if data.len() < HEADER_LEN || read_u64(&data[..8]) != 0xE11A_B1A1_E011_CFD0 {
            return Err(CfbError::NotCfb);
        }
        if read_u16(&data[28..30]) != 0xFFFE {
            return Err(CfbError::NotCfb);
        }
        if data[8..24].iter().any(|b| *b != 0) {
            return Err(CfbError::NotCfb);
        }

        let version = read_u16(&data[26..28]);
        let sector_shift = read_u16(&data[30..32]);
        match (version, sector_shift) {
            (3, 9) | (4, 12) => (),
            (3, s) | (4, s) => {
                return Err(CfbError::Invalid {
                    name: "sector shift",
                    expected: "9 or 12",
                    found: s as u32,
                })
            }
            (v, _) => {
                return Err(CfbError::Invalid {
                    name: "major version",
                    expected: "3 or 4",
                    found: v as u32,
                })
            }
        }
        if read_u16(&data[32..34]) != 6 {
            return Err(CfbError::Invalid {
                name: "mini sector shift",
                expected: "6",
                found: read_u16(&data[32..34]) as u32,
            });
        }
        if read_u32(&data[56..60]) != MINI_STREAM_CUTOFF as u32 {
            return Err(CfbError::Invalid {
                name: "mini stream cutoff",
                expected: "0x1000",
                found: read_u32(&data[56..60]),
            });
        }

        let sector_size = 1usize << sector_shift;
        let num_mini_fat = read_u32(&data[64..68]) as usize;
        let num_difat = read_u32(&data[72..76]) as usize;

        let mut cfb = Cfb {
            data,
            sector_size,
            fat: Vec::new(),
            mini_fat: Vec::new(),
            dir: Vec::new(),
            mini_stream: Vec::new(),
        };

        cfb.load_fat(num_difat)?;
        cfb.load_mini_fat(read_u32(&cfb.data[60..64]), num_mini_fat)?;
        cfb.load_directory(read_u32(&cfb.data[48..52]), version)?;
        Ok(cfb)
    }

    fn sector(&self, id: u32) -> Result<&[u8], CfbError> {
        let start = (1 + id as usize) * self.sector_size;
        let end = start + self.sector_size;
        if end > self.data.len() {
            return Err(CfbError::SectorOutOfBounds(id));
        }
        Ok(&self.data[start..end])
    }

    /// The first 109 FAT sector pointers live in the header; any further
    /// ones are chained through DIFAT sectors.
    fn load_fat(&mut self, num_difat: usize) -> Result<(), CfbError> {
        let mut fat_sectors = Vec::new();
        for chunk in self.data[76..HEADER_LEN].chunks_exact(4) {
            let sid = read_u32(chunk);
            if sid == FREESECT {
                break;
            }
            fat_sectors.push(sid);
        }

        let entries = self.sector_size / 4;
        let mut difat_id = read_u32(&self.data[68..72]);
        let mut hops = 0;
        while difat_id != ENDOFCHAIN && difat_id != FREESECT {
            let table = read_u32_table(self.sector(difat_id)?);
            for &sid in &table[..entries - 1] {
                if sid != FREESECT && sid != ENDOFCHAIN {
                    fat_sectors.push(sid);
                }
            }
            difat_id = table[entries - 1];
            hops += 1;
            if hops > num_difat + 1 {
                debug!("DIFAT chain longer than advertised ({num_difat} sectors)");
                break;
            }
        }

        self.fat.reserve(entries * fat_sectors.len());
        for sid in fat_sectors {
            self.fat.extend(read_u32_table(self.sector(sid)?));
        }
        Ok(())
    }

    fn load_mini_fat(&mut self, start: u32, num_sectors: usize) -> Result<(), CfbError> {
        let mut sid = start;
        while sid != ENDOFCHAIN && sid != FREESECT {
            self.mini_fat.extend(read_u32_table(self.sector(sid)?));
            if self.mini_fat.len() >= num_sectors * (self.sector_size / 4) {
                break;
            }
            sid = self.next_in_fat(sid)?;
        }
        Ok(())
    }

    fn load_directory(&mut self, start: u32, version: u16) -> Result<(), CfbError> {
        let mut sid = start;
        let mut hops = 0;
        while sid <= MAXREGSECT {
            let entries: Vec<DirEntry> = self
                .sector(sid)?
                .chunks_exact(DIR_ENTRY_LEN)
                .map(|e| DirEntry::from_slice(e, version))
                .collect();
            self.dir.extend(entries);
            sid = self.next_in_fat(sid)?;
            hops += 1;
            if hops > self.fat.len() {
                break;
            }
        }

        match self.dir.first() {
            Some(root) if root.typ == ObjectType::RootStorage => {
                let (slices, covered) = self.chain(root.start, root.size)?;
                if covered < root.size && root.size > 0 {
                    return Err(CfbError::IncompleteStream {
                        name: root.name.clone(),
                        expected: root.size,
                        actual: covered,
                    });
                }
                self.mini_stream = slices;
                Ok(())
            }
            _ => Err(CfbError::EmptyRootDir),
        }
    }

    fn next_in_fat(&self, sid: u32) -> Result<u32, CfbError> {
        self.fat
            .get(sid as usize)
            .copied()
            .ok_or(CfbError::SectorOutOfBounds(sid))
    }

    // walks a FAT chain collecting (offset, len) windows totaling `size`
    fn chain(&self, start: u32, size: u64) -> Result<(Vec<(usize, usize)>, u64), CfbError> {
        let mut slices = Vec::with_capacity(1 + (size as usize >> 9));
        let mut sid = start;
        let mut remaining = size;
        let mut hops = 0;
        while sid <= MAXREGSECT && remaining > 0 {
            let offset = (1 + sid as usize) * self.sector_size;
            if offset + self.sector_size > self.data.len() {
                return Err(CfbError::SectorOutOfBounds(sid));
            }
            let take = (remaining as usize).min(self.sector_size);
            slices.push((offset, take));
            remaining -= take as u64;
            sid = self.next_in_fat(sid)?;
            hops += 1;
            if hops > self.fat.len() {
                break;
            }
        }
        Ok((slices, size - remaining))
    }

    // maps a mini-FAT chain onto windows of the root mini stream
    fn mini_chain(&self, start: u32, size: u64) -> Result<(Vec<(usize, usize)>, u64), CfbError> {
        let mut slices = Vec::with_capacity(1 + (size as usize >> 6));
        let mut sid = start;
        let mut remaining = size;
        let mut hops = 0;
        while sid <= MAXREGSECT && remaining > 0 {
            let pos = sid as usize * MINI_SECTOR_SIZE;
            let (sector_idx, offset) = (pos / self.sector_size, pos % self.sector_size);
            let (base, len) = *self
                .mini_stream
                .get(sector_idx)
                .ok_or(CfbError::SectorOutOfBounds(sid))?;
            let take = (remaining as usize).min(MINI_SECTOR_SIZE);
            if offset + take > len {
                return Err(CfbError::SectorOutOfBounds(sid));
            }
            slices.push((base + offset, take));
            remaining -= take as u64;
            sid = *self
                .mini_fat
                .get(sid as usize)
                .ok_or(CfbError::SectorOutOfBounds(sid))?;
            hops += 1;
            if hops > self.mini_fat.len() {
                break;
            }
        }
        Ok((slices, size - remaining))
    }

    /// Names of all stream entries in directory order.
    pub fn list(&self) -> Vec<String> {
        self.dir
            .iter()
            .filter(|d| d.typ == ObjectType::Stream)
            .map(|d| d.name.clone())
            .collect()
    }

    /// Checks whether a stream entry exists.
    pub fn has_stream(&self, name: &str) -> bool {
        self.dir
            .iter()
            .any(|d| d.typ == ObjectType::Stream && d.name == name)
    }

    /// Opens a named stream as a reader over the file bytes.
    ///
    /// Streams below the 4096-byte cutoff live in the root mini stream
    /// and follow the mini-FAT; everything else follows the regular FAT.
    pub fn open_stream(&self, name: &str) -> Result<SliceReader, CfbError> {
        let entry = self
            .dir
            .iter()
            .find(|d| d.typ == ObjectType::Stream && d.name == name)
            .ok_or_else(|| CfbError::StreamNotFound(name.to_string()))?;

        let (slices, covered) = if entry.size < MINI_STREAM_CUTOFF && !self.mini_stream.is_empty()
        {
            self.mini_chain(entry.start, entry.size)?
        } else {
            self.chain(entry.start, entry.size)?
        };
        if covered != entry.size {
            return Err(CfbError::IncompleteStream {
                name: entry.name.clone(),
                expected: entry.size,
                actual: covered,
            });
        }
        Ok(SliceReader::new(Arc::clone(&self.data), slices))
    }
}

/// A seekable reader presenting scattered byte windows as one stream.
pub struct SliceReader {
    data: Arc<[u8]>,
    slices: Vec<(usize, usize)>,
    len: u64,
    // cumulative start offset of each slice, built on first seek
    cumulative: Option<Vec<u64>>,
    idx: usize,
    pos_in_slice: usize,
}

impl SliceReader {
    pub(crate) fn new(data: Arc<[u8]>, slices: Vec<(usize, usize)>) -> SliceReader {
        let len = slices.iter().map(|(_, l)| *l as u64).sum();
        SliceReader {
            data,
            slices,
            len,
            cumulative: None,
            idx: 0,
            pos_in_slice: 0,
        }
    }

    /// Total stream length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True for zero-length streams.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current absolute position.
    pub fn position(&mut self) -> u64 {
        let (idx, pos, len) = (self.idx, self.pos_in_slice as u64, self.len);
        let base = self.cumulative().get(idx).copied().unwrap_or(len);
        base + pos
    }

    /// Reads the remaining bytes into one buffer.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity((self.len - self.position()) as usize);
        self.read_to_end(&mut out)?;
        Ok(out)
    }

    fn cumulative(&mut self) -> &[u64] {
        if self.cumulative.is_none() {
            let mut cumulative = Vec::with_capacity(self.slices.len());
            let mut total = 0u64;
            for (_, len) in &self.slices {
                cumulative.push(total);
                total += *len as u64;
            }
            self.cumulative = Some(cumulative);
        }
        self.cumulative.as_deref().expect("just built")
    }
}

impl Read for SliceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let Some(&(offset, len)) = self.slices.get(self.idx) else {
                break;
            };
            let available = len - self.pos_in_slice;
            if available == 0 {
                self.idx += 1;
                self.pos_in_slice = 0;
                continue;
            }
            let take = available.min(buf.len() - written);
            let start = offset + self.pos_in_slice;
            buf[written..written + take].copy_from_slice(&self.data[start..start + take]);
            written += take;
            self.pos_in_slice += take;
        }
        Ok(written)
    }
}

impl Seek for SliceReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position() as i64 + delta,
            SeekFrom::End(delta) => self.len as i64 + delta,
        };
        if target < 0 || target as u64 > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {target} outside stream of {} bytes", self.len),
            ));
        }
        let target = target as u64;
        if target == self.len {
            self.idx = self.slices.len();
            self.pos_in_slice = 0;
            return Ok(target);
        }
        // last slice whose start is <= target
        let (idx, base) = {
            let cumulative = self.cumulative();
            let idx = cumulative.partition_point(|&start| start <= target) - 1;
            (idx, cumulative[idx])
        };
        self.idx = idx;
        self.pos_in_slice = (target - base) as usize;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u32(buf: &mut [u8], offset: usize, v: u32) {
        buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn utf16_name(name: &str) -> ([u8; 64], u16) {
        let mut buf = [0u8; 64];
        let units: Vec<u16> = name.encode_utf16().collect();
        for (i, u) in units.iter().enumerate() {
            buf[2 * i..2 * i + 2].copy_from_slice(&u.to_le_bytes());
        }
        (buf, (units.len() as u16 + 1) * 2)
    }

    fn dir_entry(name: &str, typ: u8, start: u32, size: u32) -> [u8; 128] {
        let mut e = [0u8; 128];
        let (namebuf, name_len) = utf16_name(name);
        e[..64].copy_from_slice(&namebuf);
        e[64..66].copy_from_slice(&name_len.to_le_bytes());
        e[66] = typ;
        put_u32(&mut e, 68, FREESECT);
        put_u32(&mut e, 72, FREESECT);
        put_u32(&mut e, 76, FREESECT);
        put_u32(&mut e, 116, start);
        put_u32(&mut e, 120, size);
        e
    }

    // Synthetic v3 container: one FAT sector, one directory sector, a
    // 100-byte stream in the mini stream and a 5000-byte stream spread
    // over a deliberately out-of-order FAT chain.
    fn fixture() -> Vec<u8> {
        let tiny: Vec<u8> = (0u8..100).collect();
        let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let mut file = vec![0u8; 512 + 14 * 512];
        {
            let h = &mut file[..512];
            h[..8].copy_from_slice(&0xE11A_B1A1_E011_CFD0u64.to_le_bytes());
            h[26..28].copy_from_slice(&3u16.to_le_bytes()); // major version
            h[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
            h[30..32].copy_from_slice(&9u16.to_le_bytes()); // sector shift
            h[32..34].copy_from_slice(&6u16.to_le_bytes()); // mini shift
            put_u32(h, 44, 1); // one FAT sector
            put_u32(h, 48, 1); // directory at sector 1
            put_u32(h, 56, 0x1000); // mini cutoff
            put_u32(h, 60, 3); // mini FAT at sector 3
            put_u32(h, 64, 1); // one mini FAT sector
            put_u32(h, 68, ENDOFCHAIN); // no DIFAT chain
            put_u32(h, 76, 0); // header DIFAT: FAT is sector 0
            for i in 1..109 {
                put_u32(h, 76 + 4 * i, FREESECT);
            }
        }

        let sector = |id: usize| (1 + id) * 512;

        // FAT sector 0
        let chain: [(usize, u32); 14] = [
            (0, FATSECT),
            (1, ENDOFCHAIN),  // directory
            (2, ENDOFCHAIN),  // mini stream
            (3, ENDOFCHAIN),  // mini FAT
            (4, 6),           // big: 4 -> 6 -> 5 -> 7 -> 8 ... 13
            (5, 7),
            (6, 5),
            (7, 8),
            (8, 9),
            (9, 10),
            (10, 11),
            (11, 12),
            (12, 13),
            (13, ENDOFCHAIN),
        ];
        for (i, next) in chain {
            let base = sector(0);
            put_u32(&mut file, base + 4 * i, next);
        }
        for i in 14..128 {
            put_u32(&mut file, sector(0) + 4 * i, FREESECT);
        }

        // directory sector 1
        let entries = [
            dir_entry("Root Entry", 0x05, 2, 128),
            dir_entry("Tiny", 0x02, 0, 100),
            dir_entry("Big", 0x02, 4, 5000),
            [0u8; 128],
        ];
        for (i, e) in entries.iter().enumerate() {
            let base = sector(1) + i * 128;
            file[base..base + 128].copy_from_slice(e);
        }

        // mini stream at sector 2: two mini sectors backing "Tiny"
        file[sector(2)..sector(2) + 100].copy_from_slice(&tiny);

        // mini FAT at sector 3
        put_u32(&mut file, sector(3), 1);
        put_u32(&mut file, sector(3) + 4, ENDOFCHAIN);
        for i in 2..128 {
            put_u32(&mut file, sector(3) + 4 * i, FREESECT);
        }

        // big stream in chain order 4,6,5,7,8..13
        let order = [4usize, 6, 5, 7, 8, 9, 10, 11, 12, 13];
        for (i, sid) in order.iter().enumerate() {
            let part = &big[i * 512..(i * 512 + 512).min(big.len())];
            file[sector(*sid)..sector(*sid) + part.len()].copy_from_slice(part);
        }

        file
    }

    fn open(file: Vec<u8>) -> Result<Cfb, CfbError> {
        Cfb::new(Arc::from(file.into_boxed_slice()))
    }

    #[test]
    fn lists_stream_entries() {
        let cfb = open(fixture()).unwrap();
        assert_eq!(cfb.list(), vec!["Tiny".to_string(), "Big".to_string()]);
        assert!(cfb.has_stream("Big"));
        assert!(!cfb.has_stream("Root Entry"));
    }

    #[test]
    fn mini_stream_round_trip() {
        let cfb = open(fixture()).unwrap();
        let mut r = cfb.open_stream("Tiny").unwrap();
        assert_eq!(r.len(), 100);
        let bytes = r.read_to_vec().unwrap();
        assert_eq!(bytes, (0u8..100).collect::<Vec<u8>>());
    }

    #[test]
    fn scattered_chain_round_trip() {
        let cfb = open(fixture()).unwrap();
        let mut r = cfb.open_stream("Big").unwrap();
        assert_eq!(r.len(), 5000);
        let bytes = r.read_to_vec().unwrap();
        let expect: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(bytes, expect);
    }

    #[test]
    fn reader_seeks_across_slices() {
        let cfb = open(fixture()).unwrap();
        let mut r = cfb.open_stream("Big").unwrap();

        // boundary between chained sectors
        r.seek(SeekFrom::Start(510)).unwrap();
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf).unwrap();
        let expect: Vec<u8> = (510..514u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(&buf, expect.as_slice());

        r.seek(SeekFrom::End(-8)).unwrap();
        assert_eq!(r.position(), 4992);
        let rest = r.read_to_vec().unwrap();
        assert_eq!(rest.len(), 8);

        r.seek(SeekFrom::Start(4)).unwrap();
        r.seek(SeekFrom::Current(6)).unwrap();
        assert_eq!(r.position(), 10);

        assert!(r.seek(SeekFrom::Start(5001)).is_err());
        assert!(r.seek(SeekFrom::Current(-100_000)).is_err());
    }

    #[test]
    fn bad_signature_is_not_in_format() {
        let mut file = fixture();
        file[0] ^= 0xFF;
        match open(file) {
            Err(e) => assert!(e.is_not_in_format()),
            Ok(_) => panic!("expected NotCfb"),
        }
    }

    #[test]
    fn missing_stream() {
        let cfb = open(fixture()).unwrap();
        assert!(matches!(
            cfb.open_stream("nope"),
            Err(CfbError::StreamNotFound(_))
        ));
    }

    #[test]
    fn truncated_chain_is_incomplete() {
        let mut file = fixture();
        // cut the big chain one sector short: 12 -> ENDOFCHAIN
        put_u32(&mut file, 512 + 4 * 12, ENDOFCHAIN);
        let cfb = open(file).unwrap();
        assert!(matches!(
            cfb.open_stream("Big"),
            Err(CfbError::IncompleteStream { .. })
        ));
    }

    #[test]
    fn sector_past_end_is_corrupt() {
        let mut file = fixture();
        // point the big stream at a sector beyond the file
        let dir_base = 512 + 512 + 2 * 128; // entry "Big"
        put_u32(&mut file, dir_base + 116, 200);
        let cfb = open(file).unwrap();
        assert!(matches!(
            cfb.open_stream("Big"),
            Err(CfbError::SectorOutOfBounds(_))
        ));
    }
}
