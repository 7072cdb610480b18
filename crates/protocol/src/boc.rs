//! Bag-of-cells deserialization.
//!
//! The bridge never builds transactions, but it must reject payloads that are
//! not well-formed cell trees before they reach the user. This module parses
//! the standard serialization (`b5ee9c72`) as well as the two legacy indexed
//! variants, verifies the optional CRC-32C trailer, and materializes the cell
//! DAG so callers can inspect depth and reference counts.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crc::{CRC_32_ISCSI, Crc};

use crate::error::ProtocolError;

const MAGIC_GENERIC: u32 = 0xb5ee_9c72;
const MAGIC_INDEXED: u32 = 0x68ff_65f3;
const MAGIC_INDEXED_CRC32: u32 = 0xacc3_a728;

/// Maximum number of references a single cell may hold.
const MAX_REFS: usize = 4;

const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// A deserialized cell: up to 1023 data bits and up to four references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
    exotic: bool,
}

impl Cell {
    /// Data bytes. When `bit_len` is not a multiple of 8 the trailing bits of
    /// the last byte are zero.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of meaningful data bits.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Child cells in serialization order.
    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    /// Whether this is an exotic (pruned, library, or Merkle) cell.
    pub fn is_exotic(&self) -> bool {
        self.exotic
    }

    /// Depth of the tree rooted at this cell. A leaf has depth 0.
    pub fn depth(&self) -> usize {
        self.refs
            .iter()
            .map(|r| r.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a base64-encoded BOC and returns its root cells.
pub fn parse_base64(encoded: &str) -> Result<Vec<Arc<Cell>>, ProtocolError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| ProtocolError::InvalidBoc("invalid base64"))?;
    parse(&bytes)
}

/// Parses a BOC and returns its root cells.
pub fn parse(bytes: &[u8]) -> Result<Vec<Arc<Cell>>, ProtocolError> {
    let mut r = Reader::new(bytes);
    let magic = r.u32_be()?;

    let header = match magic {
        MAGIC_GENERIC => {
            let flags = r.u8()?;
            Header {
                has_index: flags & 0x80 != 0,
                has_crc: flags & 0x40 != 0,
                size: flags & 0x07,
                explicit_roots: true,
                reserved: (flags >> 3) & 0x03,
            }
        }
        MAGIC_INDEXED | MAGIC_INDEXED_CRC32 => {
            let size = r.u8()?;
            Header {
                has_index: true,
                has_crc: magic == MAGIC_INDEXED_CRC32,
                size,
                explicit_roots: false,
                reserved: 0,
            }
        }
        _ => return Err(ProtocolError::InvalidBoc("unknown magic")),
    };

    if header.reserved != 0 {
        return Err(ProtocolError::InvalidBoc("reserved flag bits set"));
    }
    let size = usize::from(header.size);
    if !(1..=4).contains(&size) {
        return Err(ProtocolError::InvalidBoc("reference size must be 1..=4 bytes"));
    }
    let off_bytes = usize::from(r.u8()?);
    if !(1..=8).contains(&off_bytes) {
        return Err(ProtocolError::InvalidBoc("offset size must be 1..=8 bytes"));
    }

    let cell_count = r.uint(size)?;
    let root_count = r.uint(size)?;
    let absent = r.uint(size)?;
    let total_size = r.uint(off_bytes)?;

    if cell_count == 0 || root_count == 0 || root_count > cell_count {
        return Err(ProtocolError::InvalidBoc("bad cell or root count"));
    }
    if absent != 0 {
        return Err(ProtocolError::InvalidBoc("absent cells are not supported"));
    }

    let roots = if header.explicit_roots {
        let mut roots = Vec::with_capacity(root_count);
        for _ in 0..root_count {
            let idx = r.uint(size)?;
            if idx >= cell_count {
                return Err(ProtocolError::InvalidBoc("root index out of range"));
            }
            roots.push(idx);
        }
        roots
    } else {
        if root_count != 1 {
            return Err(ProtocolError::InvalidBoc("legacy format allows one root"));
        }
        vec![0]
    };

    if header.has_index {
        let index_len = cell_count
            .checked_mul(off_bytes)
            .ok_or(ProtocolError::InvalidBoc("index overflow"))?;
        r.skip(index_len)?;
    }

    let cells_start = r.pos;
    let raw_cells = (0..cell_count)
        .map(|idx| read_raw_cell(&mut r, idx, cell_count, size))
        .collect::<Result<Vec<_>, _>>()?;
    if r.pos - cells_start != total_size {
        return Err(ProtocolError::InvalidBoc("cell data size mismatch"));
    }

    if header.has_crc {
        let body_end = r.pos;
        let expected = r.u32_le()?;
        if CRC32C.checksum(&bytes[..body_end]) != expected {
            return Err(ProtocolError::InvalidBoc("crc32c mismatch"));
        }
    }
    if r.remaining() != 0 {
        return Err(ProtocolError::InvalidBoc("trailing bytes"));
    }

    // References always point forward, so building back to front sees every
    // child before its parents.
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for (idx, raw) in raw_cells.into_iter().enumerate().rev() {
        let refs = raw
            .refs
            .iter()
            .map(|&child| {
                built[child]
                    .clone()
                    .ok_or(ProtocolError::InvalidBoc("dangling reference"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        built[idx] = Some(Arc::new(Cell {
            data: raw.data,
            bit_len: raw.bit_len,
            refs,
            exotic: raw.exotic,
        }));
    }

    roots
        .into_iter()
        .map(|idx| built[idx].clone().ok_or(ProtocolError::InvalidBoc("missing root")))
        .collect()
}

struct Header {
    has_index: bool,
    has_crc: bool,
    size: u8,
    explicit_roots: bool,
    reserved: u8,
}

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
    exotic: bool,
}

fn read_raw_cell(
    r: &mut Reader<'_>,
    idx: usize,
    cell_count: usize,
    size: usize,
) -> Result<RawCell, ProtocolError> {
    let d1 = r.u8()?;
    let d2 = r.u8()?;

    let ref_count = usize::from(d1 & 0x07);
    if ref_count > MAX_REFS {
        return Err(ProtocolError::InvalidBoc("too many references"));
    }
    let exotic = d1 & 0x08 != 0;
    let with_hashes = d1 & 0x10 != 0;
    let level_mask = d1 >> 5;

    if with_hashes {
        let hash_count = level_mask.count_ones() as usize + 1;
        // Each stored hash is 32 bytes plus a 2-byte depth.
        r.skip(hash_count * (32 + 2))?;
    }

    let data_len = usize::from(d2 / 2 + d2 % 2);
    let data = r.take(data_len)?.to_vec();
    let bit_len = if d2 % 2 == 0 {
        data_len * 8
    } else {
        let last = data[data_len - 1];
        if last == 0 {
            return Err(ProtocolError::InvalidBoc("missing completion tag"));
        }
        (data_len - 1) * 8 + 7 - last.trailing_zeros() as usize
    };
    if bit_len > 1023 {
        return Err(ProtocolError::InvalidBoc("cell data exceeds 1023 bits"));
    }

    let mut data = data;
    if d2 % 2 == 1 {
        // Drop the completion tag so `data` holds only payload bits.
        let last = data_len - 1;
        let tag = 1u8 << data[last].trailing_zeros();
        data[last] &= !tag;
    }

    let mut refs = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        let child = r.uint(size)?;
        if child <= idx || child >= cell_count {
            return Err(ProtocolError::InvalidBoc("reference must point forward"));
        }
        refs.push(child);
    }

    Ok(RawCell {
        data,
        bit_len,
        refs,
        exotic,
    })
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::InvalidBoc("unexpected end of data"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u32_be(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32_le(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Big-endian unsigned integer of `n` bytes (n <= 8).
    fn uint(&mut self, n: usize) -> Result<usize, ProtocolError> {
        let bytes = self.take(n)?;
        let value = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        usize::try_from(value).map_err(|_| ProtocolError::InvalidBoc("integer overflow"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
