//! Minimal FITS reader for mission light-curve products.
//!
//! Kepler, K2 and TESS light curves are distributed as FITS files: a
//! primary header unit carrying observation keywords, followed by a
//! binary-table extension (`XTENSION = 'BINTABLE'`) whose rows hold one
//! cadence each.  The format is organised in 2880-byte blocks; headers are
//! sequences of 80-character `KEYWORD = value / comment` cards terminated
//! by an `END` card, and binary data is stored big-endian.
//!
//! Only what light-curve ingestion needs is implemented: header parsing,
//! skipping of image data, and decoding of scalar numeric table columns
//! (`TFORMn` codes `D`, `E`, `K`, `J`, `I`, `B` with a repeat count of 1)
//! including `TSCALn`/`TZEROn` scaling and `TNULLn` blanks.

use std::io::{self, Read};

use crate::error::{Result, TransitError};

/// Size of a FITS logical record.
pub const BLOCK_SIZE: usize = 2880;

const CARD_SIZE: usize = 80;

/// Sanity limit on header length, in blocks.
const MAX_HEADER_BLOCKS: usize = 1024;

/// Largest `TFIELDS` the FITS standard allows.
const MAX_FIELDS: usize = 999;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// A typed header card value.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            HeaderValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(i) => Some(*i as f64),
            HeaderValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// An ordered list of header keywords and their values.
///
/// Commentary cards (`COMMENT`, `HISTORY`, blank keywords) are not kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a keyword.  Keywords are stored upper-case.
    pub fn insert(&mut self, key: &str, value: HeaderValue) {
        let key = key.to_ascii_uppercase();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)
            .ok_or_else(|| TransitError::format(format!("missing or non-integer header keyword {}", key)))
    }

    /// A required keyword that counts bytes, rows or fields.
    fn require_usize(&self, key: &str) -> Result<usize> {
        let value = self.require_i64(key)?;
        usize::try_from(value)
            .map_err(|_| TransitError::format(format!("{} must be non-negative, got {}", key, value)))
    }

    /// Size in bytes of the data unit following this header, excluding
    /// block padding.
    fn data_size(&self) -> Result<usize> {
        let naxis = self.get_i64("NAXIS").unwrap_or(0);
        if naxis == 0 {
            return Ok(0);
        }
        let bitpix = self.require_i64("BITPIX")?;
        let mut elements: i64 = 1;
        for axis in 1..=naxis {
            let len = self.require_i64(&format!("NAXIS{}", axis))?;
            if len < 0 {
                return Err(TransitError::format(format!("negative NAXIS{}", axis)));
            }
            elements = elements.saturating_mul(len);
        }
        let pcount = self.get_i64("PCOUNT").unwrap_or(0).max(0);
        let gcount = self.get_i64("GCOUNT").unwrap_or(1).max(1);
        let bytes = (bitpix.abs() / 8)
            .saturating_mul(gcount)
            .saturating_mul(elements.saturating_add(pcount));
        usize::try_from(bytes).map_err(|_| TransitError::format("data unit size overflows"))
    }
}

/// Parse one 80-character card into `(keyword, value)`.
///
/// Returns `None` for commentary cards and cards whose value cannot be
/// interpreted.
fn parse_card(card: &[u8]) -> Option<(String, HeaderValue)> {
    let text = String::from_utf8_lossy(card);
    let keyword = text.get(..8)?.trim_end();
    if keyword.is_empty() || text.get(8..10) != Some("= ") {
        return None;
    }
    let raw = text.get(10..)?.trim_start();

    if let Some(rest) = raw.strip_prefix('\'') {
        // Quoted string; a doubled quote is a literal quote.
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return Some((keyword.to_string(), HeaderValue::Str(value.trim_end().to_string())));
    }

    let token = raw.split('/').next().unwrap_or("").trim();
    let value = match token {
        "T" => HeaderValue::Bool(true),
        "F" => HeaderValue::Bool(false),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                HeaderValue::Int(i)
            } else {
                let f = token.replace(['D', 'd'], "E").parse::<f64>().ok()?;
                HeaderValue::Float(f)
            }
        }
    };
    Some((keyword.to_string(), value))
}

/// Read into `buf`, returning the number of bytes obtained before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Read a header unit.  Returns `Ok(None)` on a clean end of file.
fn read_header<R: Read>(reader: &mut R) -> Result<Option<Header>> {
    let mut header = Header::new();
    let mut block = [0u8; BLOCK_SIZE];

    for n_block in 0..MAX_HEADER_BLOCKS {
        let got = read_full(reader, &mut block)?;
        if got == 0 && n_block == 0 {
            return Ok(None);
        }
        if got < BLOCK_SIZE {
            return Err(TransitError::format("truncated FITS header"));
        }

        for card in block.chunks_exact(CARD_SIZE) {
            if card.starts_with(b"END") && card[3..].iter().all(|&b| b == b' ') {
                return Ok(Some(header));
            }
            if let Some((key, value)) = parse_card(card) {
                header.insert(&key, value);
            }
        }
    }

    Err(TransitError::format(format!(
        "FITS header exceeds {} blocks without END",
        MAX_HEADER_BLOCKS
    )))
}

fn padding(size: usize) -> usize {
    (BLOCK_SIZE - size % BLOCK_SIZE) % BLOCK_SIZE
}

/// `size` rounded up to a whole number of blocks.
fn padded(size: usize) -> Result<usize> {
    size.checked_add(padding(size))
        .ok_or_else(|| TransitError::format("data unit size overflows"))
}

/// Discard `n` bytes; a short final block is tolerated.
fn skip<R: Read>(reader: &mut R, n: usize) -> Result<u64> {
    Ok(io::copy(&mut reader.by_ref().take(n as u64), &mut io::sink())?)
}

// ---------------------------------------------------------------------------
// Binary table
// ---------------------------------------------------------------------------

/// Cell type of a binary-table column (`TFORMn`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TForm {
    pub repeat: usize,
    pub code: char,
}

impl TForm {
    pub fn parse(tform: &str) -> Result<Self> {
        let tform = tform.trim();
        let digits: String = tform.chars().take_while(|c| c.is_ascii_digit()).collect();
        let code = tform[digits.len()..]
            .chars()
            .next()
            .ok_or_else(|| TransitError::format(format!("empty TFORM '{}'", tform)))?;
        let repeat = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| TransitError::format(format!("bad TFORM repeat '{}'", tform)))?
        };
        Ok(Self { repeat, code })
    }

    /// Width of one cell in bytes.
    pub fn width(&self) -> Result<usize> {
        let per = match self.code {
            'X' => return Ok(self.repeat.div_ceil(8)),
            'L' | 'B' | 'A' => 1,
            'I' => 2,
            'J' | 'E' => 4,
            'K' | 'D' | 'C' | 'P' => 8,
            'M' | 'Q' => 16,
            other => {
                return Err(TransitError::format(format!("unknown TFORM code '{}'", other)))
            }
        };
        self.repeat
            .checked_mul(per)
            .ok_or_else(|| TransitError::format(format!("TFORM repeat {} overflows", self.repeat)))
    }
}

/// A binary-table column definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub form: TForm,
    pub offset: usize,
    pub unit: Option<String>,
    scale: f64,
    zero: f64,
    null: Option<i64>,
}

/// A decoded `BINTABLE` extension: its header, column layout and the raw
/// row bytes.
#[derive(Clone, Debug)]
pub struct BinTable {
    pub header: Header,
    pub columns: Vec<Column>,
    row_len: usize,
    n_rows: usize,
    data: Vec<u8>,
}

impl BinTable {
    fn from_header(header: Header, data: Vec<u8>) -> Result<Self> {
        let row_len = header.require_usize("NAXIS1")?;
        let n_rows = header.require_usize("NAXIS2")?;
        let n_fields = header.require_usize("TFIELDS")?;
        if n_fields > MAX_FIELDS {
            return Err(TransitError::format(format!(
                "TFIELDS = {} exceeds the limit of {}",
                n_fields, MAX_FIELDS
            )));
        }

        let mut columns = Vec::with_capacity(n_fields);
        let mut offset: usize = 0;
        for i in 1..=n_fields {
            let form = header
                .get_str(&format!("TFORM{}", i))
                .ok_or_else(|| TransitError::format(format!("missing TFORM{}", i)))
                .and_then(TForm::parse)?;
            let name = header
                .get_str(&format!("TTYPE{}", i))
                .map(str::to_string)
                .unwrap_or_else(|| format!("COL{}", i));
            columns.push(Column {
                name,
                form,
                offset,
                unit: header.get_str(&format!("TUNIT{}", i)).map(str::to_string),
                scale: header.get_f64(&format!("TSCAL{}", i)).unwrap_or(1.0),
                zero: header.get_f64(&format!("TZERO{}", i)).unwrap_or(0.0),
                null: header.get_i64(&format!("TNULL{}", i)),
            });
            offset = offset
                .checked_add(form.width()?)
                .ok_or_else(|| TransitError::format("column widths overflow"))?;
        }

        if offset > row_len {
            return Err(TransitError::format(format!(
                "column widths ({} bytes) exceed NAXIS1 ({})",
                offset, row_len
            )));
        }
        let table_len = row_len
            .checked_mul(n_rows)
            .ok_or_else(|| TransitError::format("NAXIS1 × NAXIS2 overflows"))?;
        if data.len() < table_len {
            return Err(TransitError::format(format!(
                "table data truncated: expected {} bytes, got {}",
                table_len,
                data.len()
            )));
        }

        Ok(Self {
            header,
            columns,
            row_len,
            n_rows,
            data,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Look up a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.trim().eq_ignore_ascii_case(name))
    }

    /// Decode a scalar numeric column into `f64`.
    ///
    /// Blank integer cells (`TNULLn`) decode to NaN.
    pub fn read_f64_column(&self, name: &str) -> Result<Vec<f64>> {
        let col = self
            .column(name)
            .ok_or_else(|| TransitError::format(format!("missing column {}", name)))?;
        if col.form.repeat != 1 {
            return Err(TransitError::format(format!(
                "column {} has repeat count {}, expected a scalar",
                col.name, col.form.repeat
            )));
        }

        let decode: fn(&[u8]) -> (f64, Option<i64>) = match col.form.code {
            'D' => |b: &[u8]| (f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]), None),
            'E' => |b: &[u8]| (f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64, None),
            'K' => |b: &[u8]| {
                let v = i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                (v as f64, Some(v))
            },
            'J' => |b: &[u8]| {
                let v = i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64;
                (v as f64, Some(v))
            },
            'I' => |b: &[u8]| {
                let v = i16::from_be_bytes([b[0], b[1]]) as i64;
                (v as f64, Some(v))
            },
            'B' => |b: &[u8]| (b[0] as f64, Some(b[0] as i64)),
            other => {
                return Err(TransitError::format(format!(
                    "column {} has non-numeric type '{}'",
                    col.name, other
                )))
            }
        };

        let width = col.form.width()?;
        Ok(self
            .data
            .chunks_exact(self.row_len)
            .take(self.n_rows)
            .map(|row| {
                let (value, raw) = decode(&row[col.offset..col.offset + width]);
                match (raw, col.null) {
                    (Some(r), Some(null)) if r == null => f64::NAN,
                    _ => col.zero + col.scale * value,
                }
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// The parts of a FITS file relevant to light-curve ingestion.
#[derive(Clone, Debug)]
pub struct FitsFile {
    pub primary: Header,
    pub tables: Vec<BinTable>,
}

impl FitsFile {
    /// Parse a FITS stream.  Image extensions are skipped; every binary
    /// table is decoded.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let primary = read_header(&mut reader)?
            .ok_or_else(|| TransitError::format("empty FITS file"))?;
        if primary.get("SIMPLE") != Some(&HeaderValue::Bool(true)) {
            return Err(TransitError::format("file does not start with SIMPLE = T"));
        }
        let size = primary.data_size()?;
        skip(&mut reader, padded(size)?)?;

        let mut tables = Vec::new();
        while let Some(header) = read_header(&mut reader)? {
            let size = header.data_size()?;
            if header.get_str("XTENSION").map(str::trim) == Some("BINTABLE") {
                // Grow with the bytes actually present, not the header's claim.
                let mut data = Vec::new();
                let got = reader.by_ref().take(size as u64).read_to_end(&mut data)?;
                if got < size {
                    return Err(TransitError::format(format!(
                        "truncated BINTABLE data: expected {} bytes, got {}",
                        size, got
                    )));
                }
                skip(&mut reader, padding(size))?;
                tables.push(BinTable::from_header(header, data)?);
            } else {
                skip(&mut reader, padded(size)?)?;
            }
        }

        Ok(Self { primary, tables })
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
