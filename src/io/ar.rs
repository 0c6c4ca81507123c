//! Sequential reader for Unix `ar` archives.
//!
//! Supports both the BSD (`#1/len` inline long names) and GNU (`//`
//! long-name table) extensions. The reader yields one member header at a
//! time and then acts as a `Read` over that member's data.

use std::io::{self, Read};

use thiserror::Error;

const AR_MAGIC: &[u8] = b"!<arch>\n";
const HEADER_SIZE: usize = 60;
const HEADER_MAGIC: &[u8] = b"`\n";

#[derive(Debug, Error)]
pub enum ArError {
    #[error("ar: invalid global header magic")]
    InvalidMagic,
    #[error("ar: invalid entry header")]
    InvalidHeader,
    #[error("ar: {0}")]
    Io(#[from] io::Error),
}

/// Metadata for a single archive member.
#[derive(Debug, Clone, PartialEq)]
pub struct ArHeader {
    pub name: String,
    pub size: u64,
}

#[derive(Debug)]
pub struct ArReader<R: Read> {
    r: R,
    remaining: u64,
    padded: bool,
    gnu_names: Vec<u8>,
}

impl<R: Read> ArReader<R> {
    /// Reads and validates the global archive header.
    pub fn new(mut r: R) -> Result<ArReader<R>, ArError> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ArError::InvalidMagic
            } else {
                ArError::Io(e)
            }
        })?;
        if magic != AR_MAGIC {
            return Err(ArError::InvalidMagic);
        }
        Ok(ArReader {
            r,
            remaining: 0,
            padded: false,
            gnu_names: Vec::new(),
        })
    }

    /// Advances to the next member and returns its header, or `None` at the
    /// end of the archive.
    pub fn next_member(&mut self) -> Result<Option<ArHeader>, ArError> {
        loop {
            // Skip any unread data and padding from the previous member.
            if self.remaining > 0 {
                skip(&mut self.r, self.remaining)?;
                self.remaining = 0;
            }
            if self.padded {
                skip(&mut self.r, 1)?;
                self.padded = false;
            }

            let mut hdr = [0u8; HEADER_SIZE];
            match read_full(&mut self.r, &mut hdr)? {
                0 => return Ok(None),
                n if n < HEADER_SIZE => return Err(ArError::InvalidHeader),
                _ => {}
            }

            if &hdr[58..60] != HEADER_MAGIC {
                return Err(ArError::InvalidHeader);
            }

            let size: u64 = field(&hdr[48..58])
                .parse()
                .map_err(|_| ArError::InvalidHeader)?;
            let orig_size = size;

            let raw_name = String::from_utf8_lossy(&hdr[0..16])
                .trim_end_matches(' ')
                .to_string();

            // BSD extension: the name length follows "#1/" and the name
            // itself is prepended to the member data.
            if let Some(len_str) = raw_name.strip_prefix("#1/") {
                let name_len: u64 = len_str.parse().map_err(|_| ArError::InvalidHeader)?;
                if name_len > size {
                    return Err(ArError::InvalidHeader);
                }
                let mut name = vec![0u8; name_len as usize];
                self.r.read_exact(&mut name).map_err(eof_is_invalid)?;

                self.remaining = size - name_len;
                self.padded = orig_size % 2 != 0;
                let name = String::from_utf8_lossy(&name)
                    .trim_end_matches('\0')
                    .to_string();
                return Ok(Some(ArHeader {
                    name,
                    size: self.remaining,
                }));
            }

            // GNU extension: "//" is a pseudo-member holding the long-name
            // table referenced by "/offset" names.
            if raw_name == "//" {
                let mut table = vec![0u8; size as usize];
                self.r.read_exact(&mut table).map_err(eof_is_invalid)?;
                self.gnu_names = table;
                if orig_size % 2 != 0 {
                    skip(&mut self.r, 1)?;
                }
                continue;
            }

            let mut name = raw_name.trim_end_matches('/').to_string();
            if let Some(offset_str) = raw_name.strip_prefix('/') {
                if !offset_str.is_empty() {
                    if let Ok(offset) = offset_str.parse::<usize>() {
                        name = resolve_gnu_long_name(&self.gnu_names, offset)
                            .ok_or(ArError::InvalidHeader)?;
                    }
                }
            }

            self.remaining = size;
            self.padded = orig_size % 2 != 0;
            return Ok(Some(ArHeader { name, size }));
        }
    }
}

impl<R: Read> Read for ArReader<R> {
    /// Reads the current member's data, returning EOF once it is consumed.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining as usize);
        let n = self.r.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn field(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or("").trim()
}

fn skip<R: Read>(r: &mut R, n: u64) -> Result<(), ArError> {
    let copied = io::copy(&mut r.take(n), &mut io::sink())?;
    if copied < n {
        return Err(ArError::InvalidHeader);
    }
    Ok(())
}

/// Reads as many bytes as available, returning the count; short reads only
/// happen at the end of the stream.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize, ArError> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn eof_is_invalid(e: io::Error) -> ArError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ArError::InvalidHeader
    } else {
        ArError::Io(e)
    }
}

fn resolve_gnu_long_name(table: &[u8], offset: usize) -> Option<String> {
    if offset >= table.len() {
        return None;
    }
    let rest = &table[offset..];
    let end = rest
        .windows(2)
        .position(|w| w == b"/\n")
        .or_else(|| rest.iter().position(|b| *b == b'\n'))
        .unwrap_or(rest.len());
    Some(String::from_utf8_lossy(&rest[..end]).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn member(name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("{name:<16}").as_bytes());
        out.extend_from_slice(b"0           "); // mtime
        out.extend_from_slice(b"0     0     "); // uid gid
        out.extend_from_slice(b"100644  ");
        out.extend_from_slice(format!("{:<10}", data.len()).as_bytes());
        out.extend_from_slice(b"`\n");
        out.extend_from_slice(data);
        if data.len() % 2 != 0 {
            out.push(b'\n');
        }
        out
    }

    fn bsd_member(name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let total = name.len() + data.len();
        out.extend_from_slice(format!("{:<16}", format!("#1/{}", name.len())).as_bytes());
        out.extend_from_slice(b"0           ");
        out.extend_from_slice(b"0     0     ");
        out.extend_from_slice(b"100644  ");
        out.extend_from_slice(format!("{total:<10}").as_bytes());
        out.extend_from_slice(b"`\n");
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);
        if total % 2 != 0 {
            out.push(b'\n');
        }
        out
    }

    fn read_member<R: Read>(ar: &mut ArReader<R>) -> (ArHeader, Vec<u8>) {
        let hdr = ar.next_member().unwrap().expect("member");
        let mut data = Vec::new();
        ar.read_to_end(&mut data).unwrap();
        (hdr, data)
    }

    #[test]
    fn reads_plain_members() {
        let mut archive = AR_MAGIC.to_vec();
        archive.extend(member("hello.txt/", b"hello"));
        archive.extend(member("data.bin/", b"abcd"));

        let mut ar = ArReader::new(Cursor::new(archive)).unwrap();
        let (hdr, data) = read_member(&mut ar);
        assert_eq!(hdr.name, "hello.txt");
        assert_eq!(data, b"hello");

        let (hdr, data) = read_member(&mut ar);
        assert_eq!(hdr.name, "data.bin");
        assert_eq!(data, b"abcd");

        assert!(ar.next_member().unwrap().is_none());
    }

    #[test]
    fn resolves_gnu_and_bsd_long_names() {
        let table = b"a-very-long-member-name.tar.xz/\nanother-long-one.txt/\n";
        let mut archive = AR_MAGIC.to_vec();
        archive.extend(member("//", table));
        archive.extend(member("/0", b"first"));
        archive.extend(member("/32", b"second"));
        archive.extend(bsd_member("bsd-long-name.dat", b"third!"));

        let mut ar = ArReader::new(Cursor::new(archive)).unwrap();

        let (hdr, data) = read_member(&mut ar);
        assert_eq!(hdr.name, "a-very-long-member-name.tar.xz");
        assert_eq!(data, b"first");

        let (hdr, data) = read_member(&mut ar);
        assert_eq!(hdr.name, "another-long-one.txt");
        assert_eq!(data, b"second");

        let (hdr, data) = read_member(&mut ar);
        assert_eq!(hdr.name, "bsd-long-name.dat");
        assert_eq!(data, b"third!");

        assert!(ar.next_member().unwrap().is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let err = ArReader::new(Cursor::new(b"not an archive".to_vec())).unwrap_err();
        assert!(matches!(err, ArError::InvalidMagic));
    }

    #[test]
    fn rejects_truncated_header() {
        let mut archive = AR_MAGIC.to_vec();
        archive.extend_from_slice(b"short");
        let mut ar = ArReader::new(Cursor::new(archive)).unwrap();
        assert!(matches!(ar.next_member(), Err(ArError::InvalidHeader)));
    }
}
