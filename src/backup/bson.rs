//! Structural scanning of raw BSON document streams.
//!
//! The dump files are sequences of BSON documents, each starting with a
//! 32-bit little-endian length that includes the four length bytes.
//! Counting only needs to consume whole documents; the few places that
//! filter on fields use a minimal element walker rather than a full
//! decoder.

use std::io::Read;

use super::errors::{BackupResult, Error};

/// Calls `callback` with the raw bytes of each document in the stream,
/// length prefix included.
pub fn each_document<R: Read>(
    mut source: R,
    mut callback: impl FnMut(&[u8]) -> BackupResult<()>,
) -> BackupResult<()> {
    loop {
        let header = match read_length(&mut source)? {
            Some(header) => header,
            None => return Ok(()),
        };
        let size = u32::from_le_bytes(header) as usize;
        if size < 5 {
            return Err(Error::InvalidBson(format!("document length {}", size)));
        }
        let mut doc = vec![0u8; size];
        doc[..4].copy_from_slice(&header);
        source
            .read_exact(&mut doc[4..])
            .map_err(|_| Error::TruncatedBson)?;
        callback(&doc)?;
    }
}

/// Counts the documents in a BSON stream without decoding them.
pub fn count_documents<R: Read>(source: R) -> BackupResult<usize> {
    let mut count = 0;
    each_document(source, |_| {
        count += 1;
        Ok(())
    })?;
    Ok(count)
}

/// Returns the value of a top-level string field, if present.
pub fn string_field(doc: &[u8], name: &str) -> BackupResult<Option<String>> {
    for element in elements(doc)? {
        if element.name == name && element.type_byte == 0x02 {
            return Ok(Some(decode_string(element.payload)?));
        }
    }
    Ok(None)
}

/// Returns the values of a top-level array field holding integers, if
/// present. Non-integer entries are an error.
pub fn int_array_field(doc: &[u8], name: &str) -> BackupResult<Option<Vec<i64>>> {
    for element in elements(doc)? {
        if element.name != name || element.type_byte != 0x04 {
            continue;
        }
        let mut values = Vec::new();
        for entry in elements(element.payload)? {
            match entry.type_byte {
                0x10 => {
                    let bytes: [u8; 4] = entry
                        .payload
                        .try_into()
                        .map_err(|_| Error::InvalidBson("short int32".to_string()))?;
                    values.push(i32::from_le_bytes(bytes) as i64);
                }
                0x12 => {
                    let bytes: [u8; 8] = entry
                        .payload
                        .try_into()
                        .map_err(|_| Error::InvalidBson("short int64".to_string()))?;
                    values.push(i64::from_le_bytes(bytes));
                }
                other => {
                    return Err(Error::InvalidBson(format!(
                        "array entry type {:#04x} in {:?}",
                        other, name
                    )))
                }
            }
        }
        return Ok(Some(values));
    }
    Ok(None)
}

struct Element<'a> {
    name: &'a str,
    type_byte: u8,
    payload: &'a [u8],
}

// Walks the top-level elements of one document.
fn elements(doc: &[u8]) -> BackupResult<Vec<Element<'_>>> {
    if doc.len() < 5 || doc[doc.len() - 1] != 0 {
        return Err(Error::InvalidBson("missing document terminator".to_string()));
    }
    let declared = u32::from_le_bytes(doc[..4].try_into().expect("length checked")) as usize;
    if declared != doc.len() {
        return Err(Error::InvalidBson(format!(
            "declared length {} but got {} bytes",
            declared,
            doc.len()
        )));
    }

    let mut out = Vec::new();
    let mut index = 4;
    let end = doc.len() - 1;
    while index < end {
        let type_byte = doc[index];
        index += 1;
        let name_end = doc[index..end]
            .iter()
            .position(|&b| b == 0)
            .map(|p| index + p)
            .ok_or_else(|| Error::InvalidBson("unterminated element name".to_string()))?;
        let name = std::str::from_utf8(&doc[index..name_end])
            .map_err(|_| Error::InvalidBson("element name is not utf-8".to_string()))?;
        index = name_end + 1;

        let size = element_size(type_byte, &doc[index..end])?;
        let payload = &doc[index..index + size];
        out.push(Element {
            name,
            type_byte,
            payload,
        });
        index += size;
    }
    Ok(out)
}

// Size in bytes of one element value starting at `rest`.
fn element_size(type_byte: u8, rest: &[u8]) -> BackupResult<usize> {
    let need = |n: usize| -> BackupResult<usize> {
        if rest.len() < n {
            Err(Error::TruncatedBson)
        } else {
            Ok(n)
        }
    };
    let prefixed = || -> BackupResult<usize> {
        need(4)?;
        let len = u32::from_le_bytes(rest[..4].try_into().expect("length checked")) as usize;
        need(4 + len)
    };
    let embedded = || -> BackupResult<usize> {
        need(4)?;
        let len = u32::from_le_bytes(rest[..4].try_into().expect("length checked")) as usize;
        if len < 5 {
            return Err(Error::InvalidBson(format!("embedded document length {}", len)));
        }
        need(len)
    };

    match type_byte {
        0x01 | 0x09 | 0x11 | 0x12 => need(8),
        // string, javascript, symbol: length-prefixed bytes
        0x02 | 0x0D | 0x0E => prefixed(),
        // embedded document or array: the length covers the whole value
        0x03 | 0x04 | 0x0F => embedded(),
        0x05 => {
            need(5)?;
            let len = u32::from_le_bytes(rest[..4].try_into().expect("length checked")) as usize;
            need(5 + len)
        }
        0x06 | 0x0A | 0x7F | 0xFF => Ok(0),
        0x07 => need(12),
        0x08 => need(1),
        0x0B => {
            // two consecutive cstrings
            let first = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(Error::TruncatedBson)?;
            let second = rest[first + 1..]
                .iter()
                .position(|&b| b == 0)
                .ok_or(Error::TruncatedBson)?;
            Ok(first + second + 2)
        }
        0x0C => {
            need(4)?;
            let len = u32::from_le_bytes(rest[..4].try_into().expect("length checked")) as usize;
            need(4 + len + 12)
        }
        0x10 => need(4),
        0x13 => need(16),
        other => Err(Error::InvalidBson(format!("unknown element type {:#04x}", other))),
    }
}

fn decode_string(payload: &[u8]) -> BackupResult<String> {
    if payload.len() < 5 {
        return Err(Error::InvalidBson("short string".to_string()));
    }
    // The length includes the trailing nul.
    let text = &payload[4..payload.len() - 1];
    String::from_utf8(text.to_vec())
        .map_err(|_| Error::InvalidBson("string is not utf-8".to_string()))
}

// Reads a document length prefix; None means a clean end of stream.
fn read_length<R: Read>(source: &mut R) -> BackupResult<Option<[u8; 4]>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        let n = source.read(&mut buf[filled..]).map_err(Error::BsonIo)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::TruncatedBson);
        }
        filled += n;
    }
    Ok(Some(buf))
}


#[cfg(test)]
mod tests {
    use super::testing::DocBuilder;
    use super::*;

    #[test]
    fn test_count_empty_stream() {
        assert_eq!(count_documents(&[][..]).unwrap(), 0);
    }

    #[test]
    fn test_count_documents() {
        let mut stream = Vec::new();
        stream.extend(DocBuilder::new().string("name", "a").build());
        stream.extend(DocBuilder::new().string("name", "b").build());
        stream.extend(DocBuilder::new().int32("n", 7).build());
        assert_eq!(count_documents(&stream[..]).unwrap(), 3);
    }

    #[test]
    fn test_truncated_stream() {
        let mut stream = DocBuilder::new().string("name", "a").build();
        stream.truncate(stream.len() - 2);
        assert!(matches!(
            count_documents(&stream[..]).unwrap_err(),
            Error::TruncatedBson
        ));
    }

    #[test]
    fn test_undersized_length_rejected() {
        let stream = 3u32.to_le_bytes();
        assert!(matches!(
            count_documents(&stream[..]).unwrap_err(),
            Error::InvalidBson(_)
        ));
    }

    #[test]
    fn test_string_field() {
        let doc = DocBuilder::new()
            .int32("ignored", 3)
            .string("model-uuid", "e2a6a1e5")
            .build();
        assert_eq!(
            string_field(&doc, "model-uuid").unwrap(),
            Some("e2a6a1e5".to_string())
        );
        assert_eq!(string_field(&doc, "missing").unwrap(), None);
    }

    #[test]
    fn test_int_array_field() {
        let doc = DocBuilder::new()
            .string("model-uuid", "x")
            .int_array("jobs", &[1, 2])
            .build();
        assert_eq!(int_array_field(&doc, "jobs").unwrap(), Some(vec![1, 2]));
        assert_eq!(int_array_field(&doc, "nope").unwrap(), None);
    }

    #[test]
    fn test_int64_values() {
        let doc = DocBuilder::new().int64("big", 1 << 40).build();
        // Scanning skips unmatched fields without decoding problems.
        assert_eq!(string_field(&doc, "other").unwrap(), None);
    }

    #[test]
    fn test_documents_passed_whole() {
        let first = DocBuilder::new().string("name", "controller").build();
        let second = DocBuilder::new().string("name", "default").build();
        let mut stream = first.clone();
        stream.extend(&second);

        let mut seen = Vec::new();
        each_document(&stream[..], |doc| {
            seen.push(doc.to_vec());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![first, second]);
    }
}
