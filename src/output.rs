//! Transcript files.
//!
//! A page is written as a JSON array with one object per record, laid out so
//! that identical pages always produce identical bytes:
//!
//! ```text
//! [
//! \t{
//! \t    "text": "Hello",
//! \t    "bbox": [10, 0, 50, 20]
//! \t}
//! ]
//! ```
//!
//! Strings are escaped to plain ASCII. An empty page is `[\n]\n`.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use serde::Serialize;
use serde_json::ser::Formatter;

use crate::{PageResult, Result};

/// Compact JSON formatter that escapes everything outside printable ASCII as
/// `\uXXXX`.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Quotes and escapes `text` as an ASCII-only JSON string.
pub fn json_string(text: &str) -> Result<String> {
    let mut buf = Vec::with_capacity(text.len() + 2);
    text.serialize(&mut serde_json::Serializer::with_formatter(
        &mut buf,
        AsciiFormatter,
    ))?;
    // Only ASCII bytes are ever written.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn to_page_json(page: &PageResult) -> Result<String> {
    let mut out = String::from("[\n");
    for (i, record) in page.iter().enumerate() {
        let [x1, y1, x2, y2]: [i32; 4] = record.bbox.into();
        out.push_str("\t{\n");
        out.push_str(&format!("\t    \"text\": {},\n", json_string(&record.text)?));
        out.push_str(&format!("\t    \"bbox\": [{x1}, {y1}, {x2}, {y2}]\n"));
        out.push_str(if i + 1 < page.len() { "\t},\n" } else { "\t}\n" });
    }
    out.push_str("]\n");
    Ok(out)
}

/// Writes `page` to `path`. The file only appears once its contents are
/// complete.
pub fn write_page_json(page: &PageResult, path: &Path) -> Result<()> {
    let contents = to_page_json(page)?;
    let partial = path.with_extension("json.partial");
    fs::write(&partial, contents)
        .and_then(|()| fs::rename(&partial, path))
        .inspect_err(|_| {
            let _ = fs::remove_file(&partial);
        })?;
    Ok(())
}

pub fn read_page_json(path: &Path) -> Result<PageResult> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoundingBox, TranscriptRecord};

    fn record(text: &str, bbox: [i32; 4]) -> TranscriptRecord {
        TranscriptRecord {
            text: text.to_string(),
            bbox: BoundingBox::from(bbox),
        }
    }

    #[test]
    fn empty_page() {
        assert_eq!(to_page_json(&PageResult::default()).unwrap(), "[\n]\n");
    }

    #[test]
    fn records_layout() {
        let page = PageResult::from(vec![
            record("Hello", [10, 0, 50, 20]),
            record("world", [60, 0, 100, 20]),
        ]);
        let expected = "[\n\
            \t{\n\
            \t    \"text\": \"Hello\",\n\
            \t    \"bbox\": [10, 0, 50, 20]\n\
            \t},\n\
            \t{\n\
            \t    \"text\": \"world\",\n\
            \t    \"bbox\": [60, 0, 100, 20]\n\
            \t}\n\
            ]\n";
        assert_eq!(to_page_json(&page).unwrap(), expected);
    }

    #[test]
    fn strings_are_escaped_to_ascii() {
        assert_eq!(json_string("a\"b\\c").unwrap(), r#""a\"b\\c""#);
        assert_eq!(json_string("tab\tnl\n").unwrap(), r#""tab\tnl\n""#);
        assert_eq!(json_string("café").unwrap(), r#""caf\u00e9""#);
        assert_eq!(json_string("\u{7f}\u{1f}").unwrap(), r#""\u007f\u001f""#);
        assert_eq!(json_string("😀").unwrap(), r#""\ud83d\ude00""#);
    }

    #[test]
    fn written_pages_parse_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        let page = PageResult::from(vec![record("Grüße \"x\"", [1, 2, 3, 4])]);
        write_page_json(&page, &path).unwrap();
        assert_eq!(read_page_json(&path).unwrap(), page);
        assert!(!dir.path().join("page.json.partial").exists());
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), b"").unwrap();

        let page = PageResult::from(vec![record("x", [0, 0, 1, 1])]);
        assert!(write_page_json(&page, &path).is_err());
        assert!(!dir.path().join("page.json.partial").exists());
    }
}
