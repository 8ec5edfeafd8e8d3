//! FIRDS file index parsing
//!
//! The FIRDS register answers file queries with a Solr XML response:
//!
//! ```xml
//! <response>
//!   <result name="response" numFound="3" start="0">
//!     <doc>
//!       <str name="file_type">DLTINS</str>
//!       <str name="download_link">http://firds.esma.europa.eu/firds/DLTINS_20210117_01of01.zip</str>
//!     </doc>
//!   </result>
//! </response>
//! ```
//!
//! Every `doc` element is one entry; its `str` children are named fields.
//! [`select_link`] picks the Nth download link among entries of one file type.

use crate::error::{IngestError, Result};
use crate::xml::RootTracker;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tracing::{debug, info};

/// File type of the delta reports that are ingested
pub const TARGET_FILE_TYPE: &str = "DLTINS";

/// Field naming the type of an index entry
pub const FILE_TYPE_FIELD: &str = "file_type";

/// Field holding the download URL of an index entry
pub const DOWNLOAD_LINK_FIELD: &str = "download_link";

const ENTRY_ELEMENT: &[u8] = b"doc";
const FIELD_ELEMENT: &[u8] = b"str";

/// One `doc` element with its named string fields in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntry {
    fields: Vec<(String, String)>,
}

impl IndexEntry {
    /// Value of the named field; when a name repeats, the last one wins
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A link of the requested type, in the order it appeared in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub file_type: String,
    pub url: String,
}

/// Parsed index document
#[derive(Debug, Clone, Default)]
pub struct IndexDocument {
    entries: Vec<IndexEntry>,
}

impl IndexDocument {
    /// Parse raw index bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_named(bytes, "index document")
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entries of `file_type` that carry a non-empty download link
    pub fn link_candidates(&self, file_type: &str) -> Vec<LinkCandidate> {
        self.entries
            .iter()
            .filter(|entry| entry.field(FILE_TYPE_FIELD) == Some(file_type))
            .filter_map(|entry| entry.field(DOWNLOAD_LINK_FIELD))
            .filter(|url| !url.is_empty())
            .map(|url| LinkCandidate {
                file_type: file_type.to_string(),
                url: url.to_string(),
            })
            .collect()
    }

    /// The zero-based `index`-th candidate of `file_type`
    pub fn select(&self, file_type: &str, index: usize) -> Result<LinkCandidate> {
        let mut candidates = self.link_candidates(file_type);
        let found = candidates.len();

        if index >= found {
            return Err(IngestError::IndexOutOfRange {
                file_type: file_type.to_string(),
                index,
                found,
            });
        }

        Ok(candidates.swap_remove(index))
    }

    fn parse_named(bytes: &[u8], source_name: &str) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let malformed = |message: &str| IngestError::malformed(source_name, message);

        let mut entries = Vec::new();
        let mut depth = 0usize;
        let mut root = RootTracker::default();
        // (depth of the doc element, entry being filled)
        let mut entry: Option<(usize, IndexEntry)> = None;
        let mut field: Option<OpenField> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| IngestError::malformed(source_name, e))?;

            match event {
                Event::Start(ref e) => {
                    root.on_open(depth, false).map_err(malformed)?;
                    if let Some(open) = field.as_mut() {
                        open.sealed = true;
                    }

                    let name = e.local_name();
                    let in_entry = entry.as_ref().is_some_and(|(d, _)| depth == d + 1);
                    if entry.is_none() && name.as_ref() == ENTRY_ELEMENT {
                        entry = Some((depth, IndexEntry::default()));
                    } else if in_entry && name.as_ref() == FIELD_ELEMENT {
                        field = Some(OpenField {
                            depth,
                            name: field_name(e, source_name)?,
                            text: String::new(),
                            sealed: false,
                        });
                    }
                    depth += 1;
                },
                Event::Empty(ref e) => {
                    root.on_open(depth, true).map_err(malformed)?;
                    if let Some(open) = field.as_mut() {
                        open.sealed = true;
                    }

                    if let Some((entry_depth, current)) = entry.as_mut() {
                        if depth == *entry_depth + 1 && e.local_name().as_ref() == FIELD_ELEMENT {
                            current.fields.push((field_name(e, source_name)?, String::new()));
                        }
                    }
                },
                Event::Text(ref t) => {
                    root.on_text(depth, t).map_err(malformed)?;
                    if let Some(open) = field.as_mut().filter(|f| !f.sealed) {
                        let unescaped =
                            t.unescape().map_err(|e| IngestError::malformed(source_name, e))?;
                        open.text.push_str(&unescaped);
                    }
                },
                Event::CData(ref c) => {
                    root.on_text(depth, c).map_err(malformed)?;
                    if let Some(open) = field.as_mut().filter(|f| !f.sealed) {
                        let raw = std::str::from_utf8(c)
                            .map_err(|e| IngestError::malformed(source_name, e))?;
                        open.text.push_str(raw);
                    }
                },
                Event::End(_) => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| malformed("closing tag without opening tag"))?;
                    root.on_close(depth);

                    if field.as_ref().is_some_and(|f| f.depth == depth) {
                        if let (Some(open), Some((_, current))) = (field.take(), entry.as_mut()) {
                            current.fields.push((open.name, open.text));
                        }
                    } else if entry.as_ref().is_some_and(|(d, _)| *d == depth) {
                        if let Some((_, finished)) = entry.take() {
                            entries.push(finished);
                        }
                    }
                },
                Event::Eof => {
                    if depth > 0 {
                        return Err(IngestError::malformed(
                            source_name,
                            format!("unexpected end of input with {} unclosed element(s)", depth),
                        ));
                    }
                    if !root.seen() {
                        return Err(malformed("no root element"));
                    }
                    break;
                },
                _ => {},
            }
            buf.clear();
        }

        debug!(entries = entries.len(), "Parsed index document");
        Ok(Self { entries })
    }
}

/// `str` element being read. Only its leading text, before any child
/// element, is the field value.
struct OpenField {
    depth: usize,
    name: String,
    text: String,
    sealed: bool,
}

fn field_name(e: &BytesStart<'_>, source_name: &str) -> Result<String> {
    let attr = e
        .try_get_attribute("name")
        .map_err(|err| IngestError::malformed(source_name, err))?;

    match attr {
        Some(attr) => Ok(attr
            .unescape_value()
            .map_err(|err| IngestError::malformed(source_name, err))?
            .into_owned()),
        None => Ok(String::new()),
    }
}

/// Select the `index`-th (zero-based) download link of `file_type`.
///
/// Fails with `MalformedDocument` when the bytes are not well-formed XML and
/// with `IndexOutOfRange` when fewer than `index + 1` links exist.
pub fn select_link(document: &[u8], file_type: &str, index: usize) -> Result<String> {
    let candidate = IndexDocument::parse(document)?.select(file_type, index)?;
    info!(url = %candidate.url, file_type, index, "Found download link");
    Ok(candidate.url)
}

/// [`select_link`] over an index file on disk
pub fn select_link_from_file(
    path: impl AsRef<Path>,
    file_type: &str,
    index: usize,
) -> Result<String> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let document = IndexDocument::parse_named(&bytes, &path.display().to_string())?;
    let candidate = document.select(file_type, index)?;
    info!(url = %candidate.url, path = %path.display(), index, "Found download link");
    Ok(candidate.url)
}
