//! Streaming extraction of instrument records from DLTINS documents
//!
//! A DLTINS delta report is an ISO 20022 `auth.036` document that can run to
//! gigabytes. [`InstrumentRecords`] pulls parse events from the file and keeps
//! in memory only the `FinInstrm` element currently being read; the subtree is
//! dropped as soon as its record has been built, so memory use is bounded by
//! the largest single instrument, not by the document.
//!
//! Elements are matched on their local name, which keeps extraction working
//! when the report's namespace URI or prefix changes between schema versions.
//!
//! ```no_run
//! use firds_ingest::extract::{collect_table, extract};
//!
//! # fn main() -> firds_ingest::Result<()> {
//! let records = extract("data/extracted_xml/DLTINS_20210117_01of01.xml")?;
//! let table = collect_table(records)?;
//! println!("{} instruments", table.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{IngestError, Result};
use crate::xml::RootTracker;
use firds_common::Table;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Repeated unit element of the record source
pub const INSTRUMENT_ELEMENT: &str = "FinInstrm";

/// Block holding the general attributes of an instrument
pub const GENERAL_ATTRIBUTES_ELEMENT: &str = "FinInstrmGnlAttrbts";

/// Issuer LEI element
pub const ISSUER_ELEMENT: &str = "Issr";

/// Output columns, in order
pub const COLUMNS: [&str; 6] = [
    "FinInstrmGnlAttrbts.Id",
    "FinInstrmGnlAttrbts.FullNm",
    "FinInstrmGnlAttrbts.ClssfctnTp",
    "FinInstrmGnlAttrbts.CmmdtyDerivInd",
    "FinInstrmGnlAttrbts.NtnlCcy",
    "Issr",
];

/// One flattened instrument. Missing source elements are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstrumentRecord {
    /// ISIN
    pub id: String,
    pub full_name: String,
    /// CFI code
    pub classification_type: String,
    /// Kept as text ("true"/"false" in current reports)
    pub commodity_derivative_indicator: String,
    pub notional_currency: String,
    /// Issuer LEI
    pub issuer: String,
}

impl InstrumentRecord {
    /// Cells in [`COLUMNS`] order
    pub fn into_row(self) -> Vec<String> {
        vec![
            self.id,
            self.full_name,
            self.classification_type,
            self.commodity_derivative_indicator,
            self.notional_currency,
            self.issuer,
        ]
    }

    fn from_subtree(instrument: &XmlNode) -> Self {
        let general = instrument.find_descendant(GENERAL_ATTRIBUTES_ELEMENT);
        let general_field = |name: &str| {
            general
                .and_then(|block| block.child_text(name))
                .unwrap_or_default()
                .to_string()
        };

        Self {
            id: general_field("Id"),
            full_name: general_field("FullNm"),
            classification_type: general_field("ClssfctnTp"),
            commodity_derivative_indicator: general_field("CmmdtyDerivInd"),
            notional_currency: general_field("NtnlCcy"),
            issuer: instrument
                .find_descendant(ISSUER_ELEMENT)
                .map(|node| node.text.clone())
                .unwrap_or_default(),
        }
    }
}

/// Element held in memory while its instrument is open
#[derive(Debug, Default)]
pub struct XmlNode {
    /// Local name, prefix stripped
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the first direct child called `name`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// First descendant called `name`, depth first, excluding `self`
    pub fn find_descendant(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find_map(|c| {
            if c.name == name {
                Some(c)
            } else {
                c.find_descendant(name)
            }
        })
    }
}

enum Step {
    Continue,
    Record(InstrumentRecord),
    Fatal(IngestError),
    Done,
}

/// Parser state that outlives a single event
struct StreamState {
    source_name: String,
    depth: usize,
    root: RootTracker,
    /// Open elements of the current instrument, outermost first
    open: Vec<XmlNode>,
    /// Why the current instrument cannot be built, if it cannot
    failure: Option<String>,
    emitted: usize,
    skipped: usize,
}

impl StreamState {
    fn on_event(&mut self, event: Event<'_>) -> Step {
        match event {
            Event::Start(ref e) => {
                if let Err(message) = self.root.on_open(self.depth, false) {
                    return self.fatal(message);
                }
                self.depth += 1;
                if !self.open.is_empty() {
                    self.open.push(XmlNode::new(local_name(e)));
                } else if is_instrument(e) {
                    self.failure = None;
                    self.open.push(XmlNode::new(INSTRUMENT_ELEMENT));
                }
                Step::Continue
            },
            Event::Empty(ref e) => {
                if let Err(message) = self.root.on_open(self.depth, true) {
                    return self.fatal(message);
                }
                if let Some(parent) = self.open.last_mut() {
                    parent.children.push(XmlNode::new(local_name(e)));
                    Step::Continue
                } else if is_instrument(e) {
                    self.emitted += 1;
                    Step::Record(InstrumentRecord::default())
                } else {
                    Step::Continue
                }
            },
            Event::Text(ref t) => {
                if let Err(message) = self.root.on_text(self.depth, t) {
                    return self.fatal(message);
                }
                if let Some(node) = self.open.last_mut() {
                    match t.unescape() {
                        Ok(text) => node.text.push_str(&text),
                        Err(e) => {
                            self.failure.get_or_insert_with(|| e.to_string());
                        },
                    }
                }
                Step::Continue
            },
            Event::CData(ref c) => {
                if let Err(message) = self.root.on_text(self.depth, c) {
                    return self.fatal(message);
                }
                if let Some(node) = self.open.last_mut() {
                    match std::str::from_utf8(c) {
                        Ok(text) => node.text.push_str(text),
                        Err(e) => {
                            self.failure.get_or_insert_with(|| e.to_string());
                        },
                    }
                }
                Step::Continue
            },
            Event::End(_) => {
                let Some(depth) = self.depth.checked_sub(1) else {
                    return Step::Fatal(IngestError::malformed(
                        &self.source_name,
                        "closing tag without opening tag",
                    ));
                };
                self.depth = depth;
                self.root.on_close(depth);

                let Some(node) = self.open.pop() else {
                    return Step::Continue;
                };
                if let Some(parent) = self.open.last_mut() {
                    parent.children.push(node);
                    return Step::Continue;
                }

                // The instrument itself just closed; `node` is dropped on return.
                match self.failure.take() {
                    Some(reason) => {
                        self.skipped += 1;
                        warn!(
                            source = %self.source_name,
                            record = self.emitted + self.skipped,
                            reason = %reason,
                            "Skipping instrument that could not be extracted"
                        );
                        Step::Continue
                    },
                    None => {
                        self.emitted += 1;
                        Step::Record(InstrumentRecord::from_subtree(&node))
                    },
                }
            },
            Event::Eof => {
                if self.depth > 0 {
                    Step::Fatal(IngestError::malformed(
                        &self.source_name,
                        format!("unexpected end of input with {} unclosed element(s)", self.depth),
                    ))
                } else if !self.root.seen() {
                    Step::Fatal(IngestError::malformed(&self.source_name, "no root element"))
                } else {
                    Step::Done
                }
            },
            _ => Step::Continue,
        }
    }

    fn fatal(&self, message: &str) -> Step {
        Step::Fatal(IngestError::malformed(&self.source_name, message))
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn is_instrument(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == INSTRUMENT_ELEMENT.as_bytes()
}

/// Lazy, single-pass sequence of instrument records.
///
/// Yields `Ok` for every instrument that could be built. Instruments whose
/// content cannot be decoded are logged and skipped. A structural parse error
/// is yielded once as `Err(MalformedDocument)`, after which the sequence ends.
/// Dropping the iterator closes the underlying reader.
pub struct InstrumentRecords<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: StreamState,
    finished: bool,
}

impl InstrumentRecords<BufReader<File>> {
    /// Open a document on disk for streaming
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IngestError::NotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        debug!(path = %path.display(), "Opened record source");
        Ok(Self::from_reader(
            BufReader::new(file),
            path.display().to_string(),
        ))
    }
}

impl<R: BufRead> InstrumentRecords<R> {
    /// Stream records from any buffered reader
    pub fn from_reader(reader: R, source_name: impl Into<String>) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::new(),
            state: StreamState {
                source_name: source_name.into(),
                depth: 0,
                root: RootTracker::default(),
                open: Vec::new(),
                failure: None,
                emitted: 0,
                skipped: 0,
            },
            finished: false,
        }
    }

    /// Records yielded so far
    pub fn emitted(&self) -> usize {
        self.state.emitted
    }

    /// Instruments skipped so far
    pub fn skipped(&self) -> usize {
        self.state.skipped
    }
}

impl<R: BufRead> Iterator for InstrumentRecords<R> {
    type Item = Result<InstrumentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let step = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => self.state.on_event(event),
                Err(e) => Step::Fatal(IngestError::malformed(&self.state.source_name, e)),
            };
            self.buf.clear();

            match step {
                Step::Continue => continue,
                Step::Record(record) => return Some(Ok(record)),
                Step::Fatal(err) => {
                    self.finished = true;
                    self.state.open.clear();
                    return Some(Err(err));
                },
                Step::Done => {
                    self.finished = true;
                    debug!(
                        source = %self.state.source_name,
                        records = self.state.emitted,
                        skipped = self.state.skipped,
                        "Finished record source"
                    );
                    return None;
                },
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for InstrumentRecords<R> {}

/// Open `path` and stream its instrument records
pub fn extract(path: impl AsRef<Path>) -> Result<InstrumentRecords<BufReader<File>>> {
    InstrumentRecords::open(path)
}

/// Drain a record sequence into a table with the [`COLUMNS`] schema.
///
/// Stops at the first structural error; no partial table is returned.
pub fn collect_table<I>(records: I) -> Result<Table>
where
    I: IntoIterator<Item = Result<InstrumentRecord>>,
{
    let mut table = Table::new(COLUMNS);
    for record in records {
        table.push_row(record?.into_row())?;
    }
    Ok(table)
}
