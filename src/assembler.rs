//! NZB assembly from indexed overview rows
//!
//! Rows are grouped into files keyed by `(collection_key, file_key,
//! part_total)` and files into collections keyed by `(poster,
//! collection_key)`. Complete (or, optionally, all) files are emitted as
//! NZB 1.1 XML, either as a single document or as one document per
//! collection.
//!
//! Reference: https://sabnzbd.org/wiki/extra/nzb-spec

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, warn};

use crate::error::Result;
use crate::overview::OverviewRow;
use crate::subject;

/// Maximum length of each sanitized file-name component
const MAX_NAME_COMPONENT_LEN: usize = 180;

/// Assembly behavior switches
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleOptions {
    /// Drop multi-part files whose observed parts are not exactly `1..=part_total`
    pub require_complete_sets: bool,
    /// Emit one NZB document per (poster, collection) instead of a single document
    pub group_by_collection: bool,
}

/// A segment (part) of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NzbSegment {
    /// Size of this segment in bytes
    pub bytes: u64,
    /// Segment number (1-based)
    pub number: u32,
    /// Message-id without surrounding angle brackets
    pub message_id: String,
}

/// A single file entry in an NZB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NzbFile {
    /// Poster (From header of the earliest part)
    pub poster: String,
    /// Unix timestamp of the earliest part
    pub date: i64,
    /// Verbatim subject of the earliest part
    pub subject: String,
    /// Newsgroups where this file was posted
    pub groups: Vec<String>,
    /// Segments of this file, ascending by number
    pub segments: Vec<NzbSegment>,
}

/// NZB document containing file references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nzb {
    /// Files described in this NZB
    pub files: Vec<NzbFile>,
}

impl Nzb {
    /// Generate the canonical NZB 1.1 XML for this document
    pub fn to_xml(&self) -> String {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        // Root <nzb> element with namespace
        let mut nzb_elem = BytesStart::new("nzb");
        nzb_elem.push_attribute(("xmlns", "http://www.newzbin.com/DTD/2003/nzb"));
        writer.write_event(Event::Start(nzb_elem)).unwrap();

        for file in &self.files {
            let mut file_elem = BytesStart::new("file");
            // push_attribute escapes &, <, > and quotes
            file_elem.push_attribute(("poster", file.poster.as_str()));
            file_elem.push_attribute(("date", file.date.to_string().as_str()));
            file_elem.push_attribute(("subject", file.subject.as_str()));
            writer.write_event(Event::Start(file_elem)).unwrap();

            // <groups>
            writer
                .write_event(Event::Start(BytesStart::new("groups")))
                .unwrap();
            for group in &file.groups {
                writer
                    .write_event(Event::Start(BytesStart::new("group")))
                    .unwrap();
                writer
                    .write_event(Event::Text(BytesText::new(group)))
                    .unwrap();
                writer
                    .write_event(Event::End(BytesEnd::new("group")))
                    .unwrap();
            }
            writer
                .write_event(Event::End(BytesEnd::new("groups")))
                .unwrap();

            // <segments>
            writer
                .write_event(Event::Start(BytesStart::new("segments")))
                .unwrap();
            for segment in &file.segments {
                let mut seg_elem = BytesStart::new("segment");
                seg_elem.push_attribute(("bytes", segment.bytes.to_string().as_str()));
                seg_elem.push_attribute(("number", segment.number.to_string().as_str()));
                writer.write_event(Event::Start(seg_elem)).unwrap();
                writer
                    .write_event(Event::Text(BytesText::new(&segment.message_id)))
                    .unwrap();
                writer
                    .write_event(Event::End(BytesEnd::new("segment")))
                    .unwrap();
            }
            writer
                .write_event(Event::End(BytesEnd::new("segments")))
                .unwrap();

            writer
                .write_event(Event::End(BytesEnd::new("file")))
                .unwrap();
        }

        writer
            .write_event(Event::End(BytesEnd::new("nzb")))
            .unwrap();

        let body = writer.into_inner().into_inner();
        let body_str = String::from_utf8(body).unwrap();

        let mut result = String::new();
        result.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        result.push_str("<!DOCTYPE nzb PUBLIC \"-//newzBin//DTD NZB 1.1//EN\" \"http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd\">\n");
        result.push_str(&body_str);

        result
    }
}

/// One emitted NZB document with its output file name
#[derive(Debug, Clone)]
pub struct NzbDocument {
    /// Sanitized, collision-free file name (including the `.nzb` suffix)
    pub file_name: String,
    /// The document itself
    pub nzb: Nzb,
}

/// What the assembler produced
#[derive(Debug, Clone, Default)]
pub struct AssembleOutcome {
    /// Emitted documents; one entry in single mode, one per collection in
    /// grouped mode
    pub documents: Vec<NzbDocument>,
    /// Files dropped for missing parts (`require_complete_sets` only)
    pub incomplete_dropped: u64,
}

/// One file under construction: observed parts keyed by part index
struct FileBuilder {
    collection_key: String,
    file_key: String,
    part_total: u32,
    parts: BTreeMap<u32, OverviewRow>,
}

impl FileBuilder {
    fn new(collection_key: String, file_key: String, part_total: u32) -> Self {
        Self {
            collection_key,
            file_key,
            part_total,
            parts: BTreeMap::new(),
        }
    }

    /// Record one part; on duplicate indices the lowest article number wins
    fn add_part(&mut self, index: u32, row: OverviewRow) {
        match self.parts.get(&index) {
            Some(existing) if existing.article_num <= row.article_num => {}
            _ => {
                self.parts.insert(index, row);
            }
        }
    }

    fn min_article(&self) -> u64 {
        self.parts
            .values()
            .map(|r| r.article_num)
            .min()
            .unwrap_or(u64::MAX)
    }

    fn earliest(&self) -> Option<&OverviewRow> {
        self.parts.values().min_by_key(|r| r.article_num)
    }

    /// Complete iff the observed part set is exactly `{1..part_total}`
    fn is_complete(&self) -> bool {
        self.parts.len() as u32 == self.part_total
            && self
                .parts
                .keys()
                .zip(1..=self.part_total)
                .all(|(&observed, expected)| observed == expected)
    }

    fn into_nzb_file(self, group: &str) -> Option<NzbFile> {
        let earliest = self.earliest()?;
        let poster = earliest.from_addr.clone();
        let date = earliest.date_unix.unwrap_or(0);
        let subject = earliest.subject.clone();

        let segments = self
            .parts
            .iter()
            .map(|(&number, row)| NzbSegment {
                bytes: row.bytes_len.unwrap_or(0),
                number,
                message_id: strip_angle_brackets(&row.message_id),
            })
            .collect();

        Some(NzbFile {
            poster,
            date,
            subject,
            groups: vec![group.to_string()],
            segments,
        })
    }
}

/// Assemble NZB documents from an overview row stream
///
/// Rows arrive in store query order (ascending article number); given a
/// fixed input set the output is fully deterministic.
pub fn assemble(rows: &[OverviewRow], group: &str, options: AssembleOptions) -> AssembleOutcome {
    let mut files: HashMap<(String, String, u32), FileBuilder> = HashMap::new();
    let mut continuations: Vec<(subject::SubjectInfo, OverviewRow)> = Vec::new();

    for row in rows {
        if row.message_id.is_empty() {
            continue;
        }
        let info = subject::analyze(&row.subject);
        if info.file_key.is_empty() {
            continuations.push((info, row.clone()));
            continue;
        }
        files
            .entry((
                info.collection_key.clone(),
                info.file_key.clone(),
                info.part_total,
            ))
            .or_insert_with(|| {
                FileBuilder::new(info.collection_key, info.file_key, info.part_total)
            })
            .add_part(info.part_index, row.clone());
    }

    // Bare continuation markers like "(2/3)" carry no file identity of
    // their own; attach each to the earliest open file with the same part
    // count and a free slot, else let them form their own bucket
    for (info, row) in continuations {
        let candidate = files
            .iter()
            .filter(|(key, builder)| {
                key.2 == info.part_total && !builder.parts.contains_key(&info.part_index)
            })
            .map(|(key, builder)| (builder.min_article(), key.clone()))
            .min();

        match candidate {
            Some((_, key)) => {
                if let Some(builder) = files.get_mut(&key) {
                    builder.add_part(info.part_index, row);
                }
            }
            None => {
                files
                    .entry((info.collection_key.clone(), String::new(), info.part_total))
                    .or_insert_with(|| {
                        FileBuilder::new(info.collection_key, String::new(), info.part_total)
                    })
                    .add_part(info.part_index, row);
            }
        }
    }

    // Completeness check
    let mut incomplete_dropped = 0u64;
    let mut builders: Vec<FileBuilder> = Vec::with_capacity(files.len());
    for (_, builder) in files {
        if options.require_complete_sets && !builder.is_complete() {
            warn!(
                "Dropping incomplete file {:?} in collection {:?}: {}/{} parts",
                builder.file_key,
                builder.collection_key,
                builder.parts.len(),
                builder.part_total
            );
            incomplete_dropped += 1;
            continue;
        }
        if builder.parts.is_empty() {
            continue;
        }
        builders.push(builder);
    }

    // Deterministic emission order
    builders.sort_by(|a, b| {
        (a.min_article(), a.file_key.as_str()).cmp(&(b.min_article(), b.file_key.as_str()))
    });

    let documents = if options.group_by_collection {
        emit_grouped(builders, group)
    } else {
        emit_single(builders, group)
    };

    debug!(
        "Assembled {} document(s), {} incomplete files dropped",
        documents.len(),
        incomplete_dropped
    );

    AssembleOutcome {
        documents,
        incomplete_dropped,
    }
}

fn emit_single(builders: Vec<FileBuilder>, group: &str) -> Vec<NzbDocument> {
    let files: Vec<NzbFile> = builders
        .into_iter()
        .filter_map(|b| b.into_nzb_file(group))
        .collect();
    if files.is_empty() {
        return Vec::new();
    }
    vec![NzbDocument {
        file_name: format!("{}.nzb", sanitize(group)),
        nzb: Nzb { files },
    }]
}

fn emit_grouped(builders: Vec<FileBuilder>, group: &str) -> Vec<NzbDocument> {
    // Collections keyed by (poster, collection_key); BTreeMap iteration
    // keeps the document order stable
    let mut collections: BTreeMap<(String, String), Vec<NzbFile>> = BTreeMap::new();
    for builder in builders {
        let collection_key = builder.collection_key.clone();
        let Some(file) = builder.into_nzb_file(group) else {
            continue;
        };
        collections
            .entry((file.poster.clone(), collection_key))
            .or_default()
            .push(file);
    }

    let mut used_names: HashMap<String, u32> = HashMap::new();
    collections
        .into_iter()
        .map(|((poster, collection_key), files)| {
            let stem = format!("{}__{}", sanitize(&poster), sanitize(&collection_key));
            NzbDocument {
                file_name: allocate_name(&mut used_names, &stem),
                nzb: Nzb { files },
            }
        })
        .collect()
}

/// Resolve duplicate document names by appending `-2`, `-3`, ...
fn allocate_name(used: &mut HashMap<String, u32>, stem: &str) -> String {
    let count = used.entry(stem.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        format!("{}.nzb", stem)
    } else {
        format!("{}-{}.nzb", stem, count)
    }
}

/// Replace characters outside `[A-Za-z0-9._-]` with `_` and cap the length
pub fn sanitize(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    mapped.chars().take(MAX_NAME_COMPONENT_LEN).collect()
}

fn strip_angle_brackets(message_id: &str) -> String {
    message_id
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

/// Write assembled documents into `output_path`, returning the paths written
pub async fn write_documents(documents: &[NzbDocument], output_path: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_path).await?;

    let mut written = Vec::with_capacity(documents.len());
    for document in documents {
        let path = output_path.join(&document.file_name);
        tokio::fs::write(&path, document.nzb.to_xml()).await?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
