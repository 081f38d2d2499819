//! Readers turning data files into [`SourceDocument`] streams for the
//! batch indexer.

use crate::document::SourceDocument;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use quick_xml::de::from_reader;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

const WIKIPEDIA_TITLE_PREFIX: &str = "Wikipedia: ";

/// Supported source file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// One JSON object `{id, title, body, url}` per line
    JsonLines,
    /// Gzip-compressed Wikipedia abstract dump (`enwiki-*-abstract*.xml.gz`)
    Wikipedia,
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jsonl" | "json-lines" => Ok(SourceFormat::JsonLines),
            "wiki" | "wikipedia" => Ok(SourceFormat::Wikipedia),
            other => Err(format!("unknown source format '{other}' (expected jsonl or wiki)")),
        }
    }
}

pub type DocumentStream = Box<dyn Iterator<Item = Result<SourceDocument>>>;

/// Open `path` as a document stream in the given format
pub fn open(path: &Path, format: SourceFormat) -> Result<DocumentStream> {
    match format {
        SourceFormat::JsonLines => {
            let file = File::open(path).map_err(Error::Source)?;
            Ok(Box::new(json_lines(BufReader::new(file))))
        }
        SourceFormat::Wikipedia => Ok(Box::new(wikipedia_abstracts(path)?)),
    }
}

/// Parse one document per non-blank line
pub fn json_lines<R: BufRead>(reader: R) -> impl Iterator<Item = Result<SourceDocument>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Err(err) => Some(Err(Error::Source(err))),
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(
                serde_json::from_str::<SourceDocument>(&line)
                    .map_err(|err| Error::MalformedInput(format!("line {}: {err}", idx + 1))),
            ),
        })
}

#[derive(Debug, Deserialize)]
struct WikiAbstract {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "abstract", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "doc", default)]
    documents: Vec<WikiAbstract>,
}

/// Load a gzip-compressed Wikipedia abstract dump. The article URL is the document id.
pub fn wikipedia_abstracts(path: &Path) -> Result<impl Iterator<Item = Result<SourceDocument>>> {
    let file = File::open(path).map_err(Error::Source)?;
    let reader = BufReader::new(GzDecoder::new(file));

    let feed: Feed = from_reader(reader)
        .map_err(|err| Error::MalformedInput(format!("{}: {err}", path.display())))?;
    tracing::debug!(documents = feed.documents.len(), path = %path.display(), "loaded abstract dump");

    Ok(feed.documents.into_iter().map(|doc| {
        let title = doc
            .title
            .strip_prefix(WIKIPEDIA_TITLE_PREFIX)
            .unwrap_or(&doc.title)
            .to_string();
        Ok(SourceDocument {
            id: doc.url.clone(),
            title,
            body: doc.text,
            url: doc.url,
        })
    }))
}
