//! Text entry documents.
//!
//! Decompiled models are XML. They are read into a [`StructuredTree`] with this layout:
//!
//! - the document is a mapping with a single key, the root element name
//! - an element with neither attributes nor children is a scalar holding its text
//! - any other element is a mapping: `"$"` holds the attributes, `"_"` the text, and
//!   every child tag maps to a sequence of the child elements with that tag
//!
//! Because children are always sequences, merging two documents appends repeated
//! elements, while attributes follow last-writer-wins.

use crate::error::{Result, WorkbenchError};
use crate::services::merge::StructuredTree;
use camino::Utf8Path;
use indexmap::IndexMap;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use thiserror::Error;

pub const ATTRIBUTES_KEY: &str = "$";
pub const TEXT_KEY: &str = "_";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attribute(#[from] AttrError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Structure(String),
}

type DocResult<T> = std::result::Result<T, DocumentError>;

/// An element whose end tag has not been seen yet
struct OpenElement {
    name: String,
    attributes: IndexMap<String, StructuredTree>,
    text: String,
    children: IndexMap<String, StructuredTree>,
}

impl OpenElement {
    fn from_start(start: &BytesStart<'_>) -> DocResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = IndexMap::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.insert(key, StructuredTree::Scalar(value));
        }
        Ok(Self {
            name,
            attributes,
            text: String::new(),
            children: IndexMap::new(),
        })
    }

    fn add_child(&mut self, name: String, child: StructuredTree) {
        match self.children.get_mut(&name) {
            Some(StructuredTree::Sequence(items)) => items.push(child),
            _ => {
                self.children
                    .insert(name, StructuredTree::Sequence(vec![child]));
            }
        }
    }

    fn close(self) -> (String, StructuredTree) {
        let text = self.text.trim().to_string();
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, StructuredTree::Scalar(text));
        }

        let mut map = IndexMap::new();
        if !self.attributes.is_empty() {
            map.insert(
                ATTRIBUTES_KEY.to_string(),
                StructuredTree::Mapping(self.attributes),
            );
        }
        if !text.is_empty() {
            map.insert(TEXT_KEY.to_string(), StructuredTree::Scalar(text));
        }
        map.extend(self.children);
        (self.name, StructuredTree::Mapping(map))
    }
}

/// Parse an XML document. Comments, declarations and processing instructions are dropped.
pub fn parse(content: &str) -> DocResult<StructuredTree> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, StructuredTree)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(OpenElement::from_start(&start)?),
            Event::Empty(start) => {
                let (name, tree) = OpenElement::from_start(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, tree),
                    None => set_root(&mut root, name, tree)?,
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DocumentError::Structure("unexpected end tag".to_string()))?;
                let (name, tree) = element.close();
                match stack.last_mut() {
                    Some(parent) => parent.add_child(name, tree),
                    None => set_root(&mut root, name, tree)?,
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DocumentError::Structure(format!(
            "unclosed element <{}>",
            stack[stack.len() - 1].name
        )));
    }

    let (name, tree) =
        root.ok_or_else(|| DocumentError::Structure("document has no root element".to_string()))?;
    let mut document = IndexMap::new();
    document.insert(name, tree);
    Ok(StructuredTree::Mapping(document))
}

fn set_root(
    root: &mut Option<(String, StructuredTree)>,
    name: String,
    tree: StructuredTree,
) -> DocResult<()> {
    if root.is_some() {
        return Err(DocumentError::Structure(format!(
            "second root element <{}>",
            name
        )));
    }
    *root = Some((name, tree));
    Ok(())
}

/// Serialize a document tree back to tab-indented XML with a UTF-8 declaration.
pub fn serialize(document: &StructuredTree) -> DocResult<String> {
    let root = match document {
        StructuredTree::Mapping(map) if map.len() == 1 => map.iter().next(),
        _ => None,
    };
    let (name, tree) =
        root.ok_or_else(|| DocumentError::Structure("expected a single root element".to_string()))?;

    let mut output = Vec::new();
    let mut writer = Writer::new_with_indent(&mut output, b'\t', 1);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write_element(&mut writer, name, tree)?;

    String::from_utf8(output).map_err(|e| DocumentError::Structure(e.to_string()))
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    tree: &StructuredTree,
) -> DocResult<()> {
    match tree {
        StructuredTree::Scalar(text) => {
            if text.is_empty() {
                writer.write_event(Event::Empty(BytesStart::new(name)))?;
            } else {
                writer.write_event(Event::Start(BytesStart::new(name)))?;
                writer.write_event(Event::Text(BytesText::new(text)))?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
        }
        StructuredTree::Sequence(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
        }
        StructuredTree::Mapping(map) => {
            let mut start = BytesStart::new(name);
            if let Some(attributes) = map.get(ATTRIBUTES_KEY) {
                let attributes = attributes.as_mapping().ok_or_else(|| {
                    DocumentError::Structure(format!("attributes of <{}> are not a mapping", name))
                })?;
                for (key, value) in attributes {
                    let value = value.as_scalar().ok_or_else(|| {
                        DocumentError::Structure(format!(
                            "attribute {} of <{}> is not a scalar",
                            key, name
                        ))
                    })?;
                    start.push_attribute((key.as_str(), value));
                }
            }

            let text = map.get(TEXT_KEY).and_then(StructuredTree::as_scalar);
            let mut children = map
                .iter()
                .filter(|(key, _)| *key != ATTRIBUTES_KEY && *key != TEXT_KEY)
                .peekable();

            if text.is_none() && children.peek().is_none() {
                writer.write_event(Event::Empty(start))?;
                return Ok(());
            }

            writer.write_event(Event::Start(start))?;
            if let Some(text) = text {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            for (child_name, child) in children {
                write_element(writer, child_name, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
    }
    Ok(())
}

/// Read and parse a text entry from disk.
pub fn read_document(path: &Utf8Path) -> Result<StructuredTree> {
    let content = fs::read_to_string(path).map_err(|e| WorkbenchError::fs(path, e))?;
    parse(&content).map_err(|e| WorkbenchError::InvalidDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Serialize `document` and write it to `path`, creating parent directories.
pub fn write_document(path: &Utf8Path, document: &StructuredTree) -> Result<()> {
    let content = serialize(document).map_err(|e| WorkbenchError::InvalidDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WorkbenchError::fs(parent, e))?;
    }
    fs::write(path, content).map_err(|e| WorkbenchError::fs(path, e))
}
