use crate::dom::{Attribute, Element, Node, QName, TextPosition};
use crate::error::{CombineError, Result};
use crate::files;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::path::{Path, PathBuf};

/// One parsed source file. Read-only once loaded; the merge engine works on
/// rewritten copies.
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub path: PathBuf,
    pub root: Element,
}

impl InputDocument {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CombineError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = files::read_to_string_shared(path).map_err(|source| CombineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let path = path.into();
        let root = parse_root(&path, text)?;
        Ok(Self { path, root })
    }
}

/// Byte offset to line/column translation for diagnostics.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    fn position(&self, text: &str, offset: usize) -> TextPosition {
        let offset = offset.min(text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line];
        let column = text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        TextPosition {
            line: line + 1,
            column: column + 1,
        }
    }
}

fn parse_root(path: &Path, text: &str) -> Result<Element> {
    let lines = LineIndex::new(text);
    let malformed = |offset: usize, reason: String| {
        let pos = lines.position(text, offset);
        CombineError::Malformed {
            path: path.to_path_buf(),
            line: pos.line,
            column: pos.column,
            reason,
        }
    };

    let mut reader = Reader::from_str(text);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let before = reader.buffer_position();
        // Tags start at the next '<'; anything before it belongs to a text event.
        let tag_offset = text
            .get(before..)
            .and_then(|rest| rest.find('<'))
            .map_or(before, |i| before + i);

        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(malformed(reader.buffer_position(), e.to_string())),
        };

        match event {
            Event::Start(e) => {
                let element = start_element(&e, lines.position(text, tag_offset))
                    .map_err(|reason| malformed(tag_offset, reason))?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = start_element(&e, lines.position(text, tag_offset))
                    .map_err(|reason| malformed(tag_offset, reason))?;
                attach(&mut stack, &mut root, element)
                    .map_err(|reason| malformed(tag_offset, reason))?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(tag_offset, "unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)
                    .map_err(|reason| malformed(tag_offset, reason))?;
            }
            Event::Text(t) => {
                let value = t
                    .unescape()
                    .map_err(|e| malformed(before, e.to_string()))?;
                // indentation between tags is not content
                if value.trim().is_empty() && !preserves_space(&stack) {
                    continue;
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(value.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(parent) = stack.last_mut() {
                    let data = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    parent.children.push(Node::CData(data));
                }
            }
            Event::Comment(c) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Comment(String::from_utf8_lossy(&c).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            text.len(),
            format!("element <{}> is never closed", open.name),
        ));
    }

    root.ok_or_else(|| CombineError::NoRootElement {
        path: path.to_path_buf(),
    })
}

/// Whether the innermost `xml:space` in scope is `preserve`.
fn preserves_space(open: &[Element]) -> bool {
    open.iter()
        .rev()
        .find_map(|e| e.attribute("xml:space"))
        .is_some_and(|mode| mode == "preserve")
}

fn start_element(e: &BytesStart<'_>, position: TextPosition) -> std::result::Result<Element, String> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| err.to_string())?
        .to_string();
    let mut element = Element::new(QName::parse(&name));
    element.position = Some(position);

    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|err| err.to_string())?;
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        element
            .attributes
            .push(Attribute::new(QName::parse(key), value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> std::result::Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_element(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(format!("second root element <{}>", element.name)),
    }
}

/// Reads a newline-separated list of source files. Blank lines and lines
/// starting with `#` are skipped; relative entries resolve against the
/// manifest's own directory.
pub fn read_manifest(manifest: &Path) -> Result<Vec<PathBuf>> {
    if !manifest.exists() {
        return Err(CombineError::SourceNotFound {
            path: manifest.to_path_buf(),
        });
    }
    let text = fs::read_to_string(manifest).map_err(|source| CombineError::Read {
        path: manifest.to_path_buf(),
        source,
    })?;
    let base = manifest.parent().unwrap_or_else(|| Path::new(""));

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let entry = Path::new(line);
            if entry.is_absolute() {
                entry.to_path_buf()
            } else {
                base.join(entry)
            }
        })
        .collect())
}
