//! Owned XML tree used by the merge engine.
//!
//! Inputs are parsed once into this representation (see [`crate::parser`]),
//! transformed as plain values and rendered back with `quick-xml`. Rendering
//! is deterministic: attributes keep their document order and indentation is
//! fixed, so equal trees always produce equal bytes.

use std::fmt;
use std::io::Write;

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// A possibly prefixed XML name, `prefix:local` or `local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => Self::local(raw),
        }
    }

    pub fn local(local: &str) -> Self {
        Self {
            prefix: None,
            local: local.to_string(),
        }
    }

    pub fn prefixed(prefix: &str, local: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }

    /// Returns `(prefix, uri)` if this is a namespace declaration. The default
    /// namespace (`xmlns="..."`) is reported with an empty prefix.
    pub fn namespace_declaration(&self) -> Option<(&str, &str)> {
        match (&self.name.prefix, self.name.local.as_str()) {
            (None, "xmlns") => Some(("", &self.value)),
            (Some(p), local) if p == "xmlns" => Some((local, &self.value)),
            _ => None,
        }
    }

    pub fn is_namespace_declaration(&self) -> bool {
        self.namespace_declaration().is_some()
    }
}

/// 1-based location of an element's start tag in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPosition {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub position: Option<TextPosition>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            position: None,
        }
    }

    /// Looks up an attribute by its literal qualified name (`"x:Key"`, `"Source"`).
    pub fn attribute(&self, qualified: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.to_string() == qualified)
            .map(|a| a.value.as_str())
    }

    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Text content or `xml:space="preserve"`; layout whitespace may not be
    /// added inside such an element.
    pub fn has_significant_whitespace(&self) -> bool {
        self.attribute("xml:space") == Some("preserve")
            || self
                .children
                .iter()
                .any(|node| matches!(node, Node::Text(_) | Node::CData(_)))
    }

    /// Namespace declarations made on this element, in document order.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(Attribute::namespace_declaration)
    }

    /// Calls `f` for this element and every descendant element, depth first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in self.child_elements() {
            child.walk(f);
        }
    }

    /// Compact rendering without indentation, used for structural comparison
    /// and diagnostics.
    pub fn to_compact_string(&self) -> Result<String, quick_xml::Error> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Two elements are structurally equal when their compact renderings match.
    /// Source positions are ignored.
    pub fn same_content(&self, other: &Element) -> Result<bool, quick_xml::Error> {
        Ok(self.to_compact_string()? == other.to_compact_string()?)
    }
}

/// Writes `element` and its subtree as events on `writer`, adding no whitespace.
pub fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element) -> Result<(), quick_xml::Error> {
    let name = element.name.to_string();
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start_tag(element, &name)))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start_tag(element, &name)))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            other => write_leaf(writer, other)?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

/// Writes `element` with every child on its own line, `indent` spaces per
/// level. Elements that hold text, or sit under `xml:space="preserve"`, are
/// written as they are: whitespace added there would become content.
pub fn write_indented<W: Write>(
    writer: &mut Writer<W>,
    element: &Element,
    indent: usize,
) -> Result<(), quick_xml::Error> {
    write_at_depth(writer, element, indent, 0)
}

fn write_at_depth<W: Write>(
    writer: &mut Writer<W>,
    element: &Element,
    indent: usize,
    depth: usize,
) -> Result<(), quick_xml::Error> {
    if element.children.is_empty() || element.has_significant_whitespace() {
        return write_element(writer, element);
    }

    let name = element.name.to_string();
    writer.write_event(Event::Start(start_tag(element, &name)))?;
    for child in &element.children {
        line_break(writer, indent * (depth + 1))?;
        match child {
            Node::Element(e) => write_at_depth(writer, e, indent, depth + 1)?,
            other => write_leaf(writer, other)?,
        }
    }
    line_break(writer, indent * depth)?;
    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
    Ok(())
}

fn start_tag<'a>(element: &Element, name: &'a str) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for attr in &element.attributes {
        let key = attr.name.to_string();
        start.push_attribute((key.as_str(), attr.value.as_str()));
    }
    start
}

fn write_leaf<W: Write>(writer: &mut Writer<W>, node: &Node) -> Result<(), quick_xml::Error> {
    match node {
        Node::Element(e) => write_element(writer, e),
        Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text))),
        Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str()))),
        Node::Comment(text) => writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str()))),
    }
}

/// Newline followed by `width` spaces.
pub fn line_break<W: Write>(writer: &mut Writer<W>, width: usize) -> Result<(), quick_xml::Error> {
    let text = format!("\n{}", " ".repeat(width));
    writer.write_event(Event::Text(BytesText::from_escaped(text)))
}

/// Comments may not contain `--`; collapse it so arbitrary header text stays well-formed.
pub fn sanitize_comment(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains("--") {
        out = out.replace("--", "- -");
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}
