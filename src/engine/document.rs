//! Whitespace-preserving XML document model
//!
//! Text and attribute values are stored exactly as they appear in the
//! source (still escaped). Start tags also keep their layout: the whitespace
//! before each attribute, the `=` separator, the quote character and the
//! whitespace before `>`. Regions a transform does not touch are written
//! back byte-for-byte.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

const UTF8_BOM: char = '\u{feff}';

/// Errors raised while reading a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("document has no root element")]
    MissingRoot,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("element <{0}> is never closed")]
    Unclosed(String),

    #[error("document is not valid UTF-8: {0}")]
    Encoding(String),
}

/// A single XML attribute, value kept in escaped form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    /// Whitespace before the name, as written
    pub leading: String,
    /// Text between the name and the opening quote, usually `=`
    pub separator: String,
    pub quote: char,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            leading: " ".to_string(),
            separator: "=".to_string(),
            quote: '"',
        }
    }

    fn write_to(&self, out: &mut String) {
        // A value copied in from elsewhere may contain our quote character.
        let quote = match self.quote {
            q if !self.value.contains(q) => q,
            '"' => '\'',
            _ => '"',
        };
        out.push_str(&self.leading);
        out.push_str(&self.name);
        out.push_str(&self.separator);
        out.push(quote);
        out.push_str(&self.value);
        out.push(quote);
    }
}

/// An XML element and its children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Written as `<name/>` when it has no children
    pub self_closing: bool,
    /// Whitespace between the last attribute and `>` or `/>`
    pub trailing: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    Declaration(String),
    ProcessingInstruction(String),
    DocType(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    fn is_whitespace_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.chars().all(char::is_whitespace))
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, DocumentError> {
        let name = utf8(start.name().as_ref())?;
        let invalid = |message: String| DocumentError::Syntax {
            position: 0,
            message,
        };

        // quick-xml validates the attribute syntax; the layout comes from
        // scanning the raw tag.
        let mut expected = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| invalid(format!("invalid attribute on <{name}>: {e}")))?;
            expected.push(utf8(attr.key.as_ref())?);
        }

        let raw = utf8(start)?;
        let (attributes, trailing) = scan_attributes(&raw, name.len())
            .ok_or_else(|| invalid(format!("unreadable start tag <{name}>")))?;
        if attributes.iter().map(|a| &a.name).ne(expected.iter()) {
            return Err(invalid(format!("unreadable start tag <{name}>")));
        }

        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            self_closing: false,
            trailing,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, keeping its position when it already exists
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value.to_string(),
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    /// Remove an attribute, returning whether it existed
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| a.name != name);
        before != self.attributes.len()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Append a child element, reusing sibling indentation when the element
    /// is laid out one child per line.
    pub fn append_element(&mut self, element: Element) {
        let trailing_ws = self.children.last().is_some_and(Node::is_whitespace_text);
        if !trailing_ws {
            self.children.push(Node::Element(element));
            return;
        }

        let insert_at = self.children.len() - 1;
        let sibling_indent = self
            .children
            .iter()
            .rposition(|n| matches!(n, Node::Element(_)))
            .and_then(|idx| idx.checked_sub(1))
            .and_then(|idx| match &self.children[idx] {
                Node::Text(t) if t.chars().all(char::is_whitespace) => Some(t.clone()),
                _ => None,
            });

        match sibling_indent {
            Some(indent) => {
                self.children.insert(insert_at, Node::Element(element));
                self.children.insert(insert_at, Node::Text(indent));
            }
            None => self.children.insert(insert_at, Node::Element(element)),
        }
    }

    /// Remove the child node at `index` together with the indentation
    /// directly before it.
    pub fn remove_child(&mut self, index: usize) -> Option<Node> {
        if index >= self.children.len() {
            return None;
        }
        let removed = self.children.remove(index);
        if index > 0 && self.children[index - 1].is_whitespace_text() {
            self.children.remove(index - 1);
        }
        Some(removed)
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            attr.write_to(out);
        }

        if self.children.is_empty() && self.self_closing {
            out.push_str(&self.trailing);
            out.push_str("/>");
            return;
        }

        // `<a />` that gained children becomes `<a>...</a>`
        if !self.self_closing {
            out.push_str(&self.trailing);
        }
        out.push('>');
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl Node {
    fn write_to(&self, out: &mut String) {
        match self {
            Node::Element(e) => e.write_to(out),
            Node::Text(t) => out.push_str(t),
            Node::CData(c) => {
                out.push_str("<![CDATA[");
                out.push_str(c);
                out.push_str("]]>");
            }
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::Declaration(d) | Node::ProcessingInstruction(d) => {
                out.push_str("<?");
                out.push_str(d);
                out.push_str("?>");
            }
            Node::DocType(d) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(d.trim_start());
                out.push('>');
            }
        }
    }
}

/// A parsed XML document with exactly one root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
    root_index: usize,
    bom: bool,
}

impl Document {
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        let (bom, input) = match input.strip_prefix(UTF8_BOM) {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| DocumentError::Syntax {
                position: reader.error_position() as u64,
                message: e.to_string(),
            })?;

            let node = match event {
                Event::Start(start) => {
                    stack.push(Element::from_start(&start)?);
                    continue;
                }
                Event::Empty(start) => {
                    let mut element = Element::from_start(&start)?;
                    element.self_closing = true;
                    Node::Element(element)
                }
                Event::End(_) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => {
                        return Err(DocumentError::Syntax {
                            position: reader.buffer_position() as u64,
                            message: "unexpected closing tag".to_string(),
                        })
                    }
                },
                Event::Text(text) => Node::Text(utf8(&text)?),
                Event::CData(cdata) => Node::CData(utf8(&cdata)?),
                Event::Comment(comment) => Node::Comment(utf8(&comment)?),
                Event::Decl(decl) => Node::Declaration(utf8(&decl)?),
                Event::PI(pi) => Node::ProcessingInstruction(utf8(&pi)?),
                Event::DocType(doctype) => Node::DocType(utf8(&doctype)?),
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => nodes.push(node),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(DocumentError::Unclosed(open.name));
        }

        let mut roots = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Node::Element(_)))
            .map(|(idx, _)| idx);
        let root_index = roots.next().ok_or(DocumentError::MissingRoot)?;
        if roots.next().is_some() {
            return Err(DocumentError::MultipleRoots);
        }

        Ok(Self {
            nodes,
            root_index,
            bom,
        })
    }

    pub fn root(&self) -> &Element {
        match &self.nodes[self.root_index] {
            Node::Element(e) => e,
            _ => unreachable!("root index always points at an element"),
        }
    }

    pub fn root_mut(&mut self) -> &mut Element {
        match &mut self.nodes[self.root_index] {
            Node::Element(e) => e,
            _ => unreachable!("root index always points at an element"),
        }
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push(UTF8_BOM);
        }
        for node in &self.nodes {
            node.write_to(&mut out);
        }
        out
    }
}

/// Split the inside of a start tag (`name attr="v" ...`, without `<`, `>` or
/// the `/` of an empty tag) into attributes plus the trailing whitespace.
fn scan_attributes(raw: &str, name_len: usize) -> Option<(Vec<Attribute>, String)> {
    let mut rest = raw.get(name_len..)?;
    let mut attributes = Vec::new();
    loop {
        let body = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        let leading = &rest[..rest.len() - body.len()];
        if body.is_empty() {
            return Some((attributes, leading.to_string()));
        }

        let name_end = body.find(|c: char| c == '=' || c.is_ascii_whitespace())?;
        let (name, after_name) = body.split_at(name_end);
        let value_start = after_name.find(['"', '\''])?;
        let quote = after_name[value_start..].chars().next()?;
        let value_and_rest = &after_name[value_start + 1..];
        let value_end = value_and_rest.find(quote)?;

        attributes.push(Attribute {
            name: name.to_string(),
            value: value_and_rest[..value_end].to_string(),
            leading: leading.to_string(),
            separator: after_name[..value_start].to_string(),
            quote,
        });
        rest = &value_and_rest[value_end + 1..];
    }
}

fn utf8(bytes: &[u8]) -> Result<String, DocumentError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| DocumentError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- base configuration -->
<configuration>
  <appSettings>
    <add key="Env" value="DEV" />
    <add key="Url" value="http://dev?a=1&amp;b=2"/>
  </appSettings>
  <connectionStrings></connectionStrings>
  <system.web>
    <compilation debug="true" targetFramework="4.8" />
    <![CDATA[raw <stuff>]]>
  </system.web>
</configuration>
"#;

    #[test]
    fn test_round_trip_is_byte_identical() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.to_xml_string(), SAMPLE);
    }

    #[test]
    fn test_round_trip_keeps_bom_and_crlf() {
        let input = "\u{feff}<configuration>\r\n  <a x='say \"hi\"' />\r\n</configuration>";
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.to_xml_string(), input);
    }

    #[test]
    fn test_round_trip_keeps_quotes_and_attribute_layout() {
        let input = "<configuration>\n  <add key='Env' value='DEV' />\n  <add key=\"Url\"\n         value=\"http://dev\" />\n  <b x = \"1\"\t></b>\n</configuration>";
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.to_xml_string(), input);
    }

    #[test]
    fn test_set_attribute_keeps_quote_and_leading_whitespace() {
        let input = "<c>\n  <add key='Env'\n       value='DEV'/>\n</c>";
        let mut doc = Document::parse(input).unwrap();
        let add = doc.root_mut().children[1].as_element_mut().unwrap();
        add.set_attribute("value", "HLG");
        add.set_attribute("extra", "1");
        assert_eq!(
            doc.to_xml_string(),
            "<c>\n  <add key='Env'\n       value='HLG' extra=\"1\"/>\n</c>"
        );
    }

    #[test]
    fn test_value_containing_quote_switches_quote() {
        let mut doc = Document::parse("<c a='x' />").unwrap();
        doc.root_mut().set_attribute("a", "it's");
        assert_eq!(doc.to_xml_string(), "<c a=\"it's\" />");
    }

    #[test]
    fn test_self_closing_with_children_drops_trailing_space() {
        let mut doc = Document::parse("<c a=\"1\" />").unwrap();
        doc.root_mut().append_element(Element::new("b"));
        assert_eq!(doc.to_xml_string(), "<c a=\"1\"><b></b></c>");
    }

    #[test]
    fn test_root_and_attributes() {
        let doc = Document::parse(SAMPLE).unwrap();
        let root = doc.root();
        assert_eq!(root.name, "configuration");

        let settings = root.child_elements().next().unwrap();
        let adds: Vec<_> = settings.child_elements().collect();
        assert_eq!(adds.len(), 2);
        assert_eq!(adds[0].attribute("key"), Some("Env"));
        assert_eq!(adds[1].attribute("value"), Some("http://dev?a=1&amp;b=2"));
    }

    #[test]
    fn test_set_and_remove_attribute() {
        let mut element = Element::new("add");
        element.set_attribute("key", "a");
        element.set_attribute("value", "1");
        element.set_attribute("key", "b");
        assert_eq!(element.attributes[0].value, "b");
        assert!(element.remove_attribute("value"));
        assert!(!element.remove_attribute("value"));
        assert_eq!(element.attributes.len(), 1);
    }

    #[test]
    fn test_append_element_reuses_indentation() {
        let mut doc = Document::parse("<c>\n  <a />\n</c>").unwrap();
        let mut b = Element::new("b");
        b.self_closing = true;
        doc.root_mut().append_element(b);
        assert_eq!(doc.to_xml_string(), "<c>\n  <a />\n  <b/>\n</c>");
    }

    #[test]
    fn test_append_element_into_empty_parent() {
        let mut doc = Document::parse("<c></c>").unwrap();
        doc.root_mut().append_element(Element::new("b"));
        assert_eq!(doc.to_xml_string(), "<c><b></b></c>");
    }

    #[test]
    fn test_remove_child_takes_indentation() {
        let mut doc = Document::parse("<c>\n  <a />\n  <b />\n</c>").unwrap();
        let index = doc
            .root()
            .children
            .iter()
            .position(|n| n.as_element().is_some_and(|e| e.name == "b"))
            .unwrap();
        doc.root_mut().remove_child(index);
        assert_eq!(doc.to_xml_string(), "<c>\n  <a />\n</c>");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Document::parse("<a><b></a>"),
            Err(DocumentError::Syntax { .. })
        ));
        assert!(Document::parse("<a>").is_err());
        assert_eq!(Document::parse("  "), Err(DocumentError::MissingRoot));
        assert_eq!(Document::parse("<a/><b/>"), Err(DocumentError::MultipleRoots));
    }
}
