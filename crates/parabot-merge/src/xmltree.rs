//! A minimal, generic XML tree: read into memory with `quick_xml`'s
//! event reader, mutated in place by the splicer, written back out with
//! `quick_xml`'s writer. Robot Framework's `output.xml` mixes element
//! kinds in arbitrary order (`<suite>`, `<test>`, `<kw>`, `<status>`,
//! `<msg>`, ...) in a way serde's struct-shaped deserializer does not
//! model cleanly, so the merger works on this generic tree instead of a
//! typed schema.

use crate::error::{MergeError, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: String) {
        if let Some(existing) = self.attrs.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value;
        } else {
            self.attrs.push((key.to_string(), value));
        }
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter_map(move |c| match c {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    pub fn children_named_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut Element> {
        self.children.iter_mut().filter_map(move |c| match c {
            Node::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Walks every `Element` in the subtree, including `self`.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(e) = child {
                e.walk_mut(f);
            }
        }
    }
}

pub fn parse_file(path: &Path) -> Result<Element> {
    let content = std::fs::read_to_string(path).map_err(MergeError::Io)?;
    parse_str(&content).map_err(|reason| MergeError::MalformedXml { path: path.display().to_string(), reason })
}

pub fn parse_str(content: &str) -> std::result::Result<Element, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| e.to_string())? {
            Event::Start(e) => stack.push(element_from_start(&e)?),
            Event::Empty(e) => {
                let el = element_from_start(&e)?;
                push_child(&mut stack, &mut root, Node::Element(el));
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| e.to_string())?.to_string();
                if !text.trim().is_empty() {
                    push_child(&mut stack, &mut root, Node::Text(text));
                }
            }
            Event::End(_) => {
                if let Some(finished) = stack.pop() {
                    push_child(&mut stack, &mut root, Node::Element(finished));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    root.ok_or_else(|| "no root element".to_string())
}

fn element_from_start(e: &BytesStart) -> std::result::Result<Element, String> {
    let name = std::str::from_utf8(e.name().as_ref()).map_err(|e| e.to_string())?.to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|e| e.to_string())?.to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
        attrs.push((key, value));
    }
    Ok(Element { name, attrs, children: Vec::new() })
}

fn push_child(stack: &mut [Element], root: &mut Option<Element>, node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if let Node::Element(e) = node {
        *root = Some(e);
    }
}

pub fn write_string(root: &Element) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_element(&mut writer, root).map_err(|e| MergeError::MalformedXml { path: "<in-memory>".to_string(), reason: e })?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| MergeError::MalformedXml { path: "<in-memory>".to_string(), reason: e.to_string() })
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, el: &Element) -> std::result::Result<(), String> {
    let mut start = BytesStart::new(el.name.clone());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(|e| e.to_string())?;
        return Ok(());
    }
    writer.write_event(Event::Start(start)).map_err(|e| e.to_string())?;
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t))).map_err(|e| e.to_string())?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(el.name.clone()))).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_tree() {
        let xml = r#"<suite name="A" source="a.robot"><test name="T1"></test></suite>"#;
        let tree = parse_str(xml).unwrap();
        assert_eq!(tree.name, "suite");
        assert_eq!(tree.attr("name"), Some("A"));
        assert_eq!(tree.children_named("test").count(), 1);
        let rendered = write_string(&tree).unwrap();
        let reparsed = parse_str(&rendered).unwrap();
        assert_eq!(reparsed, tree);
    }
}
