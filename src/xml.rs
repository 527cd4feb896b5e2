//! Minimal XML element tree.
//!
//! Autodiscover and Autoconfig answers are small documents that are walked
//! several times (decoding, normalization, port extraction), so they are read
//! once into an owned tree. Child lookups match on local name regardless of
//! prefix; each element also carries its resolved namespace URI for the few
//! places where the namespace matters.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::error_handling::XmlError;

/// One parsed element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name (prefix stripped)
    pub name: String,
    /// Resolved namespace URI, if the element is in one
    pub namespace: Option<String>,
    /// Attributes as (local name, unescaped value)
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<Element>,
    /// Concatenated direct character data, trimmed
    pub text: String,
}

impl Element {
    /// Parses the first root element of `input`.
    ///
    /// Content after the root element is ignored.
    pub fn parse(input: &str) -> Result<Element, XmlError> {
        let mut reader = NsReader::from_str(input);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();

        loop {
            let (resolved, event) = reader.read_resolved_event()?;
            let namespace = match resolved {
                ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned())
                    .filter(|uri| !uri.is_empty()),
                _ => None,
            };

            match event {
                Event::Start(start) => stack.push(open_element(&start, namespace)?),
                Event::Empty(start) => {
                    let element = open_element(&start, namespace)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => return Ok(element),
                    }
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        return Err(XmlError::Empty);
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => return Ok(element),
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
                            .push_str(String::from_utf8_lossy(&data.into_inner()).trim());
                    }
                }
                Event::Eof => {
                    return Err(match stack.pop() {
                        Some(open) => XmlError::Unclosed(open.name),
                        None => XmlError::Empty,
                    });
                }
                _ => {}
            }
        }
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First child with the given local name in namespace `ns`.
    pub fn child_ns(&self, name: &str, ns: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.name == name && c.namespace.as_deref() == Some(ns))
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given local name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Value of the attribute with the given local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Builds an element without children; namespace declarations are not kept
/// as attributes.
fn open_element(start: &BytesStart<'_>, namespace: Option<String>) -> Result<Element, XmlError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let local = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        attributes.push((local, attr.unescape_value()?.into_owned()));
    }

    Ok(Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolves_default_and_prefixed_namespaces() {
        let doc = r#"<?xml version="1.0" encoding="utf-8"?>
<Autodiscover xmlns="urn:root" xmlns:o="urn:outlook">
  <o:Response>
    <Account><Action>settings</Action></Account>
  </o:Response>
</Autodiscover>"#;
        let root = Element::parse(doc).unwrap();
        assert_eq!(root.name, "Autodiscover");
        assert_eq!(root.namespace.as_deref(), Some("urn:root"));

        let response = root.child("Response").unwrap();
        assert_eq!(response.namespace.as_deref(), Some("urn:outlook"));
        assert!(root.child_ns("Response", "urn:outlook").is_some());
        assert!(root.child_ns("Response", "urn:root").is_none());

        let account = response.child("Account").unwrap();
        // Unprefixed children inherit the default namespace
        assert_eq!(account.namespace.as_deref(), Some("urn:root"));
        assert_eq!(account.child_text("Action"), Some("settings"));
    }

    #[test]
    fn test_nested_default_namespace_overrides_outer() {
        let doc = r#"<a xmlns="urn:one"><b xmlns="urn:two"><c/></b><d/></a>"#;
        let root = Element::parse(doc).unwrap();
        let b = root.child("b").unwrap();
        assert_eq!(b.child("c").unwrap().namespace.as_deref(), Some("urn:two"));
        assert_eq!(root.child("d").unwrap().namespace.as_deref(), Some("urn:one"));
    }

    #[test]
    fn test_empty_elements_and_undeclared_prefixes() {
        let doc = r#"<a xmlns:p="urn:p" p:flag="1"><p:b/><q:c/><d xmlns="urn:d"/></a>"#;
        let root = Element::parse(doc).unwrap();
        assert!(root.namespace.is_none());
        assert_eq!(root.attributes, vec![("flag".to_string(), "1".to_string())]);
        assert_eq!(root.child("b").unwrap().namespace.as_deref(), Some("urn:p"));
        assert!(root.child("c").unwrap().namespace.is_none());
        assert_eq!(root.child("d").unwrap().namespace.as_deref(), Some("urn:d"));
    }

    #[test]
    fn test_attributes_text_and_entities() {
        let doc = r#"<clientConfig version="1.1"><emailProvider id="x">
            <incomingServer type="imap"><hostname>a &amp; b</hostname></incomingServer>
            <incomingServer type="pop3"><hostname><![CDATA[pop.example.com]]></hostname></incomingServer>
        </emailProvider></clientConfig>"#;
        let root = Element::parse(doc).unwrap();
        assert_eq!(root.attr("version"), Some("1.1"));
        assert!(root.namespace.is_none());
        let provider = root.child("emailProvider").unwrap();
        let servers: Vec<_> = provider.children_named("incomingServer").collect();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].attr("type"), Some("imap"));
        assert_eq!(servers[0].child_text("hostname"), Some("a & b"));
        assert_eq!(servers[1].child_text("hostname"), Some("pop.example.com"));
    }

    #[test]
    fn test_empty_input_is_eof() {
        let err = Element::parse("").unwrap_err();
        assert_eq!(err.to_string(), "EOF");
        let err = Element::parse("   <!-- nothing -->  ").unwrap_err();
        assert_eq!(err.to_string(), "EOF");
    }

    #[test]
    fn test_mismatched_and_unclosed_tags_fail() {
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(matches!(
            Element::parse("<a><b></b>"),
            Err(XmlError::Unclosed(name)) if name == "a"
        ));
    }

    #[test]
    fn test_trailing_content_after_root_is_ignored() {
        let root = Element::parse("<a><b>1</b></a><junk").unwrap();
        assert_eq!(root.child_text("b"), Some("1"));
    }
}
