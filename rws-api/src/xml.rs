//! Navigation helpers for the XHTML documents served by the controller
//!
//! Controller responses and event frames are XHTML where the meaningful nodes
//! are tagged with a `class` attribute. These helpers search an [`Element`]
//! tree by that attribute in document order.

use xmltree::{Element, XMLNode};

use crate::error::ProtocolError;

/// Parse an XHTML document, reporting malformed markup as a protocol error
pub fn parse_xhtml(content: &str) -> Result<Element, ProtocolError> {
    Element::parse(content.as_bytes())
        .map_err(|e| ProtocolError::with_context(format!("malformed markup: {}", e), content))
}

/// All descendants of `root` (including `root` itself) whose `class` attribute equals `class`
pub fn find_elements_by_class<'a>(root: &'a Element, class: &str) -> Vec<&'a Element> {
    let mut found = Vec::new();
    collect(root, &mut |element| has_class(element, class), &mut found);
    found
}

/// All descendants of `root` (including `root` itself) with the given tag name
pub fn find_elements_by_name<'a>(root: &'a Element, name: &str) -> Vec<&'a Element> {
    let mut found = Vec::new();
    collect(root, &mut |element| element.name == name, &mut found);
    found
}

/// Trimmed text content of the first element tagged with `class`
pub fn find_text_by_class(root: &Element, class: &str) -> Option<String> {
    find_first(root, &|element| has_class(element, class))
        .and_then(|element| element.get_text())
        .map(|text| text.trim().to_string())
}

/// Like [`find_text_by_class`], but the field is mandatory
pub fn require_text_by_class(root: &Element, class: &str) -> Result<String, ProtocolError> {
    find_text_by_class(root, class)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ProtocolError::missing_field(class, describe(root)))
}

pub fn has_class(element: &Element, class: &str) -> bool {
    element.attributes.get("class").map(String::as_str) == Some(class)
}

/// Child elements of `element`, skipping text and other nodes
pub fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(XMLNode::as_element)
}

/// Short description of an element for error context
pub fn describe(element: &Element) -> String {
    let mut out = format!("<{}", element.name);
    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort();
    for (name, value) in attributes {
        out.push_str(&format!(" {}=\"{}\"", name, value));
    }
    out.push('>');
    out
}

fn find_first<'a>(root: &'a Element, predicate: &dyn Fn(&Element) -> bool) -> Option<&'a Element> {
    if predicate(root) {
        return Some(root);
    }
    child_elements(root).find_map(|child| find_first(child, predicate))
}

fn collect<'a>(
    element: &'a Element,
    predicate: &mut dyn FnMut(&Element) -> bool,
    found: &mut Vec<&'a Element>,
) {
    if predicate(element) {
        found.push(element);
    }
    for child in child_elements(element) {
        collect(child, predicate, found);
    }
}
