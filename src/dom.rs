//! Owned markup tree mirroring the table DOM
//!
//! The engine never touches the page directly. Tables, fragments returned by
//! the server and the floating menus are all held as [`Element`] trees; the
//! browser bridge imports live elements into this shape and projects the
//! result back through render patches.

use crate::error::GridError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Elements that never carry children or a closing tag.
const VOID_TAGS: &[&str] = &["col", "input", "img", "br", "hr", "meta", "link", "source", "wbr"];

/// A node inside an [`Element`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One element with its attributes, class list, inline style and children
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    /// Attributes other than `class` and `style`, in source order
    #[serde(default)]
    attrs: IndexMap<String, String>,
    #[serde(default)]
    classes: Vec<String>,
    /// Inline style declarations, in source order
    #[serde(default)]
    style: IndexMap<String, String>,
    #[serde(default)]
    children: Vec<Node>,
}

/// Turns server-rendered HTML into elements.
///
/// In the browser this is backed by a `<template>` element so the page's own
/// parser does the work; tests construct elements directly.
pub trait FragmentParser {
    fn parse_fragment(&self, html: &str) -> Result<Vec<Element>, GridError>;
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        for name in class.split_whitespace() {
            self.add_class(name);
        }
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_style(mut self, prop: &str, value: impl Into<String>) -> Self {
        self.set_style(prop, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn set_id(&mut self, id: &str) {
        self.set_attr("id", id);
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Sets an attribute. `class` and `style` are routed into the class list
    /// and the style map so both stay the single source for those values.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match name {
            "class" => {
                self.classes.clear();
                for class in value.split_whitespace() {
                    self.add_class(class);
                }
            }
            "style" => {
                self.style.clear();
                for decl in value.split(';') {
                    if let Some((prop, val)) = decl.split_once(':') {
                        let prop = prop.trim();
                        if !prop.is_empty() {
                            self.style.insert(prop.to_string(), val.trim().to_string());
                        }
                    }
                }
            }
            _ => {
                self.attrs.insert(name.to_string(), value);
            }
        }
    }

    /// Attributes other than `class` and `style`
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.attrs.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attrs.shift_remove(name)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.has_class(class) {
            self.classes.push(class.to_string());
        }
    }

    pub fn remove_class(&mut self, class: &str) -> bool {
        let before = self.classes.len();
        self.classes.retain(|c| c != class);
        before != self.classes.len()
    }

    pub fn toggle_class(&mut self, class: &str, on: bool) {
        if on {
            self.add_class(class);
        } else {
            self.remove_class(class);
        }
    }

    pub fn style(&self, prop: &str) -> Option<&str> {
        self.style.get(prop).map(String::as_str)
    }

    pub fn set_style(&mut self, prop: &str, value: impl Into<String>) {
        self.style.insert(prop.to_string(), value.into());
    }

    pub fn remove_style(&mut self, prop: &str) {
        self.style.shift_remove(prop);
    }

    /// Serialized `style` attribute value, empty when no declarations are set
    pub fn style_attr(&self) -> String {
        self.style
            .iter()
            .map(|(prop, value)| format!("{}: {};", prop, value))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Serialized `class` attribute value
    pub fn class_attr(&self) -> String {
        self.classes.join(" ")
    }

    /// False when an inline `display: none` hides the element
    pub fn is_displayed(&self) -> bool {
        self.style("display") != Some("none")
    }

    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    pub fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// Element children, skipping text
    pub fn children(&self) -> impl Iterator<Item = &Element> + '_ {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut Element> + '_ {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    pub fn child(&self, pos: usize) -> Option<&Element> {
        self.children().nth(pos)
    }

    pub fn child_mut(&mut self, pos: usize) -> Option<&mut Element> {
        self.children_mut().nth(pos)
    }

    /// Position of the `pos`-th element child inside the raw node list
    fn node_index(&self, pos: usize) -> Option<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, Node::Element(_)))
            .nth(pos)
            .map(|(idx, _)| idx)
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Inserts before the `pos`-th element child, appending when `pos` is past the end
    pub fn insert_child(&mut self, pos: usize, child: Element) {
        match self.node_index(pos) {
            Some(idx) => self.children.insert(idx, Node::Element(child)),
            None => self.children.push(Node::Element(child)),
        }
    }

    pub fn remove_child(&mut self, pos: usize) -> Option<Element> {
        let idx = self.node_index(pos)?;
        match self.children.remove(idx) {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn replace_child(&mut self, pos: usize, child: Element) -> Option<Element> {
        let idx = self.node_index(pos)?;
        match std::mem::replace(&mut self.children[idx], Node::Element(child)) {
            Node::Element(old) => Some(old),
            Node::Text(_) => None,
        }
    }

    /// Keeps text nodes and the element children the predicate accepts
    pub fn retain_children(&mut self, mut keep: impl FnMut(&Element) -> bool) {
        self.children.retain(|node| match node {
            Node::Element(el) => keep(el),
            Node::Text(_) => true,
        });
    }

    /// Removes and returns every element child, dropping text nodes
    pub fn take_children(&mut self) -> Vec<Element> {
        std::mem::take(&mut self.children)
            .into_iter()
            .filter_map(|node| match node {
                Node::Element(el) => Some(el),
                Node::Text(_) => None,
            })
            .collect()
    }

    pub fn set_children(&mut self, children: Vec<Element>) {
        self.children = children.into_iter().map(Node::Element).collect();
    }

    pub fn child_by_tag(&self, tag: &str) -> Option<&Element> {
        self.children().find(|el| el.tag == tag)
    }

    pub fn child_by_tag_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.children_mut().find(|el| el.tag == tag)
    }

    /// Depth-first search over descendants (the element itself is not tested)
    pub fn find(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        for child in self.children() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find(pred) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_mut(&mut self, pred: &dyn Fn(&Element) -> bool) -> Option<&mut Element> {
        for child in self.children_mut() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.find_mut(pred) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_all(&self, pred: &dyn Fn(&Element) -> bool) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_matching(pred, &mut found);
        found
    }

    fn collect_matching<'a>(&'a self, pred: &dyn Fn(&Element) -> bool, out: &mut Vec<&'a Element>) {
        for child in self.children() {
            if pred(child) {
                out.push(child);
            }
            child.collect_matching(pred, out);
        }
    }

    /// Applies `f` to every descendant element, parents before children
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Element)) {
        for child in self.children_mut() {
            f(child);
            child.visit_mut(f);
        }
    }

    /// Concatenated text of every descendant text node
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Replaces all children with a single text node
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(&self.tag.as_str())
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(node, &mut out);
        }
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            push_attr(out, name, value);
        }
        if !self.classes.is_empty() {
            push_attr(out, "class", &self.class_attr());
        }
        if !self.style.is_empty() {
            push_attr(out, "style", &self.style_attr());
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        for node in &self.children {
            write_node(node, out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(el) => el.write_html(out),
        Node::Text(text) => escape_into(out, text, false),
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(out, value, true);
    out.push('"');
}

fn escape_into(out: &mut String, text: &str, attr: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_and_style_attributes_are_routed() {
        let mut el = Element::new("TD");
        el.set_attr("class", "table__cell  hidden");
        el.set_attr("style", "max-width: 80px; text-align:right");

        assert_eq!(el.tag, "td");
        assert!(el.has_class("hidden"));
        assert_eq!(el.style("max-width"), Some("80px"));
        assert_eq!(el.style("text-align"), Some("right"));
        assert_eq!(el.attr("class"), None);
    }

    #[test]
    fn test_serialization_escapes_text_and_attributes() {
        let el = Element::new("td")
            .with_attr("data-id", "a\"b")
            .with_class("table__cell")
            .with_style("max-width", "60px")
            .with_text("1 < 2 & 3");

        assert_eq!(
            el.to_html(),
            "<td data-id=\"a&quot;b\" class=\"table__cell\" style=\"max-width: 60px;\">1 &lt; 2 &amp; 3</td>"
        );
    }

    #[test]
    fn test_void_elements_have_no_closing_tag() {
        let colgroup = Element::new("colgroup").with_child(Element::new("col"));
        assert_eq!(colgroup.to_html(), "<colgroup><col></colgroup>");
    }

    #[test]
    fn test_child_positions_skip_text_nodes() {
        let mut tbody = Element::new("tbody")
            .with_text("\n")
            .with_child(Element::new("tr").with_attr("data-id", "1"))
            .with_text("\n")
            .with_child(Element::new("tr").with_attr("data-id", "2"));

        tbody.insert_child(1, Element::new("tr").with_attr("data-id", "x"));
        let ids: Vec<_> = tbody.children().filter_map(|tr| tr.attr("data-id")).collect();
        assert_eq!(ids, vec!["1", "x", "2"]);

        let removed = tbody.remove_child(0).unwrap();
        assert_eq!(removed.attr("data-id"), Some("1"));
        assert_eq!(tbody.child_count(), 2);
    }

    #[test]
    fn test_text_content_and_find() {
        let row = Element::new("tr")
            .with_child(Element::new("td").with_text("A"))
            .with_child(
                Element::new("td")
                    .with_class("table__cell--selected")
                    .with_child(Element::new("span").with_text("B")),
            );

        assert_eq!(row.text_content(), "AB");
        let selected = row.find(&|el| el.has_class("table__cell--selected")).unwrap();
        assert_eq!(selected.text_content(), "B");
        assert_eq!(row.find_all(&|el| el.tag == "td").len(), 2);
    }
}
