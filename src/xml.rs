//! XML helpers: tolerant DOM parsing and XHTML content extraction.
//!
//! Feed parsing needs per-element namespace dispatch, which serde derive
//! cannot express, so the format parsers work against a small owned element
//! tree built from `quick_xml::NsReader` events. The builder is deliberately
//! tolerant: mismatched end tags are accepted, unknown entities are kept
//! verbatim, and a hard reader error terminates the build but still yields
//! the partial tree plus a human-readable error line for the subscription's
//! parse-error buffer.

use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;

/// Result of a tolerant parse: the root element (if any element was
/// recognizable at all) plus accumulated error lines.
#[derive(Debug, Default)]
pub struct ParsedDoc {
    pub root: Option<Element>,
    pub errors: Vec<String>,
}

/// One node of the element tree.
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(Element),
    /// Character data with entities already decoded. CDATA sections land
    /// here too.
    Text(String),
}

/// An attribute with its raw qualified name (`media:url` stays `media:url`).
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// An element with resolved namespace information.
#[derive(Debug, Clone, Default)]
pub struct Element {
    /// Local name without prefix.
    pub name: String,
    /// Namespace prefix as written in the document.
    pub prefix: Option<String>,
    /// Resolved namespace URI, when the prefix (or a default namespace) was
    /// bound.
    pub ns_uri: Option<String>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<XmlNode>,
}

impl Element {
    /// Iterates the element children, skipping text nodes.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn find(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == local_name)
    }

    /// First child element matching the local name case-insensitively. CDF
    /// documents mix upper- and lower-case tags freely.
    pub fn find_ci(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name.eq_ignore_ascii_case(local_name))
    }

    /// Attribute lookup by qualified or local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| {
                a.name == name
                    || a.name
                        .rsplit_once(':')
                        .is_some_and(|(_, local)| local == name)
            })
            .map(|a| a.value.as_str())
    }

    /// Case-insensitive attribute lookup (CDF).
    pub fn attr_ci(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Concatenated direct text children. Element children are not
    /// descended into; escaped markup in feeds arrives as text anyway.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Like [`Element::text`] but trimmed, and `None` when empty.
    pub fn nonempty_text(&self) -> Option<String> {
        let t = self.text();
        let trimmed = t.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Depth-first iteration over all descendant elements.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            out.push(el);
            let mut children: Vec<&Element> = el.elements().collect();
            children.reverse();
            stack.append(&mut children);
        }
        out
    }
}

/// Parses bytes into an element tree, never failing outright.
///
/// Non-UTF-8 input is transcoded (Latin-1/Windows-1252 heuristically, lossy
/// otherwise) so that everything downstream deals in valid UTF-8 strings.
pub fn parse_document(data: &[u8]) -> ParsedDoc {
    let text = decode_bytes(data);
    parse_str(&text)
}

fn parse_str(text: &str) -> ParsedDoc {
    let mut reader = NsReader::from_str(text);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut doc = ParsedDoc::default();
    // Stack of open elements; the finished root ends up in doc.root.
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(start))) => {
                let el = element_from_start(ns, &start, &mut doc.errors);
                stack.push(el);
            }
            Ok((ns, Event::Empty(start))) => {
                let el = element_from_start(ns, &start, &mut doc.errors);
                attach(&mut stack, &mut doc, XmlNode::Element(el));
            }
            Ok((_, Event::End(_))) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut doc, XmlNode::Element(el));
                }
            }
            Ok((_, Event::Text(t))) => {
                let text = match t.unescape() {
                    Ok(cow) => cow.into_owned(),
                    // Unknown entities: keep the raw text rather than losing it.
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                if !text.is_empty() {
                    attach(&mut stack, &mut doc, XmlNode::Text(text));
                }
            }
            Ok((_, Event::CData(t))) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                attach(&mut stack, &mut doc, XmlNode::Text(text));
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => {
                doc.errors.push(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
                break;
            }
        }
    }

    // Unclosed elements at EOF: fold them into the tree anyway.
    while let Some(el) = stack.pop() {
        attach(&mut stack, &mut doc, XmlNode::Element(el));
    }

    if doc.root.is_none() && doc.errors.is_empty() {
        doc.errors.push("empty document".to_string());
    }

    doc
}

fn element_from_start(
    ns: ResolveResult<'_>,
    start: &quick_xml::events::BytesStart<'_>,
    errors: &mut Vec<String>,
) -> Element {
    let name = String::from_utf8_lossy(start.local_name().into_inner()).into_owned();
    let prefix = start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.into_inner()).into_owned());
    let ns_uri = match ns {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.into_inner()).into_owned())
        }
        _ => None,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes().with_checks(false) {
        match attr {
            Ok(attr) => {
                let name = String::from_utf8_lossy(attr.key.into_inner()).into_owned();
                let value = match attr.unescape_value() {
                    Ok(cow) => cow.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                };
                attributes.push(Attribute { name, value });
            }
            Err(e) => errors.push(format!("bad attribute in <{}>: {}", name, e)),
        }
    }

    Element {
        name,
        prefix,
        ns_uri,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut Vec<Element>, doc: &mut ParsedDoc, node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if let XmlNode::Element(el) = node {
        if doc.root.is_none() {
            doc.root = Some(el);
        }
    }
}

/// Decodes raw bytes to a string, honoring a Latin-1-family declaration in
/// the XML prolog and replacing anything undecodable.
fn decode_bytes(data: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(data) {
        return s.to_string();
    }

    let head = String::from_utf8_lossy(&data[..data.len().min(128)]).to_lowercase();
    if head.contains("iso-8859-1") || head.contains("windows-1252") || head.contains("latin1") {
        return data.iter().map(|&b| b as char).collect();
    }

    String::from_utf8_lossy(data).into_owned()
}

/// Serializes the children of `node` as an HTML fragment.
///
/// Text children are emitted verbatim (they carry already-decoded entity
/// content, i.e. the HTML markup of escaped-HTML feeds), element children are
/// serialized as markup. With `as_xhtml` the result is wrapped in
/// `<div xmlns="http://www.w3.org/1999/xhtml">…</div>` and relative
/// `href`/`src` attributes are resolved against `base_url`.
pub fn xhtml_extract(node: &Element, as_xhtml: bool, base_url: Option<&str>) -> String {
    let mut out = String::new();
    if as_xhtml {
        out.push_str("<div xmlns=\"http://www.w3.org/1999/xhtml\">");
    }
    for child in &node.children {
        serialize_node(child, as_xhtml, base_url, &mut out);
    }
    if as_xhtml {
        out.push_str("</div>");
    }
    out
}

fn serialize_node(node: &XmlNode, rewrite_urls: bool, base_url: Option<&str>, out: &mut String) {
    match node {
        XmlNode::Text(t) => out.push_str(t),
        XmlNode::Element(el) => {
            out.push('<');
            push_qname(el, out);
            for attr in &el.attributes {
                let value = if rewrite_urls
                    && matches!(attr.name.as_str(), "href" | "src")
                    && !crate::uri::has_scheme(&attr.value)
                {
                    crate::uri::build_url(&attr.value, base_url)
                } else {
                    attr.value.clone()
                };
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&escape_attr(&value));
                out.push('"');
            }
            if el.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in &el.children {
                serialize_node(child, rewrite_urls, base_url, out);
            }
            out.push_str("</");
            push_qname(el, out);
            out.push('>');
        }
    }
}

fn push_qname(el: &Element, out: &mut String) {
    if let Some(prefix) = &el.prefix {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(&el.name);
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

/// Escapes a string for embedding in a generated HTML attribute value.
pub fn escape_attr_text(value: &str) -> String {
    escape_attr(value)
}

/// Escapes text for embedding in generated HTML snippets.
pub fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Strips markup from a string and decodes entities, for fields that must be
/// plain text (titles, link text). `<b>Hi</b> &amp; bye` becomes `Hi & bye`.
pub fn unhtmlize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    decode_entities(out.trim())
}

/// Decodes the predefined XML entities, a few common HTML ones, and numeric
/// character references. Unknown entities are kept verbatim.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let window = &rest.as_bytes()[..rest.len().min(12)];
        let Some(end) = window.iter().position(|&b| b == b';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&rest[..=end]),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
