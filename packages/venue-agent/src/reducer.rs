//! HTML content reduction.
//!
//! Shrinks a fetched page to the parts a model needs: the `<body>` subtree
//! without scripts, styling, comments, decorative links, empty wrappers and
//! most attributes. The document is parsed with `scraper`, copied into a
//! small owned tree, pruned in a fixed order and serialized again.
//!
//! ```rust,ignore
//! let page = reducer::reduce(&html)?;
//! println!("{} -> {} bytes", page.raw_length, page.reduced_length);
//! ```

use scraper::{ElementRef, Html, Node};

use crate::error::ReduceError;

/// Subtrees dropped entirely.
const REMOVED_TAGS: &[&str] = &["script", "noscript", "style", "iframe"];

/// Attributes kept on every element (plus any `data-*`).
const KEPT_ATTRIBUTES: &[&str] = &[
    "id", "name", "href", "src", "alt", "title", "type", "value", "srcset",
];

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text content the parser reads literally. Their text is
/// serialized unescaped, or every pass would escape it once more.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Output of reducing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFetchResult {
    pub reduced_content: String,
    /// Length of the raw document, in bytes
    pub raw_length: usize,
    /// Length of `reduced_content`, in bytes
    pub reduced_length: usize,
}

/// Reduce a raw HTML document.
///
/// Fails with [`ReduceError::MalformedDocument`] when the parsed document has
/// no body (e.g. frameset documents).
pub fn reduce(raw_html: &str) -> Result<ContentFetchResult, ReduceError> {
    let document = Html::parse_document(raw_html);
    let body = find_body(&document).ok_or(ReduceError::MalformedDocument)?;

    let mut nodes = copy_children(body);
    remove_tags(&mut nodes);
    normalize_whitespace(&mut nodes);
    remove_comments(&mut nodes);
    filter_attributes(&mut nodes);
    remove_placeholder_links(&mut nodes);
    remove_empty_elements(&mut nodes);

    let reduced_content = serialize(&nodes);
    Ok(ContentFetchResult {
        raw_length: raw_html.len(),
        reduced_length: reduced_content.len(),
        reduced_content,
    })
}

#[derive(Debug, Clone)]
enum Fragment {
    Element(ElementNode),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct ElementNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Fragment>,
}

impl ElementNode {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Empty elements render nothing. Children must already be pruned.
    fn is_empty(&self) -> bool {
        if self.name == "img" {
            return !["src", "srcset"]
                .iter()
                .filter_map(|key| self.attr(key))
                .any(|value| !value.trim().is_empty());
        }
        self.children
            .iter()
            .all(|child| matches!(child, Fragment::Text(text) if text.trim().is_empty()))
    }
}

fn find_body(document: &Html) -> Option<ElementRef<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "body")
}

fn copy_element(element: ElementRef<'_>) -> ElementNode {
    let mut attrs: Vec<(String, String)> = element
        .value()
        .attrs()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    // attribute storage order is not guaranteed by the parser
    attrs.sort();

    ElementNode {
        name: element.value().name().to_string(),
        attrs,
        children: copy_children(element),
    }
}

fn copy_children(element: ElementRef<'_>) -> Vec<Fragment> {
    element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(Fragment::Text(String::from(&**text))),
            Node::Comment(comment) => Some(Fragment::Comment(String::from(&**comment))),
            Node::Element(_) => ElementRef::wrap(child).map(|e| Fragment::Element(copy_element(e))),
            _ => None,
        })
        .collect()
}

/// Visit every element below `nodes`, parents before children.
fn for_each_element(nodes: &mut [Fragment], f: &mut impl FnMut(&mut ElementNode)) {
    for node in nodes {
        if let Fragment::Element(element) = node {
            f(element);
            for_each_element(&mut element.children, f);
        }
    }
}

/// Drop matching nodes at every depth.
fn prune(nodes: &mut Vec<Fragment>, remove: &impl Fn(&Fragment) -> bool) {
    nodes.retain(|node| !remove(node));
    for node in nodes.iter_mut() {
        if let Fragment::Element(element) = node {
            prune(&mut element.children, remove);
        }
    }
}

fn remove_tags(nodes: &mut Vec<Fragment>) {
    prune(nodes, &|node| {
        matches!(node, Fragment::Element(e) if REMOVED_TAGS.contains(&e.name.as_str()))
    });
}

fn normalize_whitespace(nodes: &mut [Fragment]) {
    for node in nodes {
        match node {
            Fragment::Text(text) => {
                *text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            }
            Fragment::Element(element) => normalize_whitespace(&mut element.children),
            Fragment::Comment(_) => {}
        }
    }
}

fn remove_comments(nodes: &mut Vec<Fragment>) {
    prune(nodes, &|node| matches!(node, Fragment::Comment(_)));
}

fn filter_attributes(nodes: &mut [Fragment]) {
    for_each_element(nodes, &mut |element| {
        element.attrs = std::mem::take(&mut element.attrs)
            .into_iter()
            .filter_map(|(key, value)| {
                if KEPT_ATTRIBUTES.contains(&key.as_str()) || key.starts_with("data-") {
                    return Some((key, value));
                }
                if key == "style" {
                    let kept = background_image_declarations(&value);
                    return (!kept.is_empty()).then_some((key, kept));
                }
                None
            })
            .collect();
    });
}

/// Keep only the declarations of a `style` value that set a background image.
fn background_image_declarations(style: &str) -> String {
    style
        .split(';')
        .map(str::trim)
        .filter(|declaration| declaration.contains("background-image"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Anchors pointing nowhere are removed with everything inside them,
/// including their text.
fn remove_placeholder_links(nodes: &mut Vec<Fragment>) {
    prune(nodes, &|node| match node {
        Fragment::Element(e) if e.name == "a" => matches!(e.attr("href"), Some("") | Some("#")),
        _ => false,
    });
}

fn remove_empty_elements(nodes: &mut Vec<Fragment>) {
    for node in nodes.iter_mut() {
        if let Fragment::Element(element) = node {
            remove_empty_elements(&mut element.children);
        }
    }
    nodes.retain(|node| !matches!(node, Fragment::Element(e) if e.is_empty()));
}

fn serialize(nodes: &[Fragment]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_fragment(&mut out, node);
    }
    out
}

fn write_fragment(out: &mut String, node: &Fragment) {
    match node {
        Fragment::Text(text) => push_escaped(out, text, false),
        Fragment::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Fragment::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (key, value) in &element.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                push_escaped(out, value, true);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&element.name.as_str()) {
                return;
            }
            let raw_text = RAW_TEXT_ELEMENTS.contains(&element.name.as_str());
            for child in &element.children {
                match child {
                    Fragment::Text(text) if raw_text => out.push_str(text),
                    child => write_fragment(out, child),
                }
            }
            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
    }
}

fn push_escaped(out: &mut String, value: &str, attribute: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}
