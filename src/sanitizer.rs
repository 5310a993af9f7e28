//! Canonicalizes raw page markup into a compact, noise-stripped form
//! the oracle can afford to read. Scripts, styles, comments, tracking
//! attributes and presentation classes are removed, link targets are
//! truncated, and whitespace is collapsed. Sanitization is idempotent.

use ego_tree::NodeRef;
use scraper::node::{Element, Node};
use scraper::Html;
use std::sync::LazyLock;

/// Diagnostic/coverage container dropped from every snapshot.
const COVERAGE_CONTAINER_ID: &str = "coverage";

/// Attributes whose name contains this fragment are stripped everywhere.
const TRACKING_ATTR_FRAGMENT: &str = "data-";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

static WHITESPACE_RUN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").unwrap());

static BETWEEN_TAGS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r">\s+<").unwrap());

/// Reduce raw page markup to the compact form embedded in prompts.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() / 2);
    if is_document(raw) {
        let doc = Html::parse_document(raw);
        for child in doc.tree.root().children() {
            emit_node(child, &mut out);
        }
    } else {
        let doc = Html::parse_fragment(raw);
        // Fragment parsing wraps content in a synthetic root element;
        // emit its children so fragments stay fragments.
        if let Some(root) = doc
            .tree
            .root()
            .children()
            .find(|n| n.value().is_element())
        {
            for child in root.children() {
                emit_node(child, &mut out);
            }
        }
    }
    WHITESPACE_RUN.replace_all(&out, " ").trim().to_string()
}

/// Generic markup compressor applied on top of `sanitize` before the
/// result is embedded in a prompt. Drops inter-tag whitespace.
pub fn compress_markup(html: &str) -> String {
    BETWEEN_TAGS.replace_all(html.trim(), "><").into_owned()
}

fn is_document(raw: &str) -> bool {
    let lowered = raw.trim_start().to_ascii_lowercase();
    lowered.starts_with("<!doctype") || lowered.contains("<html")
}

fn emit_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Document | Node::Fragment => {
            for child in node.children() {
                emit_node(child, out);
            }
        }
        Node::Doctype(_) => out.push_str("<!DOCTYPE html>"),
        Node::Comment(_) => {}
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(element) => emit_element(node, element, out),
        _ => {}
    }
}

fn emit_element(node: NodeRef<'_, Node>, element: &Element, out: &mut String) {
    let name = element.name();
    if name == "script" || name == "style" {
        return;
    }
    if element.id() == Some(COVERAGE_CONTAINER_ID) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (key, value) in element.attrs() {
        if drop_attr(name, key) {
            continue;
        }
        let rewritten = if name == "a" && key == "href" {
            canonical_href(value)
        } else if name == "iframe" && key == "srcdoc" {
            // Inline iframe documents are sanitized as documents of
            // their own; out-of-document sources stay untouched.
            Some(sanitize(value))
        } else {
            None
        };
        let value = rewritten.as_deref().unwrap_or(value);
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    for child in node.children() {
        emit_node(child, out);
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn drop_attr(tag: &str, key: &str) -> bool {
    if key.contains(TRACKING_ATTR_FRAGMENT) {
        return true;
    }
    if key == "class" && matches!(tag, "div" | "span" | "ul") {
        return true;
    }
    if tag == "img" && matches!(key, "alt" | "srcset") {
        return true;
    }
    false
}

/// Truncate link targets so the oracle sees where a link goes without
/// the full path or query noise. Root-relative paths keep their first
/// segment; absolute HTTPS links keep scheme and host.
fn canonical_href(href: &str) -> Option<String> {
    if href.starts_with('/') {
        let parts: Vec<&str> = href.split('/').collect();
        if parts.len() > 2 {
            return Some(format!("/{}/", parts[1]));
        }
    } else if href.starts_with("https") {
        let parts: Vec<&str> = href.split('/').collect();
        if parts.len() > 3 {
            return Some(format!("https://{}", parts[2]));
        }
        if parts.len() == 3 {
            let host = parts[2];
            return Some(match host.find('?') {
                Some(idx) => format!("https://{}", &host[..idx]),
                None => format!("https://{host}"),
            });
        }
    }
    None
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_classes() {
        let html = r#"<div class="x"><script>evil()</script><p>hi</p></div>"#;
        assert_eq!(sanitize(html), "<div><p>hi</p></div>");
    }

    #[test]
    fn strips_style_elements_and_comments() {
        let html = "<div><style>p{color:red}</style><!-- hidden --><p>ok</p></div>";
        assert_eq!(sanitize(html), "<div><p>ok</p></div>");
    }

    #[test]
    fn removes_nested_comments() {
        let html = "<div><p><!-- a --><span>x<!-- b --></span></p></div>";
        assert_eq!(sanitize(html), "<div><p><span>x</span></p></div>");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let html = r#"<!DOCTYPE html><html><head><script>a()</script></head><body>
            <div class="wrap" data-track="1"><a href="/foo/bar/baz?x=1">go</a>
            <img src="x.png" alt="pic" srcset="x2.png 2x"></div></body></html>"#;
        let once = sanitize(html);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn fragment_idempotence() {
        let once = sanitize(r#"<div class="x"><p>a &amp; b</p></div>"#);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn drops_coverage_container() {
        let html = r#"<div><div id="coverage"><p>stats</p></div><p>kept</p></div>"#;
        assert_eq!(sanitize(html), "<div><p>kept</p></div>");
    }

    #[test]
    fn strips_tracking_attributes_everywhere() {
        let html = r#"<form data-test="a"><input data-id="b" name="q"></form>"#;
        assert_eq!(sanitize(html), r#"<form><input name="q"></form>"#);
    }

    #[test]
    fn keeps_class_on_elements_outside_policy() {
        let html = r#"<p class="lead">text</p><span class="x">y</span>"#;
        assert_eq!(sanitize(html), r#"<p class="lead">text</p><span>y</span>"#);
    }

    #[test]
    fn canonicalizes_root_relative_href() {
        assert_eq!(canonical_href("/foo/bar/baz?x=1").as_deref(), Some("/foo/"));
        assert_eq!(canonical_href("/foo"), None);
        assert_eq!(canonical_href("/foo/").as_deref(), Some("/foo/"));
    }

    #[test]
    fn canonicalizes_https_href() {
        assert_eq!(
            canonical_href("https://example.com/a/b?x=1").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            canonical_href("https://example.com?x=1").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            canonical_href("https://example.com").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(canonical_href("http://example.com/a"), None);
    }

    #[test]
    fn rewrites_hrefs_in_markup() {
        let html = r#"<a href="/account/orders/123">orders</a>"#;
        assert_eq!(sanitize(html), r#"<a href="/account/">orders</a>"#);
    }

    #[test]
    fn strips_img_alt_and_srcset() {
        let html = r#"<img src="a.png" alt="cat" srcset="a2.png 2x">"#;
        assert_eq!(sanitize(html), r#"<img src="a.png">"#);
    }

    #[test]
    fn sanitizes_inline_iframe_documents() {
        let html = r#"<iframe srcdoc="<p>hi</p><script>x()</script>"></iframe>"#;
        let clean = sanitize(html);
        assert!(clean.contains("srcdoc"));
        assert!(!clean.contains("script"));
        assert!(clean.contains("&lt;p&gt;hi&lt;/p&gt;"));
    }

    #[test]
    fn leaves_external_iframe_sources_alone() {
        let html = r#"<iframe src="https_other.html"></iframe>"#;
        assert_eq!(sanitize(html), r#"<iframe src="https_other.html"></iframe>"#);
    }

    #[test]
    fn collapses_whitespace_runs() {
        let html = "<p>a   b\n\n\tc</p>";
        assert_eq!(sanitize(html), "<p>a b c</p>");
    }

    #[test]
    fn document_keeps_doctype_and_shell() {
        let html = "<!DOCTYPE html><html><head><title>t</title></head><body><p>x</p></body></html>";
        let clean = sanitize(html);
        assert!(clean.starts_with("<!DOCTYPE html>"));
        assert!(clean.contains("<body><p>x</p></body>"));
    }

    #[test]
    fn compressor_drops_inter_tag_whitespace() {
        assert_eq!(
            compress_markup("<div> <p>a</p>   <p>b</p> </div>"),
            "<div><p>a</p><p>b</p></div>"
        );
    }
}
