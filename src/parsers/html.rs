//! Main-article extraction from newsletter HTML
//!
//! Newsletters wrap the article in navigation, tracking pixels, social
//! footers and layout tables. The extractor picks the most likely article
//! container and keeps the text of its block elements, falling back to all
//! text of the container when the blocks yield too little.

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info, warn};

use super::clean_text;

/// Semantic tags that usually hold the article, in priority order
const PRIMARY_CONTENT_TAGS: &[&str] = &["article", "main"];

/// Common container selectors tried when no semantic tag exists
const COMMON_CONTAINER_SELECTORS: &[&str] =
    &["div#content", "div#main", "div.post", "div.story", "div.article-body"];

/// Tags removed together with their content
const TAGS_TO_REMOVE: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "form", "noscript", "figure",
    "figcaption",
];

/// Tags whose text forms a paragraph of its own
const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "div", "ul", "ol",
];

/// Below this many characters the block extraction is considered a miss
const MIN_BLOCK_TEXT_CHARS: usize = 100;

fn is_noise(element: &ElementRef) -> bool {
    TAGS_TO_REMOVE.contains(&element.value().name())
}

fn is_block(element: &ElementRef) -> bool {
    BLOCK_TAGS.contains(&element.value().name())
}

/// Whether the element or one of its ancestors is a noise tag
fn inside_noise(element: &ElementRef) -> bool {
    is_noise(element)
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| is_noise(&a))
}

/// First element matching `selector` that isn't inside a noise tag
fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = match Selector::parse(selector) {
        Ok(selector) => selector,
        Err(e) => {
            warn!("CSS selector error for '{}': {:?}", selector, e);
            return None;
        }
    };
    document.select(&selector).find(|el| !inside_noise(el))
}

/// Pick the element holding the article
fn find_content_root(document: &Html) -> Option<ElementRef<'_>> {
    for tag in PRIMARY_CONTENT_TAGS {
        if let Some(node) = select_first(document, tag) {
            debug!("Found primary content node: <{}>", tag);
            return Some(node);
        }
    }

    for selector in COMMON_CONTAINER_SELECTORS {
        if let Some(node) = select_first(document, selector) {
            debug!("Found container node with selector '{}'", selector);
            return Some(node);
        }
    }

    debug!("No specific content container found, using <body>");
    select_first(document, "body")
}

/// Text belonging to a block element itself: its text nodes and the text of
/// inline children, excluding nested blocks and noise
fn own_text(element: ElementRef) -> String {
    let mut out = String::new();
    collect_own_text(element, &mut out);
    clean_text(&out)
}

fn collect_own_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !is_block(&child) && !is_noise(&child) {
                        collect_own_text(child, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Bullet or number for a list item, from its nearest enclosing list
fn list_marker(item: ElementRef) -> Option<String> {
    let list = item
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| matches!(a.value().name(), "ul" | "ol"))?;

    if list.value().name() == "ul" {
        return Some("- ".to_string());
    }

    let position = list
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "li")
        .position(|c| c.id() == item.id());

    Some(match position {
        Some(index) => format!("{}. ", index + 1),
        None => "* ".to_string(),
    })
}

/// Collect block texts below `node` in document order
fn collect_blocks(node: ElementRef, pieces: &mut Vec<String>) {
    for child in node.children().filter_map(ElementRef::wrap) {
        if is_noise(&child) {
            continue;
        }
        if is_block(&child) {
            let text = own_text(child);
            if !text.is_empty() {
                let marker = if child.value().name() == "li" {
                    list_marker(child)
                } else {
                    None
                };
                pieces.push(match marker {
                    Some(marker) => format!("{}{}", marker, text),
                    None => text,
                });
            }
        }
        collect_blocks(child, pieces);
    }
}

/// All text below `node` outside noise tags, space separated
fn all_text(node: ElementRef) -> String {
    let mut fragments = Vec::new();
    collect_all_text(node, &mut fragments);
    clean_text(&fragments.join(" "))
}

fn collect_all_text(node: ElementRef, fragments: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    fragments.push(text.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !is_noise(&child) {
                        collect_all_text(child, fragments);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Extract the main article text from an HTML document.
///
/// Paragraphs are separated by blank lines. Returns an empty string when the
/// document has no usable text.
pub fn extract_content_from_html(html_body: &str) -> String {
    if html_body.trim().is_empty() {
        return String::new();
    }

    debug!("Starting HTML content extraction");
    let document = Html::parse_document(html_body);

    let Some(root) = find_content_root(&document) else {
        warn!("HTML parsing produced no <body>, returning empty content");
        return String::new();
    };

    let mut pieces = Vec::new();
    if is_block(&root) {
        let text = own_text(root);
        if !text.is_empty() {
            pieces.push(text);
        }
    }
    collect_blocks(root, &mut pieces);

    let block_chars = pieces.join(" ").chars().count();
    if pieces.is_empty() || block_chars < MIN_BLOCK_TEXT_CHARS {
        debug!("Block extraction yielded {} chars, falling back to all text", block_chars);
        let text = all_text(root);
        pieces = if text.is_empty() { Vec::new() } else { vec![text] };
    }

    let content = pieces.join("\n\n");
    info!("Extracted content length: {} characters", content.len());
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FILLER: &str = "This sentence is deliberately long enough to push the extracted block text well past the fallback threshold.";

    #[test]
    fn test_prefers_article_and_drops_noise() {
        let html = format!(
            r#"<html><head><style>p {{ color: red }}</style></head><body>
                <nav><p>Home | Archive</p></nav>
                <article>
                    <h1>Markets rally</h1>
                    <p>Stocks <b>rose</b> sharply. {FILLER}</p>
                    <script>track()</script>
                    <figure><figcaption>A chart</figcaption></figure>
                </article>
                <footer><p>Unsubscribe</p></footer>
            </body></html>"#
        );

        let text = extract_content_from_html(&html);
        assert_eq!(text, format!("Markets rally\n\nStocks rose sharply. {FILLER}"));
    }

    #[test]
    fn test_lists_get_markers() {
        let html = format!(
            r#"<body><div id="content">
                <p>{FILLER}</p>
                <ul><li>apples</li><li>pears</li></ul>
                <ol><li>first</li><li>second <a href="x">link</a></li></ol>
            </div></body>"#
        );

        let text = extract_content_from_html(&html);
        assert_eq!(
            text,
            format!("{FILLER}\n\n- apples\n\n- pears\n\n1. first\n\n2. second link")
        );
    }

    #[test]
    fn test_nested_blocks_are_not_duplicated() {
        let html = format!(
            "<body><div class=\"story\">Lead text <div><p>{FILLER}</p></div></div></body>"
        );
        let text = extract_content_from_html(&html);
        assert_eq!(text, format!("Lead text\n\n{FILLER}"));
    }

    #[test]
    fn test_short_blocks_fall_back_to_all_text() {
        let html = "<body><table><tr><td>Quick</td><td>note</td></tr></table><p>Hi</p></body>";
        assert_eq!(extract_content_from_html(html), "Quick note Hi");
    }

    #[test]
    fn test_comments_are_ignored() {
        let html = "<body><!-- tracking --><p>Visible</p></body>";
        assert_eq!(extract_content_from_html(html), "Visible");
    }

    #[test]
    fn test_main_inside_header_is_skipped() {
        let html = format!("<body><header><main>Brand</main></header><p>{FILLER}</p></body>");
        assert_eq!(extract_content_from_html(&html), FILLER);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_content_from_html(""), "");
        assert_eq!(extract_content_from_html("<html><body></body></html>"), "");
    }
}
