//! HTML content extraction: title, cleaned body text, and outbound links.

use scraper::node::{Element, Node};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Result of extracting a fetched document.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Resolved page title (`<title>`, first heading, or `"Untitled"`).
    pub title: String,
    /// Cleaned main-content text.
    pub content: String,
    /// Absolute URLs discovered on anchor elements.
    pub links: Vec<String>,
}

/// Fallback title when a document carries neither a `<title>` nor a heading.
const UNTITLED: &str = "Untitled";

/// Tags whose subtrees are page chrome, not content.
const CHROME_TAGS: [&str; 7] = [
    "script", "style", "nav", "footer", "header", "iframe", "noscript",
];

/// Class names that mark chrome containers on sites without semantic markup.
const CHROME_CLASSES: [&str; 5] = ["navigation", "menu", "sidebar", "footer", "header"];

/// Stateless extractor holding precompiled selectors.
#[derive(Clone)]
pub struct Extractor {
    title: Selector,
    heading: Selector,
    content_root: Selector,
    body: Selector,
    anchors: Selector,
}

impl Extractor {
    /// Builds a new extractor instance.
    pub fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("title selector"),
            heading: Selector::parse("h1").expect("heading selector"),
            content_root: Selector::parse("main, article, .content, .main-content, #content")
                .expect("content root selector"),
            body: Selector::parse("body").expect("body selector"),
            anchors: Selector::parse("a[href]").expect("anchor selector"),
        }
    }

    /// Extracts title, cleaned content text, and absolute links from a document.
    ///
    /// Chrome subtrees (scripts, styles, navigation, headers, footers, and the
    /// usual chrome class names) are excluded from both the text and the link
    /// sweep. Anchor hrefs are resolved against `base`; hrefs that fail to
    /// resolve are skipped rather than failing the extraction.
    pub fn extract(&self, html: &str, base: &Url) -> ExtractedPage {
        let document = Html::parse_document(html);

        let title = self.resolve_title(&document);
        let content = collapse_whitespace(&self.content_text(&document));
        let links = self.resolve_links(&document, base);

        ExtractedPage {
            title,
            content,
            links,
        }
    }

    fn resolve_title(&self, document: &Html) -> String {
        if let Some(el) = document.select(&self.title).next() {
            let text = collapse_whitespace(&raw_text(el));
            if !text.is_empty() {
                return text;
            }
        }

        if let Some(el) = document
            .select(&self.heading)
            .find(|el| !inside_chrome(*el))
        {
            let text = collapse_whitespace(&raw_text(el));
            if !text.is_empty() {
                return text;
            }
        }

        UNTITLED.to_string()
    }

    fn content_text(&self, document: &Html) -> String {
        let root = document
            .select(&self.content_root)
            .next()
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element());

        let mut buf = String::new();
        collect_text(root, &mut buf);
        buf
    }

    fn resolve_links(&self, document: &Html, base: &Url) -> Vec<String> {
        let mut links = Vec::new();
        for anchor in document.select(&self.anchors) {
            if inside_chrome(anchor) {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if let Ok(resolved) = base.join(href) {
                links.push(resolved.to_string());
            }
        }
        links
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_chrome(element: &Element) -> bool {
    if CHROME_TAGS.contains(&element.name()) {
        return true;
    }
    element
        .classes()
        .any(|class| CHROME_CLASSES.contains(&class))
}

fn inside_chrome(element: ElementRef<'_>) -> bool {
    element.ancestors().any(|node| match node.value() {
        Node::Element(ancestor) => is_chrome(ancestor),
        _ => false,
    })
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if !is_chrome(el) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

fn raw_text(element: ElementRef<'_>) -> String {
    let mut buf = String::new();
    for piece in element.text() {
        buf.push_str(piece);
    }
    buf
}

/// Collapses whitespace runs to a single space, newline-bearing runs to a
/// single newline, and trims the ends.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_run = false;
    let mut run_has_newline = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            in_run = true;
            if ch == '\n' {
                run_has_newline = true;
            }
        } else {
            if in_run && !out.is_empty() {
                out.push(if run_has_newline { '\n' } else { ' ' });
            }
            in_run = false;
            run_has_newline = false;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/docs/start").unwrap()
    }

    #[test]
    fn prefers_document_title() {
        let page = Extractor::new().extract(
            "<html><head><title>  Pricing  </title></head><body><h1>Other</h1></body></html>",
            &base(),
        );
        assert_eq!(page.title, "Pricing");
    }

    #[test]
    fn falls_back_to_heading_then_untitled() {
        let extractor = Extractor::new();
        let page = extractor.extract("<body><h1>Plans</h1><p>text</p></body>", &base());
        assert_eq!(page.title, "Plans");

        let page = extractor.extract("<body><p>no headings here</p></body>", &base());
        assert_eq!(page.title, UNTITLED);
    }

    #[test]
    fn drops_chrome_subtrees_from_content() {
        let html = r#"
            <body>
              <nav>Home About Contact</nav>
              <div class="sidebar">Promo promo</div>
              <main>
                <p>Laser engraving from A6 to A0.</p>
                <script>var tracked = true;</script>
              </main>
              <footer>All rights reserved</footer>
            </body>
        "#;
        let page = Extractor::new().extract(html, &base());
        assert!(page.content.contains("Laser engraving"));
        assert!(!page.content.contains("About"));
        assert!(!page.content.contains("Promo"));
        assert!(!page.content.contains("tracked"));
        assert!(!page.content.contains("rights reserved"));
    }

    #[test]
    fn prefers_main_content_region_over_body() {
        let html = r#"
            <body>
              <div>outside text</div>
              <div class="content"><p>inside text</p></div>
            </body>
        "#;
        let page = Extractor::new().extract(html, &base());
        assert!(page.content.contains("inside text"));
        assert!(!page.content.contains("outside text"));
    }

    #[test]
    fn collapses_whitespace_runs() {
        let page = Extractor::new().extract(
            "<body><main>first   line\n\n\n  second\t line</main></body>",
            &base(),
        );
        assert_eq!(page.content, "first line\nsecond line");
    }

    #[test]
    fn resolves_links_and_skips_chrome_and_malformed() {
        let html = r#"
            <body>
              <nav><a href="/nav-link">nav</a></nav>
              <main>
                <a href="/pricing">pricing</a>
                <a href="https://other.example/page">offsite</a>
                <a href="https://[broken">broken</a>
              </main>
            </body>
        "#;
        let page = Extractor::new().extract(html, &base());
        assert_eq!(
            page.links,
            vec![
                "https://example.com/pricing".to_string(),
                "https://other.example/page".to_string(),
            ],
        );
    }
}
