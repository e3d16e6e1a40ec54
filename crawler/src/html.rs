use scraper::{Html, Selector};
use url::Url;

/// Visible text of the document body. Concatenated text nodes; the tokenizer
/// whitespace-splits downstream, so no separator cleanup happens here.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body").expect("valid selector");
    document
        .select(&body)
        .next()
        .map(|node| node.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Anchor hrefs, absolute ones parsed as-is and relative ones resolved
/// against `base`. Unparseable hrefs are dropped.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a").expect("valid selector");
    let mut links = Vec::new();
    for anchor in document.select(&anchors) {
        if let Some(href) = anchor.value().attr("href") {
            if let Ok(url) = Url::parse(href).or_else(|_| base.join(href)) {
                links.push(url);
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_body_text_only() {
        let html = r#"<html><head><title>Ignored</title></head>
            <body><h1>Quotes</h1><p>to live by</p></body></html>"#;
        let text = extract_text(html);
        assert!(text.contains("Quotes"));
        assert!(text.contains("to live by"));
        assert!(!text.contains("Ignored"));
    }

    #[test]
    fn resolves_relative_links_against_the_base() {
        let base = Url::parse("https://site.test/").unwrap();
        let html = r#"<body>
            <a href="/page/2/">next</a>
            <a href="https://other.test/away">away</a>
            <a href="not a url at all %%">broken</a>
        </body>"#;
        let links = extract_links(html, &base);
        assert!(links.contains(&Url::parse("https://site.test/page/2/").unwrap()));
        assert!(links.contains(&Url::parse("https://other.test/away").unwrap()));
    }
}
