use scraper::{ElementRef, Html, Node, Selector};

/// Elements that start a new line when the page is flattened.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol",
    "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Never part of the readable text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Text content of the first element matching `selector`, trimmed.
///
/// `None` when the selector is invalid, nothing matches, or the match is blank.
pub fn select_text(html: &str, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let document = Html::parse_document(html);
    let element = document.select(&selector).next()?;

    let text = element.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Plain-text rendering of the document body: block elements become line
/// breaks, runs of blank lines collapse to one.
pub fn flatten(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    flatten_into(body, &mut raw);
    tidy(&raw)
}

fn flatten_into(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    let block = BLOCK_ELEMENTS.contains(&name);
    let preformatted = name == "pre";

    if block {
        out.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                if preformatted {
                    out.push_str(text);
                } else {
                    push_collapsed(out, text);
                }
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    flatten_into(child, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.push('\n');
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    let mut words = text.split_whitespace().peekable();
    if words.peek().is_none() {
        if !text.is_empty() && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        }
        return;
    }
    if text.starts_with(char::is_whitespace) && !out.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    let mut first = true;
    for word in words {
        if !first {
            out.push(' ');
        }
        out.push_str(word);
        first = false;
    }
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn tidy(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in raw.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>MIT License</title><style>p { color: red }</style></head>
  <body>
    <nav><a href="/">Home</a></nav>
    <div id="LicenseText">
      <p>Copyright (c) &lt;year&gt; &lt;holders&gt;</p>
      <p>Permission is hereby granted,
         free of charge, to any person</p>
    </div>
    <script>var tracking = 1;</script>
  </body>
</html>"#;

    #[test]
    fn test_select_text() {
        let text = select_text(PAGE, "div#LicenseText").unwrap();
        assert!(text.starts_with("Copyright (c) <year> <holders>"));
        assert!(text.contains("free of charge"));
        assert!(!text.contains("Home"));
    }

    #[test]
    fn test_select_text_missing_element() {
        assert_eq!(select_text(PAGE, "div#Nope"), None);
        assert_eq!(select_text("<div id='LicenseText'>  </div>", "div#LicenseText"), None);
    }

    #[test]
    fn test_flatten_blocks_become_lines() {
        let text = flatten(PAGE);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Home",
                "",
                "Copyright (c) <year> <holders>",
                "",
                "Permission is hereby granted, free of charge, to any person",
            ]
        );
        assert!(!text.contains("tracking"));
    }

    #[test]
    fn test_flatten_empty_body() {
        assert_eq!(flatten("<html><body>  </body></html>"), "");
    }

    #[test]
    fn test_inline_elements_stay_on_the_line() {
        let text = flatten("<body><p>Use <b>at</b> <i>your</i> own risk.</p></body>");
        assert_eq!(text, "Use at your own risk.");
    }
}
