
use scraper::{Html, Selector};

const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li, pre, blockquote, td, th";

const BLOCK_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "pre",
    "blockquote",
    "td",
    "th",
];

/// Extract readable text from wiki storage-format HTML.
///
/// Collects the text of block-level elements in document order, skipping
/// elements nested inside another block element so nothing is emitted
/// twice. Script and style content never matches the block selector, so it
/// is dropped along the way. Blocks are joined with blank lines, which is
/// the paragraph structure the chunker splits on.
#[inline]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse(BLOCK_SELECTOR).expect("block selector is valid");

    let mut blocks = Vec::new();
    for element in document.select(&selector) {
        let nested = element
            .ancestors()
            .filter_map(|node| node.value().as_element())
            .any(|el| BLOCK_TAGS.contains(&el.name()));
        if nested {
            continue;
        }

        let text = normalize_block_text(&element.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    blocks.join("\n\n")
}

/// Collapse whitespace runs and strip NUL bytes that occasionally survive
/// in exported storage HTML.
fn normalize_block_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace('\u{0}', "")
}
