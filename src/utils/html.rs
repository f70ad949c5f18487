use std::sync::LazyLock;
use scraper::{ElementRef, Html, Selector};

static H3: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").unwrap());
static LABEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").unwrap());

// Text of an element with whitespace runs collapsed to single spaces.
pub fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn next_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

// Value of the first <input name=...>, or an empty string like a browser form would send.
pub fn input_value(document: &Html, name: &str) -> String {
    let selector = match Selector::parse(&format!("input[name=\"{}\"]", name)) {
        Ok(selector) => selector,
        Err(_) => return String::new(),
    };

    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .unwrap_or("")
        .trim()
        .to_string()
}

// Headings (<h3>) whose text contains the caption, case-insensitively.
pub fn headings<'a>(document: &'a Html, caption: &str) -> Vec<ElementRef<'a>> {
    document
        .select(&H3)
        .filter(|h3| contains_ignore_case(&element_text(h3), caption))
        .collect()
}

// Every <tag> sibling that follows a matching heading, in document order and without repeats.
pub fn siblings_after_heading<'a>(document: &'a Html, caption: &str, tag: &str) -> Vec<ElementRef<'a>> {
    let mut blocks: Vec<ElementRef<'a>> = Vec::new();

    for heading in headings(document, caption) {
        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            if sibling.value().name() == tag && !blocks.contains(&sibling) {
                blocks.push(sibling);
            }
        }
    }

    blocks
}

// Text of the <label> right after the label whose text contains the caption.
pub fn label_after(document: &Html, caption: &str) -> String {
    document
        .select(&LABEL)
        .filter(|label| contains_ignore_case(&element_text(label), caption))
        .filter_map(|label| next_element(&label))
        .find(|next| next.value().name() == "label")
        .map(|label| element_text(&label))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_label_following_caption() {
        let document = Html::parse_document(
            r#"<div><label class="blue">Nombres:</label> <label>  JUAN   ANDRES </label></div>
               <div><label class="blue">Apellidos:</label><label>PEREZ SOTO</label></div>"#,
        );
        assert_eq!(label_after(&document, "nombres"), "JUAN ANDRES");
        assert_eq!(label_after(&document, "Apellidos"), "PEREZ SOTO");
        assert_eq!(label_after(&document, "Carrera"), "");
    }

    #[test]
    fn collects_sibling_blocks_once() {
        let document = Html::parse_document(
            r#"<body><h3>Ponderaciones</h3><div id="a"></div><p></p><div id="b"></div></body>"#,
        );
        let ids: Vec<_> = siblings_after_heading(&document, "ponderaciones", "div")
            .iter()
            .filter_map(|div| div.value().attr("id"))
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_input_reads_as_empty() {
        let document = Html::parse_document(r#"<form><input name="alu_rut" value=" 12345678 "></form>"#);
        assert_eq!(input_value(&document, "alu_rut"), "12345678");
        assert_eq!(input_value(&document, "anio"), "");
    }
}
