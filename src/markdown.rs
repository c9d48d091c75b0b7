//! Converts the model's markdown reply into the HTML fragment the page
//! renders. Only the subset the summarizer prompt produces is handled:
//! bold, italic, `*`/`-` bullet lists and plain paragraphs.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("Failed to compile bold pattern"));

static ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("Failed to compile italic pattern"));

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[*-]\s+").expect("Failed to compile bullet pattern"));

pub fn markdown_to_html(text: &str) -> String {
    let mut html_lines: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in text.lines() {
        if let Some(marker) = BULLET.find(line) {
            if !in_list {
                html_lines.push("<ul>".to_string());
                in_list = true;
            }
            html_lines.push(format!("<li>{}</li>", inline(&line[marker.end()..])));
            continue;
        }

        if in_list {
            html_lines.push("</ul>".to_string());
            in_list = false;
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            html_lines.push(format!("<p>{}</p>", inline(trimmed)));
        }
    }

    if in_list {
        html_lines.push("</ul>".to_string());
    }

    html_lines.join("\n")
}

// Bold first, so `**` pairs are not read as two empty italics.
fn inline(text: &str) -> String {
    let bold = BOLD.replace_all(text, "<b>${1}</b>");
    ITALIC.replace_all(&bold, "<i>${1}</i>").into_owned()
}
