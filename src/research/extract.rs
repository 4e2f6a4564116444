//! Readable-text extraction from fetched HTML via regex scrubbing rather
//! than a full DOM parse: strip non-content markup, prefer the first
//! content-bearing structural region, fall back to full-body text.

use once_cell::sync::Lazy;
use regex::Regex;

/// A content container must yield at least this many characters to be used
/// instead of the full body.
const MIN_CONTAINER_CHARS: usize = 200;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap());
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static CHROME_RE: Lazy<Regex> = Lazy::new(|| {
    // Navigation, headers, footers, sidebars: structural noise, never content.
    Regex::new(r"(?is)<(nav|header|footer|aside)\b[^>]*>.*?</(nav|header|footer|aside)>").unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\v]+").unwrap());
static NL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Likely content containers, most specific first.
static CONTAINER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?is)<main\b[^>]*>(.*?)</main>").unwrap(),
        Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").unwrap(),
        Regex::new(r#"(?is)<div\b[^>]*id="[^"]*content[^"]*"[^>]*>(.*?)</div>"#).unwrap(),
        Regex::new(r#"(?is)<div\b[^>]*class="[^"]*content[^"]*"[^>]*>(.*?)</div>"#).unwrap(),
        Regex::new(r#"(?is)<div\b[^>]*class="[^"]*post[^"]*"[^>]*>(.*?)</div>"#).unwrap(),
        Regex::new(r#"(?is)<div\b[^>]*class="[^"]*entry[^"]*"[^>]*>(.*?)</div>"#).unwrap(),
    ]
});

fn decode_common_html_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Strip all markup from an HTML fragment, preserving block boundaries as
/// newlines.
fn strip_markup(html: &str) -> String {
    let without_script = SCRIPT_RE.replace_all(html, " ");
    let without_style = STYLE_RE.replace_all(&without_script, " ");
    let without_comments = COMMENT_RE.replace_all(&without_style, " ");
    let with_line_breaks = without_comments
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n")
        .replace("</h1>", "\n")
        .replace("</h2>", "\n")
        .replace("</h3>", "\n")
        .replace("</h4>", "\n")
        .replace("</h5>", "\n")
        .replace("</h6>", "\n");
    let without_tags = TAG_RE.replace_all(&with_line_breaks, " ");
    let decoded = decode_common_html_entities(&without_tags);
    let normalized_ws = WS_RE.replace_all(&decoded, " ");
    let normalized_newlines = normalized_ws.replace(" \n", "\n");
    let squashed = NL_RE.replace_all(&normalized_newlines, "\n\n");
    squashed.trim().to_string()
}

/// Extract the readable content of a page, capped at `max_chars`. The first
/// content container yielding at least 200 characters wins; otherwise the
/// whole body is scrubbed.
pub fn readable_text(html: &str, max_chars: usize) -> String {
    let pruned = CHROME_RE.replace_all(html, " ");

    for container in CONTAINER_RES.iter() {
        if let Some(caps) = container.captures(&pruned) {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let text = strip_markup(inner);
            if text.chars().count() >= MIN_CONTAINER_CHARS {
                return crate::util::truncate_chars(&text, max_chars);
            }
        }
    }

    crate::util::truncate_chars(&strip_markup(&pruned), max_chars)
}

/// Page title, if the document declares one.
pub fn page_title(html: &str) -> Option<String> {
    let caps = TITLE_RE.captures(html)?;
    let title = decode_common_html_entities(caps.get(1)?.as_str())
        .trim()
        .to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
