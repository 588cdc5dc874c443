// MarkdownV2 escaping for channel messages. Telegram rejects the whole
// message when a single reserved character is left unescaped, so this runs
// over every piece of scraped or generated text before sending.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LINK_RE: Regex = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex");
}

const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escape every MarkdownV2 reserved character.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if RESERVED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escape MarkdownV2 while keeping `[anchor](url)` links functional: the
/// anchor is escaped like ordinary text, the URL only gets parentheses and
/// spaces neutralized.
pub fn escape_markdown_v2_except_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;

    for caps in LINK_RE.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0 always present");
        let anchor = &caps[1];
        let url = &caps[2];

        out.push_str(&escape_markdown_v2(&text[last_end..whole.start()]));

        let escaped_url = url
            .replace('(', "\\(")
            .replace(')', "\\)")
            .replace(' ', "%20");
        out.push('[');
        out.push_str(&escape_markdown_v2(anchor));
        out.push_str("](");
        out.push_str(&escaped_url);
        out.push(')');

        last_end = whole.end();
    }

    out.push_str(&escape_markdown_v2(&text[last_end..]));
    out
}

/// Shorten escaped MarkdownV2 to at most `max_chars` characters without
/// breaking the markup: never cuts between a backslash and the character
/// it escapes, and never cuts inside a `[anchor](url)` link (the whole
/// link is dropped instead). Assumes input produced by the escape
/// functions above, where stray brackets are always escaped.
pub fn truncate_markdown_v2(text: &str, max_chars: usize) -> String {
    #[derive(PartialEq)]
    enum LinkState {
        Outside,
        Anchor,
        AfterAnchor,
        Url,
    }

    let mut safe_end = 0;
    let mut seen = 0usize;
    let mut escaped = false;
    let mut state = LinkState::Outside;

    for (idx, ch) in text.char_indices() {
        if seen == max_chars {
            return text[..safe_end].to_string();
        }
        seen += 1;
        let end = idx + ch.len_utf8();

        if escaped {
            escaped = false;
            if state == LinkState::Outside {
                safe_end = end;
            }
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '[' if state == LinkState::Outside => state = LinkState::Anchor,
            ']' if state == LinkState::Anchor => state = LinkState::AfterAnchor,
            '(' if state == LinkState::AfterAnchor => state = LinkState::Url,
            ')' if state == LinkState::Url => {
                state = LinkState::Outside;
                safe_end = end;
            }
            _ => {
                if state == LinkState::AfterAnchor {
                    state = LinkState::Outside;
                }
                if state == LinkState::Outside {
                    safe_end = end;
                }
            }
        }
    }
    text.to_string()
}
