//! Cleanup of raw model text before it is parsed.
//!
//! Models wrap JSON in Markdown fences, append a second object, quote plain
//! answers, or add emphasis. Everything here is pure string work so each
//! stage of the pipeline can be tested without a provider.

use once_cell::sync::Lazy;
use regex::Regex;

static PROMPT_LINE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)^PROMPT:\s*(.+)$").expect("static PROMPT regex")
});
static TITLE_LINE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)^TITLE:\s*(.+)$").expect("static TITLE regex")
});

const QUOTE_CHARS: &[char] = &['"', '\'', '`', '“', '”', '‘', '’'];

/// Drop Markdown code-fence delimiter lines (```` ``` ```` / ```` ```json ````) and trim.
pub fn strip_code_fences(text: &str) -> String {
  text
    .trim()
    .lines()
    .filter(|line| !line.trim_start().starts_with("```"))
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_string()
}

/// Return the first balanced `{...}` object in `text`.
///
/// Braces inside JSON string literals do not count. If the object never
/// closes, everything from the first `{` is returned and parsing decides.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;

  for (offset, ch) in text[start..].char_indices() {
    if in_string {
      if escaped {
        escaped = false;
      } else if ch == '\\' {
        escaped = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }

    match ch {
      '"' => in_string = true,
      '{' => depth += 1,
      '}' => {
        depth = depth.saturating_sub(1);
        if depth == 0 {
          let end = start + offset + ch.len_utf8();
          return Some(&text[start..end]);
        }
      }
      _ => {}
    }
  }

  Some(&text[start..])
}

/// Fence-strip, trim, and keep only the first top-level JSON object.
pub fn clean_json_response(text: &str) -> String {
  let stripped = strip_code_fences(text);
  match extract_first_json_object(&stripped) {
    Some(obj) => obj.trim().to_string(),
    None => stripped,
  }
}

pub fn strip_wrapping_quotes(text: &str) -> String {
  text.trim().trim_matches(QUOTE_CHARS).trim().to_string()
}

/// Topic answers should be one line of plain text.
pub fn clean_topic(text: &str) -> String {
  strip_code_fences(text)
    .lines()
    .map(|line| {
      let line = line.trim().trim_start_matches('#').trim();
      let line = line.trim_matches('*').trim_matches('_');
      strip_wrapping_quotes(line)
    })
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Read the `PROMPT:` and `TITLE:` tagged lines. The first non-empty match of each wins.
pub fn parse_prompt_and_title(text: &str) -> (Option<String>, Option<String>) {
  let mut prompt = None;
  let mut title = None;

  for line in text.lines() {
    let line = line.trim().trim_matches('*').trim();
    if let Some(caps) = PROMPT_LINE.captures(line) {
      let value = strip_wrapping_quotes(&caps[1]);
      if prompt.is_none() && !value.is_empty() {
        prompt = Some(value);
      }
    } else if let Some(caps) = TITLE_LINE.captures(line) {
      let value = strip_wrapping_quotes(&caps[1]);
      if title.is_none() && !value.is_empty() {
        title = Some(value);
      }
    }
  }

  (prompt, title)
}
