use crate::error::ParseError;

const FENCE: &str = "```";
const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

pub fn sanitize(raw: &str) -> Result<String, ParseError> {
    let text = strip_code_fences(raw);
    let text = strip_json_label(&text);
    let text = strip_think_blocks(text);
    extract_json_object(&text).map(str::to_owned)
}

fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(FENCE) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + FENCE.len()..];
        if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            rest = &rest[4..];
        }
        rest = rest.trim_start();
    }
    out.push_str(rest);
    out
}

fn strip_json_label(text: &str) -> &str {
    let text = text.trim();
    match text.get(..5) {
        Some(label) if label.eq_ignore_ascii_case("json:") => text[5..].trim_start(),
        _ => text,
    }
}

/// Drops `<think>...</think>` blocks. An unclosed block runs up to the next `{`.
fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + THINK_OPEN.len()..];
        rest = match after_open.find(THINK_CLOSE) {
            Some(close) => &after_open[close + THINK_CLOSE.len()..],
            None => match after_open.find('{') {
                Some(brace) => &after_open[brace..],
                None => "",
            },
        };
    }
    out.push_str(rest);
    out
}

fn extract_json_object(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoJsonFound)?;
    let end = text.rfind('}').ok_or(ParseError::NoJsonFound)?;
    if end <= start {
        return Err(ParseError::NoJsonFound);
    }
    Ok(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_between_prose() -> anyhow::Result<()> {
        let raw = "Some reasoning... {\"questions\":[]} trailing text";
        assert_eq!(sanitize(raw)?, "{\"questions\":[]}");
        Ok(())
    }

    #[test]
    fn strips_code_fences_and_label() -> anyhow::Result<()> {
        let raw = "JSON:\n```json\n{\"a\": 1}\n```\n";
        assert_eq!(sanitize(raw)?, "{\"a\": 1}");
        Ok(())
    }

    #[test]
    fn strips_think_blocks_containing_braces() -> anyhow::Result<()> {
        let raw = "<think>maybe {\"x\": 1} is right?</think>\n{\"questions\": [1]}";
        assert_eq!(sanitize(raw)?, "{\"questions\": [1]}");
        Ok(())
    }

    #[test]
    fn unclosed_think_block_runs_to_first_brace() -> anyhow::Result<()> {
        let raw = "<think>I should answer carefully\n{\"ok\": true}";
        assert_eq!(sanitize(raw)?, "{\"ok\": true}");
        Ok(())
    }

    #[test]
    fn keeps_malformed_but_present_braces() -> anyhow::Result<()> {
        let raw = "here: {'questions': [,]} done";
        assert_eq!(sanitize(raw)?, "{'questions': [,]}");
        Ok(())
    }

    #[test]
    fn fails_without_braces() {
        assert_eq!(sanitize("I cannot help with that."), Err(ParseError::NoJsonFound));
        assert_eq!(sanitize("} backwards {"), Err(ParseError::NoJsonFound));
        assert_eq!(sanitize(""), Err(ParseError::NoJsonFound));
    }
}
