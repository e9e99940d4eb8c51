use lazy_static::lazy_static;
use regex::Regex;

use super::{CategoryUpdate, MergeSuggestion};
use crate::error::AssistantError;

lazy_static! {
    static ref FENCE_RE: Regex = Regex::new(r"```(?:json)?").unwrap();
}

/// Removes markdown code-fence markers the model was told not to emit but
/// often does anyway.
pub(crate) fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_string()
}

/// Narrows to the substring between the first `[` and the last `]`, in case
/// the model wrapped the array in prose. Returns the input unchanged when no
/// such span exists.
pub(crate) fn extract_json_array(text: &str) -> &str {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

pub(crate) fn parse_category_updates(raw: &str) -> Result<Vec<CategoryUpdate>, AssistantError> {
    let clean = strip_code_fences(raw);
    Ok(serde_json::from_str(extract_json_array(&clean))?)
}

pub(crate) fn parse_merge_suggestions(raw: &str) -> Result<Vec<MergeSuggestion>, AssistantError> {
    Ok(serde_json::from_str(&strip_code_fences(raw))?)
}
