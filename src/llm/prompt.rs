use super::CategorizationItem;

/// System instruction used for categorization batches.
pub(crate) const STRICT_JSON_SYSTEM: &str =
    "You are a helpful data assistant. Output strictly JSON.";

/// Items rendered one per line as `ID | Item Name`, the format the prompt
/// announces to the model.
pub(crate) fn format_item_lines(items: &[CategorizationItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} | {}", item.original_idx, item.item_name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for one categorization batch: the full existing category list as
/// JSON plus the batch's items, with instructions to answer as a raw JSON
/// array of `{id, category}` objects.
pub(crate) fn categorization_prompt(categories: &[String], items: &[CategorizationItem]) -> String {
    format!(
        "You are an expert retail category manager.\n\
         I have a list of items that need to be categorized.\n\
         Here is the list of EXISTING categories in the system:\n\
         {categories}\n\n\
         Here are the items to categorize (Format: ID | Item Name):\n\
         {items}\n\n\
         INSTRUCTIONS:\n\
         1. For each item, select the most appropriate category from the EXISTING list.\n\
         2. If the item definitely does not fit any existing category, you may suggest a new concise category name.\n\
         3. Return the result as a JSON ARRAY of objects.\n\
         4. Format: [{{\"id\": 123, \"category\": \"Category Name\"}}, ...]\n\
         5. Do NOT output markdown code blocks. Just the raw JSON string.",
        categories = serde_json::json!(categories),
        items = format_item_lines(items),
    )
}

/// Prompt asking the model to pair up duplicate, abbreviated, or variant
/// category names, tagging each pair with a source (to drop) and a target
/// (to keep).
pub(crate) fn merge_prompt(categories: &[String]) -> String {
    format!(
        "You are a data cleaning assistant. I have a list of retail product categories. \
         Identify pairs that are likely duplicates, abbreviations, or variations of each other \
         (e.g., \"Bev\" and \"Beverages\", \"Cigs\" and \"Cigarettes\").\n\n\
         List of Categories:\n\
         {categories}\n\n\
         INSTRUCTIONS:\n\
         1. Identify pairs that should be merged.\n\
         2. Determine which is the \"Source\" (incorrect/shorter/bad name) and which is the \"Target\" (correct/standard name).\n\
         3. Return a JSON ARRAY of objects: [{{\"source\": \"Bad Name\", \"target\": \"Good Name\", \"reason\": \"Abbreviation\"}}].\n\
         4. If no obvious merges exist, return [].\n\
         5. Output strictly JSON only. No markdown.",
        categories = serde_json::json!(categories),
    )
}
