use super::GenerationError;
use crate::models::StudyMaterial;

/// Parse model output into [`StudyMaterial`].
///
/// Models often wrap JSON in markdown fences or add a sentence around it, so
/// fences are stripped and, failing a direct parse, the outermost `{ ... }`
/// span is tried.
pub fn parse_material(raw: &str) -> Result<StudyMaterial, GenerationError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let material = match serde_json::from_str::<StudyMaterial>(cleaned) {
        Ok(material) => material,
        Err(first) => outer_object(cleaned)
            .and_then(|span| serde_json::from_str::<StudyMaterial>(span).ok())
            .ok_or_else(|| GenerationError::MalformedOutput(first.to_string()))?,
    };

    if material.notes.trim().is_empty() {
        return Err(GenerationError::MalformedOutput("notes are empty".into()));
    }
    Ok(material)
}

fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
