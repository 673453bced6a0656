use crate::models::NoteFormat;

fn output_contract(note_format: NoteFormat) -> String {
    format!(
        r#"Your response MUST be a valid JSON object with the following structure:
{{
  "notes": "A string containing detailed, well-structured study notes in {format} format.",
  "quiz": [
    {{ "question": "A multiple-choice question", "options": ["Option A", "Option B", "Option C", "Option D"], "answer": "The correct option" }},
    {{ "question": "A short-answer question", "answer": "The correct answer" }}
  ]
}}
Do not include any other text, markdown, or formatting outside of this single JSON object."#,
        format = note_format.label()
    )
}

/// Prompt for the fast path, grounded in a fetched transcript.
pub fn transcript_prompt(transcript: &str, note_format: NoteFormat) -> String {
    format!(
        "Based on the following transcript from a video, generate study notes in {format} format \
         and a quiz. The quiz should include a mix of multiple-choice and short-answer questions.\n\
         Transcript: \"{transcript}\"\n\n{contract}",
        format = note_format.label(),
        contract = output_contract(note_format),
    )
}

/// Prompt for the fallback path: the model analyses the reference itself.
pub fn direct_analysis_prompt(content_reference: &str, note_format: NoteFormat) -> String {
    format!(
        "Directly analyze the video content at the provided URL and generate study materials. \
         Base your analysis on the video's visual and audio information only.\n\
         VIDEO URL: {content_reference}\n\n\
         1. Understand the video at the URL.\n\
         2. Generate detailed, well-structured study notes in {format} format covering the key topics and concepts.\n\
         3. Create a quiz with a mix of multiple-choice and short-answer questions that test understanding of the content.\n\n\
         {contract}",
        format = note_format.label(),
        contract = output_contract(note_format),
    )
}
