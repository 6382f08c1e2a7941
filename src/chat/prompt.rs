use crate::chat::types::ResponseSchema;

/// Persona instruction shared by every request. The output-contract half of
/// the prompt is generated from the active [`ResponseSchema`] so the label
/// sets stay configuration-driven.
const PERSONA: &str = "You are a warm, empathetic counseling assistant. \
You listen carefully, validate the user's feelings without judgment, and \
offer gentle, practical guidance informed by cognitive behavioral therapy. \
You never diagnose, never prescribe medication, and encourage the user to \
seek professional help for serious concerns.";

/// Builds the system instruction: persona plus a strict JSON output
/// contract naming the schema's closed label sets.
pub fn build_system_prompt(schema: &ResponseSchema) -> String {
    let emotions = schema.emotions.join(", ");
    let techniques = schema.techniques.join(", ");

    format!(
        "{persona}\n\n\
         Respond with a single JSON object and nothing else, using exactly \
         these keys:\n\
         {{\"message\": \"<your reply to the user>\", \
         \"emotion\": \"<the user's emotional tone>\", \
         \"cbtTechnique\": \"<technique name or null>\"}}\n\n\
         \"emotion\" must be one of: {emotions}.\n\
         \"cbtTechnique\" must be one of: {techniques}; use null when none \
         applies.\n\
         Do not wrap the JSON in markdown fences or add commentary.",
        persona = PERSONA,
        emotions = emotions,
        techniques = techniques,
    )
}
