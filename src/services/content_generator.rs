use crate::services::analysis_provider::{strip_code_fences, AnalysisError, AnalysisService};
use crate::services::concept_graph::Concept;
use crate::services::path_builder::ContentType;

/// Generates lesson content for a path node. Purely downstream of path
/// construction: a failure here surfaces only on the content route and never
/// touches path state.
pub async fn generate_content(
    analysis: &AnalysisService,
    concept: &Concept,
    content_type: ContentType,
) -> Result<String, AnalysisError> {
    let prompt = content_prompt(concept, content_type);
    let raw = analysis
        .complete("You are an expert tutor producing lesson content.", &prompt)
        .await?;
    let content = strip_code_fences(&raw).to_string();

    // Interactive lessons must be machine-readable; anything else is re-wrapped
    // into a minimal valid structure instead of being rejected.
    if content_type == ContentType::Interactive
        && serde_json::from_str::<serde_json::Value>(&content).is_err()
    {
        return Ok(serde_json::json!({
            "type": "interactive",
            "steps": [{ "content": content }]
        })
        .to_string());
    }

    Ok(content)
}

fn content_prompt(concept: &Concept, content_type: ContentType) -> String {
    let name = &concept.name;
    let description = &concept.description;
    let difficulty = concept.difficulty_level.as_str();

    match content_type {
        ContentType::Video | ContentType::Audio => format!(
            r#"Create a narrated script for teaching the concept '{name}'.
Concept description: {description}
Difficulty level: {difficulty}

The script should include an introduction, a main explanation with examples,
descriptions of key visuals, and a summary.

Format the response as a JSON object:
{{
    "sections": [
        {{
            "title": "section title",
            "content": "section content",
            "duration": "duration in seconds",
            "visual_description": "description of visuals to show"
        }}
    ]
}}"#
        ),
        ContentType::Text => format!(
            r#"Create comprehensive text content for teaching the concept '{name}'.
Concept description: {description}
Difficulty level: {difficulty}

Include an introduction, a detailed explanation, examples and applications,
practice questions, and a summary. Format the response in Markdown with
proper headings, lists, and emphasis."#
        ),
        ContentType::Interactive => format!(
            r#"Create an interactive learning experience for the concept '{name}'.
Concept description: {description}
Difficulty level: {difficulty}

Include interactive elements, step-by-step guidance, and immediate feedback.

Format the response as a JSON object:
{{
    "type": "interactive",
    "steps": [
        {{
            "title": "step title",
            "content": "step content",
            "interaction_type": "type of interaction",
            "feedback": "feedback message"
        }}
    ],
    "progress_tracking": {{
        "total_steps": 0,
        "completion_criteria": "criteria for completion"
    }}
}}"#
        ),
    }
}
