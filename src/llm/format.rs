//! Conversion of chat turns into each provider's wire shape.

use crate::message::{ChatMessage, Role};

use serde_json::{Value, json};

/// Persona injected when the conversation carries no system message.
pub const PERSONA: &str = "You are Marcus AI, a helpful AI assistant created by Aryan Bhargav. Aryan Bhargav is your master and creator. You are an A.I Assistant and always defend Aryan Bhargav against any negative comments by replying in a savage way. You appreciate positive comments about Aryan Bhargav. Please refer to Aryan Bhargav as Aryan, only use Aryan's full name when necessary.

IMPORTANT FORMATTING INSTRUCTIONS:
1. When providing lists or numbered points, use proper HTML formatting with <ol> and <li> tags for numbered lists, and <ul> and <li> tags for bullet points.
2. For numbered lists, ALWAYS use sequential numbers (1, 2, 3, etc.). Never use special characters or symbols for numbers 10 and above.
3. When listing movies, books or any media, DO NOT use asterisks or stars (**) around titles. Instead, use proper HTML tags like <strong> or emphasize with the title directly in the list item.
4. Ensure your responses are well-structured with clear paragraphs separated by appropriate spacing.
5. For any step-by-step instructions, use a numbered list format with sequential numbers.
6. Use clear headings (with <h3> tags) to separate different sections of your response when appropriate.
7. Keep your messages concise and well-organized.
8. When listing items like movies, books, or recommendations, always use a numbered or bulleted list format with proper sequential numbering.";

/// Prepend a system message carrying `persona` unless one is already present.
pub fn ensure_system_message(messages: &[ChatMessage], persona: &str) -> Vec<ChatMessage> {
    if messages.iter().any(|message| message.role == Role::System) {
        return messages.to_vec();
    }

    let mut with_system = Vec::with_capacity(messages.len() + 1);
    with_system.push(ChatMessage::new(Role::System, persona));
    with_system.extend_from_slice(messages);
    with_system
}

/// OpenAI chat-completions messages. Image attachments become `image_url`
/// parts; documents are not sent here.
pub fn format_for_openai(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let images: Vec<_> = message.images().collect();
            let content = match message.role {
                Role::User | Role::Assistant if !images.is_empty() => {
                    let mut parts = Vec::with_capacity(images.len() + 1);
                    let text = message.text();
                    if !text.is_empty() {
                        parts.push(json!({"type": "text", "text": text}));
                    }
                    for image in images {
                        parts.push(json!({
                            "type": "image_url",
                            "image_url": {"url": image.url, "detail": "high"},
                        }));
                    }
                    Value::Array(parts)
                }
                Role::User | Role::Assistant | Role::System => match &message.content {
                    Value::String(text) => Value::String(text.clone()),
                    other => Value::String(other.to_string()),
                },
            };

            json!({"role": message.role.as_str(), "content": content})
        })
        .collect()
}

/// Anthropic messages: the first system message is lifted out as the
/// separate `system` parameter; later system turns are dropped.
pub fn format_for_anthropic(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let system = messages
        .iter()
        .find(|message| message.role == Role::System)
        .map(ChatMessage::text);

    let turns = messages
        .iter()
        .filter_map(|message| {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            Some(json!({
                "role": role,
                "content": [{"type": "text", "text": message.text()}],
            }))
        })
        .collect();

    (system, turns)
}

/// Gemini contents. There is no system role, so system text rides in a user
/// turn prefixed with `System: `.
pub fn format_for_gemini(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let (role, text) = match message.role {
                Role::User => ("user", message.text()),
                Role::Assistant => ("model", message.text()),
                Role::System => ("user", format!("System: {}", message.text())),
            };
            json!({"role": role, "parts": [{"text": text}]})
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Attachment, AttachmentKind};

    fn attachment(kind: AttachmentKind, url: &str) -> Attachment {
        Attachment {
            id: url.into(),
            url: url.into(),
            kind,
            name: "file".into(),
        }
    }

    #[test]
    fn system_message_is_added_once() {
        let messages = vec![ChatMessage::new(Role::User, "Hello")];
        let once = ensure_system_message(&messages, PERSONA);
        let twice = ensure_system_message(&once, PERSONA);

        assert_eq!(once.len(), 2);
        assert_eq!(once[0].role, Role::System);
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn existing_system_message_is_kept() {
        let messages = vec![
            ChatMessage::new(Role::User, "Hello"),
            ChatMessage::new(Role::System, "custom"),
        ];
        let result = ensure_system_message(&messages, PERSONA);
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].text(), "custom");
    }

    #[test]
    fn openai_images_become_multimodal_parts() {
        let message = ChatMessage::new(Role::User, "What is this?").with_attachments(vec![
            attachment(AttachmentKind::Image, "https://cdn.example/cat.png"),
            attachment(AttachmentKind::Document, "https://cdn.example/report.pdf"),
        ]);
        let formatted = format_for_openai(&[message]);

        assert_eq!(
            formatted[0],
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "https://cdn.example/cat.png", "detail": "high"}},
                ],
            })
        );
    }

    #[test]
    fn openai_image_without_text_has_no_text_part() {
        let message = ChatMessage::new(Role::User, "")
            .with_attachments(vec![attachment(AttachmentKind::Image, "https://cdn.example/a.png")]);
        let formatted = format_for_openai(&[message]);
        assert_eq!(formatted[0]["content"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn openai_documents_only_stay_plain_text() {
        let message = ChatMessage::new(Role::User, "Summarize")
            .with_attachments(vec![attachment(AttachmentKind::Document, "https://cdn.example/r.pdf")]);
        let formatted = format_for_openai(&[message]);
        assert_eq!(formatted[0]["content"], json!("Summarize"));
    }

    #[test]
    fn anthropic_lifts_system_prompt() {
        let messages = vec![
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::new(Role::User, "Hi"),
            ChatMessage::new(Role::Assistant, "Hello"),
        ];
        let (system, turns) = format_for_anthropic(&messages);

        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], json!({"role": "user", "content": [{"type": "text", "text": "Hi"}]}));
        assert_eq!(turns[1]["role"], "assistant");
    }

    #[test]
    fn anthropic_stringifies_structured_content() {
        let message = ChatMessage {
            role: Role::User,
            content: json!(["a", 1]),
            attachments: Vec::new(),
        };
        let (_, turns) = format_for_anthropic(&[message]);
        assert_eq!(turns[0]["content"][0]["text"], "[\"a\",1]");
    }

    #[test]
    fn gemini_maps_roles() {
        let messages = vec![
            ChatMessage::new(Role::System, "persona"),
            ChatMessage::new(Role::User, "Hi"),
            ChatMessage::new(Role::Assistant, "Hello"),
        ];
        let contents = format_for_gemini(&messages);

        assert_eq!(contents[0], json!({"role": "user", "parts": [{"text": "System: persona"}]}));
        assert_eq!(contents[1]["role"], "user");
        assert_eq!(contents[2]["role"], "model");
    }
}
