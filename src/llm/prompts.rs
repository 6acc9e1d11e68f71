//! Prompt template for sidekick requests

/// Template sent as the single user message of each request. Placeholders:
/// `{languages}`, `{context}`, `{chat_history}`, `{task}`.
pub const SIDEKICK_TEMPLATE: &str = "\
You are an expert software engineer, versed in many programming languages,
especially {languages}. You are working on a project with the human, who is
asking for your help with a task. Your responses are written in Markdown and
code is placed in fenced blocks with the language name.

The human has shared the following context from their repository:

{context}

Conversation so far:
{chat_history}

Task from the human:
{task}
";

/// Fill the template in a single pass, so substituted text is never
/// re-expanded. Unknown placeholders are left untouched.
pub fn render_sidekick_prompt(languages: &str, context: &str, chat_history: &str, task: &str) -> String {
    let mut out = String::with_capacity(SIDEKICK_TEMPLATE.len() + context.len() + task.len());
    let mut rest = SIDEKICK_TEMPLATE;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        match &tail[1..end] {
            "languages" => out.push_str(languages),
            "context" => out.push_str(context),
            "chat_history" => out.push_str(chat_history),
            "task" => out.push_str(task),
            _ => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}
