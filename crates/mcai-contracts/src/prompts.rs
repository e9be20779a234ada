use crate::request::GenerationRequest;
use crate::targets::Target;

pub const FEEDBACK_MARKER: &str = "FEEDBACK:";
pub const CURRENT_CODE_START: &str = "<<<CURRENT_CODE>>>";
pub const CURRENT_CODE_END: &str = "<<<END_CURRENT_CODE>>>";

pub const EMPTY_CODE_CORRECTION: &str =
    "Your last message returned no code. Return ONLY Blocks-decompilable MakeCode Static TypeScript. No prose.";

const FORBIDDEN_CONSTRUCTS: &str = "arrow functions (=>), classes, new constructors, async/await/Promise, import/export, template strings (`), higher-order array methods (map/filter/reduce/forEach/find/some/every), namespaces/modules, enums, interfaces, type aliases, generics, timers (setTimeout/setInterval), console calls, markdown, escaped newlines, onstart functions, and any other javascript code that cannot be converted into blocks";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system_text: String,
    pub user_text: String,
}

pub fn build_system(target: Target, corrective_note: Option<&str>) -> String {
    let name = target.display_name();
    let mut lines = vec![
        "ROLE: You are a Microsoft MakeCode assistant.".to_string(),
        format!(
            "HARD REQUIREMENT: Return ONLY Microsoft MakeCode Static JavaScript that the MakeCode decompiler can convert to BLOCKS for {name} with ZERO errors."
        ),
        format!(
            "OPTIONAL FEEDBACK: You may send brief notes before the code. Prefix each note with \"{FEEDBACK_MARKER} \"."
        ),
        "RESPONSE FORMAT: After any feedback lines, output ONLY Microsoft MakeCode Static TypeScript with no markdown fences or extra prose.".to_string(),
        "NO COMMENTS inside the code.".to_string(),
        format!(
            "ALLOWED APIS: {}. Prefer event handlers and forever/update loops.",
            target.allowed_namespaces().join(",")
        ),
        format!("FORBIDDEN IN OUTPUT: {FORBIDDEN_CONSTRUCTS}"),
        format!(
            "TARGET-SCOPE: Use ONLY APIs valid for {name}. Never mix Arcade APIs into micro:bit/Maker or vice versa."
        ),
        "STYLE: Straight quotes, ASCII only, real newlines, use function () { } handlers.".to_string(),
        "VAGUE REQUESTS: Choose sensible defaults and still produce a small interactive program.".to_string(),
        format!(
            "SELF-CHECK BEFORE SENDING: Ensure every forbidden construct is removed; ensure only allowed APIs for {name} are used; ensure it decompiles to BLOCKS."
        ),
        format!(
            "IF UNSURE: Return a minimal program that is guaranteed to decompile to BLOCKS for {name}. Code only."
        ),
    ];
    if let Some(note) = corrective_note.filter(|note| !note.is_empty()) {
        lines.push(note.to_string());
    }
    lines.join("\n")
}

pub fn build_user(request_text: &str, current_code: Option<&str>) -> String {
    let header = format!("USER_REQUEST:\n{}", request_text.trim());
    match current_code.filter(|code| !code.trim().is_empty()) {
        Some(code) => format!("{header}\n\n{CURRENT_CODE_START}\n{code}\n{CURRENT_CODE_END}"),
        None => header,
    }
}

pub fn build_pair(request: &GenerationRequest, corrective_note: Option<&str>) -> PromptPair {
    PromptPair {
        system_text: build_system(request.target, corrective_note),
        user_text: build_user(&request.request_text, request.current_code.as_deref()),
    }
}

pub fn violation_correction(violations: &[String]) -> String {
    format!(
        "Previous code used: {}. Remove ALL forbidden constructs. Use only valid APIs for the target.",
        violations.join(", ")
    )
}
