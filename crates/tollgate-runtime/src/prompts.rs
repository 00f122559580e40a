//! Prompt text the router sends on its own behalf.
//!
//! Three kinds:
//! 1. The attempt prompt rendered from a task (context, then input)
//! 2. The corrective block appended when the gate asks for a rephrase
//! 3. The yes/no claim verification prompt used for grounding

use tollgate_core::Task;

/// System prompt for grounding verification calls.
pub const VERIFIER_SYSTEM_PROMPT: &str = r#"
You check whether a single claim is supported by reference material.

Answer with exactly one word:
- YES if the reference material states or directly implies the claim
- NO otherwise, including when the material is silent

Do not explain. Do not use outside knowledge.
"#;

/// Heading of the corrective instruction block.
pub const CORRECTION_HEADER: &str = "## Revision required";

/// Output budget for a verification answer.
pub const VERIFIER_MAX_TOKENS: u32 = 4;

/// The prompt for one attempt of a task.
///
/// Context history is numbered so outputs can cite it.
pub fn render_prompt(task: &Task) -> String {
    if task.context_history.is_empty() {
        return task.input.clone();
    }

    let mut prompt = String::from("## Context\n");
    for (i, item) in task.context_history.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, item.trim()));
    }
    prompt.push_str("\n## Task\n");
    prompt.push_str(&task.input);
    prompt
}

/// Corrective block built from gate findings.
pub fn correction_block(issues: &[String], suggestions: &[String]) -> String {
    let mut block = format!(
        "\n\n{}\nThe previous answer fell short. Address the following:\n",
        CORRECTION_HEADER
    );
    for issue in issues {
        block.push_str(&format!("- Problem: {}\n", issue));
    }
    for suggestion in suggestions {
        block.push_str(&format!("- Fix: {}\n", suggestion));
    }
    if issues.is_empty() && suggestions.is_empty() {
        block.push_str("- Be more precise, complete, and directly responsive.\n");
    }
    block
}

/// Prompt asking whether `claim` is supported by `context`.
pub fn verification_prompt(claim: &str, context: &[String]) -> String {
    let mut prompt = String::from("Reference material:\n");
    for (i, item) in context.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, item.trim()));
    }
    prompt.push_str(&format!("\nClaim: {}\n\nIs the claim supported? Answer YES or NO.", claim));
    prompt
}

/// Read a verifier answer. `None` when it is neither yes nor no.
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    let first = answer
        .trim()
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())?
        .to_ascii_lowercase();
    match first.as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::TaskKind;

    #[test]
    fn test_render_without_context_is_input() {
        let task = Task::new("t", TaskKind::Generation, "Write a tagline");
        assert_eq!(render_prompt(&task), "Write a tagline");
    }

    #[test]
    fn test_render_numbers_context() {
        let task = Task::new("t", TaskKind::Compression, "Summarize")
            .with_context(vec!["Revenue was 5 million.".into(), " Costs fell. ".into()]);
        let prompt = render_prompt(&task);
        assert!(prompt.contains("[1] Revenue was 5 million."));
        assert!(prompt.contains("[2] Costs fell.\n"));
        assert!(prompt.ends_with("## Task\nSummarize"));
    }

    #[test]
    fn test_correction_block_lists_findings() {
        let block = correction_block(&["Output drifts off topic".into()], &["Mention: budget".into()]);
        assert!(block.contains(CORRECTION_HEADER));
        assert!(block.contains("- Problem: Output drifts off topic"));
        assert!(block.contains("- Fix: Mention: budget"));
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("YES"), Some(true));
        assert_eq!(parse_yes_no("  no."), Some(false));
        assert_eq!(parse_yes_no("Yes, the context says so"), Some(true));
        assert_eq!(parse_yes_no("maybe"), None);
        assert_eq!(parse_yes_no(""), None);
    }
}
