//! Rendering and token costs for history turns.
//!
//! Each turn costs its rendered text plus ~4 tokens of overhead for the
//! role header and delimiters.

use continuum_core::thread::Turn;
use continuum_core::token::estimate_tokens;

pub const TURN_OVERHEAD: usize = 4;

/// Render one turn as it appears in the history block.
pub fn render_turn(number: usize, turn: &Turn) -> String {
    let mut header = format!("--- Turn {number} ({}", turn.role);
    if let (Some(provider), Some(model)) = (&turn.provider, &turn.model) {
        header.push_str(&format!(" via {provider}/{model}"));
    }
    header.push_str(&format!(", {}) ---", turn.mode));

    let mut text = format!("{header}\n{}", turn.content);
    let files: Vec<&str> = turn
        .file_refs
        .iter()
        .map(|r| r.fingerprint.path.as_str())
        .collect();
    if !files.is_empty() {
        text.push_str(&format!("\nFiles: {}", files.join(", ")));
    }
    text
}

/// Heuristic cost of a rendered turn.
pub fn estimate_turn_tokens(rendered: &str) -> usize {
    TURN_OVERHEAD + estimate_tokens(rendered)
}

/// Render the kept suffix of a thread's turns.
///
/// `turns` must be the kept suffix; `first_number` is the 1-based number
/// of its first turn in the full thread.
pub fn render_history(thread_id: &str, first_number: usize, turns: &[Turn]) -> String {
    if turns.is_empty() {
        return String::new();
    }
    let mut sections = vec![format!("=== CONVERSATION HISTORY ({thread_id}) ===")];
    sections.extend(
        turns
            .iter()
            .enumerate()
            .map(|(i, turn)| render_turn(first_number + i, turn)),
    );
    sections.push("=== END HISTORY ===".to_string());
    sections.join("\n\n")
}
