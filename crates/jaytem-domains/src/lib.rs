pub mod legal;

use jaytem_core::types::PromptSet;

/// Built-in PromptSet used when none is stored and on reset.
pub fn default_prompts() -> PromptSet {
    legal::legal_prompt_set()
}
