pub mod prompts;

use jaytem_core::types::PromptSet;

use prompts::*;

/// Plaintiff / defense / synthesis templates for the civil-litigation intake
/// evaluation.
pub fn legal_prompt_set() -> PromptSet {
    PromptSet {
        plaintiff_persona: PLAINTIFF_PERSONA.into(),
        plaintiff_open: PLAINTIFF_OPEN.into(),
        plaintiff_draft: PLAINTIFF_DRAFT.into(),
        defense_persona: DEFENSE_PERSONA.into(),
        defense_open: DEFENSE_OPEN.into(),
        defense_strategy: DEFENSE_STRATEGY.into(),
        synthesis_persona: SYNTHESIS_PERSONA.into(),
        rebuttal_open: REBUTTAL_OPEN.into(),
        rebuttal_final: REBUTTAL_FINAL.into(),
    }
}
