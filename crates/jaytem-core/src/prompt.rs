use crate::types::{ClientIntake, PromptSet, StepId, StepResults};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("cannot assemble {step}: prerequisite {missing} has not run")]
    MissingContext { step: StepId, missing: StepId },
}

/// Build the exact prompt sent to the model for `step`.
///
/// Composes the role persona, the step instruction and a context block.
/// Role-opening steps quote the full intake, the second step of each role
/// only the narrative; both quote the outputs listed by
/// [`StepId::prerequisites`]. Nothing else in `prior` is read.
pub fn build_prompt(
    step: StepId,
    intake: &ClientIntake,
    prior: &StepResults,
    prompts: &PromptSet,
) -> Result<String, PromptError> {
    let mut s = String::new();

    s.push_str(prompts.persona(step.role()));
    s.push_str("\n\n");
    s.push_str(prompts.instruction(step));
    s.push_str("\n\n");

    if step.opens_role() {
        s.push_str(&client_context(intake));
    } else {
        s.push_str("Client Story:\n");
        s.push_str(&intake.narrative);
    }

    for dep in step.prerequisites() {
        let text = prior.get(*dep).ok_or(PromptError::MissingContext {
            step,
            missing: *dep,
        })?;
        s.push_str("\n\n");
        s.push_str(dep.context_heading());
        s.push_str(":\n");
        s.push_str(text);
    }

    Ok(s)
}

/// Identity fields plus narrative, as quoted by role-opening steps.
pub fn client_context(intake: &ClientIntake) -> String {
    format!(
        "CLIENT NAME: {last}, {first}\n\
         EMAIL: {email}\n\
         PHONE: {phone}\n\
         PRIMARY LANGUAGE: {primary}\n\
         SECONDARY LANGUAGE: {secondary}\n\
         \n\
         CLIENT STORY:\n\
         {story}",
        last = intake.last_name,
        first = intake.first_name,
        email = intake.email,
        phone = intake.phone,
        primary = intake.primary_language,
        secondary = intake.secondary_language().unwrap_or("N/A"),
        story = intake.narrative,
    )
}
