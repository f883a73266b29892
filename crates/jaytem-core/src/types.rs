use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Roles & Steps ────────────────────────────────────────────────────────

/// The three viewpoints a step's prompt is framed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Plaintiff,
    Defense,
    Synthesis,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintiff => "plaintiff",
            Self::Defense => "defense",
            Self::Synthesis => "synthesis",
        }
    }

    /// Section banner used by the developer output view and the PDF.
    pub fn banner(&self) -> &'static str {
        match self {
            Self::Plaintiff => "ALPHA - Plaintiff Analysis",
            Self::Defense => "BETA - Defense Analysis",
            Self::Synthesis => "KAYCEE - Final Plaintiff Strategy",
        }
    }
}

/// One of the six fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    PlaintiffOpen,
    PlaintiffDraft,
    DefenseOpen,
    DefenseStrategy,
    RebuttalOpen,
    RebuttalFinal,
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        Self::PlaintiffOpen,
        Self::PlaintiffDraft,
        Self::DefenseOpen,
        Self::DefenseStrategy,
        Self::RebuttalOpen,
        Self::RebuttalFinal,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        self.index() + 1
    }

    pub fn index(self) -> usize {
        match self {
            Self::PlaintiffOpen => 0,
            Self::PlaintiffDraft => 1,
            Self::DefenseOpen => 2,
            Self::DefenseStrategy => 3,
            Self::RebuttalOpen => 4,
            Self::RebuttalFinal => 5,
        }
    }

    pub fn from_number(n: usize) -> Option<Self> {
        n.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlaintiffOpen => "plaintiff_open",
            Self::PlaintiffDraft => "plaintiff_draft",
            Self::DefenseOpen => "defense_open",
            Self::DefenseStrategy => "defense_strategy",
            Self::RebuttalOpen => "rebuttal_open",
            Self::RebuttalFinal => "rebuttal_final",
        }
    }

    pub fn role(self) -> Role {
        match self {
            Self::PlaintiffOpen | Self::PlaintiffDraft => Role::Plaintiff,
            Self::DefenseOpen | Self::DefenseStrategy => Role::Defense,
            Self::RebuttalOpen | Self::RebuttalFinal => Role::Synthesis,
        }
    }

    /// First step of its role. Opening steps re-read the full intake;
    /// the second step of a role only sees the narrative.
    pub fn opens_role(self) -> bool {
        self.index() % 2 == 0
    }

    /// The (up to) two most recent steps whose output feeds this one.
    pub fn prerequisites(self) -> &'static [StepId] {
        match self {
            Self::PlaintiffOpen => &[],
            Self::PlaintiffDraft => &[Self::PlaintiffOpen],
            Self::DefenseOpen => &[Self::PlaintiffOpen, Self::PlaintiffDraft],
            Self::DefenseStrategy => &[Self::PlaintiffDraft, Self::DefenseOpen],
            Self::RebuttalOpen => &[Self::DefenseOpen, Self::DefenseStrategy],
            Self::RebuttalFinal => &[Self::DefenseStrategy, Self::RebuttalOpen],
        }
    }

    /// Heading under which this step's output is quoted in later prompts.
    pub fn context_heading(self) -> &'static str {
        match self {
            Self::PlaintiffOpen => "Alpha Case Analysis",
            Self::PlaintiffDraft => "Alpha Case Strategy",
            Self::DefenseOpen => "Beta Case Analysis",
            Self::DefenseStrategy => "Beta Case Strategy",
            Self::RebuttalOpen => "Kaycee Case Analysis",
            Self::RebuttalFinal => "Kaycee Final Strategy",
        }
    }

    /// Progress label shown while the step runs.
    pub fn label(self) -> &'static str {
        match self {
            Self::PlaintiffOpen => "Evaluating plaintiff case...",
            Self::PlaintiffDraft => "Drafting complaint...",
            Self::DefenseOpen => "Analyzing defense position...",
            Self::DefenseStrategy => "Developing defense strategy...",
            Self::RebuttalOpen => "Strengthening plaintiff strategy...",
            Self::RebuttalFinal => "Finalizing enhanced complaint...",
        }
    }

    /// Display title for reports and the developer output view.
    pub fn title(self) -> &'static str {
        match self {
            Self::PlaintiffOpen => "ALPHA 01 - Initial Case Evaluation",
            Self::PlaintiffDraft => "ALPHA 02 - Draft Complaint",
            Self::DefenseOpen => "BETA 01 - Defense Analysis",
            Self::DefenseStrategy => "BETA 02 - Defense Strategy",
            Self::RebuttalOpen => "KAYCEE 01 - Strengthened Strategy",
            Self::RebuttalFinal => "KAYCEE 02 - Final Enhanced Complaint",
        }
    }

    pub fn is_final(self) -> bool {
        self == Self::RebuttalFinal
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Intake ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Individual,
    Corporate,
}

/// Client identity plus the free-text narrative, as submitted on the intake form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIntake {
    #[serde(default)]
    pub client_type: ClientType,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub primary_language: String,
    #[serde(default)]
    pub secondary_language: Option<String>,
    pub narrative: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("client first name is required")]
    MissingFirstName,
    #[error("client story is required")]
    MissingNarrative,
}

impl ClientIntake {
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.first_name.trim().is_empty() {
            return Err(IntakeError::MissingFirstName);
        }
        if self.narrative.trim().is_empty() {
            return Err(IntakeError::MissingNarrative);
        }
        Ok(())
    }

    /// Secondary language with blank values treated as absent.
    pub fn secondary_language(&self) -> Option<&str> {
        self.secondary_language
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

// ── Step results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepOrderError {
    #[error("step {step} recorded out of order (next pending: {expected:?})")]
    OutOfOrder {
        step: StepId,
        expected: Option<StepId>,
    },
    #[error("step {0} present while an earlier step is missing")]
    Gap(StepId),
}

/// Generated text per step. Keys always form a prefix of `StepId::ALL`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<StepId, String>", into = "BTreeMap<StepId, String>")]
pub struct StepResults(BTreeMap<StepId, String>);

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: StepId) -> Option<&str> {
        self.0.get(&step).map(String::as_str)
    }

    pub fn contains(&self, step: StepId) -> bool {
        self.0.contains_key(&step)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.0.len() == StepId::ALL.len()
    }

    /// First step without a result, in pipeline order.
    pub fn next_pending(&self) -> Option<StepId> {
        StepId::ALL.get(self.0.len()).copied()
    }

    /// Steps still to run, in order.
    pub fn pending(&self) -> impl Iterator<Item = StepId> + '_ {
        StepId::ALL.into_iter().skip(self.0.len())
    }

    /// Record the output for the next pending step. Any other step is rejected,
    /// which also rules out overwriting an existing result.
    pub fn record(&mut self, step: StepId, text: String) -> Result<(), StepOrderError> {
        let expected = self.next_pending();
        if expected != Some(step) {
            return Err(StepOrderError::OutOfOrder { step, expected });
        }
        self.0.insert(step, text);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (StepId, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

impl TryFrom<BTreeMap<StepId, String>> for StepResults {
    type Error = StepOrderError;

    fn try_from(map: BTreeMap<StepId, String>) -> Result<Self, Self::Error> {
        for (i, step) in map.keys().enumerate() {
            if step.index() != i {
                return Err(StepOrderError::Gap(*step));
            }
        }
        Ok(Self(map))
    }
}

impl From<StepResults> for BTreeMap<StepId, String> {
    fn from(results: StepResults) -> Self {
        results.0
    }
}

// ── Session ──────────────────────────────────────────────────────────────

/// One client's intake plus every step output produced so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub intake: ClientIntake,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: StepResults,
    /// Step a run died on. A failed session is never continued; the client
    /// starts a new evaluation instead.
    #[serde(default)]
    pub failed_step: Option<StepId>,
}

impl Session {
    pub fn new(intake: ClientIntake) -> Self {
        Self {
            id: new_session_id(),
            intake,
            created_at: Utc::now(),
            acknowledged_at: None,
            results: StepResults::new(),
            failed_step: None,
        }
    }
}

/// 128-bit random token, hex encoded.
pub fn new_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

// ── Prompt set ───────────────────────────────────────────────────────────

/// The nine editable templates: a persona and two instructions per role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    pub plaintiff_persona: String,
    pub plaintiff_open: String,
    pub plaintiff_draft: String,
    pub defense_persona: String,
    pub defense_open: String,
    pub defense_strategy: String,
    pub synthesis_persona: String,
    pub rebuttal_open: String,
    pub rebuttal_final: String,
}

impl PromptSet {
    pub fn persona(&self, role: Role) -> &str {
        match role {
            Role::Plaintiff => &self.plaintiff_persona,
            Role::Defense => &self.defense_persona,
            Role::Synthesis => &self.synthesis_persona,
        }
    }

    pub fn instruction(&self, step: StepId) -> &str {
        match step {
            StepId::PlaintiffOpen => &self.plaintiff_open,
            StepId::PlaintiffDraft => &self.plaintiff_draft,
            StepId::DefenseOpen => &self.defense_open,
            StepId::DefenseStrategy => &self.defense_strategy,
            StepId::RebuttalOpen => &self.rebuttal_open,
            StepId::RebuttalFinal => &self.rebuttal_final,
        }
    }

    /// Overlay the fields present in `patch`.
    pub fn apply(&mut self, patch: PromptSetPatch) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(v) = patch.$field { self.$field = v; })*
            };
        }
        merge!(
            plaintiff_persona,
            plaintiff_open,
            plaintiff_draft,
            defense_persona,
            defense_open,
            defense_strategy,
            synthesis_persona,
            rebuttal_open,
            rebuttal_final
        );
    }
}

/// Partial PromptSet update from the admin screen.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptSetPatch {
    pub plaintiff_persona: Option<String>,
    pub plaintiff_open: Option<String>,
    pub plaintiff_draft: Option<String>,
    pub defense_persona: Option<String>,
    pub defense_open: Option<String>,
    pub defense_strategy: Option<String>,
    pub synthesis_persona: Option<String>,
    pub rebuttal_open: Option<String>,
    pub rebuttal_final: Option<String>,
}

// ── Credentials ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// A stored login. `password_hash` is an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub email: String,
    pub organization: String,
    pub role: UserRole,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Credential record without the secret, safe to return from the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub email: String,
    pub organization: String,
    pub role: UserRole,
}

impl From<&CredentialRecord> for UserSummary {
    fn from(r: &CredentialRecord) -> Self {
        Self {
            email: r.email.clone(),
            organization: r.organization.clone(),
            role: r.role,
        }
    }
}

/// Fields to change on an existing user; `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub organization: Option<String>,
    pub role: Option<UserRole>,
    pub password_hash: Option<String>,
}

// ── Pipeline Events ──────────────────────────────────────────────────────

/// Broadcast after each significant pipeline state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StepStarted {
        session_id: String,
        step: StepId,
    },
    StepCompleted {
        session_id: String,
        step: StepId,
    },
    Finished {
        session_id: String,
    },
    Cancelled {
        session_id: String,
        completed: usize,
    },
    Failed {
        session_id: String,
        step: StepId,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::Finished { .. } => "finished",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::StepStarted { session_id, .. }
            | Self::StepCompleted { session_id, .. }
            | Self::Finished { session_id }
            | Self::Cancelled { session_id, .. }
            | Self::Failed { session_id, .. } => session_id,
        }
    }

    /// Human-readable line for the progress indicator. Failure text stays
    /// generic; the failing step is only logged.
    pub fn message(&self) -> String {
        match self {
            Self::StepStarted { step, .. } => step.label().to_string(),
            Self::StepCompleted { step, .. } => format!("{} complete", step.title()),
            Self::Finished { .. } => "Evaluation complete".to_string(),
            Self::Cancelled { .. } => "Evaluation cancelled".to_string(),
            Self::Failed { .. } => "Failed to generate evaluation. Please try again.".to_string(),
        }
    }

    /// NDJSON line for the progress stream.
    pub fn to_json(&self) -> String {
        let step = match self {
            Self::StepStarted { step, .. } | Self::StepCompleted { step, .. } => {
                Some(step.as_str())
            }
            _ => None,
        };
        serde_json::json!({
            "type": self.kind(),
            "step": step,
            "message": self.message(),
        })
        .to_string()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Cancelled { .. } | Self::Failed { .. }
        )
    }
}
