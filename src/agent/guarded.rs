// ABOUTME: Guarded runner that wraps an agent with input and output guardrails.
// ABOUTME: Input checks run before the agent is called; output checks run on its final text.

use crate::guardrail::{Guardrail, GuardrailConfig, GuardrailDecision, GuardrailError};
use crate::provider::{ProviderError, ProviderSet};

use super::basic::Agent;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("input guardrail '{guardrail}' tripped: {}", .decision.reason)]
    InputTripwire {
        guardrail: String,
        decision: GuardrailDecision,
    },

    #[error("output guardrail '{guardrail}' tripped: {}", .decision.reason)]
    OutputTripwire {
        guardrail: String,
        decision: GuardrailDecision,
        /// The agent output that was rejected.
        output: String,
    },

    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    #[error("agent request failed: {0}")]
    Agent(#[from] ProviderError),
}

impl RunError {
    /// True for either tripwire, as opposed to an operational failure.
    pub fn is_tripwire(&self) -> bool {
        matches!(
            self,
            RunError::InputTripwire { .. } | RunError::OutputTripwire { .. }
        )
    }
}

/// An agent with guardrails applied around each run.
#[derive(Debug, Clone)]
pub struct GuardedAgent {
    pub agent: Agent,
    pub input_guardrails: Vec<Guardrail>,
    pub output_guardrails: Vec<Guardrail>,
}

impl GuardedAgent {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
        }
    }

    /// Guardrails without a model of their own run on the agent's model.
    pub fn with_input_guardrail(mut self, config: GuardrailConfig) -> Self {
        self.input_guardrails
            .push(Guardrail::new(config, &self.agent.model));
        self
    }

    pub fn with_output_guardrail(mut self, config: GuardrailConfig) -> Self {
        self.output_guardrails
            .push(Guardrail::new(config, &self.agent.model));
        self
    }

    /// Run the agent on `input`.
    ///
    /// Every input guardrail is checked first and the agent is only called if
    /// none trips. The agent's reply is then checked by every output
    /// guardrail. Guardrails run in declaration order and stop at the first trip.
    pub async fn run(&self, providers: &ProviderSet, input: &str) -> Result<String, RunError> {
        self.check_input(providers, input).await?;

        let agent_provider = providers.default_provider();
        let output = self.agent.ask(agent_provider.as_ref(), input).await?;

        self.check_output(providers, &output).await?;
        Ok(output)
    }

    /// Run only the input guardrails.
    pub async fn check_input(&self, providers: &ProviderSet, input: &str) -> Result<(), RunError> {
        for guardrail in &self.input_guardrails {
            let decision = check_one(guardrail, providers, input).await?;
            if decision.tripwire_triggered {
                tracing::warn!(guardrail = guardrail.name(), reason = %decision.reason, "input tripwire");
                return Err(RunError::InputTripwire {
                    guardrail: guardrail.name().to_string(),
                    decision,
                });
            }
        }
        Ok(())
    }

    /// Run only the output guardrails over a finished reply.
    pub async fn check_output(&self, providers: &ProviderSet, output: &str) -> Result<(), RunError> {
        for guardrail in &self.output_guardrails {
            let decision = check_one(guardrail, providers, output).await?;
            if decision.tripwire_triggered {
                tracing::warn!(guardrail = guardrail.name(), reason = %decision.reason, "output tripwire");
                return Err(RunError::OutputTripwire {
                    guardrail: guardrail.name().to_string(),
                    decision,
                    output: output.to_string(),
                });
            }
        }
        Ok(())
    }
}

async fn check_one(
    guardrail: &Guardrail,
    providers: &ProviderSet,
    text: &str,
) -> Result<GuardrailDecision, GuardrailError> {
    let provider = providers.resolve(guardrail.provider_name())?;
    guardrail.check(provider.as_ref(), text).await
}
