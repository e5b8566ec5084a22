// ABOUTME: App orchestrator that wires config, providers, agents, and guardrails into CLI commands.
// ABOUTME: Streams replies to the output writer while racing them against a deadline and Ctrl-C.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentError, Conversation, GuardedAgent, RunError, TracingHooks};
use crate::config::Config;
use crate::provider::{
    LlmProvider, ProviderErrorKind, ProviderSet, create_client, create_named_client,
    weather_function,
};
use crate::session::SessionLogger;
use crate::stream::{AggregationOutcome, AggregationState};

pub const STORY_PROMPT: &str =
    "Write a short story about a robot learning to paint. Make it about 3 paragraphs.";
pub const WEATHER_PROMPT: &str = "What's the weather like in New York? Please use Celsius.";
pub const LANGUAGES_PROMPT: &str = "List the top 5 programming languages and explain why they're popular. Format as a numbered list.";
pub const JOKE_PROMPT: &str = "Tell me a short joke about programming.";
pub const INVALID_MODEL: &str = "invalid-model-name";

const ASSISTANT_INSTRUCTIONS: &str =
    "You are a helpful assistant. Respond in a conversational manner.";
const SUPPORT_INSTRUCTIONS: &str =
    "You are a useful agent that responds in a kind and respectful manner.";
const REALTIME_MAX_TOKENS: u32 = 400;
const RULE: &str = "==================================================";
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

/// Commands the binary can run.
#[derive(Debug, Clone, PartialEq, Eq, clap::Subcommand)]
pub enum Command {
    /// Stream a reply and print it as it arrives
    Stream { prompt: Option<String> },
    /// Stream with a get_weather function declared and show the calls it makes
    Functions { prompt: Option<String> },
    /// Stream while tracking word, sentence, and character counts
    Stats { prompt: Option<String> },
    /// Request an invalid model and classify the failure
    Errors,
    /// Interactive streaming chat; type quit to leave
    Chat,
    /// Ask once without streaming
    Ask { prompt: Option<String> },
    /// Run the support agent behind the configured guardrails
    Guard { input: String },
    /// Run the four streaming demos in order
    Demo,
}

/// Top-level application that owns the providers and the output stream.
pub struct App<W: Write = io::Stdout> {
    config: Config,
    providers: ProviderSet,
    out: W,
    catch_ctrl_c: bool,
}

impl App<io::Stdout> {
    /// Build the app from config: load API keys, then create the default
    /// provider and any provider a guardrail names.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_path(Config::secrets_env_path());

        let default = create_client(&config.llm)?;
        let mut providers = ProviderSet::new(default);

        let extra: BTreeSet<&str> = config
            .guardrails
            .input
            .iter()
            .chain(&config.guardrails.output)
            .filter_map(|g| g.provider.as_deref())
            .filter(|name| *name != config.llm.provider)
            .collect();
        for name in extra {
            match create_named_client(name, &config.llm) {
                Ok(client) => providers = providers.with(name, client),
                // Guardrails on this provider fail when they run.
                Err(e) => tracing::warn!(provider = name, error = %e, "guardrail provider unavailable"),
            }
        }

        Ok(Self::with_providers(config, providers, io::stdout()).catching_ctrl_c())
    }
}

impl<W: Write> App<W> {
    /// Build the app around explicit providers and output.
    pub fn with_providers(config: Config, providers: ProviderSet, out: W) -> Self {
        Self {
            config,
            providers,
            out,
            catch_ctrl_c: false,
        }
    }

    /// Cancel the running stream on Ctrl-C instead of exiting.
    pub fn catching_ctrl_c(mut self) -> Self {
        self.catch_ctrl_c = true;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run one command. Chat reads lines from stdin.
    pub async fn run(&mut self, command: Command) -> anyhow::Result<()> {
        tracing::info!(
            command = ?command,
            provider = self.providers.default_provider().name(),
            model = %self.config.llm.model,
            "running command"
        );
        match command {
            Command::Stream { prompt } => self.basic_stream(prompt.as_deref().unwrap_or(STORY_PROMPT)).await,
            Command::Functions { prompt } => {
                self.function_calls(prompt.as_deref().unwrap_or(WEATHER_PROMPT)).await
            }
            Command::Stats { prompt } => {
                self.realtime_stats(prompt.as_deref().unwrap_or(LANGUAGES_PROMPT)).await
            }
            Command::Errors => self.error_handling().await,
            Command::Chat => {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                self.chat(stdin).await
            }
            Command::Ask { prompt } => self.ask(prompt.as_deref().unwrap_or(JOKE_PROMPT)).await,
            Command::Guard { input } => self.guard(&input).await,
            Command::Demo => self.demo().await,
        }
    }

    /// Run every streaming demo in order. A failing demo is reported and the
    /// next one still runs.
    pub async fn demo(&mut self) -> anyhow::Result<()> {
        writeln!(self.out, "Streaming demo")?;
        writeln!(self.out, "{}", RULE)?;

        for index in 1..=4 {
            writeln!(self.out, "\nDemo {}/4", index)?;
            let result = match index {
                1 => self.basic_stream(STORY_PROMPT).await,
                2 => self.function_calls(WEATHER_PROMPT).await,
                3 => self.realtime_stats(LANGUAGES_PROMPT).await,
                _ => self.error_handling().await,
            };
            if let Err(e) = result {
                writeln!(self.out, "Error: {:#}", e)?;
            }
            writeln!(self.out, "\n{}\n", RULE)?;
        }

        writeln!(self.out, "All demos completed!")?;
        Ok(())
    }

    /// Stream a reply, echoing it, then print the collected text.
    pub async fn basic_stream(&mut self, prompt: &str) -> anyhow::Result<()> {
        self.banner("Basic Streaming")?;
        let agent = self
            .agent("Assistant")
            .with_instructions(ASSISTANT_INSTRUCTIONS)
            .with_max_tokens(self.config.llm.max_tokens);

        let outcome = self.stream_agent(&agent, prompt, false).await?;
        writeln!(self.out, "\n\nFull response collected:")?;
        writeln!(self.out, "{}", outcome.state.full_text)?;
        self.note_cancelled(&outcome)
    }

    /// Stream with `get_weather` declared and list the calls the model made.
    pub async fn function_calls(&mut self, prompt: &str) -> anyhow::Result<()> {
        self.banner("Function Calling")?;
        let agent = self.agent("Weather").with_functions([weather_function()]);

        let outcome = self.stream_agent(&agent, prompt, false).await?;
        writeln!(self.out, "\n\nFunction calls detected: {}", outcome.state.calls.len())?;
        for call in &outcome.state.calls {
            writeln!(self.out, "Function: {}", call.name)?;
            writeln!(self.out, "Arguments: {}", call.arguments)?;
            if let Err(e) = call.parse_arguments() {
                writeln!(self.out, "  (arguments are not valid JSON: {})", e)?;
            }
        }
        if !outcome.state.anomalies.is_empty() {
            writeln!(
                self.out,
                "Ignored {} argument fragment(s) with no open call",
                outcome.state.anomalies.len()
            )?;
        }
        self.note_cancelled(&outcome)
    }

    /// Stream while keeping live word, sentence, and character counts.
    pub async fn realtime_stats(&mut self, prompt: &str) -> anyhow::Result<()> {
        self.banner("Real-time Processing")?;
        let agent = self.agent("Statistician").with_max_tokens(REALTIME_MAX_TOKENS);

        let live = self.config.stream.show_stats;
        let outcome = self.stream_agent(&agent, prompt, live).await?;
        let stats = outcome.state.stats();
        writeln!(self.out, "\n\nReal-time statistics")?;
        writeln!(self.out, "  Words       {}", stats.words)?;
        writeln!(self.out, "  Sentences   {}", stats.sentences)?;
        writeln!(self.out, "  Characters  {}", stats.characters)?;
        self.note_cancelled(&outcome)
    }

    /// Request a model that does not exist and report how the failure was
    /// classified. The classified failure is the expected result.
    pub async fn error_handling(&mut self) -> anyhow::Result<()> {
        self.banner("Error Handling")?;
        let agent = Agent::new("Broken", INVALID_MODEL);
        let provider = self.providers.default_provider().clone();
        let cancel = self.arm_cancellation();

        let result = agent
            .stream(provider.as_ref(), "Hello", |_| {}, cancel.token())
            .await;
        match result {
            Ok(_) => writeln!(self.out, "No errors occurred")?,
            Err(err) => {
                let cause = err.provider_error();
                let label = match cause.kind {
                    ProviderErrorKind::BadRequest => "Handled bad request error",
                    ProviderErrorKind::Authentication => "Authentication error",
                    ProviderErrorKind::RateLimited => "Rate limit error",
                    _ => "Unexpected error",
                };
                writeln!(self.out, "{}: {}", label, cause.message)?;
                writeln!(
                    self.out,
                    "Retryable: {}",
                    if cause.is_retryable() { "yes" } else { "no" }
                )?;
            }
        }
        Ok(())
    }

    /// Ask once and print the reply. The prompt and reply are logged by the
    /// tracing hooks.
    pub async fn ask(&mut self, prompt: &str) -> anyhow::Result<()> {
        let agent = self.agent("Assistant").with_max_tokens(self.config.llm.max_tokens);
        let provider = self.providers.default_provider().clone();
        let reply = agent
            .ask_with_hooks(provider.as_ref(), prompt, &TracingHooks)
            .await?;
        writeln!(self.out, "{}", reply)?;
        Ok(())
    }

    /// Run the support agent behind the configured guardrails. A tripwire is
    /// reported, not treated as a failure.
    pub async fn guard(&mut self, input: &str) -> anyhow::Result<()> {
        let mut guarded = GuardedAgent::new(
            self.agent("Customer Support Agent")
                .with_instructions(SUPPORT_INSTRUCTIONS)
                .with_max_tokens(self.config.llm.max_tokens),
        );
        for config in &self.config.guardrails.input {
            guarded = guarded.with_input_guardrail(config.clone());
        }
        for config in &self.config.guardrails.output {
            guarded = guarded.with_output_guardrail(config.clone());
        }

        match guarded.run(&self.providers, input).await {
            Ok(reply) => writeln!(self.out, "Agent replied: {}", reply)?,
            Err(RunError::InputTripwire { guardrail, decision }) => writeln!(
                self.out,
                "Input guardrail '{}' triggered: {}",
                guardrail, decision.reason
            )?,
            Err(RunError::OutputTripwire {
                guardrail, decision, ..
            }) => writeln!(
                self.out,
                "Output guardrail '{}' triggered: {}",
                guardrail, decision.reason
            )?,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Interactive chat over lines from `input` until EOF or a quit word.
    pub async fn chat<R>(&mut self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut conversation = Conversation::new(self.agent("Chat"));
        if self.config.session.log_transcripts {
            let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            match SessionLogger::new(&workspace) {
                Ok(logger) => {
                    tracing::info!(path = %logger.path().display(), "writing transcript");
                    conversation = conversation.with_logger(logger);
                }
                Err(e) => tracing::warn!(error = %e, "failed to create transcript logger"),
            }
        }
        let provider = self.providers.default_provider().clone();

        writeln!(self.out, "Interactive streaming chat. Type 'quit' to exit.")?;
        writeln!(self.out, "{}", "-".repeat(40))?;

        let mut lines = input.lines();
        loop {
            write!(self.out, "\nYou: ")?;
            self.out.flush()?;
            let Some(line) = lines.next_line().await.context("reading input")? else {
                break;
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if QUIT_WORDS.contains(&text.to_lowercase().as_str()) {
                writeln!(self.out, "Goodbye!")?;
                break;
            }

            write!(self.out, "AI: ")?;
            let cancel = self.arm_cancellation();
            let mut echo = Echo::new(&mut self.out, false);
            let result = conversation
                .send(provider.as_ref(), text, |state| echo.observe(state), cancel.token())
                .await;
            echo.finish()?;
            drop(cancel);

            match result {
                Ok(outcome) => {
                    writeln!(self.out)?;
                    self.note_cancelled(&outcome)?;
                }
                Err(e) => writeln!(self.out, "\nError: {}", e)?,
            }
        }
        Ok(())
    }

    fn agent(&self, name: &str) -> Agent {
        Agent::new(name, &self.config.llm.model)
    }

    fn banner(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out, "--- {} ---", title)
    }

    fn note_cancelled(&mut self, outcome: &AggregationOutcome) -> anyhow::Result<()> {
        if outcome.is_cancelled() {
            writeln!(
                self.out,
                "(stream cancelled after {} fragments)",
                outcome.state.fragments_seen
            )?;
        }
        Ok(())
    }

    /// Stream `prompt` through `agent`, echoing text as it arrives. A broken
    /// stream is reported with how much arrived before it failed.
    async fn stream_agent(
        &mut self,
        agent: &Agent,
        prompt: &str,
        live_stats: bool,
    ) -> anyhow::Result<AggregationOutcome> {
        let provider: Arc<dyn LlmProvider> = self.providers.default_provider().clone();
        let cancel = self.arm_cancellation();
        let mut echo = Echo::new(&mut self.out, live_stats);
        let result = agent
            .stream(provider.as_ref(), prompt, |state| echo.observe(state), cancel.token())
            .await;
        echo.finish()?;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err @ AgentError::Interrupted(_)) => {
                if let Some(partial) = err.partial_state() {
                    writeln!(
                        self.out,
                        "\n(stream broke after {} fragments; {} characters kept)",
                        partial.fragments_seen, partial.char_count
                    )?;
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A fresh token for one stream, cancelled by the configured deadline or
    /// by Ctrl-C while the returned guard is alive.
    fn arm_cancellation(&self) -> CancelGuard {
        let token = CancellationToken::new();
        let deadline = self.config.stream.deadline_seconds.map(Duration::from_secs);
        if deadline.is_none() && !self.catch_ctrl_c {
            return CancelGuard {
                token,
                watcher: None,
            };
        }

        let trigger = token.clone();
        let catch_ctrl_c = self.catch_ctrl_c;
        let watcher = tokio::spawn(async move {
            let interrupted = async {
                if !catch_ctrl_c || tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let expired = async {
                match deadline {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = interrupted => tracing::info!("interrupted; cancelling stream"),
                _ = expired => tracing::info!(?deadline, "deadline reached; cancelling stream"),
            }
            trigger.cancel();
        });
        CancelGuard {
            token,
            watcher: Some(watcher),
        }
    }
}

/// Cancellation token for one stream plus the task that may trigger it.
/// Dropping the guard stops the task.
struct CancelGuard {
    token: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl CancelGuard {
    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

/// Writes newly arrived text on every update. Write errors are held until
/// [`Echo::finish`] because the observer cannot return them.
struct Echo<'a, W: Write> {
    out: &'a mut W,
    printed: usize,
    live_stats: bool,
    sentences_shown: usize,
    error: Option<io::Error>,
}

impl<'a, W: Write> Echo<'a, W> {
    fn new(out: &'a mut W, live_stats: bool) -> Self {
        Self {
            out,
            printed: 0,
            live_stats,
            sentences_shown: 0,
            error: None,
        }
    }

    fn observe(&mut self, state: &AggregationState) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.write_update(state) {
            self.error = Some(e);
        }
    }

    fn write_update(&mut self, state: &AggregationState) -> io::Result<()> {
        let fresh = &state.full_text[self.printed..];
        if !fresh.is_empty() {
            write!(self.out, "{}", fresh)?;
            self.printed = state.full_text.len();
        }
        if self.live_stats && state.sentence_count > self.sentences_shown {
            self.sentences_shown = state.sentence_count;
            let stats = state.stats();
            write!(
                self.out,
                "\n  [words: {}, sentences: {}, characters: {}]\n",
                stats.words, stats.sentences, stats.characters
            )?;
        }
        self.out.flush()
    }

    fn finish(self) -> io::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
