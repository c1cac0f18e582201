use agentry_core::agent::{AgentDecision, AgentEvent, PromptTemplate};
use agentry_core::config::{self, Config, ModelSettings};
use agentry_core::{AgentLoop, ModelAdapter, Provider, ProviderKind, ToolRegistry, providers, tools};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod onboard;

const CALCULATOR_QUESTION: &str = "Take 3 to the fifth power and multiply that by the sum of twelve and three, then square the whole result";
const SCORE_QUESTION: &str = "What was the score of the warriors game?";
const ASK_QUESTION: &str = "Who is Pinocchio";

const SCORE_SYSTEM_PROMPT: &str = "You are a function calling LLM that uses the data extracted from the get_game_score function to answer questions around NBA game scores. Include the team and their opponent in your response.";

#[derive(Parser)]
#[command(name = "agentry")]
#[command(about = "agentry - tool-calling agent demos", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    overrides: Overrides,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct Overrides {
    /// openai, groq or openrouter
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true)]
    temperature: Option<f64>,

    /// 0 removes the limit
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Describe the <tool_call> text format to models without native tool calling
    #[arg(long, global = true)]
    text_tool_protocol: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the config file interactively
    Onboard,
    /// Arithmetic tools driven by a function-calling model
    Calculate {
        #[arg(short, long)]
        message: Option<String>,
        /// Print every decision and observation as it happens
        #[arg(long)]
        trace: bool,
    },
    /// Look up a (made-up) NBA score
    Score {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Single model call, no tools
    Ask {
        #[arg(short, long)]
        message: Option<String>,
    },
}

struct Demo {
    preset: ModelSettings,
    prompt: PromptTemplate,
    registry: ToolRegistry,
    question: String,
    trace: bool,
}

impl Demo {
    fn from_command(command: Commands) -> Result<Self> {
        let demo = match command {
            Commands::Calculate { message, trace } => Demo {
                preset: ModelSettings::new(
                    ProviderKind::OpenAi,
                    config::OPENAI_GPT35_MODEL,
                    config::FACTUAL_TEMPERATURE,
                ),
                prompt: PromptTemplate::default(),
                registry: tools::math_registry()?,
                question: message.unwrap_or_else(|| CALCULATOR_QUESTION.to_string()),
                trace,
            },
            Commands::Score { message } => Demo {
                preset: ModelSettings::new(
                    ProviderKind::Groq,
                    config::GROQ_MIXTRAL_MODEL,
                    config::FACTUAL_TEMPERATURE,
                ),
                prompt: PromptTemplate::new(SCORE_SYSTEM_PROMPT),
                registry: tools::score_registry()?,
                question: message.unwrap_or_else(|| SCORE_QUESTION.to_string()),
                trace: false,
            },
            Commands::Ask { message } => Demo {
                preset: ModelSettings::new(
                    ProviderKind::OpenRouter,
                    config::OPENROUTER_MIXTRAL_MODEL,
                    config::CREATIVE_TEMPERATURE,
                ),
                prompt: PromptTemplate::default(),
                registry: ToolRegistry::new(),
                question: message.unwrap_or_else(|| ASK_QUESTION.to_string()),
                trace: false,
            },
            Commands::Onboard => anyhow::bail!("onboard is not a demo"),
        };
        Ok(demo)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn apply_overrides(config: &mut Config, overrides: Overrides) {
    if let Some(provider) = overrides.provider {
        config.provider = Some(provider);
    }
    if let Some(model) = overrides.model {
        config.model = Some(model);
    }
    if let Some(temperature) = overrides.temperature {
        config.temperature = Some(temperature);
    }
    if let Some(max) = overrides.max_iterations {
        config.max_iterations = max;
    }
    if overrides.text_tool_protocol {
        config.text_tool_protocol = true;
    }
}

fn format_event(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Decision(AgentDecision::Invoke(invocation)) => format!(
            "agent: invoke {} {}",
            invocation.tool,
            invocation.to_tool_call().arguments
        ),
        AgentEvent::Decision(AgentDecision::Finish { output }) => {
            format!("agent: finish\n{}", output)
        }
        AgentEvent::Observation { invocation, output } => {
            format!("action: {} -> {}", invocation.tool, output)
        }
        AgentEvent::Failed(message) => format!("failed: {}", message),
    }
}

fn build_agent(
    provider: Arc<dyn Provider>,
    settings: &ModelSettings,
    prompt: PromptTemplate,
    registry: ToolRegistry,
    config: &Config,
) -> AgentLoop {
    let adapter = ModelAdapter::new(provider, settings.model.clone(), settings.temperature)
        .with_prompt(prompt.with_text_tool_protocol(config.text_tool_protocol));
    AgentLoop::new(adapter, Arc::new(registry))
        .with_max_iterations(config.max_iterations())
        .with_retry_policy(config.retry_policy())
}

async fn run_demo(demo: Demo, config: &Config) -> Result<()> {
    let settings = config.resolve(&demo.preset);
    let provider = providers::create_provider(settings.provider, config)?;
    let agent = Arc::new(build_agent(
        provider,
        &settings,
        demo.prompt,
        demo.registry,
        config,
    ));
    info!(provider = %settings.provider, model = %settings.model, "Agent created");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} stopping after the current step", style("!").yellow());
            on_signal.cancel();
        }
    });

    if demo.trace {
        let mut events = agent.stream(demo.question, cancel);
        while let Some(event) = events.next().await {
            println!("{}", format_event(&event));
            println!("----");
            if let AgentEvent::Failed(_) = event {
                anyhow::bail!("Agent run failed");
            }
        }
        return Ok(());
    }

    let output = agent
        .run_until_cancelled(&demo.question, vec![], &cancel)
        .await
        .context("Agent run failed")?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Onboard = cli.command {
        let onboard_config = onboard::run_onboard()?;
        let path = config::save_config(&onboard_config)?;
        println!();
        println!(
            "  {} Config saved to {}",
            style("✓").green().bold(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let mut config = Config::load_or_init()?;
    apply_overrides(&mut config, cli.overrides);

    let demo = Demo::from_command(cli.command)?;
    run_demo(demo, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::{ChatResponse, ScriptedProvider};
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_overrides_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "agentry",
            "calculate",
            "--trace",
            "--provider",
            "groq",
            "--temperature",
            "0.8",
        ])
        .unwrap();
        assert_eq!(cli.overrides.provider, Some(ProviderKind::Groq));
        assert_eq!(cli.overrides.temperature, Some(0.8));
        assert!(matches!(cli.command, Commands::Calculate { trace: true, .. }));
    }

    #[test]
    fn overrides_beat_config() {
        let mut config = Config {
            model: Some("from-file".into()),
            ..Config::default()
        };
        apply_overrides(
            &mut config,
            Overrides {
                provider: None,
                model: Some("from-flag".into()),
                temperature: None,
                max_iterations: Some(0),
                text_tool_protocol: true,
            },
        );
        assert_eq!(config.model.as_deref(), Some("from-flag"));
        assert_eq!(config.max_iterations(), None);
        assert!(config.text_tool_protocol);
    }

    #[tokio::test]
    async fn text_tool_protocol_reaches_the_system_prompt() {
        let preset = ModelSettings::new(ProviderKind::OpenAi, config::OPENAI_GPT35_MODEL, 0.0);
        for enabled in [false, true] {
            let provider = Arc::new(ScriptedProvider::new(vec![Ok(ChatResponse {
                text: Some("done".into()),
                tool_calls: vec![],
            })]));
            let config = Config {
                text_tool_protocol: enabled,
                ..Config::default()
            };
            let agent = build_agent(
                provider.clone(),
                &preset,
                PromptTemplate::default(),
                tools::math_registry().unwrap(),
                &config,
            );

            assert_eq!(agent.run("hi").await.unwrap(), "done");
            let system = &provider.requests()[0].messages[0];
            assert_eq!(system.content.contains("<tool_call>"), enabled);
        }
    }

    #[test]
    fn demos_use_their_presets() {
        let demo = Demo::from_command(Commands::Score { message: None }).unwrap();
        assert_eq!(demo.preset.provider, ProviderKind::Groq);
        assert_eq!(demo.question, SCORE_QUESTION);
        assert_eq!(demo.registry.len(), 1);

        let demo = Demo::from_command(Commands::Ask {
            message: Some("hi".into()),
        })
        .unwrap();
        assert!(demo.registry.is_empty());
        assert_eq!(demo.preset.temperature, config::CREATIVE_TEMPERATURE);
        assert_eq!(demo.question, "hi");
    }
}
