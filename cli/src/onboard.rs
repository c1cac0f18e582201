use agentry_core::config::{
    CREATIVE_TEMPERATURE, Config, FACTUAL_TEMPERATURE, GROQ_LLAMA2_MODEL, GROQ_MIXTRAL_MODEL,
    OPENAI_GPT4_MODEL, OPENAI_GPT35_MODEL, OPENROUTER_MIXTRAL_MODEL,
};
use agentry_core::providers::ProviderKind;
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Password, Select};

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn models_for(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::OpenAi => &[OPENAI_GPT35_MODEL, OPENAI_GPT4_MODEL],
        ProviderKind::Groq => &[GROQ_MIXTRAL_MODEL, GROQ_LLAMA2_MODEL],
        ProviderKind::OpenRouter => &[OPENROUTER_MIXTRAL_MODEL],
    }
}

fn setup_provider() -> Result<ProviderKind> {
    let names: Vec<&str> = ProviderKind::ALL.iter().map(|p| p.as_str()).collect();

    let selection = Select::new()
        .with_prompt("Select your backend")
        .items(&names)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    Ok(ProviderKind::ALL[selection])
}

fn setup_model(provider: ProviderKind) -> Result<String> {
    let models = models_for(provider);

    let selection = Select::new()
        .with_prompt("Select your model")
        .items(models)
        .default(0)
        .interact()
        .context("Failed to select model")?;

    Ok(models[selection].to_string())
}

fn setup_temperature() -> Result<f64> {
    let options = [
        format!("factual ({})", FACTUAL_TEMPERATURE),
        format!("creative ({})", CREATIVE_TEMPERATURE),
    ];

    let selection = Select::new()
        .with_prompt("Sampling temperature")
        .items(&options)
        .default(0)
        .interact()
        .context("Failed to select temperature")?;

    Ok([FACTUAL_TEMPERATURE, CREATIVE_TEMPERATURE][selection])
}

fn setup_api_key(provider: ProviderKind) -> Result<String> {
    Password::new()
        .with_prompt(format!(
            "API key (leave empty to read {} at runtime)",
            provider.api_key_env_vars()[0]
        ))
        .allow_empty_password(true)
        .interact()
        .context("Failed to read API key")
}

pub fn run_onboard() -> Result<Config> {
    println!("  {}", style("Welcome to agentry!").white().bold());
    println!(
        "  {}",
        style("Answers are stored as defaults for every demo command.").dim()
    );

    print_step(1, 4, "Backend");
    let provider = setup_provider()?;

    print_step(2, 4, "Model");
    let model = setup_model(provider)?;

    print_step(3, 4, "Temperature");
    let temperature = setup_temperature()?;

    print_step(4, 4, "API Key");
    let api_key = setup_api_key(provider)?;

    let base_url: String = Input::new()
        .with_prompt("Base URL")
        .default(provider.default_base_url().to_string())
        .interact_text()
        .context("Failed to read base URL")?;

    Ok(Config {
        provider: Some(provider),
        model: Some(model),
        temperature: Some(temperature),
        api_key,
        base_url: (base_url != provider.default_base_url()).then_some(base_url),
        ..Config::default()
    })
}
