#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use anyhow::Context;
use args::{Args, ChatArgs, Command, ImageArgs, ObjectArgs};
use clap::Parser;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue};
use relay_config::{ApiModeConfig, Config};
use relay_runtime::types::{
    ApiMode, CreateImagePayload, GenerateObjectOptions, GenerateObjectPayload, ImageParams, ObjectSchema,
};
use relay_runtime::{
    ChatOptions, ChatPayload, Message, ModelRuntime, OpenAiCompatibleRuntime, RuntimeOptions, StreamEvent, providers,
};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    relay_telemetry::init(&config.logging, "warn")?;

    tracing::debug!(config_path = %args.config.display(), "starting relay");

    match args.command {
        Command::Models(provider) => models(&runtime(&config, &provider.provider)?).await,
        Command::Chat(chat_args) => chat(&config, chat_args).await,
        Command::Object(object_args) => object(&config, object_args).await,
        Command::Image(image_args) => image(&config, image_args).await,
    }
}

/// Build the runtime for a configured provider
fn runtime(config: &Config, name: &str) -> anyhow::Result<OpenAiCompatibleRuntime> {
    let entry = config
        .providers
        .get(name)
        .with_context(|| format!("provider '{name}' is not configured"))?;

    let preset = entry.preset(name);
    let factory = providers::factory(preset).with_context(|| {
        format!(
            "unknown preset '{preset}' for provider '{name}' (known: {})",
            providers::PRESETS.join(", ")
        )
    })?;

    let mut headers = HeaderMap::new();
    for (header, value) in &entry.headers {
        headers.insert(HeaderName::try_from(header.as_str())?, HeaderValue::try_from(value.as_str())?);
    }

    let runtime = factory.create(RuntimeOptions {
        api_key: entry.api_key.as_ref().map(|key| key.expose_secret().to_owned()),
        base_url: entry.base_url.as_ref().map(ToString::to_string),
        id: Some(name.to_owned()),
        default_headers: headers,
        vision_base64: entry.vision_base64,
        debug: entry.debug,
    })?;

    Ok(runtime)
}

fn api_mode(config: &Config, name: &str) -> Option<ApiMode> {
    config
        .providers
        .get(name)
        .and_then(|entry| entry.api_mode)
        .map(|mode| match mode {
            ApiModeConfig::ChatCompletion => ApiMode::ChatCompletion,
            ApiModeConfig::Responses => ApiMode::Responses,
        })
}

async fn models(runtime: &OpenAiCompatibleRuntime) -> anyhow::Result<()> {
    let cards = runtime.models().await?;

    let mut stdout = std::io::stdout().lock();
    for card in cards {
        writeln!(stdout, "{}", serde_json::to_string(&card)?)?;
    }
    Ok(())
}

async fn chat(config: &Config, args: ChatArgs) -> anyhow::Result<()> {
    let runtime = runtime(config, &args.provider.provider)?;

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt));

    let payload = ChatPayload {
        stream: Some(!args.no_stream),
        api_mode: api_mode(config, &args.provider.provider),
        ..ChatPayload::new(args.model, messages)
    };

    let signal = CancellationToken::new();
    let cancel = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling request");
            cancel.cancel();
        }
    });

    let options = ChatOptions {
        signal: Some(signal),
        ..ChatOptions::default()
    };
    let response = runtime.chat(payload, options).await?;

    let mut stdout = std::io::stdout().lock();

    if args.sse {
        let mut frames = response.into_sse();
        while let Some(frame) = frames.next().await {
            stdout.write_all(&frame?)?;
            stdout.flush()?;
        }
        return Ok(());
    }

    let mut events = response.into_events();
    while let Some(chunk) = events.next().await {
        match chunk?.event {
            StreamEvent::Text(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamEvent::Reasoning(text) => eprint!("{text}"),
            StreamEvent::Usage(usage) => tracing::info!(usage = %serde_json::to_string(&usage)?, "usage"),
            StreamEvent::Speed(speed) => tracing::info!(speed = %serde_json::to_string(&speed)?, "speed"),
            StreamEvent::Stop(reason) => {
                writeln!(stdout)?;
                tracing::debug!(reason = %reason, "stream finished");
            }
            StreamEvent::ToolCalls(_) | StreamEvent::Data(_) => {}
        }
    }

    Ok(())
}

async fn object(config: &Config, args: ObjectArgs) -> anyhow::Result<()> {
    let runtime = runtime(config, &args.provider.provider)?;

    let raw = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("failed to read schema file {}", args.schema.display()))?;
    let schema: ObjectSchema = serde_json::from_str(&raw).context("schema file is not a valid schema object")?;

    let payload = GenerateObjectPayload {
        model: args.model,
        messages: vec![Message::user(args.prompt)],
        schema: Some(schema),
        ..GenerateObjectPayload::default()
    };

    match runtime.generate_object(payload, GenerateObjectOptions::default()).await? {
        Some(output) => println!("{}", serde_json::to_string_pretty(&output)?),
        None => anyhow::bail!("the model did not return valid JSON"),
    }

    Ok(())
}

async fn image(config: &Config, args: ImageArgs) -> anyhow::Result<()> {
    let runtime = runtime(config, &args.provider.provider)?;

    let payload = CreateImagePayload {
        model: args.model,
        params: ImageParams {
            prompt: args.prompt,
            image_urls: (!args.image_urls.is_empty()).then_some(args.image_urls),
            size: args.size,
            ..ImageParams::default()
        },
    };

    let response = runtime.create_image(payload).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
