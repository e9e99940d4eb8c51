use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use std::env;
use std::fs;

use stockwise::config::{self, FileSettingsStore, Provider};
use stockwise::{
    Assistant, BatchHandler, CategorizationItem, CategoryUpdate, ConnectionStatus,
    DEFAULT_BATCH_SIZE,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("configure") => configure(&args[1..]),
        Some("show") => show(),
        Some("test") => test_connection().await,
        Some("categorize") => categorize(&args[1..]).await,
        Some("merges") => merges(&args[1..]).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("stockwise - AI assistant for retail inventory categorization");
    println!();
    println!("Usage:");
    println!("  stockwise configure key=value ...   set provider/base-url/api-key/model");
    println!("  stockwise show                      print current settings");
    println!("  stockwise test                      test connectivity to the endpoint");
    println!("  stockwise categorize <items.json> <categories.json>");
    println!("  stockwise merges <categories.json>");
}

fn open_store() -> Result<FileSettingsStore> {
    let dir = FileSettingsStore::default_location()
        .context("could not determine the user config directory")?;
    Ok(FileSettingsStore::new(dir))
}

fn configure(pairs: &[String]) -> Result<()> {
    if pairs.is_empty() {
        bail!("configure expects key=value pairs (provider, base-url, api-key, model)");
    }

    let mut store = open_store()?;
    let mut settings = config::load_config(&store);

    // Switching provider pre-fills its endpoint and model, matching the
    // settings form behavior; explicit pairs afterwards still win.
    if let Some(value) = lookup(pairs, "provider") {
        let provider: Provider = value.parse().map_err(anyhow::Error::msg)?;
        settings.provider = provider;
        if let Some((base_url, model)) = provider.defaults() {
            settings.base_url = base_url.to_string();
            settings.model = model.to_string();
        }
    }

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        match key {
            "provider" => {} // handled above
            "base-url" => settings.base_url = value.to_string(),
            "api-key" => settings.api_key = value.to_string(),
            "model" => settings.model = value.to_string(),
            other => bail!("unknown setting '{other}'"),
        }
    }

    config::save_config(&mut store, &settings)?;
    println!("{}", "Settings saved.".green());
    Ok(())
}

fn lookup<'a>(pairs: &'a [String], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find_map(|pair| pair.strip_prefix(key)?.strip_prefix('='))
}

fn show() -> Result<()> {
    let settings = config::load_config(&open_store()?);
    println!("provider: {}", settings.provider);
    println!("base-url: {}", settings.base_url);
    println!("api-key:  {}", mask(&settings.api_key));
    println!("model:    {}", settings.model);
    Ok(())
}

fn mask(key: &str) -> String {
    if key.is_empty() {
        "(not set)".to_string()
    } else if key.len() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", &key[key.len() - 4..])
    }
}

async fn test_connection() -> Result<()> {
    let settings = config::load_config(&open_store()?);
    println!("Testing {} ...", settings.chat_completions_url());

    match Assistant::new(settings).test_connection().await {
        ConnectionStatus::Verified => println!("{}", "Connection Verified".green().bold()),
        ConnectionStatus::Failed(message) => println!("{} {message}", "Error:".red().bold()),
    }
    Ok(())
}

struct PrintHandler;

#[async_trait]
impl BatchHandler for PrintHandler {
    async fn on_batch(
        &mut self,
        updates: Vec<CategoryUpdate>,
        processed: usize,
        total: usize,
    ) -> Result<()> {
        println!("{}", format!("[{processed}/{total}]").bold());
        for update in updates {
            println!("  {} -> {}", update.id, update.category);
        }
        Ok(())
    }
}

async fn categorize(args: &[String]) -> Result<()> {
    let [items_path, categories_path] = args else {
        bail!("categorize expects <items.json> <categories.json>");
    };

    let items: Vec<CategorizationItem> = read_json(items_path)?;
    let categories: Vec<String> = read_json(categories_path)?;
    println!(
        "Categorizing {} items against {} categories...",
        items.len(),
        categories.len()
    );

    let assistant = Assistant::new(config::load_config(&open_store()?));
    let mut handler = PrintHandler;
    assistant
        .run_batch_categorization(&items, &categories, &mut handler, DEFAULT_BATCH_SIZE)
        .await?;
    Ok(())
}

async fn merges(args: &[String]) -> Result<()> {
    let [categories_path] = args else {
        bail!("merges expects <categories.json>");
    };

    let categories: Vec<String> = read_json(categories_path)?;
    let assistant = Assistant::new(config::load_config(&open_store()?));
    let suggestions = assistant.find_category_merges(&categories).await?;

    if suggestions.is_empty() {
        println!("No merge candidates found.");
        return Ok(());
    }
    for suggestion in suggestions {
        println!(
            "{} {} -> {}",
            format!("[{}]", suggestion.reason).yellow(),
            suggestion.source,
            suggestion.target
        );
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {path}"))
}
