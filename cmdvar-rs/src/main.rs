use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use cmdvar::cli::{self, ConfigFile, USAGE};
use cmdvar::config::{self, Config};
use cmdvar::{EngineCache, Input, JsonFileStore, MemoryStore, Store};

fn init_logging(debug: bool) {
    let default = if debug { "cmdvar=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("CMDVAR_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(which: &ConfigFile) -> Config {
    let path: Option<PathBuf> = match which {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => config::find_user_config(),
    };
    let Some(path) = path else {
        return Config::default();
    };
    match Config::load_file(&path) {
        Ok((cfg, errors)) => {
            for e in errors {
                tracing::warn!(path = %path.display(), "{e}");
            }
            cfg
        }
        Err(e) => {
            eprintln!("cmdvar: warning: {}: {e}", path.display());
            Config::default()
        }
    }
}

async fn open_store(dry_run: bool, path: Option<PathBuf>) -> Result<Arc<dyn Store>, String> {
    if dry_run {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = path
        .or_else(JsonFileStore::default_path)
        .ok_or("no store path: pass -s<store> or set store= in the rc file")?;
    let store = JsonFileStore::open(&path)
        .await
        .map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("cmdvar: {e}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    init_logging(args.debug);

    let config = load_config(&args.config);

    let input: Option<Input> = match args.input.as_deref().map(serde_json::from_str::<Input>) {
        None => None,
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => {
            eprintln!("cmdvar: -i: invalid JSON: {e}");
            std::process::exit(2);
        }
    };

    let store = match open_store(args.dry_run, args.store.clone().or(config.store.clone())).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cmdvar: store: {e}");
            std::process::exit(1);
        }
    };

    let cache = EngineCache::new(store, config.pipeline(), config.options.clone());

    let templates = args.all_templates();
    if !templates.is_empty() {
        for template in templates {
            match cache.parse(template, input.as_ref()).await {
                Ok(out) => println!("{out}"),
                Err(e) => {
                    eprintln!("cmdvar: {e}");
                    std::process::exit(1);
                }
            }
        }
        return;
    }

    // No templates: expand each stdin line on one shared engine.
    let engine = cache.uncached();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("cmdvar: stdin: {e}");
                std::process::exit(1);
            }
        };
        match engine.parse(Some(&line), input.as_ref()).await {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("cmdvar: {e}");
                std::process::exit(1);
            }
        }
    }
}
