use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wildcrafter::{
    codec, config, serve, skeleton, Category, Config, LlmClient, Provider, Session, SettingsUpdate,
    TreeError,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "wildcrafter")]
#[command(author, version, about = "Curate wildcard lists for prompt generation, with LLM help")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// YAML data file
    #[arg(long, global = true, env = "WILDCRAFTER_DATA")]
    data: Option<PathBuf>,

    /// JSON config file with prompts and model names
    #[arg(long, global = true, env = "WILDCRAFTER_CONFIG")]
    config: Option<PathBuf>,

    /// LLM provider to use
    #[arg(long, global = true, value_enum)]
    provider: Option<Provider>,

    /// API key for the active provider (overrides the environment)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model name for the active provider
    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint (custom provider)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every leaf path
    Paths {
        /// Only paths containing this term (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one category
    Show {
        path: String,
    },

    /// Add wildcards to a leaf
    Add {
        path: String,
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Remove wildcards from a leaf
    Remove {
        path: String,
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Create an empty leaf, adding intermediate categories as needed
    Create {
        path: String,
    },

    /// Delete a category and everything under it
    Delete {
        path: String,
    },

    /// Set the generation instruction of a category (empty clears it)
    Instruct {
        path: String,
        text: String,
    },

    /// Ask the provider for more wildcards for a leaf
    Generate {
        path: String,
    },

    /// Ask the provider for new categories next to a path
    Suggest {
        path: String,

        /// Add the suggested categories to the tree
        #[arg(long)]
        accept: bool,
    },

    /// Write the tree as YAML
    Export {
        /// Output file (default: a new temporary file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the tree with a YAML file
    Import {
        file: PathBuf,
    },

    /// Build a starter tree from ImageNet and Places365 labels
    Skeleton {
        /// ImageNet `imagenet_class_index.json`
        #[arg(long)]
        imagenet: Option<PathBuf>,

        /// Places365 `categories_places365.txt`
        #[arg(long)]
        places: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve the JSON API on localhost
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_session(args: &Args) -> Session {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let data_path = args.data.clone().unwrap_or_else(config::default_data_path);
    let config = Config::load(&config_path);

    let mut session = Session::open(&data_path, &config);
    session.update_settings(SettingsUpdate {
        provider: args.provider,
        api_key: args.api_key.clone(),
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        ..Default::default()
    });
    session
}

fn run(args: Args) -> CliResult {
    // Needs no data file
    match &args.command {
        Command::Completion { shell } => {
            clap_complete::generate(*shell, &mut Args::command(), "wildcrafter", &mut std::io::stdout());
            return Ok(());
        }
        Command::Skeleton {
            imagenet,
            places,
            output,
        } => return build_skeleton(imagenet.as_ref(), places.as_ref(), output.as_ref()),
        _ => {}
    }

    let mut session = open_session(&args);

    match args.command {
        Command::Paths { search } => {
            let paths = match search {
                Some(term) => session.tree.search_paths(&term),
                None => session.tree.paths(),
            };
            if paths.is_empty() {
                eprintln!("{}", "No categories.".yellow());
            }
            for p in paths {
                println!("{}", p);
            }
        }

        Command::Show { path } => {
            let category = session
                .tree
                .get(&path)
                .ok_or_else(|| TreeError::NotFound(path.clone()))?;
            print_category(&path, category);
        }

        Command::Add { path, words } => {
            let mut added = 0;
            for word in &words {
                if session.tree.add_wildcard(&path, word)? {
                    added += 1;
                }
            }
            save(&session)?;
            println!("{} {} wildcard(s) to {}", "Added".green(), added, path);
        }

        Command::Remove { path, words } => {
            let removed = session.tree.remove_wildcards(&path, &words)?;
            save(&session)?;
            println!("{} {} wildcard(s) from {}", "Removed".green(), removed, path);
        }

        Command::Create { path } => {
            if session.tree.create_category(&path)? {
                save(&session)?;
                println!("{} {}", "Created".green(), path);
            } else {
                println!("{} {} already exists", "Unchanged".yellow(), path);
            }
        }

        Command::Delete { path } => {
            session.tree.delete_category(&path)?;
            save(&session)?;
            println!("{} {}", "Deleted".green(), path);
        }

        Command::Instruct { path, text } => {
            session.tree.set_instruction(&path, &text)?;
            save(&session)?;
            println!("{} instruction for {}", "Updated".green(), path);
        }

        Command::Generate { path } => {
            let client = LlmClient::new()?;
            let added = session.generate_more(&client, &path)?;
            save(&session)?;
            println!(
                "{} {} new wildcard(s) for {}",
                "Generated".green(),
                added.len(),
                path
            );
            for word in added {
                println!("  + {}", word);
            }
        }

        Command::Suggest { path, accept } => {
            let client = LlmClient::new()?;
            let suggestions = session.suggest(&client, &path)?;
            if suggestions.is_empty() {
                eprintln!("{}", "No suggestions.".yellow());
            }
            for s in &suggestions {
                if s.instruction.is_empty() {
                    println!("  {}", s.name.bold());
                } else {
                    println!("  {}  # {}", s.name.bold(), s.instruction);
                }
            }
            if accept {
                let added = session.accept_suggestions(&path, &suggestions)?;
                save(&session)?;
                println!("{} {} categor(ies)", "Accepted".green(), added);
            }
        }

        Command::Export { output } => {
            let written = match output {
                Some(file) => {
                    codec::save_file(&session.tree, &file)?;
                    file
                }
                None => session.export()?,
            };
            println!("{} {}", "Exported".green(), written.display());
        }

        Command::Import { file } => {
            session.import_file(&file)?;
            save(&session)?;
            println!(
                "{} {} ({} categories)",
                "Imported".green(),
                file.display(),
                session.tree.categories().len()
            );
        }

        Command::Serve { port } => {
            let client = LlmClient::new()?;
            serve::start_api_server(session, &client, port)?;
        }

        Command::Completion { .. } | Command::Skeleton { .. } => {}
    }

    Ok(())
}

fn save(session: &Session) -> CliResult {
    let written = session.save()?;
    tracing::debug!(path = %written.display(), "saved");
    Ok(())
}

fn print_category(path: &str, category: &Category) {
    println!("{}", wildcrafter::path::readable(path).bold());
    if !category.instruction.is_empty() {
        println!("  {} {}", "instruction:".dimmed(), category.instruction);
    }
    if let Some(words) = category.wildcards() {
        for word in words {
            println!("  - {}", word);
        }
    }
    if let Some(children) = category.children() {
        for (name, child) in children {
            if child.is_leaf() {
                println!("  {}", name);
            } else {
                println!("  {}/", name);
            }
        }
    }
}

fn build_skeleton(
    imagenet: Option<&PathBuf>,
    places: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> CliResult {
    let index = match imagenet {
        Some(file) => skeleton::read_imagenet(file)?,
        None => skeleton::sample_imagenet(),
    };
    let lines = match places {
        Some(file) => skeleton::read_places(file)?,
        None => skeleton::sample_places(),
    };
    let tree = skeleton::merge([
        skeleton::imagenet_taxonomy(&index),
        skeleton::places_taxonomy(&lines),
    ]);

    match output {
        Some(file) => {
            codec::save_file(&tree, file)?;
            eprintln!("{} {}", "Created".green(), file.display());
        }
        None => print!("{}", codec::encode(&tree)),
    }
    Ok(())
}
