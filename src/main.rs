use clap::{arg, Arg, Command};
use colored::Colorize;
use log::{debug, error, info};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io;
use wharf::builder::{ImageBuilder, Recipe};
use wharf::container::Launcher;
use wharf::image::LayerStore;
use wharf::installer::{Installer, PipInstaller};

#[tokio::main]
async fn main() -> io::Result<()> {
    let matches = Command::new("wharf")
        .version("0.1.0")
        .about("Wharf builds runnable images from declarative recipes and launches them. A build resolves a pinned base filesystem, installs the declared dependencies, and overlays the application payload into content-addressed layers; a run starts exactly one process from the result.")
        .arg(arg!(store : --store <STORE_DIR> "Store directory (defaults to ~/.wharf)"))
        .arg(arg!(log_level : -l --loglevel <LOG_LEVEL> "Log level (trace, debug, info, warn, error)").default_value("info"))
        .subcommand(Command::new("build")
            .about("Builds an image from a recipe directory")
            .arg(Arg::new("recipe_dir").required(true))
        )
        .subcommand(Command::new("run")
            .about("Launches a built image's entrypoint")
            .arg(Arg::new("image_name").required(true))
        )
        .subcommand(Command::new("images")
            .about("Lists built images")
        )
        .subcommand(Command::new("describe")
            .about("Describes recipes and built images")
            .subcommand(Command::new("recipe")
                .about("Describes a recipe directory")
                .arg(Arg::new("recipe_dir").required(true))
            )
            .subcommand(Command::new("image")
                .about("Describes a built image's manifest")
                .arg(Arg::new("image_name").required(true))
            )
        )
        .get_matches();

    debug!("Command line arguments parsed");

    // Set log level based on command line argument
    if let Some(log_level) = matches.get_one::<String>("log_level") {
        env::set_var("RUST_LOG", log_level);
        env_logger::builder().parse_env("RUST_LOG").init();
        info!("Log level set to: {}", log_level);
    } else {
        env_logger::init();
    }

    let store_root = match matches.get_one::<String>("store") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .expect("Unable to determine home directory")
            .join(".wharf"),
    };
    debug!("Store root: {}", store_root.display());

    let store = match LayerStore::open(&store_root) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open store at {}: {}", store_root.display(), e);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(matches) = matches.subcommand_matches("build") {
        let recipe_dir = PathBuf::from(matches.get_one::<String>("recipe_dir").unwrap());
        let recipe = match Recipe::load(&recipe_dir) {
            Ok(recipe) => recipe,
            Err(e) => {
                error!("Failed to load recipe: {}", e);
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };

        let installer = match PipInstaller::resolve() {
            Ok(installer) => Arc::new(installer) as Arc<dyn Installer + Send + Sync>,
            Err(e) => {
                error!("Failed to resolve installer: {}", e);
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        info!("Installing with {}", installer.describe());

        let image_name = recipe.name();
        let builder = ImageBuilder::new(store.clone(), installer, recipe);
        println!("Build {}", image_name.white().bold());
        std::io::stdout().flush().expect("Failed to flush stdout");
        match builder.build().await {
            Ok(manifest) => {
                println!(
                    "Build {}  ..... [  {}  ]   {}",
                    image_name.white().bold(),
                    "OK".white().bold(),
                    manifest.short_id()
                );
                return Ok(());
            }
            Err(e) => {
                println!(
                    "Build {}  ..... [ {} ]",
                    image_name.white().bold(),
                    "FAIL".red().bold()
                );
                println!();
                println!("{}", e);
                println!();
                println!("{}", "Build was unsuccessful".red().bold());
                std::process::exit(1);
            }
        }
    }

    if let Some(matches) = matches.subcommand_matches("run") {
        let image_name = matches.get_one::<String>("image_name").unwrap();
        let launcher = Launcher::new(store.clone());
        match launcher.launch(image_name).await {
            Ok(code) => {
                // The entrypoint's exit code is our exit code.
                std::process::exit(code);
            }
            Err(e) => {
                error!("Failed to launch '{}': {}", image_name, e);
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
    }

    if matches.subcommand_matches("images").is_some() {
        let images = match store.list_images() {
            Ok(images) => images,
            Err(e) => {
                error!("Failed to list images: {}", e);
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        for image in images {
            println!(
                "{:<24} {:<14} {:<22} {:<6} {}",
                image.name,
                image.short_id(),
                image.base,
                image
                    .port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                image.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        return Ok(());
    }

    if let Some(matches) = matches.subcommand_matches("describe") {
        info!("Executing 'describe' subcommand");
        if let Some(matches) = matches.subcommand_matches("recipe") {
            let recipe_dir = PathBuf::from(matches.get_one::<String>("recipe_dir").unwrap());
            match Recipe::load(&recipe_dir) {
                Ok(recipe) => {
                    println!("{:#?}", recipe);
                    return Ok(());
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }

        if let Some(matches) = matches.subcommand_matches("image") {
            let image_name = matches.get_one::<String>("image_name").unwrap();
            match store.load_image(image_name) {
                Ok(manifest) => {
                    let json = serde_json::to_string_pretty(&manifest)
                        .expect("Failed to serialize image manifest");
                    println!("{}", json);
                    return Ok(());
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
