use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{LevelFilter, info};

use pyarcade::Config;
use pyarcade::project::{DirectoryStore, ProjectStore};
use pyarcade::runtime::input::InputScript;
use pyarcade::sandbox::Sandbox;
use pyarcade::translate;

#[derive(Parser)]
#[command(name = "pyarcade")]
#[command(about = "Run small Python-style arcade programs headless")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program from the project directory
    Run {
        /// File name, `.py` optional
        name: String,

        /// Directory holding the program files
        #[arg(long, default_value = "project")]
        project_dir: PathBuf,

        /// Stop the frame loop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,

        /// Seed for `random`
        #[arg(long)]
        seed: Option<u64>,

        /// Make `game.update()` wait out each frame interval
        #[arg(long)]
        pace: bool,

        /// Scripted input (`@frame action args` per line)
        #[arg(long)]
        input: Option<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the translated program text
    Translate {
        /// File name, `.py` optional
        name: String,

        /// Directory holding the program files
        #[arg(long, default_value = "project")]
        project_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Run {
            name,
            project_dir,
            max_frames,
            seed,
            pace,
            input,
            config,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            if max_frames.is_some() {
                config.runtime.max_frames = max_frames;
            }
            if seed.is_some() {
                config.random.seed = seed;
            }
            if pace {
                config.runtime.pace_updates = true;
            }

            let mut sandbox = Sandbox::new(&config);
            if let Some(path) = input {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read `{}`", path.display()))?;
                sandbox
                    .runtime_mut()
                    .set_input_script(InputScript::from_text(&text)?);
            }

            let store = DirectoryStore::new(project_dir);
            sandbox.run_project(&store, &name)?;

            while sandbox.expects_frame_loop() {
                sandbox.wait_for_frame();
                sandbox.tick()?;
            }
            info!("{} frame(s) presented", sandbox.runtime().frames());
        }

        Commands::Translate { name, project_dir } => {
            let store = DirectoryStore::new(project_dir);
            let translation = translate(&store.source(&name)?);
            println!("{}", translation.native);
        }
    }

    Ok(())
}
