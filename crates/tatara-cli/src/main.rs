mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tatara",
    about = "Stage apps into container images with buildpacks and heroku.yml"
)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage an app directory into ./<app>.slug
    Build {
        /// Application source directory
        app_dir: PathBuf,
        /// Application name, used for the slug, cache, and env overlay image
        app_name: String,
        /// Buildpack URL (repeatable); replaced by heroku.yml buildpacks
        #[arg(long = "buildpack", value_name = "URL")]
        buildpacks: Vec<String>,
        /// Packs stack name, e.g. heroku-18
        #[arg(long)]
        stack: Option<String>,
        /// Use local stack images only
        #[arg(long)]
        skip_stack_pull: bool,
        /// Runtime variable baked into the build image (repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = commands::parse_env_pair)]
        env: Vec<(String, String)>,
        /// File of KEY=VALUE lines; --env values win
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },
    /// Build a runnable image from ./<app>.slug
    Export {
        /// Application name
        app_name: String,
        /// Run stack image to export onto
        #[arg(long)]
        stack: Option<String>,
        /// Image tag (defaults to the app name)
        #[arg(long)]
        tag: Option<String>,
        /// Use a local stack image only
        #[arg(long)]
        skip_stack_pull: bool,
        /// App directory holding tatara.toml and heroku.yml
        #[arg(long, default_value = ".")]
        app_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Build {
            app_dir,
            app_name,
            buildpacks,
            stack,
            skip_stack_pull,
            env,
            env_file,
        } => {
            commands::build(commands::BuildArgs {
                app_dir,
                app_name,
                buildpacks,
                stack,
                skip_stack_pull,
                env,
                env_file,
            })
            .await?
        }
        Commands::Export {
            app_name,
            stack,
            tag,
            skip_stack_pull,
            app_dir,
        } => {
            commands::export(commands::ExportArgs {
                app_name,
                app_dir,
                stack,
                tag,
                skip_stack_pull,
            })
            .await?
        }
    }

    Ok(())
}
