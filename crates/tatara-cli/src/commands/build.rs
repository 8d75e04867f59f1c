use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tatara_core::{StackConfig, TataraConfig};
use tatara_stage::{Pipeline, StagingRequest};

pub struct BuildArgs {
    pub app_dir: PathBuf,
    pub app_name: String,
    pub buildpacks: Vec<String>,
    pub stack: Option<String>,
    pub skip_stack_pull: bool,
    pub env: Vec<(String, String)>,
    pub env_file: Option<PathBuf>,
}

/// Stage an app directory into `./<app>.<ext>` and `./.<app>.cache`.
pub async fn build(args: BuildArgs) -> anyhow::Result<()> {
    let env = collect_env(args.env_file.as_deref(), args.env)?;

    let mut config = TataraConfig::load(&args.app_dir)?;
    if let Some(name) = &args.stack {
        config.stack = StackConfig::named(name);
    }

    let request = StagingRequest {
        app_dir: args.app_dir,
        app_name: args.app_name,
        output_dir: PathBuf::from("."),
        buildpacks: args.buildpacks,
        env,
        skip_stack_pull: args.skip_stack_pull,
    };

    let pipeline = Pipeline::new(config, super::stop_on_signal()?);
    let outcome = match pipeline.stage(&request).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => anyhow::bail!("build cancelled"),
        Err(e) => return Err(e.into()),
    };

    for layer in &outcome.layers {
        println!("Built layer {layer}");
    }
    println!("Staged with {}", outcome.stack_image);
    println!("Slug:  {}", outcome.artifact_path.display());
    println!("Cache: {}", outcome.cache_path.display());
    Ok(())
}

/// Parse a `KEY=VALUE` pair. The value may itself contain `=`.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        Some(_) => Err(format!("missing variable name in {raw:?}")),
        None => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

/// Variables from `env_file` (if any), overridden by `pairs`.
fn collect_env(
    env_file: Option<&Path>,
    pairs: Vec<(String, String)>,
) -> anyhow::Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    if let Some(path) = env_file {
        let entries = dotenvy::from_path_iter(path)
            .with_context(|| format!("failed to open env file {}", path.display()))?;
        for entry in entries {
            let (key, value) =
                entry.with_context(|| format!("malformed env file {}", path.display()))?;
            env.insert(key, value);
        }
    }
    env.extend(pairs);
    Ok(env)
}
