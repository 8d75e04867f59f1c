use std::path::{Path, PathBuf};

use anyhow::Context;
use tatara_build::BuildContext;
use tatara_core::{Manifest, TataraConfig};
use tatara_engine::{ImageClient, ImageError, Verbosity};

/// Name of the slug inside the export build context.
const SLUG_FILE: &str = "slug.tgz";
/// Directory the slug's `app/` tree lands in.
const APP_ROOT: &str = "/app";

pub struct ExportArgs {
    pub app_name: String,
    /// Directory holding `tatara.toml` and `heroku.yml`, as passed to `build`
    pub app_dir: PathBuf,
    pub stack: Option<String>,
    pub tag: Option<String>,
    pub skip_stack_pull: bool,
}

/// Build a runnable image from `./<app>.<ext>` on the run stack.
///
/// Settings and the manifest come from the app directory; the slug is read
/// from the working directory, where `build` writes it.
pub async fn export(args: ExportArgs) -> anyhow::Result<()> {
    let config = TataraConfig::load(&args.app_dir)?;

    let slug_path =
        tatara_stage::artifact_path(Path::new("."), &args.app_name, &config.build.artifact_extension);
    let slug = std::fs::read(&slug_path).with_context(|| {
        format!(
            "could not read slug file {}; run `tatara build` first",
            slug_path.display()
        )
    })?;

    let mut stack = args.stack.unwrap_or_else(|| config.stack.run_image());
    let tag = args.tag.unwrap_or_else(|| args.app_name.clone());

    let images = ImageClient::new(super::stop_on_signal()?);
    if !args.skip_stack_pull {
        images.pull(&stack).await.map_err(cancelled)?;
    }

    if let Some(manifest) = Manifest::read(&args.app_dir)? {
        stack = manifest.run_image();
        tracing::debug!(image = %stack, "exporting onto manifest run layer");
    }

    let context = BuildContext::new(&export_dockerfile(&stack))
        .with_file(SLUG_FILE, slug)
        .into_tar()?;
    images
        .build_context(&tag, context, Verbosity::Verbose)
        .await
        .map_err(cancelled)?;

    println!("Exported image {tag} from {stack}");
    Ok(())
}

/// Slugs hold an `app/` tree; `ADD` unpacks it at the image root.
fn export_dockerfile(stack: &str) -> String {
    format!("FROM {stack}\nADD {SLUG_FILE} /\nWORKDIR {APP_ROOT}\n")
}

fn cancelled(e: ImageError) -> anyhow::Error {
    match e {
        ImageError::Cancelled => anyhow::anyhow!("export cancelled"),
        other => other.into(),
    }
}
