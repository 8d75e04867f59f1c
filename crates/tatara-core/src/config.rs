use serde::{Deserialize, Serialize};

/// Name of the optional per-application config file.
pub const CONFIG_FILE: &str = "tatara.toml";

/// tatara.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TataraConfig {
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub buildpacks: BuildpackConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub stager: StagerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack name exported to buildpacks as `STACK`
    #[serde(default = "default_stack_name")]
    pub name: String,
    /// Image the staged slug runs on (defaults to `packs/<name>:run`)
    #[serde(default)]
    pub run_image: Option<String>,
    /// Image buildpacks are executed in (defaults to `packs/<name>:build`)
    #[serde(default)]
    pub build_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildpackConfig {
    /// Base URL short buildpack names are expanded against
    #[serde(default = "default_registry")]
    pub registry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Emit `build.post` commands from heroku.yml. When false they are
    /// dropped with a warning.
    #[serde(default = "default_true")]
    pub support_post_commands: bool,
    /// Extension of the staged artifact written next to the cache
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagerConfig {
    /// Builder executable inside the build stack image
    #[serde(default = "default_builder")]
    pub builder: String,
    /// Path the builder writes the slug to, inside the container
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

impl StackConfig {
    /// Stack images for a named packs stack, e.g. `heroku-18`.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            run_image: None,
            build_image: None,
        }
    }

    pub fn run_image(&self) -> String {
        self.run_image
            .clone()
            .unwrap_or_else(|| format!("packs/{}:run", self.name))
    }

    pub fn build_image(&self) -> String {
        self.build_image
            .clone()
            .unwrap_or_else(|| format!("packs/{}:build", self.name))
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::named(&default_stack_name())
    }
}

impl Default for BuildpackConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            support_post_commands: true,
            artifact_extension: default_artifact_extension(),
        }
    }
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            builder: default_builder(),
            output_path: default_output_path(),
        }
    }
}

impl TataraConfig {
    /// Load from tatara.toml in the given directory, or return defaults if not found.
    pub fn load(dir: &std::path::Path) -> crate::Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            tracing::debug!(path = %config_path.display(), "loading config");
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            Ok(Self::default())
        }
    }
}

fn default_stack_name() -> String {
    "heroku-16".to_owned()
}

fn default_registry() -> String {
    "https://buildpack-registry.s3.amazonaws.com/buildpacks".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_artifact_extension() -> String {
    "slug".to_owned()
}

fn default_builder() -> String {
    "/packs/builder".to_owned()
}

fn default_output_path() -> String {
    "/out/slug.tgz".to_owned()
}
