use tatara_core::BuildDirectives;

/// Refreshes the package index before any install line.
pub const PACKAGE_REFRESH: &str = "apt-get update";

/// Generates a stack-layer Dockerfile from heroku.yml build directives.
///
/// Every command is its own `RUN` line so a failing package or hook is
/// attributable to a single step. Identical directives always render to
/// identical text, which keeps derived image tags cache-meaningful.
pub struct DockerfileGenerator<'a> {
    base_image: &'a str,
    directives: &'a BuildDirectives,
    post_commands: bool,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(base_image: &'a str, directives: &'a BuildDirectives) -> Self {
        Self {
            base_image,
            directives,
            post_commands: true,
        }
    }

    /// Toggle emission of `build.post` commands.
    pub fn with_post_commands(mut self, enabled: bool) -> Self {
        self.post_commands = enabled;
        self
    }

    pub fn render(&self) -> String {
        let mut lines = vec![format!("FROM {}", self.base_image)];

        lines.extend(self.directives.pre.iter().map(|cmd| format!("RUN {cmd}")));

        if !self.directives.packages.is_empty() {
            lines.push(format!("RUN {PACKAGE_REFRESH}"));
            lines.extend(
                self.directives
                    .packages
                    .iter()
                    .map(|pkg| format!("RUN {}", install_command(pkg))),
            );
        }

        if self.post_commands {
            lines.extend(self.directives.post.iter().map(|cmd| format!("RUN {cmd}")));
        } else if !self.directives.post.is_empty() {
            tracing::warn!(
                count = self.directives.post.len(),
                "`post` steps in heroku.yml are not supported and will be skipped"
            );
        }

        let mut dockerfile = lines.join("\n");
        dockerfile.push('\n');
        dockerfile
    }
}

fn install_command(package: &str) -> String {
    format!("apt-get install {package} -y")
}
