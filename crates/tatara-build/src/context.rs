/// File name the recipe is stored under inside a build context.
pub const DOCKERFILE: &str = "Dockerfile";

/// An in-memory image build context: a Dockerfile plus auxiliary files.
#[derive(Debug, Clone)]
pub struct BuildContext {
    files: Vec<(String, Vec<u8>)>,
}

impl BuildContext {
    /// A context whose only file is the given recipe.
    pub fn new(dockerfile: &str) -> Self {
        Self {
            files: vec![(DOCKERFILE.to_owned(), dockerfile.as_bytes().to_vec())],
        }
    }

    /// Add an auxiliary file next to the Dockerfile.
    pub fn with_file(mut self, name: impl Into<String>, contents: Vec<u8>) -> Self {
        self.files.push((name.into(), contents));
        self
    }

    /// Serialize the context as a tar stream.
    pub fn into_tar(self) -> Result<Vec<u8>, ContextError> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            builder
                .append_data(&mut header, name, contents.as_slice())
                .map_err(|e| ContextError::Append {
                    name: name.clone(),
                    source: e,
                })?;
        }
        builder
            .into_inner()
            .map_err(|e| ContextError::Finish { source: e })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to add {name} to build context")]
    Append {
        name: String,
        source: std::io::Error,
    },
    #[error("failed to finish build context")]
    Finish { source: std::io::Error },
}
