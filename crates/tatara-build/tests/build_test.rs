use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use tatara_build::archive::{ExcludePatterns, archive_app, tar_directory};
use tatara_build::cache::Cache;
use tatara_build::context::BuildContext;
use tatara_build::dockerfile::DockerfileGenerator;
use tatara_core::BuildDirectives;
use tempfile::TempDir;

fn directives(pre: &[&str], packages: &[&str], post: &[&str]) -> BuildDirectives {
    let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect();
    BuildDirectives {
        buildpacks: Vec::new(),
        packages: owned(packages),
        pre: owned(pre),
        post: owned(post),
        config: BTreeMap::new(),
    }
}

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Entry names and contents of a tar stream.
fn tar_entries<R: Read>(reader: R) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(reader);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (name, contents)
        })
        .collect()
}

// ── Dockerfile Generation Tests ──

#[test]
fn dockerfile_preserves_directive_order() {
    let d = directives(&["a", "b"], &["x"], &["c"]);
    let output = DockerfileGenerator::new("packs/heroku-16:build", &d).render();

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(
        lines,
        vec![
            "FROM packs/heroku-16:build",
            "RUN a",
            "RUN b",
            "RUN apt-get update",
            "RUN apt-get install x -y",
            "RUN c",
        ]
    );
}

#[test]
fn dockerfile_installs_each_package_on_its_own_line() {
    let d = directives(&[], &["curl", "imagemagick"], &[]);
    let output = DockerfileGenerator::new("base", &d).render();

    assert_eq!(output.matches("RUN apt-get update").count(), 1);
    assert!(output.contains("RUN apt-get install curl -y\n"));
    assert!(output.contains("RUN apt-get install imagemagick -y\n"));
}

#[test]
fn dockerfile_no_package_lines_when_empty() {
    let d = directives(&["echo hi"], &[], &[]);
    let output = DockerfileGenerator::new("base", &d).render();

    assert!(!output.contains("apt-get"));
    assert_eq!(output, "FROM base\nRUN echo hi\n");
}

#[test]
fn dockerfile_empty_directives_is_just_from() {
    let output = DockerfileGenerator::new("packs/heroku-16:run", &BuildDirectives::default()).render();
    assert_eq!(output, "FROM packs/heroku-16:run\n");
}

#[test]
fn dockerfile_drops_post_commands_when_unsupported() {
    let d = directives(&["a"], &[], &["c"]);
    let output = DockerfileGenerator::new("base", &d)
        .with_post_commands(false)
        .render();

    assert_eq!(output, "FROM base\nRUN a\n");
}

// ── Archive Tests ──

#[test]
fn archive_contains_relative_paths() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "Procfile", "web: bin/start");
    write(tmp.path(), "lib/app/main.rb", "puts 1");

    let excludes = ExcludePatterns::for_app("myapp", "slug").unwrap();
    let archive = archive_app(tmp.path(), &excludes).unwrap();

    assert_eq!(archive.entries(), ["Procfile", "lib/app/main.rb"]);
    let entries = tar_entries(archive.into_file());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].0, "lib/app/main.rb");
    assert_eq!(entries[1].1, b"puts 1");
}

#[test]
fn archive_excludes_reserved_names_at_any_depth() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "myapp.slug", "old slug");
    write(tmp.path(), ".myapp.cache", "old cache");
    write(tmp.path(), "nested/deeper/myapp.slug", "old slug");
    write(tmp.path(), "nested/.myapp.cache", "old cache");
    write(tmp.path(), "nested/keep.txt", "keep");
    write(tmp.path(), "other.slug", "not ours");
    write(tmp.path(), "myapp.slug.bak", "not reserved");

    let excludes = ExcludePatterns::for_app("myapp", "slug").unwrap();
    let archive = archive_app(tmp.path(), &excludes).unwrap();

    assert_eq!(
        archive.entries(),
        ["myapp.slug.bak", "nested/keep.txt", "other.slug"]
    );
}

#[test]
fn archive_escapes_app_name() {
    let excludes = ExcludePatterns::for_app("my.app", "slug").unwrap();
    assert!(excludes.is_excluded("my.app.slug"));
    assert!(excludes.is_excluded(".my.app.cache"));
    assert!(!excludes.is_excluded("myXapp.slug"));
}

#[test]
fn archive_of_empty_directory_has_no_entries() {
    let tmp = TempDir::new().unwrap();
    let excludes = ExcludePatterns::for_app("myapp", "slug").unwrap();
    let archive = archive_app(tmp.path(), &excludes).unwrap();

    assert!(archive.entries().is_empty());
    assert!(tar_entries(archive.into_file()).is_empty());
}

#[cfg(unix)]
#[test]
fn archive_skips_symlinks() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "real.txt", "data");
    std::os::unix::fs::symlink(tmp.path().join("real.txt"), tmp.path().join("link.txt")).unwrap();

    let archive = archive_app(tmp.path(), &ExcludePatterns::default()).unwrap();

    assert_eq!(archive.entries(), ["real.txt"]);
}

#[test]
fn archive_of_missing_directory_fails() {
    let tmp = TempDir::new().unwrap();
    let result = archive_app(&tmp.path().join("missing"), &ExcludePatterns::default());
    assert!(result.is_err());
}

#[test]
fn tar_directory_includes_every_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "Dockerfile", "FROM base\n");
    write(tmp.path(), "env/FOO", "bar");

    let bytes = tar_directory(tmp.path()).unwrap();
    let entries = tar_entries(bytes.as_slice());

    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Dockerfile", "env/FOO"]);
}

#[test]
fn invalid_exclude_pattern_is_rejected() {
    assert!(ExcludePatterns::new(&["(unclosed"]).is_err());
}

// ── Cache Tests ──

#[test]
fn cache_is_created_empty() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(Cache::file_name("myapp"));

    let cache = Cache::open(&path).unwrap();

    assert!(path.exists());
    assert!(cache.is_empty());
    assert_eq!(cache.len(), 0);
    assert_eq!(path.file_name().unwrap(), ".myapp.cache");
}

#[test]
fn cache_with_content_is_not_empty() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(".myapp.cache");

    {
        let mut cache = Cache::open(&path).unwrap();
        cache.file_mut().write_all(b"x").unwrap();
    }

    let reopened = Cache::open(&path).unwrap();
    assert!(!reopened.is_empty());
    assert_eq!(reopened.len(), 1);
}

#[test]
fn cache_open_fails_in_missing_directory() {
    let tmp = TempDir::new().unwrap();
    let result = Cache::open(&tmp.path().join("missing/.myapp.cache"));
    assert!(result.is_err());
}

// ── Build Context Tests ──

#[test]
fn context_holds_dockerfile_only() {
    let bytes = BuildContext::new("FROM base\n").into_tar().unwrap();
    let entries = tar_entries(bytes.as_slice());

    assert_eq!(entries, vec![("Dockerfile".to_owned(), b"FROM base\n".to_vec())]);
}

#[test]
fn context_includes_auxiliary_files() {
    let bytes = BuildContext::new("FROM base\nADD slug.tgz /app\n")
        .with_file("slug.tgz", vec![1, 2, 3])
        .into_tar()
        .unwrap();
    let entries = tar_entries(bytes.as_slice());

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1], ("slug.tgz".to_owned(), vec![1, 2, 3]));
}

// ── Property-based tests ──

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn commands() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-z][a-z -]{0,16}", 0..4)
    }

    proptest! {
        #[test]
        fn render_is_deterministic(pre in commands(), packages in commands(), post in commands()) {
            let d = BuildDirectives { pre, packages, post, ..Default::default() };
            let first = DockerfileGenerator::new("base", &d).render();
            let second = DockerfileGenerator::new("base", &d.clone()).render();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn line_count_matches_directives(pre in commands(), packages in commands(), post in commands()) {
            let refresh = usize::from(!packages.is_empty());
            let expected = 1 + pre.len() + refresh + packages.len() + post.len();
            let d = BuildDirectives { pre, packages, post, ..Default::default() };
            let output = DockerfileGenerator::new("base", &d).render();
            prop_assert_eq!(output.lines().count(), expected);
        }
    }
}
