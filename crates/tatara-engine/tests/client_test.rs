use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use mockall::mock;
use tatara_core::{StopSignal, stop_channel};
use tatara_engine::client::{ImageClient, ImageError};
use tatara_engine::docker::DockerError;
use tatara_engine::executor::ImageEngine;
use tatara_engine::progress::{Progress, ProgressStream, Verbosity};

mock! {
    Engine {}

    impl ImageEngine for Engine {
        async fn pull(&self, image: &str) -> Result<ProgressStream, DockerError>;
        async fn build(&self, context: Vec<u8>, tag: &str) -> Result<ProgressStream, DockerError>;
        async fn remove(&self, image: &str) -> Result<(), DockerError>;
    }
}

fn progress(items: Vec<Result<Progress, DockerError>>) -> ProgressStream {
    Box::pin(tokio_stream::iter(items))
}

fn ok_stream() -> ProgressStream {
    progress(vec![Ok(Progress::Stream("Step 1/1 : FROM base".to_owned()))])
}

fn tar_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(bytes);
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

fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

// ── Layer Builder Tests ──

#[tokio::test]
async fn build_recipe_submits_dockerfile_context() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut mock = MockEngine::new();
    let sink = Arc::clone(&captured);
    mock.expect_build()
        .withf(|_, tag| tag == "abc:build")
        .times(1)
        .returning(move |context, _| {
            *sink.lock().unwrap() = context;
            Ok(ok_stream())
        });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    client
        .build_recipe("abc:build", "FROM base\nRUN true\n", Verbosity::Quiet)
        .await
        .unwrap();

    let entries = tar_entries(&captured.lock().unwrap());
    assert_eq!(
        entries,
        vec![("Dockerfile".to_owned(), b"FROM base\nRUN true\n".to_vec())]
    );
}

#[tokio::test]
async fn engine_reported_error_fails_build() {
    let mut mock = MockEngine::new();
    mock.expect_build().returning(|_, _| {
        Ok(progress(vec![
            Ok(Progress::Stream("Step 2/2 : RUN apt-get install nope -y".to_owned())),
            Ok(Progress::Error("E: Unable to locate package nope".to_owned())),
            Ok(Progress::Stream("never rendered".to_owned())),
        ]))
    });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let err = client
        .build_recipe("abc:run", "FROM base\n", Verbosity::Verbose)
        .await
        .unwrap_err();

    match err {
        ImageError::Build { tag, message } => {
            assert_eq!(tag, "abc:run");
            assert_eq!(message, "E: Unable to locate package nope");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn transport_error_fails_build() {
    let mut mock = MockEngine::new();
    mock.expect_build().returning(|_, _| {
        Err(DockerError::NotFound {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        })
    });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let err = client
        .build_recipe("abc:run", "FROM base\n", Verbosity::Quiet)
        .await
        .unwrap_err();

    assert!(matches!(err, ImageError::Build { .. }));
    assert!(err.to_string().contains("docker CLI not found"), "got: {err}");
}

#[tokio::test]
async fn stream_error_fails_build() {
    let mut mock = MockEngine::new();
    mock.expect_build().returning(|_, _| {
        Ok(progress(vec![Err(DockerError::Output {
            source: std::io::Error::other("connection reset"),
        })]))
    });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let result = client
        .build_recipe("abc:run", "FROM base\n", Verbosity::Quiet)
        .await;

    assert!(matches!(result, Err(ImageError::Build { .. })));
}

#[tokio::test]
async fn stop_cancels_build() {
    let (handle, stop) = stop_channel();
    let mut mock = MockEngine::new();
    mock.expect_build()
        .returning(|_, _| Ok(Box::pin(tokio_stream::pending())));

    let client = ImageClient::with_engine(mock, stop);
    handle.stop();
    let result = client
        .build_recipe("abc:run", "FROM base\n", Verbosity::Quiet)
        .await;

    assert!(matches!(result, Err(ImageError::Cancelled)));
}

// ── Pull Tests ──

#[tokio::test]
async fn pull_drains_status_messages() {
    let mut mock = MockEngine::new();
    mock.expect_pull()
        .withf(|image| image == "packs/heroku-16:build")
        .times(1)
        .returning(|_| {
            Ok(progress(vec![
                Ok(Progress::Status {
                    id: Some("a3ed95caeb02".to_owned()),
                    status: "Pull complete".to_owned(),
                }),
                Ok(Progress::Status {
                    id: None,
                    status: "Status: Downloaded newer image".to_owned(),
                }),
            ]))
        });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    client.pull("packs/heroku-16:build").await.unwrap();
}

#[tokio::test]
async fn pull_failure_names_image() {
    let mut mock = MockEngine::new();
    mock.expect_pull().returning(|_| {
        Ok(progress(vec![Ok(Progress::Error(
            "manifest for packs/nope:build not found".to_owned(),
        ))]))
    });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let err = client.pull("packs/nope:build").await.unwrap_err();

    assert!(matches!(err, ImageError::Pull { ref image, .. } if image == "packs/nope:build"));
    assert!(err.to_string().contains("not found"), "got: {err}");
}

// ── Env Overlay Tests ──

#[tokio::test]
async fn overlay_embeds_each_variable_as_a_file() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut mock = MockEngine::new();
    let sink = Arc::clone(&captured);
    mock.expect_build()
        .withf(|_, tag| tag == "myapp")
        .times(1)
        .returning(move |context, _| {
            *sink.lock().unwrap() = context;
            Ok(ok_stream())
        });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let overlay = client
        .build_env_overlay(
            "packs/heroku-16:build",
            "myapp",
            &vars(&[("FOO", "bar"), ("MULTI", "line one\nline two")]),
        )
        .await
        .unwrap();

    assert_eq!(overlay.image, "myapp");

    let entries = tar_entries(&captured.lock().unwrap());
    assert_eq!(
        entries,
        vec![
            (
                "Dockerfile".to_owned(),
                b"FROM packs/heroku-16:build\nCOPY env /tmp/env\n".to_vec()
            ),
            ("env/FOO".to_owned(), b"bar".to_vec()),
            ("env/MULTI".to_owned(), b"line one\nline two".to_vec()),
        ]
    );
}

#[tokio::test]
async fn empty_overlay_never_builds() {
    let mut mock = MockEngine::new();
    mock.expect_build().times(0);

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let result = client
        .build_env_overlay("base", "myapp", &BTreeMap::new())
        .await;

    assert!(matches!(result, Err(ImageError::EmptyOverlay)));
}

#[tokio::test]
async fn invalid_variable_name_never_builds() {
    let mut mock = MockEngine::new();
    mock.expect_build().times(0);

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let result = client
        .build_env_overlay("base", "myapp", &vars(&[("../escape", "x")]))
        .await;

    assert!(matches!(result, Err(ImageError::InvalidEnvVar { .. })));
}

// ── Remove Tests ──

#[tokio::test]
async fn remove_reports_engine_failure() {
    let mut mock = MockEngine::new();
    mock.expect_remove()
        .withf(|image| image == "myapp")
        .times(1)
        .returning(|_| {
            Err(DockerError::CommandFailed {
                args: vec![],
                stderr: "No such image: myapp".to_owned(),
            })
        });

    let client = ImageClient::with_engine(mock, StopSignal::never());
    let err = client.remove("myapp").await.unwrap_err();

    assert!(matches!(err, ImageError::Remove { ref image, .. } if image == "myapp"));
}
